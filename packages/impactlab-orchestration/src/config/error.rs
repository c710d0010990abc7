//! Configuration error types

use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing version field in YAML
    #[error("Missing 'version' field in registry configuration. Add 'version: 1' to the top of your YAML file.")]
    MissingVersion,

    /// Unsupported version
    #[error("Unsupported configuration version {found}. Supported versions: {}", supported.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", "))]
    UnsupportedVersion { found: u32, supported: Vec<u32> },

    /// Variable refers to a superindex that is not declared
    #[error("Variable '{variable}' uses unknown superindex '{name}'. {suggestion}")]
    UnknownSuperIndex {
        name: String,
        variable: String,
        suggestion: String,
    },

    /// Structural validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    /// Unknown superindex error with a closest-match suggestion
    pub fn unknown_superindex(
        name: impl Into<String>,
        variable: impl Into<String>,
        declared: &[String],
    ) -> Self {
        let name = name.into();
        let suggestion = find_closest_match(&name, declared);

        Self::UnknownSuperIndex {
            name,
            variable: variable.into(),
            suggestion,
        }
    }
}

/// Find closest match using simple edit distance
fn find_closest_match(target: &str, candidates: &[String]) -> String {
    match candidates
        .iter()
        .min_by_key(|candidate| levenshtein_distance(target, candidate))
    {
        Some(closest) => format!("Did you mean '{}'?", closest),
        None => "No superindices are declared".to_string(),
    }
}

fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s2: Vec<char> = s2.chars().collect();
    let mut previous: Vec<usize> = (0..=s2.len()).collect();

    for (i, c1) in s1.chars().enumerate() {
        let mut current = vec![i + 1; s2.len() + 1];
        for (j, c2) in s2.iter().enumerate() {
            let cost = if c1 == *c2 { 0 } else { 1 };
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        previous = current;
    }

    previous[s2.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("rcp", "rcp"), 0);
        assert_eq!(levenshtein_distance("", "ssp"), 3);
    }

    #[test]
    fn test_unknown_superindex_suggestion() {
        let declared = vec!["rcp".to_string(), "ssp".to_string()];
        let err = ConfigError::unknown_superindex("scp", "/GCP/climate/tas", &declared);

        let msg = err.to_string();
        assert!(msg.contains("'scp'"));
        assert!(msg.contains("/GCP/climate/tas"));
        assert!(msg.contains("Did you mean"));
    }

    #[test]
    fn test_unknown_superindex_without_candidates() {
        let err = ConfigError::unknown_superindex("rcp", "tas", &[]);
        assert!(err.to_string().contains("No superindices are declared"));
    }

    #[test]
    fn test_unsupported_version_error() {
        let err = ConfigError::UnsupportedVersion {
            found: 2,
            supported: vec![1],
        };

        let msg = err.to_string();
        assert!(msg.contains("version 2"));
        assert!(msg.contains("Supported versions: 1"));
    }
}
