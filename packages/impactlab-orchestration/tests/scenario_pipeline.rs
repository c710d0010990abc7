//! End-to-end runs of the rcp × ssp mortality pipeline

use impactlab_orchestration::{
    Indices, IterOptions, OnError, OrchestratorError, Pipeline, Registry, Step, StepArg,
    StepArgs, Variable,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const POPOP: &str = "/GCP/socioeconomics/popop";
const TAS: &str = "/GCP/climate/tas";
const MORTALITY: &str = "/GCP/impacts/mortality";
const TAS2_IR: &str = "/GCP/climate/tas2_ir";

fn registry() -> Registry {
    Registry::impactlab_default().unwrap()
}

/// Inner step: archives in, one mortality archive out
fn mortality_step(registry: &Registry) -> Step {
    Step::builder("compute_mortality")
        .updates(registry.get_variable(MORTALITY).unwrap())
        .params(["popop", "tas"])
        .body(|ctx| {
            let popop = ctx.archive("popop")?;
            let tas = ctx.archive("tas")?;
            Ok(json!(format!("{} x {}", popop.name(), tas.name())))
        })
        .unwrap()
}

#[test]
fn iterated_step_writes_every_combination() {
    let registry = registry();
    let inner = mortality_step(&registry);

    let outer = Step::builder("mortality_by_scenario")
        .uses([
            ("popop", registry.get_variable(POPOP).unwrap()),
            ("tas", registry.get_variable(TAS).unwrap()),
        ])
        .iters()
        .params(["popop", "tas"])
        .body(move |ctx| {
            inner.call_with(ctx.registry(), ctx.args().clone())?;
            Ok(json!(null))
        })
        .unwrap();

    assert_eq!(outer.call(&registry).unwrap(), None);

    let written = registry.archives_for(MORTALITY);
    assert_eq!(written.len(), 20);

    let names: BTreeSet<&str> = written.iter().map(|a| a.name()).collect();
    assert_eq!(names.len(), 20);
    assert!(names.contains("/GCP/impacts/mortality/rcp85/ssp3.nc"));

    for archive in &written {
        assert_eq!(archive.version().to_string(), "0.0.2");
        assert_eq!(archive.indices().len(), 2);
    }

    // inputs are resolved but never written
    assert_eq!(registry.archives_for(TAS).len(), 4);
    assert_eq!(registry.archives_for(POPOP).len(), 5);
    assert!(registry
        .archives_for(TAS)
        .iter()
        .all(|a| a.version().to_string() == "0.0.1"));

    let sample = registry
        .find_archive(
            MORTALITY,
            &[("rcp", "rcp26"), ("ssp", "ssp1")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
        .unwrap();
    assert_eq!(
        *sample.value(),
        json!("/GCP/socioeconomics/popop/ssp1.nc x /GCP/climate/tas/rcp26.nc")
    );
}

#[test]
fn atomic_step_writes_once_per_combination() {
    let registry = registry();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let step = Step::builder("atomic_mortality")
        .uses([
            ("popop", registry.get_variable(POPOP).unwrap()),
            ("tas", registry.get_variable(TAS).unwrap()),
        ])
        .iters()
        .updates(registry.get_variable(MORTALITY).unwrap())
        .body(move |_| Ok(json!(counter.fetch_add(1, Ordering::SeqCst))))
        .unwrap();

    let output = step.run(&registry, StepArgs::new()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 20);
    assert_eq!(output.metrics.invocations, 20);
    assert_eq!(output.metrics.iterations, 20);
    assert_eq!(output.metrics.archives_updated, 20);
    assert_eq!(registry.archives_for(MORTALITY).len(), 20);
}

#[test]
fn atomic_step_with_shared_indices_writes_one_archive() {
    let mut registry = registry();
    let rcp = registry.superindex("rcp").unwrap().clone();
    let heat = registry.register_variable(Variable::new("/GCP/impacts/heat", rcp));

    let key: Indices = [("rcp".to_string(), "rcp60".to_string())].into_iter().collect();
    let tas = registry.get_variable(TAS).unwrap().get_archive(&registry, &key).unwrap();
    let tas2 = registry
        .get_variable(TAS2_IR)
        .unwrap()
        .get_archive(&registry, &key)
        .unwrap();

    let step = Step::builder("heat")
        .uses([("popop", tas), ("tas", tas2)])
        .updates(heat)
        .body(|_| Ok(json!(7)))
        .unwrap();

    let output = step.run(&registry, StepArgs::new()).unwrap();
    assert_eq!(output.metrics.invocations, 1);
    assert_eq!(output.metrics.archives_updated, 1);

    let written = registry.archives_for("/GCP/impacts/heat");
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].indices(), &key);
    assert_eq!(*written[0].value(), json!(7));
}

#[test]
fn sliced_variable_narrows_iteration() {
    let registry = registry();
    let key = [("rcp".to_string(), "rcp85".to_string())].into_iter().collect();
    let tas = registry.get_variable(TAS).unwrap().slice(&key);

    let step = Step::builder("square_rcp85")
        .uses([("tas", tas)])
        .iters()
        .updates(registry.get_variable(TAS2_IR).unwrap())
        .body(|_| Ok(json!(1.0)))
        .unwrap();

    step.call(&registry).unwrap();
    let written = registry.archives_for(TAS2_IR);
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].name(), "/GCP/climate/tas2_ir/rcp85.nc");
}

#[test]
fn written_value_readable_through_open() {
    let registry = registry();

    let step = Step::builder("tas2_ir")
        .uses([("tas", StepArg::from(registry.get_variable(TAS).unwrap()))])
        .iters()
        .updates(registry.get_variable(TAS2_IR).unwrap())
        .body(|ctx| {
            let tas = ctx.archive("tas")?;
            let rcp = &tas.indices()["rcp"];
            let t: f64 = rcp.trim_start_matches("rcp").parse()?;
            Ok(json!(t * t))
        })
        .unwrap();
    step.call(&registry).unwrap();

    let key = [("rcp".to_string(), "rcp45".to_string())].into_iter().collect();
    let archive = registry.find_archive(TAS2_IR, &key).unwrap();
    let value: f64 = archive.open().unwrap().read_json().unwrap();
    assert_eq!(value, 2025.0);
}

#[test]
fn repeated_runs_bump_versions() {
    let registry = registry();
    let step = Step::builder("tas2_ir")
        .uses([("tas", registry.get_variable(TAS).unwrap())])
        .iters()
        .updates(registry.get_variable(TAS2_IR).unwrap())
        .body(|_| Ok(json!(0)))
        .unwrap();

    step.call(&registry).unwrap();
    step.call(&registry).unwrap();

    for archive in registry.archives_for(TAS2_IR) {
        assert_eq!(archive.version().to_string(), "0.0.3");
    }
}

#[test]
fn fail_fast_stops_iteration() {
    let registry = registry();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let step = Step::builder("fragile")
        .uses([("tas", registry.get_variable(TAS).unwrap())])
        .iters()
        .body(move |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            if ctx.archive("tas")?.indices()["rcp"] == "rcp45" {
                anyhow::bail!("no data for rcp45");
            }
            Ok(json!(null))
        })
        .unwrap();

    let err = step.call(&registry).unwrap_err();
    assert!(matches!(err, OrchestratorError::StepFailed { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn continue_on_error_records_failures() {
    let registry = registry();

    let step = Step::builder("fragile")
        .uses([("tas", registry.get_variable(TAS).unwrap())])
        .iters_with(IterOptions {
            on_error: OnError::Continue,
            ..Default::default()
        })
        .updates(registry.get_variable(TAS2_IR).unwrap())
        .body(|ctx| {
            if ctx.archive("tas")?.indices()["rcp"] == "rcp45" {
                anyhow::bail!("no data for rcp45");
            }
            Ok(json!(1))
        })
        .unwrap();

    let output = step.run(&registry, StepArgs::new()).unwrap();
    assert_eq!(output.metrics.iterations, 4);
    assert_eq!(output.metrics.iterations_failed, 1);
    assert_eq!(output.metrics.archives_updated, 3);
    assert!(output.metrics.failures[0].contains("rcp45"));

    match step.call(&registry) {
        Err(OrchestratorError::IterationsFailed { failed, total, .. }) => {
            assert_eq!((failed, total), (1, 4));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn pipeline_runs_steps_in_data_order() {
    let registry = registry();
    let order: Arc<Mutex<Vec<&str>>> = Arc::default();

    let square_log = Arc::clone(&order);
    let square = Step::builder("square")
        .uses([("tas", registry.get_variable(TAS).unwrap())])
        .iters()
        .updates(registry.get_variable(TAS2_IR).unwrap())
        .body(move |_| {
            square_log.lock().unwrap().push("square");
            Ok(json!(1))
        })
        .unwrap();

    let mortality_log = Arc::clone(&order);
    let mortality = Step::builder("mortality")
        .uses([
            ("popop", registry.get_variable(POPOP).unwrap()),
            ("tas2", registry.get_variable(TAS2_IR).unwrap()),
        ])
        .iters()
        .updates(registry.get_variable(MORTALITY).unwrap())
        .body(move |_| {
            mortality_log.lock().unwrap().push("mortality");
            Ok(json!(2))
        })
        .unwrap();

    let pipeline = Pipeline::new("impacts")
        .with_step(mortality)
        .unwrap()
        .with_step(square)
        .unwrap();

    assert_eq!(
        pipeline.execution_plan().unwrap(),
        "Phase 1: square\nPhase 2: mortality"
    );

    let result = pipeline.run(&registry).unwrap();
    assert_eq!(result.steps_run, 2);
    assert_eq!(result.archives_updated, 4 + 20);

    let entries = order.lock().unwrap().clone();
    assert_eq!(entries.len(), 24);
    assert!(entries[..4].iter().all(|e| *e == "square"));
    assert!(entries[4..].iter().all(|e| *e == "mortality"));
}
