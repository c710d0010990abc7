//! Archive store adapters

pub mod memory;

pub use memory::InMemoryArchiveStore;
