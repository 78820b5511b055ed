//! Sluice Client - Cache-aware entity managers
//!
//! Wraps the remote API collaborators with the shared cache store. Each
//! manager decides what to cache, under which key, and which entries a
//! mutation must invalidate.

pub mod collaborators;
pub mod dataflow;
pub mod generation;
pub mod single_flight;

pub use collaborators::{DataflowMutator, DataflowSearcher, EntityFetcher};
pub use dataflow::DataflowManager;
pub use generation::Generations;
pub use single_flight::SingleFlight;
