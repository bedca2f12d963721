//! Community clustering: statement similarity graph, Leiden, drift, and
//! split evolution.

mod engine;
pub mod leiden;
pub mod naming;
pub mod similarity;

pub use engine::{ClusteringEngine, ClusteringMode, ClusteringOutcome};
pub use leiden::{leiden, LeidenParams};
pub use naming::{distinctive_terms, ClusterTerms, DistinctiveTerms};
pub use similarity::build_similarity_edges;
