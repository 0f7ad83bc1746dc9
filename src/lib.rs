extern crate petgraph;

pub mod errors;
pub mod interval;
pub mod graph;
pub mod aligner;
pub mod range_finder;
pub mod consensus;
pub mod sparse_poa;

pub use consensus::Consensus;
pub use sparse_poa::{AddReadOptions, AlignmentSummary, ReadKey, SparsePoa};
