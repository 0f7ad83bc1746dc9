//! Gap-affine alignment of reads to the POA graph

pub mod config;
pub mod matrix;
pub mod utils;

pub use config::{AlignConfig, AlignMode, AlignParams};
pub use matrix::{AlignStep, AlignmentMatrix};
