pub mod poa;
pub mod io;

pub use poa::{null_vertex, GraphStamp, PoaGraph, ReadPath, VertexIndex};
pub use io::ExportFormat;
