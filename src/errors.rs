use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

use crate::graph::poa::GraphStamp;

#[derive(Debug)]
pub enum GraphError {
    /// The first sequence can only be added to a graph without reads
    NotEmpty,

    /// The alignment matrix was computed against a different graph snapshot
    StaleAlignment { expected: GraphStamp, found: GraphStamp },

    /// The graph contains a cycle
    Cycle,

    /// Two consecutive vertices of a path are not connected by an edge
    InvalidEdge(usize, usize),
}

impl Error for GraphError {}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::NotEmpty =>
                write!(f, "The graph already contains reads, can't add a first sequence!"),
            Self::StaleAlignment { expected, found } =>
                write!(f, "Alignment matrix was computed against graph {found}, but the graph is now at {expected}!"),
            Self::Cycle =>
                write!(f, "The graph is in an invalid state (contains a cycle)."),
            Self::InvalidEdge(from, to) =>
                write!(f, "No edge between vertex {from} and vertex {to}!"),
        }
    }
}

impl<N> From<petgraph::algo::Cycle<N>> for GraphError {
    fn from(_: petgraph::algo::Cycle<N>) -> Self {
        Self::Cycle
    }
}

#[derive(Debug)]
pub enum PoaError {
    /// A read without any bases was given
    EmptySequence,

    /// Consensus was requested for an empty set of reads
    NoSequences,

    /// The range finder was not initialized for this read and graph snapshot
    RangeFinderNotInitialized,

    /// Error variant for invalid graph operations
    Graph(GraphError),

    /// Error variant when writing graph exports failed
    IOError(io::Error),
}

impl Error for PoaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            Self::Graph(ref source) => Some(source),
            Self::IOError(ref source) => Some(source),
            _ => None
        }
    }
}

impl From<GraphError> for PoaError {
    fn from(value: GraphError) -> Self {
        Self::Graph(value)
    }
}

impl From<io::Error> for PoaError {
    fn from(value: io::Error) -> Self {
        Self::IOError(value)
    }
}

impl Display for PoaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::EmptySequence =>
                write!(f, "Can't align an empty sequence!"),
            Self::NoSequences =>
                write!(f, "Can't compute a consensus without any reads!"),
            Self::RangeFinderNotInitialized =>
                write!(f, "The range finder was not initialized for this read and graph!"),
            Self::Graph(ref err) =>
                err.fmt(f),
            Self::IOError(ref err) =>
                err.fmt(f),
        }
    }
}
