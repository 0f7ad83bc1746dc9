pub mod dot;
pub mod csv;

use std::fmt::{Display, Formatter};

use crate::errors::PoaError;
use crate::graph::poa::{IndexType, PoaGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Dot,
    Csv,
}

impl<Ix> PoaGraph<Ix>
where
    Ix: IndexType,
{
    /// Render the graph as text, for debugging purposes
    pub fn export(&self, format: ExportFormat) -> String {
        match format {
            ExportFormat::Dot => render_to_string(|buffer| dot::graph_to_dot(buffer, self, &[])),
            ExportFormat::Csv => render_to_string(|buffer| csv::graph_to_csv(buffer, self)),
        }
    }
}

/// Run one of the graph writers against an in-memory buffer
pub(crate) fn render_to_string<F>(write: F) -> String
where
    F: FnOnce(&mut Vec<u8>) -> Result<(), PoaError>,
{
    let mut buffer = Vec::new();

    // The writers only fail on I/O errors, which a Vec never produces
    write(&mut buffer).expect("writing to memory failed");

    String::from_utf8_lossy(&buffer).into_owned()
}

impl<Ix> Display for PoaGraph<Ix>
where
    Ix: IndexType,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.export(ExportFormat::Dot))
    }
}
