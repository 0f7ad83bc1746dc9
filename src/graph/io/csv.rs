use std::io::Write;

use itertools::Itertools;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use crate::errors::PoaError;
use crate::graph::poa::{IndexType, PoaGraph};

/// Write vertices and edges as comma separated values
///
/// Vertex rows: `V,id,base,coverage,spanning_reads`. Edge rows: `E,source,target,coverage,reads`,
/// with read IDs separated by `;`.
pub fn graph_to_csv<Ix>(writer: &mut impl Write, graph: &PoaGraph<Ix>) -> Result<(), PoaError>
where
    Ix: IndexType,
{
    writeln!(writer, "V,id,base,coverage,spanning_reads")?;
    for &v in graph.topological_order() {
        writeln!(
            writer,
            "V,{},{},{},{}",
            v.index(),
            char::from(graph.vertex_base(v)),
            graph.coverage(v),
            graph.spanning_reads(v)
        )?;
    }

    writeln!(writer, "E,source,target,coverage,reads")?;
    let edges = graph.graph.edge_references()
        .sorted_by_key(|e| (e.source(), e.target()));

    for e in edges {
        writeln!(
            writer,
            "E,{},{},{},{}",
            e.source().index(),
            e.target().index(),
            e.weight().read_ids.len(),
            e.weight().read_ids.iter().join(";")
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aligner::config::AlignConfig;

    #[test]
    fn test_csv_output() {
        let mut graph = PoaGraph::<u32>::new();
        let config = AlignConfig::global();
        graph.add_read(b"ACGT", &config, None).unwrap();
        graph.add_read(b"ACGT", &config, None).unwrap();

        let mut buffer = Vec::new();
        graph_to_csv(&mut buffer, &graph).unwrap();
        let csv = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = csv.lines().collect();

        // Two headers, six vertices and five edges
        assert_eq!(lines.len(), 13);
        assert_eq!(lines[0], "V,id,base,coverage,spanning_reads");
        assert_eq!(lines[1], "V,0,#,0,0");
        assert_eq!(lines[2], "V,2,A,2,2");
        assert_eq!(lines[8], "E,0,2,2,0;1");
    }
}
