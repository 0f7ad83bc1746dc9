use std::io::Write;

use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use rustc_hash::FxHashSet;

use crate::errors::PoaError;
use crate::graph::poa::{IndexType, PoaGraph, VertexIndex};

fn graphviz_node_color(label: u8) -> &'static str {
    match label {
        b'A' => "#80BC42",
        b'C' => "#006DB6",
        b'G' => "#F36C3E",
        b'T' => "#B12028",
        _ => "#939393",
    }
}

/// Write the graph in GraphViz dot format. Vertices on `highlight` (e.g. the consensus path) are
/// drawn with a different fill color.
pub fn graph_to_dot<Ix>(
    writer: &mut impl Write,
    graph: &PoaGraph<Ix>,
    highlight: &[VertexIndex<Ix>],
) -> Result<(), PoaError>
where
    Ix: IndexType,
{
    let highlighted: FxHashSet<_> = highlight.iter().copied().collect();

    writeln!(writer, "digraph {{")?;
    writeln!(writer, "rankdir=\"LR\"")?;
    writeln!(
        writer,
        "node [shape=circle, style=filled, fillcolor=\"#e3e3e3\", penwidth=0]"
    )?;
    writeln!(writer)?;

    for &v in graph.topological_order() {
        if graph.is_special(v) {
            writeln!(writer, "{} [label=\"{}\", shape=none]", v.index(), char::from(graph.vertex_base(v)))?;
            continue;
        }

        let base = graph.vertex_base(v);
        let fill = if highlighted.contains(&v) { "#ffd966" } else { "#e3e3e3" };

        writeln!(
            writer,
            "{} [label=\"{}\\n{}\", fontcolor=\"{}\", fillcolor=\"{}\", tooltip=\"vertex {}, rank {}, spanning {}\"]",
            v.index(),
            char::from(base),
            graph.coverage(v),
            graphviz_node_color(base),
            fill,
            v.index(),
            graph.rank(v),
            graph.spanning_reads(v)
        )?;
    }

    writeln!(writer)?;

    for v in graph.vertices() {
        for other in graph.aligned_vertices(v) {
            // Each pair only once
            if other.index() > v.index() {
                writeln!(
                    writer,
                    "{} -> {} [style=dotted, color=\"#939393\", constraint=false, arrowhead=none]",
                    v.index(),
                    other.index()
                )?;
            }
        }
    }

    let max_num_reads = graph.graph
        .edge_references()
        .map(|e| e.weight().read_ids.len())
        .max()
        .unwrap_or(1);
    let min_weight = 1.0;
    let max_weight = 40.0;
    let min_penwidth = 0.5;
    let max_penwidth = 3.5;

    for e in graph.graph.edge_references() {
        let read_list_str = e
            .weight()
            .read_ids
            .iter()
            .map(|v| format!("s{v}"))
            .collect::<Vec<String>>()
            .join(" ");

        let num_reads = e.weight().read_ids.len();
        let (scaled_weight, scaled_penwidth) = if max_num_reads > 0 {
            let frac = num_reads as f64 / max_num_reads as f64;
            let scaled_weight = (min_weight + frac * (max_weight - min_weight)).round() as i64;
            let scaled_penwidth = min_penwidth + frac * (max_penwidth - min_penwidth);

            (scaled_weight, scaled_penwidth)
        } else {
            (1, 1.0)
        };

        let on_path = highlighted.contains(&e.source()) && highlighted.contains(&e.target());
        let color = if on_path { "#e69138" } else { "#000000" };

        writeln!(
            writer,
            "{} -> {} [weight={}; penwidth={:.2}; label={}; color=\"{}\"; class=\"{}\"]",
            e.source().index(),
            e.target().index(),
            scaled_weight,
            scaled_penwidth,
            num_reads,
            color,
            read_list_str
        )?;
    }

    writeln!(writer, "}}")?;
    Ok(())
}
