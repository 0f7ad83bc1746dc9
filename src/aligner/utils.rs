use crate::aligner::matrix::AlignStep;
use crate::graph::poa::{IndexType, PoaGraph, VertexIndex};

#[inline]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        other => other,
    }
}

pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|b| complement(*b))
        .collect()
}

/// Three line representation of an alignment: graph bases, match indicators and read bases.
pub fn print_alignment<Ix>(graph: &PoaGraph<Ix>, read: &[u8], steps: &[AlignStep<VertexIndex<Ix>>]) -> String
where
    Ix: IndexType,
{
    let mut graph_chars = Vec::with_capacity(steps.len());
    let mut aln_chars = Vec::with_capacity(steps.len());
    let mut read_chars = Vec::with_capacity(steps.len());

    for step in steps {
        match *step {
            AlignStep::Match { vertex, read_pos } | AlignStep::Mismatch { vertex, read_pos } => {
                let base = graph.vertex_base(vertex);
                graph_chars.push(base);
                aln_chars.push(if base == read[read_pos] { b'|' } else { b'*' });
                read_chars.push(read[read_pos]);
            },
            AlignStep::Insertion { read_pos } => {
                graph_chars.push(b'-');
                aln_chars.push(b' ');
                read_chars.push(read[read_pos]);
            },
            AlignStep::Deletion { vertex } => {
                graph_chars.push(graph.vertex_base(vertex));
                aln_chars.push(b' ');
                read_chars.push(b'-');
            }
        }
    }

    format!(
        "{}\n{}\n{}",
        String::from_utf8_lossy(&graph_chars),
        String::from_utf8_lossy(&aln_chars),
        String::from_utf8_lossy(&read_chars),
    )
}
