//! Max-Cut objective over a weighted edge list.
//!
//! The scoring function is fixed: an edge contributes its weight iff its two
//! endpoint bits differ. The reference problem instance is a ring over N
//! nodes, but any validated edge list is accepted, so alternative instances
//! are a configuration concern rather than a code change.

use anyhow::bail;

/// A weighted undirected edge between two bit positions.
///
/// Built once from configuration before a session starts. Both endpoints must
/// be distinct and within `[0, total_bits)`; see [`validate_edges`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// First endpoint (bit index).
    pub a: usize,
    /// Second endpoint (bit index).
    pub b: usize,
    /// Edge weight.
    pub weight: f64,
}

impl Edge {
    /// Create an edge between bit positions `a` and `b`.
    pub fn new(a: usize, b: usize, weight: f64) -> Edge {
        Edge { a, b, weight }
    }
}

/// Build the ring instance: edge `i — (i + 1) mod n` for every `i`, all with
/// the same weight.
///
/// The maximum cut of a ring with `n` even and unit weights is exactly `n`,
/// reached by any strict alternating assignment.
pub fn ring_edges(n: usize, weight: f64) -> Vec<Edge> {
    (0..n).map(|i| Edge::new(i, (i + 1) % n, weight)).collect()
}

/// Check that every edge connects two distinct bit positions inside
/// `[0, total_bits)`.
///
/// # Errors
/// Returns an error naming the first offending edge.
pub fn validate_edges(edges: &[Edge], total_bits: usize) -> anyhow::Result<()> {
    for (i, edge) in edges.iter().enumerate() {
        if edge.a == edge.b {
            bail!("edge {i} is a self-loop on node {}", edge.a);
        }
        if edge.a >= total_bits || edge.b >= total_bits {
            bail!(
                "edge {i} ({}, {}) is out of range for {total_bits} bits",
                edge.a,
                edge.b
            );
        }
    }
    Ok(())
}

/// Score a bit assignment against an edge list: the sum of weights of edges
/// whose endpoints hold differing bits.
///
/// Pure and `O(|edges|)`. Endpoints are assumed validated against the bit
/// vector length.
pub fn max_cut_score(bits: &[u8], edges: &[Edge]) -> f64 {
    edges
        .iter()
        .filter(|e| bits[e.a] != bits[e.b])
        .map(|e| e.weight)
        .sum()
}

/// Expand the low `width` bits of a mask into a `0/1` vector, least
/// significant bit first.
pub fn bits_from_mask(mask: u64, width: usize) -> Vec<u8> {
    (0..width).map(|i| ((mask >> i) & 1) as u8).collect()
}
