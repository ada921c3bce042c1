use std::collections::HashSet;

use formats::SourceCoordinate;

/// Why a ring produced no triangles.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RingRejection {
    /// Fewer than three distinct positions after the closing vertex is dropped.
    TooFewDistinct { distinct: usize },
}

/// Strips a closing coordinate bitwise equal to the first one.
pub fn open_ring(ring: &[SourceCoordinate]) -> &[SourceCoordinate] {
    match (ring.first(), ring.last()) {
        (Some(first), Some(last)) if ring.len() >= 2 && first == last => &ring[..ring.len() - 1],
        _ => ring,
    }
}

/// Open ring ready for triangulation, or the reason it must be skipped.
pub fn prepare_ring(ring: &[SourceCoordinate]) -> Result<&[SourceCoordinate], RingRejection> {
    let open = open_ring(ring);
    let distinct = distinct_up_to(open, 3);
    if distinct < 3 {
        return Err(RingRejection::TooFewDistinct { distinct });
    }
    Ok(open)
}

fn distinct_up_to(ring: &[SourceCoordinate], limit: usize) -> usize {
    let mut seen = HashSet::new();
    for c in ring {
        seen.insert(*c);
        if seen.len() >= limit {
            break;
        }
    }
    seen.len()
}

/// Fan triangulation of an `n`-vertex ring with vertex 0 as the apex.
///
/// Triangle `i` (for `i` in `1..n-1`) is `(0, i + 1, i)`. Only correct for
/// rings that are star-shaped around vertex 0; holes are not considered.
pub fn fan_triangles(n: usize) -> Vec<[u32; 3]> {
    if n < 3 {
        return Vec::new();
    }
    (1..n - 1)
        .map(|i| [0, (i + 1) as u32, i as u32])
        .collect()
}
