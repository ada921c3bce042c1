use foundation::Aabb3;
use serde::Serialize;

use crate::grid::GridCell;
use crate::reproject::TargetVertex;

/// A vertex-budgeted triangle mesh chunk with chunk-local indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeshChunk {
    pub seq: u64,
    pub cell: Option<GridCell>,
    pub vertices: Vec<TargetVertex>,
    pub indices: Vec<u32>,
    pub bounds: Aabb3,
}

impl MeshChunk {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polyline {
    pub seq: u64,
    pub cell: Option<GridCell>,
    pub feature: usize,
    pub vertices: Vec<TargetVertex>,
}

/// A ring that can never fit a chunk.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChunkOverflow {
    pub vertices: usize,
    pub budget: usize,
}

/// Accumulates triangulated rings into chunks of at most `budget` vertices.
///
/// Sequence ids increase across the whole run, including across grid cells.
#[derive(Debug)]
pub struct ChunkBuilder {
    budget: usize,
    next_seq: u64,
    cell: Option<GridCell>,
    vertices: Vec<TargetVertex>,
    indices: Vec<u32>,
    bounds: Aabb3,
}

impl ChunkBuilder {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            next_seq: 0,
            cell: None,
            vertices: Vec::new(),
            indices: Vec::new(),
            bounds: Aabb3::empty(),
        }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn pending_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Cell stamped on subsequent chunks. Callers flush before switching.
    pub fn set_cell(&mut self, cell: Option<GridCell>) {
        debug_assert!(self.vertices.is_empty(), "chunk would span two cells");
        self.cell = cell;
    }

    /// Appends one ring and its ring-local triangles.
    ///
    /// Returns the chunks completed by this call: the previous chunk when the
    /// ring does not fit beside it, and the new chunk when it ends up exactly
    /// full. A ring larger than the budget is rejected and nothing changes.
    pub fn append(
        &mut self,
        ring: &[TargetVertex],
        triangles: &[[u32; 3]],
    ) -> Result<Vec<MeshChunk>, ChunkOverflow> {
        if ring.len() > self.budget {
            return Err(ChunkOverflow {
                vertices: ring.len(),
                budget: self.budget,
            });
        }

        let mut done = Vec::new();
        if self.vertices.len() + ring.len() > self.budget {
            done.extend(self.flush());
        }

        let base = self.vertices.len() as u32;
        for v in ring {
            self.bounds
                .extend([v.x as f64, v.y as f64, v.z as f64]);
        }
        self.vertices.extend_from_slice(ring);
        for tri in triangles {
            debug_assert!(tri.iter().all(|&i| (i as usize) < ring.len()));
            self.indices.extend(tri.iter().map(|i| base + i));
        }

        if self.vertices.len() == self.budget {
            done.extend(self.flush());
        }
        Ok(done)
    }

    /// Emits the pending remainder, if any.
    pub fn flush(&mut self) -> Option<MeshChunk> {
        if self.vertices.is_empty() {
            return None;
        }
        let chunk = MeshChunk {
            seq: self.next_seq,
            cell: self.cell,
            vertices: std::mem::take(&mut self.vertices),
            indices: std::mem::take(&mut self.indices),
            bounds: std::mem::replace(&mut self.bounds, Aabb3::empty()),
        };
        self.next_seq += 1;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use foundation::Aabb3;
    use pretty_assertions::assert_eq;

    use super::{ChunkBuilder, ChunkOverflow};
    use crate::grid::GridCell;
    use crate::reproject::TargetVertex;
    use crate::triangulate::fan_triangles;

    fn ring(n: usize, x: f32) -> Vec<TargetVertex> {
        (0..n)
            .map(|i| TargetVertex::new(x, 0.0, i as f32))
            .collect()
    }

    #[test]
    fn offsets_indices_by_accumulated_vertices() {
        let mut builder = ChunkBuilder::new(100);
        assert!(builder.append(&ring(4, 0.0), &fan_triangles(4)).unwrap().is_empty());
        assert!(builder.append(&ring(3, 1.0), &fan_triangles(3)).unwrap().is_empty());

        let chunk = builder.flush().expect("chunk");
        assert_eq!(chunk.seq, 0);
        assert_eq!(chunk.vertices.len(), 7);
        assert_eq!(chunk.indices, vec![0, 2, 1, 0, 3, 2, 4, 6, 5]);
        assert_eq!(chunk.bounds, Aabb3::new([0.0, 0.0, 0.0], [1.0, 0.0, 3.0]));
        assert!(builder.flush().is_none());
    }

    #[test]
    fn flushes_before_a_ring_that_would_overflow() {
        let mut builder = ChunkBuilder::new(10);
        builder.append(&ring(6, 0.0), &fan_triangles(6)).unwrap();
        let done = builder.append(&ring(6, 1.0), &fan_triangles(6)).unwrap();

        assert_eq!(done.len(), 1);
        assert_eq!(done[0].vertices.len(), 6);
        assert_eq!(builder.pending_vertices(), 6);
        let rest = builder.flush().expect("rest");
        assert_eq!(rest.seq, 1);
        assert_eq!(rest.indices[..3], [0, 2, 1]);
    }

    #[test]
    fn exactly_full_chunk_flushes_immediately() {
        let mut builder = ChunkBuilder::new(10);
        builder.append(&ring(4, 0.0), &fan_triangles(4)).unwrap();
        let done = builder.append(&ring(6, 1.0), &fan_triangles(6)).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].vertices.len(), 10);
        assert_eq!(builder.pending_vertices(), 0);

        // Both flush paths in one call.
        builder.append(&ring(3, 0.0), &fan_triangles(3)).unwrap();
        let done = builder.append(&ring(10, 2.0), &fan_triangles(10)).unwrap();
        assert_eq!(
            done.iter().map(|c| (c.seq, c.vertices.len())).collect::<Vec<_>>(),
            vec![(1, 3), (2, 10)]
        );
    }

    #[test]
    fn oversized_ring_is_rejected_untouched() {
        let mut builder = ChunkBuilder::new(65_535);
        builder.append(&ring(3, 0.0), &fan_triangles(3)).unwrap();
        let err = builder
            .append(&ring(70_000, 0.0), &fan_triangles(70_000))
            .unwrap_err();
        assert_eq!(
            err,
            ChunkOverflow {
                vertices: 70_000,
                budget: 65_535
            }
        );
        assert_eq!(builder.pending_vertices(), 3);
    }

    #[test]
    fn chunks_carry_the_current_cell() {
        let mut builder = ChunkBuilder::new(16);
        builder.set_cell(Some(GridCell::new(3, 1)));
        builder.append(&ring(3, 0.0), &fan_triangles(3)).unwrap();
        let chunk = builder.flush().expect("chunk");
        assert_eq!(chunk.cell, Some(GridCell::new(3, 1)));

        builder.set_cell(None);
        builder.append(&ring(3, 0.0), &fan_triangles(3)).unwrap();
        assert_eq!(builder.flush().expect("chunk").cell, None);
    }

    #[test]
    fn budget_holds_over_many_rings() {
        let mut builder = ChunkBuilder::new(50);
        let mut chunks = Vec::new();
        for n in (3..40).cycle().take(200) {
            chunks.extend(builder.append(&ring(n, 0.0), &fan_triangles(n)).unwrap());
        }
        chunks.extend(builder.flush());
        assert!(chunks.iter().all(|c| c.vertices.len() <= 50));
        assert!(chunks.iter().all(|c| c.indices.iter().all(|&i| (i as usize) < c.vertices.len())));
        let seqs: Vec<u64> = chunks.iter().map(|c| c.seq).collect();
        assert_eq!(seqs, (0..chunks.len() as u64).collect::<Vec<_>>());
    }
}
