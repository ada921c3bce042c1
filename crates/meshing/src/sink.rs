use crate::chunk::{MeshChunk, Polyline};
use crate::grid::GridCell;
use crate::instances::{InstanceBatch, InstanceTransform};

/// Consumer of emitted render primitives.
///
/// Everything is handed over by value; the pipeline keeps nothing after a
/// call returns. Turning primitives into scene objects is the sink's job.
pub trait RenderSink {
    fn mesh_chunk(&mut self, chunk: MeshChunk);

    fn polyline(&mut self, line: Polyline);

    fn instance_batch(&mut self, batch: InstanceBatch);

    /// Single placement, used when instance batching is disabled.
    fn placement(&mut self, cell: Option<GridCell>, transform: InstanceTransform);
}

/// Collects everything into vectors in emission order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectSink {
    pub chunks: Vec<MeshChunk>,
    pub polylines: Vec<Polyline>,
    pub batches: Vec<InstanceBatch>,
    pub placements: Vec<(Option<GridCell>, InstanceTransform)>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
            && self.polylines.is_empty()
            && self.batches.is_empty()
            && self.placements.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.chunks.iter().map(|c| c.vertices.len()).sum()
    }
}

impl RenderSink for CollectSink {
    fn mesh_chunk(&mut self, chunk: MeshChunk) {
        self.chunks.push(chunk);
    }

    fn polyline(&mut self, line: Polyline) {
        self.polylines.push(line);
    }

    fn instance_batch(&mut self, batch: InstanceBatch) {
        self.batches.push(batch);
    }

    fn placement(&mut self, cell: Option<GridCell>, transform: InstanceTransform) {
        self.placements.push((cell, transform));
    }
}

impl<S: RenderSink + ?Sized> RenderSink for &mut S {
    fn mesh_chunk(&mut self, chunk: MeshChunk) {
        (**self).mesh_chunk(chunk);
    }

    fn polyline(&mut self, line: Polyline) {
        (**self).polyline(line);
    }

    fn instance_batch(&mut self, batch: InstanceBatch) {
        (**self).instance_batch(batch);
    }

    fn placement(&mut self, cell: Option<GridCell>, transform: InstanceTransform) {
        (**self).placement(cell, transform);
    }
}
