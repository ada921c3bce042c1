//! Vector features to render primitives: cached reprojection, grid binning,
//! vertex-budgeted fan-triangulated chunks, polylines and instance batches.

pub mod chunk;
pub mod config;
pub mod crs;
pub mod error;
pub mod grid;
pub mod instances;
pub mod pipeline;
pub mod reproject;
pub mod sink;
pub mod triangulate;

pub use chunk::{ChunkBuilder, MeshChunk, Polyline};
pub use config::{CapacityPolicy, Mode, PipelineConfig, Projection, SourceCrs, TranslateConfig};
pub use crs::CrsTransform;
pub use error::PipelineError;
pub use grid::{GridBins, GridCell};
pub use instances::{InstanceBatch, InstanceBatcher, InstanceTransform, Quat};
pub use pipeline::{
    Generation, Pipeline, RunHandle, RunOutput, RunState, RunSummary, StepOutcome, spawn_run,
};
pub use reproject::{CacheStats, Reprojector, TargetVertex};
pub use sink::{CollectSink, RenderSink};
