//! Run orchestration: validation, optional grid binning, and emission of
//! chunks, polylines and instance batches into a [`RenderSink`].

use std::collections::VecDeque;
use std::thread::JoinHandle;

use formats::{Feature, Geometry, Polygon, SourceCoordinate};
use runtime::{CancelToken, Event, EventBus, Metrics, MetricsSnapshot, RunControl, Severity, StepBudget};
use tracing::{debug, info};

use crate::chunk::{ChunkBuilder, ChunkOverflow, MeshChunk, Polyline};
use crate::config::{CapacityPolicy, Mode, PipelineConfig};
use crate::crs::CrsTransform;
use crate::error::{PipelineError, kinds};
use crate::grid::{self, CellItem, GridCell, ItemGeometry};
use crate::instances::{InstanceBatcher, Quat};
use crate::reproject::{CacheStats, Reprojector};
use crate::sink::{CollectSink, RenderSink};
use crate::triangulate::{RingRejection, fan_triangles, prepare_ring};

/// Metric names recorded by a run.
pub mod counters {
    pub const FEATURES: &str = "features";
    pub const CELLS: &str = "cells";
    pub const CHUNKS: &str = "chunks";
    pub const CHUNK_VERTICES: &str = "chunk_vertices";
    pub const POLYLINES: &str = "polylines";
    pub const BATCHES: &str = "instance_batches";
    pub const PLACEMENTS: &str = "placements";
    pub const RINGS_SKIPPED: &str = "rings_skipped";
    pub const LINES_SKIPPED: &str = "lines_skipped";
    pub const POLYGONS_OVER_BUDGET: &str = "polygons_over_budget";
    pub const CACHE_HITS: &str = "cache_hits";
    pub const CACHE_MISSES: &str = "cache_misses";
    pub const CACHE_ENTRIES: &str = "cache_entries";
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    BoundingBoxPass,
    Binning,
    PerCellEmission,
    StreamingEmission,
    Done,
    Aborted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub mode: Mode,
    pub features: usize,
    pub cells: usize,
    pub chunks: usize,
    pub polylines: usize,
    pub batches: usize,
    pub placements: usize,
    pub cache: CacheStats,
    pub metrics: MetricsSnapshot,
    pub events: Vec<Event>,
}

impl RunSummary {
    pub fn count_kind(&self, kind: &str) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Pending,
    Done(RunSummary),
}

/// A configured pipeline. Owns the reprojection cache, so runs on one
/// pipeline are exclusive.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    reprojector: Reprojector,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let reprojector = Reprojector::new(&config);
        Ok(Self {
            config,
            reprojector,
        })
    }

    /// Installs a custom source CRS step for translation mode.
    pub fn with_crs(
        config: PipelineConfig,
        crs: Box<dyn CrsTransform>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let reprojector = Reprojector::with_crs(&config, crs);
        Ok(Self {
            config,
            reprojector,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn reprojector(&self) -> &Reprojector {
        &self.reprojector
    }

    /// Runs to completion.
    pub fn run<S: RenderSink + ?Sized>(
        &mut self,
        features: &[Feature],
        sink: &mut S,
    ) -> Result<RunSummary, PipelineError> {
        self.run_with_control(features, sink, RunControl::new())
    }

    pub fn run_with_control<S: RenderSink + ?Sized>(
        &mut self,
        features: &[Feature],
        sink: &mut S,
        control: RunControl,
    ) -> Result<RunSummary, PipelineError> {
        let mut generation = self.begin_with_control(features, control);
        loop {
            if let StepOutcome::Done(summary) = generation.step(sink, StepBudget::unlimited())? {
                return Ok(summary);
            }
        }
    }

    pub fn begin<'a>(&'a mut self, features: &'a [Feature]) -> Generation<'a> {
        self.begin_with_control(features, RunControl::new())
    }

    pub fn begin_with_control<'a>(
        &'a mut self,
        features: &'a [Feature],
        control: RunControl,
    ) -> Generation<'a> {
        let config = &self.config;
        let vertex_budget = config.vertex_budget;
        let [yaw, pitch, roll] = config.instance_rotation_deg;
        let instances = InstanceBatcher::new(config.instance_batch_size)
            .with_rotation(Quat::from_yaw_pitch_roll_deg(yaw, pitch, roll))
            .with_scale(config.instance_scale.map(|s| s as f32));

        Generation {
            pipeline: self,
            features,
            control,
            state: RunState::Idle,
            next_feature: 0,
            cells: VecDeque::new(),
            pending_items: Vec::new(),
            chunks: ChunkBuilder::new(vertex_budget),
            instances,
            next_polyline: 0,
            events: EventBus::new(),
            metrics: Metrics::new(),
            outcome: None,
        }
    }
}

/// A resumable run. Each [`Generation::step`] processes whole units (one
/// feature in stream mode, one cell in grid mode) until its budget runs out.
pub struct Generation<'a> {
    pipeline: &'a Pipeline,
    features: &'a [Feature],
    control: RunControl,
    state: RunState,
    next_feature: usize,
    cells: VecDeque<(GridCell, Vec<CellItem<'a>>)>,
    pending_items: Vec<CellItem<'a>>,
    chunks: ChunkBuilder,
    instances: InstanceBatcher,
    next_polyline: u64,
    events: EventBus,
    metrics: Metrics,
    outcome: Option<Result<RunSummary, PipelineError>>,
}

impl<'a> Generation<'a> {
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Diagnostics recorded so far (drained into the summary on completion).
    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn step<S: RenderSink + ?Sized>(
        &mut self,
        sink: &mut S,
        mut budget: StepBudget,
    ) -> Result<StepOutcome, PipelineError> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone().map(StepOutcome::Done);
        }
        match self.advance(sink, &mut budget) {
            Ok(true) => Ok(StepOutcome::Done(self.finish())),
            Ok(false) => Ok(StepOutcome::Pending),
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Returns `Ok(true)` once every unit has been emitted.
    fn advance<S: RenderSink + ?Sized>(
        &mut self,
        sink: &mut S,
        budget: &mut StepBudget,
    ) -> Result<bool, PipelineError> {
        loop {
            match self.state {
                RunState::Idle => self.start()?,
                RunState::BoundingBoxPass => {
                    self.pending_items = grid::items(self.features)?;
                    self.state = RunState::Binning;
                }
                RunState::Binning => {
                    let items = std::mem::take(&mut self.pending_items);
                    let extent = grid::extent_of(&items);
                    let bins = grid::assign(
                        items,
                        extent,
                        self.pipeline.config.grid_resolution,
                        &mut self.events,
                    );
                    self.metrics.set(counters::CELLS, bins.cells.len() as u64);
                    self.metrics
                        .add(counters::FEATURES, self.features.len() as u64);
                    self.cells = bins.cells.into_iter().collect();
                    self.state = RunState::PerCellEmission;
                }
                RunState::PerCellEmission => {
                    if self.cells.is_empty() {
                        return Ok(true);
                    }
                    if !budget.take_unit() {
                        return Ok(false);
                    }
                    self.control.check()?;
                    if let Some((cell, items)) = self.cells.pop_front() {
                        self.emit_cell(sink, cell, &items)?;
                    }
                }
                RunState::StreamingEmission => {
                    if self.next_feature >= self.features.len() {
                        self.flush_stream(sink);
                        return Ok(true);
                    }
                    if !budget.take_unit() {
                        return Ok(false);
                    }
                    self.control.check()?;
                    let index = self.next_feature;
                    self.emit_feature(sink, index)?;
                    self.next_feature += 1;
                }
                RunState::Done | RunState::Aborted => return Ok(true),
            }
        }
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        self.pipeline.reprojector.clear();
        self.control.check()?;
        validate_features(self.features)?;
        if self.features.is_empty() {
            self.events
                .warn(kinds::MISSING_INPUT, "feature collection is empty");
        }

        let mode = self.pipeline.config.mode;
        info!(features = self.features.len(), ?mode, "generation started");
        self.state = match mode {
            Mode::Grid => RunState::BoundingBoxPass,
            Mode::Stream => RunState::StreamingEmission,
        };
        Ok(())
    }

    fn emit_cell<S: RenderSink + ?Sized>(
        &mut self,
        sink: &mut S,
        cell: GridCell,
        items: &[CellItem<'a>],
    ) -> Result<(), PipelineError> {
        self.chunks.set_cell(Some(cell));
        for item in items {
            self.emit_item(sink, Some(cell), item.feature, item.geometry)?;
        }
        if let Some(chunk) = self.chunks.flush() {
            self.emit_chunk(sink, chunk);
        }
        self.flush_instances(sink, Some(cell));
        debug!(row = cell.row, col = cell.col, items = items.len(), "cell emitted");
        Ok(())
    }

    fn emit_feature<S: RenderSink + ?Sized>(
        &mut self,
        sink: &mut S,
        index: usize,
    ) -> Result<(), PipelineError> {
        let features = self.features;
        self.metrics.inc(counters::FEATURES);
        match &features[index].geometry {
            Geometry::Point(c) => self.emit_item(sink, None, index, ItemGeometry::Point(*c)),
            Geometry::MultiPoint(points) => points
                .iter()
                .try_for_each(|c| self.emit_item(sink, None, index, ItemGeometry::Point(*c))),
            Geometry::LineString(line) => self.emit_item(sink, None, index, ItemGeometry::Line(line)),
            Geometry::MultiLineString(lines) => lines
                .iter()
                .try_for_each(|l| self.emit_item(sink, None, index, ItemGeometry::Line(l))),
            Geometry::Polygon(p) => self.emit_item(sink, None, index, ItemGeometry::Polygon(p)),
            Geometry::MultiPolygon(polygons) => polygons
                .iter()
                .try_for_each(|p| self.emit_item(sink, None, index, ItemGeometry::Polygon(p))),
            Geometry::Unsupported(kind) => Err(PipelineError::UnsupportedGeometry {
                feature: index,
                kind: kind.clone(),
            }),
        }
    }

    fn emit_item<S: RenderSink + ?Sized>(
        &mut self,
        sink: &mut S,
        cell: Option<GridCell>,
        feature: usize,
        geometry: ItemGeometry<'_>,
    ) -> Result<(), PipelineError> {
        match geometry {
            ItemGeometry::Polygon(polygon) => self.emit_polygon(sink, feature, polygon),
            ItemGeometry::Line(line) => {
                self.emit_line(sink, cell, feature, line);
                Ok(())
            }
            ItemGeometry::Point(c) => {
                self.emit_point(sink, cell, c);
                Ok(())
            }
        }
    }

    fn emit_polygon<S: RenderSink + ?Sized>(
        &mut self,
        sink: &mut S,
        feature: usize,
        polygon: &Polygon,
    ) -> Result<(), PipelineError> {
        let ring = match prepare_ring(&polygon.exterior) {
            Ok(ring) => ring,
            Err(RingRejection::TooFewDistinct { distinct }) => {
                self.events.emit(
                    Severity::Debug,
                    kinds::DEGENERATE_RING,
                    format!("feature {feature}: ring has {distinct} distinct vertices, skipped"),
                );
                self.metrics.inc(counters::RINGS_SKIPPED);
                return Ok(());
            }
        };

        let budget = self.chunks.budget();
        if ring.len() > budget {
            return self.over_budget(
                feature,
                ChunkOverflow {
                    vertices: ring.len(),
                    budget,
                },
            );
        }

        let vertices = self.pipeline.reprojector.transform_ring(ring);
        let triangles = fan_triangles(vertices.len());
        match self.chunks.append(&vertices, &triangles) {
            Ok(done) => {
                for chunk in done {
                    self.emit_chunk(sink, chunk);
                }
                Ok(())
            }
            Err(overflow) => self.over_budget(feature, overflow),
        }
    }

    fn over_budget(&mut self, feature: usize, overflow: ChunkOverflow) -> Result<(), PipelineError> {
        let err = PipelineError::CapacityExceeded {
            feature,
            vertices: overflow.vertices,
            budget: overflow.budget,
        };
        match self.pipeline.config.capacity_policy {
            CapacityPolicy::Abort => Err(err),
            CapacityPolicy::Skip => {
                self.events.warn(kinds::CAPACITY_EXCEEDED, format!("{err}; skipped"));
                self.metrics.inc(counters::POLYGONS_OVER_BUDGET);
                Ok(())
            }
        }
    }

    fn emit_line<S: RenderSink + ?Sized>(
        &mut self,
        sink: &mut S,
        cell: Option<GridCell>,
        feature: usize,
        line: &[SourceCoordinate],
    ) {
        if line.len() < 2 {
            self.events.emit(
                Severity::Debug,
                kinds::DEGENERATE_RING,
                format!("feature {feature}: line with {} vertices, skipped", line.len()),
            );
            self.metrics.inc(counters::LINES_SKIPPED);
            return;
        }

        let vertices = self.pipeline.reprojector.transform_ring(line);
        let seq = self.next_polyline;
        self.next_polyline += 1;
        self.metrics.inc(counters::POLYLINES);
        sink.polyline(Polyline {
            seq,
            cell,
            feature,
            vertices,
        });
    }

    fn emit_point<S: RenderSink + ?Sized>(
        &mut self,
        sink: &mut S,
        cell: Option<GridCell>,
        c: SourceCoordinate,
    ) {
        let transform = self.instances.place(self.pipeline.reprojector.transform(c));
        self.metrics.inc(counters::PLACEMENTS);
        if self.pipeline.config.batch_instances {
            self.instances.add(transform);
        } else {
            sink.placement(cell, transform);
        }
    }

    fn emit_chunk<S: RenderSink + ?Sized>(&mut self, sink: &mut S, chunk: MeshChunk) {
        self.metrics.inc(counters::CHUNKS);
        self.metrics
            .record(counters::CHUNK_VERTICES, chunk.vertices.len() as u64);
        sink.mesh_chunk(chunk);
    }

    fn flush_instances<S: RenderSink + ?Sized>(&mut self, sink: &mut S, cell: Option<GridCell>) {
        for batch in self.instances.flush(cell) {
            self.metrics.inc(counters::BATCHES);
            sink.instance_batch(batch);
        }
    }

    fn flush_stream<S: RenderSink + ?Sized>(&mut self, sink: &mut S) {
        if let Some(chunk) = self.chunks.flush() {
            self.emit_chunk(sink, chunk);
        }
        self.flush_instances(sink, None);
    }

    fn record_cache(&mut self) -> CacheStats {
        let cache = self.pipeline.reprojector.stats();
        self.metrics.set(counters::CACHE_HITS, cache.hits);
        self.metrics.set(counters::CACHE_MISSES, cache.computed);
        self.metrics
            .set(counters::CACHE_ENTRIES, cache.entries as u64);
        self.pipeline.reprojector.clear();
        cache
    }

    fn finish(&mut self) -> RunSummary {
        let cache = self.record_cache();
        self.state = RunState::Done;

        let m = &self.metrics;
        let summary = RunSummary {
            mode: self.pipeline.config.mode,
            features: self.features.len(),
            cells: m.counter(counters::CELLS) as usize,
            chunks: m.counter(counters::CHUNKS) as usize,
            polylines: m.counter(counters::POLYLINES) as usize,
            batches: m.counter(counters::BATCHES) as usize,
            placements: m.counter(counters::PLACEMENTS) as usize,
            cache,
            metrics: m.snapshot(),
            events: self.events.drain(),
        };
        info!(
            chunks = summary.chunks,
            polylines = summary.polylines,
            batches = summary.batches,
            cache_entries = cache.entries,
            "generation finished"
        );
        self.outcome = Some(Ok(summary.clone()));
        summary
    }

    fn abort(&mut self, err: PipelineError) -> PipelineError {
        self.record_cache();
        self.state = RunState::Aborted;
        self.events.error(err.kind(), err.to_string());
        self.outcome = Some(Err(err.clone()));
        err
    }
}

impl Drop for Generation<'_> {
    fn drop(&mut self) {
        if !matches!(self.state, RunState::Done | RunState::Aborted) {
            self.pipeline.reprojector.clear();
        }
    }
}

/// Rejects the first unsupported feature. Runs before any emission.
pub fn validate_features(features: &[Feature]) -> Result<(), PipelineError> {
    match features
        .iter()
        .enumerate()
        .find(|(_, f)| !f.geometry.is_supported())
    {
        Some((feature, f)) => Err(PipelineError::UnsupportedGeometry {
            feature,
            kind: f.geometry.kind_name().to_string(),
        }),
        None => Ok(()),
    }
}

#[derive(Debug)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub sink: CollectSink,
}

/// A run executing on its own thread.
#[derive(Debug)]
pub struct RunHandle {
    token: CancelToken,
    handle: JoinHandle<Result<RunOutput, PipelineError>>,
}

impl RunHandle {
    /// Requests cancellation; observed between units.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Blocks until the run completes. Worker panics are resumed here.
    pub fn join(self) -> Result<RunOutput, PipelineError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Offloads a whole run to a worker thread, collecting its output.
pub fn spawn_run(config: PipelineConfig, features: Vec<Feature>, control: RunControl) -> RunHandle {
    let token = control.token().clone();
    let handle = std::thread::spawn(move || -> Result<RunOutput, PipelineError> {
        let mut pipeline = Pipeline::new(config)?;
        let mut sink = CollectSink::new();
        let summary = pipeline.run_with_control(&features, &mut sink, control)?;
        Ok(RunOutput { summary, sink })
    });
    RunHandle { token, handle }
}
