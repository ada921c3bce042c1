//! File-level driver for the mesher: GeoJSON in, JSON primitives plus a
//! blake3 `manifest.json` out.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use formats::{FeatureCollection, OutputKind, OutputManifest};
use meshing::{
    GridCell, InstanceBatch, InstanceTransform, MeshChunk, Pipeline, PipelineConfig, Polyline,
    RenderSink, RunSummary,
};
use serde::Serialize;
use tracing::{info, warn};

pub const CHUNK_DIR: &str = "chunks";
pub const POLYLINE_DIR: &str = "polylines";
pub const INSTANCE_DIR: &str = "instances";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub input: PathBuf,
    pub out_dir: PathBuf,
    pub config: PipelineConfig,
    pub name: Option<String>,
}

#[derive(Debug)]
pub struct BuildReport {
    pub summary: RunSummary,
    pub manifest: OutputManifest,
}

pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig, String> {
    match path {
        Some(path) => {
            let payload =
                fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
            PipelineConfig::from_json_str(&payload).map_err(|e| format!("{path:?}: {e}"))
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn load_features(input: &Path) -> Result<(FeatureCollection, String), String> {
    let bytes = fs::read(input).map_err(|e| format!("read {input:?}: {e}"))?;
    let source_hash = blake3::hash(&bytes).to_hex().to_string();
    let text = std::str::from_utf8(&bytes).map_err(|e| format!("utf8: {e}"))?;
    let collection =
        FeatureCollection::from_geojson_str(text).map_err(|e| format!("parse geojson: {e}"))?;
    if collection.null_geometries > 0 {
        warn!(
            dropped = collection.null_geometries,
            "features without geometry were dropped"
        );
    }
    Ok((collection, source_hash))
}

pub fn build(opts: &BuildOptions) -> Result<BuildReport, String> {
    let (collection, source_hash) = load_features(&opts.input)?;
    let mut pipeline = Pipeline::new(opts.config.clone()).map_err(|e| e.to_string())?;

    fs::create_dir_all(&opts.out_dir).map_err(|e| format!("create {:?}: {e}", opts.out_dir))?;
    let mut sink = ManifestSink::new(&opts.out_dir, opts.name.clone());
    let summary = pipeline
        .run(&collection.features, &mut sink)
        .map_err(|e| e.to_string())?;

    let mut manifest = sink.finish()?;
    manifest.source_hash = Some(source_hash);
    manifest.compute_and_set_identity();
    manifest.write(&opts.out_dir).map_err(|e| e.to_string())?;

    info!(
        entries = manifest.entries.len(),
        content_hash = manifest.content_hash.as_deref().unwrap_or_default(),
        "manifest written"
    );
    Ok(BuildReport { summary, manifest })
}

/// Human-readable geometry counts and source extent of a GeoJSON file.
pub fn inspect(input: &Path) -> Result<String, String> {
    let (collection, source_hash) = load_features(input)?;
    let stats = collection.stats();

    let extent = match stats.extent {
        Some(b) => format!("[{}, {}] .. [{}, {}]", b.min[0], b.min[1], b.max[0], b.max[1]),
        None => "(empty)".to_string(),
    };
    let rows = [
        ("source", input.display().to_string()),
        ("blake3", source_hash),
        ("features", collection.features.len().to_string()),
        ("points", stats.points.to_string()),
        ("lines", stats.lines.to_string()),
        ("polygons", stats.polygons.to_string()),
        ("unsupported", stats.unsupported.to_string()),
        ("null_geometries", collection.null_geometries.to_string()),
        ("coordinates", stats.coordinates.to_string()),
        ("extent", extent),
    ];

    let mut out = String::new();
    for (key, value) in rows {
        out.push_str(&format!("{key}: {value}\n"));
    }
    Ok(out)
}

type CellKey = Option<GridCell>;

/// Writes every primitive as a JSON file and indexes it in a manifest.
///
/// Chunks and batches are written as they arrive; polylines and unbatched
/// placements are grouped per cell and written by [`ManifestSink::finish`].
/// The first I/O failure is kept and reported by `finish`.
pub struct ManifestSink {
    dir: PathBuf,
    manifest: OutputManifest,
    polylines: BTreeMap<CellKey, Vec<Polyline>>,
    placements: BTreeMap<CellKey, Vec<InstanceTransform>>,
    error: Option<String>,
}

impl ManifestSink {
    pub fn new(dir: impl Into<PathBuf>, name: Option<String>) -> Self {
        Self {
            dir: dir.into(),
            manifest: OutputManifest::new(name),
            polylines: BTreeMap::new(),
            placements: BTreeMap::new(),
            error: None,
        }
    }

    fn write<T: Serialize>(
        &mut self,
        id: String,
        kind: OutputKind,
        subdir: &str,
        value: &T,
        cell: CellKey,
        element_count: usize,
    ) {
        if self.error.is_some() {
            return;
        }
        let rel = format!("{subdir}/{id}.json");
        let result = serde_json::to_vec(value)
            .map_err(|e| format!("json: {e}"))
            .and_then(|payload| {
                let path = self.dir.join(&rel);
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).map_err(|e| format!("create {parent:?}: {e}"))?;
                }
                fs::write(&path, &payload).map_err(|e| format!("write {path:?}: {e}"))?;
                Ok(payload)
            });
        match result {
            Ok(payload) => {
                self.manifest.push(
                    id,
                    kind,
                    rel,
                    &payload,
                    cell.map(GridCell::as_array),
                    element_count as u32,
                );
            }
            Err(e) => self.error = Some(e),
        }
    }

    pub fn finish(mut self) -> Result<OutputManifest, String> {
        for (cell, lines) in std::mem::take(&mut self.polylines) {
            let count = lines.iter().map(|l| l.vertices.len()).sum();
            self.write(
                format!("polylines_{}", cell_suffix(cell)),
                OutputKind::Polylines,
                POLYLINE_DIR,
                &lines,
                cell,
                count,
            );
        }
        for (cell, transforms) in std::mem::take(&mut self.placements) {
            let count = transforms.len();
            self.write(
                format!("placements_{}", cell_suffix(cell)),
                OutputKind::Placements,
                INSTANCE_DIR,
                &transforms,
                cell,
                count,
            );
        }
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.manifest),
        }
    }
}

fn cell_suffix(cell: CellKey) -> String {
    match cell {
        Some(c) => format!("{}_{}", c.col, c.row),
        None => "all".to_string(),
    }
}

impl RenderSink for ManifestSink {
    fn mesh_chunk(&mut self, chunk: MeshChunk) {
        let count = chunk.vertices.len();
        self.write(
            format!("chunk_{:05}", chunk.seq),
            OutputKind::MeshChunk,
            CHUNK_DIR,
            &chunk,
            chunk.cell,
            count,
        );
    }

    fn polyline(&mut self, line: Polyline) {
        self.polylines.entry(line.cell).or_default().push(line);
    }

    fn instance_batch(&mut self, batch: InstanceBatch) {
        let count = batch.transforms.len();
        self.write(
            format!("batch_{}_{:04}", cell_suffix(batch.cell), batch.seq),
            OutputKind::InstanceBatch,
            INSTANCE_DIR,
            &batch,
            batch.cell,
            count,
        );
    }

    fn placement(&mut self, cell: Option<GridCell>, transform: InstanceTransform) {
        self.placements.entry(cell).or_default().push(transform);
    }
}
