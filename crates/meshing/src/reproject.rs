use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use formats::SourceCoordinate;
use foundation::math::{TangentPlane, Vec2, Vec3};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{PipelineConfig, Projection};
use crate::crs::{self, CrsTransform};

/// A render-ready vertex in local engine space (Y up).
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize)]
pub struct TargetVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl TargetVertex {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The single `f64` -> `f32` narrowing point of the pipeline.
    pub fn from_high(v: Vec3) -> Self {
        Self::new(v.x as f32, v.y as f32, v.z as f32)
    }

    pub fn to_high(self) -> Vec3 {
        Vec3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    pub fn bits(self) -> [u32; 3] {
        [self.x.to_bits(), self.y.to_bits(), self.z.to_bits()]
    }
}

enum Mapping {
    Translate {
        crs: Box<dyn CrsTransform>,
        plane: TangentPlane,
        origin: Vec2,
        rotation_rad: f64,
        horizontal_scale: f64,
        vertical_scale: f64,
        altitude_shift: f64,
    },
    Scale {
        x: f64,
        y: f64,
        z: f64,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    /// Transform evaluations, including benign races on the same key.
    pub computed: u64,
}

/// Source -> target coordinate transform with a concurrent memo cache.
///
/// Bitwise-identical source coordinates always resolve to the value that was
/// inserted first, so shared ring vertices weld exactly. The underlying
/// mapping is pure; concurrent first accesses may both compute, but only one
/// result is ever stored and returned.
pub struct Reprojector {
    mapping: Mapping,
    minimum_height: f64,
    offset: Vec3,
    parallel_threshold: usize,
    cache: DashMap<SourceCoordinate, TargetVertex>,
    hits: AtomicU64,
    computed: AtomicU64,
}

impl Reprojector {
    pub fn new(config: &PipelineConfig) -> Self {
        let crs = match &config.projection {
            Projection::Translate(t) => crs::for_source(t.source_crs),
            Projection::Scale { .. } => crs::for_source(Default::default()),
        };
        Self::with_crs(config, crs)
    }

    /// Like [`Reprojector::new`] but with a caller-supplied source CRS step.
    /// Ignored in scale mode.
    pub fn with_crs(config: &PipelineConfig, crs: Box<dyn CrsTransform>) -> Self {
        let mapping = match &config.projection {
            Projection::Translate(t) => Mapping::Translate {
                crs,
                plane: TangentPlane::new(t.reference_lat_lon[0], t.reference_lat_lon[1]),
                origin: Vec2::new(t.local_origin[0], t.local_origin[1]),
                rotation_rad: t.rotation_deg.to_radians(),
                horizontal_scale: t.horizontal_scale,
                vertical_scale: t.vertical_scale,
                altitude_shift: t.altitude_shift,
            },
            Projection::Scale { x, y, z } => Mapping::Scale {
                x: *x,
                y: *y,
                z: *z,
            },
        };

        Self {
            mapping,
            minimum_height: config.minimum_height,
            offset: Vec3::new(config.offset[0], config.offset[1], config.offset[2]),
            parallel_threshold: config.parallel_ring_threshold.max(1),
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
            computed: AtomicU64::new(0),
        }
    }

    /// Uncached transform.
    pub fn project(&self, c: SourceCoordinate) -> TargetVertex {
        let local = match &self.mapping {
            Mapping::Translate {
                crs,
                plane,
                origin,
                rotation_rad,
                horizontal_scale,
                vertical_scale,
                altitude_shift,
            } => {
                let (lat, lon) = crs.to_lat_lon(c.x, c.y);
                let turned = plane.project(lat, lon).rotated(*rotation_rad);
                // Target Z grows southward: north maps to -z.
                let x = turned.x * horizontal_scale + origin.x;
                let z = -turned.y * horizontal_scale + origin.y;
                let y = if c.has_z() {
                    (c.z + altitude_shift) * vertical_scale + self.minimum_height
                } else {
                    self.minimum_height
                };
                Vec3::new(x, y, z)
            }
            Mapping::Scale { x, y, z } => {
                let up = if c.has_z() {
                    c.z * z
                } else {
                    self.minimum_height
                };
                Vec3::new(c.x * x, up, c.y * y)
            }
        };
        TargetVertex::from_high(local + self.offset)
    }

    /// Cached transform (linearizable get-or-insert).
    pub fn transform(&self, c: SourceCoordinate) -> TargetVertex {
        if let Some(hit) = self.cache.get(&c) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return *hit;
        }

        let fresh = self.project(c);
        self.computed.fetch_add(1, Ordering::Relaxed);
        *self.cache.entry(c).or_insert(fresh)
    }

    /// Transforms a whole ring; long rings fan out over the rayon pool and
    /// join before returning. Output order matches input order.
    pub fn transform_ring(&self, coords: &[SourceCoordinate]) -> Vec<TargetVertex> {
        if coords.len() >= self.parallel_threshold {
            coords.par_iter().map(|c| self.transform(*c)).collect()
        } else {
            coords.iter().map(|c| self.transform(*c)).collect()
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.computed.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            hits: self.hits.load(Ordering::Relaxed),
            computed: self.computed.load(Ordering::Relaxed),
        }
    }

    /// Inverse of the horizontal translation-mode mapping: target `(x, z)` to
    /// `(lat_deg, lon_deg)`. `None` in scale mode.
    pub fn local_to_lat_lon(&self, x: f64, z: f64) -> Option<(f64, f64)> {
        let Mapping::Translate {
            plane,
            origin,
            rotation_rad,
            horizontal_scale,
            ..
        } = &self.mapping
        else {
            return None;
        };
        if *horizontal_scale == 0.0 {
            return None;
        }

        let turned = Vec2::new(
            (x - self.offset.x - origin.x) / horizontal_scale,
            -(z - self.offset.z - origin.y) / horizontal_scale,
        );
        Some(plane.unproject(turned.rotated(-rotation_rad)))
    }

    /// Inverse of the vertical mapping. `None` when the vertical scale is zero.
    pub fn target_y_to_altitude(&self, y: f64) -> Option<f64> {
        let (scale, shift) = match &self.mapping {
            Mapping::Translate {
                vertical_scale,
                altitude_shift,
                ..
            } => (*vertical_scale, *altitude_shift),
            Mapping::Scale { z, .. } => (*z, 0.0),
        };
        if scale == 0.0 {
            return None;
        }
        let base = match self.mapping {
            Mapping::Translate { .. } => self.minimum_height,
            Mapping::Scale { .. } => 0.0,
        };
        Some((y - self.offset.y - base) / scale - shift)
    }
}

impl std::fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.mapping {
            Mapping::Translate { crs, .. } => format!("translate({})", crs.name()),
            Mapping::Scale { .. } => "scale".to_string(),
        };
        f.debug_struct("Reprojector")
            .field("mode", &mode)
            .field("stats", &self.stats())
            .finish()
    }
}
