use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const DEFAULT_VERTEX_BUDGET: usize = 65_535;
pub const DEFAULT_INSTANCE_BATCH_SIZE: usize = 1_000;
pub const DEFAULT_GRID_RESOLUTION: u32 = 10;
pub const DEFAULT_PARALLEL_RING_THRESHOLD: usize = 512;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Features are emitted in input order into a single chunk stream.
    Stream,
    /// Features are binned into an N x N grid and emitted cell by cell.
    #[default]
    Grid,
}

/// What to do with a polygon whose ring alone exceeds the vertex budget.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPolicy {
    #[default]
    Abort,
    /// Drop the polygon, record a warning, keep going.
    Skip,
}

/// How source `(x, y)` become latitude/longitude in translation mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceCrs {
    /// `x` is latitude, `y` is longitude (degrees).
    #[default]
    LatLon,
    /// `x` is longitude, `y` is latitude (GeoJSON axis order).
    LonLat,
    /// S-JTSK / Krovak East-North (EPSG:5514) meters.
    Sjtsk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslateConfig {
    pub source_crs: SourceCrs,
    /// Tangent-plane reference `[lat, lon]` in degrees.
    pub reference_lat_lon: [f64; 2],
    /// Target-space `[x, z]` the reference point maps to.
    pub local_origin: [f64; 2],
    pub rotation_deg: f64,
    pub horizontal_scale: f64,
    pub vertical_scale: f64,
    /// Added to the altitude before vertical scaling.
    pub altitude_shift: f64,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            source_crs: SourceCrs::default(),
            reference_lat_lon: [0.0, 0.0],
            local_origin: [0.0, 0.0],
            rotation_deg: 0.0,
            horizontal_scale: 1.0,
            vertical_scale: 1.0,
            altitude_shift: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Projection {
    /// Source CRS -> lat/lon -> local tangent plane.
    Translate(TranslateConfig),
    /// Per-axis scaling of data already in a local Cartesian frame.
    Scale { x: f64, y: f64, z: f64 },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Scale {
            x: 1.0,
            y: 1.0,
            z: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub projection: Projection,
    /// Target Y for coordinates without altitude; also the base added to
    /// scaled altitudes in translation mode.
    pub minimum_height: f64,
    /// Constant target-space offset added to every vertex.
    pub offset: [f64; 3],
    pub mode: Mode,
    pub grid_resolution: u32,
    pub vertex_budget: usize,
    pub instance_batch_size: usize,
    /// When false, points are emitted as individual placements.
    pub batch_instances: bool,
    /// Instance yaw/pitch/roll in degrees.
    pub instance_rotation_deg: [f64; 3],
    pub instance_scale: [f64; 3],
    pub capacity_policy: CapacityPolicy,
    /// Rings at least this long are transformed on the rayon pool.
    pub parallel_ring_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            projection: Projection::default(),
            minimum_height: 0.0,
            offset: [0.0; 3],
            mode: Mode::default(),
            grid_resolution: DEFAULT_GRID_RESOLUTION,
            vertex_budget: DEFAULT_VERTEX_BUDGET,
            instance_batch_size: DEFAULT_INSTANCE_BATCH_SIZE,
            batch_instances: true,
            instance_rotation_deg: [0.0; 3],
            instance_scale: [1.0; 3],
            capacity_policy: CapacityPolicy::default(),
            parallel_ring_threshold: DEFAULT_PARALLEL_RING_THRESHOLD,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(payload: &str) -> Result<Self, PipelineError> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|e| PipelineError::Configuration(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |reason: String| -> Result<(), PipelineError> {
            Err(PipelineError::Configuration(reason))
        };

        if self.grid_resolution == 0 {
            return fail("grid_resolution must be at least 1".to_string());
        }
        if self.vertex_budget < 3 {
            return fail(format!(
                "vertex_budget must be at least 3, got {}",
                self.vertex_budget
            ));
        }
        if self.vertex_budget > u32::MAX as usize {
            return fail(format!(
                "vertex_budget {} does not fit 32-bit indices",
                self.vertex_budget
            ));
        }
        if self.instance_batch_size == 0 {
            return fail("instance_batch_size must be at least 1".to_string());
        }

        let mut numbers: Vec<(&str, f64)> = vec![("minimum_height", self.minimum_height)];
        numbers.extend(self.offset.iter().map(|v| ("offset", *v)));
        numbers.extend(
            self.instance_rotation_deg
                .iter()
                .map(|v| ("instance_rotation_deg", *v)),
        );
        numbers.extend(self.instance_scale.iter().map(|v| ("instance_scale", *v)));
        match &self.projection {
            Projection::Translate(t) => {
                numbers.extend(t.reference_lat_lon.iter().map(|v| ("reference_lat_lon", *v)));
                numbers.extend(t.local_origin.iter().map(|v| ("local_origin", *v)));
                numbers.push(("rotation_deg", t.rotation_deg));
                numbers.push(("horizontal_scale", t.horizontal_scale));
                numbers.push(("vertical_scale", t.vertical_scale));
                numbers.push(("altitude_shift", t.altitude_shift));

                if !(-90.0..=90.0).contains(&t.reference_lat_lon[0]) {
                    return fail(format!(
                        "reference latitude {} out of range",
                        t.reference_lat_lon[0]
                    ));
                }
            }
            Projection::Scale { x, y, z } => {
                numbers.extend([("scale.x", *x), ("scale.y", *y), ("scale.z", *z)]);
            }
        }

        if let Some((name, value)) = numbers.iter().find(|(_, v)| !v.is_finite()) {
            return fail(format!("{name} must be finite, got {value}"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{CapacityPolicy, Mode, PipelineConfig, Projection, SourceCrs};
    use crate::error::PipelineError;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert_eq!(config.vertex_budget, 65_535);
        assert_eq!(config.instance_batch_size, 1_000);
        assert_eq!(config.mode, Mode::Grid);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_json_with_defaults() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "mode": "stream",
                "capacity_policy": "skip",
                "projection": {
                    "kind": "translate",
                    "source_crs": "sjtsk",
                    "reference_lat_lon": [50.08, 14.42],
                    "rotation_deg": 45
                }
            }"#,
        )
        .expect("config");

        assert_eq!(config.mode, Mode::Stream);
        assert_eq!(config.capacity_policy, CapacityPolicy::Skip);
        let Projection::Translate(t) = &config.projection else {
            panic!("expected translate projection");
        };
        assert_eq!(t.source_crs, SourceCrs::Sjtsk);
        assert_eq!(t.horizontal_scale, 1.0);
        assert_eq!(t.rotation_deg, 45.0);
        assert_eq!(config.grid_resolution, 10);
    }

    #[test]
    fn rejects_zero_sizes() {
        let config = PipelineConfig {
            grid_resolution: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));

        let config = PipelineConfig {
            instance_batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            vertex_budget: 2,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_finite_numbers() {
        let config = PipelineConfig {
            projection: Projection::Scale {
                x: 1.0,
                y: f64::NAN,
                z: 1.0,
            },
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scale.y"), "{err}");
    }
}
