use foundation::math::{Krovak, sjtsk_to_wgs84_with};

use crate::config::SourceCrs;

/// Source CRS -> geographic conversion, run before the tangent-plane step.
///
/// Implementations must be pure: the reprojection cache may call them from
/// several worker threads and keeps whichever result lands first.
pub trait CrsTransform: Send + Sync {
    /// Returns `(lat_deg, lon_deg)`.
    fn to_lat_lon(&self, x: f64, y: f64) -> (f64, f64);

    fn name(&self) -> &str;
}

/// Raw `(x, y)` already are `(lat, lon)`.
#[derive(Debug, Default, Copy, Clone)]
pub struct LatLon;

impl CrsTransform for LatLon {
    fn to_lat_lon(&self, x: f64, y: f64) -> (f64, f64) {
        (x, y)
    }

    fn name(&self) -> &str {
        "lat_lon"
    }
}

/// Raw `(x, y)` are `(lon, lat)`.
#[derive(Debug, Default, Copy, Clone)]
pub struct LonLat;

impl CrsTransform for LonLat {
    fn to_lat_lon(&self, x: f64, y: f64) -> (f64, f64) {
        (y, x)
    }

    fn name(&self) -> &str {
        "lon_lat"
    }
}

/// S-JTSK / Krovak East-North (EPSG:5514) to WGS84.
#[derive(Debug, Copy, Clone)]
pub struct Sjtsk {
    projection: Krovak,
}

impl Default for Sjtsk {
    fn default() -> Self {
        Self {
            projection: Krovak::sjtsk(),
        }
    }
}

impl CrsTransform for Sjtsk {
    fn to_lat_lon(&self, x: f64, y: f64) -> (f64, f64) {
        let wgs = sjtsk_to_wgs84_with(&self.projection, x, y);
        (wgs.lat_deg(), wgs.lon_deg())
    }

    fn name(&self) -> &str {
        "sjtsk"
    }
}

pub fn for_source(crs: SourceCrs) -> Box<dyn CrsTransform> {
    match crs {
        SourceCrs::LatLon => Box::new(LatLon),
        SourceCrs::LonLat => Box::new(LonLat),
        SourceCrs::Sjtsk => Box::new(Sjtsk::default()),
    }
}
