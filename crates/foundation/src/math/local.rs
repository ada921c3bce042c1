use super::{MEAN_EARTH_RADIUS, Vec2};

/// Spherical tangent-plane (orthographic) projection around a reference point.
///
/// `project` maps latitude/longitude (degrees) to planar `(east, north)` offsets
/// in meters from the reference; `unproject` is its exact inverse on the
/// visible hemisphere. Good for small-extent local scenes; distortion grows
/// with distance from the reference.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TangentPlane {
    lat0_rad: f64,
    lon0_rad: f64,
    radius: f64,
}

impl TangentPlane {
    pub fn new(ref_lat_deg: f64, ref_lon_deg: f64) -> Self {
        Self::with_radius(ref_lat_deg, ref_lon_deg, MEAN_EARTH_RADIUS)
    }

    pub fn with_radius(ref_lat_deg: f64, ref_lon_deg: f64, radius: f64) -> Self {
        Self {
            lat0_rad: ref_lat_deg.to_radians(),
            lon0_rad: ref_lon_deg.to_radians(),
            radius,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn project(&self, lat_deg: f64, lon_deg: f64) -> Vec2 {
        let lat = lat_deg.to_radians();
        let d_lon = lon_deg.to_radians() - self.lon0_rad;

        let east = self.radius * lat.cos() * d_lon.sin();
        let north = self.radius
            * (self.lat0_rad.cos() * lat.sin() - self.lat0_rad.sin() * lat.cos() * d_lon.cos());
        Vec2::new(east, north)
    }

    /// Returns `(lat_deg, lon_deg)`.
    pub fn unproject(&self, en: Vec2) -> (f64, f64) {
        let rho = (en.x * en.x + en.y * en.y).sqrt();
        if rho == 0.0 {
            return (self.lat0_rad.to_degrees(), self.lon0_rad.to_degrees());
        }

        let c = (rho / self.radius).clamp(-1.0, 1.0).asin();
        let (sin_c, cos_c) = c.sin_cos();
        let (sin_lat0, cos_lat0) = self.lat0_rad.sin_cos();

        let lat = (cos_c * sin_lat0 + en.y * sin_c * cos_lat0 / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lon = self.lon0_rad
            + (en.x * sin_c).atan2(rho * cos_c * cos_lat0 - en.y * sin_c * sin_lat0);
        (lat.to_degrees(), lon.to_degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::TangentPlane;
    use crate::math::Vec2;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn reference_point_maps_to_origin() {
        let plane = TangentPlane::new(49.2, 16.6);
        let en = plane.project(49.2, 16.6);
        assert_close(en.x, 0.0, 1e-9);
        assert_close(en.y, 0.0, 1e-9);
    }

    #[test]
    fn north_and_east_have_expected_signs() {
        let plane = TangentPlane::new(0.0, 0.0);
        let north = plane.project(0.001, 0.0);
        let east = plane.project(0.0, 0.001);
        assert!(north.y > 0.0 && north.x.abs() < 1e-9);
        assert!(east.x > 0.0 && east.y.abs() < 1e-9);
        // R * sin(0.001 deg) on the mean sphere.
        assert_close(north.y, 111.194_926_638_913_43, 1e-6);
    }

    #[test]
    fn unproject_inverts_project() {
        let plane = TangentPlane::new(50.08, 14.42);
        let (lat, lon) = plane.unproject(plane.project(50.1, 14.35));
        assert_close(lat, 50.1, 1e-9);
        assert_close(lon, 14.35, 1e-9);

        let (lat0, lon0) = plane.unproject(Vec2::new(0.0, 0.0));
        assert_close(lat0, 50.08, 1e-12);
        assert_close(lon0, 14.42, 1e-12);
    }
}
