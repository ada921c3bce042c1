/// WGS84 semi-major axis (meters).
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// Bessel 1841 semi-major axis (meters).
pub const BESSEL_A: f64 = 6_377_397.155;
/// Bessel 1841 flattening.
pub const BESSEL_F: f64 = 1.0 / 299.152_812_8;

/// Mean Earth radius used by the spherical tangent-plane projection (meters).
pub const MEAN_EARTH_RADIUS: f64 = 6_371_000.0;

/// Earth-centered, Earth-fixed coordinates (meters) on some datum.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ecef {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Ecef {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Reference ellipsoid given by semi-major axis and flattening.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ellipsoid {
    pub a: f64,
    pub f: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid {
        a: WGS84_A,
        f: WGS84_F,
    };

    pub const BESSEL_1841: Ellipsoid = Ellipsoid {
        a: BESSEL_A,
        f: BESSEL_F,
    };

    /// Semi-minor axis.
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared.
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// Second eccentricity squared.
    pub fn ep2(&self) -> f64 {
        let b = self.b();
        (self.a * self.a - b * b) / (b * b)
    }
}

/// Geodetic coordinates in radians and meters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geodetic {
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub alt_m: f64,
}

impl Geodetic {
    pub fn new(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Self {
        Self {
            lat_rad,
            lon_rad,
            alt_m,
        }
    }

    pub fn from_degrees(lat_deg: f64, lon_deg: f64, alt_m: f64) -> Self {
        Self::new(lat_deg.to_radians(), lon_deg.to_radians(), alt_m)
    }

    pub fn lat_deg(&self) -> f64 {
        self.lat_rad.to_degrees()
    }

    pub fn lon_deg(&self) -> f64 {
        self.lon_rad.to_degrees()
    }
}

pub fn geodetic_to_ecef(geo: Geodetic) -> Ecef {
    geodetic_to_ecef_on(Ellipsoid::WGS84, geo)
}

pub fn ecef_to_geodetic(ecef: Ecef) -> Geodetic {
    ecef_to_geodetic_on(Ellipsoid::WGS84, ecef)
}

pub fn geodetic_to_ecef_on(ellipsoid: Ellipsoid, geo: Geodetic) -> Ecef {
    let e2 = ellipsoid.e2();
    let sin_lat = geo.lat_rad.sin();
    let cos_lat = geo.lat_rad.cos();
    let sin_lon = geo.lon_rad.sin();
    let cos_lon = geo.lon_rad.cos();

    let n = ellipsoid.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let x = (n + geo.alt_m) * cos_lat * cos_lon;
    let y = (n + geo.alt_m) * cos_lat * sin_lon;
    let z = (n * (1.0 - e2) + geo.alt_m) * sin_lat;

    Ecef::new(x, y, z)
}

/// Bowring's closed-form inverse; sub-millimeter for terrestrial heights.
pub fn ecef_to_geodetic_on(ellipsoid: Ellipsoid, ecef: Ecef) -> Geodetic {
    let a = ellipsoid.a;
    let b = ellipsoid.b();
    let e2 = ellipsoid.e2();
    let ep2 = ellipsoid.ep2();

    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();
    let lon = ecef.y.atan2(ecef.x);

    let theta = (ecef.z * a).atan2(p * b);
    let sin_theta = theta.sin();
    let cos_theta = theta.cos();

    let lat = (ecef.z + ep2 * b * sin_theta * sin_theta * sin_theta)
        .atan2(p - e2 * a * cos_theta * cos_theta * cos_theta);

    let sin_lat = lat.sin();
    let n = a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let alt = p / lat.cos() - n;

    Geodetic::new(lat, lon, alt)
}

/// Seven-parameter Helmert datum shift, position-vector convention
/// (the convention of WKT `TOWGS84[dx,dy,dz,rx,ry,rz,ds]`).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Helmert {
    /// Translations (meters).
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    /// Rotations (arc-seconds).
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
    /// Scale correction (parts per million).
    pub ds_ppm: f64,
}

impl Helmert {
    /// S-JTSK (Bessel 1841) to WGS84.
    pub const SJTSK_TO_WGS84: Helmert = Helmert {
        dx: 485.021,
        dy: 169.465,
        dz: 483.839,
        rx: 7.786_342,
        ry: 4.397_094,
        rz: 4.102_655,
        ds_ppm: 0.0,
    };

    pub fn apply(&self, p: Ecef) -> Ecef {
        const ARCSEC: f64 = std::f64::consts::PI / (180.0 * 3600.0);
        let rx = self.rx * ARCSEC;
        let ry = self.ry * ARCSEC;
        let rz = self.rz * ARCSEC;
        let m = 1.0 + self.ds_ppm * 1e-6;

        Ecef::new(
            self.dx + m * (p.x - rz * p.y + ry * p.z),
            self.dy + m * (rz * p.x + p.y - rx * p.z),
            self.dz + m * (-ry * p.x + rx * p.y + p.z),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Ecef, Ellipsoid, Geodetic, Helmert, WGS84_A, ecef_to_geodetic, ecef_to_geodetic_on,
        geodetic_to_ecef, geodetic_to_ecef_on,
    };

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn geodetic_to_ecef_equator_prime_meridian() {
        let ecef = geodetic_to_ecef(Geodetic::new(0.0, 0.0, 0.0));
        assert_close(ecef.x, WGS84_A, 1e-6);
        assert_close(ecef.y, 0.0, 1e-6);
        assert_close(ecef.z, 0.0, 1e-6);
    }

    #[test]
    fn round_trip_wgs84() {
        let geo = Geodetic::new(
            std::f64::consts::FRAC_PI_6,
            -std::f64::consts::FRAC_PI_3,
            120.0,
        );
        let geo_rt = ecef_to_geodetic(geodetic_to_ecef(geo));
        assert_close(geo_rt.lat_rad, geo.lat_rad, 1e-9);
        assert_close(geo_rt.lon_rad, geo.lon_rad, 1e-9);
        assert_close(geo_rt.alt_m, geo.alt_m, 1e-6);
    }

    #[test]
    fn round_trip_bessel() {
        let geo = Geodetic::from_degrees(50.2, 16.85, 300.0);
        let ecef = geodetic_to_ecef_on(Ellipsoid::BESSEL_1841, geo);
        let geo_rt = ecef_to_geodetic_on(Ellipsoid::BESSEL_1841, ecef);
        assert_close(geo_rt.lat_rad, geo.lat_rad, 1e-9);
        assert_close(geo_rt.lon_rad, geo.lon_rad, 1e-9);
        assert_close(geo_rt.alt_m, geo.alt_m, 1e-4);
    }

    #[test]
    fn helmert_identity_is_noop() {
        let h = Helmert {
            dx: 0.0,
            dy: 0.0,
            dz: 0.0,
            rx: 0.0,
            ry: 0.0,
            rz: 0.0,
            ds_ppm: 0.0,
        };
        let p = Ecef::new(4_000_000.0, 1_000_000.0, 4_800_000.0);
        assert_eq!(h.apply(p), p);
    }

    #[test]
    fn sjtsk_shift_moves_points_by_hundreds_of_meters() {
        let p = geodetic_to_ecef_on(
            Ellipsoid::BESSEL_1841,
            Geodetic::from_degrees(50.0, 14.5, 0.0),
        );
        let q = Helmert::SJTSK_TO_WGS84.apply(p);
        let d = ((q.x - p.x).powi(2) + (q.y - p.y).powi(2) + (q.z - p.z).powi(2)).sqrt();
        assert!(d > 600.0 && d < 850.0, "shift {d}");
    }
}
