//! Krovak oblique conformal conic projection (EPSG method 9819) and the
//! S-JTSK East-North variant (EPSG:5514) used by Czech and Slovak cadastral data.

use std::f64::consts::FRAC_PI_4;

use super::{Ellipsoid, Geodetic, Helmert, ecef_to_geodetic_on, geodetic_to_ecef_on};

const LATITUDE_ITERATIONS: usize = 16;

/// Projection parameters plus the derived constants of the EPSG formulas.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Krovak {
    ellipsoid: Ellipsoid,
    lon0: f64,
    alpha_c: f64,
    phi_p: f64,
    false_easting: f64,
    false_northing: f64,
    e: f64,
    b: f64,
    t0: f64,
    n: f64,
    r0: f64,
}

impl Krovak {
    pub fn new(
        ellipsoid: Ellipsoid,
        lat_center_deg: f64,
        lon_origin_deg: f64,
        azimuth_deg: f64,
        pseudo_parallel_deg: f64,
        scale: f64,
    ) -> Self {
        let e2 = ellipsoid.e2();
        let e = e2.sqrt();
        let phi_c = lat_center_deg.to_radians();
        let phi_p = pseudo_parallel_deg.to_radians();
        let (sin_c, cos_c) = phi_c.sin_cos();

        let a = ellipsoid.a * (1.0 - e2).sqrt() / (1.0 - e2 * sin_c * sin_c);
        let b = (1.0 + e2 * cos_c.powi(4) / (1.0 - e2)).sqrt();
        let gamma0 = (sin_c / b).asin();
        let t0 = (FRAC_PI_4 + gamma0 / 2.0).tan()
            * ((1.0 + e * sin_c) / (1.0 - e * sin_c)).powf(e * b / 2.0)
            / (FRAC_PI_4 + phi_c / 2.0).tan().powf(b);
        let n = phi_p.sin();
        let r0 = scale * a / phi_p.tan();

        Self {
            ellipsoid,
            lon0: lon_origin_deg.to_radians(),
            alpha_c: azimuth_deg.to_radians(),
            phi_p,
            false_easting: 0.0,
            false_northing: 0.0,
            e,
            b,
            t0,
            n,
            r0,
        }
    }

    /// S-JTSK / Krovak on Bessel 1841, Greenwich-referenced longitude of origin.
    pub fn sjtsk() -> Self {
        Self::new(
            Ellipsoid::BESSEL_1841,
            49.5,
            24.0 + 50.0 / 60.0,
            30.0 + 17.0 / 60.0 + 17.3031 / 3600.0,
            78.5,
            0.9999,
        )
    }

    pub fn ellipsoid(&self) -> Ellipsoid {
        self.ellipsoid
    }

    /// Geodetic (on the projection ellipsoid) to `(southing, westing)` meters.
    pub fn forward(&self, geo: Geodetic) -> (f64, f64) {
        let phi = geo.lat_rad;
        let e_sin = self.e * phi.sin();

        let conformal = self.t0 * (phi / 2.0 + FRAC_PI_4).tan().powf(self.b)
            / ((1.0 + e_sin) / (1.0 - e_sin)).powf(self.e * self.b / 2.0);
        let u = 2.0 * (conformal.atan() - FRAC_PI_4);
        let v = self.b * (self.lon0 - geo.lon_rad);
        let t = (self.alpha_c.cos() * u.sin() + self.alpha_c.sin() * u.cos() * v.cos()).asin();
        let d = (u.cos() * v.sin() / t.cos()).asin();
        let theta = self.n * d;
        let r = self.r0 * (FRAC_PI_4 + self.phi_p / 2.0).tan().powf(self.n)
            / (t / 2.0 + FRAC_PI_4).tan().powf(self.n);

        (
            r * theta.cos() + self.false_northing,
            r * theta.sin() + self.false_easting,
        )
    }

    /// `(southing, westing)` meters to geodetic on the projection ellipsoid.
    pub fn inverse(&self, southing: f64, westing: f64) -> Geodetic {
        let xp = southing - self.false_northing;
        let yp = westing - self.false_easting;

        let r = (xp * xp + yp * yp).sqrt();
        let theta = yp.atan2(xp);
        let d = theta / self.phi_p.sin();
        let t = 2.0
            * (((self.r0 / r).powf(1.0 / self.n) * (FRAC_PI_4 + self.phi_p / 2.0).tan()).atan()
                - FRAC_PI_4);
        let u = (self.alpha_c.cos() * t.sin() - self.alpha_c.sin() * t.cos() * d.cos()).asin();
        let v = (t.cos() * d.sin() / u.cos()).asin();

        let scaled = self.t0.powf(-1.0 / self.b) * (u / 2.0 + FRAC_PI_4).tan().powf(1.0 / self.b);
        let mut phi = u;
        for _ in 0..LATITUDE_ITERATIONS {
            let e_sin = self.e * phi.sin();
            let next =
                2.0 * ((scaled * ((1.0 + e_sin) / (1.0 - e_sin)).powf(self.e / 2.0)).atan()
                    - FRAC_PI_4);
            if (next - phi).abs() < 1e-14 {
                phi = next;
                break;
            }
            phi = next;
        }

        Geodetic::new(phi, self.lon0 - v / self.b, 0.0)
    }

    /// EPSG:5514 axes: `easting = -westing`, `northing = -southing`.
    pub fn inverse_east_north(&self, easting: f64, northing: f64) -> Geodetic {
        self.inverse(-northing, -easting)
    }
}

/// EPSG:5514 easting/northing to WGS84 geodetic (height relative to the
/// Bessel ellipsoid surface is taken as zero before the datum shift).
pub fn sjtsk_to_wgs84(easting: f64, northing: f64) -> Geodetic {
    sjtsk_to_wgs84_with(&Krovak::sjtsk(), easting, northing)
}

/// Same as [`sjtsk_to_wgs84`] with a prebuilt projection.
pub fn sjtsk_to_wgs84_with(krovak: &Krovak, easting: f64, northing: f64) -> Geodetic {
    let local = krovak.inverse_east_north(easting, northing);
    let ecef = geodetic_to_ecef_on(krovak.ellipsoid(), local);
    ecef_to_geodetic_on(Ellipsoid::WGS84, Helmert::SJTSK_TO_WGS84.apply(ecef))
}

#[cfg(test)]
mod tests {
    use super::{Krovak, sjtsk_to_wgs84};
    use crate::math::Geodetic;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn dms(d: f64, m: f64, s: f64) -> f64 {
        d + m / 60.0 + s / 3600.0
    }

    #[test]
    fn forward_matches_epsg_reference_point() {
        let k = Krovak::sjtsk();
        let geo = Geodetic::from_degrees(dms(50.0, 12.0, 32.442), dms(16.0, 50.0, 59.179), 0.0);
        let (southing, westing) = k.forward(geo);
        assert_close(southing, 1_050_538.63, 0.05);
        assert_close(westing, 568_991.00, 0.05);
    }

    #[test]
    fn inverse_round_trips_forward() {
        let k = Krovak::sjtsk();
        let geo = Geodetic::from_degrees(49.19, 16.61, 0.0);
        let (southing, westing) = k.forward(geo);
        let back = k.inverse(southing, westing);
        assert_close(back.lat_deg(), 49.19, 1e-9);
        assert_close(back.lon_deg(), 16.61, 1e-9);
    }

    #[test]
    fn prague_lands_near_prague() {
        let wgs = sjtsk_to_wgs84(-743_000.0, -1_043_000.0);
        assert_close(wgs.lat_deg(), 50.087_335, 1e-5);
        assert_close(wgs.lon_deg(), 14.418_583, 1e-5);
        assert!(wgs.alt_m.abs() < 50.0, "height {}", wgs.alt_m);
    }
}
