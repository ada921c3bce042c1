use serde::Serialize;

/// Axis-aligned bounding boxes.
///
/// `empty()` boxes are inverted (`min = +inf`, `max = -inf`) so the first
/// `extend` initializes them.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Aabb2 {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Aabb3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb2 {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Aabb2 { min, max }
    }

    pub fn empty() -> Self {
        Aabb2 {
            min: [f64::INFINITY; 2],
            max: [f64::NEG_INFINITY; 2],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min[0] > self.max[0] || self.min[1] > self.max[1]
    }

    /// Non-finite components are ignored.
    pub fn extend(&mut self, x: f64, y: f64) {
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        self.min[0] = self.min[0].min(x);
        self.min[1] = self.min[1].min(y);
        self.max[0] = self.max[0].max(x);
        self.max[1] = self.max[1].max(y);
    }

    pub fn width(&self) -> f64 {
        (self.max[0] - self.min[0]).max(0.0)
    }

    pub fn height(&self) -> f64 {
        (self.max[1] - self.min[1]).max(0.0)
    }
}

impl Aabb3 {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Aabb3 { min, max }
    }

    pub fn empty() -> Self {
        Aabb3 {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    pub fn extend(&mut self, p: [f64; 3]) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Aabb2, Aabb3};

    #[test]
    fn aabb2_extends_from_empty() {
        let mut b = Aabb2::empty();
        assert!(b.is_empty());
        b.extend(1.0, 5.0);
        b.extend(-2.0, 3.0);
        b.extend(f64::NAN, 100.0);
        assert_eq!(b, Aabb2::new([-2.0, 3.0], [1.0, 5.0]));
        assert_eq!(b.width(), 3.0);
        assert_eq!(b.height(), 2.0);
    }

    #[test]
    fn single_point_box_is_degenerate_not_empty() {
        let mut b = Aabb2::empty();
        b.extend(4.0, 4.0);
        assert!(!b.is_empty());
        assert_eq!(b.width(), 0.0);
        assert_eq!(b.height(), 0.0);
    }

    #[test]
    fn aabb3_extends_per_axis() {
        let mut b = Aabb3::empty();
        b.extend([0.0, 0.0, 0.0]);
        b.extend([2.0, 4.0, -2.0]);
        assert_eq!(b.min, [0.0, 0.0, -2.0]);
        assert_eq!(b.max, [2.0, 4.0, 0.0]);
    }
}
