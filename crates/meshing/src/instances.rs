use foundation::math::{Vec3, narrow_up};
use serde::Serialize;

use crate::grid::GridCell;
use crate::reproject::TargetVertex;

/// Unit quaternion `(x, y, z, w)`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Yaw about +Y, then pitch about +X, then roll about +Z (intrinsic),
    /// i.e. `q = yaw * pitch * roll`.
    pub fn from_yaw_pitch_roll_deg(yaw: f64, pitch: f64, roll: f64) -> Self {
        let (sy, cy) = (yaw.to_radians() * 0.5).sin_cos();
        let (sp, cp) = (pitch.to_radians() * 0.5).sin_cos();
        let (sr, cr) = (roll.to_radians() * 0.5).sin_cos();

        Quat {
            x: (cy * sp * cr + sy * cp * sr) as f32,
            y: (sy * cp * cr - cy * sp * sr) as f32,
            z: (cy * cp * sr - sy * sp * cr) as f32,
            w: (cy * cp * cr + sy * sp * sr) as f32,
        }
    }

    /// Row-major 3x3 rotation matrix.
    pub fn to_rotation(self) -> [[f32; 3]; 3] {
        let Quat { x, y, z, w } = self;
        [
            [
                1.0 - 2.0 * (y * y + z * z),
                2.0 * (x * y - z * w),
                2.0 * (x * z + y * w),
            ],
            [
                2.0 * (x * y + z * w),
                1.0 - 2.0 * (x * x + z * z),
                2.0 * (y * z - x * w),
            ],
            [
                2.0 * (x * z - y * w),
                2.0 * (y * z + x * w),
                1.0 - 2.0 * (x * x + y * y),
            ],
        ]
    }
}

/// Placement of one point instance.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct InstanceTransform {
    pub position: TargetVertex,
    pub rotation: Quat,
    pub scale: [f32; 3],
}

impl InstanceTransform {
    pub fn at(position: TargetVertex) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: [1.0; 3],
        }
    }

    /// Column-major translation * rotation * scale matrix.
    pub fn to_matrix(&self) -> [f32; 16] {
        let r = self.rotation.to_rotation();
        let [sx, sy, sz] = self.scale;
        let p = self.position;
        [
            r[0][0] * sx,
            r[1][0] * sx,
            r[2][0] * sx,
            0.0,
            r[0][1] * sy,
            r[1][1] * sy,
            r[2][1] * sy,
            0.0,
            r[0][2] * sz,
            r[1][2] * sz,
            r[2][2] * sz,
            0.0,
            p.x,
            p.y,
            p.z,
            1.0,
        ]
    }
}

/// A bounded group of placements with a conservative bounding sphere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceBatch {
    /// Restarts at 0 for every cell.
    pub seq: u64,
    pub cell: Option<GridCell>,
    pub transforms: Vec<InstanceTransform>,
    pub center: TargetVertex,
    pub radius: f32,
}

#[derive(Debug)]
pub struct InstanceBatcher {
    batch_size: usize,
    rotation: Quat,
    scale: [f32; 3],
    pending: Vec<InstanceTransform>,
}

impl InstanceBatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            rotation: Quat::IDENTITY,
            scale: [1.0; 3],
            pending: Vec::new(),
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: [f32; 3]) -> Self {
        self.scale = scale;
        self
    }

    /// Transform for a point at `position` with the configured defaults.
    pub fn place(&self, position: TargetVertex) -> InstanceTransform {
        InstanceTransform {
            position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    pub fn add(&mut self, transform: InstanceTransform) {
        self.pending.push(transform);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drains everything added so far into batches for `cell`.
    pub fn flush(&mut self, cell: Option<GridCell>) -> Vec<InstanceBatch> {
        let pending = std::mem::take(&mut self.pending);
        pending
            .chunks(self.batch_size)
            .enumerate()
            .map(|(seq, members)| {
                let (center, radius) = bounding_sphere(members);
                InstanceBatch {
                    seq: seq as u64,
                    cell,
                    transforms: members.to_vec(),
                    center,
                    radius,
                }
            })
            .collect()
    }
}

/// Mean-centered sphere. The radius is measured from the stored (narrowed)
/// center and rounded up, so every member lies inside it.
fn bounding_sphere(members: &[InstanceTransform]) -> (TargetVertex, f32) {
    if members.is_empty() {
        return (TargetVertex::default(), 0.0);
    }
    let sum = members
        .iter()
        .fold(Vec3::default(), |acc, t| acc + t.position.to_high());
    let center = TargetVertex::from_high(sum * (1.0 / members.len() as f64));
    let c = center.to_high();
    let max = members
        .iter()
        .map(|t| t.position.to_high().distance(c))
        .fold(0.0_f64, f64::max);
    (center, narrow_up(max))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{InstanceBatcher, InstanceTransform, Quat};
    use crate::grid::GridCell;
    use crate::reproject::TargetVertex;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn ten_thousand_and_one_points_make_eleven_batches() {
        let mut batcher = InstanceBatcher::new(1_000);
        for i in 0..10_001 {
            let t = batcher.place(TargetVertex::new(i as f32, 0.0, 0.0));
            batcher.add(t);
        }
        let batches = batcher.flush(None);

        assert_eq!(batches.len(), 11);
        assert!(batches[..10].iter().all(|b| b.transforms.len() == 1_000));
        assert_eq!(batches[10].transforms.len(), 1);
        assert_eq!(
            batches.iter().map(|b| b.seq).collect::<Vec<_>>(),
            (0..11).collect::<Vec<u64>>()
        );
        assert_eq!(batcher.pending(), 0);
    }

    #[test]
    fn sphere_is_mean_centered_and_covers_members() {
        let mut batcher = InstanceBatcher::new(10);
        for p in [(0.0, 0.0, 0.0), (2.0, 0.0, 0.0), (1.0, 3.0, 0.0)] {
            batcher.add(InstanceTransform::at(TargetVertex::new(p.0, p.1, p.2)));
        }
        let batch = batcher.flush(Some(GridCell::new(1, 2))).remove(0);

        assert_eq!(batch.center, TargetVertex::new(1.0, 1.0, 0.0));
        assert_eq!(batch.cell, Some(GridCell::new(1, 2)));
        assert!(batch.radius >= 2.0);
        assert!(batch.radius < 2.0001);
    }

    #[test]
    fn radius_never_below_member_distance() {
        let mut batcher = InstanceBatcher::new(7);
        for i in 0..100 {
            let f = i as f32;
            batcher.add(InstanceTransform::at(TargetVertex::new(
                f * 0.37 + 1000.0,
                (f * 1.91).sin() * 13.0,
                f * -0.11,
            )));
        }
        for batch in batcher.flush(None) {
            let c = batch.center.to_high();
            for t in &batch.transforms {
                assert!(t.position.to_high().distance(c) <= batch.radius as f64);
            }
        }
    }

    #[test]
    fn sequence_restarts_per_flush() {
        let mut batcher = InstanceBatcher::new(2);
        for _ in 0..3 {
            batcher.add(InstanceTransform::at(TargetVertex::default()));
        }
        assert_eq!(batcher.flush(None).last().map(|b| b.seq), Some(1));
        batcher.add(InstanceTransform::at(TargetVertex::default()));
        assert_eq!(batcher.flush(None)[0].seq, 0);
        assert!(batcher.flush(None).is_empty());
    }

    #[test]
    fn yaw_rotates_x_toward_minus_z() {
        let q = Quat::from_yaw_pitch_roll_deg(90.0, 0.0, 0.0);
        let r = q.to_rotation();
        // Column 0 is the image of +X.
        assert!(close(r[0][0], 0.0) && close(r[1][0], 0.0) && close(r[2][0], -1.0));
        assert_eq!(
            Quat::from_yaw_pitch_roll_deg(0.0, 0.0, 0.0),
            Quat::IDENTITY
        );
    }

    #[test]
    fn matrix_is_column_major_trs() {
        let t = InstanceTransform {
            position: TargetVertex::new(5.0, 6.0, 7.0),
            rotation: Quat::IDENTITY,
            scale: [2.0, 3.0, 4.0],
        };
        assert_eq!(
            t.to_matrix(),
            [
                2.0, 0.0, 0.0, 0.0, //
                0.0, 3.0, 0.0, 0.0, //
                0.0, 0.0, 4.0, 0.0, //
                5.0, 6.0, 7.0, 1.0,
            ]
        );
    }
}
