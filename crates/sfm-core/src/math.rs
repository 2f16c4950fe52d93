//! Mathematical type definitions and bounding-box utilities.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, Similarity3, Vector2, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Scalar type used throughout the library (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;
/// 3D similarity transform (rotation + uniform scale + translation).
pub type Sim3 = Similarity3<Real>;

/// Axis-aligned bounding box given by its min and max corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Cube centered at the origin with the given half extent per axis.
    pub fn cube(half_extent: Real) -> Self {
        Self {
            min: Vec3::from_element(-half_extent),
            max: Vec3::from_element(half_extent),
        }
    }

    /// Smallest box containing all points; `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self {
            min: first,
            max: first,
        };
        for p in iter {
            bbox.min = bbox.min.inf(&p);
            bbox.max = bbox.max.sup(&p);
        }
        Some(bbox)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn contains(&self, p: &Vec3) -> bool {
        (0..3).all(|k| p[k] >= self.min[k] && p[k] <= self.max[k])
    }

    /// Draw a point uniformly from the box. Degenerate axes (`min == max`)
    /// return the shared coordinate.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec3 {
        let mut p = Vec3::zeros();
        for k in 0..3 {
            p[k] = if self.max[k] > self.min[k] {
                rng.random_range(self.min[k]..self.max[k])
            } else {
                self.min[k]
            };
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn sample_stays_inside_box() {
        let bbox = Aabb::new(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(1.0, 0.5, 3.0));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let p = bbox.sample(&mut rng);
            assert!(bbox.contains(&p), "sample {p:?} escaped {bbox:?}");
        }
    }

    #[test]
    fn sample_is_deterministic_for_a_fixed_seed() {
        let bbox = Aabb::cube(100.0);
        let mut rng_a = StdRng::seed_from_u64(42);
        let mut rng_b = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            assert_eq!(bbox.sample(&mut rng_a), bbox.sample(&mut rng_b));
        }
    }

    #[test]
    fn sample_handles_degenerate_axes() {
        let bbox = Aabb::new(Vec3::new(0.0, -1.0, 5.0), Vec3::new(0.0, 1.0, 5.0));
        let mut rng = StdRng::seed_from_u64(1);
        let p = bbox.sample(&mut rng);
        assert_eq!(p.x, 0.0);
        assert_eq!(p.z, 5.0);
    }

    #[test]
    fn from_points_wraps_all_inputs() {
        let pts = vec![
            Vec3::new(1.0, -2.0, 0.0),
            Vec3::new(-3.0, 4.0, 1.0),
            Vec3::new(0.0, 0.0, -5.0),
        ];
        let bbox = Aabb::from_points(pts.iter().copied()).unwrap();
        assert_eq!(bbox.min, Vec3::new(-3.0, -2.0, -5.0));
        assert_eq!(bbox.max, Vec3::new(1.0, 4.0, 1.0));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }
}
