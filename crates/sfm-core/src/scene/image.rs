use crate::math::{Iso3, Mat3, Pt3};
use crate::scene::CameraId;
use serde::{Deserialize, Serialize};

/// Identifier of an image.
pub type ImageId = u32;

/// Externally supplied approximate position for an image, with uncertainty.
///
/// Priors bias the initialization towards a known reference frame; they are
/// not hard constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionPrior {
    pub position: Pt3,
    pub covariance: Mat3,
}

impl PositionPrior {
    pub fn new(position: Pt3) -> Self {
        Self {
            position,
            covariance: Mat3::identity(),
        }
    }

    pub fn with_covariance(position: Pt3, covariance: Mat3) -> Self {
        Self {
            position,
            covariance,
        }
    }
}

/// A single registered (or yet unregistered) view of the scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub image_id: ImageId,
    pub camera_id: CameraId,
    /// World-to-camera transform. The rotation is a fixed input (from
    /// rotation averaging); the translation is what the positioner solves.
    pub cam_from_world: Iso3,
    pub is_registered: bool,
    pub position_prior: Option<PositionPrior>,
}

impl Image {
    pub fn new(image_id: ImageId, camera_id: CameraId, cam_from_world: Iso3) -> Self {
        Self {
            image_id,
            camera_id,
            cam_from_world,
            is_registered: true,
            position_prior: None,
        }
    }

    /// Camera center in world coordinates, `-(R^T t)`.
    pub fn center(&self) -> Pt3 {
        Pt3::from(
            -(self
                .cam_from_world
                .rotation
                .inverse()
                .transform_vector(&self.cam_from_world.translation.vector)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use nalgebra::{Translation3, UnitQuaternion};

    #[test]
    fn center_round_trips_through_the_extrinsic_convention() {
        let rotation = UnitQuaternion::from_euler_angles(0.3, -0.2, 0.7);
        let center = Vec3::new(1.5, -2.0, 4.0);
        let pose = Iso3::from_parts(Translation3::from(-(rotation * center)), rotation);
        let image = Image::new(4, 1, pose);
        assert!((image.center().coords - center).norm() < 1e-12);
    }
}
