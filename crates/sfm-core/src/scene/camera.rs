use crate::math::{Pt2, Real, Vec3};
use serde::{Deserialize, Serialize};

/// Identifier of a camera (shared by zero or more images).
pub type CameraId = u32;

/// Pinhole intrinsics. Read-only for the positioner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub camera_id: CameraId,
    pub fx: Real,
    pub fy: Real,
    pub cx: Real,
    pub cy: Real,
    /// True when the focal length is trusted (prior calibration or EXIF)
    /// rather than guessed.
    pub has_prior_focal_length: bool,
}

impl Camera {
    pub fn new(camera_id: CameraId, fx: Real, fy: Real, cx: Real, cy: Real) -> Self {
        Self {
            camera_id,
            fx,
            fy,
            cx,
            cy,
            has_prior_focal_length: true,
        }
    }

    /// Unit observation ray in the camera frame for an (undistorted) pixel.
    pub fn bearing(&self, pixel: &Pt2) -> Vec3 {
        Vec3::new(
            (pixel.x - self.cx) / self.fx,
            (pixel.y - self.cy) / self.fy,
            1.0,
        )
        .normalize()
    }
}
