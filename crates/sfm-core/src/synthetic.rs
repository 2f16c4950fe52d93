//! Deterministic synthetic scene generation.
//!
//! Builds exact positioning problems from ground-truth geometry: every image
//! observes every point with a noise-free bearing, and every image pair gets
//! a view-graph edge whose translation carries the exact relative direction.
//! Intended for tests; ordering is stable (ids follow input order) so runs
//! are reproducible.

use crate::math::{Iso3, Pt3, Real, Vec3};
use crate::scene::{
    Camera, CameraId, Image, ImageId, ImagePair, Observation, Track, TrackId, ViewGraph,
};
use anyhow::{ensure, Result};
use nalgebra::{Translation3, UnitQuaternion};
use std::collections::HashMap;

/// Shared camera id used for all synthetic images.
pub const SYNTHETIC_CAMERA_ID: CameraId = 1;

/// A complete scene in the shape the positioner consumes.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    pub view_graph: ViewGraph,
    pub cameras: HashMap<CameraId, Camera>,
    pub images: HashMap<ImageId, Image>,
    pub tracks: HashMap<TrackId, Track>,
}

/// Build an exact scene from ground-truth camera centers, orientations, and
/// point positions.
///
/// Image ids are `1..=centers.len()` and track ids `1..=points.len()`. All
/// images share one calibrated camera. Fails if a point coincides with a
/// camera center (the bearing would be undefined).
pub fn scene_from_ground_truth(
    centers: &[Vec3],
    rotations: &[UnitQuaternion<Real>],
    points: &[Vec3],
) -> Result<SyntheticScene> {
    ensure!(!centers.is_empty(), "need at least one camera center");
    ensure!(
        centers.len() == rotations.len(),
        "center/rotation count mismatch: {} vs {}",
        centers.len(),
        rotations.len()
    );

    let mut cameras = HashMap::new();
    cameras.insert(
        SYNTHETIC_CAMERA_ID,
        Camera::new(SYNTHETIC_CAMERA_ID, 600.0, 600.0, 0.0, 0.0),
    );

    let mut images = HashMap::new();
    let mut poses = Vec::with_capacity(centers.len());
    for (idx, (center, rotation)) in centers.iter().zip(rotations).enumerate() {
        let image_id = (idx + 1) as ImageId;
        let pose = Iso3::from_parts(Translation3::from(-(rotation * center)), *rotation);
        poses.push(pose);
        images.insert(image_id, Image::new(image_id, SYNTHETIC_CAMERA_ID, pose));
    }

    let mut view_graph = ViewGraph::new();
    for i in 0..poses.len() {
        for j in (i + 1)..poses.len() {
            let mut rel = poses[j] * poses[i].inverse();
            let t = rel.translation.vector;
            let norm = t.norm();
            if norm > Real::EPSILON {
                rel.translation = Translation3::from(t / norm);
            }
            view_graph.image_pairs.push(ImagePair::new(
                (i + 1) as ImageId,
                (j + 1) as ImageId,
                rel,
            ));
        }
    }

    let mut tracks = HashMap::new();
    for (idx, point) in points.iter().enumerate() {
        let track_id = (idx + 1) as TrackId;
        let mut track = Track::new(track_id);
        track.xyz = Pt3::from(*point);
        for (img_idx, pose) in poses.iter().enumerate() {
            let in_camera = pose.transform_point(&track.xyz).coords;
            let norm = in_camera.norm();
            ensure!(
                norm > Real::EPSILON,
                "point {} coincides with camera center {}",
                track_id,
                img_idx + 1
            );
            track.observations.push(Observation {
                image_id: (img_idx + 1) as ImageId,
                direction: in_camera / norm,
            });
        }
        tracks.insert(track_id, track);
    }

    Ok(SyntheticScene {
        view_graph,
        cameras,
        images,
        tracks,
    })
}
