use crate::math::{Pt3, Vec3};
use crate::scene::{Image, ImageId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Identifier of a track.
pub type TrackId = u64;

/// A single 2D observation of a track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub image_id: ImageId,
    /// Unit bearing in the observing camera's frame (already undistorted).
    pub direction: Vec3,
}

/// A 3D point hypothesis and the observations believed to see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub track_id: TrackId,
    pub xyz: Pt3,
    pub observations: Vec<Observation>,
}

impl Track {
    pub fn new(track_id: TrackId) -> Self {
        Self {
            track_id,
            xyz: Pt3::origin(),
            observations: Vec::new(),
        }
    }

    /// Number of distinct registered images observing this track.
    pub fn num_registered_views(&self, images: &HashMap<ImageId, Image>) -> usize {
        let mut seen = HashSet::new();
        for obs in &self.observations {
            if images
                .get(&obs.image_id)
                .is_some_and(|image| image.is_registered)
            {
                seen.insert(obs.image_id);
            }
        }
        seen.len()
    }
}
