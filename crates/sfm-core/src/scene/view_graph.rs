use crate::math::Iso3;
use crate::scene::ImageId;
use serde::{Deserialize, Serialize};

/// Pairwise relative pose estimate between two overlapping images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePair {
    pub image_id1: ImageId,
    pub image_id2: ImageId,
    /// Relative pose of image 2 w.r.t. image 1. Only the direction of the
    /// translation is meaningful; its magnitude is unknown.
    pub cam2_from_cam1: Iso3,
    /// Set by the upstream relative-pose estimator; invalid pairs are
    /// ignored by the positioner.
    pub is_valid: bool,
}

impl ImagePair {
    pub fn new(image_id1: ImageId, image_id2: ImageId, cam2_from_cam1: Iso3) -> Self {
        Self {
            image_id1,
            image_id2,
            cam2_from_cam1,
            is_valid: true,
        }
    }
}

/// Graph of pairwise relative-pose estimates between images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewGraph {
    pub image_pairs: Vec<ImagePair>,
}

impl ViewGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_valid_pairs(&self) -> usize {
        self.image_pairs.iter().filter(|pair| pair.is_valid).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_pair_count_skips_invalidated_edges() {
        let mut graph = ViewGraph::new();
        graph
            .image_pairs
            .push(ImagePair::new(1, 2, Iso3::identity()));
        let mut bad = ImagePair::new(2, 3, Iso3::identity());
        bad.is_valid = false;
        graph.image_pairs.push(bad);
        assert_eq!(graph.num_valid_pairs(), 1);
    }
}
