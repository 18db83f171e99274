//! Identity descriptor types

use serde::{Deserialize, Serialize};

pub const EMBEDDING_DIM: usize = 512;
pub const KEYPOINT_COUNT: usize = 5;

/// Numeric summary of a detected subject, derived per request and discarded
/// afterwards. The embedding carries identity; the keypoints carry facial
/// structure for the conditioning pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityDescriptor {
    pub embedding: Vec<f32>,
    pub keypoints: Vec<[f32; 2]>,
    pub confidence: f32,
}

impl IdentityDescriptor {
    /// Shape check against the fixed extractor output dimensions
    pub fn is_well_formed(&self) -> bool {
        self.embedding.len() == EMBEDDING_DIM && self.keypoints.len() == KEYPOINT_COUNT
    }
}
