//! Held image artifacts of the most recent poll.

use bytes::Bytes;
use std::sync::{PoisonError, RwLock};

use super::rotation::Slot;

/// Original and composed bitmap of one poll, replaced as a unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageArtifacts {
    pub original: Option<Bytes>,
    pub composed: Option<Bytes>,
    pub slot: Option<Slot>,
    pub generation: u64,
}

/// Lock-guarded holder of the current [`ImageArtifacts`]
#[derive(Debug, Default)]
pub struct ArtifactStore {
    inner: RwLock<ImageArtifacts>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cheap copy of the held artifacts (`Bytes` is reference counted)
    pub fn current(&self) -> ImageArtifacts {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the held artifacts if `artifacts` belongs to a newer poll.
    ///
    /// Returns whether the swap happened.
    pub fn publish(&self, artifacts: ImageArtifacts) -> bool {
        let mut held = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if artifacts.generation <= held.generation {
            return false;
        }
        *held = artifacts;
        true
    }
}
