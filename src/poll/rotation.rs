//! # Slot Rotation
//!
//! Alternates the artifact URLs handed to the device between two slots so
//! that consecutive polls never reuse a URL a cache may still hold.
//!
//! ```text
//! poll 1 -> Primary   /image/screen.bmp   /image/original.bmp
//! poll 2 -> Secondary /image/screen1.bmp  /image/original1.bmp
//! poll 3 -> Primary   ...
//! ```
//!
//! Each advance also draws a generation number; artifacts are only
//! published when their generation is newer than the one already held.

use serde::Serialize;
use std::sync::{Mutex, PoisonError};

/// Served before the first poll
pub const DUMMY_PATH: &str = "/image/dummy.bmp";

/// One of the two URL slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Primary,
    Secondary,
}

impl Slot {
    /// Path of the composed artifact
    pub fn screen_path(self) -> &'static str {
        match self {
            Slot::Primary => "/image/screen.bmp",
            Slot::Secondary => "/image/screen1.bmp",
        }
    }

    /// Path of the original artifact
    pub fn original_path(self) -> &'static str {
        match self {
            Slot::Primary => "/image/original.bmp",
            Slot::Secondary => "/image/original1.bmp",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Slot::Primary => Slot::Secondary,
            Slot::Secondary => Slot::Primary,
        }
    }
}

#[derive(Debug)]
struct RotationState {
    next: Slot,
    generation: u64,
    current: Option<Slot>,
}

/// Lock-guarded rotation flag plus generation counter
#[derive(Debug)]
pub struct SlotRotation {
    state: Mutex<RotationState>,
}

impl Default for SlotRotation {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotRotation {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RotationState {
                next: Slot::Primary,
                generation: 0,
                current: None,
            }),
        }
    }

    /// Take the next slot and a fresh, strictly increasing generation.
    pub fn advance(&self) -> (Slot, u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = state.next;
        state.next = slot.other();
        state.generation += 1;
        state.current = Some(slot);
        (slot, state.generation)
    }

    /// Slot handed out by the most recent poll
    pub fn current(&self) -> Option<Slot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).current
    }

    /// `(original, composed)` paths currently advertised
    pub fn current_paths(&self) -> (&'static str, &'static str) {
        match self.current() {
            Some(slot) => (slot.original_path(), slot.screen_path()),
            None => (DUMMY_PATH, DUMMY_PATH),
        }
    }
}
