//! Fans a declarative surface state out to per-clip controllers.

use std::collections::BTreeMap;
use std::sync::Arc;

use ss_common::{EngineConfig, SyncedClock};
use ss_timeline_eval::{ClipKind, SurfaceState};
use tracing::{debug, info};

use crate::controller::{Attachment, ClipController};
use crate::surface::{Surface, SurfaceHandle};

/// What one [`Orchestrator::apply_state`] call did to the set of controllers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateChanges {
    pub added: usize,
    pub removed: usize,
    pub recreated: usize,
    pub updated: usize,
}

impl StateChanges {
    /// Whether any controller was created or torn down.
    pub fn reshaped(&self) -> bool {
        self.added + self.removed + self.recreated > 0
    }
}

struct Slot {
    kind: ClipKind,
    attachment: Attachment,
    controller: ClipController,
}

impl Slot {
    fn release(self) {
        self.attachment.detach();
        self.controller.destroy();
    }
}

/// Owns one [`ClipController`] per clip id of the current surface state.
///
/// Controllers run on the tokio runtime, so [`apply_state`](Self::apply_state)
/// must be called from within one.
pub struct Orchestrator {
    surface: Arc<dyn Surface>,
    clock: SyncedClock,
    config: EngineConfig,
    slots: BTreeMap<String, Slot>,
}

impl Orchestrator {
    pub fn new(surface: Arc<dyn Surface>, clock: SyncedClock, config: EngineConfig) -> Self {
        Self {
            surface,
            clock,
            config,
            slots: BTreeMap::new(),
        }
    }

    /// Bring the set of controllers in line with `state`.
    ///
    /// Removed clips are torn down before this returns. New clips get a
    /// controller. Retained clips receive their new state in place, so
    /// playing media is not interrupted. A retained id whose kind changed is
    /// recreated. Ids are processed in sorted order.
    pub fn apply_state(&mut self, state: &SurfaceState) -> StateChanges {
        let mut changes = StateChanges::default();
        let removed: Vec<String> = self
            .slots
            .keys()
            .filter(|id| !state.contains(id))
            .cloned()
            .collect();
        for clip_id in removed {
            if let Some(slot) = self.slots.remove(&clip_id) {
                debug!(clip = %clip_id, "Removing clip");
                slot.release();
                changes.removed += 1;
            }
        }

        for (clip_id, clip) in state.iter() {
            match self.slots.get(clip_id) {
                Some(slot) if slot.kind == clip.kind() => {
                    slot.controller.set_state(clip.clone());
                    changes.updated += 1;
                    continue;
                }
                Some(slot) => {
                    debug!(clip = %clip_id, from = %slot.kind, to = %clip.kind(), "Clip kind changed, recreating");
                    if let Some(slot) = self.slots.remove(clip_id) {
                        slot.release();
                    }
                    changes.recreated += 1;
                }
                None => {
                    debug!(clip = %clip_id, kind = %clip.kind(), "Adding clip");
                    changes.added += 1;
                }
            }

            let attachment = Attachment::new();
            let controller = ClipController::spawn(
                clip_id.clone(),
                clip.clone(),
                self.surface.clone(),
                self.clock.clone(),
                self.config.clone(),
                attachment.clone(),
            );
            self.slots.insert(
                clip_id.clone(),
                Slot {
                    kind: clip.kind(),
                    attachment,
                    controller,
                },
            );
        }

        if changes.reshaped() {
            info!(
                clips = self.slots.len(),
                added = changes.added,
                removed = changes.removed,
                recreated = changes.recreated,
                "Applied surface state"
            );
        } else {
            debug!(clips = self.slots.len(), "Applied surface state");
        }
        changes
    }

    /// Tear down every clip.
    pub fn clear(&mut self) {
        self.apply_state(&SurfaceState::new());
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Clip ids in sorted order.
    pub fn clip_ids(&self) -> impl Iterator<Item = &String> {
        self.slots.keys()
    }

    pub fn controller(&self, clip_id: &str) -> Option<&ClipController> {
        self.slots.get(clip_id).map(|slot| &slot.controller)
    }

    /// Live surface element of `clip_id`, if it is active.
    pub fn handle(&self, clip_id: &str) -> Option<SurfaceHandle> {
        self.controller(clip_id).and_then(ClipController::handle)
    }

    pub fn clock(&self) -> &SyncedClock {
        &self.clock
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for (_, slot) in std::mem::take(&mut self.slots) {
            slot.release();
        }
    }
}
