//! Remote entity store: one fixed-shape record per tracked participant.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Instant;

use glam::Vec3;

use crate::messages::{EntityState, Orientation};

/// Position, velocity and orientation of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transform {
    /// World position.
    pub position: Vec3,
    /// Velocity in units per second.
    pub velocity: Vec3,
    /// Yaw and pitch.
    pub orientation: Orientation,
}

impl Transform {
    /// Component-wise linear blend toward `target`.
    pub fn lerp(&self, target: &Transform, t: f32) -> Transform {
        Transform {
            position: self.position.lerp(target.position, t),
            velocity: self.velocity.lerp(target.velocity, t),
            orientation: self.orientation.lerp(target.orientation, t),
        }
    }

    fn of(state: &EntityState) -> Self {
        Self {
            position: state.position,
            velocity: state.velocity,
            orientation: state.orientation,
        }
    }
}

/// Every ability flag an entity can carry, optional wire flags resolved to
/// `false` when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbilityFlags {
    pub dashing: bool,
    pub jetpacking: bool,
    pub grounded: bool,
    pub cloaked: bool,
    pub ai_controlled: bool,
    pub tagged: bool,
}

impl AbilityFlags {
    fn of(state: &EntityState) -> Self {
        Self {
            dashing: state.abilities.dashing,
            jetpacking: state.abilities.jetpacking,
            grounded: state.abilities.grounded,
            cloaked: state.cloaked.unwrap_or(false),
            ai_controlled: state.ai_controlled.unwrap_or(false),
            tagged: state.tagged.unwrap_or(false),
        }
    }
}

/// A tracked participant as seen by the local game.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntity {
    /// Participant id.
    pub id: String,
    /// What the render layer should draw this tick.
    pub displayed: Transform,
    /// Most recently received transform, not yet fully displayed.
    pub target: Transform,
    /// Resource gauge, clamped to the configured maximum.
    pub resource: f32,
    /// Ability flags from the latest update.
    pub abilities: AbilityFlags,
    /// Cooldown from the latest update, when present.
    pub cooldown_remaining: Option<f32>,
    /// Survival time from the latest update, when present.
    pub survival_time: Option<f32>,
    /// Local receive time of the latest update.
    pub last_update: Instant,
    /// Sender timestamp of the latest accepted update.
    pub last_timestamp: u64,
    /// Blend progress toward `target`, in `[0, 1]`.
    pub progress: f32,
    /// Driven locally; never evicted for silence.
    pub exempt: bool,
    pub(crate) blend_from: Transform,
}

impl RemoteEntity {
    fn new(id: String, timestamp: u64, state: &EntityState, now: Instant, max: f32) -> Self {
        let transform = Transform::of(state);
        Self {
            id,
            displayed: transform,
            target: transform,
            resource: clamp_gauge(state.resource, max),
            abilities: AbilityFlags::of(state),
            cooldown_remaining: state.cooldown_remaining,
            survival_time: state.survival_time,
            last_update: now,
            last_timestamp: timestamp,
            progress: 1.0,
            exempt: false,
            blend_from: transform,
        }
    }

    fn retarget(&mut self, timestamp: u64, state: &EntityState, now: Instant, max: f32) {
        self.blend_from = self.displayed;
        self.target = Transform::of(state);
        self.resource = clamp_gauge(state.resource, max);
        self.abilities = AbilityFlags::of(state);
        self.cooldown_remaining = state.cooldown_remaining;
        self.survival_time = state.survival_time;
        self.last_update = now;
        self.last_timestamp = timestamp;
        self.progress = 0.0;
    }
}

/// A negative or NaN bound collapses to zero rather than panicking in `clamp`.
fn clamp_gauge(value: f32, max: f32) -> f32 {
    value.clamp(0.0, max.max(0.0))
}

/// How inbound updates are accepted.
#[derive(Debug, Clone, Copy)]
pub struct UpdatePolicy {
    /// Drop updates whose timestamp is older than the last accepted one.
    pub reject_out_of_order: bool,
    /// Upper clamp for the resource gauge.
    pub resource_max: f32,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            reject_out_of_order: false,
            resource_max: 100.0,
        }
    }
}

/// Result of applying an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// First sighting: displayed and target both set to the received state.
    Created,
    /// New target; blending restarts from the current displayed state.
    Retargeted,
    /// Older than what is already applied; ignored.
    OutOfOrder,
}

/// Id-keyed owner of every [`RemoteEntity`].
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: HashMap<String, RemoteEntity>,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a validated update for `id`.
    pub fn apply(
        &mut self,
        id: &str,
        timestamp: u64,
        state: &EntityState,
        now: Instant,
        policy: UpdatePolicy,
    ) -> ApplyOutcome {
        match self.entities.entry(id.to_string()) {
            Entry::Vacant(slot) => {
                let id = slot.key().clone();
                slot.insert(RemoteEntity::new(
                    id,
                    timestamp,
                    state,
                    now,
                    policy.resource_max,
                ));
                ApplyOutcome::Created
            }
            Entry::Occupied(mut slot) => {
                let entity = slot.get_mut();
                if policy.reject_out_of_order && timestamp < entity.last_timestamp {
                    return ApplyOutcome::OutOfOrder;
                }
                entity.retarget(timestamp, state, now, policy.resource_max);
                ApplyOutcome::Retargeted
            }
        }
    }

    /// Insert or update a locally driven entity. Such entries are exempt from
    /// silence eviction.
    pub fn apply_local(
        &mut self,
        id: &str,
        timestamp: u64,
        state: &EntityState,
        now: Instant,
        policy: UpdatePolicy,
    ) -> ApplyOutcome {
        let outcome = self.apply(
            id,
            timestamp,
            state,
            now,
            UpdatePolicy {
                reject_out_of_order: false,
                ..policy
            },
        );
        if let Some(entity) = self.entities.get_mut(id) {
            entity.exempt = true;
        }
        outcome
    }

    /// Look up one entity.
    pub fn get(&self, id: &str) -> Option<&RemoteEntity> {
        self.entities.get(id)
    }

    /// Remove one entity.
    pub fn remove(&mut self, id: &str) -> Option<RemoteEntity> {
        self.entities.remove(id)
    }

    /// `true` if `id` is tracked.
    pub fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Iterate all entities in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.entities.values()
    }

    /// Iterate all entities mutably in arbitrary order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut RemoteEntity> {
        self.entities.values_mut()
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// `true` if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.entities.clear();
    }
}
