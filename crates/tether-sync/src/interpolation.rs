//! Per-tick blending of remote entities toward their latest target.
//!
//! Progress is derived from wall time since the last update rather than
//! accumulated from tick deltas, so a late or skipped tick cannot push an
//! entity past its target. Once the window is exhausted and prediction is on,
//! the entity keeps moving at its target velocity (dead reckoning).

use std::time::{Duration, Instant};

use crate::store::{EntityStore, RemoteEntity};

/// Blending parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationConfig {
    /// Time to blend from the previous displayed state to a new target.
    pub window: Duration,
    /// Extrapolate by velocity after the window ends.
    pub prediction: bool,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(100),
            prediction: true,
        }
    }
}

/// Blend progress for an entity last updated `elapsed` ago.
pub fn progress(elapsed: Duration, window: Duration) -> f32 {
    if window.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f32() / window.as_secs_f32()).clamp(0.0, 1.0)
}

/// Advance one entity to `now`.
pub fn advance_entity(entity: &mut RemoteEntity, now: Instant, config: &InterpolationConfig) {
    let elapsed = now.saturating_duration_since(entity.last_update);
    let t = progress(elapsed, config.window).max(entity.progress);
    entity.progress = t;

    if t < 1.0 {
        entity.displayed = entity.blend_from.lerp(&entity.target, t);
        return;
    }

    // Land exactly on the target; a lerp at t = 1 can be off by an ulp.
    entity.displayed = entity.target;

    if config.prediction {
        let beyond = elapsed.saturating_sub(config.window).as_secs_f32();
        let predicted = entity.target.position + entity.target.velocity * beyond;
        if predicted.is_finite() {
            entity.displayed.position = predicted;
        }
    }
}

/// Advance every entity in the store to `now`.
pub fn advance_all(store: &mut EntityStore, now: Instant, config: &InterpolationConfig) {
    for entity in store.iter_mut() {
        advance_entity(entity, now, config);
    }
}
