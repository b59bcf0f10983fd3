//! Wire messages and the JSON codec.
//!
//! Every message is a flat JSON object tagged by `type` and stamped with the
//! sender's `originId` and a `timestamp` (Unix milliseconds):
//!
//! ```json
//! {"type":"entity-update","originId":"p2","timestamp":1712,"position":{"x":1,"y":0,"z":0}, ...}
//! ```
//!
//! Optional entity fields are omitted when absent, never written as `null`.
//! [`decode_message`] rejects anything that is missing a required field or
//! carries a non-finite number, so nothing downstream ever sees a malformed
//! value.

use glam::Vec3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A single wire message: sender identity, send time and a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Participant that produced the message.
    pub origin_id: String,
    /// Sender wall-clock time in Unix milliseconds.
    pub timestamp: u64,
    /// Kind-specific body. Serialized inline next to `originId`.
    #[serde(flatten)]
    pub payload: Payload,
}

/// The fixed set of message kinds. The variant name is the `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Payload {
    /// Transform and ability state of one participant.
    EntityUpdate(EntityState),
    /// A round is starting.
    SessionStart(SessionStart),
    /// A round has ended.
    SessionEnd(SessionEnd),
    /// Authoritative round timer.
    TimerSync(TimerSync),
    /// A single item changed.
    ItemEvent(ItemChange),
    /// Complete item list, sent to late joiners.
    ItemsFullSync(ItemsFullSync),
}

/// Routing kind of a [`Payload`], used for logging and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// [`Payload::EntityUpdate`].
    EntityUpdate,
    /// [`Payload::SessionStart`].
    SessionStart,
    /// [`Payload::SessionEnd`].
    SessionEnd,
    /// [`Payload::TimerSync`].
    TimerSync,
    /// [`Payload::ItemEvent`].
    ItemEvent,
    /// [`Payload::ItemsFullSync`].
    ItemsFullSync,
}

impl Payload {
    /// Extract the routing kind without consuming the payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            Payload::EntityUpdate(_) => MessageKind::EntityUpdate,
            Payload::SessionStart(_) => MessageKind::SessionStart,
            Payload::SessionEnd(_) => MessageKind::SessionEnd,
            Payload::TimerSync(_) => MessageKind::TimerSync,
            Payload::ItemEvent(_) => MessageKind::ItemEvent,
            Payload::ItemsFullSync(_) => MessageKind::ItemsFullSync,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// Yaw and pitch in radians. There is no roll axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Rotation around the vertical axis.
    pub yaw: f32,
    /// Rotation around the lateral axis.
    pub pitch: f32,
}

impl Orientation {
    /// Create an orientation from yaw and pitch.
    pub const fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }

    /// Blend each axis independently. Not a rotational slerp: per-tick deltas
    /// are small and there is no roll to couple.
    pub fn lerp(self, target: Self, t: f32) -> Self {
        Self {
            yaw: self.yaw + (target.yaw - self.yaw) * t,
            pitch: self.pitch + (target.pitch - self.pitch) * t,
        }
    }

    /// `true` if both angles are finite.
    pub fn is_finite(self) -> bool {
        self.yaw.is_finite() && self.pitch.is_finite()
    }
}

/// Always-present movement abilities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abilities {
    /// Currently dashing.
    pub dashing: bool,
    /// Jetpack thrust active.
    pub jetpacking: bool,
    /// Standing on the ground.
    pub grounded: bool,
}

/// Full state of one participant as carried by an entity-update.
///
/// Also the snapshot callers hand to `send_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    /// World position.
    #[serde(with = "xyz")]
    pub position: Vec3,
    /// Velocity in units per second.
    #[serde(with = "xyz")]
    pub velocity: Vec3,
    /// View orientation.
    pub orientation: Orientation,
    /// Bounded resource gauge (fuel, stamina).
    pub resource: f32,
    /// Movement ability flags.
    pub abilities: Abilities,
    /// Seconds until the next ability use, when on cooldown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining: Option<f32>,
    /// Seconds survived this round, for survival modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survival_time: Option<f32>,
    /// Set while the participant is "it".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagged: Option<bool>,
    /// Set while the participant is cloaked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloaked: Option<bool>,
    /// Set for simulated participants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_controlled: Option<bool>,
}

impl EntityState {
    /// A resting state at `position` with no optional fields.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            orientation: Orientation::default(),
            resource: 0.0,
            abilities: Abilities::default(),
            cooldown_remaining: None,
            survival_time: None,
            tagged: None,
            cloaked: None,
            ai_controlled: None,
        }
    }

    /// Set the velocity.
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Set the orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Set the resource gauge.
    pub fn with_resource(mut self, resource: f32) -> Self {
        self.resource = resource;
        self
    }

    fn non_finite_field(&self) -> Option<&'static str> {
        if !self.position.is_finite() {
            Some("position")
        } else if !self.velocity.is_finite() {
            Some("velocity")
        } else if !self.orientation.is_finite() {
            Some("orientation")
        } else if !self.resource.is_finite() {
            Some("resource")
        } else if self.cooldown_remaining.is_some_and(|v| !v.is_finite()) {
            Some("cooldownRemaining")
        } else if self.survival_time.is_some_and(|v| !v.is_finite()) {
            Some("survivalTime")
        } else {
            None
        }
    }
}

/// Round start announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStart {
    /// Round number within the session.
    pub round: u32,
    /// Participant ids taking part.
    pub participants: Vec<String>,
    /// Planned round length.
    pub duration_ms: u64,
}

/// Round end announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEnd {
    /// Round number within the session.
    pub round: u32,
    /// Why the round ended (timer, last-survivor, host-quit, ...).
    pub reason: String,
    /// Winner, when the mode has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
}

/// Authoritative round timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSync {
    /// Round number the timer belongs to.
    pub round: u32,
    /// Time left in the round.
    pub remaining_ms: u64,
}

/// One pickup or world item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemState {
    /// Stable item id.
    pub item_id: String,
    /// Item type, interpreted by the game layer.
    pub kind: String,
    /// World position.
    #[serde(with = "xyz")]
    pub position: Vec3,
    /// Whether the item can currently be picked up.
    pub active: bool,
}

/// What happened to an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemAction {
    /// Item appeared.
    Spawned,
    /// Item was picked up.
    Collected,
    /// Item was removed without being collected.
    Removed,
}

/// Single-item change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChange {
    /// What happened.
    pub action: ItemAction,
    /// Item after the change.
    pub item: ItemState,
    /// Participant responsible, e.g. the collector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

/// Every item currently in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsFullSync {
    /// Item list.
    pub items: Vec<ItemState>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors produced while encoding, decoding or validating a message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload was not a well-formed message (bad JSON, unknown type,
    /// missing required field).
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The origin id was empty.
    #[error("message has an empty origin id")]
    EmptyOrigin,

    /// A numeric field was NaN or infinite.
    #[error("non-finite value in field `{0}`")]
    NonFinite(&'static str),
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

impl Message {
    /// Build a message from its parts.
    pub fn new(origin_id: impl Into<String>, timestamp: u64, payload: Payload) -> Self {
        Self {
            origin_id: origin_id.into(),
            timestamp,
            payload,
        }
    }

    /// Routing kind of the payload.
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }

    /// Check the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.origin_id.is_empty() {
            return Err(CodecError::EmptyOrigin);
        }
        match &self.payload {
            Payload::EntityUpdate(state) => match state.non_finite_field() {
                Some(field) => Err(CodecError::NonFinite(field)),
                None => Ok(()),
            },
            Payload::ItemEvent(change) => check_item(&change.item),
            Payload::ItemsFullSync(sync) => sync.items.iter().try_for_each(check_item),
            Payload::SessionStart(_) | Payload::SessionEnd(_) | Payload::TimerSync(_) => Ok(()),
        }
    }
}

fn check_item(item: &ItemState) -> Result<(), CodecError> {
    if item.position.is_finite() {
        Ok(())
    } else {
        Err(CodecError::NonFinite("item.position"))
    }
}

/// Validate and serialize a message to its JSON wire form.
///
/// Validation runs first because `serde_json` would otherwise write
/// non-finite floats as `null`.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, CodecError> {
    msg.validate()?;
    Ok(serde_json::to_vec(msg)?)
}

/// Parse and validate a JSON wire payload.
pub fn decode_message(data: &[u8]) -> Result<Message, CodecError> {
    let msg: Message = serde_json::from_slice(data)?;
    msg.validate()?;
    Ok(msg)
}

/// `Vec3` as a `{x, y, z}` object rather than glam's array form.
mod xyz {
    use glam::Vec3;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Xyz {
        x: f32,
        y: f32,
        z: f32,
    }

    pub fn serialize<S: Serializer>(v: &Vec3, serializer: S) -> Result<S::Ok, S::Error> {
        Xyz {
            x: v.x,
            y: v.y,
            z: v.z,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec3, D::Error> {
        let Xyz { x, y, z } = Xyz::deserialize(deserializer)?;
        Ok(Vec3::new(x, y, z))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn update(origin: &str) -> Message {
        Message::new(
            origin,
            1_000,
            Payload::EntityUpdate(
                EntityState::at(Vec3::new(1.0, 2.0, 3.0))
                    .with_velocity(Vec3::new(0.5, 0.0, -0.5))
                    .with_orientation(Orientation::new(0.25, -0.1))
                    .with_resource(80.0),
            ),
        )
    }

    #[test]
    fn test_entity_update_wire_shape() {
        let bytes = encode_message(&update("p2")).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["type"], "entity-update");
        assert_eq!(value["originId"], "p2");
        assert_eq!(value["timestamp"], 1_000);
        assert_eq!(value["position"], json!({"x": 1.0, "y": 2.0, "z": 3.0}));
        assert_eq!(value["abilities"]["grounded"], false);
    }

    #[test]
    fn test_absent_optional_fields_are_omitted() {
        let bytes = encode_message(&update("p2")).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        let obj = value.as_object().unwrap();

        for key in [
            "cooldownRemaining",
            "survivalTime",
            "tagged",
            "cloaked",
            "aiControlled",
        ] {
            assert!(!obj.contains_key(key), "{key} should be omitted");
        }
    }

    #[test]
    fn test_present_optional_fields_are_written() {
        let mut msg = update("bot-1");
        if let Payload::EntityUpdate(state) = &mut msg.payload {
            state.ai_controlled = Some(true);
            state.cooldown_remaining = Some(1.5);
        }
        let value: Value = serde_json::from_slice(&encode_message(&msg).unwrap()).unwrap();
        assert_eq!(value["aiControlled"], true);
        assert_eq!(value["cooldownRemaining"], 1.5);
    }

    #[test]
    fn test_decode_accepts_hand_written_json() {
        let raw = json!({
            "type": "entity-update",
            "originId": "r1",
            "timestamp": 42,
            "position": {"x": 10.0, "y": 0.0, "z": 0.0},
            "velocity": {"x": 1.0, "y": 0.0, "z": 0.0},
            "orientation": {"yaw": 0.0, "pitch": 0.0},
            "resource": 50.0,
            "abilities": {"dashing": true, "jetpacking": false, "grounded": true},
            "cloaked": true
        });
        let msg = decode_message(raw.to_string().as_bytes()).unwrap();
        assert_eq!(msg.origin_id, "r1");
        match msg.payload {
            Payload::EntityUpdate(state) => {
                assert_eq!(state.position, Vec3::new(10.0, 0.0, 0.0));
                assert!(state.abilities.dashing);
                assert_eq!(state.cloaked, Some(true));
                assert_eq!(state.tagged, None);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_missing_velocity_rejected() {
        let raw = json!({
            "type": "entity-update",
            "originId": "r1",
            "timestamp": 42,
            "position": {"x": 10.0, "y": 0.0, "z": 0.0},
            "orientation": {"yaw": 0.0, "pitch": 0.0},
            "resource": 50.0,
            "abilities": {"dashing": false, "jetpacking": false, "grounded": true}
        });
        let result = decode_message(raw.to_string().as_bytes());
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }

    #[test]
    fn test_null_number_rejected() {
        let raw = r#"{"type":"entity-update","originId":"r1","timestamp":1,
            "position":{"x":null,"y":0,"z":0},"velocity":{"x":0,"y":0,"z":0},
            "orientation":{"yaw":0,"pitch":0},"resource":1,
            "abilities":{"dashing":false,"jetpacking":false,"grounded":false}}"#;
        assert!(decode_message(raw.as_bytes()).is_err());
    }

    #[test]
    fn test_non_finite_rejected_before_encoding() {
        let mut msg = update("p2");
        if let Payload::EntityUpdate(state) = &mut msg.payload {
            state.velocity.y = f32::NAN;
        }
        assert!(matches!(
            encode_message(&msg),
            Err(CodecError::NonFinite("velocity"))
        ));
    }

    #[test]
    fn test_infinite_item_position_rejected() {
        let msg = Message::new(
            "host",
            5,
            Payload::ItemsFullSync(ItemsFullSync {
                items: vec![ItemState {
                    item_id: "orb-1".to_string(),
                    kind: "orb".to_string(),
                    position: Vec3::new(f32::INFINITY, 0.0, 0.0),
                    active: true,
                }],
            }),
        );
        assert!(matches!(
            msg.validate(),
            Err(CodecError::NonFinite("item.position"))
        ));
    }

    #[test]
    fn test_empty_origin_rejected() {
        assert!(matches!(
            update("").validate(),
            Err(CodecError::EmptyOrigin)
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let raw = r#"{"type":"chat","originId":"p1","timestamp":1,"text":"hi"}"#;
        assert!(decode_message(raw.as_bytes()).is_err());
    }

    #[test]
    fn test_session_kinds_use_kebab_tags() {
        let cases = [
            (
                Payload::SessionStart(SessionStart {
                    round: 1,
                    participants: vec!["a".into(), "b".into()],
                    duration_ms: 60_000,
                }),
                "session-start",
            ),
            (
                Payload::SessionEnd(SessionEnd {
                    round: 1,
                    reason: "timer".into(),
                    winner_id: None,
                }),
                "session-end",
            ),
            (
                Payload::TimerSync(TimerSync {
                    round: 1,
                    remaining_ms: 30_000,
                }),
                "timer-sync",
            ),
            (
                Payload::ItemsFullSync(ItemsFullSync { items: vec![] }),
                "items-full-sync",
            ),
        ];

        for (payload, tag) in cases {
            let msg = Message::new("host", 7, payload);
            let bytes = encode_message(&msg).unwrap();
            let value: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(value["type"], tag);
            assert_eq!(decode_message(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn test_item_event_wire_shape() {
        let msg = Message::new(
            "p3",
            9,
            Payload::ItemEvent(ItemChange {
                action: ItemAction::Collected,
                item: ItemState {
                    item_id: "fuel-2".into(),
                    kind: "fuel".into(),
                    position: Vec3::new(4.0, 0.0, 1.0),
                    active: false,
                },
                actor_id: Some("p3".into()),
            }),
        );
        let value: Value = serde_json::from_slice(&encode_message(&msg).unwrap()).unwrap();
        assert_eq!(value["type"], "item-event");
        assert_eq!(value["action"], "collected");
        assert_eq!(value["item"]["itemId"], "fuel-2");
        assert_eq!(value["actorId"], "p3");
    }

    #[test]
    fn test_orientation_lerp_is_per_axis() {
        let from = Orientation::new(0.0, 1.0);
        let to = Orientation::new(2.0, -1.0);
        assert_eq!(from.lerp(to, 0.5), Orientation::new(1.0, 0.0));
        assert_eq!(from.lerp(to, 0.0), from);
    }
}
