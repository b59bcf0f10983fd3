//! In-memory broadcast hub with seeded packet loss and scriptable outages.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tether_sync::{EventSink, Transport, TransportError};

struct Member {
    transport_id: u64,
    channel: String,
    sink: EventSink,
}

struct HubState {
    members: Vec<Member>,
    retained: BTreeMap<u64, Vec<u8>>,
    rng: Xoshiro256StarStar,
    packet_loss: f64,
    online: bool,
    next_id: u64,
    delivered: u64,
    dropped: u64,
}

/// Shared handle to the hub. Every [`LoopbackTransport`] it hands out
/// broadcasts to all members of the same channel, the sender included.
#[derive(Clone)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    /// Create a hub that drops `packet_loss` of all deliveries.
    pub fn new(packet_loss: f64, seed: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(HubState {
                members: Vec::new(),
                retained: BTreeMap::new(),
                rng: Xoshiro256StarStar::seed_from_u64(seed),
                packet_loss: packet_loss.clamp(0.0, 1.0),
                online: true,
                next_id: 0,
                delivered: 0,
                dropped: 0,
            })),
        }
    }

    /// A new, unconnected transport on this hub.
    pub fn transport(&self) -> LoopbackTransport {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        LoopbackTransport {
            hub: self.clone(),
            id: state.next_id,
        }
    }

    /// Take the hub down (dropping every member) or bring it back.
    pub fn set_online(&self, online: bool) {
        let members = {
            let mut state = self.state.borrow_mut();
            state.online = online;
            if online {
                Vec::new()
            } else {
                std::mem::take(&mut state.members)
            }
        };
        for member in members {
            member.sink.disconnected("hub outage");
        }
    }

    /// Deliveries that reached a member.
    pub fn delivered(&self) -> u64 {
        self.state.borrow().delivered
    }

    /// Deliveries lost to simulated packet loss.
    pub fn dropped(&self) -> u64 {
        self.state.borrow().dropped
    }
}

/// One participant's connection to a [`LoopbackHub`].
pub struct LoopbackTransport {
    hub: LoopbackHub,
    id: u64,
}

impl Transport for LoopbackTransport {
    fn connect(&mut self, channel_id: &str, events: EventSink) -> Result<(), TransportError> {
        let mut state = self.hub.state.borrow_mut();
        state.members.retain(|m| m.transport_id != self.id);
        if !state.online {
            events.connect_failed("hub offline");
            return Ok(());
        }
        events.connected();
        state.members.push(Member {
            transport_id: self.id,
            channel: channel_id.to_string(),
            sink: events,
        });
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.hub.state.borrow_mut();
        state.members.retain(|m| m.transport_id != self.id);
    }

    fn broadcast(&mut self, channel_id: &str, payload: &[u8]) -> Result<(), TransportError> {
        let mut state = self.hub.state.borrow_mut();
        if !state.members.iter().any(|m| m.transport_id == self.id) {
            return Err(TransportError::NotConnected);
        }
        state.retained.insert(self.id, payload.to_vec());

        let state = &mut *state;
        let mut closed = Vec::new();
        for member in state.members.iter().filter(|m| m.channel == channel_id) {
            if state.rng.gen_bool(state.packet_loss) {
                state.dropped += 1;
                continue;
            }
            if member.sink.message(payload.to_vec()) {
                state.delivered += 1;
            } else {
                closed.push(member.transport_id);
            }
        }
        state.members.retain(|m| !closed.contains(&m.transport_id));
        Ok(())
    }

    fn fetch_session_state(&mut self, _channel_id: &str) -> Result<Vec<Vec<u8>>, TransportError> {
        let state = self.hub.state.borrow();
        if !state.online {
            return Err(TransportError::NotConnected);
        }
        Ok(state
            .retained
            .iter()
            .filter(|(id, _)| **id != self.id)
            .map(|(_, payload)| payload.clone())
            .collect())
    }
}
