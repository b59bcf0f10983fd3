//! Listener registry for the game layer.
//!
//! Each notification kind has its own list. Every listener invocation runs
//! inside its own `catch_unwind`, so a panicking observer is logged and
//! skipped while the rest of the tick's notifications still go out.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::messages::{ItemChange, ItemState, SessionEnd, SessionStart, TimerSync};
use crate::store::RemoteEntity;

/// Handle returned by every `on_*` call; pass it to `unsubscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// Item notification: a single change or a complete resync.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
    /// One item changed.
    Change(ItemChange),
    /// Full item list replaced whatever the listener held.
    FullSync(Vec<ItemState>),
}

struct ListenerList<T: ?Sized> {
    kind: &'static str,
    entries: Vec<(Subscription, Box<dyn FnMut(&T)>)>,
}

impl<T: ?Sized> ListenerList<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    fn push(&mut self, sub: Subscription, listener: Box<dyn FnMut(&T)>) {
        self.entries.push((sub, listener));
    }

    fn remove(&mut self, sub: Subscription) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(s, _)| *s != sub);
        self.entries.len() != before
    }

    /// Invoke every listener; returns how many panicked.
    fn notify(&mut self, value: &T) -> usize {
        let mut panicked = 0;
        for (sub, listener) in &mut self.entries {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| listener(value))) {
                panicked += 1;
                tracing::error!(
                    kind = self.kind,
                    subscription = sub.0,
                    "Listener panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
        panicked
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// All listener lists of one manager.
pub struct CallbackRegistry {
    next_id: u64,
    update: ListenerList<RemoteEntity>,
    disconnect: ListenerList<str>,
    connect: ListenerList<()>,
    session_start: ListenerList<SessionStart>,
    session_end: ListenerList<SessionEnd>,
    timer_sync: ListenerList<TimerSync>,
    item: ListenerList<ItemEvent>,
}

impl CallbackRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: 0,
            update: ListenerList::new("update"),
            disconnect: ListenerList::new("disconnect"),
            connect: ListenerList::new("connect"),
            session_start: ListenerList::new("session-start"),
            session_end: ListenerList::new("session-end"),
            timer_sync: ListenerList::new("timer-sync"),
            item: ListenerList::new("item"),
        }
    }

    fn allocate(&mut self) -> Subscription {
        self.next_id += 1;
        Subscription(self.next_id)
    }

    /// Called every tick with each entity's freshly blended state.
    pub fn on_update(&mut self, listener: impl FnMut(&RemoteEntity) + 'static) -> Subscription {
        let sub = self.allocate();
        self.update.push(sub, Box::new(listener));
        sub
    }

    /// Called once with the id of each evicted entity.
    pub fn on_disconnect(&mut self, listener: impl FnMut(&str) + 'static) -> Subscription {
        let sub = self.allocate();
        self.disconnect.push(sub, Box::new(listener));
        sub
    }

    /// Called every time the transport connects.
    pub fn on_connect(&mut self, mut listener: impl FnMut() + 'static) -> Subscription {
        let sub = self.allocate();
        self.connect.push(sub, Box::new(move |_: &()| listener()));
        sub
    }

    /// Called for each remote session-start.
    pub fn on_session_start(
        &mut self,
        listener: impl FnMut(&SessionStart) + 'static,
    ) -> Subscription {
        let sub = self.allocate();
        self.session_start.push(sub, Box::new(listener));
        sub
    }

    /// Called for each remote session-end.
    pub fn on_session_end(&mut self, listener: impl FnMut(&SessionEnd) + 'static) -> Subscription {
        let sub = self.allocate();
        self.session_end.push(sub, Box::new(listener));
        sub
    }

    /// Called for each remote timer-sync.
    pub fn on_timer_sync(&mut self, listener: impl FnMut(&TimerSync) + 'static) -> Subscription {
        let sub = self.allocate();
        self.timer_sync.push(sub, Box::new(listener));
        sub
    }

    /// Called for each remote item-event or items-full-sync.
    pub fn on_item_event(&mut self, listener: impl FnMut(&ItemEvent) + 'static) -> Subscription {
        let sub = self.allocate();
        self.item.push(sub, Box::new(listener));
        sub
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, sub: Subscription) -> bool {
        self.update.remove(sub)
            || self.disconnect.remove(sub)
            || self.connect.remove(sub)
            || self.session_start.remove(sub)
            || self.session_end.remove(sub)
            || self.timer_sync.remove(sub)
            || self.item.remove(sub)
    }

    /// Total registered listeners across all kinds.
    pub(crate) fn len(&self) -> usize {
        self.update.len()
            + self.disconnect.len()
            + self.connect.len()
            + self.session_start.len()
            + self.session_end.len()
            + self.timer_sync.len()
            + self.item.len()
    }

    pub(crate) fn notify_update(&mut self, entity: &RemoteEntity) -> usize {
        self.update.notify(entity)
    }

    pub(crate) fn notify_disconnect(&mut self, id: &str) -> usize {
        self.disconnect.notify(id)
    }

    pub(crate) fn notify_connect(&mut self) -> usize {
        self.connect.notify(&())
    }

    pub(crate) fn notify_session_start(&mut self, start: &SessionStart) -> usize {
        self.session_start.notify(start)
    }

    pub(crate) fn notify_session_end(&mut self, end: &SessionEnd) -> usize {
        self.session_end.notify(end)
    }

    pub(crate) fn notify_timer_sync(&mut self, sync: &TimerSync) -> usize {
        self.timer_sync.notify(sync)
    }

    pub(crate) fn notify_item(&mut self, event: &ItemEvent) -> usize {
        self.item.notify(event)
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
