//! Typed application events and a per-kind subscriber registry.
//!
//! Subscribers register for one [`EventKind`] and receive every [`Event`] of
//! that kind. Several subscribers may listen to the same kind; they are called
//! in registration order, but nothing should rely on ordering between
//! unrelated subscribers.

use std::collections::HashMap;

use log::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TouchPhase {
    Begin,
    Move,
    End,
}

/// One touch point update, in window pixels with the origin top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TouchEvent {
    pub x: f32,
    pub y: f32,
    /// Identifies a finger for the duration of its contact.
    pub sequence: u64,
    pub phase: TouchPhase,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Event {
    /// A graphics context is available.
    Alive,
    Foreground,
    Background,
    Resize { width: u32, height: u32 },
    Touch(TouchEvent),
    BeforeRender { frame: u64 },
    /// `rendered` is false when the frame had nothing to draw or was dropped.
    AfterRender { frame: u64, rendered: bool },
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Alive,
    Foreground,
    Background,
    Resize,
    Touch,
    BeforeRender,
    AfterRender,
    Quit,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Alive => EventKind::Alive,
            Event::Foreground => EventKind::Foreground,
            Event::Background => EventKind::Background,
            Event::Resize { .. } => EventKind::Resize,
            Event::Touch(_) => EventKind::Touch,
            Event::BeforeRender { .. } => EventKind::BeforeRender,
            Event::AfterRender { .. } => EventKind::AfterRender,
            Event::Quit => EventKind::Quit,
        }
    }
}

/// Returned by [`Dispatcher::subscribe`]; pass it to `unsubscribe`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Box<dyn FnMut(&Event)>;

#[derive(Default)]
pub struct Dispatcher {
    next_id: u64,
    subscribers: HashMap<EventKind, Vec<(SubscriptionId, Callback)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: EventKind, callback: impl FnMut(&Event) + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers
            .entry(kind)
            .or_default()
            .push((id, Box::new(callback)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for subs in self.subscribers.values_mut() {
            if let Some(pos) = subs.iter().position(|(sid, _)| *sid == id) {
                subs.remove(pos);
                return true;
            }
        }
        false
    }

    /// Calls every subscriber of the event's kind. Returns how many were called.
    pub fn dispatch(&mut self, event: &Event) -> usize {
        let Some(subs) = self.subscribers.get_mut(&event.kind()) else {
            return 0;
        };
        trace!("dispatching {event:?} to {} subscribers", subs.len());
        for (_, callback) in subs.iter_mut() {
            callback(event);
        }
        subs.len()
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self
            .subscribers
            .iter()
            .map(|(k, v)| (*k, v.len()))
            .collect();
        f.debug_struct("Dispatcher")
            .field("subscribers", &counts)
            .finish()
    }
}
