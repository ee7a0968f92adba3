// Copyright (c) 2025, Jason Jenkins
// SPDX-License-Identifier: BSD-3-Clause

//! Typed change notifications.
//!
//! Each component publishes one enum of events through an [`EventBus`].
//! Subscribers only observe; the model never reads state back from them.

use std::fmt;

use super::frame::FrameIndex;
use super::track::TrackId;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler<E> = Box<dyn FnMut(&E)>;

/// Publish/subscribe channel for one event type.
pub struct EventBus<E> {
    handlers: Vec<(SubscriptionId, Handler<E>)>,
    next_id: u64,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, handler: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Box::new(handler)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(handler_id, _)| *handler_id != id);
        self.handlers.len() != before
    }

    pub fn emit(&mut self, event: &E) {
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.handlers.len())
            .finish()
    }
}

/// Events raised by the project aggregate.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectEvent {
    NewPoint { track: TrackId, frame: FrameIndex },
    PointMoved { track: TrackId, frame: FrameIndex },
    PointRemoved { track: TrackId, frame: FrameIndex },
    PointRestored { track: TrackId, frame: FrameIndex },
    NewTrack(TrackId),
    DeleteTrack(TrackId),
    UndeleteTrack(TrackId),
    SwitchTrack(TrackId),
    TrackEdited(TrackId),
    TrackHidden { track: TrackId, hidden: bool },
    AxesCreated,
    AxesMoved,
    AxesRotated,
    ScaleCreated,
    ScaleChanged,
    ScaleDeleted,
    TrackingCommitted { track: TrackId, points: usize },
    Undo,
    Redo,
    /// Any mutation that leaves unsaved changes.
    Change,
    Saved,
    BackedUp,
    ViewportChanged,
}

/// Events raised by the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimelineEvent {
    Seek(FrameIndex),
    Play,
    Pause,
    TimingUpdate { duration: f64, fps: f64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_subscribe_and_emit() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();
        let sink = seen.clone();
        bus.subscribe(move |e: &TimelineEvent| sink.borrow_mut().push(*e));

        bus.emit(&TimelineEvent::Play);
        bus.emit(&TimelineEvent::Seek(FrameIndex(4)));
        assert_eq!(
            *seen.borrow(),
            vec![TimelineEvent::Play, TimelineEvent::Seek(FrameIndex(4))]
        );
    }

    #[test]
    fn test_unsubscribe() {
        let count = Rc::new(RefCell::new(0));
        let mut bus: EventBus<ProjectEvent> = EventBus::new();
        let c = count.clone();
        let id = bus.subscribe(move |_| *c.borrow_mut() += 1);
        bus.emit(&ProjectEvent::Change);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&ProjectEvent::Change);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
