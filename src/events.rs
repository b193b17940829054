//! Structured progress events and the fan-out bus.
//!
//! Every intent gets a stream id; the engine publishes typed events onto the
//! bus and any number of consumers (GUI, logs, tests) subscribe per stream.
//! Publishing never blocks the engine: each consumer owns a bounded ring that
//! drops its oldest entry when full, and the first drop is reported to that
//! consumer with a single warning event. Subscribers that arrive late replay
//! the stream's backlog, so the terminal event is always observable.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::trace;
use uuid::Uuid;

/// Identifier of one intent's event stream.
pub type StreamId = Uuid;

/// Capacity of each consumer's ring buffer.
const CONSUMER_BUFFER: usize = 256;

/// How many completed streams keep their backlog for late subscribers.
const RETAINED_STREAMS: usize = 64;

/// What happened, with kind-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Free-form progress note.
    ProgressLine {
        /// Human-readable progress text
        line: String,
    },

    /// A command line was written to the device.
    CommandIssued {
        /// The literal command (never a secret)
        command: String,
    },

    /// Output captured for the most recently issued command.
    CommandOutput {
        /// The command the output belongs to
        command: String,
        /// Verbatim device output
        output: String,
    },

    /// Something non-fatal worth surfacing.
    Warning {
        /// Warning text
        message: String,
    },

    /// The intent completed and verification passed.
    TerminalSuccess {
        /// Intent family name
        intent: String,
    },

    /// The intent failed.
    TerminalFailure {
        /// Machine-readable reason tag (see error taxonomy)
        reason: String,
        /// Human-readable message
        message: String,
    },
}

impl EventKind {
    /// True for either terminal variant.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::TerminalSuccess { .. } | EventKind::TerminalFailure { .. }
        )
    }
}

/// One event on a stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Which intent stream this belongs to.
    pub stream_id: StreamId,
    /// When the event was published.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

impl Event {
    fn new(stream_id: StreamId, kind: EventKind) -> Self {
        Self {
            stream_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}

struct ConsumerShared {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    lost: std::sync::atomic::AtomicBool,
}

struct StreamState {
    backlog: Vec<Event>,
    consumers: Vec<Arc<ConsumerShared>>,
    terminated: bool,
}

impl StreamState {
    fn new() -> Self {
        Self {
            backlog: Vec::new(),
            consumers: Vec::new(),
            terminated: false,
        }
    }
}

#[derive(Default)]
struct BusState {
    streams: std::collections::HashMap<StreamId, StreamState>,
    /// Completed streams in finish order; oldest are evicted past the cap.
    finished: VecDeque<StreamId>,
}

/// Many-to-many fan-out of events keyed by stream id.
#[derive(Default)]
pub struct EventBus {
    state: Mutex<BusState>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stream so subscribers can attach before any event flows.
    pub fn open_stream(&self) -> StreamId {
        let stream_id = Uuid::new_v4();
        self.state
            .lock()
            .streams
            .insert(stream_id, StreamState::new());
        stream_id
    }

    /// Publishes an event. Non-blocking: full consumers drop their oldest
    /// buffered event. Events after the terminal one are discarded. A
    /// terminal event moves the stream onto the bounded finished list, so
    /// long-lived buses do not accumulate state without limit.
    pub fn publish(&self, stream_id: StreamId, kind: EventKind) {
        let event = Event::new(stream_id, kind);
        let mut state = self.state.lock();
        let Some(stream) = state.streams.get_mut(&stream_id) else {
            trace!(%stream_id, "publish to unknown stream dropped");
            return;
        };
        if stream.terminated {
            trace!(%stream_id, "publish after terminal event dropped");
            return;
        }
        let terminal = event.kind.is_terminal();
        if terminal {
            stream.terminated = true;
        }
        stream.backlog.push(event.clone());
        // Live consumers hold their own queues, so delivery already happened
        // even if the stream is evicted right after.
        for consumer in &stream.consumers {
            push_bounded(consumer, event.clone());
        }
        if terminal {
            state.finished.push_back(stream_id);
            while state.finished.len() > RETAINED_STREAMS {
                if let Some(oldest) = state.finished.pop_front() {
                    state.streams.remove(&oldest);
                }
            }
        }
    }

    /// Subscribes to a stream. The subscription first replays the backlog,
    /// then receives live events, and ends after the terminal event.
    pub fn subscribe(&self, stream_id: StreamId) -> EventSubscription {
        let shared = Arc::new(ConsumerShared {
            queue: Mutex::new(VecDeque::with_capacity(CONSUMER_BUFFER)),
            notify: Notify::new(),
            lost: std::sync::atomic::AtomicBool::new(false),
        });
        let mut state = self.state.lock();
        let stream = state
            .streams
            .entry(stream_id)
            .or_insert_with(StreamState::new);
        {
            let mut queue = shared.queue.lock();
            for event in &stream.backlog {
                queue.push_back(event.clone());
            }
        }
        stream.consumers.push(Arc::clone(&shared));
        EventSubscription {
            stream_id,
            shared,
            done: false,
            loss_reported: false,
        }
    }

    /// Number of streams currently holding state, finished ones included.
    pub fn stream_count(&self) -> usize {
        self.state.lock().streams.len()
    }
}

fn push_bounded(consumer: &Arc<ConsumerShared>, event: Event) {
    use std::sync::atomic::Ordering;

    let mut queue = consumer.queue.lock();
    if queue.len() >= CONSUMER_BUFFER {
        queue.pop_front();
        consumer.lost.store(true, Ordering::Relaxed);
    }
    queue.push_back(event);
    drop(queue);
    consumer.notify.notify_one();
}

/// One consumer's view of a stream.
pub struct EventSubscription {
    stream_id: StreamId,
    shared: Arc<ConsumerShared>,
    done: bool,
    loss_reported: bool,
}

impl EventSubscription {
    /// The stream this subscription follows.
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Receives the next event, waiting for it if necessary. Returns `None`
    /// once the terminal event has been delivered.
    pub async fn recv(&mut self) -> Option<Event> {
        use std::sync::atomic::Ordering;

        if self.done {
            return None;
        }
        // Report buffer loss exactly once, in-band, before newer events.
        if !self.loss_reported && self.shared.lost.load(Ordering::Relaxed) {
            self.loss_reported = true;
            return Some(Event::new(
                self.stream_id,
                EventKind::Warning {
                    message: "event buffer overflowed; oldest events were dropped".into(),
                },
            ));
        }
        loop {
            if let Some(event) = self.shared.queue.lock().pop_front() {
                if event.kind.is_terminal() {
                    self.done = true;
                }
                return Some(event);
            }
            self.shared.notify.notified().await;
        }
    }

    /// Collects every remaining event through the terminal one.
    pub async fn collect(mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_order_and_stream_ends_at_terminal() {
        let bus = EventBus::new();
        let stream_id = bus.open_stream();
        let sub = bus.subscribe(stream_id);

        bus.publish(
            stream_id,
            EventKind::CommandIssued {
                command: "system-view".into(),
            },
        );
        bus.publish(
            stream_id,
            EventKind::TerminalSuccess {
                intent: "dhcp_pool".into(),
            },
        );
        bus.publish(
            stream_id,
            EventKind::Warning {
                message: "should be discarded".into(),
            },
        );

        let events = sub.collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].kind, EventKind::CommandIssued { .. }));
        assert!(events[1].kind.is_terminal());
    }

    #[tokio::test]
    async fn late_subscriber_replays_backlog() {
        let bus = EventBus::new();
        let stream_id = bus.open_stream();
        bus.publish(
            stream_id,
            EventKind::ProgressLine {
                line: "resolving device".into(),
            },
        );
        bus.publish(
            stream_id,
            EventKind::TerminalFailure {
                reason: "timeout".into(),
                message: "deadline exceeded".into(),
            },
        );

        let events = bus.subscribe(stream_id).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1].kind,
            EventKind::TerminalFailure { reason, .. } if reason == "timeout"
        ));
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_warns_once() {
        let bus = EventBus::new();
        let stream_id = bus.open_stream();
        let mut sub = bus.subscribe(stream_id);

        for i in 0..(CONSUMER_BUFFER + 10) {
            bus.publish(
                stream_id,
                EventKind::ProgressLine {
                    line: format!("line {}", i),
                },
            );
        }
        bus.publish(
            stream_id,
            EventKind::TerminalSuccess {
                intent: "stp".into(),
            },
        );

        let mut warnings = 0;
        let mut last_terminal = false;
        while let Some(event) = sub.recv().await {
            if matches!(&event.kind, EventKind::Warning { message } if message.contains("overflowed"))
            {
                warnings += 1;
            }
            last_terminal = event.kind.is_terminal();
        }
        assert_eq!(warnings, 1);
        assert!(last_terminal);
    }

    #[tokio::test]
    async fn finished_streams_are_retained_up_to_a_bound() {
        let bus = EventBus::new();
        let mut recent = None;
        for _ in 0..(RETAINED_STREAMS + 20) {
            let stream_id = bus.open_stream();
            bus.publish(
                stream_id,
                EventKind::ProgressLine {
                    line: "working".into(),
                },
            );
            bus.publish(
                stream_id,
                EventKind::TerminalSuccess {
                    intent: "stp".into(),
                },
            );
            recent = Some(stream_id);
        }

        assert!(bus.stream_count() <= RETAINED_STREAMS);

        // A recently finished stream still replays its backlog for a late
        // subscriber.
        let events = bus.subscribe(recent.unwrap()).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[1].kind.is_terminal());
    }

    #[test]
    fn event_kinds_serialize_with_kind_tag() {
        let kind = EventKind::TerminalFailure {
            reason: "cancelled".into(),
            message: "Intent cancelled by caller".into(),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["kind"], "terminal_failure");
        assert_eq!(json["reason"], "cancelled");
    }
}
