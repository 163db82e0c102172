//! Events published by the poller and the registry that fans them out.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::extractor::LiveStream;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PollerEvent {
    #[serde(rename_all = "camelCase")]
    Start {
        channel_name: String,
        poll_interval_ms: u64,
        started_at: DateTime<Utc>,
    },
    Poll,
    PollSuccess,
    PollFail {
        error: String,
    },
    /// Non-fatal anomaly, such as more than one live video in a poll.
    Error {
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    LiveStreamStart {
        live_stream: LiveStream,
    },
    #[serde(rename_all = "camelCase")]
    LiveStreamSwitch {
        old_live_stream: LiveStream,
        new_live_stream: LiveStream,
    },
    #[serde(rename_all = "camelCase")]
    LiveStreamUpdate {
        old_live_stream: LiveStream,
        new_live_stream: LiveStream,
    },
    #[serde(rename_all = "camelCase")]
    LiveStreamEnd {
        live_stream: LiveStream,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Poll,
    PollSuccess,
    PollFail,
    Error,
    LiveStreamStart,
    LiveStreamSwitch,
    LiveStreamUpdate,
    LiveStreamEnd,
}

impl PollerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PollerEvent::Start { .. } => EventKind::Start,
            PollerEvent::Poll => EventKind::Poll,
            PollerEvent::PollSuccess => EventKind::PollSuccess,
            PollerEvent::PollFail { .. } => EventKind::PollFail,
            PollerEvent::Error { .. } => EventKind::Error,
            PollerEvent::LiveStreamStart { .. } => EventKind::LiveStreamStart,
            PollerEvent::LiveStreamSwitch { .. } => EventKind::LiveStreamSwitch,
            PollerEvent::LiveStreamUpdate { .. } => EventKind::LiveStreamUpdate,
            PollerEvent::LiveStreamEnd { .. } => EventKind::LiveStreamEnd,
        }
    }

    /// True for the four events that describe a change of live stream.
    pub fn is_transition(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::LiveStreamStart
                | EventKind::LiveStreamSwitch
                | EventKind::LiveStreamUpdate
                | EventKind::LiveStreamEnd
        )
    }
}

type Listener = Arc<dyn Fn(&PollerEvent) + Send + Sync>;

/// Delivers events to per-kind listeners, synchronously and in registration
/// order, and to any broadcast subscribers.
pub struct Emitter {
    listeners: RwLock<HashMap<EventKind, Vec<Listener>>>,
    tx: broadcast::Sender<PollerEvent>,
}

impl Emitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            listeners: RwLock::new(HashMap::new()),
            tx,
        }
    }

    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&PollerEvent) + Send + Sync + 'static,
    {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(kind)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Receives every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<PollerEvent> {
        self.tx.subscribe()
    }

    /// [`Emitter::subscribe`] as a `Stream`. Items are `Err` when the
    /// subscriber lagged and events were dropped.
    pub fn subscribe_stream(&self) -> BroadcastStream<PollerEvent> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub fn emit(&self, event: PollerEvent) {
        // Clone the list so listeners may register more listeners.
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&event.kind())
            .cloned()
            .unwrap_or_default();

        for listener in listeners {
            listener(&event);
        }

        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;

    fn stream(id: &str, title: &str) -> LiveStream {
        LiveStream {
            id: id.into(),
            title: title.into(),
            url: format!("/watch?v={}", id),
        }
    }

    #[test]
    fn listeners_are_per_kind_and_ordered() {
        let emitter = Emitter::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            emitter.on(EventKind::PollFail, move |event| {
                if let PollerEvent::PollFail { error } = event {
                    seen.lock().unwrap().push(format!("{}:{}", tag, error));
                }
            });
        }
        let polls = seen.clone();
        emitter.on(EventKind::Poll, move |_| polls.lock().unwrap().push("poll".into()));

        emitter.emit(PollerEvent::Poll);
        emitter.emit(PollerEvent::PollFail {
            error: "timeout".into(),
        });
        emitter.emit(PollerEvent::PollSuccess);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["poll", "first:timeout", "second:timeout"]
        );
    }

    #[test]
    fn broadcast_subscribers_see_everything() {
        let emitter = Emitter::default();
        let mut rx = emitter.subscribe();

        emitter.emit(PollerEvent::Poll);
        emitter.emit(PollerEvent::LiveStreamEnd {
            live_stream: stream("abc", "Hello"),
        });

        assert_eq!(rx.try_recv().unwrap(), PollerEvent::Poll);
        let end = rx.try_recv().unwrap();
        assert_eq!(end.kind(), EventKind::LiveStreamEnd);
        assert!(end.is_transition());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stream_subscribers_report_lag() {
        use tokio_stream::{wrappers::errors::BroadcastStreamRecvError, StreamExt};

        let emitter = Emitter::new(2);
        let mut events = emitter.subscribe_stream();

        emitter.emit(PollerEvent::Poll);
        emitter.emit(PollerEvent::PollSuccess);
        emitter.emit(PollerEvent::Poll);

        assert_eq!(
            events.next().await,
            Some(Err(BroadcastStreamRecvError::Lagged(1)))
        );
        assert_eq!(events.next().await, Some(Ok(PollerEvent::PollSuccess)));
        assert_eq!(events.next().await, Some(Ok(PollerEvent::Poll)));
    }

    #[test]
    fn serializes_tagged_camel_case() {
        let event = PollerEvent::LiveStreamSwitch {
            old_live_stream: stream("abc", "Hello"),
            new_live_stream: stream("xyz", "World"),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "event": "liveStreamSwitch",
                "oldLiveStream": {"id": "abc", "title": "Hello", "url": "/watch?v=abc"},
                "newLiveStream": {"id": "xyz", "title": "World", "url": "/watch?v=xyz"},
            })
        );
        assert_eq!(
            serde_json::to_value(PollerEvent::PollSuccess).unwrap(),
            json!({"event": "pollSuccess"})
        );
    }
}
