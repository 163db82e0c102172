//! The poll loop and live stream state machine.
//!
//! Each cycle fetches the channel's browse responses, reduces them to at most
//! one live stream and compares it with the stream seen last time:
//!
//! | current | observed                | event              |
//! |---------|-------------------------|--------------------|
//! | none    | none                    | -                  |
//! | none    | `V`                     | `LiveStreamStart`  |
//! | `L`     | same id, same title     | -                  |
//! | `L`     | same id, other title    | `LiveStreamUpdate` |
//! | `L`     | other id                | `LiveStreamSwitch` |
//! | `L`     | none                    | `LiveStreamEnd`    |
//!
//! A failed cycle leaves the current stream untouched.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    config::{ConfigError, PollerConfig},
    events::{Emitter, EventKind, PollerEvent},
    extractor::{self, LiveStream},
    session::{BrowserProvider, SessionCache, SessionError},
    template::{self, TemplateValues},
    transport::{Endpoint, PollTransport, TransportError},
};

#[derive(thiserror::Error, Debug)]
pub enum PollError {
    #[error("session error: {0}")]
    SessionError(#[from] SessionError),
    #[error("transport error: {0}")]
    TransportError(#[from] TransportError),
}

impl PollError {
    pub fn is_auth(&self) -> bool {
        matches!(self, PollError::TransportError(e) if e.is_auth())
    }
}

/// The live stream currently known for a channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollState {
    pub current: Option<LiveStream>,
}

impl PollState {
    /// Moves to `observed` and returns the event describing the change, if
    /// there was one.
    pub fn apply(&mut self, observed: Option<LiveStream>) -> Option<PollerEvent> {
        let event = match (self.current.take(), observed.clone()) {
            (None, None) => None,
            (None, Some(new)) => Some(PollerEvent::LiveStreamStart { live_stream: new }),
            (Some(old), Some(new)) if old.id != new.id => Some(PollerEvent::LiveStreamSwitch {
                old_live_stream: old,
                new_live_stream: new,
            }),
            (Some(old), Some(new)) if old.title != new.title => {
                Some(PollerEvent::LiveStreamUpdate {
                    old_live_stream: old,
                    new_live_stream: new,
                })
            }
            (Some(_), Some(_)) => None,
            (Some(old), None) => Some(PollerEvent::LiveStreamEnd { live_stream: old }),
        };

        self.current = observed;
        event
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Success,
    Failed,
    /// Another cycle was still running.
    Skipped,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Clears the poller's running flag when the scheduling task is dropped,
/// whether it finished or was aborted before its first poll.
struct Scheduled(Arc<Poller>);

impl Drop for Scheduled {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

/// Watches one channel.
pub struct Poller {
    config: PollerConfig,
    local_values: TemplateValues,
    session: SessionCache,
    transport: Arc<dyn PollTransport>,
    emitter: Emitter,
    state: Mutex<PollState>,
    in_flight: AtomicBool,
    running: AtomicBool,
}

impl Poller {
    pub fn new(
        config: PollerConfig,
        browser: Arc<dyn BrowserProvider>,
        transport: Arc<dyn PollTransport>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let local_values = config.local_values();
        let session = SessionCache::new(browser, &config.channel_url, &local_values);

        Ok(Self {
            config,
            local_values,
            session,
            transport,
            emitter: Emitter::default(),
            state: Mutex::new(PollState::default()),
            in_flight: AtomicBool::new(false),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionCache {
        &self.session
    }

    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&PollerEvent) + Send + Sync + 'static,
    {
        self.emitter.on(kind, listener);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PollerEvent> {
        self.emitter.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<PollerEvent> {
        self.emitter.subscribe_stream()
    }

    pub fn current_live_stream(&self) -> Option<LiveStream> {
        self.lock_state().current.clone()
    }

    /// True while a schedule started by [`Poller::spawn`] is alive.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts polling on the configured interval. Dropping the handle stops
    /// the schedule.
    ///
    /// Returns `None` if this poller already has a live schedule.
    pub fn spawn(self: Arc<Self>) -> Option<PollerHandle> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!(
                "Poller for {} is already running, not spawning again",
                self.config.channel_name
            );
            return None;
        }

        let scheduled = Scheduled(self);
        Some(PollerHandle {
            task: tokio::spawn(async move {
                let scheduled = scheduled;
                scheduled.0.run().await
            }),
        })
    }

    async fn run(&self) {
        let interval = self.config.poll_interval();
        info!(
            "Polling channel {} every {:?}",
            self.config.channel_name, interval
        );
        self.emitter.emit(PollerEvent::Start {
            channel_name: self.config.channel_name.clone(),
            poll_interval_ms: self.config.poll_interval,
            started_at: Utc::now(),
        });

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut busy_until: Option<Instant> = None;

        loop {
            let deadline = ticker.tick().await;
            if busy_until.map_or(false, |end| deadline < end) {
                debug!("Dropping tick that fell inside the previous cycle");
                continue;
            }

            self.poll_once().await;
            busy_until = Some(Instant::now());
        }
    }

    /// Runs one poll cycle and emits its events.
    pub async fn poll_once(&self) -> CycleOutcome {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            debug!("Poll already in flight, skipping");
            return CycleOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        debug!("Polling");
        self.emitter.emit(PollerEvent::Poll);

        let responses = match self.fetch().await {
            Ok(responses) => responses,
            Err(e) => {
                if e.is_auth() {
                    warn!("Session rejected, deriving a new one next cycle");
                    self.session.reset();
                }
                warn!("Poll failed: {}", e);
                self.emitter.emit(PollerEvent::PollFail {
                    error: e.to_string(),
                });
                return CycleOutcome::Failed;
            }
        };

        debug!("Poll OK");
        self.emitter.emit(PollerEvent::PollSuccess);

        let extraction = extractor::extract(&responses);
        if extraction.is_ambiguous() {
            let ids = extraction
                .candidates
                .iter()
                .map(|c| c.id.as_str())
                .collect::<Vec<_>>();
            let error = format!("ambiguous live video: {}", ids.join(", "));
            warn!("{}, using {}", error, ids[0]);
            self.emitter.emit(PollerEvent::Error { error });
        }

        let transition = self.lock_state().apply(extraction.into_live_stream());
        if let Some(event) = transition {
            log_transition(&event);
            self.emitter.emit(event);
        }

        CycleOutcome::Success
    }

    async fn fetch(&self) -> Result<Vec<Value>, PollError> {
        let session = self.session.get().await?;
        let session_values = session.template_values();
        let expand = |t: &str| template::expand_two_pass(t, &self.local_values, &session_values);

        let endpoint = Endpoint {
            scheme: self.config.api_scheme.clone(),
            host: expand(&self.config.api_host),
            path: expand(&self.config.api_path),
        };
        let unresolved = template::unresolved_markers(&endpoint.path);
        if !unresolved.is_empty() {
            warn!("Unresolved markers in request path: {}", unresolved.join(", "));
        }

        let endpoint = &endpoint;
        let requests = self.config.query_params.iter().map(|params| {
            let payload = json!({
                "context": session.context,
                "browseId": session.channel_id,
                "params": expand(params),
            });
            async move { self.transport.post_json(endpoint, &payload).await }
        });

        Ok(futures::future::try_join_all(requests).await?)
    }

    fn lock_state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn log_transition(event: &PollerEvent) {
    match event {
        PollerEvent::LiveStreamStart { live_stream } => {
            info!("Live stream found: {} ({})", live_stream.title, live_stream.id)
        }
        PollerEvent::LiveStreamSwitch {
            old_live_stream,
            new_live_stream,
        } => info!(
            "Live stream switched: {} -> {}",
            old_live_stream.id, new_live_stream.id
        ),
        PollerEvent::LiveStreamUpdate {
            new_live_stream, ..
        } => info!(
            "Live stream updated: {} is now titled {}",
            new_live_stream.id, new_live_stream.title
        ),
        PollerEvent::LiveStreamEnd { live_stream } => {
            info!("Live stream ended: {}", live_stream.id)
        }
        _ => (),
    }
}

/// Owns the scheduling task of a spawned [`Poller`].
pub struct PollerHandle {
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Cancels the schedule. A cycle in progress is abandoned.
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
