//! Turns poller events into human-readable notifications.

use async_trait::async_trait;

use crate::events::PollerEvent;

/// Somewhere to report channel activity, such as a chat.
///
/// Delivery is best effort. The poller never waits on a sink and ignores its
/// failures.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_message(&self, text: &str);
    async fn send_images(&self, images: &[Vec<u8>], caption: Option<&str>);
}

/// Message for events worth reporting. `poll` and `pollSuccess` are routine
/// and render to nothing.
pub fn render(event: &PollerEvent) -> Option<String> {
    let message = match event {
        PollerEvent::Start { .. } => "Poller started".to_string(),
        PollerEvent::Poll | PollerEvent::PollSuccess => return None,
        PollerEvent::PollFail { error } => format!("Polling error: {}", error),
        PollerEvent::Error { error } => format!("Poller error: {}", error),
        PollerEvent::LiveStreamStart { live_stream } => {
            format!("Live stream found: {}", live_stream.title)
        }
        PollerEvent::LiveStreamSwitch {
            old_live_stream,
            new_live_stream,
        } => format!(
            "Live stream switched: from {} to {}",
            old_live_stream.title, new_live_stream.title
        ),
        PollerEvent::LiveStreamUpdate {
            old_live_stream,
            new_live_stream,
        } => format!(
            "Live stream updated: from {} to {}",
            old_live_stream.title, new_live_stream.title
        ),
        PollerEvent::LiveStreamEnd { live_stream } => {
            format!("Live stream ended: {}", live_stream.title)
        }
    };

    Some(message)
}

/// Writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send_message(&self, text: &str) {
        info!("{}", text);
    }

    async fn send_images(&self, images: &[Vec<u8>], caption: Option<&str>) {
        info!(
            "{} ({} image(s))",
            caption.unwrap_or("Screenshot"),
            images.len()
        );
    }
}

/// Renders `event` and hands it to `sink`, if it renders to anything.
pub async fn report(sink: &dyn NotificationSink, event: &PollerEvent) {
    if let Some(message) = render(event) {
        sink.send_message(&message).await;
    }
}
