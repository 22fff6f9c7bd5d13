use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::{NotificationEvent, User, UserId};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivery channel a gateway serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Push,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Push => "push",
            Channel::Sms => "sms",
        }
    }
}

/// Outbound delivery port. Implementations must not touch booking state;
/// the caller decides what a failed delivery means (nothing, beyond a log
/// line).
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(&self, recipient: &User, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Writes every delivery to the log. Stands in for the real push and SMS
/// providers in local and development runs.
pub struct LogNotificationGateway {
    channel: Channel,
}

impl LogNotificationGateway {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl NotificationGateway for LogNotificationGateway {
    async fn notify(&self, recipient: &User, event: &NotificationEvent) -> Result<(), NotifyError> {
        info!(
            "[{}] to user {} ({}): {}",
            self.channel.as_str(),
            recipient.id,
            recipient.name,
            event.render_text()
        );
        Ok(())
    }
}

/// Captures deliveries for assertions. Flip `set_failing` to exercise the
/// failure path.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(UserId, NotificationEvent)>>,
    failing: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<(UserId, NotificationEvent)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, recipient: UserId) -> Vec<NotificationEvent> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(user, _)| *user == recipient)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.sent.lock().await.clear();
    }
}

#[async_trait]
impl NotificationGateway for RecordingGateway {
    async fn notify(&self, recipient: &User, event: &NotificationEvent) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("recording gateway set to fail".into()));
        }
        self.sent.lock().await.push((recipient.id, event.clone()));
        Ok(())
    }
}

/// Sends one event to one recipient, bounded by `timeout`. Failures and
/// timeouts are logged and swallowed; the booking state is already
/// committed by the time anything is dispatched.
pub async fn deliver(
    gateway: &dyn NotificationGateway,
    recipient: &User,
    event: &NotificationEvent,
    timeout: Duration,
) {
    match tokio::time::timeout(timeout, gateway.notify(recipient, event)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(
            "Notification {} to user {} failed: {}",
            event.kind(),
            recipient.id,
            e
        ),
        Err(_) => warn!(
            "Notification {} to user {} timed out after {:?}",
            event.kind(),
            recipient.id,
            timeout
        ),
    }
}
