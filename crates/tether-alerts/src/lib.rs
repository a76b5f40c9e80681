//! Alert dispatch for the Tether platform.
//!
//! Builds emergency notifications and fans them out to a subject's
//! observers through an external push channel. Delivery is best-effort
//! and independent per recipient: one unreachable observer never blocks
//! the rest, there is no internal retry, and the dispatcher reports
//! counts rather than failing the overall alert.
//!
//! The external channel is abstracted behind [`PushChannel`] so tests can
//! record or fail deliveries; the production implementation is
//! [`CourierChannel`], a thin `reqwest` client for the Courier send API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tether_types::GeoPosition;

/// Default Courier send endpoint.
pub const COURIER_SEND_URL: &str = "https://api.courier.com/send";

/// A notification payload: title, body, and structured data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

impl Notification {
    /// Builds the emergency alert for a subject: the body names the
    /// subject, the data block carries their id and current position so
    /// an observer's device can jump straight to the map.
    pub fn emergency(subject_id: &str, subject_name: &str, position: Option<GeoPosition>) -> Self {
        Self {
            title: "🚨 Help Needed".to_string(),
            body: format!("{} needs your help!", subject_name),
            data: json!({
                "subject_id": subject_id,
                "latitude": position.map(|p| p.latitude),
                "longitude": position.map(|p| p.longitude),
            }),
        }
    }
}

/// Errors a push channel can report for a single delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The request never completed (connect, timeout, TLS, ...).
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The channel answered with a non-success status.
    #[error("push channel rejected the request: status {0}")]
    Rejected(reqwest::StatusCode),
}

/// One attempt to hand a notification to an external push channel.
///
/// Implementations own their transport-level semantics (the channel's
/// retry/ack behavior is outside this system's control); the dispatcher
/// treats any `Err` as a recorded-and-skipped recipient.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn deliver(
        &self,
        recipient_id: &str,
        notification: &Notification,
    ) -> Result<(), DeliveryError>;
}

/// Courier push channel.
pub struct CourierChannel {
    client: reqwest::Client,
    auth_token: String,
    send_url: String,
}

impl CourierChannel {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self::with_send_url(auth_token, COURIER_SEND_URL)
    }

    /// Overrides the send endpoint (tests point this at a local server).
    pub fn with_send_url(auth_token: impl Into<String>, send_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth_token: auth_token.into(),
            send_url: send_url.into(),
        }
    }
}

#[async_trait]
impl PushChannel for CourierChannel {
    async fn deliver(
        &self,
        recipient_id: &str,
        notification: &Notification,
    ) -> Result<(), DeliveryError> {
        let payload = json!({
            "message": {
                "to": { "user_id": recipient_id },
                "content": {
                    "title": notification.title,
                    "body": notification.body,
                },
                "data": notification.data,
            }
        });

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.auth_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected(status));
        }
        Ok(())
    }
}

/// Push backend selected at startup.
///
/// `Disabled` is used when no push credentials are configured: deliveries
/// are logged and counted as attempted, nothing leaves the process.
pub enum PushBackend {
    Courier(CourierChannel),
    Disabled,
}

#[async_trait]
impl PushChannel for PushBackend {
    async fn deliver(
        &self,
        recipient_id: &str,
        notification: &Notification,
    ) -> Result<(), DeliveryError> {
        match self {
            Self::Courier(channel) => channel.deliver(recipient_id, notification).await,
            Self::Disabled => {
                tracing::debug!(recipient_id, "push channel disabled; dropping notification");
                Ok(())
            }
        }
    }
}

/// Outcome of one fan-out: how many recipients were attempted and how
/// many individual deliveries failed. The alert as a whole succeeds
/// either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Fans notifications out to recipient sets through a [`PushChannel`].
pub struct AlertDispatcher<C> {
    channel: C,
}

impl<C: PushChannel> AlertDispatcher<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Attempts delivery to every recipient, once each. Failures are
    /// logged and counted; they never abort the loop. An empty recipient
    /// set is a no-op.
    pub async fn dispatch(&self, recipients: &[String], notification: &Notification) -> DispatchReport {
        let mut report = DispatchReport {
            attempted: recipients.len(),
            failed: 0,
        };

        for recipient in recipients {
            if let Err(e) = self.channel.deliver(recipient, notification).await {
                report.failed += 1;
                tracing::warn!(recipient = %recipient, "alert delivery failed: {}", e);
            }
        }

        if report.failed > 0 {
            tracing::warn!(
                attempted = report.attempted,
                failed = report.failed,
                "alert fan-out completed with partial delivery failure"
            );
        } else {
            tracing::info!(attempted = report.attempted, "alert fan-out completed");
        }
        report
    }
}

#[cfg(test)]
mod tests;
