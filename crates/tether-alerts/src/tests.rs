use std::sync::Mutex;

use async_trait::async_trait;
use tether_types::GeoPosition;

use super::*;

/// Records every delivery; fails the recipients named in `fail_for`.
#[derive(Default)]
struct RecordingChannel {
    delivered: Mutex<Vec<String>>,
    fail_for: Vec<String>,
}

#[async_trait]
impl PushChannel for RecordingChannel {
    async fn deliver(
        &self,
        recipient_id: &str,
        _notification: &Notification,
    ) -> Result<(), DeliveryError> {
        if self.fail_for.iter().any(|id| id == recipient_id) {
            return Err(DeliveryError::Rejected(reqwest::StatusCode::BAD_GATEWAY));
        }
        self.delivered.lock().unwrap().push(recipient_id.to_string());
        Ok(())
    }
}

#[test]
fn emergency_notification_carries_subject_and_position() {
    let notification = Notification::emergency(
        "s-1",
        "Avery",
        Some(GeoPosition {
            latitude: 12.34,
            longitude: 56.78,
        }),
    );

    assert!(notification.body.contains("Avery"));
    assert_eq!(notification.data["subject_id"], "s-1");
    assert_eq!(notification.data["latitude"], 12.34);
    assert_eq!(notification.data["longitude"], 56.78);
}

#[test]
fn emergency_notification_without_position_is_null() {
    let notification = Notification::emergency("s-1", "Avery", None);
    assert!(notification.data["latitude"].is_null());
    assert!(notification.data["longitude"].is_null());
}

#[tokio::test]
async fn dispatch_reaches_every_recipient() {
    let dispatcher = AlertDispatcher::new(RecordingChannel::default());
    let notification = Notification::emergency("s-1", "Avery", None);
    let recipients = vec!["o-1".to_string(), "o-2".to_string(), "o-3".to_string()];

    let report = dispatcher.dispatch(&recipients, &notification).await;

    assert_eq!(report.attempted, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(
        *dispatcher.channel.delivered.lock().unwrap(),
        vec!["o-1", "o-2", "o-3"]
    );
}

#[tokio::test]
async fn one_failed_recipient_does_not_block_the_rest() {
    let channel = RecordingChannel {
        delivered: Mutex::new(Vec::new()),
        fail_for: vec!["o-2".to_string()],
    };
    let dispatcher = AlertDispatcher::new(channel);
    let notification = Notification::emergency("s-1", "Avery", None);
    let recipients = vec!["o-1".to_string(), "o-2".to_string(), "o-3".to_string()];

    let report = dispatcher.dispatch(&recipients, &notification).await;

    assert_eq!(report.attempted, 3, "attempted counts every recipient");
    assert_eq!(report.failed, 1);
    assert_eq!(
        *dispatcher.channel.delivered.lock().unwrap(),
        vec!["o-1", "o-3"],
        "the failure is skipped, not fatal"
    );
}

#[tokio::test]
async fn empty_recipient_set_is_a_noop() {
    let dispatcher = AlertDispatcher::new(RecordingChannel::default());
    let notification = Notification::emergency("s-1", "Avery", None);

    let report = dispatcher.dispatch(&[], &notification).await;

    assert_eq!(report, DispatchReport::default());
    assert!(dispatcher.channel.delivered.lock().unwrap().is_empty());
}

#[tokio::test]
async fn disabled_backend_counts_without_sending() {
    let dispatcher = AlertDispatcher::new(PushBackend::Disabled);
    let notification = Notification::emergency("s-1", "Avery", None);
    let recipients = vec!["o-1".to_string()];

    let report = dispatcher.dispatch(&recipients, &notification).await;
    assert_eq!(report.attempted, 1);
    assert_eq!(report.failed, 0);
}
