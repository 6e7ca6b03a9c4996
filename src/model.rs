use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single notification addressed to one recipient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default = "empty_object")]
    pub data: Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Producer input for a new notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNotification {
    pub recipient_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

impl NewNotification {
    pub fn new(
        recipient_id: impl Into<String>,
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            data: empty_object(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

pub(crate) fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Row-level change published on the realtime feed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Notification),
    Update(Notification),
}

impl ChangeEvent {
    pub fn notification(&self) -> &Notification {
        match self {
            ChangeEvent::Insert(n) | ChangeEvent::Update(n) => n,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeEvent::Insert(_) => "insert",
            ChangeEvent::Update(_) => "update",
        }
    }
}

/// Donation lifecycle stages recorded by the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DonationStage {
    DonationCreated,
    PaymentInitiated,
    PaymentSucceeded,
    PaymentFailed,
    DonationRefunded,
}

impl DonationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStage::DonationCreated => "donation_created",
            DonationStage::PaymentInitiated => "payment_initiated",
            DonationStage::PaymentSucceeded => "payment_succeeded",
            DonationStage::PaymentFailed => "payment_failed",
            DonationStage::DonationRefunded => "donation_refunded",
        }
    }
}

/// One line of the donation audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DonationEvent {
    pub timestamp: DateTime<Utc>,
    pub event: DonationStage,
    pub donation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_cents: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default = "empty_object")]
    pub details: Value,
}

impl DonationEvent {
    pub fn new(event: DonationStage, donation_id: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            donation_id: donation_id.into(),
            user_id: None,
            amount_cents: None,
            currency: None,
            details: empty_object(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_uses_type_on_the_wire() {
        let n = NewNotification::new("u1", "bid_accepted", "Bid accepted", "Your bid won");
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["type"], "bid_accepted");
        assert_eq!(v["data"], json!({}));
        assert!(v.get("kind").is_none());
    }

    #[test]
    fn new_notification_data_defaults_to_empty_object() {
        let n: NewNotification = serde_json::from_value(json!({
            "recipient_id": "u1",
            "type": "message",
            "title": "Hi",
            "message": "hello"
        }))
        .unwrap();
        assert_eq!(n.data, json!({}));
    }

    #[test]
    fn donation_stage_serializes_snake_case() {
        let ev = DonationEvent::new(DonationStage::PaymentSucceeded, "don-1");
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["event"], DonationStage::PaymentSucceeded.as_str());
        assert!(v.get("user_id").is_none());
    }
}
