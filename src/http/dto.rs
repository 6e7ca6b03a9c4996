//! Request and response bodies shared by the router and the HTTP client.
use crate::model::{empty_object, DonationStage, Notification};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashResponse {
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackRequest {
    pub event: String,
    #[serde(default = "empty_object")]
    pub data: Value,
}

/// Audit input; the server stamps the time.
#[derive(Debug, Clone, Deserialize)]
pub struct DonationEventRequest {
    pub event: DonationStage,
    pub donation_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub amount_cents: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "empty_object")]
    pub details: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnreadCountResponse {
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkReadResponse {
    pub changed: bool,
    pub notification: Notification,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadAllResponse {
    pub updated: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub limit: Option<i64>,
}
