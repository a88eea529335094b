use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const PROVIDER_TIMESTAMP_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// One status received from the provider, kept exactly as delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    payload: Value,
}

impl StreamEvent {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

/// Durable form of a [`StreamEvent`]. Written in batches only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status_id: Option<u64>,
    pub text: String,
    pub lang: Option<String>,
    pub truncated: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub user_id: Option<u64>,
    pub user_screen_name: Option<String>,
    pub user_name: Option<String>,
    pub user_verified: bool,
    pub user_followers_count: Option<u64>,
    pub in_reply_to_status_id: Option<u64>,
    /// Id of the embedded original when this status is a retweet. The original itself is not stored.
    pub retweeted_status_id: Option<u64>,
    pub retweet_count: u64,
    pub favorite_count: u64,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl StatusRecord {
    /// Pure conversion; fields missing from the payload fall back to empty values.
    pub fn from_event(event: &StreamEvent) -> Self {
        let payload = event.payload();
        let user = payload.get("user");
        let (longitude, latitude) = coordinates(payload);

        Self {
            status_id: id_field(payload, "id"),
            text: status_text(payload),
            lang: str_field(payload, "lang"),
            truncated: bool_field(payload, "truncated"),
            created_at: payload
                .get("created_at")
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
            user_id: user.and_then(|user| id_field(user, "id")),
            user_screen_name: user.and_then(|user| str_field(user, "screen_name")),
            user_name: user.and_then(|user| str_field(user, "name")),
            user_verified: user
                .map(|user| bool_field(user, "verified"))
                .unwrap_or(false),
            user_followers_count: user
                .and_then(|user| user.get("followers_count"))
                .and_then(Value::as_u64),
            in_reply_to_status_id: id_field(payload, "in_reply_to_status_id"),
            retweeted_status_id: payload
                .get("retweeted_status")
                .and_then(|original| id_field(original, "id")),
            retweet_count: payload
                .get("retweet_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            favorite_count: payload
                .get("favorite_count")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            latitude,
            longitude,
        }
    }
}

fn status_text(payload: &Value) -> String {
    payload
        .get("extended_tweet")
        .and_then(|extended| extended.get("full_text"))
        .or_else(|| payload.get("full_text"))
        .or_else(|| payload.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Prefers the `<key>_str` variant because numeric ids can exceed what some producers encode
/// losslessly as JSON numbers.
fn id_field(value: &Value, key: &str) -> Option<u64> {
    let str_key = format!("{key}_str");
    value
        .get(&str_key)
        .and_then(Value::as_str)
        .and_then(|raw| raw.trim().parse().ok())
        .or_else(|| value.get(key).and_then(Value::as_u64))
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

// GeoJSON order: [longitude, latitude]
fn coordinates(payload: &Value) -> (Option<f64>, Option<f64>) {
    let point = payload
        .get("coordinates")
        .and_then(|geo| geo.get("coordinates"))
        .and_then(Value::as_array);

    match point.map(Vec::as_slice) {
        Some([lon, lat]) => (lon.as_f64(), lat.as_f64()),
        _ => (None, None),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, PROVIDER_TIMESTAMP_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
