use super::{keys, normalize_bundle, Bundle, DO_NOT_COLLAPSE, NOTIF_COUNT_PLACEHOLDER};
use crate::error::PipelineError;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

/// Canonical payload: a JSON object whose top-level keys are the transport
/// keys. Nested envelopes (`custom`, `bg_img`) stay encoded as strings and are
/// parsed on demand, so a malformed one only hides that field.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    fields: Map<String, Value>,
}

/// One expanded action button.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionButton {
    pub id: String,
    pub text: String,
    pub icon: Option<String>,
}

impl NotificationPayload {
    /// Normalize a transport bundle into its canonical form.
    pub fn from_bundle(bundle: Bundle) -> Self {
        let fields = normalize_bundle(bundle)
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Self { fields }
    }

    /// Parse a payload stored in the `full_data` column.
    pub fn from_json_str(raw: &str) -> Result<Self, PipelineError> {
        let fields: Map<String, Value> =
            serde_json::from_str(raw).map_err(|source| PipelineError::MalformedPayload {
                field: "full_data",
                source,
            })?;
        Ok(Self { fields })
    }

    pub fn to_json_string(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }

    /// Top-level value as text. Numbers and booleans are rendered, empty
    /// strings count as absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        match self.fields.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Decode a nested JSON envelope, logging and hiding it when malformed.
    fn nested_object(&self, key: &'static str) -> Option<Map<String, Value>> {
        match self.fields.get(key)? {
            Value::Object(obj) => Some(obj.clone()),
            Value::String(raw) => match serde_json::from_str::<Map<String, Value>>(raw) {
                Ok(obj) => Some(obj),
                Err(source) => {
                    warn!(
                        "{}",
                        PipelineError::MalformedPayload { field: key, source }
                    );
                    None
                }
            },
            _ => None,
        }
    }

    /// The `custom` envelope.
    pub fn custom(&self) -> Option<Map<String, Value>> {
        self.nested_object(keys::CUSTOM)
    }

    /// Backend id (`custom.i`). A payload without one did not come from this
    /// backend.
    pub fn notification_id(&self) -> Option<String> {
        match self.custom()?.get(keys::NOTIFICATION_ID)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Developer data (`custom.a`).
    pub fn additional_data(&self) -> Option<Map<String, Value>> {
        match self.custom()?.remove(keys::ADDITIONAL_DATA)? {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn action_buttons(&self) -> Vec<ActionButton> {
        let Some(Value::Array(buttons)) = self
            .additional_data()
            .and_then(|mut a| a.remove(keys::ACTION_BUTTONS))
        else {
            return Vec::new();
        };
        buttons
            .iter()
            .filter_map(|b| {
                let text = b.get("text")?.as_str()?.to_string();
                let id = b
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| text.clone());
                let icon = b.get("icon").and_then(Value::as_str).map(str::to_string);
                Some(ActionButton { id, text, icon })
            })
            .collect()
    }

    /// Id of an in-app message to preview instead of a notification.
    pub fn in_app_preview_id(&self) -> Option<String> {
        self.additional_data()?
            .get(keys::IN_APP_PREVIEW)?
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    pub fn title(&self) -> Option<String> {
        self.get_str(keys::TITLE)
    }

    /// Alert text.
    pub fn body(&self) -> Option<String> {
        self.get_str(keys::ALERT)
    }

    pub fn group_id(&self) -> Option<String> {
        self.get_str(keys::GROUP)
    }

    /// Group summary template, if the payload supplies one.
    pub fn group_message(&self) -> Option<String> {
        self.get_str(keys::GROUP_MESSAGE)
    }

    /// Summary text for a group of `count` notifications.
    pub fn summary_text(&self, count: usize) -> String {
        match self.group_message() {
            Some(template) => template.replace(NOTIF_COUNT_PLACEHOLDER, &count.to_string()),
            None => format!("{} new messages", count),
        }
    }

    /// Collapse key, unless it is the no-collapse sentinel.
    pub fn collapse_id(&self) -> Option<String> {
        self.get_str(keys::COLLAPSE)
            .filter(|c| c != DO_NOT_COLLAPSE)
    }

    /// Priority 0..=10; missing or unparseable means 0.
    pub fn priority(&self) -> i64 {
        self.get_i64(keys::PRIORITY).unwrap_or(0)
    }

    pub fn is_high_priority(&self) -> bool {
        self.priority() > 9
    }

    pub fn visibility(&self) -> Option<i64> {
        self.get_i64(keys::VISIBILITY)
    }

    pub fn small_icon(&self) -> Option<String> {
        self.get_str(keys::SMALL_ICON)
    }

    pub fn large_icon(&self) -> Option<String> {
        self.get_str(keys::LARGE_ICON)
    }

    pub fn big_picture(&self) -> Option<String> {
        self.get_str(keys::BIG_PICTURE)
    }

    /// Background image layout (`bg_img`).
    pub fn background_image(&self) -> Option<Map<String, Value>> {
        self.nested_object(keys::BACKGROUND_IMAGE)
    }

    /// Time to live in seconds.
    pub fn ttl_secs(&self) -> Option<i64> {
        self.get_i64(keys::GOOGLE_TTL)
            .or_else(|| self.get_i64(keys::TTL))
    }

    /// Backend send time in epoch milliseconds.
    pub fn sent_time_ms(&self) -> Option<i64> {
        self.get_i64(keys::GOOGLE_SENT_TIME)
    }

    /// Expire time: send time (or `now`) plus the payload TTL (or `default_ttl`).
    ///
    /// Non-positive send times and negative TTLs fall back to the defaults.
    /// The sum saturates instead of overflowing.
    pub fn expire_at(&self, now: i64, default_ttl: i64) -> i64 {
        let base = self
            .sent_time_ms()
            .filter(|ms| *ms > 0)
            .map(|ms| ms / 1000)
            .unwrap_or(now);
        let ttl = self
            .ttl_secs()
            .filter(|ttl| *ttl >= 0)
            .unwrap_or(default_ttl);
        base.saturating_add(ttl)
    }

    /// Replace a top-level field.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }
}
