use super::keys;
use crate::error::PipelineError;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{trace, warn};

/// Flat string key/value payload as delivered by push transports.
pub type Bundle = HashMap<String, String>;

/// Action id recorded when the notification body itself is tapped.
pub const DEFAULT_ACTION_ID: &str = "__DEFAULT__";

/// Expand the minified `o` button list into `custom.a.actionButtons`.
///
/// Each minified entry `{n, i, p}` becomes `{text, id, icon}`; `id` falls back
/// to the text. `o` is always removed. A malformed `o` or `custom` is logged
/// and leaves `custom` untouched.
pub fn normalize_bundle(mut bundle: Bundle) -> Bundle {
    let Some(minified) = bundle.remove(keys::MINIFIED_BUTTONS) else {
        return bundle;
    };

    match maximize_buttons(&minified, bundle.get(keys::CUSTOM).map(String::as_str)) {
        Ok(custom) => {
            bundle.insert(keys::CUSTOM.to_string(), custom);
        }
        Err(err) => warn!("Dropping action buttons: {}", err),
    }
    bundle
}

fn maximize_buttons(minified: &str, custom: Option<&str>) -> Result<String, PipelineError> {
    let buttons: Vec<Map<String, Value>> =
        serde_json::from_str(minified).map_err(|source| PipelineError::MalformedPayload {
            field: keys::MINIFIED_BUTTONS,
            source,
        })?;

    let mut custom: Map<String, Value> = match custom {
        Some(raw) => serde_json::from_str(raw).map_err(|source| PipelineError::MalformedPayload {
            field: keys::CUSTOM,
            source,
        })?,
        None => Map::new(),
    };

    let action_buttons: Vec<Value> = buttons
        .iter()
        .map(|button| {
            let text = button.get("n").cloned().unwrap_or(Value::Null);
            let id = button.get("i").cloned().unwrap_or_else(|| text.clone());
            let mut full = json!({ "text": text, "id": id });
            if let Some(icon) = button.get("p") {
                full["icon"] = icon.clone();
            }
            full
        })
        .collect();
    trace!("Expanded {} action button(s)", action_buttons.len());

    let additional = custom
        .entry(keys::ADDITIONAL_DATA)
        .or_insert_with(|| Value::Object(Map::new()));
    if !additional.is_object() {
        *additional = Value::Object(Map::new());
    }
    if let Value::Object(additional) = additional {
        additional.insert(keys::ACTION_BUTTONS.to_string(), Value::Array(action_buttons));
        additional.insert(
            keys::ACTION_ID.to_string(),
            Value::String(DEFAULT_ACTION_ID.to_string()),
        );
    }

    Ok(Value::Object(custom).to_string())
}
