//! Inbound push payloads: the flat transport bundle, its normalization, and
//! the canonical JSON form the rest of the pipeline reads.

mod bundle;
mod notification_payload;

pub use bundle::{normalize_bundle, Bundle, DEFAULT_ACTION_ID};
pub use notification_payload::{ActionButton, NotificationPayload};

/// Keys read verbatim from the transport bundle.
pub mod keys {
    pub const CUSTOM: &str = "custom";
    pub const NOTIFICATION_ID: &str = "i";
    pub const ADDITIONAL_DATA: &str = "a";
    pub const MINIFIED_BUTTONS: &str = "o";
    pub const ACTION_BUTTONS: &str = "actionButtons";
    pub const ACTION_ID: &str = "actionId";
    pub const ALERT: &str = "alert";
    pub const TITLE: &str = "title";
    pub const GROUP: &str = "grp";
    pub const GROUP_MESSAGE: &str = "grp_msg";
    pub const COLLAPSE: &str = "collapse_key";
    pub const PRIORITY: &str = "pri";
    pub const VISIBILITY: &str = "vis";
    pub const LARGE_ICON: &str = "licon";
    pub const BIG_PICTURE: &str = "bicon";
    pub const SMALL_ICON: &str = "sicon";
    pub const BACKGROUND_IMAGE: &str = "bg_img";
    pub const TTL: &str = "ttl";
    pub const GOOGLE_TTL: &str = "google.ttl";
    pub const GOOGLE_SENT_TIME: &str = "google.sent_time";
    pub const IN_APP_PREVIEW: &str = "os_in_app_message_preview_id";
}

/// Collapse key value that disables collapsing.
pub const DO_NOT_COLLAPSE: &str = "do_not_collapse";

/// Placeholder substituted with the group size in `grp_msg`.
pub const NOTIF_COUNT_PLACEHOLDER: &str = "$[notif_count]";
