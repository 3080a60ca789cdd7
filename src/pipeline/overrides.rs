use serde::Serialize;

/// Developer-supplied changes to how a notification is displayed.
///
/// Every field is optional; `None` keeps whatever the payload or an earlier
/// override said.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisplayOverride {
    pub title: Option<String>,
    pub body: Option<String>,
    pub android_id: Option<i32>,
    pub accent_color: Option<String>,
    pub small_icon: Option<String>,
    pub large_icon: Option<String>,
    pub visibility: Option<i64>,
}

impl DisplayOverride {
    /// Combine with a newer override; fields set in `newer` win.
    pub fn merge(&self, newer: &DisplayOverride) -> DisplayOverride {
        fn pick<T: Clone>(old: &Option<T>, new: &Option<T>) -> Option<T> {
            new.clone().or_else(|| old.clone())
        }
        DisplayOverride {
            title: pick(&self.title, &newer.title),
            body: pick(&self.body, &newer.body),
            android_id: newer.android_id.or(self.android_id),
            accent_color: pick(&self.accent_color, &newer.accent_color),
            small_icon: pick(&self.small_icon, &newer.small_icon),
            large_icon: pick(&self.large_icon, &newer.large_icon),
            visibility: newer.visibility.or(self.visibility),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == DisplayOverride::default()
    }
}
