use std::sync::Arc;

use crate::platform::Platform;

pub const CHANNEL_ID: &str = "auto_call_channel";
pub const NOTIFICATION_ID: i32 = 1001;
pub const TITLE: &str = "Auto Call Service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel_id: &'static str,
    pub id: i32,
    pub title: &'static str,
    pub text: String,
}

impl Notification {
    pub fn status(text: impl Into<String>) -> Self {
        Self {
            channel_id: CHANNEL_ID,
            id: NOTIFICATION_ID,
            title: TITLE,
            text: text.into(),
        }
    }

    /// Tag used to replace the previous post instead of stacking a new one.
    pub fn tag(&self) -> String {
        format!("{}:{}", self.channel_id, self.id)
    }
}

/// Keeps the single service notification up to date. `cmd notification`
/// posts on the shell's own channel, so the channel id only scopes the tag.
#[derive(Clone)]
pub struct Notifier {
    platform: Arc<dyn Platform>,
}

impl Notifier {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    pub fn update(&self, text: impl Into<String>) {
        let notification = Notification::status(text);
        if let Err(e) = self.platform.post_notification(&notification) {
            tracing::warn!(error = %e, text = %notification.text, "failed to post notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::FakePlatform;

    #[test]
    fn updates_replace_one_notification() {
        let platform = Arc::new(FakePlatform::new(34));
        let notifier = Notifier::new(platform.clone());
        notifier.update("Service started");
        notifier.update("Waiting for calls...");
        assert_eq!(platform.notifications(), ["Service started", "Waiting for calls..."]);
        assert_eq!(Notification::status("x").tag(), "auto_call_channel:1001");
    }
}
