//! Dispatch options loaded from environment variables.

/// Behaviour switches shared by every sender.
///
/// Reads from environment variables:
/// - `DISPATCH_PUBLISH_EVENTS`: publish produced events (default: `true`)
/// - `DISPATCH_SAVE_COMMAND_DATA`: store domain commands with their events (default: `true`)
///
/// Individual commands may override either switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    pub publish_events: bool,
    pub save_command_data: bool,
}

impl DispatchOptions {
    /// Loads options from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads options through an arbitrary key lookup.
    ///
    /// Missing or unparsable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            publish_events: lookup("DISPATCH_PUBLISH_EVENTS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.publish_events),
            save_command_data: lookup("DISPATCH_SAVE_COMMAND_DATA")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.save_command_data),
        }
    }

    /// Sets whether events are published.
    pub fn with_publish_events(mut self, publish: bool) -> Self {
        self.publish_events = publish;
        self
    }

    /// Sets whether domain command data is stored.
    pub fn with_save_command_data(mut self, save: bool) -> Self {
        self.save_command_data = save;
        self
    }
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            publish_events: true,
            save_command_data: true,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
