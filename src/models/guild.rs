use serde::{Deserialize, Serialize};

/// Per-guild verification configuration, mutated only by the setup wizard.
///
/// A record is created with these defaults on first access and persisted
/// immediately; it is never deleted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GuildConfig {
    /// All mandatory wizard steps finished; gates deployment and re-entry
    pub setup_complete: bool,
    /// Verification prompt title (max 256 chars, enforced by the modal)
    pub embed_title: String,
    /// Verification prompt body (max 4000 chars, enforced by the modal)
    pub embed_description: String,
    /// Accent color as 6 hex digits without '#'; invalid values fall back
    /// to the default color at render time
    pub embed_color: String,
    /// Verify-button caption (max 80 chars)
    pub button_label: String,
    /// Verify-button icon, if any
    pub button_emoji: Option<String>,
    /// Role granted on successful verification; unset blocks deployment
    pub verified_role_id: Option<u64>,
    /// Audit log destination; unset disables logging
    pub log_channel_id: Option<u64>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            setup_complete: false,
            embed_title: "This is the title".to_string(),
            embed_description: "This is the description. Use the buttons below \
                to set the title, description and hex color (without #)."
                .to_string(),
            embed_color: "00FF00".to_string(),
            button_label: "Verify".to_string(),
            button_emoji: Some("🔐".to_string()),
            verified_role_id: None,
            log_channel_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_not_setup_complete() {
        let config = GuildConfig::default();
        assert!(!config.setup_complete);
        assert_eq!(config.embed_color, "00FF00");
        assert_eq!(config.button_label, "Verify");
        assert_eq!(config.button_emoji.as_deref(), Some("🔐"));
        assert!(config.verified_role_id.is_none());
        assert!(config.log_channel_id.is_none());
    }

    #[test]
    fn serde_round_trip_preserves_optional_fields() {
        let mut config = GuildConfig::default();
        config.verified_role_id = Some(42);

        let json = serde_json::to_string(&config).unwrap();
        let back: GuildConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back, config);
        assert!(back.log_channel_id.is_none());
    }
}
