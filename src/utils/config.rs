// Centralized configuration for Nuvex Bot

/// Discord embed colors
pub mod colors {
    pub const SUCCESS: u32 = 0x2ecc71;
    pub const INFO: u32 = 0x3498db;

    /// Used when a stored embed color fails to parse
    pub const FALLBACK: u32 = 0x00ff00;
}

/// Parse a stored 6-hex-digit embed color (no leading '#').
///
/// Any unparseable value falls back to [`colors::FALLBACK`] instead of
/// erroring; the raw string stays in the config untouched.
pub fn parse_embed_color(raw: &str) -> u32 {
    u32::from_str_radix(raw.trim(), 16).unwrap_or(colors::FALLBACK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_hex() {
        assert_eq!(parse_embed_color("FF0000"), 0xff0000);
        assert_eq!(parse_embed_color("00ff00"), 0x00ff00);
    }

    #[test]
    fn invalid_hex_falls_back() {
        assert_eq!(parse_embed_color("GGGGGG"), colors::FALLBACK);
        assert_eq!(parse_embed_color(""), colors::FALLBACK);
        assert_eq!(parse_embed_color("#FF0000"), colors::FALLBACK);
    }
}
