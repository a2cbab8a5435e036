//! Network name comparison.
//!
//! Platforms report SSIDs inconsistently: some wrap them in double quotes
//! (`"Home"`), others return the bare name. Every comparison in this crate
//! goes through [`normalize_ssid`].

/// Strip the leading and trailing runs of `"` from a network name.
pub fn normalize_ssid(ssid: &str) -> &str {
    ssid.trim_start_matches('"').trim_end_matches('"')
}

/// Two network names are equal iff their normalized forms are identical.
pub fn ssids_equal(ssid: &str, other: &str) -> bool {
    normalize_ssid(ssid) == normalize_ssid(other)
}

/// Wrap a name in quotes, the form network configuration stores expect.
pub fn quote_ssid(ssid: &str) -> String {
    format!("\"{}\"", normalize_ssid(ssid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_and_bare_names_normalize_equal() {
        assert_eq!(normalize_ssid("\"X\""), "X");
        assert_eq!(normalize_ssid("X"), "X");
        assert!(ssids_equal("\"Home\"", "Home"));
    }

    #[test]
    fn strips_whole_quote_runs_only_at_the_ends() {
        assert_eq!(normalize_ssid("\"\"Cafe \"Bar\"\"\""), "Cafe \"Bar");
        assert_eq!(normalize_ssid("\"\""), "");
        assert_eq!(normalize_ssid(""), "");
    }

    #[test]
    fn comparison_is_case_sensitive() {
        assert!(!ssids_equal("home", "Home"));
    }

    #[test]
    fn quoting_is_stable() {
        assert_eq!(quote_ssid("Home"), "\"Home\"");
        assert_eq!(quote_ssid("\"Home\""), "\"Home\"");
    }
}
