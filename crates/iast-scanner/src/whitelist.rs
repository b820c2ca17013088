//! The configured URL skip list, checked before an endpoint is scanned
//!.

use regex::Regex;

/// `true` iff `path_and_query` (the combined `path?query`) matches the
/// configured skip regex and should be counted and skipped rather than
/// handed to plugins.
pub fn is_whitelisted(skip_regex: Option<&Regex>, path_and_query: &str) -> bool {
    skip_regex.map(|re| re.is_match(path_and_query)).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_regex_never_skips() {
        assert!(!is_whitelisted(None, "/admin/health"));
    }

    #[test]
    fn matching_regex_skips() {
        let re = Regex::new("^/admin/").unwrap();
        assert!(is_whitelisted(Some(&re), "/admin/health?x=1"));
        assert!(!is_whitelisted(Some(&re), "/api/users"));
    }
}
