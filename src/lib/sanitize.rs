//! Redaction of credentials embedded in addresses.
//!
//! Only user-info that follows an `http://`, `https://` or `ssh://` scheme is treated as secret.
//! SCP-style remotes such as `git@host:ns/repo.git` carry a routing user, not a credential, and are
//! left alone.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// Replaces the user-info of a URL.
pub const REDACTION_MARKER: &str = "***";

// Runs to the last `@` before the path; passwords may contain `@`.
static USERINFO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:https?|ssh)://)[^/?#\s]+@").expect("user-info pattern is valid")
});

/// Redact every credential-bearing URL found in `text`.
///
/// Works on a bare URL as well as on free text such as subprocess output, so it can be applied to
/// any message before it leaves the crate.
///
/// ```
/// use fetch_asset::redact;
///
/// assert_eq!(redact("https://user:token@h/ns/repo.git"), "https://***@h/ns/repo.git");
/// assert_eq!(redact("git@h:ns/repo.git"), "git@h:ns/repo.git");
/// ```
pub fn redact(text: &str) -> Cow<'_, str> {
    USERINFO_RE.replace_all(text, format!("${{1}}{REDACTION_MARKER}@"))
}

#[cfg(test)]
mod test_redact {
    use super::*;

    #[test]
    fn https_userinfo_is_replaced() {
        assert_eq!(
            redact("https://user:token@h/ns/repo.git"),
            "https://***@h/ns/repo.git"
        );
        assert_eq!(redact("http://token@h/x"), "http://***@h/x");
    }

    #[test]
    fn password_containing_at_sign_is_replaced_whole() {
        assert_eq!(redact("https://u:p@ss@h/x"), "https://***@h/x");
        assert_eq!(redact("https://u:p@ss@h"), "https://***@h");
        assert_eq!(redact("see https://u:p@ss@h/x and a@b"), "see https://***@h/x and a@b");
    }

    #[test]
    fn at_sign_in_query_is_not_userinfo() {
        let s = "https://h?owner=a@b";
        assert_eq!(redact(s), s);
    }

    #[test]
    fn ssh_scheme_userinfo_is_replaced_and_port_kept() {
        assert_eq!(
            redact("ssh://git@host:2222/org/repo.git"),
            "ssh://***@host:2222/org/repo.git"
        );
    }

    #[test]
    fn scp_address_is_untouched() {
        assert!(matches!(redact("git@h:ns/repo.git"), Cow::Borrowed(_)));
        assert_eq!(redact("deploy@h:ns/repo.git"), "deploy@h:ns/repo.git");
    }

    #[test]
    fn urls_without_userinfo_are_untouched() {
        let s = "https://h/ns/repo@main/x";
        assert_eq!(redact(s), s);
    }

    #[test]
    fn every_url_in_free_text_is_redacted() {
        let text = "fatal: could not read from 'https://a:b@one/x' or 'HTTPS://c@two/y'";
        assert_eq!(
            redact(text),
            "fatal: could not read from 'https://***@one/x' or 'HTTPS://***@two/y'"
        );
    }
}
