//! Email and URL redaction.

use regex::Regex;

/// Replaces email addresses not on the safe list.
pub const SENDER_MARKER: &str = "[UNVERIFIED_SENDER_REDACTED]";
/// Replaces every URL.
pub const URL_MARKER: &str = "[PROTECTED_URL]";

/// Redacts email-shaped and URL-shaped substrings so an agent cannot act on
/// them.
pub struct EntityRedactor {
    email: Regex,
    url: Regex,
}

impl EntityRedactor {
    pub fn new() -> Self {
        Self {
            email: Regex::new(r"[a-zA-Z0-9._-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,6}")
                .expect("built-in email pattern"),
            url: Regex::new(r"https?://[^\s]+").expect("built-in URL pattern"),
        }
    }

    /// Replace emails (unless listed in `safe_list`, compared
    /// case-insensitively) and then URLs with their markers.
    pub fn redact<S: AsRef<str>>(&self, text: &str, safe_list: &[S]) -> String {
        let emails_done = self.email.replace_all(text, |caps: &regex::Captures<'_>| {
            let found = &caps[0];
            if safe_list
                .iter()
                .any(|safe| safe.as_ref().eq_ignore_ascii_case(found))
            {
                found.to_string()
            } else {
                SENDER_MARKER.to_string()
            }
        });
        self.url.replace_all(&emails_done, URL_MARKER).into_owned()
    }

    /// Whether the text holds anything [`redact`](Self::redact) would touch.
    pub fn contains_entities(&self, text: &str) -> bool {
        self.email.is_match(text) || self.url.is_match(text)
    }

    /// Email addresses in the text, in order.
    pub fn emails<'t>(&self, text: &'t str) -> Vec<&'t str> {
        self.email.find_iter(text).map(|m| m.as_str()).collect()
    }
}

impl Default for EntityRedactor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_SAFE: &[&str] = &[];

    #[test]
    fn test_redacts_email_and_url() {
        let redactor = EntityRedactor::new();
        let out = redactor.redact("Contact me at a@b.com or http://x.com", NO_SAFE);
        assert!(!out.contains("a@b.com"));
        assert!(!out.contains("http://x.com"));
        assert_eq!(
            out,
            "Contact me at [UNVERIFIED_SENDER_REDACTED] or [PROTECTED_URL]"
        );
    }

    #[test]
    fn test_safe_list_keeps_sender() {
        let redactor = EntityRedactor::new();
        let safe = ["A@B.com"];
        assert_eq!(
            redactor.redact("Contact me at a@b.com or http://x.com", &safe),
            "Contact me at a@b.com or [PROTECTED_URL]"
        );
        assert_eq!(redactor.redact("Reply to a@b.com", &safe), "Reply to a@b.com");
    }

    #[test]
    fn test_every_occurrence_is_replaced() {
        let redactor = EntityRedactor::new();
        let out = redactor.redact(
            "x@evil.io, y@evil.io and https://one.test/a https://two.test/b",
            NO_SAFE,
        );
        assert_eq!(out.matches(SENDER_MARKER).count(), 2);
        assert_eq!(out.matches(URL_MARKER).count(), 2);
    }

    #[test]
    fn test_plain_text_is_untouched() {
        let redactor = EntityRedactor::new();
        let text = "Nothing to see here, just a meeting at 10am.";
        assert!(!redactor.contains_entities(text));
        assert_eq!(redactor.redact(text, NO_SAFE), text);
        assert_eq!(redactor.emails("mail ops@corp.test now"), vec!["ops@corp.test"]);
    }
}
