//! Format checks shared by the built-in field kinds.

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;

use crate::field::Constraints;
use crate::value::Value;

static URL_REGEX: OnceLock<Regex> = OnceLock::new();
static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();

/// http(s) URL: dotted host name, `localhost` or IPv4, optional port and path.
pub(crate) fn url_regex() -> &'static Regex {
    URL_REGEX.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^https?://",
            r"(?:(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+[A-Z]{2,6}\.?|",
            r"localhost|",
            r"\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})",
            r"(?::\d+)?",
            r"(?:/?|[/?]\S+)$",
        ))
        .expect("Invalid URL regex")
    })
}

/// Dot-atom or quoted local part, dotted domain.
pub(crate) fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)(^[-!#$%&'*+/=?^_`{}|~0-9A-Z]+(\.[-!#$%&'*+/=?^_`{}|~0-9A-Z]+)*",
            r#"|^"([\x01-\x08\x0b\x0c\x0e-\x1f!#-\[\]-\x7f]|\\[\x01-\x09\x0b\x0c\x0e-\x7f])*""#,
            r")@(?:[A-Z0-9](?:[A-Z0-9-]{0,61}[A-Z0-9])?\.)+[A-Z]{2,6}\.?$",
        ))
        .expect("Invalid email regex")
    })
}

/// Match anchored at the first character, like a prefix match.
fn matches_from_start(regex: &Regex, s: &str) -> bool {
    regex.find(s).is_some_and(|m| m.start() == 0)
}

pub(crate) fn length_ok(len: usize, c: &Constraints) -> bool {
    c.max_length.is_none_or(|max| len <= max) && c.min_length.is_none_or(|min| len >= min)
}

pub(crate) fn in_range(n: f64, c: &Constraints) -> bool {
    c.min.is_none_or(|min| n >= min) && c.max.is_none_or(|max| n <= max)
}

/// String check: type, length in characters, then the preset and user
/// patterns. An empty string on an optional field passes any pattern.
pub(crate) fn string(value: &Value, c: &Constraints, preset: Option<&Regex>, required: bool) -> bool {
    let Value::String(s) = value else {
        return false;
    };
    if !length_ok(s.chars().count(), c) {
        return false;
    }
    for regex in preset.into_iter().chain(c.pattern.as_ref()) {
        if !matches_from_start(regex, s) {
            return s.is_empty() && !required;
        }
    }
    true
}

pub(crate) fn ip_address(value: &Value) -> bool {
    value.as_str().is_some_and(|s| s.parse::<IpAddr>().is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://www.yahoo.com/truc?par=23&machin=23", true)]
    #[case("https://localhost:8080/", true)]
    #[case("http://127.0.0.1", true)]
    #[case("bob", false)]
    #[case("ftp://example.com", false)]
    fn url_format(#[case] url: &str, #[case] expected: bool) {
        assert_eq!(matches_from_start(url_regex(), url), expected);
    }

    #[rstest]
    #[case("bob@sponge.com", true)]
    #[case("first.last+tag@mail.example.org", true)]
    #[case("\"quoted\"@example.com", true)]
    #[case("sponge.com", false)]
    #[case("bob@localhost", false)]
    fn email_format(#[case] email: &str, #[case] expected: bool) {
        assert_eq!(matches_from_start(email_regex(), email), expected);
    }

    #[rstest]
    #[case("194.117.200.10", true)]
    #[case("127.0.0.1", true)]
    #[case("::1", true)]
    #[case("2001:0db8:85a3:0042:0000:8a2e:0370:7334", true)]
    #[case("bob", false)]
    #[case("256.1.1.1", false)]
    fn ip_literals(#[case] ip: &str, #[case] expected: bool) {
        assert_eq!(ip_address(&Value::from(ip)), expected);
    }

    #[test]
    fn pattern_exemption_only_for_optional_empty_strings() {
        let c = Constraints {
            pattern: Some(Regex::new("^ok").unwrap()),
            ..Default::default()
        };
        assert!(string(&Value::from("okbaby"), &c, None, false));
        assert!(!string(&Value::from("nok"), &c, None, false));
        assert!(string(&Value::from(""), &c, None, false));
        assert!(!string(&Value::from(""), &c, None, true));
    }

    #[test]
    fn length_counts_characters() {
        let c = Constraints {
            min_length: Some(3),
            max_length: Some(8),
            ..Default::default()
        };
        assert!(string(&Value::from("Bob"), &c, None, false));
        assert!(string(&Value::from("héllo"), &c, None, false));
        assert!(!string(&Value::from("a"), &c, None, false));
        assert!(!string(&Value::from("abcdefghit"), &c, None, false));
        assert!(!string(&Value::from(4), &c, None, false));
    }
}
