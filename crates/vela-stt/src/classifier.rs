//! Keyword and status-code heuristics for provider failures.
//!
//! Providers do not share structured error codes, so classification works on the
//! free-text message plus the HTTP status. An unrecognized transient error falls
//! through to [`ErrorClass::Permanent`], which only costs extra attempts later.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Budget or rate-limit exhaustion. Marks the provider exhausted.
    QuotaExceeded,
    /// Network or server-side instability.
    Transient,
    /// Bad input, rejected format, missing credential, or anything unrecognized.
    Permanent,
}

impl ErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota_exceeded",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const QUOTA_KEYWORDS: &[&str] = &[
    "quota",
    "exceeded",
    "insufficient",
    "limit reached",
    "out of credits",
    "insufficient_quota",
    "rate_limit_exceeded",
    "rate-limit-exceeded",
    "billing",
    "payment required",
];

const QUOTA_STATUSES: &[u16] = &[402, 429];

const TRANSIENT_KEYWORDS: &[&str] = &[
    "timeout",
    "timed out",
    "connection",
    "network",
    "temporary",
    "unavailable",
    "try again",
];

const TRANSIENT_STATUSES: &[u16] = &[500, 502, 503, 504];

/// Classify a failure from its status code and message.
///
/// Quota is checked before transient, so a message matching both keyword sets is
/// treated as quota exhaustion. Either the keyword or the status alone is enough.
#[must_use]
pub fn classify(status: Option<u16>, message: &str) -> ErrorClass {
    let lower = message.to_lowercase();
    let matches = |keywords: &[&str]| keywords.iter().any(|kw| lower.contains(kw));
    let status_in = |codes: &[u16]| status.is_some_and(|s| codes.contains(&s));

    if matches(QUOTA_KEYWORDS) || status_in(QUOTA_STATUSES) {
        ErrorClass::QuotaExceeded
    } else if matches(TRANSIENT_KEYWORDS) || status_in(TRANSIENT_STATUSES) {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_status_codes() {
        assert_eq!(classify(Some(402), ""), ErrorClass::QuotaExceeded);
        assert_eq!(classify(Some(429), "too many"), ErrorClass::QuotaExceeded);
    }

    #[test]
    fn quota_keywords_case_insensitive() {
        assert_eq!(
            classify(None, "Insufficient_Quota: check your plan"),
            ErrorClass::QuotaExceeded
        );
        assert_eq!(
            classify(Some(400), "Payment Required"),
            ErrorClass::QuotaExceeded
        );
        assert_eq!(
            classify(None, "account is out of credits"),
            ErrorClass::QuotaExceeded
        );
    }

    #[test]
    fn transient_status_codes() {
        for code in [500, 502, 503, 504] {
            assert_eq!(classify(Some(code), "boom"), ErrorClass::Transient);
        }
    }

    #[test]
    fn transient_keywords() {
        assert_eq!(
            classify(None, "connection reset by peer"),
            ErrorClass::Transient
        );
        assert_eq!(
            classify(Some(400), "Service temporarily unavailable"),
            ErrorClass::Transient
        );
        assert_eq!(classify(None, "please try again"), ErrorClass::Transient);
    }

    #[test]
    fn quota_wins_over_transient() {
        assert_eq!(
            classify(Some(503), "rate limit reached, try again later"),
            ErrorClass::QuotaExceeded
        );
        assert_eq!(
            classify(None, "network quota exceeded"),
            ErrorClass::QuotaExceeded
        );
    }

    #[test]
    fn unknown_is_permanent() {
        assert_eq!(
            classify(Some(400), "Invalid file format"),
            ErrorClass::Permanent
        );
        assert_eq!(classify(None, ""), ErrorClass::Permanent);
        assert_eq!(classify(Some(404), "not found"), ErrorClass::Permanent);
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(ErrorClass::QuotaExceeded.to_string(), "quota_exceeded");
        assert_eq!(ErrorClass::Transient.to_string(), "transient");
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn quota_keyword_anywhere_is_quota(
            prefix in "[a-z ]{0,20}",
            suffix in "[a-z ]{0,20}",
            status in proptest::option::of(100u16..600),
        ) {
            let msg = format!("{prefix}QUOTA{suffix}");
            prop_assert_eq!(classify(status, &msg), ErrorClass::QuotaExceeded);
        }

        #[test]
        fn quota_statuses_ignore_message(msg in ".{0,40}") {
            prop_assert_eq!(classify(Some(429), &msg), ErrorClass::QuotaExceeded);
            prop_assert_eq!(classify(Some(402), &msg), ErrorClass::QuotaExceeded);
        }
    }
}
