use std::{fmt::Display, sync::OnceLock};

use regex::RegexSet;

use crate::result::Error;

/// Why an attempt failed, as far as the retry decision is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    InvalidInput,
    /// Live broadcast
    UnsupportedContent,
    /// Private, removed or region-blocked
    ContentUnavailable,
    AuthRequired,
    BotDetected,
    RateLimited,
    /// Network or timeout trouble
    Transient,
    Unknown,
}

impl Classification {
    /// Whether no other strategy can do better
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Classification::InvalidInput
                | Classification::UnsupportedContent
                | Classification::ContentUnavailable
        )
    }

    /// Remediation advice shown to the user
    pub fn hint(self) -> &'static str {
        match self {
            Classification::AuthRequired | Classification::BotDetected => {
                "The site asked to sign in. Export cookies.txt from a browser where you are \
                 logged in and upload it with the form."
            }
            Classification::RateLimited => {
                "Too many requests were made. Wait a while or route the service through a \
                 residential proxy."
            }
            Classification::Transient => "The connection failed. Check connectivity and retry.",
            Classification::ContentUnavailable => {
                "The content is private, removed or blocked in this region."
            }
            Classification::UnsupportedContent => "Live broadcasts cannot be downloaded.",
            Classification::InvalidInput => "Paste the full link of a single video.",
            Classification::Unknown => "Retry later. Updating the extractor may help.",
        }
    }
}

impl Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Classification::InvalidInput => "invalid-input",
            Classification::UnsupportedContent => "unsupported-content",
            Classification::ContentUnavailable => "content-unavailable",
            Classification::AuthRequired => "auth-required",
            Classification::BotDetected => "bot-detected",
            Classification::RateLimited => "rate-limited",
            Classification::Transient => "transient",
            Classification::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Message patterns, first match wins.
/// Unavailable content comes before sign-in requests: a private video also suggests `--cookies`.
const RULES: [(Classification, &str); 6] = [
    (
        Classification::UnsupportedContent,
        r"live event will begin|premieres in \d|is a live stream|is live now",
    ),
    (
        Classification::BotDetected,
        r"not a bot|not a robot|unusual traffic|http error 403",
    ),
    (
        Classification::ContentUnavailable,
        r"video unavailable|private video|has been removed|no longer available|not available in your country|blocked it in your country|has been terminated|copyright claim|http error 404|http error 410",
    ),
    (
        Classification::AuthRequired,
        r"sign in to confirm your age|age.restricted|login required|requires authentication|members.only|join this channel|cookies are no longer valid|use --cookies",
    ),
    (
        Classification::RateLimited,
        r"http error 429|too many requests|rate.limit",
    ),
    (
        Classification::Transient,
        r"timed out|timeout|connection (reset|refused|aborted)|temporary failure in name resolution|network is unreachable|http error 5\d\d|incomplete ?read|unable to download (webpage|api page)|remote end closed|eof occurred|ssl",
    ),
];

static RULE_SET: OnceLock<RegexSet> = OnceLock::new();

fn rule_set() -> &'static RegexSet {
    RULE_SET.get_or_init(|| {
        RegexSet::new(RULES.iter().map(|(_, pattern)| *pattern))
            .expect("classification patterns are valid")
    })
}

/// Classify an extractor message
pub fn classify_message(message: &str) -> Classification {
    let lower = message.to_lowercase();
    rule_set()
        .matches(&lower)
        .iter()
        .next()
        .map_or(Classification::Unknown, |idx| RULES[idx].0)
}

/// Classify any failure of an attempt
pub fn classify(err: &Error) -> Classification {
    match err {
        Error::InvalidInput(_) => Classification::InvalidInput,
        Error::UnsupportedContent => Classification::UnsupportedContent,
        Error::ContentUnavailable(_) => Classification::ContentUnavailable,
        Error::AllStrategiesFailed { classification, .. } => *classification,
        Error::Extractor(message) => classify_message(message),
        Error::OutputResolutionFailed(_) | Error::Io(_) | Error::Miette(_) => {
            Classification::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{classify, classify_message, Classification};
    use crate::result::Error;

    #[test]
    fn classifies_extractor_messages() {
        let cases = [
            (
                "[youtube] ABCDEFGHIJK: Sign in to confirm you're not a bot. Use --cookies-from-browser",
                Classification::BotDetected,
            ),
            (
                "[youtube] ABCDEFGHIJK: Sign in to confirm your age",
                Classification::AuthRequired,
            ),
            (
                "[youtube] ABCDEFGHIJK: Video unavailable. This video has been removed by the uploader",
                Classification::ContentUnavailable,
            ),
            (
                "[youtube] ABCDEFGHIJK: Private video. Sign in if you've been granted access to this \
                 video. Use --cookies-from-browser or --cookies for the authentication. See \
                 https://github.com/yt-dlp/yt-dlp/wiki/FAQ for how to manually pass cookies",
                Classification::ContentUnavailable,
            ),
            (
                "[youtube] ABCDEFGHIJK: This video is only available to Music Premium members. \
                 Use --cookies-from-browser or --cookies for the authentication",
                Classification::AuthRequired,
            ),
            (
                "Unable to download webpage: HTTP Error 429: Too Many Requests",
                Classification::RateLimited,
            ),
            (
                "Unable to download webpage: The read operation timed out",
                Classification::Transient,
            ),
            (
                "[youtube] ABCDEFGHIJK: This live event will begin in 3 hours",
                Classification::UnsupportedContent,
            ),
            ("Something nobody anticipated", Classification::Unknown),
        ];

        for (message, expected) in cases {
            assert_eq!(classify_message(message), expected, "{message}");
        }
    }

    #[test]
    fn classifies_errors() {
        assert_eq!(
            classify(&Error::Extractor("HTTP Error 503".to_owned())),
            Classification::Transient
        );
        assert_eq!(
            classify(&Error::UnsupportedContent),
            Classification::UnsupportedContent
        );
        assert_eq!(
            classify(&Error::OutputResolutionFailed("/tmp".into())),
            Classification::Unknown
        );
        assert!(Classification::ContentUnavailable.is_final());
        assert!(!Classification::BotDetected.is_final());
    }

    #[test]
    fn hints_do_not_leak_names() {
        for classification in [
            Classification::AuthRequired,
            Classification::RateLimited,
            Classification::Transient,
            Classification::Unknown,
        ] {
            assert!(!classification.hint().contains(&classification.to_string()));
        }
    }
}
