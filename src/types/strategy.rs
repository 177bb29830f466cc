use std::time::Duration;

/// A named configuration profile for one extraction attempt.
///
/// Strategies are static data: the orchestrator only walks the table in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStrategy {
    pub name: &'static str,
    /// Upstream player clients to impersonate, in preference order
    pub client_identities: &'static [&'static str],
    /// Pass the credential bundle along when one is available
    pub use_credentials: bool,
    /// More internal extractor retries, forced IPv4
    pub aggressive: bool,
    /// Base backoff, multiplied by the strategy position
    pub base_delay: Duration,
}

const DEFAULT_STRATEGIES: [ExtractionStrategy; 5] = [
    ExtractionStrategy {
        name: "web-with-credentials",
        client_identities: &["web", "tv", "android"],
        use_credentials: true,
        aggressive: false,
        base_delay: Duration::from_secs(2),
    },
    ExtractionStrategy {
        name: "tv-anonymous",
        client_identities: &["tv", "android", "web"],
        use_credentials: false,
        aggressive: false,
        base_delay: Duration::from_secs(2),
    },
    ExtractionStrategy {
        name: "android-with-credentials",
        client_identities: &["android", "ios"],
        use_credentials: true,
        aggressive: false,
        base_delay: Duration::from_secs(3),
    },
    ExtractionStrategy {
        name: "ios-anonymous",
        client_identities: &["ios", "mweb"],
        use_credentials: false,
        aggressive: true,
        base_delay: Duration::from_secs(4),
    },
    ExtractionStrategy {
        name: "embedded-last-resort",
        client_identities: &["web_embedded", "tv", "mweb"],
        use_credentials: true,
        aggressive: true,
        base_delay: Duration::from_secs(5),
    },
];

/// The strategies tried for every download, most likely to succeed first
pub fn default_strategies() -> &'static [ExtractionStrategy] {
    &DEFAULT_STRATEGIES
}
