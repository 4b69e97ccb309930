//! Engine configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::Error;

/// Product prefixes recognized by the request locator
pub const DEFAULT_API_PREFIXES: [&str; 2] = ["api", "platform"];

/// Issuers whose tokens identify in-cluster service accounts
pub const DEFAULT_SERVICE_ACCOUNT_ISSUERS: [&str; 2] = [
    "kubernetes/serviceaccount",
    "https://kubernetes.default.svc.cluster.local",
];

const DEFAULT_EXPAND_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 290;
const DEFAULT_WATCH_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// How a permission's constraints are compared with a request's
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Every constrained dimension must match; cluster matches by list membership
    #[default]
    Strict,
    /// Compatibility mode: the first mismatching dimension decides, and the
    /// request passes only if its cluster is in the permission's cluster list
    Legacy,
}

impl MatchMode {
    /// Label value for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Legacy => "legacy",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "legacy" => Ok(Self::Legacy),
            other => Err(Error::invalid_argument(format!(
                "unknown match mode {other:?}, expected strict or legacy"
            ))),
        }
    }
}

/// Configuration for the authorization engine
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    /// First path segments that mark a resource request
    pub api_prefixes: Vec<String>,
    /// Constraint matching policy
    pub match_mode: MatchMode,
    /// Upper bound on a single permission expansion
    pub expand_timeout: Duration,
    /// How long startup waits for every cache to finish its initial listing
    pub initial_sync_timeout: Duration,
    /// Server-side timeout for each watch request
    pub watch_timeout_secs: u32,
    /// Delay after a watch error once the cache is ready
    pub watch_error_backoff: Duration,
    /// Token issuers treated as service accounts
    pub service_account_issuers: Vec<String>,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            api_prefixes: std::env::var("WARDEN_API_PREFIXES")
                .ok()
                .map(|v| parse_list(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_API_PREFIXES.iter().map(|s| s.to_string()).collect()),
            match_mode: std::env::var("WARDEN_MATCH_MODE")
                .ok()
                .and_then(|v| match v.parse() {
                    Ok(mode) => Some(mode),
                    Err(e) => {
                        warn!(error = %e, "Ignoring WARDEN_MATCH_MODE");
                        None
                    }
                })
                .unwrap_or_default(),
            expand_timeout: env_u64("WARDEN_EXPAND_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_EXPAND_TIMEOUT),
            initial_sync_timeout: env_u64("WARDEN_SYNC_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SYNC_TIMEOUT),
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
            watch_error_backoff: DEFAULT_WATCH_ERROR_BACKOFF,
            service_account_issuers: DEFAULT_SERVICE_ACCOUNT_ISSUERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl AuthzConfig {
    /// Replace the recognized product prefixes
    pub fn with_api_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the constraint matching policy
    pub fn with_match_mode(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    /// Set the expansion deadline
    pub fn with_expand_timeout(mut self, timeout: Duration) -> Self {
        self.expand_timeout = timeout;
        self
    }

    /// Set the initial sync deadline
    pub fn with_initial_sync_timeout(mut self, timeout: Duration) -> Self {
        self.initial_sync_timeout = timeout;
        self
    }

    /// Set the backoff applied after watch errors
    pub fn with_watch_error_backoff(mut self, backoff: Duration) -> Self {
        self.watch_error_backoff = backoff;
        self
    }

    /// Replace the service-account issuer list
    pub fn with_service_account_issuers<I, S>(mut self, issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.service_account_issuers = issuers.into_iter().map(Into::into).collect();
        self
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_u64(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Ignoring unparseable setting");
            None
        }
    }
}
