//! Blocklist sources in hosts-file format.
//!
//! ```text
//! # comment
//! 0.0.0.0 ads.example.com
//! 127.0.0.1 tracker.example.com
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use rustc_hash::FxHashSet;

use crate::error::FetchError;

/// StevenBlack's unified hosts list.
pub const DEFAULT_BLOCKLIST_URL: &str =
    "https://raw.githubusercontent.com/StevenBlack/hosts/master/hosts";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Names that appear in hosts files but are not blockable domains.
const SYSTEM_HOSTS: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "0.0.0.0",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
];

/// Somewhere a hosts-format blocklist can be fetched from.
pub trait BlocklistSource: Send + Sync {
    /// Fetch the raw list text.
    fn fetch(&self) -> impl Future<Output = Result<String, FetchError>> + Send;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// A blocklist served over HTTP(S).
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dnsinspect/", env!("CARGO_PKG_VERSION")))
            .timeout(FETCH_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl BlocklistSource for HttpSource {
    async fn fetch(&self) -> Result<String, FetchError> {
        let response = self.client.get(&self.url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// A blocklist read from a local file.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BlocklistSource for FileSource {
    async fn fetch(&self) -> Result<String, FetchError> {
        Ok(tokio::fs::read_to_string(&self.path).await?)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Parse a hosts-format list into a set of lowercase domains.
///
/// Blank lines and `#` comments are skipped; the second whitespace-separated
/// field of every other line is the domain. Trailing `#` comments on a line
/// are ignored.
pub fn parse_hosts(content: &str) -> FxHashSet<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let domain = line.split_whitespace().nth(1)?;
            if domain.starts_with('#') || SYSTEM_HOSTS.contains(&domain) {
                return None;
            }
            Some(domain.to_ascii_lowercase())
        })
        .collect()
}
