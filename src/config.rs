use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::live_scores::SportConfig;

/// Live sports score relay
#[derive(Parser, Debug, Clone)]
#[command(name = "live-scores-relay", version, about)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// IP address to bind (a literal such as 0.0.0.0 or ::1, not a hostname)
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Directory holding index.html, 404.html and one sub-directory per sport
    #[arg(long, env = "STATIC_DIR", default_value = "public")]
    pub static_dir: PathBuf,

    /// Base URL that relative sport endpoints are joined to
    #[arg(
        long,
        env = "UPSTREAM_BASE_URL",
        default_value = "https://site.api.espn.com/apis/site/v2/sports"
    )]
    pub upstream_base_url: String,

    /// JSON file replacing the built-in sport table
    #[arg(long, env = "SPORTS_CONFIG")]
    pub sports_config: Option<PathBuf>,

    /// Lower bound applied to every sport's poll interval (ms)
    #[arg(long, env = "MIN_POLL_INTERVAL_MS", default_value = "100")]
    pub min_poll_interval_ms: u64,

    /// Timeout for a single upstream request (ms)
    #[arg(long, env = "UPSTREAM_TIMEOUT_MS", default_value = "5000")]
    pub upstream_timeout_ms: u64,

    /// Outbound messages buffered per client before new ones are dropped
    #[arg(long, env = "CHANNEL_CAPACITY", default_value = "64")]
    pub channel_capacity: usize,
}

/// One entry of the sports file.
#[derive(Debug, Clone, Deserialize)]
pub struct SportEntry {
    pub tag: String,
    /// Absolute URLs, or paths relative to the upstream base URL
    pub endpoints: Vec<String>,
    pub interval_ms: u64,
    #[serde(default)]
    pub event_name: Option<String>,
}

/// Built-in table: tag, endpoints relative to the base URL, interval in ms.
const DEFAULT_SPORTS: &[(&str, &[&str], u64)] = &[
    ("basketball", &["basketball/nba/scoreboard"], 150),
    ("football", &["football/nfl/scoreboard"], 500),
    ("baseball", &["baseball/mlb/scoreboard"], 500),
    (
        "soccer",
        &["soccer/usa.1/scoreboard", "soccer/eng.1/scoreboard"],
        500,
    ),
];

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must be non-zero");
        }
        if self.min_poll_interval_ms == 0 {
            anyhow::bail!("min_poll_interval_ms must be positive");
        }
        if self.upstream_timeout_ms == 0 {
            anyhow::bail!("upstream_timeout_ms must be positive");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be positive");
        }
        url::Url::parse(&self.upstream_base_url)
            .with_context(|| format!("invalid upstream_base_url '{}'", self.upstream_base_url))?;
        self.listen_addr()?;
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .host
            .parse()
            .with_context(|| format!("host '{}' is not an IP address", self.host))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn min_poll_interval(&self) -> Duration {
        Duration::from_millis(self.min_poll_interval_ms)
    }

    /// The sport table in effect: the sports file if given, otherwise the
    /// built-in table.
    pub fn sports(&self) -> Result<Vec<SportConfig>> {
        let entries = match &self.sports_config {
            Some(path) => load_sports_file(path)?,
            None => default_sport_entries(),
        };
        build_sports(entries, &self.upstream_base_url, self.min_poll_interval())
    }
}

pub fn default_sport_entries() -> Vec<SportEntry> {
    DEFAULT_SPORTS
        .iter()
        .map(|(tag, endpoints, interval_ms)| SportEntry {
            tag: tag.to_string(),
            endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
            interval_ms: *interval_ms,
            event_name: None,
        })
        .collect()
}

pub fn load_sports_file(path: &std::path::Path) -> Result<Vec<SportEntry>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sports config {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse sports config {}", path.display()))
}

/// Validate entries and turn them into poller descriptors.
pub fn build_sports(
    entries: Vec<SportEntry>,
    base_url: &str,
    min_interval: Duration,
) -> Result<Vec<SportConfig>> {
    if entries.is_empty() {
        anyhow::bail!("at least one sport must be configured");
    }

    let mut seen = HashSet::new();
    let mut sports = Vec::with_capacity(entries.len());
    for entry in entries {
        let tag_ok = !entry.tag.is_empty()
            && entry
                .tag
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !tag_ok {
            anyhow::bail!("invalid sport tag '{}'", entry.tag);
        }
        if !seen.insert(entry.tag.clone()) {
            anyhow::bail!("sport '{}' is configured twice", entry.tag);
        }
        if entry.endpoints.is_empty() {
            anyhow::bail!("sport '{}' has no endpoints", entry.tag);
        }

        let endpoints = entry
            .endpoints
            .iter()
            .map(|ep| resolve_endpoint(base_url, ep))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("sport '{}'", entry.tag))?;

        let mut interval = Duration::from_millis(entry.interval_ms);
        if interval < min_interval {
            warn!(
                "Sport '{}' interval {:?} is below the minimum, using {:?}",
                entry.tag, interval, min_interval
            );
            interval = min_interval;
        }

        let mut sport = SportConfig::new(&entry.tag, endpoints, interval);
        if let Some(name) = entry.event_name {
            sport.event_name = name;
        }
        sports.push(sport);
    }
    Ok(sports)
}

fn resolve_endpoint(base_url: &str, endpoint: &str) -> Result<String> {
    let full = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    };
    url::Url::parse(&full).with_context(|| format!("invalid endpoint '{}'", full))?;
    Ok(full)
}
