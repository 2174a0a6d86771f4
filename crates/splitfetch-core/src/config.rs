use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Browser-like User-Agent sent with every ranged request.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/99.0.4844.74 Safari/537.36 Edg/99.0.1150.46";

/// Retry policy for descriptor resolution (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of resolution attempts (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 3.0 = 3s).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_secs: 3.0,
            max_delay_secs: 60,
        }
    }
}

/// Body copy backend: portable buffered reads, or Linux splice(2) through a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferBackend {
    #[default]
    Buffered,
    Splice,
}

/// How descriptors are turned into fetchable locators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// The descriptor already is the locator.
    #[default]
    Direct,
    /// Follow the descriptor's HTTP redirect chain; the final URL is the locator.
    Redirect,
}

/// Global configuration loaded from `~/.config/splitfetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Descriptor list, one descriptor per line.
    pub tasks_file: PathBuf,
    /// Upstream path list, one address per line.
    pub upstreams_file: PathBuf,
    /// Directory that receives output files (None = current directory).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Port used for bare-IP upstream entries.
    pub upstream_port: u16,
    /// Descriptor lines shorter than this are ignored.
    pub min_descriptor_len: usize,
    /// Smallest range the ledger will carve off when splitting.
    pub split_granularity: u64,
    /// Seconds between checkpoint ticks.
    pub checkpoint_interval_secs: u64,
    /// Per-read stall timeout in seconds.
    pub stall_timeout_secs: u64,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Cooldown after a transport/protocol/link-expiry failure.
    pub failure_cooldown_secs: u64,
    /// Extra hold applied before a length-consistency failure is surfaced.
    pub consistency_cooldown_secs: u64,
    /// Sleep when the ledger has no leasable range.
    pub idle_backoff_millis: u64,
    pub user_agent: String,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub resolver: ResolverKind,
    #[serde(default)]
    pub transfer_backend: TransferBackend,
    /// HEAD-probe the locator for its length at fresh task init.
    pub probe_length: bool,
    /// Optional retry policy for descriptor resolution; built-in defaults if missing.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    /// Extra header lines (e.g. `Proxy-Authorization: ...`) sent with tunnel CONNECT.
    #[serde(default)]
    pub proxy_headers: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            tasks_file: PathBuf::from("urls.txt"),
            upstreams_file: PathBuf::from("upstreams.txt"),
            download_dir: None,
            upstream_port: 80,
            min_descriptor_len: 8,
            split_granularity: 64 * 1024,
            checkpoint_interval_secs: 2,
            stall_timeout_secs: 60,
            connect_timeout_secs: 15,
            failure_cooldown_secs: 30,
            consistency_cooldown_secs: 25,
            idle_backoff_millis: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: None,
            resolver: ResolverKind::Direct,
            transfer_backend: TransferBackend::Buffered,
            probe_length: true,
            retry: None,
            proxy_headers: Vec::new(),
        }
    }
}

impl FetchConfig {
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs.max(1))
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_secs(self.stall_timeout_secs.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_millis)
    }

    /// Output directory, falling back to the process working directory.
    pub fn output_dir(&self) -> Result<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("splitfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load the config at its XDG location, writing the defaults there first
/// if the file does not exist yet.
pub fn load_or_init() -> Result<FetchConfig> {
    load_from(&config_path()?)
}

/// Load `path`, or create it from [`FetchConfig::default`] when missing.
pub fn load_from(path: &Path) -> Result<FetchConfig> {
    match fs::read_to_string(path) {
        Ok(data) => {
            toml::from_str(&data).with_context(|| format!("parse {}", path.display()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let cfg = FetchConfig::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string_pretty(&cfg)?)
                .with_context(|| format!("write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote default config");
            Ok(cfg)
        }
        Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
    }
}
