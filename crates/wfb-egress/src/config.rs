use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::send_loop::SendLoopConfig;

pub const CONFIG_VERSION: u32 = 1;

const DEFAULT_LINK_NAME: &str = "link0";
const DEFAULT_MAX_PAYLOAD: usize = 1400;
const MAX_UDP_PAYLOAD: usize = 65_507;
const DEFAULT_REPORT_INTERVAL_MS: u64 = 1000;
const MIN_REPORT_INTERVAL_MS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid link name {0:?}: must be non-empty and contain no commas")]
    InvalidName(String),
    #[error("invalid link target {0:?}")]
    InvalidTarget(String),
}

// ─── Raw Input ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BridgeConfigInput {
    pub version: u32,
    pub link: LinkConfigInput,
    pub send: SendConfigInput,
    pub report: ReportConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkConfigInput {
    pub name: Option<String>,
    pub target: Option<String>,
    pub max_payload: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SendConfigInput {
    pub max_queue_size: Option<u16>,
    pub thread_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportConfigInput {
    pub interval_ms: Option<u64>,
}

// ─── Resolved ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Identity label of the link's statistics record.
    pub name: String,
    /// Destination for the UDP injector.
    pub target: Option<SocketAddr>,
    /// Largest chunk read into a single message.
    pub max_payload: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_LINK_NAME.into(),
            target: None,
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    pub interval: Duration,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_REPORT_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub version: u32,
    pub link: LinkConfig,
    pub send: SendLoopConfig,
    pub report: ReportConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            link: LinkConfig::default(),
            send: SendLoopConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl BridgeConfigInput {
    /// Parse without validating; empty input yields all defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(BridgeConfigInput::default());
        }
        Ok(toml::from_str(input)?)
    }

    pub fn resolve(self) -> Result<BridgeConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let name = match self.link.name {
            Some(name) => {
                let trimmed = name.trim();
                if trimmed.is_empty() || trimmed.contains(',') {
                    return Err(ConfigError::InvalidName(name));
                }
                trimmed.to_string()
            }
            None => DEFAULT_LINK_NAME.to_string(),
        };

        let target = match self.link.target {
            Some(raw) => {
                Some(parse_target(&raw).ok_or_else(|| ConfigError::InvalidTarget(raw.clone()))?)
            }
            None => None,
        };

        let link = LinkConfig {
            name,
            target,
            max_payload: self
                .link
                .max_payload
                .unwrap_or(DEFAULT_MAX_PAYLOAD)
                .clamp(1, MAX_UDP_PAYLOAD),
        };

        let defaults = SendLoopConfig::default();
        let send = SendLoopConfig {
            max_queue_size: self.send.max_queue_size.unwrap_or(defaults.max_queue_size),
            thread_name: self
                .send
                .thread_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or(defaults.thread_name),
        };

        let report = ReportConfig {
            interval: Duration::from_millis(
                self.report
                    .interval_ms
                    .unwrap_or(DEFAULT_REPORT_INTERVAL_MS)
                    .max(MIN_REPORT_INTERVAL_MS),
            ),
        };

        Ok(BridgeConfig {
            version,
            link,
            send,
            report,
        })
    }
}

impl BridgeConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        BridgeConfigInput::from_toml_str(input)?.resolve()
    }
}

/// Parse `host:port`, optionally prefixed with `udp://`.
fn parse_target(raw: &str) -> Option<SocketAddr> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix("udp://").unwrap_or(trimmed);
    stripped.parse::<SocketAddr>().ok()
}
