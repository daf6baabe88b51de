use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default model for newly provisioned instances.
const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4-20250514";

/// The gateway's runtime configuration, written once at provisioning and
/// mutated only by channel reconfiguration. Field names mirror the JSON the
/// gateway parses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub agents: Agents,
    pub tools: Tools,
    pub channels: Channels,
    pub gateway: Gateway,
    pub plugins: Plugins,
    pub skills: SkillsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agents {
    pub defaults: AgentDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    pub model: ModelSelection,
    pub workspace: String,
    pub compaction: Compaction,
    #[serde(rename = "maxConcurrent")]
    pub max_concurrent: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSelection {
    pub primary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compaction {
    pub mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tools {
    pub profile: String,
    pub deny: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channels {
    pub telegram: TelegramChannel,
}

/// A disabled channel serializes to exactly `{"enabled": false}`; the
/// optional fields only appear while the channel is on, so disabling never
/// leaves a stale token behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChannel {
    pub enabled: bool,
    #[serde(rename = "botToken", default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(rename = "dmPolicy", default, skip_serializing_if = "Option::is_none")]
    pub dm_policy: Option<String>,
}

impl TelegramChannel {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            dm_policy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gateway {
    pub port: u16,
    pub mode: String,
    pub bind: String,
    pub auth: GatewayAuth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayAuth {
    pub mode: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plugins {
    pub entries: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsSection {
    pub install: SkillInstall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInstall {
    #[serde(rename = "nodeManager")]
    pub node_manager: String,
}

impl GatewayConfig {
    /// Pure template: conservative agent defaults, exec/browser denied, all
    /// channels off, gateway bound on all interfaces with token auth.
    pub fn render(port: u16, gateway_token: &str, workspace_path: &Path) -> Self {
        Self {
            agents: Agents {
                defaults: AgentDefaults {
                    model: ModelSelection {
                        primary: DEFAULT_MODEL.to_string(),
                    },
                    workspace: workspace_path.display().to_string(),
                    compaction: Compaction {
                        mode: "safeguard".to_string(),
                    },
                    max_concurrent: 2,
                },
            },
            tools: Tools {
                profile: "coding".to_string(),
                deny: vec!["exec".to_string(), "browser".to_string()],
            },
            channels: Channels {
                telegram: TelegramChannel::disabled(),
            },
            gateway: Gateway {
                port,
                mode: "local".to_string(),
                bind: "0.0.0.0".to_string(),
                auth: GatewayAuth {
                    mode: "token".to_string(),
                    token: gateway_token.to_string(),
                },
            },
            plugins: Plugins::default(),
            skills: SkillsSection {
                install: SkillInstall {
                    node_manager: "npm".to_string(),
                },
            },
        }
    }

    /// Replace only the telegram subsection. Enabling requires a token;
    /// anything else leaves the channel off with no leftover fields.
    pub fn set_telegram(&mut self, enabled: bool, bot_token: Option<String>) {
        self.channels.telegram = match (enabled, bot_token) {
            (true, Some(token)) => TelegramChannel {
                enabled: true,
                bot_token: Some(token),
                dm_policy: Some("open".to_string()),
            },
            _ => TelegramChannel::disabled(),
        };
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))
            .map_err(Error::Config)?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parse {}", path.display()))
            .map_err(Error::Config)
    }

    /// Atomic persist: write a sibling tmp file, then rename over the target.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)
            .context("serialize gateway config")
            .map_err(Error::Config)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &data)
            .with_context(|| format!("write {}", tmp.display()))
            .map_err(Error::Config)?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("persist {}", path.display()))
            .map_err(Error::Config)?;
        Ok(())
    }
}
