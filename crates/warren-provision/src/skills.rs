use std::{path::Path, time::Duration};

use anyhow::Context;
use async_trait::async_trait;

use crate::error::{Error, Result};

/// Capability files every instance must end up with, fetched or not.
pub const SKILL_FILES: [&str; 3] = ["SKILL.md", "HEARTBEAT.md", "MESSAGING.md"];

/// Remote name of the optional skill manifest, written as `package.json`.
const MANIFEST_REMOTE: &str = "skill.json";

const DEFAULT_BASE_URL: &str = "https://www.moltbook.com";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Content-or-failure per file. Production uses HTTPS; tests inject a map.
#[async_trait]
pub trait SkillSource: Send + Sync {
    async fn fetch(&self, remote_name: &str) -> anyhow::Result<String>;
}

pub struct HttpSkillSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSkillSource {
    /// Fails rather than falling back to an untimed client: the short fetch
    /// timeout is what keeps provisioning from blocking on a dead host.
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("WARREN_SKILL_BASE_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout = std::env::var("WARREN_SKILL_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|v| v.clamp(1, 60))
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

        let client = reqwest::Client::builder()
            .user_agent("warrend")
            .timeout(Duration::from_secs(timeout))
            .build()
            .context("build skill fetch client")?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl SkillSource for HttpSkillSource {
    async fn fetch(&self, remote_name: &str) -> anyhow::Result<String> {
        let url = format!("{}/{remote_name}", self.base_url);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

/// Populate the skills directory. Remote failures never surface to the
/// caller: each missing capability file gets a placeholder instead, so the
/// directory always holds the complete set (availability over freshness).
/// Only local write failures are fatal.
pub async fn install_skills(source: &dyn SkillSource, skills_dir: &Path) -> Result<()> {
    for file in SKILL_FILES {
        let remote = file.to_ascii_lowercase();
        let content = match source.fetch(&remote).await {
            Ok(body) => body,
            Err(err) => {
                tracing::warn!(file, %err, "skill fetch failed, writing placeholder");
                placeholder(file)
            }
        };
        std::fs::write(skills_dir.join(file), content).map_err(Error::Layout)?;
    }

    // Manifest is best-effort only; its absence is tolerated.
    match source.fetch(MANIFEST_REMOTE).await {
        Ok(body) => {
            std::fs::write(skills_dir.join("package.json"), body).map_err(Error::Layout)?;
        }
        Err(err) => {
            tracing::debug!(%err, "skill manifest fetch failed, skipping");
        }
    }

    Ok(())
}

fn placeholder(file: &str) -> String {
    format!("# {file}\n(Failed to fetch from the skill host)\n")
}

/// Map-backed source for tests: listed names resolve, everything else fails.
#[derive(Debug, Default)]
pub struct StaticSkillSource {
    files: std::collections::BTreeMap<String, String>,
}

impl StaticSkillSource {
    pub fn with(mut self, remote_name: &str, content: &str) -> Self {
        self.files
            .insert(remote_name.to_string(), content.to_string());
        self
    }
}

#[async_trait]
impl SkillSource for StaticSkillSource {
    async fn fetch(&self, remote_name: &str) -> anyhow::Result<String> {
        self.files
            .get(remote_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such skill file: {remote_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_source_builds_with_a_timeout() {
        HttpSkillSource::from_env().unwrap();
    }

    #[tokio::test]
    async fn unreachable_source_still_yields_the_complete_set() {
        let tmp = tempfile::tempdir().unwrap();
        let source = StaticSkillSource::default();

        install_skills(&source, tmp.path()).await.unwrap();

        for file in SKILL_FILES {
            let body = std::fs::read_to_string(tmp.path().join(file)).unwrap();
            assert!(body.contains(file));
            assert!(body.contains("Failed to fetch"));
        }
        assert!(!tmp.path().join("package.json").exists());
    }

    #[tokio::test]
    async fn fetched_content_is_written_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let source = StaticSkillSource::default()
            .with("skill.md", "# Social skill\npost politely\n")
            .with("heartbeat.md", "# Heartbeat\n")
            .with("messaging.md", "# Messaging\n")
            .with("skill.json", r#"{"name":"moltbook-skill"}"#);

        install_skills(&source, tmp.path()).await.unwrap();

        let skill = std::fs::read_to_string(tmp.path().join("SKILL.md")).unwrap();
        assert_eq!(skill, "# Social skill\npost politely\n");
        let manifest = std::fs::read_to_string(tmp.path().join("package.json")).unwrap();
        assert!(manifest.contains("moltbook-skill"));
    }

    #[tokio::test]
    async fn partial_availability_mixes_content_and_placeholders() {
        let tmp = tempfile::tempdir().unwrap();
        let source = StaticSkillSource::default().with("skill.md", "# Social skill\n");

        install_skills(&source, tmp.path()).await.unwrap();

        let skill = std::fs::read_to_string(tmp.path().join("SKILL.md")).unwrap();
        assert_eq!(skill, "# Social skill\n");
        let heartbeat = std::fs::read_to_string(tmp.path().join("HEARTBEAT.md")).unwrap();
        assert!(heartbeat.contains("Failed to fetch"));
    }
}
