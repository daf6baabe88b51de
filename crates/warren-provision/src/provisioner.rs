use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::Arc,
};

use tokio::sync::Mutex;
use warren_process::{ProcessSupervisor, StartSpec, process_name};

use crate::config::GatewayConfig;
use crate::credentials::store_credentials;
use crate::error::{Error, Result};
use crate::instance::{InstanceSpec, validate_slug};
use crate::layout::{InstancePaths, build_workspace};
use crate::ports::PortRegistry;
use crate::skills::{SkillSource, install_skills};

const DEFAULT_GATEWAY_BIN: &str = "openfang";

/// Outcome of a successful provisioning call.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Provisioned {
    pub port: u16,
    #[serde(rename = "gatewayToken")]
    pub gateway_token: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramUpdate {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
}

/// Composes allocator, layout, config, skills, credentials and supervisor
/// into the four lifecycle operations. One instance of this struct owns the
/// allocation lock and the per-slug config locks, so callers get the
/// serialization the on-disk invariants need.
pub struct Provisioner {
    root: PathBuf,
    registry: PortRegistry,
    supervisor: Arc<dyn ProcessSupervisor>,
    skills: Arc<dyn SkillSource>,
    gateway_bin: String,
    default_anthropic_key: Option<String>,
    config_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Provisioner {
    pub fn new(
        root: PathBuf,
        base_port: u16,
        supervisor: Arc<dyn ProcessSupervisor>,
        skills: Arc<dyn SkillSource>,
    ) -> Self {
        let gateway_bin = std::env::var("WARREN_GATEWAY_BIN")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_GATEWAY_BIN.to_string());
        let default_anthropic_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|v| !v.is_empty());

        Self {
            registry: PortRegistry::new(root.clone(), base_port),
            root,
            supervisor,
            skills,
            gateway_bin,
            default_anthropic_key,
            config_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Strict step order: port → workspace → config → skills → credentials →
    /// launch. A failure aborts the remaining steps; already-created files
    /// are left in place (no rollback).
    pub async fn provision(&self, spec: &InstanceSpec) -> Result<Provisioned> {
        spec.validate()?;

        let port = self.registry.reserve(&spec.slug).await;
        let gateway_token = gateway_token();
        let paths = InstancePaths::new(&self.root, &spec.slug);

        build_workspace(spec, &paths)?;

        let config = GatewayConfig::render(port, &gateway_token, &paths.workspace_dir);
        config.save(&paths.config_path)?;

        install_skills(self.skills.as_ref(), &paths.skills_dir).await?;
        store_credentials(spec, &paths.secrets_dir)?;

        self.launch(spec, &paths).await?;

        tracing::info!(slug = %spec.slug, port, "instance provisioned");
        Ok(Provisioned {
            port,
            gateway_token,
        })
    }

    async fn launch(&self, spec: &InstanceSpec, paths: &InstancePaths) -> Result<()> {
        let name = process_name(&spec.slug);

        // Sweep any prior registration under this name; absence is fine, and
        // a failure here will resurface as a start failure anyway.
        if let Err(err) = self.supervisor.delete(&name).await {
            tracing::warn!(%name, %err, "pre-start delete failed, continuing");
        }

        let mut env = BTreeMap::new();
        env.insert(
            "OPENFANG_HOME".to_string(),
            paths.runtime_dir.display().to_string(),
        );
        // Per-instance model key wins over the process-wide default.
        let anthropic_key = spec
            .anthropic_api_key
            .clone()
            .or_else(|| self.default_anthropic_key.clone());
        if let Some(key) = anthropic_key {
            env.insert("ANTHROPIC_API_KEY".to_string(), key);
        }

        let start = StartSpec {
            command: self.gateway_bin.clone(),
            args: vec![
                "gateway".to_string(),
                "--home".to_string(),
                paths.runtime_dir.display().to_string(),
            ],
            cwd: paths.instance_dir.clone(),
            env,
        };
        self.supervisor.start(&name, &start).await?;
        Ok(())
    }

    pub async fn stop(&self, slug: &str) -> Result<()> {
        validate_slug(slug)?;
        self.supervisor.stop(&process_name(slug)).await?;
        Ok(())
    }

    pub async fn restart(&self, slug: &str) -> Result<()> {
        validate_slug(slug)?;
        self.supervisor.restart(&process_name(slug)).await?;
        Ok(())
    }

    /// Read-modify-write of the persisted config, serialized per slug, then
    /// a restart so the running gateway picks up the change.
    pub async fn reconfigure_telegram(&self, slug: &str, update: TelegramUpdate) -> Result<()> {
        validate_slug(slug)?;

        let lock = self.config_lock(slug).await;
        let _guard = lock.lock().await;

        let paths = InstancePaths::new(&self.root, slug);
        if !paths.config_path.exists() {
            return Err(Error::NotFound(slug.to_string()));
        }

        let mut config = GatewayConfig::load(&paths.config_path)?;
        config.set_telegram(update.enabled, update.bot_token);
        config.save(&paths.config_path)?;

        self.supervisor.restart(&process_name(slug)).await?;
        tracing::info!(slug, enabled = update.enabled, "telegram channel reconfigured");
        Ok(())
    }

    async fn config_lock(&self, slug: &str) -> Arc<Mutex<()>> {
        let mut map = self.config_locks.lock().await;
        map.entry(slug.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// 256-bit bearer secret for the instance's gateway API. Rotated only by
/// re-provisioning.
fn gateway_token() -> String {
    use rand::RngCore;
    let mut buf = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
