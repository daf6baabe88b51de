//! Typed interface over the external process manager.
//!
//! The provisioner never assembles pm2 command lines itself; it talks to a
//! [`ProcessSupervisor`], which keeps the lifecycle logic (deterministic
//! naming, idempotent pre-start delete) testable without a real pm2 install.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

/// Deterministic process-manager name for an instance slug.
///
/// stop/restart address a process through this name alone, with no extra
/// state, so the mapping must never change for a live fleet.
pub fn process_name(slug: &str) -> String {
    format!("warren-{slug}")
}

/// Everything needed to start a gateway process under the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    /// The manager binary itself could not be invoked.
    #[error("process manager unavailable: {0}")]
    Unavailable(#[source] std::io::Error),
    /// The manager ran but rejected the command.
    #[error("pm2 {op} failed for {name}: {detail}")]
    Rejected {
        op: &'static str,
        name: String,
        detail: String,
    },
}

#[async_trait]
pub trait ProcessSupervisor: Send + Sync {
    async fn start(&self, name: &str, spec: &StartSpec) -> Result<(), SupervisorError>;
    async fn stop(&self, name: &str) -> Result<(), SupervisorError>;
    async fn restart(&self, name: &str) -> Result<(), SupervisorError>;
    /// Remove a registered process. Absence of the process is not an error.
    async fn delete(&self, name: &str) -> Result<(), SupervisorError>;
}

/// Shells out to pm2. The binary is overridable for containerized installs.
pub struct Pm2 {
    bin: String,
}

impl Pm2 {
    pub fn new() -> Self {
        let bin = std::env::var("WARREN_PM2_BIN")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "pm2".to_string());
        Self { bin }
    }

    /// `pm2 start <bin> --name <name> -- <args...>`, run from the instance
    /// directory so relative paths in the gateway resolve there.
    fn start_args(name: &str, spec: &StartSpec) -> Vec<String> {
        let mut args = vec![
            "start".to_string(),
            spec.command.clone(),
            "--name".to_string(),
            name.to_string(),
            "--".to_string(),
        ];
        args.extend(spec.args.iter().cloned());
        args
    }

    async fn run(
        &self,
        op: &'static str,
        name: &str,
        args: &[String],
        cwd: Option<&PathBuf>,
        env: &BTreeMap<String, String>,
    ) -> Result<std::process::Output, SupervisorError> {
        let mut cmd = tokio::process::Command::new(&self.bin);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        // pm2 captures the spawning environment for the managed process, so
        // secrets are injected here rather than on the command line.
        cmd.envs(env);

        let output = cmd.output().await.map_err(SupervisorError::Unavailable)?;
        tracing::debug!(op, name, status = ?output.status, "pm2 invocation finished");
        Ok(output)
    }

    fn rejected(op: &'static str, name: &str, output: &std::process::Output) -> SupervisorError {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = match stderr.trim() {
            "" => format!("exit status {}", output.status),
            s => s.to_string(),
        };
        SupervisorError::Rejected {
            op,
            name: name.to_string(),
            detail,
        }
    }
}

impl Default for Pm2 {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessSupervisor for Pm2 {
    async fn start(&self, name: &str, spec: &StartSpec) -> Result<(), SupervisorError> {
        let args = Self::start_args(name, spec);
        let output = self
            .run("start", name, &args, Some(&spec.cwd), &spec.env)
            .await?;
        if !output.status.success() {
            return Err(Self::rejected("start", name, &output));
        }
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        let args = vec!["stop".to_string(), name.to_string()];
        let output = self.run("stop", name, &args, None, &BTreeMap::new()).await?;
        if !output.status.success() {
            return Err(Self::rejected("stop", name, &output));
        }
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), SupervisorError> {
        let args = vec!["restart".to_string(), name.to_string()];
        let output = self.run("restart", name, &args, None, &BTreeMap::new()).await?;
        if !output.status.success() {
            return Err(Self::rejected("restart", name, &output));
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), SupervisorError> {
        let args = vec!["delete".to_string(), name.to_string()];
        let output = self.run("delete", name, &args, None, &BTreeMap::new()).await?;
        // pm2 exits non-zero when the process does not exist; deletion is
        // defined as idempotent, so that outcome is Ok.
        if !output.status.success() {
            tracing::debug!(name, "pm2 delete reported no such process");
        }
        Ok(())
    }
}

/// In-memory supervisor double. Records every call so tests can assert on
/// lifecycle ordering without a process manager on the host.
#[derive(Debug, Default)]
pub struct RecordingSupervisor {
    calls: tokio::sync::Mutex<Vec<SupervisorCall>>,
    reject_start: std::sync::atomic::AtomicBool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorCall {
    Start { name: String, spec: StartSpec },
    Stop { name: String },
    Restart { name: String },
    Delete { name: String },
}

impl RecordingSupervisor {
    pub async fn calls(&self) -> Vec<SupervisorCall> {
        self.calls.lock().await.clone()
    }

    /// Make subsequent `start` calls fail, mimicking a manager rejection.
    pub fn reject_start(&self) {
        self.reject_start
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessSupervisor for RecordingSupervisor {
    async fn start(&self, name: &str, spec: &StartSpec) -> Result<(), SupervisorError> {
        self.calls.lock().await.push(SupervisorCall::Start {
            name: name.to_string(),
            spec: spec.clone(),
        });
        if self.reject_start.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(SupervisorError::Rejected {
                op: "start",
                name: name.to_string(),
                detail: "rejected by test".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self, name: &str) -> Result<(), SupervisorError> {
        self.calls.lock().await.push(SupervisorCall::Stop {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn restart(&self, name: &str) -> Result<(), SupervisorError> {
        self.calls.lock().await.push(SupervisorCall::Restart {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), SupervisorError> {
        self.calls.lock().await.push(SupervisorCall::Delete {
            name: name.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_name_is_deterministic() {
        assert_eq!(process_name("test-bot"), "warren-test-bot");
        assert_eq!(process_name("test-bot"), process_name("test-bot"));
    }

    #[test]
    fn start_args_put_gateway_args_after_separator() {
        let spec = StartSpec {
            command: "openfang".to_string(),
            args: vec![
                "gateway".to_string(),
                "--home".to_string(),
                "/srv/bots/x/.runtime".to_string(),
            ],
            cwd: PathBuf::from("/srv/bots/x"),
            env: BTreeMap::new(),
        };
        let args = Pm2::start_args("warren-x", &spec);
        assert_eq!(
            args,
            vec![
                "start",
                "openfang",
                "--name",
                "warren-x",
                "--",
                "gateway",
                "--home",
                "/srv/bots/x/.runtime",
            ]
        );
    }

    #[tokio::test]
    async fn recording_supervisor_captures_ordering() {
        let sup = RecordingSupervisor::default();
        sup.delete("warren-a").await.unwrap();
        sup.stop("warren-a").await.unwrap();
        sup.stop("warren-a").await.unwrap();

        let calls = sup.calls().await;
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], SupervisorCall::Delete { .. }));
        // Stop twice in a row is the same stable outcome both times.
        assert_eq!(calls[1], calls[2]);
    }
}
