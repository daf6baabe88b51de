use std::{fs, path::Path, path::PathBuf};

use crate::error::{Error, Result};
use crate::instance::InstanceSpec;

/// Name of the capability pack installed under the skills directory.
pub const SKILL_PACK: &str = "moltbook";

/// Root directory holding one subtree per instance.
pub fn bots_root() -> PathBuf {
    let raw = std::env::var("WARREN_BOTS_ROOT").unwrap_or_else(|_| "./bots".to_string());
    let p = PathBuf::from(raw);
    let abs = if p.is_absolute() {
        p
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(p)
    };

    // Best-effort canonicalization: don't fail if the directory doesn't exist yet.
    std::fs::canonicalize(&abs).unwrap_or(abs)
}

/// Every per-instance path, derived in one place so the layout invariant has
/// a single owner.
#[derive(Debug, Clone)]
pub struct InstancePaths {
    pub instance_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub skills_dir: PathBuf,
    pub secrets_dir: PathBuf,
    pub config_path: PathBuf,
}

impl InstancePaths {
    pub fn new(root: &Path, slug: &str) -> Self {
        let instance_dir = root.join(slug);
        let runtime_dir = instance_dir.join(".runtime");
        Self {
            workspace_dir: runtime_dir.join("workspace"),
            skills_dir: runtime_dir.join("skills").join(SKILL_PACK),
            secrets_dir: instance_dir.join(".secrets"),
            config_path: runtime_dir.join("config.json"),
            instance_dir,
            runtime_dir,
        }
    }
}

/// Creates the directory tree and writes the two identity documents.
/// Idempotent; a failure here aborts provisioning with nothing downstream
/// attempted.
pub fn build_workspace(spec: &InstanceSpec, paths: &InstancePaths) -> Result<()> {
    fs::create_dir_all(&paths.workspace_dir).map_err(Error::Layout)?;
    fs::create_dir_all(&paths.skills_dir).map_err(Error::Layout)?;

    fs::write(
        paths.workspace_dir.join("SOUL.md"),
        soul_md(&spec.personality, &spec.creator_name),
    )
    .map_err(Error::Layout)?;
    fs::write(
        paths.workspace_dir.join("IDENTITY.md"),
        identity_md(&spec.name, &spec.creator_name, &spec.purpose),
    )
    .map_err(Error::Layout)?;

    Ok(())
}

/// Persona document read by the gateway on every session. The personality
/// text goes in verbatim, followed by fixed boundary rules.
fn soul_md(personality: &str, creator_name: &str) -> String {
    format!(
        "# SOUL.md - Who You Are\n\
         \n\
         {personality}\n\
         \n\
         ## Boundaries\n\
         \n\
         - You were created on Warren by {creator_name}\n\
         - Be helpful, have personality, stay in character\n\
         - Never share private info about your creator\n\
         - Never pretend to be a different bot\n\
         - When in doubt, ask before acting externally\n\
         \n\
         ## Continuity\n\
         \n\
         Each session, you wake up fresh. These files *are* your memory. \
         Read them. Update them. They're how you persist.\n"
    )
}

fn identity_md(bot_name: &str, creator_name: &str, purpose: &str) -> String {
    let date = chrono::Utc::now().format("%Y-%m-%d");
    format!(
        "# IDENTITY.md\n\
         \n\
         - **Name:** {bot_name}\n\
         - **Created by:** {creator_name}\n\
         - **Purpose:** {purpose}\n\
         \n\
         Born {date}. Created on Warren.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> InstanceSpec {
        InstanceSpec {
            slug: "test-bot".to_string(),
            name: "Testy".to_string(),
            personality: "Endlessly curious about tidepools.".to_string(),
            purpose: "Answer marine biology questions".to_string(),
            creator_name: "ada".to_string(),
            moltbook_api_key: "mk-123".to_string(),
            moltbook_name: "testy".to_string(),
            anthropic_api_key: None,
        }
    }

    #[test]
    fn paths_follow_the_fixed_layout() {
        let p = InstancePaths::new(Path::new("/srv/bots"), "test-bot");
        assert_eq!(
            p.config_path,
            Path::new("/srv/bots/test-bot/.runtime/config.json")
        );
        assert_eq!(
            p.skills_dir,
            Path::new("/srv/bots/test-bot/.runtime/skills/moltbook")
        );
        assert_eq!(p.secrets_dir, Path::new("/srv/bots/test-bot/.secrets"));
    }

    #[test]
    fn build_workspace_writes_documents_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = spec();
        let paths = InstancePaths::new(tmp.path(), &spec.slug);

        build_workspace(&spec, &paths).unwrap();
        // Idempotent on re-provision.
        build_workspace(&spec, &paths).unwrap();

        let soul = fs::read_to_string(paths.workspace_dir.join("SOUL.md")).unwrap();
        assert!(soul.contains("Endlessly curious about tidepools."));
        assert!(soul.contains("created on Warren by ada"));
        assert!(soul.contains("## Continuity"));

        let identity = fs::read_to_string(paths.workspace_dir.join("IDENTITY.md")).unwrap();
        assert!(identity.contains("**Name:** Testy"));
        assert!(identity.contains("**Purpose:** Answer marine biology questions"));
        assert!(paths.skills_dir.is_dir());
    }
}
