use std::path::Path;

use anyhow::Context;

use crate::error::{Error, Result};
use crate::instance::InstanceSpec;

#[derive(Debug, serde::Serialize)]
struct Credentials<'a> {
    api_key: &'a str,
    agent_name: &'a str,
}

/// Persist third-party platform credentials in `.secrets/`, outside the
/// workspace the agent's model reads, so rotation never touches the running
/// config.
pub fn store_credentials(spec: &InstanceSpec, secrets_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(secrets_dir).map_err(Error::Layout)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(secrets_dir, std::fs::Permissions::from_mode(0o700))
            .map_err(Error::Layout)?;
    }

    let creds = Credentials {
        api_key: &spec.moltbook_api_key,
        agent_name: &spec.moltbook_name,
    };
    let data = serde_json::to_vec_pretty(&creds)
        .context("serialize credentials")
        .map_err(Error::Config)?;

    let path = secrets_dir.join("credentials.json");
    let tmp = secrets_dir.join("credentials.json.tmp");
    std::fs::write(&tmp, &data).map_err(Error::Layout)?;
    std::fs::rename(&tmp, &path).map_err(Error::Layout)?;
    Ok(())
}
