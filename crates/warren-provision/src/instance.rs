use crate::error::{Error, Result};

const MAX_SLUG_LEN: usize = 63;

/// Provisioning request for one bot instance, as received over the wire.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    pub slug: String,
    pub name: String,
    pub personality: String,
    pub purpose: String,
    pub creator_name: String,
    pub moltbook_api_key: String,
    pub moltbook_name: String,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
}

impl InstanceSpec {
    pub fn validate(&self) -> Result<()> {
        validate_slug(&self.slug)?;
        if self.name.trim().is_empty() {
            return Err(Error::InvalidSpec("name must be non-empty".to_string()));
        }
        Ok(())
    }
}

/// The slug becomes a directory name under the bots root and part of the pm2
/// process name, so this is also what keeps path traversal out.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() {
        return Err(Error::InvalidSpec("slug must be non-empty".to_string()));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(Error::InvalidSpec(format!(
            "slug exceeds {MAX_SLUG_LEN} characters"
        )));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(Error::InvalidSpec(format!(
            "slug must be lowercase alphanumeric or '-' (got {slug:?})"
        )));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(Error::InvalidSpec(
            "slug must not start or end with '-'".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_slugs() {
        assert!(validate_slug("test-bot").is_ok());
        assert!(validate_slug("bot2").is_ok());
    }

    #[test]
    fn rejects_traversal_and_case() {
        assert!(validate_slug("").is_err());
        assert!(validate_slug("../etc").is_err());
        assert!(validate_slug("Has-Upper").is_err());
        assert!(validate_slug("a b").is_err());
        assert!(validate_slug("-edge").is_err());
        assert!(validate_slug(&"x".repeat(64)).is_err());
    }
}
