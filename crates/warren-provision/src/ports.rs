use std::{collections::BTreeMap, path::PathBuf};

use tokio::sync::Mutex;

pub const DEFAULT_BASE_PORT: u16 = 18801;

/// Gateway ports live in this range; recorded values outside it are treated
/// like any other malformed peer data and skipped during the scan, which
/// also keeps `reserve` safely below u16::MAX.
const MIN_GATEWAY_PORT: u16 = 1024;
const MAX_GATEWAY_PORT: u16 = 65000;

/// First gateway port to hand out when no instances exist yet.
pub fn base_port() -> u16 {
    std::env::var("WARREN_BASE_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .map(|v| v.clamp(MIN_GATEWAY_PORT, MAX_GATEWAY_PORT))
        .unwrap_or(DEFAULT_BASE_PORT)
}

/// Lock-guarded slug→port reservation table.
///
/// The table is seeded lazily by scanning the persisted per-instance configs,
/// so recorded assignments survive restarts of this service; after that,
/// reservations happen in memory under one lock and concurrent provisioning
/// calls cannot pick the same port. A known slug gets its recorded port back,
/// keeping slug→port stable across re-provisioning.
pub struct PortRegistry {
    root: PathBuf,
    floor: u16,
    table: Mutex<Option<BTreeMap<String, u16>>>,
}

impl PortRegistry {
    pub fn new(root: PathBuf, floor: u16) -> Self {
        Self {
            root,
            floor,
            table: Mutex::new(None),
        }
    }

    pub async fn reserve(&self, slug: &str) -> u16 {
        let mut guard = self.table.lock().await;
        let table = guard.get_or_insert_with(|| scan_recorded_ports(&self.root));

        if let Some(port) = table.get(slug) {
            return *port;
        }

        let max = table
            .values()
            .copied()
            .max()
            .map(|m| m.max(self.floor.saturating_sub(1)))
            .unwrap_or_else(|| self.floor.saturating_sub(1));
        let next = max.saturating_add(1);
        table.insert(slug.to_string(), next);
        next
    }
}

/// Recovery scan over `<root>/*/.runtime/config.json`. An unreadable root
/// means no instances yet; a malformed peer config is skipped so one corrupt
/// instance never blocks allocation for everyone else.
fn scan_recorded_ports(root: &PathBuf) -> BTreeMap<String, u16> {
    let mut table = BTreeMap::new();

    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(_) => return table,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(slug) = entry.file_name().to_str().map(|s| s.to_string()) else {
            continue;
        };

        let config_path = path.join(".runtime").join("config.json");
        let Ok(raw) = std::fs::read_to_string(&config_path) else {
            continue;
        };
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&raw) else {
            tracing::warn!(slug = %slug, "skipping malformed instance config during port scan");
            continue;
        };
        let Some(port) = value
            .get("gateway")
            .and_then(|g| g.get("port"))
            .and_then(|p| p.as_u64())
            .and_then(|p| u16::try_from(p).ok())
        else {
            continue;
        };
        if !(MIN_GATEWAY_PORT..=MAX_GATEWAY_PORT).contains(&port) {
            tracing::warn!(slug = %slug, port, "skipping out-of-range recorded port during scan");
            continue;
        }
        table.insert(slug, port);
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write_peer_config(root: &Path, slug: &str, body: &str) {
        let dir = root.join(slug).join(".runtime");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), body).unwrap();
    }

    #[tokio::test]
    async fn empty_root_starts_at_the_floor() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = PortRegistry::new(tmp.path().to_path_buf(), 18801);

        assert_eq!(registry.reserve("test-bot").await, 18801);
        assert_eq!(registry.reserve("other-bot").await, 18802);
    }

    #[tokio::test]
    async fn missing_root_is_treated_as_no_instances() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = PortRegistry::new(tmp.path().join("does-not-exist"), 18801);
        assert_eq!(registry.reserve("a").await, 18801);
    }

    #[tokio::test]
    async fn scan_continues_above_recorded_ports() {
        let tmp = tempfile::tempdir().unwrap();
        write_peer_config(tmp.path(), "old-bot", r#"{"gateway":{"port":18807}}"#);

        let registry = PortRegistry::new(tmp.path().to_path_buf(), 18801);
        assert_eq!(registry.reserve("new-bot").await, 18808);
    }

    #[tokio::test]
    async fn malformed_peer_config_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        write_peer_config(tmp.path(), "broken-bot", "{not json");
        write_peer_config(tmp.path(), "ok-bot", r#"{"gateway":{"port":18803}}"#);

        let registry = PortRegistry::new(tmp.path().to_path_buf(), 18801);
        assert_eq!(registry.reserve("new-bot").await, 18804);
    }

    #[tokio::test]
    async fn known_slug_keeps_its_recorded_port() {
        let tmp = tempfile::tempdir().unwrap();
        write_peer_config(tmp.path(), "test-bot", r#"{"gateway":{"port":18801}}"#);
        write_peer_config(tmp.path(), "later-bot", r#"{"gateway":{"port":18802}}"#);

        let registry = PortRegistry::new(tmp.path().to_path_buf(), 18801);
        // Re-provisioning test-bot must not move it to 18803.
        assert_eq!(registry.reserve("test-bot").await, 18801);
        assert_eq!(registry.reserve("fresh-bot").await, 18803);
    }

    #[tokio::test]
    async fn out_of_range_recorded_ports_never_block_allocation() {
        let tmp = tempfile::tempdir().unwrap();
        // A well-formed config recording u16::MAX must not panic or wrap the
        // next allocation; it is skipped like any other bad peer data.
        write_peer_config(tmp.path(), "max-bot", r#"{"gateway":{"port":65535}}"#);
        write_peer_config(tmp.path(), "low-bot", r#"{"gateway":{"port":80}}"#);

        let registry = PortRegistry::new(tmp.path().to_path_buf(), 18801);
        assert_eq!(registry.reserve("new-bot").await, 18801);
        assert_eq!(registry.reserve("next-bot").await, 18802);
    }

    #[tokio::test]
    async fn floor_applies_even_when_recorded_ports_are_below_it() {
        let tmp = tempfile::tempdir().unwrap();
        write_peer_config(tmp.path(), "ancient-bot", r#"{"gateway":{"port":9000}}"#);

        let registry = PortRegistry::new(tmp.path().to_path_buf(), 18801);
        assert_eq!(registry.reserve("new-bot").await, 18801);
    }
}
