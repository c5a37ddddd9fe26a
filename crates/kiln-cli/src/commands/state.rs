use std::collections::BTreeMap;
use std::path::Path;

use kiln_core::KilnConfig;
use kiln_state::{
    BlobStore, CacheStatus, MemoryBlobStore, RedbBlobStore, ReducerRegistry, Rehydrator, Store,
};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct StateReport {
    pub cache: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub nodes: usize,
    pub types: BTreeMap<String, usize>,
    pub slices: Vec<String>,
}

/// Rehydrate the cache named by the config and summarize it.
pub fn report(config: &KilnConfig) -> anyhow::Result<StateReport> {
    let snapshot = config.cache.snapshot_path();
    // Do not create a database just to find out there is nothing in it.
    let blobs: Box<dyn BlobStore> = if snapshot.exists() {
        Box::new(RedbBlobStore::open(&snapshot)?)
    } else {
        debug!(path = %snapshot.display(), "no snapshot file");
        Box::new(MemoryBlobStore::new())
    };

    let loaded = Rehydrator::from_config(blobs.as_ref(), &config.cache).load()?;
    let (status, reason) = match &loaded.status {
        CacheStatus::Restored { .. } => ("restored", None),
        CacheStatus::Missing => ("missing", None),
        CacheStatus::Corrupt { reason } => ("corrupt", Some(reason.clone())),
    };

    let store = Store::configure(ReducerRegistry::persisted_defaults(), loaded.state);
    let state = store.get_state();
    let nodes = state.nodes();

    Ok(StateReport {
        cache: snapshot.display().to_string(),
        status: status.to_string(),
        reason,
        nodes: nodes.len(),
        types: nodes
            .types()
            .map(|(node_type, count)| (node_type.to_string(), count))
            .collect(),
        slices: state
            .slices()
            .filter(|(_, value)| !is_blank(value))
            .map(|(name, _)| name.to_string())
            .collect(),
    })
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(a) => a.is_empty(),
        serde_json::Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

pub fn inspect(config_path: &str, format: &str) -> anyhow::Result<()> {
    let config = KilnConfig::load_or_default(Path::new(config_path))?;
    let report = report(&config)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            println!("Cache:  {}", report.cache);
            match &report.reason {
                Some(reason) => println!("Status: {} ({reason})", report.status),
                None => println!("Status: {}", report.status),
            }
            println!("Nodes:  {}", report.nodes);
            for (node_type, count) in &report.types {
                println!("  {node_type:<32} {count:>6}");
            }
            if report.slices.is_empty() {
                println!("Slices: (none)");
            } else {
                println!("Slices: {}", report.slices.join(", "));
            }
        }
    }

    Ok(())
}

pub fn clean(config_path: &str) -> anyhow::Result<()> {
    let config = KilnConfig::load_or_default(Path::new(config_path))?;
    let snapshot = config.cache.snapshot_path();
    if !snapshot.exists() {
        println!("Nothing to clean at {}", snapshot.display());
        return Ok(());
    }

    let blobs = RedbBlobStore::open(&snapshot)?;
    if blobs.clear()? {
        println!("✓ Cleared persisted state in {}", snapshot.display());
    } else {
        println!("No persisted state in {}", snapshot.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{kinds, Action, Node};
    use kiln_state::{checkpoint, PersistedState};

    fn config_in(dir: &Path) -> KilnConfig {
        KilnConfig::scaffold(dir.join("cache").to_str().unwrap())
    }

    #[test]
    fn report_on_missing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let report = report(&config).unwrap();
        assert_eq!(report.status, "missing");
        assert_eq!(report.nodes, 0);
        assert!(!config.cache.snapshot_path().exists());
    }

    #[test]
    fn report_counts_nodes_by_type() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        let blobs = RedbBlobStore::open(&config.cache.snapshot_path()).unwrap();
        let store = Store::configure(ReducerRegistry::persisted_defaults(), PersistedState::empty());
        for (id, node_type) in [("a", "File"), ("b", "File"), ("c", "SitePage")] {
            let node = serde_json::to_value(Node::new(id, node_type)).unwrap();
            store
                .dispatch(Action::with_payload(kinds::CREATE_NODE, node))
                .unwrap();
        }
        store
            .dispatch(Action::with_payload(kinds::SET_WEBPACK_COMPILATION_HASH, serde_json::json!("h1")))
            .unwrap();
        checkpoint::save_store(&store, &blobs).unwrap();
        drop(blobs);

        let report = report(&config).unwrap();
        assert_eq!(report.status, "restored");
        assert_eq!(report.nodes, 3);
        assert_eq!(report.types.get("File"), Some(&2));
        assert_eq!(report.types.get("SitePage"), Some(&1));
        assert_eq!(report.slices, vec!["webpack_compilation_hash"]);
    }

    #[test]
    fn report_flags_corrupt_cache() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        {
            let blobs = RedbBlobStore::open(&config.cache.snapshot_path()).unwrap();
            blobs.write(b"not json").unwrap();
        }

        let report = report(&config).unwrap();
        assert_eq!(report.status, "corrupt");
        assert!(report.reason.is_some());
    }
}
