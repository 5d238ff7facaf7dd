//! Composite state persistence
//!
//! A `ComposeStore` keeps one `CompositeState` per project. Writes are
//! merge-updates: the stored record and the update are folded together, so a
//! partially successful pass never forgets what an earlier pass created.

use crate::error::{DriverError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use unifleet_types::{CompositeState, CompositeUpdate};

/// Store for per-project composite state
#[async_trait]
pub trait ComposeStore: Send + Sync {
    /// Get the stored record of a project
    async fn get(&self, project: &str) -> Result<Option<CompositeState>>;

    /// Merge an update into the stored record and return the result
    async fn update(&self, update: CompositeUpdate) -> Result<CompositeState>;

    /// Delete the stored record of a project
    async fn delete(&self, project: &str) -> Result<()>;
}

/// JSON-file backed store, one `<project>.json` per project
///
/// Each write goes to a `.tmp` sibling first and is then renamed over the
/// record, so an interrupted write leaves the previous record intact.
pub struct JsonFileComposeStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileComposeStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `project`.
    pub fn path_for(&self, project: &str) -> PathBuf {
        let file: String = project
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.json"))
    }

    async fn read(&self, project: &str) -> Result<Option<CompositeState>> {
        let path = self.path_for(project);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let state = serde_json::from_str(&contents)?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DriverError::Io(e)),
        }
    }
}

#[async_trait]
impl ComposeStore for JsonFileComposeStore {
    async fn get(&self, project: &str) -> Result<Option<CompositeState>> {
        self.read(project).await
    }

    async fn update(&self, update: CompositeUpdate) -> Result<CompositeState> {
        let _guard = self.write_lock.lock().await;

        let project = update.state.project.clone();
        let stored = self.read(&project).await?;
        let merged = update.apply(stored);

        tokio::fs::create_dir_all(&self.dir).await?;
        let json = serde_json::to_string_pretty(&merged)?;

        // Atomic write: write to .tmp then rename
        let path = self.path_for(&project);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(
            project = %project,
            path = %path.display(),
            networks = merged.networks.len(),
            machines = merged.machines.len(),
            "Composite state written"
        );
        Ok(merged)
    }

    async fn delete(&self, project: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(project)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unifleet_types::ResourceRef;

    fn state(project: &str) -> CompositeState {
        CompositeState::new(project, "/srv/app").with_composefile("/srv/app/compose.yaml")
    }

    #[tokio::test]
    async fn test_get_missing_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileComposeStore::new(dir.path());
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_merges_with_stored_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileComposeStore::new(dir.path());

        let mut first = state("demo");
        first.add_network(ResourceRef::new("n1", "demo_default"));
        first.add_machine(ResourceRef::new("m1", "web"));
        store.update(CompositeUpdate::new(first)).await.unwrap();

        let mut second = state("demo");
        second.add_machine(ResourceRef::new("m2", "db"));
        let merged = store.update(CompositeUpdate::new(second)).await.unwrap();

        assert!(merged.owns_network("n1"));
        assert!(merged.owns_machine("m1"));
        assert!(merged.owns_machine("m2"));

        let reloaded = store.get("demo").await.unwrap().unwrap();
        assert_eq!(reloaded, merged);
    }

    #[tokio::test]
    async fn test_update_releases_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileComposeStore::new(dir.path());

        let mut first = state("demo");
        first.add_machine(ResourceRef::new("m1", "web"));
        first.add_machine(ResourceRef::new("m2", "db"));
        store.update(CompositeUpdate::new(first)).await.unwrap();

        let mut update = CompositeUpdate::new(state("demo"));
        update.released.insert("m1".to_string());
        let merged = store.update(update).await.unwrap();

        assert!(!merged.owns_machine("m1"));
        assert!(merged.owns_machine("m2"));
    }

    #[tokio::test]
    async fn test_no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileComposeStore::new(dir.path());
        store.update(CompositeUpdate::new(state("demo"))).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["demo.json".to_string()]);
    }

    #[tokio::test]
    async fn test_project_name_is_sanitized() {
        let store = JsonFileComposeStore::new("/var/lib/unifleet");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/var/lib/unifleet/.._etc_passwd.json")
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileComposeStore::new(dir.path());
        store.update(CompositeUpdate::new(state("demo"))).await.unwrap();

        store.delete("demo").await.unwrap();
        store.delete("demo").await.unwrap();
        assert!(store.get("demo").await.unwrap().is_none());
    }
}
