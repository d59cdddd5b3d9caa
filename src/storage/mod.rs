use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs;

use crate::env;
use crate::error::{Error, Result};

/// Persists the version of the binaries currently installed in a project.
#[derive(Clone, Debug)]
pub struct MarkerStore {
    path: PathBuf,
}

impl MarkerStore {
    pub fn new(project_root: &Path) -> Self {
        Self {
            path: env::marker_path(project_root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Option<String> {
        fs::read(&self.path).await.ok().and_then(|bytes| {
            let version = String::from_utf8_lossy(&bytes).trim().to_owned();
            (!version.is_empty()).then_some(version)
        })
    }

    pub async fn write(&self, version: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io("unable to create marker dir", e))?;
        }
        fs::write(&self.path, version.as_bytes())
            .await
            .map_err(|e| Error::io("unable to persist installed version", e))?;
        debug!("marker: recorded {version} at {}", self.path.display());
        Ok(())
    }

    /// Remove the marker. An absent marker is not an error.
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("marker: cleared {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io("failed to clear installed version", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_and_clears_version() {
        let root = tempfile::tempdir().unwrap();
        let store = MarkerStore::new(root.path());
        assert_eq!(store.read().await, None);

        store.write("1.0.0").await.unwrap();
        assert_eq!(store.read().await.as_deref(), Some("1.0.0"));

        store.clear().await.unwrap();
        assert_eq!(store.read().await, None);
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn trims_whitespace_and_ignores_blank_marker() {
        let root = tempfile::tempdir().unwrap();
        let store = MarkerStore::new(root.path());

        std::fs::write(store.path(), "  2.3.4\n").unwrap();
        assert_eq!(store.read().await.as_deref(), Some("2.3.4"));

        std::fs::write(store.path(), "\n").unwrap();
        assert_eq!(store.read().await, None);
    }
}
