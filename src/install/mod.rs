use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::archive;
use crate::env;
use crate::error::{Error, Result};
use crate::manifest::{self, BinaryEntry, MANIFEST};
use crate::networking::NetworkClient;
use crate::progress::DownloadBar;
use crate::storage::MarkerStore;
use crate::util;

const TEMP_PREFIX: &str = "vella-sdk-libs-";
const EXTRACT_DIR: &str = "extracted";

#[derive(Clone, Debug)]
pub struct InstallOptions {
    pub project_root: PathBuf,
    pub version: String,
    pub base_url: String,
    pub expected_sha256: Option<String>,
    pub timeout: Duration,
    /// Parent of the per-run private working directory.
    pub temp_root: PathBuf,
    pub force: bool,
    pub show_progress: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    AlreadyInstalled,
    Installed {
        placed: usize,
        missing: Vec<&'static str>,
    },
}

#[derive(Debug, Default)]
struct Placement {
    placed: Vec<&'static str>,
    missing: Vec<&'static str>,
}

pub struct Installer {
    options: InstallOptions,
    manifest: &'static [BinaryEntry],
    marker: MarkerStore,
    network: NetworkClient,
}

impl Installer {
    pub fn new(options: InstallOptions) -> Self {
        Self::with_manifest(options, MANIFEST)
    }

    pub fn with_manifest(options: InstallOptions, manifest: &'static [BinaryEntry]) -> Self {
        let marker = MarkerStore::new(&options.project_root);
        let network = NetworkClient::new(options.timeout);
        Self {
            options,
            manifest,
            marker,
            network,
        }
    }

    pub fn archive_url(&self) -> String {
        env::archive_url(&self.options.base_url, &self.options.version)
    }

    /// Marker matches the wanted version and every destination is on disk.
    pub async fn is_up_to_date(&self) -> bool {
        let installed = self.marker.read().await;
        let missing = manifest::missing_destinations(self.manifest, &self.options.project_root);
        debug!(
            "install: marker={:?} wanted={} missing={}",
            installed,
            self.options.version,
            missing.len()
        );
        installed.as_deref() == Some(self.options.version.as_str()) && missing.is_empty()
    }

    pub async fn run(&self) -> Result<InstallOutcome> {
        if !self.options.force && self.is_up_to_date().await {
            info!(
                "install: native binaries {} already installed; nothing to do",
                self.options.version
            );
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        match self.fetch_and_place().await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if let Err(clear_err) = self.marker.clear().await {
                    error!(
                        "install: could not clear {}: {clear_err}",
                        self.marker.path().display()
                    );
                }
                Err(err)
            }
        }
    }

    async fn fetch_and_place(&self) -> Result<InstallOutcome> {
        let workdir = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempdir_in(&self.options.temp_root)
            .map_err(|e| Error::io("failed to create temp directory", e))?;
        debug!("install: working in {}", workdir.path().display());

        let result = self.install_from(workdir.path()).await;
        if let Err(e) = workdir.close() {
            warn!("install: failed to remove temp directory: {e}");
        }
        result
    }

    async fn install_from(&self, workdir: &Path) -> Result<InstallOutcome> {
        let version = &self.options.version;
        let archive_path = workdir.join(manifest::archive_name(version));

        let mut bar = DownloadBar::new(self.options.show_progress);
        let downloaded = self
            .network
            .download_to_path(&self.archive_url(), &archive_path, |p| bar.update(p))
            .await;
        bar.finish();
        downloaded?;

        if let Some(expected) = self.options.expected_sha256.as_deref() {
            util::verify_sha256(&archive_path, expected)?;
            info!("install: archive checksum verified");
        }

        let extract_dir = workdir.join(EXTRACT_DIR);
        archive::extract(&archive_path, &extract_dir).await?;

        self.marker.clear().await?;
        let placement = place_members(self.manifest, &extract_dir, &self.options.project_root)?;

        if placement.placed.is_empty() {
            return Err(Error::NothingPlaced(manifest::archive_name(version)));
        }
        if !placement.missing.is_empty() {
            warn!(
                "install: placed {} of {} binaries; missing from archive: {}",
                placement.placed.len(),
                self.manifest.len(),
                placement.missing.join(", ")
            );
        }

        self.marker.write(version).await?;
        Ok(InstallOutcome::Installed {
            placed: placement.placed.len(),
            missing: placement.missing,
        })
    }
}

fn place_members(manifest: &[BinaryEntry], extracted: &Path, root: &Path) -> Result<Placement> {
    let mut placement = Placement::default();
    for entry in manifest {
        let from = extracted.join(entry.member);
        if !manifest::is_regular_file(&from) {
            if fs::symlink_metadata(&from).is_ok() {
                warn!("install: {} is not a regular file; skipping", entry.member);
            } else {
                warn!("install: {} not found in archive; skipping", entry.member);
            }
            placement.missing.push(entry.member);
            continue;
        }
        let to = entry.destination_in(root);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::io(format!("failed to create {}", parent.display()), e))?;
        }
        move_file(&from, &to)?;
        debug!("install: placed {} at {}", entry.member, to.display());
        placement.placed.push(entry.member);
    }
    Ok(placement)
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    // A stale link at the destination is replaced, never written through.
    if fs::symlink_metadata(to).is_ok_and(|meta| meta.file_type().is_symlink()) {
        fs::remove_file(to)
            .map_err(|e| Error::io(format!("failed to remove link {}", to.display()), e))?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            debug!("install: {e}; copying {} instead", from.display());
            fs::copy(from, to)
                .map_err(|e| Error::io(format!("failed to copy to {}", to.display()), e))?;
            if let Err(e) = fs::remove_file(from) {
                debug!("install: could not remove {}: {e}", from.display());
            }
            Ok(())
        }
        Err(e) => Err(Error::io(
            format!("failed to move {} to {}", from.display(), to.display()),
            e,
        )),
    }
}
