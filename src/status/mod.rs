use std::fmt::Write;
use std::path::Path;

use serde::Serialize;

use crate::env;
use crate::manifest::{BinaryEntry, is_regular_file};
use crate::storage::MarkerStore;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub expected_version: String,
    pub installed_version: Option<String>,
    pub archive_url: String,
    pub binaries: Vec<BinaryStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BinaryStatus {
    pub member: String,
    pub destination: String,
    pub present: bool,
}

impl StatusReport {
    /// Same condition the installer uses to skip the download.
    pub fn up_to_date(&self) -> bool {
        self.installed_version.as_deref() == Some(self.expected_version.as_str())
            && self.binaries.iter().all(|b| b.present)
    }
}

pub async fn collect(
    manifest: &[BinaryEntry],
    project_root: &Path,
    version: &str,
    base_url: &str,
) -> StatusReport {
    let installed_version = MarkerStore::new(project_root).read().await;
    let binaries = manifest
        .iter()
        .map(|entry| BinaryStatus {
            member: entry.member.to_owned(),
            destination: entry.destination.to_owned(),
            present: is_regular_file(&entry.destination_in(project_root)),
        })
        .collect();
    StatusReport {
        expected_version: version.to_owned(),
        installed_version,
        archive_url: env::archive_url(base_url, version),
        binaries,
    }
}

pub fn format_report(report: &StatusReport) -> String {
    let mut output = String::new();
    let _ = writeln!(&mut output, "=== VELLA SDK NATIVE BINARIES ===");
    let _ = writeln!(&mut output, "Expected Version: {}", report.expected_version);
    let _ = writeln!(
        &mut output,
        "Installed Version: {}",
        report.installed_version.as_deref().unwrap_or("none")
    );
    let _ = writeln!(&mut output, "Archive: {}", report.archive_url);

    let _ = writeln!(&mut output, "\n=== BINARIES ===");
    for binary in &report.binaries {
        let _ = writeln!(
            &mut output,
            "{:<8} {}",
            if binary.present { "OK" } else { "MISSING" },
            binary.destination
        );
    }

    let _ = writeln!(
        &mut output,
        "\nUp To Date: {}",
        if report.up_to_date() { "Yes" } else { "No" }
    );
    output
}
