//! Fixed registry of the native binaries shipped in every release archive.
//!
//! The destination path is relative to the project root. The SDK build writes the
//! libraries there, the publisher reads them from there, and the installer puts
//! them back in the same place inside consuming projects.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryEntry {
    /// File name inside the archive.
    pub member: &'static str,
    /// Path relative to the project root.
    pub destination: &'static str,
}

impl BinaryEntry {
    pub fn destination_in(&self, root: &Path) -> PathBuf {
        root.join(self.destination)
    }
}

pub const MANIFEST: &[BinaryEntry] = &[
    BinaryEntry {
        member: "android-arm64-v8a-libvella_sdk.a",
        destination: "android/libs/arm64-v8a/libvella_sdk.a",
    },
    BinaryEntry {
        member: "android-armeabi-v7a-libvella_sdk.a",
        destination: "android/libs/armeabi-v7a/libvella_sdk.a",
    },
    BinaryEntry {
        member: "android-x86-libvella_sdk.a",
        destination: "android/libs/x86/libvella_sdk.a",
    },
    BinaryEntry {
        member: "android-x86_64-libvella_sdk.a",
        destination: "android/libs/x86_64/libvella_sdk.a",
    },
    BinaryEntry {
        member: "ios-arm64-libvella_sdk.a",
        destination: "ios/libs/ios-arm64/libvella_sdk.a",
    },
    BinaryEntry {
        member: "ios-arm64-simulator-libvella_sdk.a",
        destination: "ios/libs/ios-arm64-simulator/libvella_sdk.a",
    },
];

/// Name of the release archive for `version`.
pub fn archive_name(version: &str) -> String {
    format!("vella-sdk-libs-{version}.tar.gz")
}

/// True only for a regular file; symlinks are not followed.
pub fn is_regular_file(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|meta| meta.file_type().is_file())
}

/// Destinations under `root` that are not regular files yet.
pub fn missing_destinations(manifest: &[BinaryEntry], root: &Path) -> Vec<PathBuf> {
    manifest
        .iter()
        .map(|entry| entry.destination_in(root))
        .filter(|path| !is_regular_file(path))
        .collect()
}
