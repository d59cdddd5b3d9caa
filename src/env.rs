use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::manifest::archive_name;

pub const MARKER_FILE: &str = ".binary-version";
pub const DEFAULT_BASE_URL: &str = "https://github.com/vella-ai/vella-sdk/releases/download";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const BASE_URL_VAR: &str = "VELLA_SDK_LIBS_BASE_URL";
pub const SHA256_VAR: &str = "VELLA_SDK_LIBS_SHA256";
pub const TIMEOUT_VAR: &str = "VELLA_SDK_LIBS_TIMEOUT_SECS";
pub const SKIP_DOWNLOAD_VAR: &str = "VELLA_SDK_LIBS_SKIP_DOWNLOAD";
pub const S3_BUCKET_VAR: &str = "VELLA_SDK_LIBS_S3_BUCKET";
pub const S3_PREFIX_VAR: &str = "VELLA_SDK_LIBS_S3_PREFIX";
pub const S3_ENDPOINT_VAR: &str = "VELLA_SDK_LIBS_S3_ENDPOINT";
pub const GITHUB_REPOSITORY_VAR: &str = "GITHUB_REPOSITORY";

/// Read an environment variable, treating blank values as unset.
pub fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

pub fn flag(name: &str) -> bool {
    var(name).is_some_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn download_timeout() -> Result<Duration> {
    parse_timeout(var(TIMEOUT_VAR).as_deref())
}

fn parse_timeout(raw: Option<&str>) -> Result<Duration> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::Config(format!(
            "{TIMEOUT_VAR} must be a positive number of seconds, got `{raw}`"
        ))),
    }
}

pub fn marker_path(root: &Path) -> PathBuf {
    root.join(MARKER_FILE)
}

pub fn default_output_dir(root: &Path) -> PathBuf {
    root.join("dist")
}

/// Remote location of the archive: `<base>/v<version>/<archive>`.
pub fn archive_url(base: &str, version: &str) -> String {
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        release_tag(version),
        archive_name(version)
    )
}

pub fn release_tag(version: &str) -> String {
    format!("v{version}")
}
