use std::path::Path;

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};

const PACKAGE_JSON: &str = "package.json";

#[derive(Debug, Deserialize)]
struct PackageJson {
    #[serde(default)]
    version: Option<String>,
}

/// Pick the SDK version: an explicit value wins, otherwise `package.json` in `root`.
///
/// # Errors
/// Returns a configuration error if no version can be read or it is not semver-like.
pub fn resolve_version(explicit: Option<&str>, root: &Path) -> Result<String> {
    let raw = match explicit {
        Some(value) => value.to_owned(),
        None => read_package_version(root)?,
    };
    let version = normalize_version(&raw);
    if !is_release_version(&version) {
        return Err(Error::Config(format!(
            "`{raw}` is not a valid release version (expected MAJOR.MINOR.PATCH)"
        )));
    }
    debug!("version: resolved {version}");
    Ok(version)
}

fn read_package_version(root: &Path) -> Result<String> {
    let path = root.join(PACKAGE_JSON);
    let contents = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("unable to read {}: {e}", path.display())))?;
    let package: PackageJson = serde_json::from_str(&contents)
        .map_err(|e| Error::Config(format!("unable to parse {}: {e}", path.display())))?;
    package
        .version
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("{} has no version field", path.display())))
}

/// Normalize version string by removing 'v' prefix and surrounding whitespace.
fn normalize_version(version: &str) -> String {
    version.trim().trim_start_matches('v').to_owned()
}

/// Accepts `1.2.3`, `1.2.3-beta.1` and `1.2.3+build`.
fn is_release_version(version: &str) -> bool {
    let core = version.split(['-', '+']).next().unwrap_or_default();
    let parts = parse_version_parts(core);
    parts.len() == 3 && core.split('.').count() == 3
}

/// Parse version string into parts (e.g., "0.1.5" -> [0, 1, 5]).
fn parse_version_parts(version: &str) -> Vec<u32> {
    version
        .split('.')
        .filter_map(|part| part.parse::<u32>().ok())
        .collect()
}
