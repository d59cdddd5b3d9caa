use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::ValueEnum;
use log::{debug, info};

use crate::archive;
use crate::env;
use crate::error::{Error, Result};
use crate::manifest::{self, BinaryEntry};
use crate::util;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum UploadTarget {
    /// `aws s3 cp` to an S3-compatible bucket.
    S3,
    /// `gh release` assets on the `v<version>` tag.
    GithubRelease,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Destination {
    S3 {
        bucket: String,
        prefix: String,
        endpoint: Option<String>,
    },
    GithubRelease {
        repo: String,
    },
}

impl Destination {
    pub fn from_env(target: UploadTarget) -> Result<Self> {
        Self::from_lookup(target, env::var)
    }

    fn from_lookup<F>(target: UploadTarget, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .ok_or_else(|| Error::Config(format!("environment variable {name} is not set")))
        };
        match target {
            UploadTarget::S3 => Ok(Self::S3 {
                bucket: require(env::S3_BUCKET_VAR)?,
                prefix: lookup(env::S3_PREFIX_VAR).unwrap_or_default(),
                endpoint: lookup(env::S3_ENDPOINT_VAR),
            }),
            UploadTarget::GithubRelease => Ok(Self::GithubRelease {
                repo: require(env::GITHUB_REPOSITORY_VAR)?,
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PublishOptions {
    pub project_root: PathBuf,
    pub version: String,
    pub output_dir: PathBuf,
    /// `None` builds the archive without uploading it.
    pub destination: Option<Destination>,
}

#[derive(Clone, Debug)]
pub struct PublishReport {
    pub archive: PathBuf,
    pub checksum_file: PathBuf,
    pub sha256: String,
    pub uploaded: bool,
}

pub fn publish(options: &PublishOptions, manifest: &[BinaryEntry]) -> Result<PublishReport> {
    let sources = collect_sources(manifest, &options.project_root)?;

    let name = manifest::archive_name(&options.version);
    let archive_path = options.output_dir.join(&name);
    archive::create_targz(&sources, &archive_path)?;
    verify_members(&archive_path, manifest)?;

    let sha256 = util::sha256_file(&archive_path)?;
    let checksum_file = options.output_dir.join(format!("{name}.sha256"));
    fs::write(&checksum_file, format!("{sha256}  {name}\n"))
        .map_err(|e| Error::io("failed to write checksum file", e))?;
    info!("publish: {name} sha256 {sha256}");

    let uploaded = match &options.destination {
        Some(destination) => {
            upload(
                destination,
                &options.version,
                &[archive_path.as_path(), checksum_file.as_path()],
            )?;
            true
        }
        None => {
            info!("publish: upload skipped; archive left at {}", archive_path.display());
            false
        }
    };

    Ok(PublishReport {
        archive: archive_path,
        checksum_file,
        sha256,
        uploaded,
    })
}

/// Source file for every manifest entry, failing with all missing paths at once.
fn collect_sources<'a>(
    manifest: &'a [BinaryEntry],
    root: &Path,
) -> Result<Vec<(PathBuf, &'a str)>> {
    let missing: Vec<String> = manifest::missing_destinations(manifest, root)
        .iter()
        .map(|path| path.display().to_string())
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingSources(missing));
    }
    Ok(manifest
        .iter()
        .map(|entry| (entry.destination_in(root), entry.member))
        .collect())
}

/// The written archive must hold exactly one regular file per manifest entry.
fn verify_members(archive_path: &Path, manifest: &[BinaryEntry]) -> Result<()> {
    let mut found = archive::list_members(archive_path)?;
    found.sort();
    let mut expected: Vec<&str> = manifest.iter().map(|entry| entry.member).collect();
    expected.sort_unstable();
    if found != expected {
        return Err(Error::Archive(format!(
            "{} holds [{}], expected [{}]",
            archive_path.display(),
            found.join(", "),
            expected.join(", ")
        )));
    }
    debug!("publish: verified {} archive members", found.len());
    Ok(())
}

fn upload(destination: &Destination, version: &str, files: &[&Path]) -> Result<()> {
    match destination {
        Destination::S3 {
            bucket,
            prefix,
            endpoint,
        } => {
            for file in files {
                let uri = s3_uri(bucket, prefix, version, file_name(file)?);
                info!("publish: uploading {} to {uri}", file.display());
                run_tool("aws", &s3_copy_args(file, &uri, endpoint.as_deref()))?;
            }
        }
        Destination::GithubRelease { repo } => {
            let tag = env::release_tag(version);
            let exists = release_exists(repo, &tag)?;
            info!(
                "publish: {} release {tag} on {repo}",
                if exists { "updating" } else { "creating" }
            );
            run_tool("gh", &gh_release_args(repo, &tag, files, exists))?;
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::Upload(format!("unusable file name {}", path.display())))
}

fn s3_uri(bucket: &str, prefix: &str, version: &str, file: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let tag = env::release_tag(version);
    if prefix.is_empty() {
        format!("s3://{bucket}/{tag}/{file}")
    } else {
        format!("s3://{bucket}/{prefix}/{tag}/{file}")
    }
}

fn s3_copy_args(file: &Path, uri: &str, endpoint: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["s3".into(), "cp".into(), file.into(), uri.into()];
    if let Some(endpoint) = endpoint {
        args.push("--endpoint-url".into());
        args.push(endpoint.into());
    }
    args
}

fn gh_release_args(repo: &str, tag: &str, files: &[&Path], exists: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "release".into(),
        (if exists { "upload" } else { "create" }).into(),
        tag.into(),
    ];
    args.extend(files.iter().map(|file| file.as_os_str().to_owned()));
    if exists {
        args.push("--clobber".into());
    } else {
        args.push("--title".into());
        args.push(tag.into());
        args.push("--notes".into());
        args.push(format!("Prebuilt Vella SDK native libraries for {tag}").into());
    }
    args.push("--repo".into());
    args.push(repo.into());
    args
}

fn release_exists(repo: &str, tag: &str) -> Result<bool> {
    let output = Command::new("gh")
        .args(["release", "view", tag, "--repo", repo])
        .output()
        .map_err(|e| tool_error("gh", e))?;
    debug!("publish: gh release view {tag} exited with {}", output.status);
    Ok(output.status.success())
}

fn run_tool(program: &str, args: &[OsString]) -> Result<()> {
    debug!("publish: running {program} {args:?}");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| tool_error(program, e))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(Error::Upload(format!(
        "{program} exited with {}: {}",
        output.status,
        if stderr.trim().is_empty() {
            stdout.trim().to_owned()
        } else {
            stderr.trim().to_owned()
        }
    )))
}

fn tool_error(program: &str, err: std::io::Error) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::Upload(format!("`{program}` was not found on PATH"))
    } else {
        Error::Upload(format!("failed to run {program}: {err}"))
    }
}
