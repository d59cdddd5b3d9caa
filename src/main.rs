use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};

mod archive;
mod env;
mod error;
mod install;
mod manifest;
mod networking;
mod progress;
mod publish;
mod status;
mod storage;
#[cfg(test)]
mod testutil;
mod util;
mod version;

use error::{Error, Result};
use install::{InstallOptions, InstallOutcome, Installer};
use manifest::MANIFEST;
use publish::{Destination, PublishOptions, UploadTarget};

#[derive(Parser, Debug)]
#[command(
    name = "vella-sdk-libs",
    author,
    version,
    about = "Publishes and installs the prebuilt Vella SDK native libraries"
)]
struct Cli {
    /// Project root holding package.json and the android/ and ios/ folders.
    #[arg(long, global = true, default_value = ".")]
    project_root: PathBuf,

    /// SDK version to publish or install; defaults to the version in package.json.
    #[arg(long, global = true)]
    sdk_version: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bundle the native libraries into a versioned archive and upload it.
    Publish {
        #[arg(long, value_enum, default_value_t = UploadTarget::GithubRelease)]
        target: UploadTarget,

        /// Where the archive and checksum are written (default: <project-root>/dist).
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Build the archive and checksum but do not upload them.
        #[arg(long)]
        skip_upload: bool,
    },
    /// Download the archive for this version and place the libraries (postinstall).
    Install {
        /// Base URL of the release downloads.
        #[arg(long)]
        base_url: Option<String>,

        /// Expected SHA-256 of the archive.
        #[arg(long)]
        sha256: Option<String>,

        /// Download even if the marker says this version is installed.
        #[arg(long)]
        force: bool,

        /// Hide the progress bar.
        #[arg(long)]
        quiet: bool,
    },
    /// Report which binaries are installed; exits non-zero if an install is needed.
    Status {
        #[arg(long)]
        base_url: Option<String>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Publish {
            target,
            output_dir,
            skip_upload,
        } => {
            let version = version::resolve_version(cli.sdk_version.as_deref(), &cli.project_root)?;
            let destination = if skip_upload {
                None
            } else {
                Some(Destination::from_env(target)?)
            };
            let options = PublishOptions {
                output_dir: output_dir.unwrap_or_else(|| env::default_output_dir(&cli.project_root)),
                project_root: cli.project_root,
                version,
                destination,
            };
            let report = publish::publish(&options, MANIFEST)?;
            info!(
                "publish: {} ready (checksum {}, sha256 {}, uploaded: {})",
                report.archive.display(),
                report.checksum_file.display(),
                report.sha256,
                report.uploaded
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Install {
            base_url,
            sha256,
            force,
            quiet,
        } => {
            if env::flag(env::SKIP_DOWNLOAD_VAR) {
                info!(
                    "install: {} is set; skipping native binary download",
                    env::SKIP_DOWNLOAD_VAR
                );
                return Ok(ExitCode::SUCCESS);
            }
            let options = InstallOptions {
                version: version::resolve_version(cli.sdk_version.as_deref(), &cli.project_root)?,
                base_url: resolve_base_url(base_url),
                expected_sha256: sha256.or_else(|| env::var(env::SHA256_VAR)),
                timeout: env::download_timeout()?,
                temp_root: std::env::temp_dir(),
                project_root: cli.project_root,
                force,
                show_progress: !quiet,
            };
            let version = options.version.clone();
            if let InstallOutcome::Installed { placed, missing } = Installer::new(options).run().await? {
                info!(
                    "install: installed {placed} of {} native binaries for {version} ({} missing)",
                    MANIFEST.len(),
                    missing.len()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Status { base_url, json } => {
            let version = version::resolve_version(cli.sdk_version.as_deref(), &cli.project_root)?;
            let report = status::collect(
                MANIFEST,
                &cli.project_root,
                &version,
                &resolve_base_url(base_url),
            )
            .await;
            if json {
                let text = serde_json::to_string_pretty(&report)
                    .map_err(|e| Error::Config(format!("failed to serialize status: {e}")))?;
                println!("{text}");
            } else {
                print!("{}", status::format_report(&report));
            }
            Ok(if report.up_to_date() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn resolve_base_url(flag: Option<String>) -> String {
    flag.or_else(|| env::var(env::BASE_URL_VAR))
        .unwrap_or_else(|| env::DEFAULT_BASE_URL.to_owned())
}
