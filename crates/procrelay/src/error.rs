use procrelay_core::ProcrelayError;
use procrelay_core::discovery::DiscoveryError;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of a docs publish. Any of these means the publish did not happen.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Source directory {} does not exist or is not a directory", .0.display())]
    SourceMissing(PathBuf),

    #[error("git {step} failed with exit code {code:?}: {stderr}")]
    GitCommandFailed {
        step: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Process(#[from] ProcrelayError),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Snapshot loader not found: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Snapshot loader {} does not exist", .0.display())]
    LoaderMissing(PathBuf),

    #[error("copySnaps failed with exit code {code:?}: {stderr}")]
    CopyFailed { code: Option<i32>, stderr: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Process(#[from] ProcrelayError),
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unknown launch preset `{0}`")]
    UnknownPreset(String),

    #[error("Invalid settings: {0}")]
    Invalid(String),
}
