//! Post-compile hook for the test bundle.
//!
//! After the test project is compiled, the Jest snapshots committed next to
//! the sources have to be copied into the compiled output so the tests can
//! find them. The copying itself is done by the snapshot loader shipped in the
//! restored Fable.Jester package.

use crate::error::SnapshotError;
use crate::launcher::Launcher;
use async_trait::async_trait;
use procrelay_core::LaunchSpec;
use procrelay_core::discovery::discover_latest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BabelOptions {
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default = "default_source_maps")]
    pub source_maps: String,
}

impl Default for BabelOptions {
    fn default() -> Self {
        Self {
            plugins: vec!["@babel/plugin-transform-modules-commonjs".to_string()],
            source_maps: default_source_maps(),
        }
    }
}

fn default_source_maps() -> String {
    "inline".to_string()
}

/// Where the snapshot loader package lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SnapshotLoaderLocation {
    /// A fixed directory
    Explicit { path: PathBuf },
    /// Newest directory in the output dir whose name starts with `prefix`
    Discover {
        #[serde(default = "default_loader_prefix")]
        prefix: String,
    },
}

impl Default for SnapshotLoaderLocation {
    fn default() -> Self {
        SnapshotLoaderLocation::Discover {
            prefix: default_loader_prefix(),
        }
    }
}

fn default_loader_prefix() -> String {
    "Fable.Jester".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBundleConfig {
    #[serde(default = "default_all_files")]
    pub all_files: bool,
    pub entry: PathBuf,
    pub out_dir: PathBuf,
    #[serde(default)]
    pub babel: BabelOptions,
    #[serde(default)]
    pub snapshot_loader: SnapshotLoaderLocation,
}

fn default_all_files() -> bool {
    true
}

impl TestBundleConfig {
    /// Bundle config of the Fable.SignalR test project in `project_dir`
    pub fn fable_signalr_tests(project_dir: impl AsRef<Path>) -> Self {
        let project_dir = project_dir.as_ref();
        Self {
            all_files: true,
            entry: project_dir.join("Fable.SignalR.Tests.fsproj"),
            out_dir: project_dir.join("..").join("..").join("dist").join("tests"),
            babel: BabelOptions::default(),
            snapshot_loader: SnapshotLoaderLocation::default(),
        }
    }

    /// Directory holding the snapshot loader for this bundle
    pub fn resolve_loader_dir(&self) -> Result<PathBuf, SnapshotError> {
        let dir = match &self.snapshot_loader {
            SnapshotLoaderLocation::Explicit { path } => path.clone(),
            SnapshotLoaderLocation::Discover { prefix } => discover_latest(&self.out_dir, prefix)?,
        };

        if !dir.is_dir() {
            return Err(SnapshotError::LoaderMissing(dir));
        }
        Ok(dir)
    }
}

/// Copies compiled snapshots out of the source tree
#[async_trait]
pub trait SnapshotCopier: Send + Sync {
    async fn copy_snaps(
        &self,
        loader_dir: &Path,
        source_dir: &Path,
        out_dir: &Path,
    ) -> Result<(), SnapshotError>;
}

/// Calls the loader's `copySnaps` export through `node`
pub struct NodeSnapshotCopier {
    launcher: Launcher,
    node: String,
}

impl Default for NodeSnapshotCopier {
    fn default() -> Self {
        Self::new(Launcher::new())
    }
}

impl NodeSnapshotCopier {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            node: "node".to_string(),
        }
    }

    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into();
        self
    }
}

/// Script passed to `node -e`. Paths are made absolute and embedded as JSON string literals.
///
/// `require` resolves a bare relative path through `node_modules`, so relative
/// paths never reach it.
pub fn node_script(
    loader_dir: &Path,
    source_dir: &Path,
    out_dir: &Path,
) -> std::io::Result<String> {
    let quote = |path: &Path| -> std::io::Result<String> {
        let path = std::path::absolute(path)?;
        serde_json::to_string(&path.to_string_lossy()).map_err(std::io::Error::other)
    };
    Ok(format!(
        "require({}).copySnaps({}, {})",
        quote(&loader_dir.join("SnapshotLoader"))?,
        quote(source_dir)?,
        quote(out_dir)?
    ))
}

#[async_trait]
impl SnapshotCopier for NodeSnapshotCopier {
    async fn copy_snaps(
        &self,
        loader_dir: &Path,
        source_dir: &Path,
        out_dir: &Path,
    ) -> Result<(), SnapshotError> {
        let script = node_script(loader_dir, source_dir, out_dir)?;
        debug!("copySnaps script: {}", script);

        let run = self
            .launcher
            .run_captured(&LaunchSpec::new(self.node.as_str(), ["-e", script.as_str()]))
            .await?;

        if !run.success() {
            return Err(SnapshotError::CopyFailed {
                code: run.code(),
                stderr: run.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Run after the test bundle compiled: copy the snapshots of `source_dir` into the bundle output
pub async fn on_compiled(
    config: &TestBundleConfig,
    source_dir: &Path,
    copier: &dyn SnapshotCopier,
) -> Result<PathBuf, SnapshotError> {
    let loader_dir = config.resolve_loader_dir()?;
    info!(
        "Copying snapshots from {} to {} using {}",
        source_dir.display(),
        config.out_dir.display(),
        loader_dir.display()
    );

    copier
        .copy_snaps(&loader_dir, source_dir, &config.out_dir)
        .await?;
    Ok(loader_dir)
}
