//! Publishing a built docs directory to a git pages branch.
//!
//! [`GitPagesPublisher`] clones the target repository into a temporary
//! directory and checks out the pages branch, creating it as an orphan branch
//! when it does not exist yet. It replaces the branch contents with the source
//! tree, then commits and pushes. A successful publish returns `Ok(())` and
//! any failure returns a [`PublishError`]. Nothing is retried.

use crate::error::PublishError;
use crate::launcher::{CapturedRun, Launcher};
use async_trait::async_trait;
use procrelay_core::{LaunchSpec, RelayStdOut};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Committer identity used for the publish commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitUser {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOptions {
    #[serde(default = "default_repository_url")]
    pub repository_url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_include_dotfiles")]
    pub include_dotfiles: bool,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default)]
    pub user: Option<GitUser>,
}

impl PublishOptions {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: repository_url.into(),
            branch: default_branch(),
            include_dotfiles: default_include_dotfiles(),
            message: default_message(),
            remote: default_remote(),
            user: None,
        }
    }
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self::new(default_repository_url())
    }
}

fn default_repository_url() -> String {
    "https://github.com/Shmew/Fable.SignalR.git".to_string()
}
fn default_branch() -> String {
    "gh-pages".to_string()
}
fn default_include_dotfiles() -> bool {
    true
}
fn default_message() -> String {
    "Updates".to_string()
}
fn default_remote() -> String {
    "origin".to_string()
}

/// Something that can publish a directory somewhere
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, source: &Path, options: &PublishOptions) -> Result<(), PublishError>;
}

/// Publishes by pushing the directory contents to a branch of a git repository
pub struct GitPagesPublisher {
    launcher: Launcher,
    git: String,
}

impl Default for GitPagesPublisher {
    fn default() -> Self {
        Self::new(Launcher::new())
    }
}

impl GitPagesPublisher {
    pub fn new(launcher: Launcher) -> Self {
        Self {
            launcher,
            git: "git".to_string(),
        }
    }

    /// Use a specific git executable instead of the one on `PATH`
    pub fn with_git(mut self, git: impl Into<String>) -> Self {
        self.git = git.into();
        self
    }

    async fn git(&self, dir: &Path, step: &str, args: &[&str]) -> Result<CapturedRun, PublishError> {
        let run = self.try_git(dir, args).await?;
        if !run.success() {
            return Err(PublishError::GitCommandFailed {
                step: step.to_string(),
                code: run.code(),
                stderr: run.stderr.trim().to_string(),
            });
        }
        Ok(run)
    }

    /// Like [`Self::git`] but a non-zero exit is not an error
    async fn try_git(&self, dir: &Path, args: &[&str]) -> Result<CapturedRun, PublishError> {
        let spec = LaunchSpec::builder()
            .command(self.git.as_str())
            .args(args.iter().copied())
            .working_directory(dir)
            .build()
            .map_err(procrelay_core::ProcrelayError::from)?;

        debug!("Running {}", spec.display_line());
        Ok(self.launcher.run_captured(&spec).await?)
    }

    async fn checkout(&self, repo: &Path, options: &PublishOptions) -> Result<(), PublishError> {
        let remote_ref = format!("refs/remotes/{}/{}", options.remote, options.branch);
        let exists = self
            .try_git(repo, &["rev-parse", "--verify", "--quiet", &remote_ref])
            .await?
            .success();

        if exists {
            self.git(repo, "checkout", &["checkout", "--quiet", &options.branch])
                .await?;
        } else {
            info!("Branch {} does not exist yet, creating it", options.branch);
            self.git(
                repo,
                "checkout",
                &["checkout", "--quiet", "--orphan", &options.branch],
            )
            .await?;
        }
        Ok(())
    }

    async fn commit(&self, repo: &Path, options: &PublishOptions) -> Result<(), PublishError> {
        let mut args: Vec<String> = Vec::new();
        if let Some(user) = &options.user {
            args.extend([
                "-c".to_string(),
                format!("user.name={}", user.name),
                "-c".to_string(),
                format!("user.email={}", user.email),
            ]);
        }
        args.extend([
            "commit".to_string(),
            "--quiet".to_string(),
            "-m".to_string(),
            options.message.clone(),
        ]);

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git(repo, "commit", &args).await?;
        Ok(())
    }
}

#[async_trait]
impl Publisher for GitPagesPublisher {
    async fn publish(&self, source: &Path, options: &PublishOptions) -> Result<(), PublishError> {
        let is_dir = tokio::fs::metadata(source)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(PublishError::SourceMissing(source.to_path_buf()));
        }

        let workdir = tempfile::tempdir()?;
        let repo = workdir.path();

        self.git(
            repo,
            "clone",
            &[
                "clone",
                "--quiet",
                "--origin",
                &options.remote,
                &options.repository_url,
                ".",
            ],
        )
        .await?;

        self.checkout(repo, options).await?;
        self.git(repo, "rm", &["rm", "-r", "-q", "--ignore-unmatch", "."])
            .await?;

        let copied = {
            let source = source.to_path_buf();
            let target = repo.to_path_buf();
            let include_dotfiles = options.include_dotfiles;
            tokio::task::spawn_blocking(move || copy_tree(&source, &target, include_dotfiles))
                .await
                .map_err(|e| PublishError::Io(std::io::Error::other(e)))??
        };
        info!("Copied {} files from {}", copied, source.display());

        self.git(repo, "add", &["add", "--all"]).await?;

        let status = self.git(repo, "status", &["status", "--porcelain"]).await?;
        if status.stdout.trim().is_empty() {
            info!("Nothing to publish, {} is up to date", options.branch);
            return Ok(());
        }

        self.commit(repo, options).await?;
        self.git(
            repo,
            "push",
            &["push", "--quiet", &options.remote, &options.branch],
        )
        .await?;

        info!("Pushed {} to {}", options.branch, options.repository_url);
        Ok(())
    }
}

/// Copy every file under `source` into `target`, returning the number of files copied.
///
/// `.git` is never copied. Other entries starting with `.` are copied only with `include_dotfiles`.
pub fn copy_tree(source: &Path, target: &Path, include_dotfiles: bool) -> std::io::Result<usize> {
    let mut copied = 0;

    let walker = WalkDir::new(source).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        if name == ".git" {
            return false;
        }
        include_dotfiles || !name.starts_with('.')
    });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(std::io::Error::other)?;
        let destination: PathBuf = target.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &destination)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Publish and report the outcome on `out`
pub async fn publish_and_report(
    publisher: &dyn Publisher,
    source: &Path,
    options: &PublishOptions,
    out: &RelayStdOut,
) -> Result<(), PublishError> {
    out.print(&format!("Publishing to {}\n", options.repository_url))
        .await;

    match publisher.publish(source, options).await {
        Ok(()) => {
            out.print("Finished publishing successfully\n").await;
            Ok(())
        }
        Err(e) => {
            out.print(&format!("Error occurred while publishing: {e}\n"))
                .await;
            Err(e)
        }
    }
}
