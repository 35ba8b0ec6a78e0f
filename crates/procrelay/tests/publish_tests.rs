use procrelay::publish::GitUser;
use procrelay::{
    GitPagesPublisher, PublishError, PublishOptions, Publisher, publish_and_report,
};
use procrelay_core::CaptureBuffer;
use std::path::Path;
use std::process::Command;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Bare repository with a single commit on `main`
fn seeded_remote(root: &Path) -> std::path::PathBuf {
    let remote = root.join("remote.git");
    std::fs::create_dir(&remote).unwrap();
    git(&remote, &["init", "--bare", "--quiet"]);
    git(&remote, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    let seed = root.join("seed");
    std::fs::create_dir(&seed).unwrap();
    git(&seed, &["init", "--quiet"]);
    std::fs::write(seed.join("README.md"), "# project\n").unwrap();
    git(&seed, &["add", "README.md"]);
    git(&seed, &["commit", "--quiet", "-m", "init"]);
    git(
        &seed,
        &["push", "--quiet", remote.to_str().unwrap(), "HEAD:refs/heads/main"],
    );

    remote
}

fn docs(root: &Path) -> std::path::PathBuf {
    let docs = root.join("docs");
    std::fs::create_dir_all(docs.join("css")).unwrap();
    std::fs::write(docs.join("index.html"), "<html></html>").unwrap();
    std::fs::write(docs.join("css/site.css"), "body {}").unwrap();
    std::fs::write(docs.join(".nojekyll"), "").unwrap();
    docs
}

fn options(remote: &Path) -> PublishOptions {
    PublishOptions {
        user: Some(GitUser {
            name: "Publisher".to_string(),
            email: "publisher@example.com".to_string(),
        }),
        ..PublishOptions::new(remote.to_string_lossy())
    }
}

fn published_files(remote: &Path, branch: &str) -> Vec<String> {
    git(remote, &["ls-tree", "-r", "--name-only", branch])
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_publish_creates_pages_branch() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let remote = seeded_remote(root.path());
    let docs = docs(root.path());

    let publisher = GitPagesPublisher::default();
    publisher.publish(&docs, &options(&remote)).await.unwrap();

    assert_eq!(
        published_files(&remote, "gh-pages"),
        vec![".nojekyll", "css/site.css", "index.html"]
    );
    assert_eq!(git(&remote, &["log", "-1", "--format=%s", "gh-pages"]).trim(), "Updates");
    assert_eq!(published_files(&remote, "main"), vec!["README.md"]);
}

#[tokio::test]
async fn test_publish_without_dotfiles() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let remote = seeded_remote(root.path());
    let docs = docs(root.path());

    let options = PublishOptions {
        include_dotfiles: false,
        ..options(&remote)
    };
    GitPagesPublisher::default()
        .publish(&docs, &options)
        .await
        .unwrap();

    assert_eq!(
        published_files(&remote, "gh-pages"),
        vec!["css/site.css", "index.html"]
    );
}

#[tokio::test]
async fn test_republish_replaces_contents() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let remote = seeded_remote(root.path());
    let docs = docs(root.path());
    let publisher = GitPagesPublisher::default();

    publisher.publish(&docs, &options(&remote)).await.unwrap();

    // unchanged tree: nothing to commit
    publisher.publish(&docs, &options(&remote)).await.unwrap();
    assert_eq!(
        git(&remote, &["rev-list", "--count", "gh-pages"]).trim(),
        "1"
    );

    std::fs::remove_file(docs.join("css/site.css")).unwrap();
    std::fs::write(docs.join("about.html"), "<p>about</p>").unwrap();
    publisher.publish(&docs, &options(&remote)).await.unwrap();

    assert_eq!(
        published_files(&remote, "gh-pages"),
        vec![".nojekyll", "about.html", "index.html"]
    );
    assert_eq!(
        git(&remote, &["rev-list", "--count", "gh-pages"]).trim(),
        "2"
    );
}

#[tokio::test]
async fn test_missing_source_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let capture = CaptureBuffer::new();

    let result = publish_and_report(
        &GitPagesPublisher::default(),
        &root.path().join("no-docs"),
        &PublishOptions::new("/nowhere.git"),
        &capture.stdout(),
    )
    .await;

    assert!(matches!(result, Err(PublishError::SourceMissing(_))));
    let printed = capture.contents();
    assert!(printed.starts_with("Publishing to /nowhere.git\n"));
    assert!(printed.contains("Error occurred while publishing:"));
    assert!(!printed.contains("Finished publishing successfully"));
}

#[tokio::test]
async fn test_unreachable_remote_fails_clone() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let docs = docs(root.path());

    let result = GitPagesPublisher::default()
        .publish(&docs, &PublishOptions::new(root.path().join("missing.git").to_string_lossy()))
        .await;

    match result {
        Err(PublishError::GitCommandFailed { step, .. }) => assert_eq!(step, "clone"),
        other => panic!("expected clone failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_report_success() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let remote = seeded_remote(root.path());
    let docs = docs(root.path());
    let capture = CaptureBuffer::new();

    publish_and_report(
        &GitPagesPublisher::default(),
        &docs,
        &options(&remote),
        &capture.stdout(),
    )
    .await
    .unwrap();

    assert_eq!(
        capture.contents(),
        format!(
            "Publishing to {}\nFinished publishing successfully\n",
            remote.display()
        )
    );
}
