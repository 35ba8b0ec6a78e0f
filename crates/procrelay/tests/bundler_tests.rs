use async_trait::async_trait;
use procrelay::discovery::DiscoveryError;
use procrelay::{
    NodeSnapshotCopier, SnapshotCopier, SnapshotError, SnapshotLoaderLocation, TestBundleConfig,
    on_compiled,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
struct RecordingCopier {
    calls: Mutex<Vec<(PathBuf, PathBuf, PathBuf)>>,
}

impl RecordingCopier {
    fn calls(&self) -> Vec<(PathBuf, PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotCopier for RecordingCopier {
    async fn copy_snaps(
        &self,
        loader_dir: &Path,
        source_dir: &Path,
        out_dir: &Path,
    ) -> Result<(), SnapshotError> {
        self.calls.lock().unwrap().push((
            loader_dir.to_path_buf(),
            source_dir.to_path_buf(),
            out_dir.to_path_buf(),
        ));
        Ok(())
    }
}

fn bundle_in(out_dir: &Path) -> TestBundleConfig {
    TestBundleConfig {
        out_dir: out_dir.to_path_buf(),
        ..TestBundleConfig::fable_signalr_tests("tests/Fable.SignalR.Tests")
    }
}

#[tokio::test]
async fn test_on_compiled_uses_newest_loader() {
    let out = tempfile::tempdir().unwrap();
    for name in ["Fable.Jester.1.0.0", "Fable.Jester.2.0.0", "OtherDir"] {
        std::fs::create_dir(out.path().join(name)).unwrap();
    }

    let copier = RecordingCopier::default();
    let source = Path::new("tests/Fable.SignalR.Tests");
    let loader = on_compiled(&bundle_in(out.path()), source, &copier)
        .await
        .unwrap();

    assert_eq!(loader, out.path().join("Fable.Jester.2.0.0"));
    assert_eq!(
        copier.calls(),
        vec![(
            out.path().join("Fable.Jester.2.0.0"),
            source.to_path_buf(),
            out.path().to_path_buf()
        )]
    );
}

#[tokio::test]
async fn test_on_compiled_without_loader_does_not_copy() {
    let out = tempfile::tempdir().unwrap();
    std::fs::create_dir(out.path().join("OtherDir")).unwrap();

    let copier = RecordingCopier::default();
    let result = on_compiled(&bundle_in(out.path()), Path::new("src"), &copier).await;

    assert!(matches!(
        result,
        Err(SnapshotError::Discovery(DiscoveryError::NoMatch { .. }))
    ));
    assert!(copier.calls().is_empty());
}

#[tokio::test]
async fn test_on_compiled_with_explicit_loader() {
    let out = tempfile::tempdir().unwrap();
    let loader = tempfile::tempdir().unwrap();

    let config = TestBundleConfig {
        snapshot_loader: SnapshotLoaderLocation::Explicit {
            path: loader.path().to_path_buf(),
        },
        ..bundle_in(out.path())
    };

    let copier = RecordingCopier::default();
    on_compiled(&config, Path::new("src"), &copier).await.unwrap();
    assert_eq!(copier.calls()[0].0, loader.path());
}

#[tokio::test]
async fn test_node_copier_failure() {
    let out = tempfile::tempdir().unwrap();
    std::fs::create_dir(out.path().join("Fable.Jester.1.0.0")).unwrap();

    // `false` ignores its arguments and exits 1
    let copier = NodeSnapshotCopier::default().with_node("false");
    let result = on_compiled(&bundle_in(out.path()), Path::new("src"), &copier).await;
    assert!(matches!(result, Err(SnapshotError::CopyFailed { code: Some(1), .. })));

    let copier = NodeSnapshotCopier::default().with_node("definitely-not-a-real-binary-xyz");
    let result = on_compiled(&bundle_in(out.path()), Path::new("src"), &copier).await;
    assert!(matches!(result, Err(SnapshotError::Process(_))));
}

fn node_available() -> bool {
    std::process::Command::new("node")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

const SNAPSHOT_LOADER: &str = r#"
const fs = require("fs");
const path = require("path");
exports.copySnaps = (src, out) => {
    fs.writeFileSync(path.join(out, "copied-from.txt"), src);
};
"#;

#[tokio::test]
async fn test_node_copier_with_relative_project_dir() {
    if !node_available() {
        return;
    }

    // relative to the working directory, like the built-in settings
    let root = tempfile::Builder::new()
        .prefix("snapshots-")
        .tempdir_in(".")
        .unwrap();
    let relative_root = PathBuf::from(root.path().file_name().unwrap());
    let project_dir = relative_root.join("tests").join("Fable.SignalR.Tests");
    std::fs::create_dir_all(&project_dir).unwrap();

    let loader_dir = relative_root.join("dist/tests/Fable.Jester.2.0.0");
    std::fs::create_dir_all(&loader_dir).unwrap();
    std::fs::write(loader_dir.join("SnapshotLoader.js"), SNAPSHOT_LOADER).unwrap();

    let config = TestBundleConfig::fable_signalr_tests(&project_dir);
    assert!(config.out_dir.is_relative());

    let loader = on_compiled(&config, &project_dir, &NodeSnapshotCopier::default())
        .await
        .unwrap();
    assert_eq!(loader, config.out_dir.join("Fable.Jester.2.0.0"));

    let copied_from =
        std::fs::read_to_string(relative_root.join("dist/tests/copied-from.txt")).unwrap();
    assert_eq!(
        Path::new(&copied_from),
        std::path::absolute(&project_dir).unwrap()
    );
}
