//! Finding the newest versioned directory among build outputs.
//!
//! Package restores leave directories such as `Fable.Jester.1.0.0` and
//! `Fable.Jester.2.0.0` side by side. Candidates are ordered by their parsed
//! numeric version, never by plain string order, so `10.0.0` beats `2.0.0`.
//! Ties and unparsable suffixes fall back to a fixed rule: versioned names
//! first, then reverse lexicographic name.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("No entry starting with `{prefix}` in {}", .dir.display())]
    NoMatch { prefix: String, dir: PathBuf },

    #[error("Failed to read {}: {source}", .dir.display())]
    Io {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Dotted numeric version with an optional pre-release tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirVersion {
    parts: Vec<u64>,
    pre: Option<String>,
}

impl DirVersion {
    /// Parse the part of `name` after `prefix`, e.g. `.2.0.0` or `.1.0.0-beta1`
    pub fn from_name(name: &str, prefix: &str) -> Option<Self> {
        let rest = name.strip_prefix(prefix)?;
        let rest = rest.trim_start_matches(['.', '-', '_']);
        if rest.is_empty() {
            return None;
        }

        let (numbers, pre) = match rest.split_once('-') {
            Some((numbers, pre)) => (numbers, Some(pre.to_string())),
            None => (rest, None),
        };

        let parts = numbers
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;

        Some(Self { parts, pre })
    }
}

impl Ord for DirVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }

        // a release outranks its pre-releases
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for DirVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pick the newest entry of `names` that starts with `prefix`
pub fn select_latest<S: AsRef<str>>(names: &[S], prefix: &str) -> Option<String> {
    names
        .iter()
        .map(|name| -> &str { name.as_ref() })
        .filter(|name| name.starts_with(prefix))
        .max_by(|a, b| {
            let va = DirVersion::from_name(a, prefix);
            let vb = DirVersion::from_name(b, prefix);
            va.cmp(&vb).then_with(|| a.cmp(b))
        })
        .map(str::to_string)
}

/// Scan `dir` for subdirectories starting with `prefix` and return the newest one
pub fn discover_latest(dir: &Path, prefix: &str) -> Result<PathBuf, DiscoveryError> {
    let io_err = |source| DiscoveryError::Io {
        dir: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if !entry.file_type().map_err(io_err)?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }

    debug!("Candidates in {}: {:?}", dir.display(), names);

    select_latest(&names, prefix)
        .map(|name| dir.join(name))
        .ok_or_else(|| DiscoveryError::NoMatch {
            prefix: prefix.to_string(),
            dir: dir.to_path_buf(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "Fable.Jester";

    #[test]
    fn test_selects_highest_version() {
        let names = ["Fable.Jester.1.0.0", "Fable.Jester.2.0.0", "OtherDir"];
        assert_eq!(
            select_latest(&names, PREFIX).as_deref(),
            Some("Fable.Jester.2.0.0")
        );
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let names = ["Fable.Jester.2.0.0", "Fable.Jester.10.0.0", "Fable.Jester.9.9.9"];
        assert_eq!(
            select_latest(&names, PREFIX).as_deref(),
            Some("Fable.Jester.10.0.0")
        );
    }

    #[test]
    fn test_release_beats_prerelease() {
        let names = ["Fable.Jester.1.0.0-beta2", "Fable.Jester.1.0.0"];
        assert_eq!(
            select_latest(&names, PREFIX).as_deref(),
            Some("Fable.Jester.1.0.0")
        );
    }

    #[test]
    fn test_versioned_beats_unversioned() {
        let names = ["Fable.Jester", "Fable.JesterTools", "Fable.Jester.0.1.0"];
        assert_eq!(
            select_latest(&names, PREFIX).as_deref(),
            Some("Fable.Jester.0.1.0")
        );
    }

    #[test]
    fn test_unversioned_tie_breaks_by_reverse_name() {
        let names = ["Fable.Jester.a", "Fable.Jester.b"];
        assert_eq!(
            select_latest(&names, PREFIX).as_deref(),
            Some("Fable.Jester.b")
        );
    }

    #[test]
    fn test_no_match() {
        let names = ["OtherDir", "fable.jester.1.0.0"];
        assert_eq!(select_latest(&names, PREFIX), None);
    }

    #[test]
    fn test_version_parsing() {
        let v = DirVersion::from_name("Fable.Jester.1.2.3", PREFIX).unwrap();
        assert_eq!(v.parts, vec![1, 2, 3]);
        assert_eq!(v.pre, None);

        let v = DirVersion::from_name("Fable.Jester.1.0.0-rc.1", PREFIX).unwrap();
        assert_eq!(v.parts, vec![1, 0, 0]);
        assert_eq!(v.pre.as_deref(), Some("rc.1"));

        assert!(DirVersion::from_name("Fable.Jester", PREFIX).is_none());
        assert!(DirVersion::from_name("Fable.Jester.x.y", PREFIX).is_none());
        assert!(DirVersion::from_name("Other.1.0", PREFIX).is_none());

        assert_eq!(
            DirVersion::from_name("Fable.Jester.1.0", PREFIX),
            DirVersion::from_name("Fable.Jester.1.0", PREFIX)
        );
        assert_eq!(
            DirVersion::from_name("Fable.Jester.1.0", PREFIX)
                .cmp(&DirVersion::from_name("Fable.Jester.1.0.0", PREFIX)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_discover_latest_ignores_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Fable.Jester.1.0.0")).unwrap();
        std::fs::create_dir(dir.path().join("Fable.Jester.2.0.0")).unwrap();
        std::fs::write(dir.path().join("Fable.Jester.9.0.0"), "not a dir").unwrap();

        let found = discover_latest(dir.path(), PREFIX).unwrap();
        assert_eq!(found, dir.path().join("Fable.Jester.2.0.0"));
    }

    #[test]
    fn test_discover_latest_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("OtherDir")).unwrap();
        assert!(matches!(
            discover_latest(dir.path(), PREFIX),
            Err(DiscoveryError::NoMatch { .. })
        ));

        assert!(matches!(
            discover_latest(&dir.path().join("missing"), PREFIX),
            Err(DiscoveryError::Io { .. })
        ));
    }
}
