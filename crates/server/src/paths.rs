//! Path resolution and containment against an allowed root.
//!
//! Containment is decided lexically, before the filesystem is touched, so a
//! rejected path is never opened.

use std::path::{Component, Path, PathBuf};

use crate::config::Containment;

/// Collapse `.` and `..` without consulting the filesystem. `..` never climbs
/// above the filesystem root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Whether `path` lies within `root` under the given containment mode.
/// Both paths are expected to be normalized.
pub fn is_within(root: &Path, path: &Path, mode: Containment) -> bool {
    match mode {
        Containment::Ancestor => path.starts_with(root),
        Containment::Prefix => path
            .to_string_lossy()
            .starts_with(root.to_string_lossy().as_ref()),
    }
}

/// A directory subtree outside of which access is forbidden.
#[derive(Debug, Clone)]
pub struct AllowedRoot {
    dir: PathBuf,
}

impl AllowedRoot {
    /// Anchor `dir` (made absolute against the working directory).
    pub fn new(dir: &Path) -> Result<Self, String> {
        let absolute = std::path::absolute(dir)
            .map_err(|e| format!("Invalid root {}: {e}", dir.display()))?;
        Ok(Self {
            dir: normalize(&absolute),
        })
    }

    /// The normalised absolute root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a client-supplied reference: absolute references are taken
    /// as-is, relative ones are joined onto the root.
    pub fn resolve(&self, reference: &str) -> PathBuf {
        let reference = Path::new(reference);
        if reference.is_absolute() {
            normalize(reference)
        } else {
            normalize(&self.dir.join(reference))
        }
    }

    /// Whether `path` lies under the root according to `mode`.
    pub fn contains(&self, path: &Path, mode: Containment) -> bool {
        is_within(&self.dir, path, mode)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn root() -> AllowedRoot {
        AllowedRoot::new(Path::new("/root/log_samples")).unwrap()
    }

    #[test]
    fn test_normalize_collapses_dots() {
        assert_eq!(
            normalize(Path::new("/a/./b/../c")),
            PathBuf::from("/a/c")
        );
        assert_eq!(normalize(Path::new("/../../etc")), PathBuf::from("/etc"));
        assert_eq!(normalize(Path::new("a/../../b")), PathBuf::from("b"));
    }

    #[test]
    fn test_relative_reference_resolves_against_root() {
        let root = root();
        assert_eq!(
            root.resolve("run.json"),
            PathBuf::from("/root/log_samples/run.json")
        );
        // Browser clients address files as `../log_samples/<name>`.
        assert_eq!(
            root.resolve("../log_samples/run.json"),
            PathBuf::from("/root/log_samples/run.json")
        );
    }

    #[test]
    fn test_escapes_are_rejected() {
        let root = root();
        for reference in [
            "../secrets.json",
            "../../etc/passwd",
            "/etc/passwd",
            "sub/../../other/file.json",
        ] {
            let path = root.resolve(reference);
            assert!(
                !root.contains(&path, Containment::Ancestor),
                "{reference} resolved to {} and passed",
                path.display()
            );
        }
    }

    #[test]
    fn test_sibling_prefix_collision() {
        let root = root();
        let sibling = root.resolve("../log_samples-evil/run.json");
        assert_eq!(sibling, PathBuf::from("/root/log_samples-evil/run.json"));
        assert!(!root.contains(&sibling, Containment::Ancestor));
        // The legacy check admits it.
        assert!(root.contains(&sibling, Containment::Prefix));
    }

    #[test]
    fn test_nested_paths_and_root_itself_are_contained() {
        let root = root();
        for mode in [Containment::Ancestor, Containment::Prefix] {
            assert!(root.contains(&root.resolve("a/b/c.json"), mode));
            assert!(root.contains(&root.resolve("/root/log_samples/x.json"), mode));
            assert!(root.contains(&root.resolve("."), mode));
        }
    }

    #[test]
    fn test_relative_root_is_made_absolute() {
        let root = AllowedRoot::new(Path::new("log_samples")).unwrap();
        assert!(root.dir().is_absolute());
        assert!(root.dir().ends_with("log_samples"));
    }
}
