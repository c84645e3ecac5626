//! Plugin id derivation from an explicit source path.
//!
//! The loader that constructs a plugin passes the path it was loaded from;
//! [`InstallRoots::derive`] strips the first matching installation root and
//! collapses entry files so that the same plugin always gets the same id:
//!
//! | Path | Id |
//! |------|----|
//! | `<work>/plugins/echo.rs` | `echo` |
//! | `<work>/../packages/adapters/qq/src/lib.rs` | `weft-adapter-qq` |
//! | `<work>/../packages/services/http/src/main.rs` | `weft-plugin-http` |
//! | `<work>/custom/foo/mod.rs` | `custom/foo` |

use std::path::{Component, Path, PathBuf};

/// Entry-file stems dropped from the end of a path.
const ENTRY_STEMS: [&str; 4] = ["index", "mod", "lib", "main"];

/// Source directories dropped after an entry file.
const SOURCE_DIRS: [&str; 2] = ["src", "lib"];

/// Known installation roots, each with the prefix that replaces it.
#[derive(Debug, Clone)]
pub struct InstallRoots {
    roots: Vec<(PathBuf, String)>,
}

impl InstallRoots {
    /// The default layout for a host running in `work_dir`.
    pub fn new(work_dir: impl AsRef<Path>, namespace: &str) -> Self {
        let work = normalize(work_dir.as_ref());
        let packages = work.join("..").join("packages");
        Self::empty()
            .root(work.join("plugins"), "")
            .root(packages.join("adapters"), format!("{namespace}-adapter-"))
            .root(packages.join("plugins"), format!("{namespace}-plugin-"))
            .root(packages.join("services"), format!("{namespace}-plugin-"))
            .root(work.join("packages"), "")
            .root(work, "")
    }

    /// No roots at all; ids are derived from the full path.
    pub fn empty() -> Self {
        Self { roots: Vec::new() }
    }

    /// Adds a root. Deeper roots always win over shallower ones.
    pub fn root(mut self, path: impl AsRef<Path>, prefix: impl Into<String>) -> Self {
        let path = normalize(path.as_ref());
        let prefix = prefix.into();
        if let Some(existing) = self.roots.iter_mut().find(|(p, _)| *p == path) {
            existing.1 = prefix;
        } else {
            self.roots.push((path, prefix));
        }
        self.roots
            .sort_by_key(|(p, _)| std::cmp::Reverse(p.components().count()));
        self
    }

    /// Adds user plugin directories (`plugin_dirs` in the config) as
    /// unprefixed roots.
    pub fn plugin_dirs<I, P>(self, dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        dirs.into_iter().fold(self, |roots, dir| roots.root(dir, ""))
    }

    /// Derives the stable id for a plugin loaded from `path`.
    pub fn derive(&self, path: impl AsRef<Path>) -> String {
        let path = normalize(path.as_ref());
        let (prefix, rest) = self
            .roots
            .iter()
            .find_map(|(root, prefix)| {
                path.strip_prefix(root)
                    .ok()
                    .filter(|rest| rest.components().next().is_some())
                    .map(|rest| (prefix.as_str(), rest.to_path_buf()))
            })
            .unwrap_or(("", path.clone()));

        let mut parts: Vec<String> = rest
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if let Some(last) = parts.pop() {
            let file = Path::new(&last);
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| last.clone());
            if file.extension().is_some() && ENTRY_STEMS.contains(&stem.as_str()) && !parts.is_empty() {
                if parts.len() > 1 && parts.last().is_some_and(|d| SOURCE_DIRS.contains(&d.as_str())) {
                    parts.pop();
                }
            } else {
                parts.push(stem);
            }
        }

        format!("{prefix}{}", parts.join("/"))
    }
}

/// Lexically resolves `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
