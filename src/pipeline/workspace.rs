use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Result, TrainError};

/// Temporary directory tree of one training attempt.
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Open the attempt root, wiping whatever a previous attempt left there when
    /// `wipe` is set.
    pub fn open(root: &Path, wipe: bool) -> Result<Self> {
        if wipe {
            remove_dir_if_exists(root)
                .map_err(|e| TrainError::storage("wipe workspace", root, e))?;
        }
        fs::create_dir_all(root).map_err(|e| TrainError::storage("create workspace", root, e))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a file directly under the attempt root.
    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(sanitize_name(name))
    }

    /// A subdirectory of the attempt root, created if needed; `recreate` empties it first.
    pub fn subdir(&self, name: &str, recreate: bool) -> Result<PathBuf> {
        let path = self.root.join(sanitize_name(name));
        if recreate {
            remove_dir_if_exists(&path)
                .map_err(|e| TrainError::storage("clear workspace dir", &path, e))?;
        }
        fs::create_dir_all(&path)
            .map_err(|e| TrainError::storage("create workspace dir", &path, e))?;
        Ok(path)
    }

    /// Delete one subdirectory, or the whole attempt when `scope` is `None`.
    pub fn teardown(&self, scope: Option<&str>) -> Result<()> {
        let path = match scope {
            Some(name) => self.root.join(sanitize_name(name)),
            None => self.root.clone(),
        };
        remove_dir_if_exists(&path).map_err(|e| TrainError::storage("delete workspace", &path, e))
    }
}

fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    if out.is_empty() || out == "." || out == ".." {
        out = "_".to_string();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_wipes_unless_resuming() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("training");
        fs::create_dir_all(root.join("lm")).expect("mkdir");
        fs::write(root.join("checkpoint.json"), "[]").expect("write");

        Workspace::open(&root, false).expect("open");
        assert!(root.join("checkpoint.json").exists());

        Workspace::open(&root, true).expect("open");
        assert!(root.is_dir());
        assert!(!root.join("checkpoint.json").exists());
        assert!(!root.join("lm").exists());
    }

    #[test]
    fn subdir_recreate_drops_old_contents() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::open(tmp.path(), false).expect("open");

        let dir = ws.subdir("aligner", false).expect("subdir");
        fs::write(dir.join("model.bin"), "x").expect("write");

        let same = ws.subdir("aligner", false).expect("subdir");
        assert!(same.join("model.bin").exists());

        let fresh = ws.subdir("aligner", true).expect("subdir");
        assert!(fresh.is_dir());
        assert!(!fresh.join("model.bin").exists());
    }

    #[test]
    fn teardown_is_idempotent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path().join("training");
        let ws = Workspace::open(&root, false).expect("open");
        ws.subdir("tm", false).expect("subdir");

        ws.teardown(Some("tm")).expect("teardown tm");
        ws.teardown(Some("tm")).expect("teardown tm again");
        assert!(root.is_dir());

        ws.teardown(None).expect("teardown");
        ws.teardown(None).expect("teardown again");
        assert!(!root.exists());
    }

    #[test]
    fn names_cannot_escape_the_root() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let ws = Workspace::open(tmp.path(), false).expect("open");
        let dir = ws.subdir("../outside", false).expect("subdir");
        assert!(dir.starts_with(tmp.path()));
        assert_eq!(dir.file_name().and_then(|s| s.to_str()), Some(".._outside"));
    }
}
