//! Per-fixture scratch space.
//!
//! ```text
//! $TMPDIR/es-fixture-<name>-XXXXXX/
//! ├── elasticsearch.<port>.pid
//! ├── logs/                  path.logs, plus console.log
//! └── workdir_<port>/        path.data
//! ```

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{FixtureError, FixtureResult};

#[derive(Debug)]
pub struct ScratchDirs {
    /// `None` after cleanup.
    root: Option<TempDir>,
    root_path: PathBuf,
    logs_path: PathBuf,
    works_path: PathBuf,
    pidfile: PathBuf,
}

impl ScratchDirs {
    /// Create the layout under the system temp directory.
    pub fn create(name: &str, port: u16) -> FixtureResult<Self> {
        Self::create_in(&std::env::temp_dir(), name, port)
    }

    pub fn create_in(base: &Path, name: &str, port: u16) -> FixtureResult<Self> {
        let prefix = format!("es-fixture-{}-", sanitize_filename::sanitize(name));
        let root = tempfile::Builder::new()
            .prefix(&prefix)
            .tempdir_in(base)
            .map_err(|e| FixtureError::file_system("create scratch directory", base, e))?;
        let root_path = root.path().to_path_buf();
        let logs_path = root_path.join("logs");
        let works_path = root_path.join(format!("workdir_{port}"));
        let pidfile = root_path.join(format!("elasticsearch.{port}.pid"));

        for dir in [&logs_path, &works_path] {
            std::fs::create_dir_all(dir)
                .map_err(|e| FixtureError::file_system("create scratch directory", dir, e))?;
        }
        crate::debug!("Scratch directory for `{name}`: {}", root_path.display());

        Ok(Self {
            root: Some(root),
            root_path,
            logs_path,
            works_path,
            pidfile,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root_path
    }

    pub fn logs_path(&self) -> &Path {
        &self.logs_path
    }

    pub fn works_path(&self) -> &Path {
        &self.works_path
    }

    pub fn pidfile(&self) -> &Path {
        &self.pidfile
    }

    /// Remove the data and log directories, then the root. Directories that
    /// are already gone are fine. Idempotent.
    pub fn cleanup(&mut self) -> FixtureResult<()> {
        let Some(root) = self.root.take() else {
            return Ok(());
        };
        for dir in [&self.works_path, &self.logs_path] {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => (),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
                Err(e) => return Err(FixtureError::file_system("remove scratch directory", dir, e)),
            }
        }
        root.close()
            .map_err(|e| FixtureError::file_system("remove scratch directory", &self.root_path, e))
    }

    /// Give up ownership: the directories stay on disk and [`cleanup`] becomes
    /// a no-op. Returns the root, unless it was already cleaned up.
    ///
    /// [`cleanup`]: Self::cleanup
    pub fn keep(&mut self) -> Option<PathBuf> {
        self.root.take().map(TempDir::keep)
    }
}

impl Drop for ScratchDirs {
    fn drop(&mut self) {
        if let Err(e) = self.cleanup() {
            crate::warn!("{e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_and_cleanup() {
        let base = tempfile::tempdir().unwrap();
        let mut dirs = ScratchDirs::create_in(base.path(), "elasticsearch_proc", 9201).unwrap();

        let root_name = dirs.root().file_name().unwrap().to_string_lossy().into_owned();
        assert!(root_name.starts_with("es-fixture-elasticsearch_proc-"), "{root_name}");
        assert_eq!(dirs.logs_path(), dirs.root().join("logs"));
        assert_eq!(dirs.works_path(), dirs.root().join("workdir_9201"));
        assert_eq!(dirs.pidfile(), dirs.root().join("elasticsearch.9201.pid"));
        assert!(dirs.logs_path().is_dir());
        assert!(dirs.works_path().is_dir());
        assert!(!dirs.pidfile().exists());

        std::fs::write(dirs.works_path().join("segment"), b"data").unwrap();
        let root = dirs.root().to_path_buf();
        dirs.cleanup().unwrap();
        assert!(!root.exists());
        dirs.cleanup().unwrap();
    }

    #[test]
    fn cleanup_tolerates_missing_subdirectories() {
        let base = tempfile::tempdir().unwrap();
        let mut dirs = ScratchDirs::create_in(base.path(), "gone", 9300).unwrap();
        std::fs::remove_dir_all(dirs.logs_path()).unwrap();
        std::fs::remove_dir_all(dirs.works_path()).unwrap();
        dirs.cleanup().unwrap();
    }

    #[test]
    fn kept_directories_survive_cleanup_and_drop() {
        let base = tempfile::tempdir().unwrap();
        let mut dirs = ScratchDirs::create_in(base.path(), "kept", 9400).unwrap();
        let root = dirs.keep().unwrap();
        assert_eq!(root, dirs.root());
        dirs.cleanup().unwrap();
        drop(dirs);
        assert!(root.join("workdir_9400").is_dir());
        assert!(root.join("logs").is_dir());
    }

    #[test]
    fn names_are_sanitized() {
        let base = tempfile::tempdir().unwrap();
        let dirs = ScratchDirs::create_in(base.path(), "a/b:c", 1).unwrap();
        assert_eq!(dirs.root().parent().unwrap(), base.path());
        let root = dirs.root().to_path_buf();
        drop(dirs);
        assert!(!root.exists());
    }
}
