//! Per-invocation temporary directories.
//!
//! Every backup, update and oversized report gets its own directory under the
//! configured temp root, so overlapping commands never share paths. The
//! directory is removed when the [`RunWorkspace`] is dropped, on success and on
//! every error path alike.

use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::{utils::file_timestamp_utc, Result};

static RUN_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Unique identifier of one command invocation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn generate() -> Self {
        let n = RUN_COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!(
            "{}-{}-{n}",
            file_timestamp_utc(),
            std::process::id()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A scoped temporary directory owned by one invocation.
#[derive(Debug)]
pub struct RunWorkspace {
    run_id: RunId,
    dir: PathBuf,
}

impl RunWorkspace {
    /// Create `<root>/<prefix>-<run_id>/`.
    pub fn create(root: &Path, prefix: &str) -> Result<Self> {
        let run_id = RunId::generate();
        let dir = root.join(format!("{prefix}-{run_id}"));
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "created run workspace");
        Ok(Self { run_id, dir })
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.dir.join(rel)
    }

    /// Create (if needed) and return a subdirectory.
    pub fn subdir(&self, name: &str) -> Result<PathBuf> {
        let p = self.dir.join(name);
        fs::create_dir_all(&p)?;
        Ok(p)
    }
}

impl Drop for RunWorkspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => tracing::debug!(dir = %self.dir.display(), "removed run workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                dir = %self.dir.display(),
                error = %e,
                "failed to remove run workspace"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::tmp_dir;

    #[test]
    fn run_ids_are_unique() {
        let a = RunId::generate();
        let b = RunId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn workspace_is_removed_on_drop() {
        let root = tmp_dir("n8nbot-ws");
        let ws = RunWorkspace::create(&root, "backup").unwrap();
        let dir = ws.path().to_path_buf();
        fs::write(ws.join("file.txt"), "x").unwrap();
        ws.subdir("nested/deeper").unwrap();
        assert!(dir.exists());

        drop(ws);
        assert!(!dir.exists());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn concurrent_workspaces_never_share_a_path() {
        let root = tmp_dir("n8nbot-ws-par");
        let a = RunWorkspace::create(&root, "backup").unwrap();
        let b = RunWorkspace::create(&root, "backup").unwrap();
        assert_ne!(a.path(), b.path());
        drop(a);
        assert!(b.path().exists());
        drop(b);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn workspace_is_removed_when_an_error_unwinds_the_scope() {
        let root = tmp_dir("n8nbot-ws-err");
        let mut seen: Option<PathBuf> = None;
        let res: Result<()> = (|| {
            let ws = RunWorkspace::create(&root, "update")?;
            seen = Some(ws.path().to_path_buf());
            fs::write(ws.join("partial.tar.gz"), "x")?;
            Err(crate::Error::External("step failed".to_string()))
        })();
        assert!(res.is_err());
        assert!(!seen.unwrap().exists());
        let _ = fs::remove_dir_all(&root);
    }
}
