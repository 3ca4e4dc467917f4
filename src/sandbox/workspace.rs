use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{DuelError, Result};

/// Run-scoped artifact directory for one submission.
///
/// Created under a per-process base directory; the uuid segment prevents
/// cross-submission collisions. Cleanup is idempotent and also runs on
/// Drop, so the directory is removed on every exit path including panics
/// and cancelled futures.
pub struct SubmissionWorkspace {
    run_id: String,
    dir: PathBuf,
    cleaned: bool,
}

impl SubmissionWorkspace {
    /// Base directory scoped by effective UID so root and non-root runs
    /// never collide on a shared temp root.
    pub fn default_base_dir() -> PathBuf {
        let euid = unsafe { libc::geteuid() };
        std::env::temp_dir().join(format!("duelbox-uid-{euid}"))
    }

    pub fn create(base_dir: &Path) -> Result<Self> {
        let run_id = Uuid::new_v4().to_string();
        let dir = base_dir.join(&run_id);
        fs::create_dir_all(&dir).map_err(|e| {
            DuelError::Sandbox(format!(
                "failed to create workspace {}: {e}",
                dir.display()
            ))
        })?;
        Ok(Self {
            run_id,
            dir,
            cleaned: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a file into the workspace and return its path.
    pub fn write_file(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.join(file_name);
        fs::write(&path, contents).map_err(|e| {
            DuelError::Sandbox(format!("failed to write {}: {e}", path.display()))
        })?;
        Ok(path)
    }

    /// Remove the workspace tree. Failures are logged and swallowed;
    /// cleanup is hygiene, not a correctness gate for the engine.
    pub fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        if self.dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                log::warn!(
                    "failed to remove submission workspace {}: {e}",
                    self.dir.display()
                );
            }
        }
    }
}

impl Drop for SubmissionWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspace_creates_and_removes_dir() {
        let base = std::env::temp_dir().join("duelbox-ws-test");
        let mut ws = SubmissionWorkspace::create(&base).unwrap();
        let file = ws.write_file("harness.py", "print('hi')").unwrap();
        assert!(file.exists());

        let dir = ws.dir().to_path_buf();
        ws.cleanup();
        assert!(!dir.exists());
        // Idempotent.
        ws.cleanup();
        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn drop_removes_workspace() {
        let base = std::env::temp_dir().join("duelbox-ws-drop-test");
        let dir = {
            let ws = SubmissionWorkspace::create(&base).unwrap();
            ws.dir().to_path_buf()
        };
        assert!(!dir.exists());
        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn run_ids_are_unique() {
        let base = std::env::temp_dir().join("duelbox-ws-id-test");
        let a = SubmissionWorkspace::create(&base).unwrap();
        let b = SubmissionWorkspace::create(&base).unwrap();
        assert_ne!(a.run_id(), b.run_id());
        let _ = fs::remove_dir_all(&base);
    }
}
