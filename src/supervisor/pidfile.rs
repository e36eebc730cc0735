//! PID file handling
//!
//! A PID file is claimed before the daemon is spawned, so two concurrent
//! starts cannot both win:
//!
//! ```text
//!   claim ──► file holds supervisor PID ──► commit(daemon PID)
//!     │                                         │
//!     └── dropped without commit: file removed  └── file holds daemon PID
//! ```
//!
//! Both the claim and the commit write a temporary file first. The claim
//! hard-links it into place, which fails atomically if the path exists. The
//! commit renames it over the claim. Readers never see a partial file.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::process;

#[derive(Debug, thiserror::Error)]
pub enum PidFileError {
    #[error("PID file {path} is held by running process {pid}")]
    Held { path: PathBuf, pid: u32 },

    #[error("PID file {path} has invalid contents: {content:?}")]
    Invalid { path: PathBuf, content: String },

    #[error("I/O error on PID file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the recorded PID. `Ok(None)` if the file does not exist.
    pub fn read(&self) -> Result<Option<u32>, PidFileError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        match content.trim().parse::<u32>() {
            Ok(pid) if pid > 0 => Ok(Some(pid)),
            _ => Err(PidFileError::Invalid {
                path: self.path.clone(),
                content,
            }),
        }
    }

    /// Remove the file; a missing file is not an error
    pub fn remove(&self) -> Result<(), PidFileError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }

    /// Atomically claim the PID file for a new instance of `program`.
    ///
    /// An existing file naming a live daemon or supervisor yields `Held`. A
    /// file naming a dead or unrelated process, or holding garbage, is stale:
    /// it is removed and the claim retried once.
    pub fn claim(&self, program: &OsStr) -> Result<PidClaim<'_>, PidFileError> {
        let own_pid = std::process::id();

        for attempt in 0..2 {
            match self.place(own_pid) {
                Ok(()) => {
                    return Ok(PidClaim {
                        pid_file: self,
                        committed: false,
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(self.io_error(e)),
            }

            match self.read() {
                Ok(Some(pid)) if process::is_alive(pid) => {
                    if !process::is_unrelated(pid, program) {
                        return Err(PidFileError::Held {
                            path: self.path.clone(),
                            pid,
                        });
                    }
                    log::warn!(
                        "Removing stale PID file {} (PID {} is an unrelated process)",
                        self.path.display(),
                        pid
                    );
                }
                Ok(Some(pid)) => {
                    log::warn!(
                        "Removing stale PID file {} (PID {} is not running)",
                        self.path.display(),
                        pid
                    );
                }
                Ok(None) => continue,
                Err(PidFileError::Invalid { content, .. }) => {
                    log::warn!(
                        "Removing stale PID file {} (contents {:?})",
                        self.path.display(),
                        content.trim()
                    );
                }
                Err(e) => return Err(e),
            }

            if attempt == 0 {
                self.remove()?;
            }
        }

        // Someone else re-created the file between our removal and retry
        match self.read()? {
            Some(pid) => Err(PidFileError::Held {
                path: self.path.clone(),
                pid,
            }),
            None => Err(self.io_error(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "PID file contended",
            ))),
        }
    }

    /// Write `pid` to a temp file and hard-link it to the PID file path
    fn place(&self, pid: u32) -> std::io::Result<()> {
        let tmp = self.write_temp(pid)?;
        let result = std::fs::hard_link(&tmp, &self.path);
        let _ = std::fs::remove_file(&tmp);
        result
    }

    /// Replace the PID file contents atomically
    fn replace(&self, pid: u32) -> std::io::Result<()> {
        let tmp = self.write_temp(pid)?;
        std::fs::rename(&tmp, &self.path).inspect_err(|_| {
            let _ = std::fs::remove_file(&tmp);
        })
    }

    fn write_temp(&self, pid: u32) -> std::io::Result<PathBuf> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pid".to_string());
        let tmp = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));
        if let Some(parent) = tmp.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        writeln!(file, "{}", pid)?;
        file.sync_all()?;
        Ok(tmp)
    }

    fn io_error(&self, source: std::io::Error) -> PidFileError {
        PidFileError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// An exclusive claim on a PID file; released on drop unless committed
#[derive(Debug)]
pub struct PidClaim<'a> {
    pid_file: &'a PidFile,
    committed: bool,
}

impl PidClaim<'_> {
    /// Record the daemon's PID, keeping the file after the claim is dropped
    pub fn commit(mut self, pid: u32) -> Result<(), PidFileError> {
        self.pid_file
            .replace(pid)
            .map_err(|e| self.pid_file.io_error(e))?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PidClaim<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.pid_file.remove() {
                log::warn!("Failed to release PID file: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PROGRAM: &str = "/opt/pjc-mc/bin/pjc-mc.py";

    fn pid_file(dir: &TempDir) -> PidFile {
        PidFile::new(dir.path().join("test.pid"))
    }

    fn try_claim(pf: &PidFile) -> Result<PidClaim<'_>, PidFileError> {
        pf.claim(OsStr::new(PROGRAM))
    }

    /// A PID that is almost certainly not in use
    fn dead_pid() -> u32 {
        let mut child = std::process::Command::new("/bin/true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        pid
    }

    #[test]
    fn test_read_missing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(pid_file(&dir).read().unwrap(), None);
    }

    #[test]
    fn test_read_invalid() {
        let dir = TempDir::new().unwrap();
        let pf = pid_file(&dir);
        std::fs::write(pf.path(), "not-a-pid\n").unwrap();
        assert!(matches!(pf.read(), Err(PidFileError::Invalid { .. })));
    }

    #[test]
    fn test_claim_then_commit() {
        let dir = TempDir::new().unwrap();
        let pf = pid_file(&dir);

        let claim = try_claim(&pf).unwrap();
        assert_eq!(pf.read().unwrap(), Some(std::process::id()));

        claim.commit(4242).unwrap();
        assert_eq!(pf.read().unwrap(), Some(4242));
        assert_eq!(std::fs::read_to_string(pf.path()).unwrap(), "4242\n");
    }

    #[test]
    fn test_claim_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let pf = pid_file(&dir);

        {
            let _claim = try_claim(&pf).unwrap();
            assert!(pf.exists());
        }
        assert!(!pf.exists());
    }

    #[test]
    fn test_claim_held_by_live_process() {
        let dir = TempDir::new().unwrap();
        let pf = pid_file(&dir);
        let _claim = try_claim(&pf).unwrap();

        // Our own PID is in the file and we are alive
        match try_claim(&pf) {
            Err(PidFileError::Held { pid, .. }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected Held, got {:?}", other),
        };
    }

    #[test]
    fn test_claim_replaces_stale_pid() {
        let dir = TempDir::new().unwrap();
        let pf = pid_file(&dir);
        std::fs::write(pf.path(), format!("{}\n", dead_pid())).unwrap();

        let claim = try_claim(&pf).unwrap();
        claim.commit(777).unwrap();
        assert_eq!(pf.read().unwrap(), Some(777));
    }

    #[test]
    fn test_claim_replaces_recycled_pid() {
        let dir = TempDir::new().unwrap();
        let pf = pid_file(&dir);
        let mut other = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        std::fs::write(pf.path(), format!("{}\n", other.id())).unwrap();

        try_claim(&pf).unwrap().commit(888).unwrap();
        assert_eq!(pf.read().unwrap(), Some(888));

        // The unrelated process is left alone
        assert!(process::is_alive(other.id()));
        other.kill().unwrap();
        other.wait().unwrap();
    }

    #[test]
    fn test_claim_replaces_garbage() {
        let dir = TempDir::new().unwrap();
        let pf = pid_file(&dir);
        std::fs::write(pf.path(), "").unwrap();

        assert!(try_claim(&pf).is_ok());
    }

    #[test]
    fn test_remove_missing_is_ok() {
        let dir = TempDir::new().unwrap();
        assert!(pid_file(&dir).remove().is_ok());
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let pf = pid_file(&dir);
        try_claim(&pf).unwrap().commit(99).unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["test.pid".to_string()]);
    }
}
