//! Pidfile locking, grounded on `open_pidfile`/`write_pidfile` in the
//! original project's `nslcd/nslcd.c`. An exclusive, non-blocking `flock`
//! on the pidfile is both the startup "is another copy already running"
//! check and the implementation of `--check`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

/// An open, `flock`-held pidfile. Dropping it closes the file, which
/// releases the lock; this rendition relies on process exit (or explicit
/// drop) rather than an explicit unlock call, matching the original's
/// "leave it locked until the process dies" lifetime.
pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Open (creating if necessary) and exclusively lock `path`, then
    /// truncate it and write the current PID. Fails if another process
    /// already holds the lock.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .with_context(|| format!("opening pidfile {}", path.display()))?;
        lock_exclusive(&file).with_context(|| format!("locking pidfile {}", path.display()))?;

        let mut file = file;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;
        Ok(PidFile { path, file })
    }

    /// `--check`: verify no other instance holds the lock, without
    /// otherwise disturbing the file or writing a PID into it.
    pub fn check(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("opening pidfile {}", path.display()))?;
        lock_exclusive(&file).with_context(|| format!("pidfile {} is locked by another process", path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The PID currently recorded in the file (mostly useful in tests).
    #[cfg(test)]
    fn read_pid(&mut self) -> Result<u32> {
        let mut contents = String::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_string(&mut contents)?;
        Ok(contents.trim().parse()?)
    }
}

fn lock_exclusive(file: &File) -> Result<()> {
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        bail!("{err}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_writes_current_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nslcd.pid");
        let mut pidfile = PidFile::acquire(&path).unwrap();
        assert_eq!(pidfile.read_pid().unwrap(), std::process::id());
    }

    #[test]
    fn check_succeeds_against_an_unheld_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nslcd.pid");
        PidFile::check(&path).unwrap();
    }
}
