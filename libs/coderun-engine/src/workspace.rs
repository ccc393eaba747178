/// Workspace Manager - run-scoped scratch directories
///
/// Every execution gets its own directory under the scratch root, named from
/// a random UUID so concurrent executions can never collide. The directory
/// holds the source file, the optional stdin file and, after the run, the
/// capture files written by the sandbox.
///
/// Release is idempotent and also happens on `Drop`, so the directory is gone
/// on every exit path: normal return, error return, timeout, panic, or the
/// execution future being dropped mid-run.

use crate::error::{ExecError, Result};
use coderun_common::{naming, LanguageProfile};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub const STDIN_FILE: &str = "stdin.txt";
pub const STDOUT_FILE: &str = "stdout.txt";
pub const STDERR_FILE: &str = "stderr.txt";
pub const COMPILE_STDERR_FILE: &str = "compile_stderr.txt";

/// Bytes read back from a capture file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    pub bytes: Vec<u8>,
    /// The file was longer than the read limit
    pub truncated: bool,
}

#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    released: bool,
}

// The sandbox user is not necessarily the host user, so the workspace has to
// be writable by anyone.
#[cfg(unix)]
fn open_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o777))
}

#[cfg(not(unix))]
fn open_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn not_regular_file() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "capture is not a regular file")
}

// O_NOFOLLOW refuses a symlink at the final component; O_NONBLOCK keeps a
// FIFO from parking the open until a writer shows up.
#[cfg(unix)]
fn open_capture(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_capture(path: &Path) -> io::Result<fs::File> {
    fs::File::open(path)
}

/// Read at most `limit` bytes of the capture file at `path`.
///
/// The sandbox owns the workspace while it runs, so a capture may have been
/// replaced by a symlink, FIFO or device. Only regular files are read; any
/// other file type is an error. A missing file is `None`.
pub fn read_capture_file(path: &Path, limit: usize) -> Result<Option<Capture>> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_file() => {}
        Ok(_) => return Err(ExecError::workspace(path, not_regular_file())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ExecError::workspace(path, e)),
    }

    let file = match open_capture(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ExecError::workspace(path, e)),
    };

    // Re-check on the open descriptor in case the path was swapped
    let meta = file
        .metadata()
        .map_err(|e| ExecError::workspace(path, e))?;
    if !meta.is_file() {
        return Err(ExecError::workspace(path, not_regular_file()));
    }

    let mut bytes = Vec::new();
    file.take(limit as u64 + 1)
        .read_to_end(&mut bytes)
        .map_err(|e| ExecError::workspace(path, e))?;

    let truncated = bytes.len() > limit;
    bytes.truncate(limit);

    Ok(Some(Capture { bytes, truncated }))
}

impl Workspace {
    /// Create a fresh, uniquely named directory under `scratch_root`
    pub fn acquire(scratch_root: &Path) -> Result<Self> {
        fs::create_dir_all(scratch_root).map_err(|e| ExecError::workspace(scratch_root, e))?;

        let id = Uuid::new_v4();
        let dir = scratch_root.join(naming::workspace_dir_name(&id));

        // create_dir (not create_dir_all) so an existing directory is an error
        fs::create_dir(&dir).map_err(|e| ExecError::workspace(&dir, e))?;

        let mut workspace = Self {
            id,
            dir,
            released: false,
        };

        // Bind mounts need an absolute host path
        workspace.dir =
            fs::canonicalize(&workspace.dir).map_err(|e| ExecError::workspace(&workspace.dir, e))?;
        open_permissions(&workspace.dir).map_err(|e| ExecError::workspace(&workspace.dir, e))?;

        debug!(workspace = %workspace.id, path = %workspace.dir.display(), "workspace acquired");
        Ok(workspace)
    }

    pub fn id(&self) -> &Uuid {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write the submitted source under the profile's fixed file name
    pub fn write_source(&self, profile: &LanguageProfile, code: &str) -> Result<PathBuf> {
        let path = self.file(&profile.source_file_name());
        self.write(&path, code.as_bytes())?;
        Ok(path)
    }

    pub fn write_stdin(&self, data: &str) -> Result<PathBuf> {
        let path = self.file(STDIN_FILE);
        self.write(&path, data.as_bytes())?;
        Ok(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents).map_err(|e| ExecError::workspace(path, e))?;
        // World-readable so the sandbox user can read it regardless of umask
        open_permissions(path).map_err(|e| ExecError::workspace(path, e))
    }

    /// Read at most `limit` bytes of a capture file.
    /// A missing file is `None`, not an error.
    pub fn read_capture(&self, name: &str, limit: usize) -> Result<Option<Capture>> {
        read_capture_file(&self.file(name), limit)
    }

    /// Recursively remove the workspace. Safe to call more than once.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(ExecError::workspace(&self.dir, e)),
        }

        self.released = true;
        debug!(workspace = %self.id, "workspace released");
        Ok(())
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(workspace = %self.id, error = %e, "failed to remove workspace");
        }
    }
}
