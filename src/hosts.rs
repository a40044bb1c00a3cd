//! Managed hostname entries in a local name resolution file.
//!
//! Only lines ending in [`MANAGED_MARKER`] are ever touched; everything else in
//! the file is preserved byte for byte.

use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use crate::error::{BentoError, Result};
use crate::fs_util::{atomic_write, resolve_target};
use crate::paths::{HostsFormat, HostsTarget};

/// Trailing tag identifying lines owned by bento.
pub const MANAGED_MARKER: &str = "# bento-cluster";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostsEntry {
    pub hostname: String,
    pub address: String,
}

impl HostsEntry {
    pub fn new(hostname: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            address: address.into(),
        }
    }

    fn render(&self, format: HostsFormat) -> String {
        match format {
            HostsFormat::Hosts => format!("{} {} {}", self.address, self.hostname, MANAGED_MARKER),
            HostsFormat::HostAliases => {
                format!("{} {} {}", self.hostname, self.address, MANAGED_MARKER)
            }
        }
    }
}

/// Hostname of a managed line, or None for lines bento does not own.
fn managed_hostname(line: &str, format: HostsFormat) -> Option<&str> {
    let body = line.trim_end().strip_suffix(MANAGED_MARKER)?;
    let mut fields = body.split_whitespace();
    let first = fields.next()?;
    let second = fields.next()?;
    match format {
        HostsFormat::Hosts => Some(second),
        HostsFormat::HostAliases => Some(first),
    }
}

/// Compute the new file content: every managed line for `entry.hostname` is
/// dropped and one fresh line appended.
pub fn render_hosts(existing: &str, entry: &HostsEntry, format: HostsFormat) -> String {
    let mut out = String::with_capacity(existing.len() + 64);
    for line in existing.lines() {
        if managed_hostname(line, format) == Some(entry.hostname.as_str()) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&entry.render(format));
    out.push('\n');
    out
}

/// How a hosts write was carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// File already held the desired content.
    Unchanged,
    /// Delegated to the privileged helper at this path.
    Delegated(PathBuf),
    /// No way to write the file; the caller should tell the user.
    Skipped,
}

/// Final step of a hosts sync: put `contents` at `path`.
pub trait HostsWriter: Send + Sync {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<WriteOutcome>;
}

/// Writes directly with temp file + rename. Needs write access to the directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct AtomicFileWriter;

impl HostsWriter for AtomicFileWriter {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<WriteOutcome> {
        atomic_write(path, contents)?;
        Ok(WriteOutcome::Written)
    }
}

/// Writes directly when permitted, otherwise hands the final content to
/// `<launcher...> <helper> <path>` on stdin. The launcher defaults to `sudo`.
#[derive(Debug, Clone)]
pub struct PrivilegedHostsWriter {
    helper: String,
    launcher: Vec<String>,
}

impl PrivilegedHostsWriter {
    pub fn new(helper: impl Into<String>) -> Self {
        Self {
            helper: helper.into(),
            launcher: vec!["sudo".to_string()],
        }
    }

    /// Command prefix used to run the helper. Empty runs the helper directly.
    pub fn with_launcher<I, S>(mut self, launcher: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launcher = launcher.into_iter().map(Into::into).collect();
        self
    }

    fn locate_helper(&self) -> Option<PathBuf> {
        let candidate = Path::new(&self.helper);
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(&self.helper))
            .find(|p| p.is_file())
    }

    fn command(&self, helper: &Path) -> Command {
        match self.launcher.split_first() {
            Some((program, args)) => {
                let mut command = Command::new(program);
                command.args(args).arg(helper);
                command
            }
            None => Command::new(helper),
        }
    }

    fn run_helper(&self, helper: &Path, path: &Path, contents: &[u8]) -> Result<()> {
        let mut child = self
            .command(helper)
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BentoError::sync_io(path, format!("Failed to run {}: {e}", helper.display()))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(contents)
                .map_err(|e| BentoError::sync_io(path, e))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| BentoError::sync_io(path, e))?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(BentoError::sync_io(
                path,
                format!(
                    "{} exited with {}: {}",
                    helper.display(),
                    output.status,
                    stderr.trim()
                ),
            ))
        }
    }

    /// Hand `contents` for `path` to the helper. `Skipped` when the helper
    /// cannot be found.
    pub fn delegate(&self, path: &Path, contents: &[u8]) -> Result<WriteOutcome> {
        let Some(helper) = self.locate_helper() else {
            log::warn!(
                "Failed to locate {} and {} is not writable",
                self.helper,
                path.display()
            );
            return Ok(WriteOutcome::Skipped);
        };

        log::debug!("Delegating write of {} to {}", path.display(), helper.display());
        self.run_helper(&helper, path, contents)?;
        Ok(WriteOutcome::Delegated(helper))
    }
}

impl HostsWriter for PrivilegedHostsWriter {
    fn write(&self, path: &Path, contents: &[u8]) -> Result<WriteOutcome> {
        let path = resolve_target(path);
        if can_replace(&path) {
            atomic_write(&path, contents)?;
            return Ok(WriteOutcome::Written);
        }
        self.delegate(&path, contents)
    }
}

/// Temp+rename needs write access to the parent directory, and an existing
/// file must itself be writable.
#[cfg(unix)]
fn can_replace(path: &Path) -> bool {
    use nix::unistd::{access, AccessFlags};

    let parent = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(p) => p,
        None => Path::new("."),
    };
    if access(parent, AccessFlags::W_OK).is_err() {
        return false;
    }
    !path.exists() || access(path, AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn can_replace(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(meta) => !meta.permissions().readonly(),
        Err(_) => true,
    }
}

/// Keeps one managed entry per hostname in a resolution file.
#[derive(Clone)]
pub struct HostsFileSynchronizer {
    writer: Arc<dyn HostsWriter>,
}

impl HostsFileSynchronizer {
    pub fn new(writer: Arc<dyn HostsWriter>) -> Self {
        Self { writer }
    }

    /// Replace the managed entry for `hostname` with `address`.
    ///
    /// A missing file is treated as empty. When the file already holds exactly
    /// the desired content nothing is written.
    pub fn sync(&self, target: &HostsTarget, hostname: &str, address: &str) -> Result<WriteOutcome> {
        let existing = match fs::read_to_string(&target.path) {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => String::new(),
            Err(e) => return Err(BentoError::sync_io(&target.path, e)),
        };

        let entry = HostsEntry::new(hostname, address);
        let updated = render_hosts(&existing, &entry, target.format);
        if updated == existing {
            log::debug!("{} already up to date for {}", target.path.display(), hostname);
            return Ok(WriteOutcome::Unchanged);
        }

        self.writer.write(&target.path, updated.as_bytes())
    }
}

impl Default for HostsFileSynchronizer {
    fn default() -> Self {
        Self::new(Arc::new(AtomicFileWriter))
    }
}
