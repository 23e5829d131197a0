//! Runtime dependency tracing
//!
//! Runs a script under the interpreter's verbose import mode for a bounded
//! window and reads back which installation files it touched. Imports done
//! after the window closes, or only under runtime conditions, are not seen.

use std::{
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use indexmap::IndexSet;
use log::{debug, info, trace};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::host::HostLayout;

/// `import <dotted.name> # <loader description>`
static IMPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^import\s+'?([\w.]+)'?\s+#\s*(.*)$").expect("import line pattern is valid")
});

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct Tracer<'a> {
    host: &'a HostLayout,
    timeout: Duration,
}

impl<'a> Tracer<'a> {
    pub fn new(host: &'a HostLayout, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    /// Files `script` needs from the installation, plus the always-required ones
    ///
    /// The result may contain duplicates; the packer deduplicates.
    pub fn trace(&self, script: &Path) -> Result<Vec<PathBuf>> {
        info!("Tracing dependencies of {}", script.display());
        let log = self.capture(script)?;
        Ok(self.dependencies_from_log(&log))
    }

    /// Verbose import log of `script`, cut off after the timeout
    ///
    /// The log goes to an unnamed temporary file rather than a pipe, so
    /// processes the script leaves behind cannot hold the read open past
    /// the deadline.
    pub fn capture(&self, script: &Path) -> Result<String> {
        let mut log = tempfile::tempfile().context("Failed to create trace log file")?;
        let stderr = log.try_clone().context("Failed to share trace log file")?;

        let mut child = Command::new(&self.host.executable)
            .arg("-v")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(stderr)
            .spawn()
            .with_context(|| format!("Failed to launch {}", self.host.executable.display()))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                debug!("Traced script exited early with {status}");
                break;
            }
            if Instant::now() >= deadline {
                debug!("Trace window of {:?} elapsed, terminating", self.timeout);
                // The process may exit between the poll and the kill
                let _ = child.kill();
                child.wait()?;
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        let mut buffer = Vec::new();
        log.seek(SeekFrom::Start(0))
            .and_then(|_| log.read_to_end(&mut buffer))
            .context("Failed to read trace log")?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Traced paths followed by the files the interpreter core always needs
    pub fn dependencies_from_log(&self, log: &str) -> Vec<PathBuf> {
        let mut paths = self.parse(log);
        paths.extend(self.host.required_files.iter().cloned());
        paths
    }

    /// Extract dependency paths from a verbose import log
    ///
    /// Lines that are not import lines are kept as context; each import line
    /// consumes the context gathered since the previous one.
    pub fn parse(&self, log: &str) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let mut context: Vec<&str> = Vec::new();

        for line in log.lines().map(|line| line.trim_end_matches('\r')) {
            let Some(captures) = IMPORT_LINE.captures(line) else {
                context.push(line);
                continue;
            };

            let mut found = IndexSet::new();
            for probe in &context {
                found.extend(self.paths_in(probe));
            }
            trace!("import {} -> {} file(s)", &captures[1], found.len());
            paths.extend(found);

            if &captures[1] == self.host.ffi_bridge_module.as_str()
                && let Some(shim) = &self.host.ffi_shim
            {
                paths.push(shim.clone());
            }

            context.clear();
        }

        paths
    }

    /// Every install-root-prefixed artifact path mentioned on one probe line
    fn paths_in(&self, line: &str) -> Vec<PathBuf> {
        let line = line.replace("\\\\", "\\");
        let root = self.host.install_root.to_string_lossy();
        if root.is_empty() {
            return Vec::new();
        }

        let starts: Vec<usize> = if self.host.case_insensitive_paths {
            // Both folds keep byte offsets, so indices map back onto `line`
            let fold = |text: &str| text.to_ascii_lowercase().replace('\\', "/");
            fold(&line)
                .match_indices(fold(&root).as_str())
                .map(|(at, _)| at)
                .collect()
        } else {
            line.match_indices(root.as_ref()).map(|(at, _)| at).collect()
        };
        let mut paths = Vec::new();
        for (index, &start) in starts.iter().enumerate() {
            let end = starts.get(index + 1).copied().unwrap_or(line.len());
            let segment = &line[start..end];
            if let Some(path) = self.artifact_in(segment, root.len())
                && !path.ends_with(self.host.bytecode_suffix.as_str())
            {
                paths.push(PathBuf::from(path));
            }
        }
        paths
    }

    /// Shortest prefix of `segment` ending in a known artifact suffix
    ///
    /// A suffix only counts when it is not followed by another name
    /// character, so `.py` never matches inside `.pyc` or `.pyenv`.
    fn artifact_in<'s>(&self, segment: &'s str, root_len: usize) -> Option<&'s str> {
        let bytes = segment.as_bytes();
        let is_boundary = |at: usize| {
            bytes
                .get(at)
                .is_none_or(|byte| !(byte.is_ascii_alphanumeric() || *byte == b'_'))
        };

        self.host
            .artifact_suffixes()
            .filter_map(|suffix| {
                segment
                    .get(root_len..)?
                    .match_indices(suffix)
                    .map(|(at, _)| root_len + at + suffix.len())
                    .find(|&end| is_boundary(end))
            })
            .min()
            .map(|end| &segment[..end])
    }
}
