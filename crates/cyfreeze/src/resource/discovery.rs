//! Wildcard expansion of resource paths
//!
//! Only the last path component may contain wildcards: `*` as the whole
//! file stem matches any name, `.*` as the extension matches any extension.
//! Expansion is non-recursive and yields files only.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::trace;

use super::extension_of;

const ANY: &str = "*";

/// Expand `pattern` against `home`, returning paths relative to `home`
///
/// A pattern without wildcards is returned unchanged, whether or not it
/// exists. Matches are sorted for deterministic build order.
pub fn discover(pattern: &Path, home: Option<&Path>) -> Result<Vec<PathBuf>> {
    let pattern = normalize_separators(pattern);
    let stem = pattern
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = extension_of(&pattern);

    let any_name = stem == ANY;
    let any_ext = ext == ".*";
    if !any_name && !any_ext {
        return Ok(vec![pattern]);
    }

    let dir = pattern.parent().unwrap_or(Path::new("")).to_path_buf();
    let search_dir = match home {
        Some(home) => home.join(&dir),
        None => dir.clone(),
    };
    let search_dir = if search_dir.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        search_dir
    };

    let mut matches = Vec::new();
    let entries = fs::read_dir(&search_dir)
        .with_context(|| format!("Failed to list {}", search_dir.display()))?;

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let file_name = PathBuf::from(entry.file_name());
        let file_stem = file_name
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !any_name && file_stem != stem {
            continue;
        }
        if !any_ext && extension_of(&file_name) != ext {
            continue;
        }

        trace!("Pattern {} matched {}", pattern.display(), file_name.display());
        matches.push(dir.join(file_name));
    }

    matches.sort();
    Ok(matches)
}

/// Treat `\` as a separator on every platform
fn normalize_separators(path: &Path) -> PathBuf {
    if cfg!(windows) {
        return path.to_path_buf();
    }
    PathBuf::from(path.to_string_lossy().replace('\\', "/"))
}
