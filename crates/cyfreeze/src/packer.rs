//! Standalone runtime bundle packing
//!
//! Traced files are split by installation subtree. Native libraries are
//! copied loose; everything else ends up in one deflated archive whose
//! entries are relative to the subtree they came from.
//!
//! A traced file nested in a package pulls in the whole top-level package
//! folder, because imports between files of one package are not traced
//! individually.

use std::{
    collections::BTreeSet,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use indexmap::IndexSet;
use log::{debug, info, warn};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

use crate::{host::HostLayout, types::SubtreeKind};

/// File name of the archive inside the runtime support directory
pub const BUNDLE_ARCHIVE_NAME: &str = "python.zip";

/// Cache directories never make it into the archive
const CACHE_DIR: &str = "__pycache__";

/// A file or folder to archive, with the entry name it is stored under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveSource {
    pub path: PathBuf,
    pub name: String,
}

/// What [`pack`] will write, derived from the traced paths alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundlePlan {
    /// Files directly under a subtree root, archived on their own
    pub files: IndexSet<ArchiveSource>,
    /// Top-level package folders, archived recursively
    pub folders: IndexSet<ArchiveSource>,
    /// Native libraries copied next to the archive
    pub native: IndexSet<PathBuf>,
}

impl BundlePlan {
    /// Classify traced paths; duplicates collapse and the order is sorted
    pub fn new(dependencies: &[PathBuf], host: &HostLayout) -> Self {
        let mut plan = Self::default();
        let sorted: BTreeSet<&PathBuf> = dependencies.iter().collect();

        for path in sorted {
            let Some(kind) = host.classify(path) else {
                debug!("Skipping {}: outside the packed subtrees", path.display());
                continue;
            };
            if !kind.is_archived() {
                plan.native.insert(path.clone());
                continue;
            }

            let root = host.subtree_root(kind);
            let Some(mut segments) = host.segments_below(path, root) else {
                continue;
            };
            match segments.len() {
                0 => continue,
                1 => {
                    plan.files.insert(ArchiveSource {
                        path: path.clone(),
                        name: segments.swap_remove(0),
                    });
                }
                _ => {
                    let top_level = segments.swap_remove(0);
                    plan.folders.insert(ArchiveSource {
                        path: root.join(&top_level),
                        name: top_level,
                    });
                }
            }
        }

        plan
    }

    /// Source file and entry name of every archive member, in write order
    ///
    /// An entry name already taken by an earlier member keeps that member.
    pub fn members(&self) -> Result<Vec<(PathBuf, String)>> {
        let mut members = Vec::new();
        let mut names = IndexSet::new();
        let mut add = |path: PathBuf, name: String| {
            if names.insert(name.clone()) {
                members.push((path, name));
            } else {
                warn!("Skipping {}: archive entry {name} is already taken", path.display());
            }
        };

        for file in &self.files {
            add(file.path.clone(), file.name.clone());
        }

        for folder in &self.folders {
            for entry in WalkDir::new(&folder.path)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| entry.file_name() != CACHE_DIR)
            {
                let entry = entry
                    .with_context(|| format!("Failed to walk {}", folder.path.display()))?;
                if entry.file_type().is_file() {
                    let name = entry_name(entry.path(), &folder.path, &folder.name);
                    add(entry.into_path(), name);
                }
            }
        }

        Ok(members)
    }
}

/// Archive entry name: `prefix` followed by `path` relative to `folder`, `/`-separated
fn entry_name(path: &Path, folder: &Path, prefix: &str) -> String {
    let relative = path.strip_prefix(folder).unwrap_or(path);
    let mut name = prefix.to_owned();
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

/// Written bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub archive: PathBuf,
    pub native: Vec<PathBuf>,
}

/// Pack `dependencies` into `out_dir`
pub fn pack(dependencies: &[PathBuf], host: &HostLayout, out_dir: &Path) -> Result<Bundle> {
    let plan = BundlePlan::new(dependencies, host);
    info!("Bundle of {}", describe(&plan));
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let archive = out_dir.join(BUNDLE_ARCHIVE_NAME);
    write_archive(&plan.members()?, &archive)?;

    let mut native = Vec::with_capacity(plan.native.len());
    for library in &plan.native {
        let Some(file_name) = library.file_name() else {
            continue;
        };
        let target = out_dir.join(file_name);
        info!("Copy {}", library.display());
        fs::copy(library, &target).with_context(|| {
            format!("Failed to copy {} to {}", library.display(), target.display())
        })?;
        native.push(target);
    }

    Ok(Bundle { archive, native })
}

fn write_archive(members: &[(PathBuf, String)], archive: &Path) -> Result<()> {
    info!("Pack {}", archive.display());
    let file = File::create(archive)
        .with_context(|| format!("Failed to create {}", archive.display()))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (source, name) in members {
        debug!("Pack file {name}");
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Failed to add {name} to archive"))?;
        let mut input = File::open(source)
            .with_context(|| format!("Failed to open {}", source.display()))?;
        io::copy(&mut input, &mut zip)
            .with_context(|| format!("Failed to write {name} to archive"))?;
    }

    zip.finish().context("Failed to finalize archive")?;
    Ok(())
}

/// Subtree summary used in log output
pub fn describe(plan: &BundlePlan) -> String {
    format!(
        "{} file(s), {} package folder(s), {} {} librar(ies)",
        plan.files.len(),
        plan.folders.len(),
        plan.native.len(),
        SubtreeKind::NativeLibrary,
    )
}
