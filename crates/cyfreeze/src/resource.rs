//! Resources: input files and the qualified names derived from their paths

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::BuildError;

pub mod discovery;

/// Segment dropped from `name` but kept in `full_name`
pub const INIT_SEGMENT: &str = "__init__";

/// Extensions of script sources handed to the transpiler
pub const SCRIPT_EXTENSIONS: &[&str] = &[".py"];
/// Extensions of pre-native intermediate sources, also transpiled
pub const INTERMEDIATE_EXTENSIONS: &[&str] = &[".pyx", ".pxd"];
/// Extensions of sources passed straight to the toolchain
pub const NATIVE_EXTENSIONS: &[&str] = &[".c", ".h", ".cpp", ".hpp"];
/// Extensions of platform resource descriptors
pub const DESCRIPTOR_EXTENSIONS: &[&str] = &[".rc"];

/// Typed resource kinds, chosen by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Script,
    Intermediate,
    Native,
    Descriptor,
}

impl ResourceKind {
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Script => SCRIPT_EXTENSIONS,
            ResourceKind::Intermediate => INTERMEDIATE_EXTENSIONS,
            ResourceKind::Native => NATIVE_EXTENSIONS,
            ResourceKind::Descriptor => DESCRIPTOR_EXTENSIONS,
        }
    }

    /// The kind accepting this path's extension, if any
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = extension_of(path);
        [
            ResourceKind::Script,
            ResourceKind::Intermediate,
            ResourceKind::Native,
            ResourceKind::Descriptor,
        ]
        .into_iter()
        .find(|kind| kind.extensions().contains(&ext.as_str()))
    }
}

/// Extension including the leading dot, or an empty string
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Dotted qualified name of a source path
///
/// Both `/` and `\` separate segments so build scripts written for either
/// platform resolve the same names. Empty and `.` segments are skipped, so
/// the result never has empty segments or stray dots.
pub fn extension_name(path: &Path, strip_init: bool) -> String {
    let text = path.with_extension("").to_string_lossy().into_owned();
    text.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .filter(|segment| !(strip_init && *segment == INIT_SEGMENT))
        .collect::<Vec<_>>()
        .join(".")
}

/// An input file, as given and as resolved against an optional home directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Path as given, relative to `home` when one is set
    pub input: PathBuf,
    /// `input` resolved against `home`
    pub input_path: PathBuf,
}

impl Resource {
    pub fn new(input: impl Into<PathBuf>, home: Option<&Path>) -> Self {
        let input = input.into();
        let input_path = match home {
            Some(home) => home.join(&input),
            None => input.clone(),
        };
        Self {
            input,
            input_path,
        }
    }

    /// Create a resource whose extension must be one of `kind`'s
    pub fn typed(input: impl Into<PathBuf>, home: Option<&Path>, kind: ResourceKind) -> Result<Self> {
        let resource = Self::new(input, home);
        let ext = extension_of(&resource.input);
        if !kind.extensions().contains(&ext.as_str()) {
            return Err(BuildError::UnsupportedExtension {
                path: resource.input,
                ext,
            }
            .into());
        }
        Ok(resource)
    }
}

/// A resource that also carries a qualified name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedResource {
    pub resource: Resource,
    /// Qualified name without a trailing `__init__`
    pub name: String,
    /// Qualified name as spelled by the path
    pub full_name: String,
}

impl NamedResource {
    pub fn new(resource: Resource) -> Self {
        let name = extension_name(&resource.input, true);
        let full_name = extension_name(&resource.input, false);
        Self {
            resource,
            name,
            full_name,
        }
    }

    pub fn is_package_init(&self) -> bool {
        self.full_name.ends_with(INIT_SEGMENT)
    }
}
