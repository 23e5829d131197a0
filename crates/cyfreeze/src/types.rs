//! Shared type definitions for the cyfreeze crate
//!
//! This module contains small enums used by several components, kept here to
//! avoid circular dependencies between the tracer, the packer and the build graph.

/// Which part of the host installation a traced file lives in
///
/// Drives how the bundle packer treats the file: native libraries are copied
/// loose next to the archive, everything else goes into the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubtreeKind {
    /// Compiled extension modules and shared libraries (e.g. `DLLs`, `lib-dynload`)
    NativeLibrary,

    /// Packages installed via pip/conda (`site-packages`)
    ThirdParty,

    /// Pure-Python standard library
    StandardLibrary,
}

impl SubtreeKind {
    /// Whether files of this kind are packed into the archive
    pub fn is_archived(&self) -> bool {
        !matches!(self, SubtreeKind::NativeLibrary)
    }
}

impl std::fmt::Display for SubtreeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtreeKind::NativeLibrary => write!(f, "native"),
            SubtreeKind::ThirdParty => write!(f, "third-party"),
            SubtreeKind::StandardLibrary => write!(f, "stdlib"),
        }
    }
}

/// Lifecycle of a transpiled unit
///
/// `Transpiled` doubles as the "unfrozen" state: a unit built as a plain
/// module never leaves it unless it becomes an executable's main unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitState {
    #[default]
    Created,
    Transpiled,
    PackageFrozen,
    ExecutableFrozen,
}

impl UnitState {
    pub fn is_transpiled(&self) -> bool {
        !matches!(self, UnitState::Created)
    }
}
