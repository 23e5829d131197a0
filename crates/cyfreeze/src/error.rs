//! Named build failures
//!
//! Every failure in a build is fatal and aborts the whole run. The variants
//! here are the ones callers may want to tell apart; they travel inside
//! `anyhow::Error` and can be recovered with `downcast_ref::<BuildError>()`.

use std::{path::PathBuf, process::ExitStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// A package was assembled from units none of which is an `__init__`
    #[error("Not found '__init__' in package \"{package}\"")]
    MissingPackageInit { package: String },

    /// Freeze or source access attempted before the unit was transpiled
    #[error("File '{}' not transpiled", path.display())]
    NotTranspiled { path: PathBuf },

    /// Package freeze on a unit that was transpiled as a plain module
    #[error("File '{}' transpiled without package identity", path.display())]
    NotPackageBuild { path: PathBuf },

    #[error("Package identity of '{}' is already frozen", path.display())]
    AlreadyPackageFrozen { path: PathBuf },

    #[error("Executable registration already appended to '{}'", path.display())]
    AlreadyExecutableFrozen { path: PathBuf },

    #[error("Not supported extension \"{ext}\" for '{}'", path.display())]
    UnsupportedExtension { path: PathBuf, ext: String },

    #[error("Data file '{}' does not exist", path.display())]
    DataSourceMissing { path: PathBuf },

    /// The generated source no longer matches the shape freeze expects
    #[error("Generated source '{}' is missing marker `{marker}`", path.display())]
    TemplateDrift { path: PathBuf, marker: String },

    #[error("Module has no units to build")]
    EmptyModule,

    #[error("{tool} failed with {status}")]
    ToolFailed { tool: String, status: ExitStatus },
}
