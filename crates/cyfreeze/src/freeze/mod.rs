//! Freeze engine: source patches that let compiled units run without a
//! filesystem-backed loader
//!
//! - [`package`] gives a unit a literal package identity and, for a package
//!   `__init__`, a finder resolving its siblings inside the same library.
//! - [`executable`] appends the inittab and bootstrap that register every
//!   linked unit with the runtime.

pub mod executable;
pub mod package;

pub use executable::{
    DEFAULT_RUNTIME_DIR, ExecutableRegistration, RegisteredModule, append_registration,
};
pub use package::{PackageIdentity, freeze_identity};
