//! Executable registration
//!
//! The main unit of an executable gets a bootstrap appended: init entry
//! point declarations for every linked unit, a static inittab so the runtime
//! finds them as builtins, the runtime initialisation variant and a `main`.

use std::path::Path;

use anyhow::Result;

use crate::{error::BuildError, packer::BUNDLE_ARCHIVE_NAME};

const BOOTSTRAP_TEMPLATE: &str = include_str!("templates/executable_bootstrap.cpp");

/// First line of the bootstrap, used to detect a second append
const REGISTRATION_MARKER: &str = "/* cyfreeze: executable registration */";

const DECLS_SLOT: &str = "/* @cyfreeze:modinit-decls */";
const TABLE_SLOT: &str = "/* @cyfreeze:modinit-table */";
const INIT_SLOT: &str = "/* @cyfreeze:runtime-init */";
const RUNTIME_DIR_SLOT: &str = "@CYFREEZE_RUNTIME_DIR@";
const ARCHIVE_SLOT: &str = "@CYFREEZE_ARCHIVE@";
const MAIN_SYMBOL_SLOT: &str = "@CYFREEZE_MAIN_SYMBOL@";
const MAIN_NAME_SLOT: &str = "@CYFREEZE_MAIN_NAME@";

/// Runtime support directory used when none is configured
pub const DEFAULT_RUNTIME_DIR: &str = "bin";

/// A unit registered in the executable's inittab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredModule {
    /// Import name, e.g. `utils.utillib`
    pub name: String,
    /// Name the unit was transpiled under; its init symbol is `PyInit_<symbol>`
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct ExecutableRegistration<'a> {
    pub main: RegisteredModule,
    pub modules: &'a [RegisteredModule],
    /// Bundled runtime instead of the system-installed one
    pub standalone: bool,
    pub runtime_dir: Option<&'a str>,
}

impl ExecutableRegistration<'_> {
    fn registered(&self) -> impl Iterator<Item = &RegisteredModule> {
        std::iter::once(&self.main).chain(self.modules)
    }

    /// `PyMODINIT_FUNC` forward declarations, main unit first
    pub fn declarations(&self) -> String {
        self.registered()
            .map(|module| format!("PyMODINIT_FUNC CYFREEZE_MODINIT({}) (void);\n", module.symbol))
            .collect()
    }

    /// Rows of the name to init function table
    pub fn table(&self) -> String {
        self.registered()
            .map(|module| {
                format!(
                    "    {{\"{}\", CYFREEZE_MODINIT({})}},\n",
                    module.name, module.symbol
                )
            })
            .collect()
    }

    /// The bootstrap source with every slot filled
    pub fn render(&self) -> String {
        let init_call = if self.standalone {
            "InitPythonStandalone(argc, argv);"
        } else {
            "InitPythonGlobal(argc, argv);"
        };

        BOOTSTRAP_TEMPLATE
            .replace(DECLS_SLOT, &self.declarations())
            .replace(TABLE_SLOT, &self.table())
            .replace(INIT_SLOT, init_call)
            .replace(
                RUNTIME_DIR_SLOT,
                self.runtime_dir.unwrap_or(DEFAULT_RUNTIME_DIR),
            )
            .replace(ARCHIVE_SLOT, BUNDLE_ARCHIVE_NAME)
            .replace(MAIN_SYMBOL_SLOT, &self.main.symbol)
            .replace(MAIN_NAME_SLOT, &self.main.name)
    }
}

/// Append the bootstrap to generated `code`
///
/// A second append would define `main` twice, so it is rejected.
pub fn append_registration(
    code: &str,
    registration: &ExecutableRegistration<'_>,
    file: &Path,
) -> Result<String> {
    if code.contains(REGISTRATION_MARKER) {
        return Err(BuildError::AlreadyExecutableFrozen {
            path: file.to_path_buf(),
        }
        .into());
    }
    Ok(format!("{code}\n\n\n{}", registration.render()))
}
