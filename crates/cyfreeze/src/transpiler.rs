//! Transpiler adapter
//!
//! The transpiler turns a script into native source implementing the
//! extension-module init convention. It is a black box to the rest of the
//! crate except for the [`GeneratedSourceContract`]: the handful of text
//! markers the freeze engine patches. Checking them up front turns a
//! transpiler upgrade that changed its templates into an immediate error
//! instead of a silently broken binary.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::error::BuildError;

/// Prefix of every native module init entry point
pub const INIT_PREFIX: &str = "PyInit_";

/// Markers a generated source must contain to be package-frozen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedSourceContract {
    /// Statement deriving `__package__` from the loader spec
    pub package_marker: &'static str,
    /// Statement deriving `__path__` from the loader spec
    pub path_marker: &'static str,
    /// Comment opening the module execution section
    pub exec_section_marker: &'static str,
    /// First block terminator after the execution section marker
    pub block_end_marker: &'static str,
    /// Name of the module object variable inside the init function
    pub module_object: &'static str,
}

pub const CYTHON_CONTRACT: GeneratedSourceContract = GeneratedSourceContract {
    package_marker: r#"if (unlikely(__Pyx_copy_spec_to_module(spec, moddict, "parent", "__package__", 1) < 0)) goto bad;"#,
    path_marker: r#"if (unlikely(__Pyx_copy_spec_to_module(spec, moddict, "submodule_search_locations", "__path__", 0) < 0)) goto bad;"#,
    exec_section_marker: "/*--- Execution code ---*/",
    block_end_marker: "#endif",
    module_object: "__pyx_m",
};

impl GeneratedSourceContract {
    /// Fail with [`BuildError::TemplateDrift`] if any marker is missing
    pub fn check(&self, source: &str, path: &Path) -> Result<()> {
        for marker in [
            self.package_marker,
            self.path_marker,
            self.exec_section_marker,
        ] {
            if !source.contains(marker) {
                return Err(BuildError::TemplateDrift {
                    path: path.to_path_buf(),
                    marker: marker.to_owned(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Name a unit is transpiled under, which also fixes its init symbol
///
/// Units built as part of a package are flattened (`a.b.c` -> `a_b_c`) so
/// several of them can live in one library without clashing symbols.
pub fn module_symbol_name(qualified_name: &str, package: bool) -> String {
    if package {
        qualified_name.replace('.', "_")
    } else {
        qualified_name
            .rsplit('.')
            .next()
            .unwrap_or(qualified_name)
            .to_owned()
    }
}

pub fn init_symbol(module_symbol: &str) -> String {
    format!("{INIT_PREFIX}{module_symbol}")
}

#[derive(Debug)]
pub struct TranspileRequest<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub module_name: &'a str,
}

pub trait Transpiler: std::fmt::Debug {
    /// Write native source for `request.input` to `request.output`
    fn transpile(&self, request: &TranspileRequest<'_>) -> Result<()>;

    /// Markers the emitted source is known to carry
    fn contract(&self) -> &GeneratedSourceContract;
}

/// Runs Cython through the host interpreter (`python -m cython`)
#[derive(Debug, Clone)]
pub struct CythonTranspiler {
    python: PathBuf,
    directives: Vec<(String, String)>,
}

impl CythonTranspiler {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
            directives: vec![("always_allow_keywords".to_owned(), "True".to_owned())],
        }
    }

    fn command(&self, request: &TranspileRequest<'_>) -> Command {
        let mut command = Command::new(&self.python);
        command.args(["-m", "cython", "--cplus", "-3"]);
        for (key, value) in &self.directives {
            command.arg("-X").arg(format!("{key}={value}"));
        }
        command
            .arg("--module-name")
            .arg(request.module_name)
            .arg("-o")
            .arg(request.output)
            .arg(request.input);
        command
    }
}

impl Transpiler for CythonTranspiler {
    fn transpile(&self, request: &TranspileRequest<'_>) -> Result<()> {
        info!(
            "Transpiling {} as '{}'",
            request.input.display(),
            request.module_name
        );
        let mut command = self.command(request);
        debug!("Running {command:?}");

        let status = command
            .status()
            .with_context(|| format!("Failed to launch cython via {}", self.python.display()))?;
        if !status.success() {
            return Err(BuildError::ToolFailed {
                tool: "cython".to_owned(),
                status,
            }
            .into());
        }
        Ok(())
    }

    fn contract(&self) -> &GeneratedSourceContract {
        &CYTHON_CONTRACT
    }
}
