//! Native toolchain adapter
//!
//! Compiles native sources into object files and links them into a shared
//! library (loadable as an extension module) or an executable.

use std::{
    fs,
    path::{Component, Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{error::BuildError, resource::extension_of};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub include_dirs: Vec<PathBuf>,
    /// Object files are placed under this directory
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkOptions {
    pub library_dirs: Vec<PathBuf>,
    pub libraries: Vec<String>,
    /// Symbols the linked library must export
    pub export_symbols: Vec<String>,
}

pub trait Toolchain: std::fmt::Debug {
    /// Compile `sources`, returning one object file per compiled source
    fn compile(&mut self, sources: &[PathBuf], options: &CompileOptions) -> Result<Vec<PathBuf>>;

    fn link_shared(&mut self, objects: &[PathBuf], output: &Path, options: &LinkOptions)
    -> Result<()>;

    fn link_executable(
        &mut self,
        objects: &[PathBuf],
        output: &Path,
        options: &LinkOptions,
    ) -> Result<()>;
}

/// Header files are never compiled on their own
pub fn is_header(path: &Path) -> bool {
    matches!(extension_of(path).as_str(), ".h" | ".hpp")
}

/// Object file for `source` under `output_dir`, mirroring its relative path
///
/// The source extension is kept (`x.c` -> `x.c.o`) so sources differing
/// only by extension never share an object.
pub fn object_path(source: &Path, output_dir: &Path) -> PathBuf {
    let relative: PathBuf = source
        .components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .collect();
    let mut object = output_dir.join(relative).into_os_string();
    object.push(".o");
    PathBuf::from(object)
}

/// gcc/clang compatible driver, with `windres` for resource descriptors
#[derive(Debug, Clone)]
pub struct CcToolchain {
    compiler: String,
    resource_compiler: String,
}

impl CcToolchain {
    pub fn new(compiler: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            resource_compiler: "windres".to_owned(),
        }
    }

    fn compile_command(&self, source: &Path, object: &Path, options: &CompileOptions) -> Command {
        if extension_of(source) == ".rc" {
            let mut command = Command::new(&self.resource_compiler);
            command.arg(source).args(["-O", "coff", "-o"]).arg(object);
            return command;
        }

        let mut command = Command::new(&self.compiler);
        command.args(["-c", "-O2", "-fPIC"]);
        if extension_of(source) == ".c" {
            command.args(["-x", "c"]);
        }
        for dir in &options.include_dirs {
            command.arg("-I").arg(dir);
        }
        command.arg(source).arg("-o").arg(object);
        command
    }

    fn link_command(&self, objects: &[PathBuf], output: &Path, options: &LinkOptions) -> Command {
        let mut command = Command::new(&self.compiler);
        command.args(objects).arg("-o").arg(output);
        for dir in &options.library_dirs {
            command.arg("-L").arg(dir);
        }
        for library in &options.libraries {
            command.arg(format!("-l{library}"));
        }
        // Keep init entry points even when the linker would drop them as unused
        for symbol in &options.export_symbols {
            command.arg(format!("-Wl,--undefined={symbol}"));
        }
        command
    }

    fn run(tool: &str, mut command: Command) -> Result<()> {
        debug!("Running {command:?}");
        let status = command
            .status()
            .with_context(|| format!("Failed to launch {tool}"))?;
        if !status.success() {
            return Err(BuildError::ToolFailed {
                tool: tool.to_owned(),
                status,
            }
            .into());
        }
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

impl Toolchain for CcToolchain {
    fn compile(&mut self, sources: &[PathBuf], options: &CompileOptions) -> Result<Vec<PathBuf>> {
        let mut objects = Vec::with_capacity(sources.len());
        for source in sources.iter().filter(|source| !is_header(source)) {
            let object = object_path(source, &options.output_dir);
            ensure_parent(&object)?;
            info!("Compiling {}", source.display());
            Self::run(&self.compiler, self.compile_command(source, &object, options))?;
            objects.push(object);
        }
        Ok(objects)
    }

    fn link_shared(
        &mut self,
        objects: &[PathBuf],
        output: &Path,
        options: &LinkOptions,
    ) -> Result<()> {
        ensure_parent(output)?;
        info!("Linking library {}", output.display());
        let mut command = self.link_command(objects, output, options);
        command.arg("-shared");
        Self::run(&self.compiler, command)
    }

    fn link_executable(
        &mut self,
        objects: &[PathBuf],
        output: &Path,
        options: &LinkOptions,
    ) -> Result<()> {
        ensure_parent(output)?;
        info!("Linking executable {}", output.display());
        Self::run(&self.compiler, self.link_command(objects, output, options))
    }
}
