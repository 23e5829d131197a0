//! Stand-ins for the external transpiler and toolchain used by unit tests

use std::{
    cell::RefCell,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use anyhow::Result;

use crate::{
    freeze::tests::generated_source,
    toolchain::{CompileOptions, LinkOptions, Toolchain, is_header, object_path},
    transpiler::{CYTHON_CONTRACT, GeneratedSourceContract, TranspileRequest, Transpiler},
};

/// Writes a fixed generated source and records the module names it was asked for
#[derive(Debug, Default)]
pub(crate) struct FixtureTranspiler {
    pub(crate) calls: RefCell<Vec<String>>,
}

impl Transpiler for FixtureTranspiler {
    fn transpile(&self, request: &TranspileRequest<'_>) -> Result<()> {
        self.calls.borrow_mut().push(request.module_name.to_owned());
        fs::write(request.output, generated_source())?;
        Ok(())
    }

    fn contract(&self) -> &GeneratedSourceContract {
        &CYTHON_CONTRACT
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ToolchainCall {
    Compile(Vec<PathBuf>),
    LinkShared {
        output: PathBuf,
        export_symbols: Vec<String>,
    },
    LinkExecutable {
        output: PathBuf,
    },
}

/// Records every call and touches the files the real toolchain would write
///
/// Clones share one call log, so a test can keep a handle after boxing it.
#[derive(Debug, Default, Clone)]
pub(crate) struct RecordingToolchain {
    pub(crate) calls: Rc<RefCell<Vec<ToolchainCall>>>,
}

impl RecordingToolchain {
    pub(crate) fn calls(&self) -> Vec<ToolchainCall> {
        self.calls.borrow().clone()
    }
}

fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, "")?;
    Ok(())
}

impl Toolchain for RecordingToolchain {
    fn compile(&mut self, sources: &[PathBuf], options: &CompileOptions) -> Result<Vec<PathBuf>> {
        self.calls.borrow_mut().push(ToolchainCall::Compile(sources.to_vec()));
        let objects: Vec<PathBuf> = sources
            .iter()
            .filter(|source| !is_header(source))
            .map(|source| object_path(source, &options.output_dir))
            .collect();
        for object in &objects {
            touch(object)?;
        }
        Ok(objects)
    }

    fn link_shared(
        &mut self,
        _objects: &[PathBuf],
        output: &Path,
        options: &LinkOptions,
    ) -> Result<()> {
        self.calls.borrow_mut().push(ToolchainCall::LinkShared {
            output: output.to_path_buf(),
            export_symbols: options.export_symbols.clone(),
        });
        touch(output)
    }

    fn link_executable(
        &mut self,
        _objects: &[PathBuf],
        output: &Path,
        _options: &LinkOptions,
    ) -> Result<()> {
        self.calls.borrow_mut().push(ToolchainCall::LinkExecutable {
            output: output.to_path_buf(),
        });
        touch(output)
    }
}
