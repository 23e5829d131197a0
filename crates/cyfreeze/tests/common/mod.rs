//! Stand-in transpiler and toolchain shared by the integration tests
#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Result;
use cyfreeze::{
    toolchain::{CompileOptions, LinkOptions, Toolchain, is_header, object_path},
    transpiler::{CYTHON_CONTRACT, GeneratedSourceContract, TranspileRequest, Transpiler},
};

/// Smallest source carrying every marker the freeze engine patches
pub fn generated_source() -> String {
    format!(
        "static int __pyx_pymod_exec_mod(PyObject *__pyx_pyinit_module) {{
  PyObject *moddict = PyModule_GetDict(__pyx_pyinit_module);
  {package}
  {path}
  /*--- Execution code ---*/
  #if defined(__Pyx_Generator_USED)
  if (__pyx_Generator_init() < 0) __PYX_ERR(0, 1, __pyx_L1_error)
  #endif
  return 0;
}}
",
        package = CYTHON_CONTRACT.package_marker,
        path = CYTHON_CONTRACT.path_marker,
    )
}

#[derive(Debug, Default)]
pub struct FixtureTranspiler;

impl Transpiler for FixtureTranspiler {
    fn transpile(&self, request: &TranspileRequest<'_>) -> Result<()> {
        fs::write(request.output, generated_source())?;
        Ok(())
    }

    fn contract(&self) -> &GeneratedSourceContract {
        &CYTHON_CONTRACT
    }
}

/// Writes empty objects and outputs where a real compiler and linker would
#[derive(Debug, Default)]
pub struct TouchToolchain;

fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, "")?;
    Ok(())
}

impl Toolchain for TouchToolchain {
    fn compile(&mut self, sources: &[PathBuf], options: &CompileOptions) -> Result<Vec<PathBuf>> {
        let mut objects = Vec::new();
        for source in sources.iter().filter(|source| !is_header(source)) {
            let object = object_path(source, &options.output_dir);
            touch(&object)?;
            objects.push(object);
        }
        Ok(objects)
    }

    fn link_shared(
        &mut self,
        _objects: &[PathBuf],
        output: &Path,
        _options: &LinkOptions,
    ) -> Result<()> {
        touch(output)
    }

    fn link_executable(
        &mut self,
        _objects: &[PathBuf],
        output: &Path,
        _options: &LinkOptions,
    ) -> Result<()> {
        touch(output)
    }
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
