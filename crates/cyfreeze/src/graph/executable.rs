use std::{
    env::consts::EXE_SUFFIX,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};

use super::{context::BuildContext, data::Data, module::Module, package::Package};
use crate::{
    freeze::{DEFAULT_RUNTIME_DIR, RegisteredModule},
    host::HostLayout,
    packer,
    resource::discovery,
    toolchain::is_header,
    tracer::Tracer,
    unit::Unit,
};

/// Anything an executable can be assembled from
#[derive(Debug, Clone)]
pub enum ExecutableInput {
    Unit(Unit),
    Module(Module),
    Package(Package),
    Data(Data),
}

/// Flattened resource of an executable
#[derive(Debug, Clone)]
enum Part {
    Unit(Unit),
    Data(Data),
}

/// A binary linking a main unit and every other unit as builtin modules
#[derive(Debug, Clone)]
pub struct Executable {
    name: String,
    main: Unit,
    parts: Vec<Part>,
    standalone: bool,
    runtime_dir: Option<String>,
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
}

impl Executable {
    /// Modules and packages contribute their units; their own grouping is lost
    pub fn new(main: Unit, inputs: Vec<ExecutableInput>) -> Result<Self> {
        let name = match &main {
            Unit::Transpiled(unit) => unit.name().to_owned(),
            Unit::Native(unit) => unit.named().name.clone(),
            Unit::Descriptor(_) | Unit::Data(_) => {
                return Err(anyhow!(
                    "Executable entry point must be a script or native source"
                ));
            }
        };

        let mut parts = Vec::new();
        for input in inputs {
            match input {
                ExecutableInput::Unit(unit) => parts.push(Part::Unit(unit)),
                ExecutableInput::Module(module) => {
                    parts.extend(module.into_units().into_iter().map(Part::Unit));
                }
                ExecutableInput::Package(package) => {
                    parts.extend(package.into_units().into_iter().map(Part::Unit));
                }
                ExecutableInput::Data(data) => parts.push(Part::Data(data)),
            }
        }

        Ok(Self {
            name,
            main,
            parts,
            standalone: false,
            runtime_dir: None,
            include_dirs: Vec::new(),
            library_dirs: Vec::new(),
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Bundle the runtime next to the binary instead of using the installed one
    pub fn with_standalone(mut self, standalone: bool) -> Self {
        self.standalone = standalone;
        self
    }

    pub fn with_runtime_dir(mut self, runtime_dir: Option<String>) -> Self {
        self.runtime_dir = runtime_dir;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    /// Directory, relative to the output directory, holding the bundled runtime
    pub fn runtime_dir(&self) -> &str {
        self.runtime_dir.as_deref().unwrap_or(DEFAULT_RUNTIME_DIR)
    }

    /// Sources this executable writes next to its inputs, main unit first
    pub fn generated_files(&self) -> Vec<PathBuf> {
        let parts = self.parts.iter().filter_map(|part| match part {
            Part::Unit(unit) => unit.generated_file(),
            Part::Data(_) => None,
        });
        self.main
            .generated_file()
            .into_iter()
            .chain(parts)
            .map(Path::to_path_buf)
            .collect()
    }

    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}{EXE_SUFFIX}", self.name))
    }

    pub fn process(&mut self, ctx: &mut BuildContext<'_>) -> Result<()> {
        info!("Building executable {}", self.name);
        let mut sources = Vec::new();
        let mut modules: Vec<RegisteredModule> = Vec::new();

        for part in &mut self.parts {
            match part {
                Part::Unit(Unit::Transpiled(unit)) => {
                    info!("Transpile {}", unit.input_path().display());
                    unit.transpile(ctx.transpiler.as_ref(), Some(true))?;
                    unit.freeze_package(ctx.transpiler.contract())?;
                    let generated = unit.generated_path().to_path_buf();
                    ctx.record(&generated);
                    sources.push(generated);
                    modules.push(unit.registered()?);
                }
                Part::Unit(Unit::Native(unit)) => {
                    sources.push(unit.source_path().to_path_buf());
                    if !is_header(unit.source_path()) {
                        modules.push(unit.registered());
                    }
                }
                Part::Unit(Unit::Descriptor(descriptor)) => {
                    descriptor.generate()?;
                    if descriptor.is_generated() {
                        ctx.record(descriptor.source_path());
                    }
                    sources.push(descriptor.source_path().to_path_buf());
                }
                Part::Unit(Unit::Data(data)) => {
                    data.clone_into(&ctx.dirs.output)?;
                }
                Part::Data(data) => {
                    data.process(ctx)?;
                }
            }
        }

        if self.standalone {
            copy_runtime_libraries(ctx.host, &ctx.dirs.output)?;
        }

        let script = match &mut self.main {
            Unit::Transpiled(main) => {
                info!("Transpile {}", main.input_path().display());
                main.transpile(ctx.transpiler.as_ref(), None)?;
                main.freeze_executable(&modules, self.standalone, self.runtime_dir.as_deref())?;
                let generated = main.generated_path().to_path_buf();
                ctx.record(&generated);
                sources.insert(0, generated);
                Some(main.input_path().to_path_buf())
            }
            Unit::Native(main) => {
                sources.insert(0, main.source_path().to_path_buf());
                None
            }
            Unit::Descriptor(_) | Unit::Data(_) => {
                return Err(anyhow!(
                    "Executable entry point must be a script or native source"
                ));
            }
        };

        let output = self.output_path(&ctx.dirs.output);
        let compile = ctx.compile_options(&self.include_dirs);
        let link = ctx.link_options(&self.library_dirs, Vec::new());
        let objects = ctx.toolchain.compile(&sources, &compile)?;
        for object in &objects {
            ctx.record(object);
        }
        ctx.toolchain.link_executable(&objects, &output, &link)?;

        if self.standalone {
            let tracer = Tracer::new(ctx.host, ctx.trace_timeout);
            let dependencies = match &script {
                Some(script) => tracer.trace(script)?,
                None => {
                    warn!("Native entry point cannot be traced, bundling required files only");
                    tracer.dependencies_from_log("")
                }
            };
            packer::pack(
                &dependencies,
                ctx.host,
                &ctx.dirs.output.join(self.runtime_dir()),
            )?;
        }

        Ok(())
    }
}

/// Copy the host's runtime libraries flat into `output_dir`, beside the binary
pub(crate) fn copy_runtime_libraries(host: &HostLayout, output_dir: &Path) -> Result<Vec<PathBuf>> {
    debug!(
        "Copying runtime libraries matching {}",
        host.runtime_library_pattern
    );
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let pattern = Path::new(&host.runtime_library_pattern);
    let mut copied = Vec::new();
    for library in discovery::discover(pattern, Some(host.install_root.as_path()))? {
        let Some(file_name) = library.file_name() else {
            continue;
        };
        let source = host.install_root.join(&library);
        let target = output_dir.join(file_name);
        info!("Copy runtime library {}", source.display());
        fs::copy(&source, &target).with_context(|| {
            format!("Failed to copy {} to {}", source.display(), target.display())
        })?;
        copied.push(target);
    }
    Ok(copied)
}
