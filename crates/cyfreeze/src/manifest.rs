//! Build manifest
//!
//! A TOML file listing what to build:
//!
//! ```toml
//! clean = true
//!
//! [[module]]
//! sources = ["baselib.py"]
//!
//! [[package]]
//! sources = ["utils/*.py"]
//!
//! [[data]]
//! sources = ["config.json", "plugins/*.*"]
//!
//! [[executable]]
//! main = "main.py"
//! name = "demo"
//! sources = ["helper.py"]
//! standalone = true
//!
//! [[executable.package]]
//! sources = ["api/*.py"]
//!
//! [executable.descriptor]
//! icon_path = "main.ico"
//! file_version = [1, 2, 3]
//! ```
//!
//! Source patterns are resolved against `home`, which defaults to the
//! directory holding the manifest.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::{
    descriptor::DescriptorConfig,
    graph::{BuildNode, Data, Executable, ExecutableInput, Module, Package},
    resource,
    unit::{ResourceDescriptorUnit, Unit},
};

/// Default manifest file name
pub const MANIFEST_FILE_NAME: &str = "cyfreeze-build.toml";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Directory sources are resolved against
    #[serde(default)]
    pub home: Option<PathBuf>,
    /// Remove generated sources and objects after each node
    #[serde(default)]
    pub clean: bool,
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleSpec>,
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageSpec>,
    #[serde(default, rename = "data")]
    pub data: Vec<DataSpec>,
    #[serde(default, rename = "executable")]
    pub executables: Vec<ExecutableSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleSpec {
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub package: bool,
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub library_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    pub sources: Vec<PathBuf>,
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub library_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSpec {
    pub sources: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutableSpec {
    pub main: PathBuf,
    /// Defaults to the main unit's name
    #[serde(default)]
    pub name: Option<String>,
    /// Loose units linked in as builtin modules
    #[serde(default)]
    pub sources: Vec<PathBuf>,
    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleSpec>,
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageSpec>,
    #[serde(default, rename = "data")]
    pub data: Vec<DataSpec>,
    #[serde(default)]
    pub descriptor: Option<DescriptorConfig>,
    /// Where the descriptor is generated, `<name>.rc` by default
    #[serde(default)]
    pub descriptor_file: Option<PathBuf>,
    #[serde(default)]
    pub standalone: bool,
    #[serde(default)]
    pub runtime_dir: Option<String>,
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub library_dirs: Vec<PathBuf>,
}

impl ModuleSpec {
    fn build(&self, home: &Path) -> Result<Module> {
        let mut module = Module::from_patterns(&self.sources, Some(home), self.package)?;
        module.include_dirs.clone_from(&self.include_dirs);
        module.library_dirs.clone_from(&self.library_dirs);
        Ok(module)
    }
}

impl PackageSpec {
    fn build(&self, home: &Path) -> Result<Package> {
        let mut package = Package::from_patterns(&self.sources, Some(home))?;
        let module = package.module_mut();
        module.include_dirs.clone_from(&self.include_dirs);
        module.library_dirs.clone_from(&self.library_dirs);
        Ok(package)
    }
}

impl DataSpec {
    fn build(&self, home: &Path) -> Result<Data> {
        Data::new(&self.sources, Some(home))
    }
}

impl ExecutableSpec {
    fn build(&self, home: &Path) -> Result<Executable> {
        let main = Unit::from_path(&self.main, Some(home))?.ok_or_else(|| {
            anyhow!(
                "Executable entry point {} is not a buildable source",
                self.main.display()
            )
        })?;

        let mut inputs = Vec::new();
        for pattern in &self.sources {
            inputs.extend(
                Unit::from_pattern(pattern, Some(home))?
                    .into_iter()
                    .map(ExecutableInput::Unit),
            );
        }
        for module in &self.modules {
            inputs.push(ExecutableInput::Module(module.build(home)?));
        }
        for package in &self.packages {
            inputs.push(ExecutableInput::Package(package.build(home)?));
        }
        for data in &self.data {
            inputs.push(ExecutableInput::Data(data.build(home)?));
        }

        let name = self
            .name
            .clone()
            .unwrap_or_else(|| resource::extension_name(&self.main, true));

        if let Some(config) = &self.descriptor {
            let file = self
                .descriptor_file
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("{name}.rc")));
            let descriptor = ResourceDescriptorUnit::generated(home.join(file), config.clone())?;
            inputs.push(ExecutableInput::Unit(Unit::Descriptor(descriptor)));
        }

        let mut executable = Executable::new(main, inputs)?
            .with_name(name)
            .with_standalone(self.standalone)
            .with_runtime_dir(self.runtime_dir.clone());
        executable.include_dirs.clone_from(&self.include_dirs);
        executable.library_dirs.clone_from(&self.library_dirs);
        Ok(executable)
    }
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        let mut manifest: Self = toml::from_str(&text)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;

        let base = path.parent().unwrap_or(Path::new(""));
        manifest.home = Some(match manifest.home.take() {
            Some(home) => base.join(home),
            None => base.to_path_buf(),
        });
        Ok(manifest)
    }

    /// Build nodes in processing order: modules, packages, data, executables
    pub fn nodes(&self) -> Result<Vec<BuildNode>> {
        let home = self.home.as_deref().unwrap_or(Path::new(""));
        let mut nodes = Vec::new();

        for module in &self.modules {
            nodes.push(BuildNode::Module(module.build(home)?));
        }
        for package in &self.packages {
            nodes.push(BuildNode::Package(package.build(home)?));
        }
        for data in &self.data {
            nodes.push(BuildNode::Data(data.build(home)?));
        }
        for executable in &self.executables {
            nodes.push(BuildNode::Executable(executable.build(home)?));
        }

        Ok(nodes)
    }
}
