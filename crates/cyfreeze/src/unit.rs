//! Build units: the atomic files a build node is made of
//!
//! The set of unit kinds is closed. Build nodes match on [`Unit`]
//! exhaustively, so adding a kind forces every node to decide how to treat it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::{
    descriptor::DescriptorConfig,
    error::BuildError,
    freeze::{self, ExecutableRegistration, PackageIdentity, RegisteredModule},
    resource::{NamedResource, Resource, ResourceKind, discovery},
    transpiler::{self, GeneratedSourceContract, TranspileRequest, Transpiler},
    types::UnitState,
};

/// Extension of the native source the transpiler writes
pub const GENERATED_EXT: &str = "cpp";

/// A script or intermediate source that goes through the transpiler
#[derive(Debug, Clone)]
pub struct TranspiledUnit {
    named: NamedResource,
    generated: PathBuf,
    state: UnitState,
    package: bool,
    /// Name passed to the transpiler, fixed on first transpile
    symbol: Option<String>,
}

impl TranspiledUnit {
    /// Accepts script (`.py`) and intermediate (`.pyx`, `.pxd`) sources
    pub fn new(input: impl Into<PathBuf>, home: Option<&Path>) -> Result<Self> {
        let input = input.into();
        let kind = match ResourceKind::from_path(&input) {
            Some(kind @ (ResourceKind::Script | ResourceKind::Intermediate)) => kind,
            _ => ResourceKind::Script,
        };
        let resource = Resource::typed(input, home, kind)?;
        let generated = resource.input_path.with_extension(GENERATED_EXT);
        Ok(Self {
            named: NamedResource::new(resource),
            generated,
            state: UnitState::Created,
            package: false,
            symbol: None,
        })
    }

    pub fn named(&self) -> &NamedResource {
        &self.named
    }

    pub fn name(&self) -> &str {
        &self.named.name
    }

    pub fn input_path(&self) -> &Path {
        &self.named.resource.input_path
    }

    /// Native source written by the transpiler
    pub fn generated_path(&self) -> &Path {
        &self.generated
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn is_package(&self) -> bool {
        self.package
    }

    /// Run the transpiler once; later calls are no-ops
    ///
    /// `package` overrides the unit's package flag only on the first call.
    pub fn transpile(&mut self, transpiler: &dyn Transpiler, package: Option<bool>) -> Result<()> {
        if self.state.is_transpiled() {
            debug!("{} already transpiled", self.input_path().display());
            return Ok(());
        }

        if let Some(package) = package {
            self.package = package;
        }

        let symbol = transpiler::module_symbol_name(self.name(), self.package);
        transpiler.transpile(&TranspileRequest {
            input: &self.named.resource.input_path,
            output: &self.generated,
            module_name: &symbol,
        })?;

        self.symbol = Some(symbol);
        self.state = UnitState::Transpiled;
        Ok(())
    }

    /// Name and init symbol under which this unit registers, once transpiled
    pub fn registered(&self) -> Result<RegisteredModule> {
        let symbol = self.symbol.clone().ok_or_else(|| BuildError::NotTranspiled {
            path: self.input_path().to_path_buf(),
        })?;
        Ok(RegisteredModule {
            name: self.name().to_owned(),
            symbol,
        })
    }

    /// Give the unit a literal package identity
    ///
    /// A single-segment top-level module has no package and is left as is.
    pub fn freeze_package(&mut self, contract: &GeneratedSourceContract) -> Result<()> {
        match self.state {
            UnitState::Created => {
                return Err(self.not_transpiled());
            }
            UnitState::PackageFrozen => {
                return Err(BuildError::AlreadyPackageFrozen {
                    path: self.generated.clone(),
                }
                .into());
            }
            UnitState::ExecutableFrozen => {
                return Err(BuildError::AlreadyExecutableFrozen {
                    path: self.generated.clone(),
                }
                .into());
            }
            UnitState::Transpiled => {}
        }

        if !self.package {
            return Err(BuildError::NotPackageBuild {
                path: self.input_path().to_path_buf(),
            }
            .into());
        }

        if let Some(identity) =
            PackageIdentity::for_unit(self.name(), self.named.is_package_init())
        {
            debug!(
                "Freezing {} as package '{}' ({})",
                self.name(),
                identity.leaf,
                identity.path
            );
            let code = self.read_generated()?;
            let code = freeze::freeze_identity(&code, &identity, contract, &self.generated)?;
            self.write_generated(&code)?;
        } else {
            debug!("{} is a top-level module, nothing to freeze", self.name());
        }

        self.state = UnitState::PackageFrozen;
        Ok(())
    }

    /// Append the executable bootstrap registering `modules` after this unit
    pub fn freeze_executable(
        &mut self,
        modules: &[RegisteredModule],
        standalone: bool,
        runtime_dir: Option<&str>,
    ) -> Result<()> {
        match self.state {
            UnitState::Created => return Err(self.not_transpiled()),
            UnitState::ExecutableFrozen => {
                return Err(BuildError::AlreadyExecutableFrozen {
                    path: self.generated.clone(),
                }
                .into());
            }
            UnitState::Transpiled | UnitState::PackageFrozen => {}
        }

        let registration = ExecutableRegistration {
            main: self.registered()?,
            modules,
            standalone,
            runtime_dir,
        };
        let code = self.read_generated()?;
        let code = freeze::append_registration(&code, &registration, &self.generated)?;
        self.write_generated(&code)?;

        self.state = UnitState::ExecutableFrozen;
        Ok(())
    }

    fn not_transpiled(&self) -> anyhow::Error {
        BuildError::NotTranspiled {
            path: self.input_path().to_path_buf(),
        }
        .into()
    }

    fn read_generated(&self) -> Result<String> {
        fs::read_to_string(&self.generated)
            .with_context(|| format!("Failed to read {}", self.generated.display()))
    }

    fn write_generated(&self, code: &str) -> Result<()> {
        fs::write(&self.generated, code)
            .with_context(|| format!("Failed to write {}", self.generated.display()))
    }
}

/// Native source linked as is
#[derive(Debug, Clone)]
pub struct NativeUnit {
    named: NamedResource,
}

impl NativeUnit {
    pub fn new(input: impl Into<PathBuf>, home: Option<&Path>) -> Result<Self> {
        let resource = Resource::typed(input, home, ResourceKind::Native)?;
        Ok(Self {
            named: NamedResource::new(resource),
        })
    }

    pub fn named(&self) -> &NamedResource {
        &self.named
    }

    pub fn source_path(&self) -> &Path {
        &self.named.resource.input_path
    }

    /// Registration of a hand-written extension, named like a package build
    pub fn registered(&self) -> RegisteredModule {
        RegisteredModule {
            name: self.named.name.clone(),
            symbol: transpiler::module_symbol_name(&self.named.name, true),
        }
    }
}

/// Platform resource descriptor, generated from config or taken from disk
#[derive(Debug, Clone)]
pub struct ResourceDescriptorUnit {
    path: PathBuf,
    config: Option<DescriptorConfig>,
}

impl ResourceDescriptorUnit {
    /// A descriptor generated into `output` at build time
    pub fn generated(output: impl Into<PathBuf>, config: DescriptorConfig) -> Result<Self> {
        let resource = Resource::typed(output, None, ResourceKind::Descriptor)?;
        Ok(Self {
            path: resource.input_path,
            config: Some(config),
        })
    }

    /// A descriptor file that already exists
    pub fn existing(input: impl Into<PathBuf>, home: Option<&Path>) -> Result<Self> {
        let resource = Resource::typed(input, home, ResourceKind::Descriptor)?;
        Ok(Self {
            path: resource.input_path,
            config: None,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.path
    }

    /// Write the descriptor file; pre-existing descriptors are left untouched
    pub fn generate(&self) -> Result<()> {
        let Some(config) = &self.config else {
            return Ok(());
        };
        info!("Generate {}", self.path.display());
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, config.render())
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    pub fn is_generated(&self) -> bool {
        self.config.is_some()
    }
}

/// A static file copied verbatim into the output layout
#[derive(Debug, Clone)]
pub struct DataUnit {
    resource: Resource,
}

impl DataUnit {
    /// Fails unless the source exists now
    pub fn new(input: impl Into<PathBuf>, home: Option<&Path>) -> Result<Self> {
        let resource = Resource::new(input, home);
        if !resource.input_path.exists() {
            return Err(BuildError::DataSourceMissing {
                path: resource.input_path,
            }
            .into());
        }
        Ok(Self { resource })
    }

    /// Every file matched by `pattern`
    pub fn from_pattern(pattern: &Path, home: Option<&Path>) -> Result<Vec<Self>> {
        discovery::discover(pattern, home)?
            .into_iter()
            .map(|path| Self::new(path, home))
            .collect()
    }

    pub fn source_path(&self) -> &Path {
        &self.resource.input_path
    }

    /// Copy to `<output_root>/<input as given>`, creating parent directories
    pub fn clone_into(&self, output_root: &Path) -> Result<PathBuf> {
        info!("Clone data file {}", self.resource.input_path.display());
        let target = output_root.join(&self.resource.input);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::copy(&self.resource.input_path, &target).with_context(|| {
            format!(
                "Failed to copy {} to {}",
                self.resource.input_path.display(),
                target.display()
            )
        })?;
        Ok(target)
    }
}

#[derive(Debug, Clone)]
pub enum Unit {
    Transpiled(TranspiledUnit),
    Native(NativeUnit),
    Descriptor(ResourceDescriptorUnit),
    Data(DataUnit),
}

impl Unit {
    /// Typed unit for a path, chosen by extension
    ///
    /// Files of no known kind yield `None`; they can only be used as data.
    pub fn from_path(path: &Path, home: Option<&Path>) -> Result<Option<Self>> {
        let unit = match ResourceKind::from_path(path) {
            Some(ResourceKind::Script | ResourceKind::Intermediate) => {
                Self::Transpiled(TranspiledUnit::new(path, home)?)
            }
            Some(ResourceKind::Native) => Self::Native(NativeUnit::new(path, home)?),
            Some(ResourceKind::Descriptor) => {
                Self::Descriptor(ResourceDescriptorUnit::existing(path, home)?)
            }
            None => {
                warn!("Ignoring {}: not a buildable resource", path.display());
                return Ok(None);
            }
        };
        Ok(Some(unit))
    }

    /// Every typed unit matched by `pattern`
    pub fn from_pattern(pattern: &Path, home: Option<&Path>) -> Result<Vec<Self>> {
        let mut units = Vec::new();
        for path in discovery::discover(pattern, home)? {
            units.extend(Self::from_path(&path, home)?);
        }
        Ok(units)
    }

    /// File the build writes for this unit, if any
    pub fn generated_file(&self) -> Option<&Path> {
        match self {
            Unit::Transpiled(unit) => Some(unit.generated_path()),
            Unit::Descriptor(unit) if unit.is_generated() => Some(unit.source_path()),
            Unit::Native(_) | Unit::Descriptor(_) | Unit::Data(_) => None,
        }
    }

    /// Named resource of units that carry a qualified name
    pub fn named(&self) -> Option<&NamedResource> {
        match self {
            Unit::Transpiled(unit) => Some(unit.named()),
            Unit::Native(unit) => Some(unit.named()),
            Unit::Descriptor(_) | Unit::Data(_) => None,
        }
    }
}
