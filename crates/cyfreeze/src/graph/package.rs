use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;

use super::{context::BuildContext, module::Module};
use crate::{error::BuildError, unit::Unit};

/// A module built as a package: its `__init__` unit always comes first
#[derive(Debug, Clone)]
pub struct Package {
    module: Module,
}

impl Package {
    pub fn new(mut units: Vec<Unit>) -> Result<Self> {
        let Some(index) = units
            .iter()
            .position(|unit| unit.named().is_some_and(|named| named.is_package_init()))
        else {
            return Err(BuildError::MissingPackageInit {
                package: missing_init_package_name(&units),
            }
            .into());
        };

        let init = units.remove(index);
        units.insert(0, init);
        debug!("Package units reordered, __init__ was at {index}");

        Ok(Self {
            module: Module::new(units, true)?,
        })
    }

    pub fn from_patterns(patterns: &[PathBuf], home: Option<&Path>) -> Result<Self> {
        Self::new(super::module::discover_units(patterns, home)?)
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn units(&self) -> &[Unit] {
        self.module.units()
    }

    pub fn into_units(self) -> Vec<Unit> {
        self.module.into_units()
    }

    pub fn generated_files(&self) -> Vec<PathBuf> {
        self.module.generated_files()
    }

    pub fn module_mut(&mut self) -> &mut Module {
        &mut self.module
    }

    pub fn process(&mut self, ctx: &mut BuildContext<'_>) -> Result<()> {
        self.module.process(ctx)
    }
}

/// The package the first unit would belong to
fn missing_init_package_name(units: &[Unit]) -> String {
    units
        .iter()
        .find_map(Unit::named)
        .and_then(|named| named.name.rsplit_once('.'))
        .map(|(package, _)| package.to_owned())
        .unwrap_or_default()
}
