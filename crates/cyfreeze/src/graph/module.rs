use std::path::{Path, PathBuf};

use anyhow::Result;
use log::info;

use super::context::BuildContext;
use crate::{
    error::BuildError,
    resource::INIT_SEGMENT,
    transpiler,
    unit::Unit,
};

/// One extension library built from one or more units
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    units: Vec<Unit>,
    package: bool,
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
}

impl Module {
    /// A package takes the first unit's name, a plain module its full name
    pub fn new(units: Vec<Unit>, package: bool) -> Result<Self> {
        let first = units
            .iter()
            .find_map(Unit::named)
            .ok_or(BuildError::EmptyModule)?;
        let name = if package {
            first.name.clone()
        } else {
            first.full_name.clone()
        };

        Ok(Self {
            name,
            units,
            package,
            include_dirs: Vec::new(),
            library_dirs: Vec::new(),
        })
    }

    /// Units discovered from each pattern, in pattern order
    pub fn from_patterns(patterns: &[PathBuf], home: Option<&Path>, package: bool) -> Result<Self> {
        Self::new(discover_units(patterns, home)?, package)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn into_units(self) -> Vec<Unit> {
        self.units
    }

    /// Sources this module writes next to its inputs
    pub fn generated_files(&self) -> Vec<PathBuf> {
        self.units
            .iter()
            .filter_map(Unit::generated_file)
            .map(Path::to_path_buf)
            .collect()
    }

    /// Init symbol the linked library must export
    pub fn export_symbol(&self) -> String {
        let mut segments = self.name.rsplit('.');
        let last = segments.next().unwrap_or(&self.name);
        let exported = if last == INIT_SEGMENT {
            segments.next().unwrap_or(last)
        } else {
            last
        };
        transpiler::init_symbol(exported)
    }

    /// `<parent segments>/<leaf><ext_suffix>` below the output directory
    pub fn output_path(&self, output_dir: &Path, ext_suffix: &str) -> PathBuf {
        let mut segments: Vec<&str> = self.name.split('.').collect();
        let leaf = segments.pop().unwrap_or(&self.name);
        let mut path = output_dir.to_path_buf();
        path.extend(segments);
        path.join(format!("{leaf}{ext_suffix}"))
    }

    pub fn process(&mut self, ctx: &mut BuildContext<'_>) -> Result<()> {
        info!("Building module {}", self.name);
        let mut sources = Vec::with_capacity(self.units.len());

        for unit in &mut self.units {
            match unit {
                Unit::Transpiled(unit) => {
                    info!("Transpile {}", unit.input_path().display());
                    unit.transpile(ctx.transpiler.as_ref(), Some(self.package))?;
                    if self.package {
                        unit.freeze_package(ctx.transpiler.contract())?;
                    }
                    let generated = unit.generated_path().to_path_buf();
                    ctx.record(&generated);
                    sources.push(generated);
                }
                Unit::Native(unit) => sources.push(unit.source_path().to_path_buf()),
                Unit::Descriptor(descriptor) => {
                    descriptor.generate()?;
                    if descriptor.is_generated() {
                        ctx.record(descriptor.source_path());
                    }
                    sources.push(descriptor.source_path().to_path_buf());
                }
                Unit::Data(data) => {
                    data.clone_into(&ctx.dirs.output)?;
                }
            }
        }

        let output = self.output_path(&ctx.dirs.output, &ctx.host.ext_suffix);
        let compile = ctx.compile_options(&self.include_dirs);
        let link = ctx.link_options(&self.library_dirs, vec![self.export_symbol()]);

        let objects = ctx.toolchain.compile(&sources, &compile)?;
        for object in &objects {
            ctx.record(object);
        }
        ctx.toolchain.link_shared(&objects, &output, &link)
    }
}

/// Typed units for every pattern, flattened in order
pub(crate) fn discover_units(patterns: &[PathBuf], home: Option<&Path>) -> Result<Vec<Unit>> {
    let mut units = Vec::new();
    for pattern in patterns {
        units.extend(Unit::from_pattern(pattern, home)?);
    }
    Ok(units)
}
