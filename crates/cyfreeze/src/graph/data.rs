use std::path::{Path, PathBuf};

use anyhow::Result;

use super::context::BuildContext;
use crate::unit::DataUnit;

/// Static files copied into the output directory as they are
#[derive(Debug, Clone, Default)]
pub struct Data {
    units: Vec<DataUnit>,
}

impl Data {
    /// Every file matched by `patterns`; each one must exist now
    pub fn new(patterns: &[PathBuf], home: Option<&Path>) -> Result<Self> {
        let mut units = Vec::new();
        for pattern in patterns {
            units.extend(DataUnit::from_pattern(pattern, home)?);
        }
        Ok(Self { units })
    }

    /// Clone every file, returning where each one landed
    pub fn process(&self, ctx: &BuildContext<'_>) -> Result<Vec<PathBuf>> {
        self.units
            .iter()
            .map(|unit| unit.clone_into(&ctx.dirs.output))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        config::BuildDirs,
        error::BuildError,
        host::HostLayout,
        test_support::{FixtureTranspiler, RecordingToolchain},
    };

    #[test]
    fn test_pattern_clones_every_match() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let home = temp_dir.path().join("src");
        fs::create_dir_all(home.join("res"))?;
        fs::write(home.join("res/a.json"), "1")?;
        fs::write(home.join("res/b.json"), "2")?;
        fs::write(home.join("res/notes.txt"), "")?;

        let host = HostLayout::posix(Path::new("/py"), "3.11", ".so");
        let ctx = BuildContext::new(
            &host,
            BuildDirs::new(&temp_dir.path().join("build")),
            Box::new(FixtureTranspiler::default()),
            Box::new(RecordingToolchain::default()),
        );

        let data = Data::new(&[PathBuf::from("res/*.json")], Some(home.as_path()))?;
        let copied = data.process(&ctx)?;

        let output = temp_dir.path().join("build/lib");
        assert_eq!(copied, vec![output.join("res/a.json"), output.join("res/b.json")]);
        assert_eq!(fs::read_to_string(output.join("res/b.json"))?, "2");
        Ok(())
    }

    #[test]
    fn test_missing_literal_file_fails_at_construction() {
        let err = Data::new(&[PathBuf::from("missing.cfg")], None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::DataSourceMissing { .. })
        ));
    }
}
