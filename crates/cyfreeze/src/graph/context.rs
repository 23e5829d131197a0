use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::{
    config::{BuildDirs, Config},
    host::HostLayout,
    toolchain::{CcToolchain, CompileOptions, LinkOptions, Toolchain},
    transpiler::{CythonTranspiler, Transpiler},
};

/// Everything a build node needs from its surroundings
///
/// Nodes never read global state: the host layout, the output directories
/// and the external tools all come through here.
#[derive(Debug)]
pub struct BuildContext<'a> {
    pub host: &'a HostLayout,
    pub dirs: BuildDirs,
    pub transpiler: Box<dyn Transpiler>,
    pub toolchain: Box<dyn Toolchain>,
    /// Search paths added to every node, after the host's own
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
    pub trace_timeout: Duration,
    /// Generated sources and object files, removed by [`BuildContext::clean`]
    artifacts: Vec<PathBuf>,
}

impl<'a> BuildContext<'a> {
    pub fn new(
        host: &'a HostLayout,
        dirs: BuildDirs,
        transpiler: Box<dyn Transpiler>,
        toolchain: Box<dyn Toolchain>,
    ) -> Self {
        Self {
            host,
            dirs,
            transpiler,
            toolchain,
            include_dirs: Vec::new(),
            library_dirs: Vec::new(),
            trace_timeout: Duration::from_secs(3),
            artifacts: Vec::new(),
        }
    }

    /// Context driving the Cython CLI and a cc-style compiler from `config`
    pub fn from_config(config: &Config, host: &'a HostLayout) -> Self {
        let mut ctx = Self::new(
            host,
            config.build_dirs(),
            Box::new(CythonTranspiler::new(&host.executable)),
            Box::new(CcToolchain::new(&config.compiler)),
        );
        ctx.include_dirs.clone_from(&config.include_dirs);
        ctx.library_dirs.clone_from(&config.library_dirs);
        ctx.trace_timeout = config.trace_timeout();
        ctx
    }

    /// Host include dir first, then the context's, then the node's
    pub fn compile_options(&self, node_include_dirs: &[PathBuf]) -> CompileOptions {
        let include_dirs = std::iter::once(&self.host.include_dir)
            .chain(&self.include_dirs)
            .chain(node_include_dirs)
            .cloned()
            .collect();
        CompileOptions {
            include_dirs,
            output_dir: self.dirs.temp.clone(),
        }
    }

    pub fn link_options(
        &self,
        node_library_dirs: &[PathBuf],
        export_symbols: Vec<String>,
    ) -> LinkOptions {
        let library_dirs = self
            .host
            .library_dirs
            .iter()
            .chain(&self.library_dirs)
            .chain(node_library_dirs)
            .cloned()
            .collect();
        LinkOptions {
            library_dirs,
            libraries: self.host.link_library.iter().cloned().collect(),
            export_symbols,
        }
    }

    /// Remember a file this build produced and may remove later
    pub fn record(&mut self, path: &Path) {
        debug!("Artifact {}", path.display());
        self.artifacts.push(path.to_path_buf());
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Remove every recorded artifact that still exists
    pub fn clean(&mut self) -> Result<()> {
        for artifact in self.artifacts.drain(..) {
            if artifact.is_file() {
                info!("Remove {}", artifact.display());
                fs::remove_file(&artifact)
                    .with_context(|| format!("Failed to remove {}", artifact.display()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::test_support::{FixtureTranspiler, RecordingToolchain};

    fn context<'a>(host: &'a HostLayout, base: &Path) -> BuildContext<'a> {
        BuildContext::new(
            host,
            BuildDirs::new(base),
            Box::new(FixtureTranspiler::default()),
            Box::new(RecordingToolchain::default()),
        )
    }

    #[test]
    fn test_search_paths_put_host_first() {
        let host = HostLayout::posix(Path::new("/py"), "3.11", ".so");
        let mut ctx = context(&host, Path::new("build"));
        ctx.include_dirs.push(PathBuf::from("vendor/include"));

        let compile = ctx.compile_options(&[PathBuf::from("node/include")]);
        assert_eq!(
            compile.include_dirs,
            vec![
                PathBuf::from("/py/include/python3.11"),
                PathBuf::from("vendor/include"),
                PathBuf::from("node/include"),
            ]
        );
        assert_eq!(compile.output_dir, PathBuf::from("build/temp/Release"));

        let link = ctx.link_options(&[], vec!["PyInit_x".to_owned()]);
        assert_eq!(link.library_dirs, vec![PathBuf::from("/py/lib")]);
        assert_eq!(link.libraries, vec!["python3.11".to_owned()]);
    }

    #[test]
    fn test_clean_removes_existing_artifacts() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let host = HostLayout::posix(Path::new("/py"), "3.11", ".so");
        let mut ctx = context(&host, temp_dir.path());

        let generated = temp_dir.path().join("main.cpp");
        fs::write(&generated, "")?;
        ctx.record(&generated);
        ctx.record(&temp_dir.path().join("never-written.o"));

        ctx.clean()?;

        assert!(!generated.exists());
        assert!(ctx.artifacts().is_empty());
        Ok(())
    }
}
