//! Build graph nodes
//!
//! Each node owns its units for one build and drives them through
//! transpile, freeze, compile and link. Nodes are processed strictly in
//! order; nothing is built in parallel.

pub mod context;
pub mod data;
pub mod executable;
pub mod module;
pub mod package;

use std::path::PathBuf;

use anyhow::Result;
use log::debug;

pub use context::BuildContext;
pub use data::Data;
pub use executable::{Executable, ExecutableInput};
pub use module::Module;
pub use package::Package;

#[derive(Debug, Clone)]
pub enum BuildNode {
    Module(Module),
    Package(Package),
    Executable(Executable),
    Data(Data),
}

impl BuildNode {
    pub fn name(&self) -> &str {
        match self {
            BuildNode::Module(module) => module.name(),
            BuildNode::Package(package) => package.name(),
            BuildNode::Executable(executable) => executable.name(),
            BuildNode::Data(_) => "data",
        }
    }

    /// Sources the node writes when processed, for cleanup without a build
    pub fn generated_files(&self) -> Vec<PathBuf> {
        match self {
            BuildNode::Module(module) => module.generated_files(),
            BuildNode::Package(package) => package.generated_files(),
            BuildNode::Executable(executable) => executable.generated_files(),
            BuildNode::Data(_) => Vec::new(),
        }
    }

    pub fn process(&mut self, ctx: &mut BuildContext<'_>) -> Result<()> {
        match self {
            BuildNode::Module(module) => module.process(ctx),
            BuildNode::Package(package) => package.process(ctx),
            BuildNode::Executable(executable) => executable.process(ctx),
            BuildNode::Data(data) => data.process(ctx).map(|_| ()),
        }
    }
}

/// Process `nodes` in order, stopping at the first failure
///
/// With `clean`, generated sources and object files are removed after each
/// node. Outputs of a failed node stay on disk.
pub fn process_all(nodes: &mut [BuildNode], ctx: &mut BuildContext<'_>, clean: bool) -> Result<()> {
    for node in nodes.iter_mut() {
        debug!("Processing {}", node.name());
        node.process(ctx)?;
        if clean {
            ctx.clean()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        config::BuildDirs,
        host::HostLayout,
        test_support::{FixtureTranspiler, RecordingToolchain, ToolchainCall},
    };

    #[test]
    fn test_process_all_cleans_between_nodes() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let home = temp_dir.path();
        fs::write(home.join("baselib.py"), "")?;
        fs::write(home.join("other.py"), "")?;

        let host = HostLayout::posix(Path::new("/py"), "3.11", ".so");
        let toolchain = RecordingToolchain::default();
        let mut ctx = BuildContext::new(
            &host,
            BuildDirs::new(&home.join("build")),
            Box::new(FixtureTranspiler::default()),
            Box::new(toolchain.clone()),
        );

        let mut nodes = vec![
            BuildNode::Module(Module::from_patterns(&[PathBuf::from("baselib.py")], Some(home), false)?),
            BuildNode::Module(Module::from_patterns(&[PathBuf::from("other.py")], Some(home), false)?),
        ];
        process_all(&mut nodes, &mut ctx, true)?;

        assert!(!home.join("baselib.cpp").exists());
        assert!(!home.join("other.cpp").exists());
        assert!(ctx.artifacts().is_empty());
        let linked: Vec<PathBuf> = toolchain
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                ToolchainCall::LinkShared { output, .. } => Some(output),
                _ => None,
            })
            .collect();
        assert_eq!(linked, vec![home.join("build/lib/baselib.so"), home.join("build/lib/other.so")]);
        assert!(home.join("build/lib/baselib.so").is_file());
        Ok(())
    }

    #[test]
    fn test_process_all_stops_at_first_failure() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let home = temp_dir.path();
        fs::write(home.join("baselib.py"), "")?;

        let host = HostLayout::posix(Path::new("/py"), "3.11", ".so");
        let toolchain = RecordingToolchain::default();
        let mut ctx = BuildContext::new(
            &host,
            BuildDirs::new(&home.join("build")),
            Box::new(FixtureTranspiler::default()),
            Box::new(toolchain.clone()),
        );

        // The transpiler cannot write next to a source in a missing directory
        let broken = Module::from_patterns(&[PathBuf::from("missing/broken.py")], Some(home), false)?;
        let fine = Module::from_patterns(&[PathBuf::from("baselib.py")], Some(home), false)?;
        let mut nodes = vec![BuildNode::Module(broken), BuildNode::Module(fine)];

        assert!(process_all(&mut nodes, &mut ctx, false).is_err());
        assert!(toolchain.calls().is_empty());
        assert!(!home.join("baselib.cpp").exists());
        Ok(())
    }
}
