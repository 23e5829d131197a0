//! Build configuration
//!
//! Values are layered, later sources winning: built-in defaults, the user
//! config file, the project `cyfreeze.toml`, then `CYFREEZE_*` environment
//! variables. CLI flags are applied on top by the binary.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;

use crate::{dirs, host::HostLayout};

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of all build outputs
    pub build_dir: PathBuf,
    /// Host interpreter, used to probe the layout and to trace scripts
    pub python: PathBuf,
    /// gcc/clang compatible C++ compiler driver
    pub compiler: String,
    pub include_dirs: Vec<PathBuf>,
    pub library_dirs: Vec<PathBuf>,
    /// How long a traced script may run before it is killed
    pub trace_timeout_secs: u64,
    /// Explicit host layout; probed from `python` when absent
    pub host: Option<HostLayout>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            python: PathBuf::from(if cfg!(windows) { "python" } else { "python3" }),
            compiler: "c++".to_owned(),
            include_dirs: Vec::new(),
            library_dirs: Vec::new(),
            trace_timeout_secs: 3,
            host: None,
        }
    }
}

/// One config file as written on disk; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    build_dir: Option<PathBuf>,
    python: Option<PathBuf>,
    compiler: Option<String>,
    #[serde(default)]
    include_dirs: Vec<PathBuf>,
    #[serde(default)]
    library_dirs: Vec<PathBuf>,
    trace_timeout_secs: Option<u64>,
    host: Option<HostLayout>,
}

impl Config {
    /// Load the layered configuration
    ///
    /// An explicit `project_file` must exist; otherwise `cyfreeze.toml` in the
    /// current directory is used when present.
    pub fn load(project_file: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_file) = dirs::user_config_file()
            && user_file.is_file()
        {
            config.merge_file(&user_file)?;
        }

        match project_file {
            Some(path) => config.merge_file(path)?,
            None => {
                let local = Path::new(dirs::CONFIG_FILE_NAME);
                if local.is_file() {
                    config.merge_file(local)?;
                }
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        debug!("Loading config from {}", path.display());
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        self.merge(file);
        Ok(())
    }

    fn merge(&mut self, file: ConfigFile) {
        if let Some(build_dir) = file.build_dir {
            self.build_dir = build_dir;
        }
        if let Some(python) = file.python {
            self.python = python;
        }
        if let Some(compiler) = file.compiler {
            self.compiler = compiler;
        }
        if let Some(timeout) = file.trace_timeout_secs {
            self.trace_timeout_secs = timeout;
        }
        if file.host.is_some() {
            self.host = file.host;
        }
        self.include_dirs.extend(file.include_dirs);
        self.library_dirs.extend(file.library_dirs);
    }

    /// Apply `CYFREEZE_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(python) = lookup("CYFREEZE_PYTHON") {
            self.python = PathBuf::from(python);
        }
        if let Some(build_dir) = lookup("CYFREEZE_BUILD_DIR") {
            self.build_dir = PathBuf::from(build_dir);
        }
        if let Some(compiler) = lookup("CYFREEZE_COMPILER") {
            self.compiler = compiler;
        }
    }

    /// The configured host layout, probing the interpreter when none is given
    pub fn host_layout(&self) -> Result<HostLayout> {
        match &self.host {
            Some(layout) => Ok(layout.clone()),
            None => HostLayout::detect(&self.python),
        }
    }

    pub fn trace_timeout(&self) -> Duration {
        Duration::from_secs(self.trace_timeout_secs)
    }

    pub fn build_dirs(&self) -> BuildDirs {
        BuildDirs::new(&self.build_dir)
    }
}

/// Directory layout under the build root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDirs {
    /// Object files
    pub temp: PathBuf,
    /// Linked libraries and executables, cloned data, runtime bundle
    pub output: PathBuf,
}

impl BuildDirs {
    pub fn new(base: &Path) -> Self {
        Self {
            temp: base.join("temp").join("Release"),
            output: base.join("lib"),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_project_file_overrides_defaults() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("cyfreeze.toml");
        fs::write(
            &path,
            "build_dir = \"out\"\ncompiler = \"clang++\"\ninclude_dirs = [\"vendor/include\"]\n",
        )?;

        let mut config = Config::default();
        config.merge_file(&path)?;

        assert_eq!(config.build_dir, PathBuf::from("out"));
        assert_eq!(config.compiler, "clang++");
        assert_eq!(config.include_dirs, vec![PathBuf::from("vendor/include")]);
        assert_eq!(config.trace_timeout_secs, 3);
        Ok(())
    }

    #[test]
    fn test_unknown_keys_are_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("cyfreeze.toml");
        fs::write(&path, "biuld_dir = \"out\"\n")?;

        let mut config = Config::default();
        assert!(config.merge_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_host_table_skips_detection() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("cyfreeze.toml");
        fs::write(
            &path,
            r#"
[host]
executable = "/py/bin/python3"
install_root = "/py"
stdlib_dir = "/py/lib/python3.12"
native_dir = "/py/lib/python3.12/lib-dynload"
site_packages_dir = "/py/lib/python3.12/site-packages"
include_dir = "/py/include/python3.12"
"#,
        )?;

        let mut config = Config::default();
        config.merge_file(&path)?;
        let layout = config.host_layout()?;

        assert_eq!(layout.install_root, PathBuf::from("/py"));
        assert_eq!(layout.bytecode_suffix, ".pyc");
        assert_eq!(layout.ffi_bridge_module, "_ctypes");
        Ok(())
    }

    #[test]
    fn test_env_lookup_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "CYFREEZE_BUILD_DIR" => Some("dist".to_owned()),
            _ => None,
        });

        assert_eq!(config.build_dir, PathBuf::from("dist"));
        assert_eq!(config.compiler, "c++");
    }

    #[test]
    #[serial]
    fn test_load_reads_process_environment() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("project.toml");
        fs::write(&path, "python = \"/from/file\"\n")?;

        // SAFETY: serialized with every other test touching the environment
        unsafe {
            std::env::set_var("CYFREEZE_PYTHON", "/from/env");
        }
        let config = Config::load(Some(path.as_path()));
        unsafe {
            std::env::remove_var("CYFREEZE_PYTHON");
        }

        assert_eq!(config?.python, PathBuf::from("/from/env"));
        Ok(())
    }

    #[test]
    fn test_build_dirs_layout() {
        let dirs = BuildDirs::new(Path::new("build"));
        assert_eq!(dirs.temp, PathBuf::from("build/temp/Release"));
        assert_eq!(dirs.output, PathBuf::from("build/lib"));
    }
}
