//! Host runtime installation layout
//!
//! Every component that needs to know where the interpreter lives (the
//! toolchain for include/library paths, the tracer for the install root, the
//! packer for subtree classification) borrows one immutable [`HostLayout`].
//! It is either probed once from the interpreter or spelled out in config.

use std::{
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use log::debug;
use serde::Deserialize;

use crate::types::SubtreeKind;

/// Python snippet printing the layout as `key=value` lines
const PROBE_SCRIPT: &str = r#"import os, sys, sysconfig
v = sysconfig.get_config_var
p = sysconfig.get_path
print("os=" + os.name)
print("executable=" + sys.executable)
print("install_root=" + sys.exec_prefix)
print("base_prefix=" + sys.base_prefix)
print("stdlib=" + p("stdlib"))
print("platstdlib=" + p("platstdlib"))
print("purelib=" + p("purelib"))
print("include=" + p("include"))
print("libdir=" + (v("LIBDIR") or ""))
print("version=%d.%d" % sys.version_info[:2])
print("ext_suffix=" + (v("EXT_SUFFIX") or ".pyd"))
"#;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HostLayout {
    /// Interpreter used for tracing
    pub executable: PathBuf,
    /// `sys.exec_prefix`; the tracer looks for this prefix in probe lines
    pub install_root: PathBuf,
    pub stdlib_dir: PathBuf,
    pub native_dir: PathBuf,
    pub site_packages_dir: PathBuf,
    pub include_dir: PathBuf,
    #[serde(default)]
    pub library_dirs: Vec<PathBuf>,
    /// Library passed to the linker with `-l`
    #[serde(default)]
    pub link_library: Option<String>,
    /// Suffix of compiled extension modules, e.g. `.cpython-311-x86_64-linux-gnu.so`
    #[serde(default = "default_ext_suffix")]
    pub ext_suffix: String,
    #[serde(default = "default_native_suffixes")]
    pub native_suffixes: Vec<String>,
    #[serde(default = "default_bytecode_suffix")]
    pub bytecode_suffix: String,
    #[serde(default = "default_source_suffix")]
    pub source_suffix: String,
    /// Importing this module pulls in `ffi_shim`, which the trace never shows
    #[serde(default = "default_ffi_bridge_module")]
    pub ffi_bridge_module: String,
    #[serde(default)]
    pub ffi_shim: Option<PathBuf>,
    /// Files the interpreter core needs regardless of what the trace shows
    #[serde(default)]
    pub required_files: Vec<PathBuf>,
    /// Pattern, relative to `install_root`, matching the runtime's shared libraries
    #[serde(default = "default_runtime_library_pattern")]
    pub runtime_library_pattern: String,
    /// Paths compare ignoring ASCII case, with `\` and `/` interchangeable
    #[serde(default)]
    pub case_insensitive_paths: bool,
}

fn default_ext_suffix() -> String {
    if cfg!(windows) { ".pyd" } else { ".so" }.to_owned()
}

fn default_native_suffixes() -> Vec<String> {
    vec![".pyd".to_owned(), ".so".to_owned()]
}

fn default_bytecode_suffix() -> String {
    ".pyc".to_owned()
}

fn default_source_suffix() -> String {
    ".py".to_owned()
}

fn default_ffi_bridge_module() -> String {
    "_ctypes".to_owned()
}

fn default_runtime_library_pattern() -> String {
    if cfg!(windows) { "*.dll" } else { "lib/*.so" }.to_owned()
}

impl HostLayout {
    /// Layout of a Windows CPython installation rooted at `root`
    pub fn windows(root: &Path, version: &str) -> Self {
        let stdlib_dir = root.join("Lib");
        let native_dir = root.join("DLLs");
        Self {
            executable: root.join("python.exe"),
            install_root: root.to_path_buf(),
            site_packages_dir: stdlib_dir.join("site-packages"),
            include_dir: root.join("include"),
            library_dirs: vec![root.join("libs")],
            link_library: Some(format!("python{}", version.replace('.', ""))),
            ext_suffix: ".pyd".to_owned(),
            native_suffixes: vec![".pyd".to_owned(), ".dll".to_owned()],
            bytecode_suffix: default_bytecode_suffix(),
            source_suffix: default_source_suffix(),
            ffi_bridge_module: default_ffi_bridge_module(),
            ffi_shim: Some(native_dir.join("libffi-7.dll")),
            required_files: vec![
                stdlib_dir.join("stringprep.py"),
                native_dir.join("unicodedata.pyd"),
            ],
            runtime_library_pattern: "*.dll".to_owned(),
            case_insensitive_paths: true,
            stdlib_dir,
            native_dir,
        }
    }

    /// Layout of a POSIX CPython installation rooted at `root`
    pub fn posix(root: &Path, version: &str, ext_suffix: &str) -> Self {
        let stdlib_dir = root.join("lib").join(format!("python{version}"));
        let native_dir = stdlib_dir.join("lib-dynload");
        Self {
            executable: root.join("bin").join(format!("python{version}")),
            install_root: root.to_path_buf(),
            site_packages_dir: stdlib_dir.join("site-packages"),
            include_dir: root.join("include").join(format!("python{version}")),
            library_dirs: vec![root.join("lib")],
            link_library: Some(format!("python{version}")),
            ext_suffix: ext_suffix.to_owned(),
            native_suffixes: vec![".so".to_owned()],
            bytecode_suffix: default_bytecode_suffix(),
            source_suffix: default_source_suffix(),
            ffi_bridge_module: default_ffi_bridge_module(),
            ffi_shim: None,
            required_files: vec![
                stdlib_dir.join("stringprep.py"),
                native_dir.join(format!("unicodedata{ext_suffix}")),
            ],
            runtime_library_pattern: default_runtime_library_pattern(),
            case_insensitive_paths: false,
            stdlib_dir,
            native_dir,
        }
    }

    /// Probe the layout by running `python` once
    pub fn detect(python: &Path) -> Result<Self> {
        debug!("Probing host layout with {}", python.display());
        let output = Command::new(python)
            .arg("-c")
            .arg(PROBE_SCRIPT)
            .output()
            .with_context(|| format!("Failed to run {}", python.display()))?;

        if !output.status.success() {
            return Err(anyhow!(
                "Host layout probe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        Self::from_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Build a layout from the `key=value` lines printed by the probe script
    pub fn from_probe_output(output: &str) -> Result<Self> {
        let values: IndexMap<&str, &str> = output
            .lines()
            .filter_map(|line| line.trim_end_matches('\r').split_once('='))
            .collect();

        let get = |key: &str| {
            values
                .get(key)
                .copied()
                .ok_or_else(|| anyhow!("Host layout probe did not report `{key}`"))
        };

        let root = PathBuf::from(get("install_root")?);
        let version = get("version")?;
        let ext_suffix = get("ext_suffix")?;

        let is_windows = get("os")? == "nt";

        let mut layout = if is_windows {
            Self::windows(&root, version)
        } else {
            Self::posix(&root, version, ext_suffix)
        };

        layout.executable = PathBuf::from(get("executable")?);
        layout.stdlib_dir = PathBuf::from(get("stdlib")?);
        layout.site_packages_dir = PathBuf::from(get("purelib")?);
        layout.include_dir = PathBuf::from(get("include")?);
        layout.ext_suffix = ext_suffix.to_owned();

        match get("libdir")? {
            "" => {
                let base = PathBuf::from(get("base_prefix")?);
                layout.library_dirs = vec![base.join("libs")];
            }
            libdir => layout.library_dirs = vec![PathBuf::from(libdir)],
        }

        if !is_windows {
            // Distro builds may place the platform stdlib away from exec_prefix
            layout.native_dir = PathBuf::from(get("platstdlib")?).join("lib-dynload");
            layout.required_files = vec![
                layout.stdlib_dir.join("stringprep.py"),
                layout.native_dir.join(format!("unicodedata{ext_suffix}")),
            ];
        }

        Ok(layout)
    }

    /// Root directory of the given subtree
    pub fn subtree_root(&self, kind: SubtreeKind) -> &Path {
        match kind {
            SubtreeKind::NativeLibrary => &self.native_dir,
            SubtreeKind::ThirdParty => &self.site_packages_dir,
            SubtreeKind::StandardLibrary => &self.stdlib_dir,
        }
    }

    /// Classify a file by the installation subtree it falls under
    ///
    /// The native and third-party directories may be nested inside the
    /// standard library, so they are checked first. Paths anywhere else
    /// (scripts, headers, unrelated locations) yield `None`.
    pub fn classify(&self, path: &Path) -> Option<SubtreeKind> {
        [
            SubtreeKind::NativeLibrary,
            SubtreeKind::ThirdParty,
            SubtreeKind::StandardLibrary,
        ]
        .into_iter()
        .find(|kind| self.segments_below(path, self.subtree_root(*kind)).is_some())
    }

    /// Names of the components of `path` below `root`, `None` when outside it
    pub fn segments_below(&self, path: &Path, root: &Path) -> Option<Vec<String>> {
        if !self.case_insensitive_paths {
            let rest = path.strip_prefix(root).ok()?;
            return Some(
                rest.components()
                    .map(|component| component.as_os_str().to_string_lossy().into_owned())
                    .collect(),
            );
        }

        let path = path.to_string_lossy().replace('\\', "/");
        let root = root.to_string_lossy().replace('\\', "/");
        let root = root.trim_end_matches('/');
        if !path.get(..root.len())?.eq_ignore_ascii_case(root) {
            return None;
        }
        let rest = &path[root.len()..];
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        Some(
            rest.split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Suffixes the tracer accepts as the end of a dependency path
    pub fn artifact_suffixes(&self) -> impl Iterator<Item = &str> {
        self.native_suffixes
            .iter()
            .map(String::as_str)
            .chain([self.bytecode_suffix.as_str(), self.source_suffix.as_str()])
    }
}
