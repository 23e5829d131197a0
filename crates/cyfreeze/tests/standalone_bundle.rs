//! End-to-end standalone builds against a fake interpreter installation
//!
//! The interpreter is a shell script replaying a verbose import log, so
//! these only run where `/bin/sh` exists.
#![cfg(unix)]

use std::{
    env::consts::EXE_SUFFIX,
    fs::{self, File},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use cyfreeze::{
    config::BuildDirs,
    graph::{self, BuildContext},
    host::HostLayout,
    manifest::{MANIFEST_FILE_NAME, Manifest},
    packer::{self, BUNDLE_ARCHIVE_NAME},
    tracer::Tracer,
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::TempDir;
use zip::ZipArchive;

mod common;

use common::{FixtureTranspiler, TouchToolchain, write};

/// A posix installation under `<temp>/pyroot` with a few stdlib files
fn installation(temp: &Path) -> HostLayout {
    let root = temp.join("pyroot");
    for rel in [
        "lib/python3.11/os.py",
        "lib/python3.11/stringprep.py",
        "lib/python3.11/encodings/__init__.py",
        "lib/python3.11/encodings/aliases.py",
        "lib/python3.11/encodings/__pycache__/aliases.cpython-311.pyc",
        "lib/python3.11/site-packages/six.py",
        "lib/python3.11/lib-dynload/_json.so",
        "lib/python3.11/lib-dynload/unicodedata.so",
        "lib/python3.11/lib-dynload/_socket.so",
        "lib/libpython3.11.so",
    ] {
        write(&root, rel, rel);
    }
    HostLayout::posix(&root, "3.11", ".so")
}

/// Install a fake interpreter that prints `log` to stderr, then runs `tail`
fn fake_python(host: &HostLayout, log: &str, tail: &str) {
    let script = format!("#!/bin/sh\ncat >&2 <<'EOF'\n{log}EOF\n{tail}\n");
    fs::create_dir_all(host.executable.parent().unwrap()).unwrap();
    fs::write(&host.executable, script).unwrap();
    fs::set_permissions(&host.executable, fs::Permissions::from_mode(0o755)).unwrap();
}

fn import_log(root: &Path) -> String {
    let r = root.display();
    format!(
        "# installing zipimport hook
# {r}/lib/python3.11/__pycache__/os.cpython-311.pyc matches {r}/lib/python3.11/os.py
# code object from '{r}/lib/python3.11/__pycache__/os.cpython-311.pyc'
import 'os' # <_frozen_importlib_external.SourceFileLoader object at 0x7f0001>
# {r}/lib/python3.11/encodings/__pycache__/__init__.cpython-311.pyc matches {r}/lib/python3.11/encodings/__init__.py
import 'encodings' # <_frozen_importlib_external.SourceFileLoader object at 0x7f0002>
# extension module '_json' loaded from '{r}/lib/python3.11/lib-dynload/_json.so'
import '_json' # <_frozen_importlib_external.ExtensionFileLoader object at 0x7f0003>
# {r}/lib/python3.11/site-packages/__pycache__/six.cpython-311.pyc matches {r}/lib/python3.11/site-packages/six.py
import 'six' # <_frozen_importlib_external.SourceFileLoader object at 0x7f0004>
import 'sys' # <class '_frozen_importlib.BuiltinImporter'>
"
    )
}

fn archive_entries(archive: &Path) -> Vec<String> {
    let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
    (0..zip.len())
        .map(|index| zip.by_index(index).unwrap().name().to_owned())
        .collect()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
#[serial]
fn test_standalone_executable_ships_its_runtime() {
    let temp_dir = TempDir::new().unwrap();
    let host = installation(temp_dir.path());
    fake_python(&host, &import_log(&host.install_root), "exit 0");

    let home = temp_dir.path().join("project");
    write(&home, "main.py", "import os, json, six\n");
    write(
        &home,
        MANIFEST_FILE_NAME,
        "[[executable]]\nmain = \"main.py\"\nname = \"app\"\nstandalone = true\n",
    );

    let manifest = Manifest::load(&home.join(MANIFEST_FILE_NAME)).unwrap();
    let mut nodes = manifest.nodes().unwrap();
    let mut ctx = BuildContext::new(
        &host,
        BuildDirs::new(&home.join("build")),
        Box::new(FixtureTranspiler),
        Box::new(TouchToolchain),
    );
    ctx.trace_timeout = Duration::from_secs(5);
    graph::process_all(&mut nodes, &mut ctx, false).unwrap();

    let lib = home.join("build/lib");
    assert!(lib.join(format!("app{EXE_SUFFIX}")).is_file());
    // Runtime libraries sit flat beside the binary
    assert!(lib.join("libpython3.11.so").is_file());
    assert!(!lib.join("lib").exists());

    let main = fs::read_to_string(home.join("main.cpp")).unwrap();
    assert!(main.contains("InitPythonStandalone(argc, argv);"));

    let runtime = lib.join("bin");
    assert_eq!(
        file_names(&runtime),
        vec!["_json.so", BUNDLE_ARCHIVE_NAME, "unicodedata.so"]
    );
    assert_eq!(
        archive_entries(&runtime.join(BUNDLE_ARCHIVE_NAME)),
        vec![
            "os.py",
            "six.py",
            "stringprep.py",
            "encodings/__init__.py",
            "encodings/aliases.py",
        ]
    );
}

#[test]
#[serial]
fn test_trace_returns_on_time_when_the_script_leaves_children_behind() {
    let temp_dir = TempDir::new().unwrap();
    let host = installation(temp_dir.path());
    fake_python(&host, &import_log(&host.install_root), "sleep 30 &\nsleep 30");
    let script = temp_dir.path().join("server.py");
    write(temp_dir.path(), "server.py", "");

    let started = Instant::now();
    let paths = Tracer::new(&host, Duration::from_millis(300))
        .trace(&script)
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let stdlib = &host.stdlib_dir;
    assert_eq!(
        paths,
        vec![
            stdlib.join("os.py"),
            stdlib.join("encodings/__init__.py"),
            stdlib.join("lib-dynload/_json.so"),
            stdlib.join("site-packages/six.py"),
            stdlib.join("stringprep.py"),
            stdlib.join("lib-dynload/unicodedata.so"),
        ]
    );
}

#[test]
#[serial]
fn test_bundle_is_identical_across_runs() {
    let temp_dir = TempDir::new().unwrap();
    let host = installation(temp_dir.path());
    fake_python(&host, &import_log(&host.install_root), "exit 0");
    let script = temp_dir.path().join("app.py");
    write(temp_dir.path(), "app.py", "");

    let tracer = Tracer::new(&host, Duration::from_secs(5));
    let mut listings: Vec<Vec<String>> = Vec::new();
    for run in ["first", "second"] {
        let out_dir: PathBuf = temp_dir.path().join(run);
        let bundle = packer::pack(&tracer.trace(&script).unwrap(), &host, &out_dir).unwrap();
        assert_eq!(bundle.native.len(), 2);
        listings.push(archive_entries(&bundle.archive));
    }
    assert_eq!(listings[0], listings[1]);
}
