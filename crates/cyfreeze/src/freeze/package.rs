//! Package identity freezing
//!
//! Generated module init code normally copies `__package__` and `__path__`
//! from the spec object handed over by a filesystem loader. A unit linked into
//! a single library or executable has no such loader, so those two statements
//! are replaced with literal assignments. The package `__init__` also gets a
//! meta-path finder that resolves sibling submodules to its own library.

use std::path::Path;

use anyhow::Result;

use crate::{error::BuildError, transpiler::GeneratedSourceContract};

const PACKAGE_FINDER_SCRIPT: &str = include_str!("templates/package_finder.py");

/// Start of the literal `__package__` assignment, present once frozen
const FROZEN_PACKAGE_PREFIX: &str = r#"PyDict_SetItemString(moddict, "__package__""#;

/// Literal identity assigned to a frozen unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    /// Package leaf name assigned to `__package__`
    pub leaf: String,
    /// Dotted package path assigned to `__path__`
    pub path: String,
    /// Whether the package finder hook is injected (only for `__init__`)
    pub inject_finder: bool,
}

impl PackageIdentity {
    /// Identity for a unit, or `None` for a single-segment top-level module
    pub fn for_unit(name: &str, is_package_init: bool) -> Option<Self> {
        let segments: Vec<&str> = name.split('.').collect();

        if is_package_init {
            return Some(Self {
                leaf: segments.last().copied().unwrap_or(name).to_owned(),
                path: name.to_owned(),
                inject_finder: true,
            });
        }

        match segments.as_slice() {
            [parents @ .., parent, _] => Some(Self {
                leaf: (*parent).to_owned(),
                path: parents
                    .iter()
                    .chain(std::iter::once(parent))
                    .copied()
                    .collect::<Vec<_>>()
                    .join("."),
                inject_finder: false,
            }),
            _ => None,
        }
    }
}

/// Apply `identity` to generated `code`
pub fn freeze_identity(
    code: &str,
    identity: &PackageIdentity,
    contract: &GeneratedSourceContract,
    file: &Path,
) -> Result<String> {
    if !code.contains(contract.package_marker) && code.contains(FROZEN_PACKAGE_PREFIX) {
        return Err(BuildError::AlreadyPackageFrozen {
            path: file.to_path_buf(),
        }
        .into());
    }
    contract.check(code, file)?;

    let code = code
        .replace(
            contract.package_marker,
            &format!(
                r#"if ({FROZEN_PACKAGE_PREFIX}, PyUnicode_FromString("{}")) < 0) goto bad;"#,
                identity.leaf
            ),
        )
        .replace(
            contract.path_marker,
            &format!(
                r#"if (PyDict_SetItemString(moddict, "__path__", PyUnicode_FromString("{}")) < 0) goto bad;"#,
                identity.path
            ),
        );

    if identity.inject_finder {
        inject_package_finder(&code, contract, file)
    } else {
        Ok(code)
    }
}

/// Insert the finder snippet right after the execution section's first block end
fn inject_package_finder(
    code: &str,
    contract: &GeneratedSourceContract,
    file: &Path,
) -> Result<String> {
    let drift = |marker: &str| BuildError::TemplateDrift {
        path: file.to_path_buf(),
        marker: marker.to_owned(),
    };

    let exec_pos = code
        .find(contract.exec_section_marker)
        .ok_or_else(|| drift(contract.exec_section_marker))?;
    let block_end = code[exec_pos..]
        .find(contract.block_end_marker)
        .map(|offset| exec_pos + offset)
        .ok_or_else(|| drift(contract.block_end_marker))?;
    let insert_at = code[block_end..]
        .find('\n')
        .map(|offset| block_end + offset + 1)
        .ok_or_else(|| drift("\\n"))?;

    let mut frozen = String::with_capacity(code.len() + PACKAGE_FINDER_SCRIPT.len() * 2);
    frozen.push_str(&code[..insert_at]);
    frozen.push_str(&package_finder_snippet(contract.module_object));
    frozen.push_str(&code[insert_at..]);
    Ok(frozen)
}

/// Native code running the finder script with the module's own identity
///
/// The script is formatted with the module's `__package__` and `__file__`,
/// so it has to stay free of `%` apart from its two `%s` slots.
pub fn package_finder_snippet(module_object: &str) -> String {
    let mut literal = String::new();
    for line in PACKAGE_FINDER_SCRIPT.lines() {
        literal.push_str("      \"");
        literal.push_str(&escape_c_string(line));
        literal.push_str("\\n\"\n");
    }

    format!(
        "  /* cyfreeze: package finder */
  {{
    PyObject *__cyfreeze_script = PyUnicode_FromFormat(
{literal}      ,
      PyUnicode_AsUTF8(PyObject_GetAttrString({module_object}, (char*)\"__package__\")),
      PyUnicode_AsUTF8(PyObject_GetAttrString({module_object}, (char*)\"__file__\")));
    if (__cyfreeze_script != NULL) {{
      PyRun_SimpleString(PyUnicode_AsUTF8(__cyfreeze_script));
      Py_DECREF(__cyfreeze_script);
    }}
  }}
"
    )
}

fn escape_c_string(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{freeze::tests::generated_source, transpiler::CYTHON_CONTRACT};

    #[test]
    fn test_identity_for_package_init() {
        assert_eq!(
            PackageIdentity::for_unit("a.utils", true),
            Some(PackageIdentity {
                leaf: "utils".to_owned(),
                path: "a.utils".to_owned(),
                inject_finder: true,
            })
        );
    }

    #[test]
    fn test_identity_for_submodule() {
        assert_eq!(
            PackageIdentity::for_unit("a.utils.utillib", false),
            Some(PackageIdentity {
                leaf: "utils".to_owned(),
                path: "a.utils".to_owned(),
                inject_finder: false,
            })
        );
    }

    #[test]
    fn test_identity_for_top_level_module() {
        assert_eq!(PackageIdentity::for_unit("baselib", false), None);
    }

    #[test]
    fn test_submodule_freeze_replaces_markers_only() -> Result<()> {
        let code = generated_source();
        let identity = PackageIdentity::for_unit("utils.utillib", false).unwrap();
        let frozen = freeze_identity(&code, &identity, &CYTHON_CONTRACT, Path::new("m.cpp"))?;

        assert!(!frozen.contains(CYTHON_CONTRACT.package_marker));
        assert!(!frozen.contains(CYTHON_CONTRACT.path_marker));
        assert!(frozen.contains(
            r#"if (PyDict_SetItemString(moddict, "__package__", PyUnicode_FromString("utils")) < 0) goto bad;"#
        ));
        assert!(frozen.contains(
            r#"if (PyDict_SetItemString(moddict, "__path__", PyUnicode_FromString("utils")) < 0) goto bad;"#
        ));
        assert!(!frozen.contains("cyfreeze: package finder"));
        Ok(())
    }

    #[test]
    fn test_finder_lands_after_exec_section_block() -> Result<()> {
        let code = generated_source();
        let identity = PackageIdentity::for_unit("utils", true).unwrap();
        let frozen = freeze_identity(&code, &identity, &CYTHON_CONTRACT, Path::new("m.cpp"))?;

        let exec = frozen.find("/*--- Execution code ---*/").unwrap();
        let endif = exec + frozen[exec..].find("#endif").unwrap();
        let finder = frozen.find("/* cyfreeze: package finder */").unwrap();
        let next_line = endif + frozen[endif..].find('\n').unwrap() + 1;

        assert_eq!(finder - 2, next_line);
        assert!(frozen[finder..].contains("sys.meta_path.append(_FrozenPackageFinder(\\\"%s\\\", r\\\"%s\\\"))"));
        Ok(())
    }

    #[test]
    fn test_freezing_twice_is_rejected() -> Result<()> {
        let identity = PackageIdentity::for_unit("utils.utillib", false).unwrap();
        let once = freeze_identity(
            &generated_source(),
            &identity,
            &CYTHON_CONTRACT,
            Path::new("m.cpp"),
        )?;
        let err = freeze_identity(&once, &identity, &CYTHON_CONTRACT, Path::new("m.cpp")).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::AlreadyPackageFrozen { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_missing_markers_signal_drift() {
        let identity = PackageIdentity::for_unit("utils.utillib", false).unwrap();
        let err = freeze_identity(
            "/* some other generator */",
            &identity,
            &CYTHON_CONTRACT,
            Path::new("m.cpp"),
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::TemplateDrift { .. })
        ));
    }

    #[test]
    fn test_finder_script_is_escaped() {
        let snippet = package_finder_snippet("__pyx_m");
        assert!(snippet.contains(r#"      "import sys\n""#));
        assert!(snippet.contains("PyObject_GetAttrString(__pyx_m, (char*)\"__file__\")"));
        assert_eq!(snippet.matches("%s").count(), 2);
    }
}
