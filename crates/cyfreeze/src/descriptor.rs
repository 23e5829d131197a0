//! Platform resource descriptor (`.rc`) generation
//!
//! Produces the version-info block and optional icon entry linked into
//! Windows executables. The descriptor is a link input only; it is never
//! transpiled or frozen.

use std::fmt::Write as _;

use serde::Deserialize;

/// Version triple rendered as `major.minor.patch`
pub type Version = (u32, u32, u32);

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DescriptorConfig {
    pub icon_path: Option<String>,
    pub file_version: Option<Version>,
    pub company_name: Option<String>,
    pub file_description: Option<String>,
    pub internal_name: Option<String>,
    pub original_filename: Option<String>,
    pub product_name: Option<String>,
    pub product_version: Option<Version>,
    pub comments: Option<String>,
    pub legal_copyright: Option<String>,
}

impl DescriptorConfig {
    pub fn render(&self) -> String {
        let (major, minor, patch) = self.file_version.unwrap_or_default();

        let icon = self
            .icon_path
            .as_deref()
            .map(|icon| format!("IDI_ICON1 ICON \"{icon}\"\n"))
            .unwrap_or_default();

        let product_version = self
            .product_version
            .map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"));

        let values = [
            ("FileVersion", Some(format!("{major}.{minor}.{patch}"))),
            ("CompanyName", self.company_name.clone()),
            ("FileDescription", self.file_description.clone()),
            ("InternalName", self.internal_name.clone()),
            ("OriginalFilename", self.original_filename.clone()),
            ("ProductName", self.product_name.clone()),
            ("ProductVersion", product_version),
            ("Comments", self.comments.clone()),
            ("LegalCopyright", self.legal_copyright.clone()),
        ];

        let mut string_info = String::new();
        for (key, value) in values {
            if let Some(value) = value {
                let _ = writeln!(string_info, "      VALUE \"{key}\", \"{value}\"");
            }
        }

        format!(
            "#include <windows.h>
#include <winver.h>

{icon}
1 VERSIONINFO
FILEVERSION {major},{minor},{patch},0
BEGIN
  BLOCK \"StringFileInfo\"
  BEGIN
    BLOCK \"040904B0\"
    BEGIN
{string_info}    END
  END

  BLOCK \"VarFileInfo\"
  BEGIN
    VALUE \"Translation\", 0x409, 1200
  END
END
"
        )
    }
}
