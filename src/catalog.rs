use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{error::Result, graph_store::sanitize_key};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseEntry {
    pub name: String,
    /// Directory holding this release's dumps. Derived from the name when
    /// absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl ReleaseEntry {
    pub fn folder(&self) -> String {
        self.folder
            .clone()
            .unwrap_or_else(|| default_folder(&self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsEntry {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Directory name under the YANG root, e.g. `xe`.
    pub code: String,
    /// Releases in chronological order.
    pub releases: Vec<ReleaseEntry>,
}

impl OsEntry {
    pub fn key(&self) -> String {
        sanitize_key(&self.name)
    }

    pub fn release_key(&self, release: &str) -> String {
        release_key(&self.name, release)
    }
}

/// Known operating systems and their releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub oses: Vec<OsEntry>,
}

/// A release located on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseRef<'a> {
    pub os: &'a OsEntry,
    pub release: &'a ReleaseEntry,
}

impl ReleaseRef<'_> {
    pub fn key(&self) -> String {
        self.os.release_key(&self.release.name)
    }
}

pub fn release_key(os: &str, release: &str) -> String {
    sanitize_key(&format!("{os}+{release}"))
}

/// `16.3.1` -> `1631`, `7.0(3)I7(1)` -> `7.0-3-I7-1`.
pub fn default_folder(release: &str) -> String {
    if release.contains('(') {
        release
            .replace(['(', ')'], "-")
            .trim_end_matches('-')
            .to_string()
    } else {
        release.replace('.', "")
    }
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// The catalog from `path`, or the built-in one.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::builtin()),
        }
    }

    pub fn os_by_code(&self, code: &str) -> Option<&OsEntry> {
        self.oses.iter().find(|os| os.code == code)
    }

    pub fn os_by_name(&self, name: &str) -> Option<&OsEntry> {
        self.oses.iter().find(|os| os.name == name)
    }

    /// Map an `<os code>/<release folder>` pair back to a release.
    pub fn release_for_folder(
        &self,
        code: &str,
        folder: &str,
    ) -> Option<ReleaseRef<'_>> {
        let os = self.os_by_code(code)?;
        let release = os.releases.iter().find(|r| r.folder() == folder)?;
        Some(ReleaseRef { os, release })
    }

    pub fn builtin() -> Self {
        fn os(name: &str, code: &str, releases: &[&str]) -> OsEntry {
            OsEntry {
                name: name.to_string(),
                description: Some(name.to_string()),
                code: code.to_string(),
                releases: releases
                    .iter()
                    .map(|r| ReleaseEntry {
                        name: r.to_string(),
                        folder: None,
                    })
                    .collect(),
            }
        }

        Self {
            oses: vec![
                os(
                    "IOS XE",
                    "xe",
                    &[
                        "16.3.1", "16.3.2", "16.4.1", "16.5.1", "16.6.1",
                        "16.6.2", "16.7.1", "16.8.1", "16.9.1", "16.9.3",
                    ],
                ),
                os(
                    "IOS XR",
                    "xr",
                    &[
                        "5.3.0", "5.3.1", "5.3.2", "5.3.3", "5.3.4", "6.0.0",
                        "6.0.1", "6.0.2", "6.1.1", "6.1.2", "6.1.3", "6.2.1",
                        "6.2.2", "6.3.1", "6.3.2", "6.4.1", "6.4.2", "6.5.1",
                        "6.5.2", "6.5.3", "6.6.2", "7.0.1",
                    ],
                ),
                os(
                    "NX-OS",
                    "nx",
                    &[
                        "7.0(3)F1(1)",
                        "7.0(3)F2(1)",
                        "7.0(3)F2(2)",
                        "7.0(3)I5(1)",
                        "7.0(3)I5(2)",
                        "7.0(3)I6(1)",
                        "7.0(3)I6(2)",
                        "7.0(3)I7(1)",
                        "7.0(3)I7(2)",
                        "7.0(3)I7(3)",
                        "7.0(3)I7(4)",
                        "9.2(1)",
                        "9.2(2)",
                        "9.2(3)",
                    ],
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folders_follow_release_names() {
        assert_eq!(default_folder("16.3.1"), "1631");
        assert_eq!(default_folder("7.0.1"), "701");
        assert_eq!(default_folder("7.0(3)F1(1)"), "7.0-3-F1-1");
        assert_eq!(default_folder("9.2(3)"), "9.2-3");
    }

    #[test]
    fn builtin_lookup_by_folder() {
        let catalog = Catalog::builtin();
        let found = catalog.release_for_folder("nx", "7.0-3-I7-4").unwrap();
        assert_eq!(found.os.name, "NX-OS");
        assert_eq!(found.release.name, "7.0(3)I7(4)");
        assert_eq!(found.key(), "NX-OS+7.0(3)I7(4)");

        let xe = catalog.release_for_folder("xe", "1693").unwrap();
        assert_eq!(xe.key(), "IOS_XE+16.9.3");

        assert!(catalog.release_for_folder("xe", "9999").is_none());
        assert!(catalog.release_for_folder("junos", "1631").is_none());
    }

    #[test]
    fn builtin_sizes() {
        let catalog = Catalog::builtin();
        let counts: Vec<_> =
            catalog.oses.iter().map(|os| os.releases.len()).collect();
        assert_eq!(counts, [10, 22, 14]);
        assert_eq!(catalog.os_by_name("IOS XR").unwrap().key(), "IOS_XR");
    }

    #[test]
    fn load_from_file_with_explicit_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"oses": [{"name": "IOS XE", "code": "xe",
                "releases": [{"name": "17.1.1", "folder": "amsterdam"}]}]}"#,
        )
        .unwrap();

        let catalog = Catalog::load_or_builtin(Some(&path)).unwrap();
        assert!(catalog.release_for_folder("xe", "amsterdam").is_some());
        assert_eq!(catalog.oses[0].description, None);
    }
}
