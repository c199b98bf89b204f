//! SNMP MIB objects in the flat `newmibjson` layout, plus the flattener that
//! produces it from compiled MIB JSON.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    walker,
};

/// One MIB object, keyed by OID in the flat file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MibObject {
    pub oid: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Empty for non-leaf objects such as tables and groups.
    #[serde(rename = "dataType", default)]
    pub data_type: String,
}

#[derive(Debug, Clone)]
pub struct MibDump {
    /// Model name, taken from the file stem.
    pub name: String,
    pub objects: Vec<MibObject>,
}

impl MibDump {
    pub fn from_json(name: &str, json: &str) -> Result<Self> {
        let objects: BTreeMap<String, MibObject> = serde_json::from_str(json)?;
        Ok(Self {
            name: name.to_string(),
            objects: objects.into_values().collect(),
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::MalformedSourceTree {
                source_name: path.to_string_lossy().into_owned(),
                reason: "no file name".into(),
            })?;
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&name, &json)
    }
}

/// Convert one compiled MIB document into flat objects keyed by OID.
/// Entries without an `oid` (imports, metadata) are dropped.
pub fn flatten_compiled(
    source_name: &str,
    compiled: &Value,
) -> Result<BTreeMap<String, MibObject>> {
    let Some(entries) = compiled.as_object() else {
        return Err(Error::MalformedSourceTree {
            source_name: source_name.to_string(),
            reason: "compiled MIB is not a JSON object".into(),
        });
    };

    let mut flat = BTreeMap::new();
    for (entry_name, entry) in entries {
        let Some(oid) = entry.get("oid").and_then(Value::as_str) else {
            continue;
        };
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MalformedSourceTree {
                source_name: source_name.to_string(),
                reason: format!("object {entry_name} has an oid but no name"),
            })?;
        let text = |v: Option<&Value>| {
            v.and_then(Value::as_str).unwrap_or_default().to_string()
        };

        flat.insert(
            oid.to_string(),
            MibObject {
                oid: oid.to_string(),
                name: name.to_string(),
                description: text(entry.get("description")),
                data_type: text(entry.pointer("/syntax/type")),
            },
        );
    }
    Ok(flat)
}

/// Flatten every compiled `*.json` in `src` into `dst`, keeping file names.
/// Returns the number of files written; unreadable files are skipped.
pub fn flatten_dir(src: &Path, dst: &Path) -> Result<usize> {
    std::fs::create_dir_all(dst)?;
    let files = walker::discover_files(src)?;
    debug!(count = files.len(), "Flattening compiled MIBs");

    let mut written = 0;
    for file in &files {
        let source_name = file.relative_path.to_string_lossy();
        let compiled: Value =
            match std::fs::read_to_string(&file.absolute_path)
                .map_err(Error::from)
                .and_then(|s| serde_json::from_str(&s).map_err(Error::from))
            {
                Ok(v) => v,
                Err(e) => {
                    warn!(file = %source_name, error = %e, "Skipping MIB");
                    continue;
                }
            };

        let flat = match flatten_compiled(&source_name, &compiled) {
            Ok(flat) => flat,
            Err(e) => {
                warn!(file = %source_name, error = %e, "Skipping MIB");
                continue;
            }
        };

        let Some(file_name) = file.relative_path.file_name() else {
            continue;
        };
        std::fs::write(dst.join(file_name), serde_json::to_vec_pretty(&flat)?)?;
        written += 1;
    }
    Ok(written)
}
