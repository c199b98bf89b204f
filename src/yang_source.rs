//! YANG modules exported as JSON statement trees.
//!
//! One file holds one module revision:
//!
//! ```json
//! {"keyword": "module", "name": "openconfig-interfaces",
//!  "revision": "2018-01-05", "prefix": "oc-if",
//!  "children": [{"keyword": "container", "name": "interfaces",
//!                "module": "openconfig-interfaces", "prefix": "oc-if",
//!                "children": [...]}]}
//! ```

use std::{
    collections::{BTreeMap, btree_map::Entry},
    path::Path,
};

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    parse_tree::{AdaptedModule, ParseTreeAdapter, StatementNode},
    seed,
};

#[derive(Debug, Clone, Deserialize)]
pub struct TypeRef {
    pub name: String,
    /// Whether `name` is a built-in type. Inferred from the name when the
    /// exporter leaves it out.
    #[serde(default)]
    pub primitive: Option<bool>,
    #[serde(default)]
    pub typedef: Option<Box<Typedef>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Typedef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
}

impl TypeRef {
    /// Follow typedef references down to the built-in type.
    pub fn resolve(&self, node: &str) -> Result<String> {
        let mut current = self;
        loop {
            if let Some(typedef) = &current.typedef {
                current = &typedef.type_ref;
                continue;
            }
            let primitive = current
                .primitive
                .unwrap_or_else(|| seed::is_yang_primitive(&current.name));
            if !primitive {
                return Err(Error::TypeResolution {
                    node: node.to_string(),
                    reason: format!(
                        "type {} is neither built-in nor a known typedef",
                        current.name
                    ),
                });
            }
            return Ok(current.name.clone());
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonStatement {
    pub keyword: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<bool>,
    #[serde(default, rename = "type")]
    pub type_ref: Option<TypeRef>,
    #[serde(default)]
    pub children: Vec<JsonStatement>,
}

impl StatementNode for JsonStatement {
    fn keyword(&self) -> &str {
        &self.keyword
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn read_write(&self) -> Option<bool> {
        self.config
    }

    fn primitive_type(&self) -> Result<Option<String>> {
        let Some(type_ref) = &self.type_ref else {
            return Ok(None);
        };
        let node = self.name.as_deref().unwrap_or(&self.keyword);
        type_ref.resolve(node).map(Some)
    }

    fn children(&self) -> &[Self] {
        &self.children
    }
}

/// A parsed module file.
#[derive(Debug, Clone)]
pub struct ModuleDump {
    pub name: String,
    pub revision: String,
    pub root: JsonStatement,
}

impl ModuleDump {
    pub fn from_json(source_name: &str, json: &str) -> Result<Self> {
        let root: JsonStatement = serde_json::from_str(json)?;
        let malformed = |reason: &str| Error::MalformedSourceTree {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        };

        if root.keyword != "module" {
            return Err(malformed("root statement is not a module"));
        }
        let name = root
            .name
            .clone()
            .ok_or_else(|| malformed("module without name"))?;
        let revision = root
            .revision
            .clone()
            .ok_or_else(|| malformed("module without revision"))?;

        Ok(Self {
            name,
            revision,
            root,
        })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&path.to_string_lossy(), &json)
    }

    pub fn adapt(&self) -> Result<AdaptedModule> {
        let source = format!("{}@{}", self.name, self.revision);
        Ok(AdaptedModule {
            name: self.name.clone(),
            revision: Some(self.revision.clone()),
            roots: ParseTreeAdapter::new(&source).adapt(&self.root)?,
        })
    }
}

/// Modules of one scope keyed by name, then revision.
#[derive(Debug, Default)]
pub struct ModuleSet {
    modules: BTreeMap<String, BTreeMap<String, ModuleDump>>,
}

impl ModuleSet {
    /// Add a module revision; the same name and revision twice is an error.
    pub fn insert(&mut self, dump: ModuleDump) -> Result<()> {
        let revisions = self.modules.entry(dump.name.clone()).or_default();
        match revisions.entry(dump.revision.clone()) {
            Entry::Occupied(_) => Err(Error::MalformedSourceTree {
                source_name: format!("{}@{}", dump.name, dump.revision),
                reason: "module revision supplied twice".into(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(dump);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.modules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// All module revisions, ordered by name then revision.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDump> {
        self.modules.values().flat_map(BTreeMap::values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = r#"{
        "keyword": "module", "name": "acme-if", "revision": "2020-01-01",
        "prefix": "aif",
        "children": [
            {"keyword": "typedef", "name": "speed"},
            {"keyword": "container", "name": "interfaces",
             "module": "acme-if", "prefix": "aif",
             "description": "All interfaces",
             "children": [
                {"keyword": "leaf", "name": "mtu", "module": "acme-if",
                 "prefix": "aif",
                 "type": {"name": "mtu-type",
                          "typedef": {"name": "mtu-type",
                                      "type": {"name": "uint16"}}}},
                {"keyword": "leaf", "name": "oper-status",
                 "module": "acme-if", "prefix": "aif", "config": false,
                 "type": {"name": "enumeration", "primitive": true}}
             ]}
        ]
    }"#;

    #[test]
    fn parses_and_adapts_module() {
        let dump = ModuleDump::from_json("acme-if.json", MODULE).unwrap();
        assert_eq!(dump.name, "acme-if");
        assert_eq!(dump.revision, "2020-01-01");

        let adapted = dump.adapt().unwrap();
        assert_eq!(adapted.roots.len(), 1);
        let interfaces = &adapted.roots[0];
        assert_eq!(interfaces.description.as_deref(), Some("All interfaces"));
        assert_eq!(interfaces.primitive_type, None);

        let mtu = &interfaces.children[0];
        assert_eq!(mtu.primitive_type.as_deref(), Some("uint16"));
        // No flag anywhere above it.
        assert!(!mtu.is_configurable);

        let status = &interfaces.children[1];
        assert_eq!(status.primitive_type.as_deref(), Some("enumeration"));
        assert!(!status.is_configurable);
    }

    #[test]
    fn unresolved_derived_type_fails() {
        let ty = TypeRef {
            name: "ietf-yang-types:counter64".into(),
            primitive: Some(false),
            typedef: None,
        };
        let err = ty.resolve("in-octets").unwrap_err();
        assert!(matches!(err, Error::TypeResolution { .. }));
    }

    #[test]
    fn primitive_inferred_from_name() {
        let ty = TypeRef {
            name: "string".into(),
            primitive: None,
            typedef: None,
        };
        assert_eq!(ty.resolve("x").unwrap(), "string");

        let unknown = TypeRef {
            name: "ipv4-address".into(),
            primitive: None,
            typedef: None,
        };
        assert!(unknown.resolve("x").is_err());
    }

    #[test]
    fn root_must_be_a_module_with_revision() {
        assert!(
            ModuleDump::from_json("x", r#"{"keyword": "submodule"}"#).is_err()
        );
        assert!(
            ModuleDump::from_json(
                "x",
                r#"{"keyword": "module", "name": "no-rev"}"#
            )
            .is_err()
        );
    }

    #[test]
    fn duplicate_revision_is_rejected() {
        let mut set = ModuleSet::default();
        let dump = ModuleDump::from_json("a.json", MODULE).unwrap();
        set.insert(dump.clone()).unwrap();
        assert!(set.insert(dump).is_err());
        assert_eq!(set.len(), 1);
    }
}
