//! Reference data that cannot be parsed from the models themselves.

use serde_json::json;
use tracing::info;

use crate::{
    error::Result,
    graph_store::{
        Document,
        EdgeCollection,
        GraphStore,
        VertexCollection,
        VertexHandle,
        document,
        sanitize_key,
    },
};

pub const YANG: &str = "YANG";
pub const SMI: &str = "SMI";

const RFC6020: &str = "https://tools.ietf.org/html/rfc6020#section-";
const RFC2578: &str = "https://tools.ietf.org/html/rfc2578#section-";

/// Built-in YANG types and their RFC 6020 sections.
pub const YANG_TYPES: [(&str, &str); 19] = [
    ("binary", "9.8"),
    ("bits", "9.7"),
    ("boolean", "9.5"),
    ("decimal64", "9.3"),
    ("empty", "9.11"),
    ("enumeration", "9.6"),
    ("identityref", "9.10"),
    ("instance-identifier", "9.13"),
    ("int8", "9.2"),
    ("int16", "9.2"),
    ("int32", "9.2"),
    ("int64", "9.2"),
    ("leafref", "9.9"),
    ("string", "9.4"),
    ("uint8", "9.2"),
    ("uint16", "9.2"),
    ("uint32", "9.2"),
    ("uint64", "9.2"),
    ("union", "9.12"),
];

/// SMIv2 base types and their RFC 2578 sections.
pub const SMI_TYPES: [(&str, &str); 13] = [
    ("Integer32", "7.1.1"),
    ("INTEGER", "7.1.1"),
    ("OCTET STRING", "7.1.2"),
    ("OBJECT IDENTIFIER", "7.1.3"),
    ("BITS", "7.1.4"),
    ("IpAddress", "7.1.5"),
    ("Counter32", "7.1.6"),
    ("Gauge32", "7.1.7"),
    ("TimeTicks", "7.1.8"),
    ("Opaque", "7.1.9"),
    ("Counter64", "7.1.10"),
    ("Unsigned32", "7.1.11"),
    ("Conceptual Tables", "7.1.12"),
];

struct Language {
    name: &'static str,
    description: &'static str,
    rfc: &'static str,
    types: &'static [(&'static str, &'static str)],
}

const LANGUAGES: [Language; 4] = [
    Language {
        name: YANG,
        description: "Yet Another Next Generation",
        rfc: RFC6020,
        types: &YANG_TYPES,
    },
    Language {
        name: SMI,
        description: "Structure of Management Information",
        rfc: RFC2578,
        types: &SMI_TYPES,
    },
    Language {
        name: "DME",
        description: "Data Management Engine",
        rfc: "",
        types: &[],
    },
    Language {
        name: "CLI",
        description: "Command Line Interface",
        rfc: "",
        types: &[],
    },
];

pub fn is_yang_primitive(name: &str) -> bool {
    YANG_TYPES.iter().any(|(t, _)| *t == name)
}

/// Key of a data type vertex, e.g. `SMI+OCTET_STRING`.
pub fn data_type_key(language: &str, name: &str) -> String {
    sanitize_key(&format!("{language}+{name}"))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedStats {
    pub languages: usize,
    pub data_types: usize,
}

/// Create languages, their data types and the DataPath unique index.
/// Existing vertices are left alone, so seeding twice is harmless.
pub fn seed_languages(store: &dyn GraphStore) -> Result<SeedStats> {
    let mut stats = SeedStats::default();
    store.ensure_unique_index(VertexCollection::DataPath, "machine_id")?;
    store.ensure_unique_index(VertexCollection::Calculation, "name")?;

    for lang in &LANGUAGES {
        let (dml, created) = ensure_vertex(
            store,
            VertexCollection::DataModelLanguage,
            &sanitize_key(lang.name),
            document([
                ("name", json!(lang.name)),
                ("description", json!(lang.description)),
            ]),
        )?;
        stats.languages += usize::from(created);

        for (type_name, section) in lang.types {
            let (dt, created) = ensure_vertex(
                store,
                VertexCollection::DataType,
                &data_type_key(lang.name, type_name),
                document([
                    ("name", json!(type_name)),
                    ("description", json!(format!("{}{section}", lang.rfc))),
                    ("is_primitive", json!(true)),
                ]),
            )?;
            stats.data_types += usize::from(created);

            let link = EdgeCollection::DataModelLanguageHasDataType;
            if store.edges_between(link, &dml, &dt)?.is_empty() {
                store.create_edge(link, &dml, &dt, Document::new())?;
            }
        }
    }

    info!(
        languages = stats.languages,
        data_types = stats.data_types,
        "Seeded data model languages"
    );
    Ok(stats)
}

/// Return the vertex at `key`, creating it with `fields` if absent.
pub(crate) fn ensure_vertex(
    store: &dyn GraphStore,
    collection: VertexCollection,
    key: &str,
    fields: Document,
) -> Result<(VertexHandle, bool)> {
    if let Some(existing) = store.lookup_vertex(collection, key)? {
        return Ok((existing.handle, false));
    }
    Ok((store.create_vertex(collection, fields, Some(key))?, true))
}
