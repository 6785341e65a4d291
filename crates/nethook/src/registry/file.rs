//! JSON document format of a registry.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{
    BodyBinding, EmsgEntry, EnumDef, FieldSchema, FlatField, FlatLayout, MessageSchema, Registry,
    RegistryError,
};

/// On-disk shape of a registry.
///
/// ```json
/// {
///   "version": "2024-06",
///   "enums": { "EResult": { "OK": 1, "Fail": 2 } },
///   "messages": { "CMsgPing": [ { "number": 1, "name": "value", "type": "uint32" } ] },
///   "layouts": { "MsgResult": { "fields": [ { "name": "result", "type": "u32", "ref": "EResult" } ] } },
///   "emsgs": [ { "id": 10, "name": "Ping", "message": "CMsgPing" } ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryFile {
    pub version: String,
    #[serde(default)]
    pub enums: IndexMap<String, IndexMap<String, i64>>,
    #[serde(default)]
    pub messages: IndexMap<String, Vec<FieldSchema>>,
    #[serde(default)]
    pub layouts: IndexMap<String, LayoutFile>,
    #[serde(default)]
    pub emsgs: Vec<EmsgFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutFile {
    pub fields: Vec<FlatField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmsgFile {
    pub id: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
}

impl RegistryFile {
    /// Builds and validates the registry.
    pub fn into_registry(self) -> Result<Registry, RegistryError> {
        let mut registry = Registry::new(self.version);
        for (name, values) in self.enums {
            registry.insert_enum(EnumDef::new(name, values))?;
        }
        for (name, fields) in self.messages {
            registry.insert_message(MessageSchema::new(name, fields))?;
        }
        for (name, layout) in self.layouts {
            registry.insert_layout(FlatLayout {
                name,
                fields: layout.fields,
                trailing: layout.trailing,
            })?;
        }
        for emsg in self.emsgs {
            let body = match (emsg.message, emsg.layout) {
                (Some(message), None) => BodyBinding::Message(message),
                (None, Some(layout)) => BodyBinding::Layout(layout),
                (None, None) => BodyBinding::None,
                (Some(_), Some(layout)) => {
                    return Err(RegistryError::DuplicateName {
                        kind: "body binding",
                        name: format!("{} (message and layout `{layout}`)", emsg.name),
                    });
                }
            };
            registry.insert_emsg(EmsgEntry::new(emsg.id, emsg.name, body))?;
        }
        registry.validate()?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Strategy;

    #[test]
    fn loads_documented_shape() {
        let json = r#"{
            "version": "2024-06",
            "enums": { "EResult": { "OK": 1, "Fail": 2 } },
            "messages": { "CMsgPing": [ { "number": 1, "name": "value", "type": "uint32" } ] },
            "layouts": { "MsgResult": { "fields": [ { "name": "result", "type": "u32", "ref": "EResult" } ] } },
            "emsgs": [
                { "id": 10, "name": "Ping", "message": "CMsgPing" },
                { "id": 11, "name": "Result", "layout": "MsgResult" },
                { "id": 12, "name": "Bare" }
            ]
        }"#;
        let reg = Registry::from_json_str(json).unwrap();
        assert_eq!(reg.version(), "2024-06");
        assert!(matches!(reg.strategy(10), Strategy::Schema(_)));
        assert!(matches!(reg.strategy(11), Strategy::Flat(l) if l.fixed_len() == 4));
        assert_eq!(reg.strategy(12), Strategy::Unrecognized);
    }

    #[test]
    fn rejects_double_binding() {
        let json = r#"{
            "version": "x",
            "messages": { "A": [] },
            "layouts": { "B": { "fields": [] } },
            "emsgs": [ { "id": 1, "name": "Both", "message": "A", "layout": "B" } ]
        }"#;
        assert!(Registry::from_json_str(json).is_err());
    }

    #[test]
    fn rejects_unknown_enum_reference() {
        let json = r#"{
            "version": "x",
            "messages": { "A": [ { "number": 1, "name": "r", "type": "enum", "ref": "Nope" } ] }
        }"#;
        let err = Registry::from_json_str(json).unwrap_err();
        assert_eq!(err.to_string(), "`A.r` references unknown enum `Nope`");
    }
}
