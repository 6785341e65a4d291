//! Discriminator → decode-strategy table.
//!
//! A [`Registry`] is data: it is built from a versioned JSON document (or
//! programmatically) and consulted by the body decoder. A missing entry is
//! the normal "unrecognized" case, never an error.

mod file;
mod schema;

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

pub use file::RegistryFile;
pub use schema::{EnumDef, FieldSchema, FieldType, FlatField, FlatLayout, FlatType, MessageSchema};

/// Registry bundled with the crate.
const BUILTIN_JSON: &str = include_str!("../../schemas/steam.json");

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid registry document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cannot read registry {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("message type {0} registered twice")]
    DuplicateEmsg(u32),
    #[error("{kind} `{name}` registered twice")]
    DuplicateName { kind: &'static str, name: String },
    #[error("message `{message}` declares field number {number} twice")]
    DuplicateField { message: String, number: u32 },
    #[error("`{owner}` is a {ty} field and cannot reference `{target}`")]
    UnexpectedReference {
        owner: String,
        ty: &'static str,
        target: String,
    },
    #[error("`{owner}` references unknown {kind} `{target}`")]
    MissingReference {
        owner: String,
        kind: &'static str,
        target: String,
    },
}

/// What decodes the body of one message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyBinding {
    Message(String),
    Layout(String),
    /// Named but not decodable.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmsgEntry {
    pub id: u32,
    pub name: String,
    pub body: BodyBinding,
}

impl EmsgEntry {
    pub fn new(id: u32, name: impl Into<String>, body: BodyBinding) -> Self {
        Self {
            id,
            name: name.into(),
            body,
        }
    }
}

/// Decode strategy selected for a discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy<'r> {
    Schema(&'r MessageSchema),
    Flat(&'r FlatLayout),
    Unrecognized,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    version: String,
    emsgs: IndexMap<u32, EmsgEntry>,
    messages: IndexMap<String, MessageSchema>,
    layouts: IndexMap<String, FlatLayout>,
    enums: IndexMap<String, EnumDef>,
}

impl Registry {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    /// The table bundled with the crate.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_json_str(BUILTIN_JSON)
    }

    pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        file.into_registry()
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json_str(&json)?;
        tracing::debug!(
            path = %path.display(),
            version = %registry.version,
            emsgs = registry.emsgs.len(),
            "loaded registry"
        );
        Ok(registry)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn insert_enum(&mut self, def: EnumDef) -> Result<(), RegistryError> {
        if self.enums.contains_key(&def.name) {
            return Err(RegistryError::DuplicateName {
                kind: "enum",
                name: def.name,
            });
        }
        self.enums.insert(def.name.clone(), def);
        Ok(())
    }

    pub fn insert_message(&mut self, schema: MessageSchema) -> Result<(), RegistryError> {
        if self.messages.contains_key(&schema.name) {
            return Err(RegistryError::DuplicateName {
                kind: "message",
                name: schema.name,
            });
        }
        for (i, field) in schema.fields.iter().enumerate() {
            if schema.fields[..i].iter().any(|f| f.number == field.number) {
                return Err(RegistryError::DuplicateField {
                    message: schema.name.clone(),
                    number: field.number,
                });
            }
        }
        self.messages.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn insert_layout(&mut self, layout: FlatLayout) -> Result<(), RegistryError> {
        if self.layouts.contains_key(&layout.name) {
            return Err(RegistryError::DuplicateName {
                kind: "layout",
                name: layout.name,
            });
        }
        self.layouts.insert(layout.name.clone(), layout);
        Ok(())
    }

    pub fn insert_emsg(&mut self, entry: EmsgEntry) -> Result<(), RegistryError> {
        if self.emsgs.contains_key(&entry.id) {
            return Err(RegistryError::DuplicateEmsg(entry.id));
        }
        self.emsgs.insert(entry.id, entry);
        Ok(())
    }

    /// Checks that every reference resolves.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let missing = |owner: &str, kind: &'static str, target: &str| {
            RegistryError::MissingReference {
                owner: owner.to_string(),
                kind,
                target: target.to_string(),
            }
        };
        for schema in self.messages.values() {
            for field in &schema.fields {
                let owner = || format!("{}.{}", schema.name, field.name);
                if let Some(target) = field.type_ref.as_ref().filter(|_| !field.ty.takes_ref()) {
                    return Err(RegistryError::UnexpectedReference {
                        owner: owner(),
                        ty: field.ty.as_str(),
                        target: target.clone(),
                    });
                }
                match (field.ty, &field.type_ref) {
                    (FieldType::Enum, Some(target)) if !self.enums.contains_key(target) => {
                        return Err(missing(&owner(), "enum", target));
                    }
                    (FieldType::Message, Some(target)) if !self.messages.contains_key(target) => {
                        return Err(missing(&owner(), "message", target));
                    }
                    (FieldType::Message, None) => {
                        return Err(missing(&owner(), "message", ""));
                    }
                    _ => {}
                }
                if let Some(size_field) = field.compressed_size_field {
                    if schema.position(size_field).is_none() {
                        return Err(missing(&owner(), "field", &size_field.to_string()));
                    }
                }
            }
        }
        for layout in self.layouts.values() {
            for field in &layout.fields {
                if let Some(target) = &field.type_ref {
                    if !self.enums.contains_key(target) {
                        return Err(missing(
                            &format!("{}.{}", layout.name, field.name),
                            "enum",
                            target,
                        ));
                    }
                }
            }
        }
        for entry in self.emsgs.values() {
            match &entry.body {
                BodyBinding::Message(target) if !self.messages.contains_key(target) => {
                    return Err(missing(&entry.name, "message", target));
                }
                BodyBinding::Layout(target) if !self.layouts.contains_key(target) => {
                    return Err(missing(&entry.name, "layout", target));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn emsg_name(&self, emsg: u32) -> Option<&str> {
        self.emsgs.get(&emsg).map(|e| e.name.as_str())
    }

    /// Name of the schema or layout bound to a message type.
    pub fn inner_type_name(&self, emsg: u32) -> Option<&str> {
        match &self.emsgs.get(&emsg)?.body {
            BodyBinding::Message(name) | BodyBinding::Layout(name) => Some(name),
            BodyBinding::None => None,
        }
    }

    pub fn message(&self, name: &str) -> Option<&MessageSchema> {
        self.messages.get(name)
    }

    /// Selects how to decode the body of `emsg`. A binding whose target is
    /// missing (an unvalidated registry) is treated as unrecognized.
    pub fn strategy(&self, emsg: u32) -> Strategy<'_> {
        let Some(entry) = self.emsgs.get(&emsg) else {
            return Strategy::Unrecognized;
        };
        match &entry.body {
            BodyBinding::Message(name) => self
                .messages
                .get(name)
                .map_or(Strategy::Unrecognized, Strategy::Schema),
            BodyBinding::Layout(name) => self
                .layouts
                .get(name)
                .map_or(Strategy::Unrecognized, Strategy::Flat),
            BodyBinding::None => Strategy::Unrecognized,
        }
    }

    /// Resolves an enum value name, if the enum and the value are known.
    pub fn enum_name(&self, enum_name: Option<&str>, value: i64) -> Option<String> {
        self.enums
            .get(enum_name?)?
            .name_of(value)
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Registry {
        let mut reg = Registry::new("test-1");
        reg.insert_message(MessageSchema::new(
            "CMsgPing",
            vec![FieldSchema::new(1, "value", FieldType::Uint32)],
        ))
        .unwrap();
        let body = BodyBinding::Message("CMsgPing".into());
        reg.insert_emsg(EmsgEntry::new(10, "Ping", body)).unwrap();
        reg.insert_emsg(EmsgEntry::new(11, "Pong", BodyBinding::None))
            .unwrap();
        reg
    }

    #[test]
    fn strategy_lookup() {
        let reg = small();
        assert!(matches!(reg.strategy(10), Strategy::Schema(s) if s.name == "CMsgPing"));
        assert_eq!(reg.strategy(11), Strategy::Unrecognized);
        assert_eq!(reg.strategy(9999), Strategy::Unrecognized);
        assert_eq!(reg.emsg_name(11), Some("Pong"));
        assert_eq!(reg.inner_type_name(10), Some("CMsgPing"));
        assert_eq!(reg.inner_type_name(11), None);
    }

    #[test]
    fn rejects_duplicates() {
        let mut reg = small();
        assert!(matches!(
            reg.insert_emsg(EmsgEntry::new(10, "Again", BodyBinding::None)),
            Err(RegistryError::DuplicateEmsg(10))
        ));
        let err = reg
            .insert_message(MessageSchema::new(
                "CMsgDup",
                vec![
                    FieldSchema::new(1, "a", FieldType::Bool),
                    FieldSchema::new(1, "b", FieldType::Bool),
                ],
            ))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "message `CMsgDup` declares field number 1 twice"
        );
    }

    #[test]
    fn validate_catches_dangling_message_ref() {
        let mut reg = small();
        let body = BodyBinding::Message("CMsgMissing".into());
        reg.insert_emsg(EmsgEntry::new(12, "Broken", body)).unwrap();
        let err = reg.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "`Broken` references unknown message `CMsgMissing`"
        );
        assert_eq!(reg.strategy(12), Strategy::Unrecognized);
    }

    #[test]
    fn validate_rejects_ref_on_scalar_field() {
        let mut reg = small();
        reg.insert_message(MessageSchema::new(
            "CMsgOdd",
            vec![FieldSchema::new(1, "count", FieldType::Uint32).with_ref("CMsgPing")],
        ))
        .unwrap();
        let err = reg.validate().unwrap_err();
        assert!(matches!(
            &err,
            RegistryError::UnexpectedReference { ty: "uint32", target, .. } if target == "CMsgPing"
        ));
        assert_eq!(
            err.to_string(),
            "`CMsgOdd.count` is a uint32 field and cannot reference `CMsgPing`"
        );
    }

    #[test]
    fn validate_reports_first_dangling_emsg_in_insertion_order() {
        let mut reg = small();
        for (id, target) in [(30, "CMsgFirst"), (20, "CMsgSecond"), (40, "CMsgThird")] {
            let body = BodyBinding::Message(target.into());
            reg.insert_emsg(EmsgEntry::new(id, target, body)).unwrap();
        }
        for _ in 0..8 {
            let err = reg.clone().validate().unwrap_err();
            assert!(matches!(
                err,
                RegistryError::MissingReference { target, .. } if target == "CMsgFirst"
            ));
        }
    }

    #[test]
    fn builtin_registry_is_valid() {
        let reg = Registry::builtin().unwrap();
        assert!(!reg.version().is_empty());
        assert_eq!(reg.emsg_name(crate::emsg::MULTI), Some("Multi"));
        let multi = reg.strategy(crate::emsg::MULTI);
        assert!(matches!(multi, Strategy::Schema(_)));
        assert!(matches!(
            reg.strategy(crate::emsg::CHANNEL_ENCRYPT_REQUEST),
            Strategy::Flat(_)
        ));
        assert_eq!(reg.enum_name(Some("EResult"), 1), Some("OK".to_string()));
    }
}
