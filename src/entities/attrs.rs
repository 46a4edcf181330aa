//! Schema-backed attribute storage for nodes.
//!
//! An [`AttrSchema`] lists every attribute a node type declares, its type
//! and flags. `Attrs::set()` uses the schema to reject mistyped values and
//! to report whether the change must propagate through the dependency
//! graph (`FLAG_DAG`). Values serialize as a plain key → value map; the
//! schema is re-attached after loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use log::warn;

/// Affects computed outputs: changing it dirties dependents
pub const FLAG_DAG: u8 = 1 << 0;
/// Shown in attribute editors
pub const FLAG_DISPLAY: u8 = 1 << 1;
/// Can be keyframed
pub const FLAG_KEYABLE: u8 = 1 << 2;
/// Not user-editable
pub const FLAG_READONLY: u8 = 1 << 3;
/// Saved with the scene
pub const FLAG_STORABLE: u8 = 1 << 4;

/// Attribute value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrType {
    Bool,
    Int,
    Double,
    String,
}

/// Attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i32),
    Double(f64),
    Str(String),
}

impl AttrValue {
    pub fn attr_type(&self) -> AttrType {
        match self {
            AttrValue::Bool(_) => AttrType::Bool,
            AttrValue::Int(_) => AttrType::Int,
            AttrValue::Double(_) => AttrType::Double,
            AttrValue::Str(_) => AttrType::String,
        }
    }

    /// Widen Int to Double where the schema asks for it.
    fn coerce(self, ty: AttrType) -> Option<AttrValue> {
        match (self, ty) {
            (AttrValue::Int(v), AttrType::Double) => Some(AttrValue::Double(v as f64)),
            (v, ty) if v.attr_type() == ty => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Double(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(v) => write!(f, "{}", v),
            AttrValue::Int(v) => write!(f, "{}", v),
            AttrValue::Double(v) => write!(f, "{}", v),
            AttrValue::Str(v) => write!(f, "{:?}", v),
        }
    }
}

/// Declaration of a single attribute.
#[derive(Debug, Clone, Copy)]
pub struct AttrDef {
    pub name: &'static str,
    pub ty: AttrType,
    pub flags: u8,
}

impl AttrDef {
    pub const fn new(name: &'static str, ty: AttrType, flags: u8) -> Self {
        Self { name, ty, flags }
    }

    pub fn is_dag(&self) -> bool {
        self.flags & FLAG_DAG != 0
    }

    pub fn is_storable(&self) -> bool {
        self.flags & FLAG_STORABLE != 0
    }

    pub fn is_readonly(&self) -> bool {
        self.flags & FLAG_READONLY != 0
    }
}

/// Static attribute table for a node type.
#[derive(Debug)]
pub struct AttrSchema {
    pub name: &'static str,
    pub defs: &'static [AttrDef],
}

impl AttrSchema {
    pub const fn new(name: &'static str, defs: &'static [AttrDef]) -> Self {
        Self { name, defs }
    }

    pub fn get(&self, key: &str) -> Option<&AttrDef> {
        self.defs.iter().find(|d| d.name == key)
    }
}

/// Result of `Attrs::set()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// Value stored and it feeds computed outputs.
    DirtyDependents,
    /// Value stored, nothing downstream cares.
    Stored,
    /// Same value as before.
    Unchanged,
    /// Unknown key or wrong type for the schema.
    Rejected,
}

impl SetOutcome {
    pub fn changed(self) -> bool {
        matches!(self, SetOutcome::DirtyDependents | SetOutcome::Stored)
    }
}

/// Attribute container: string key → typed value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Attrs {
    #[serde(flatten)]
    map: BTreeMap<String, AttrValue>,
    #[serde(skip)]
    schema: Option<&'static AttrSchema>,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: &'static AttrSchema) -> Self {
        Self {
            map: BTreeMap::new(),
            schema: Some(schema),
        }
    }

    /// Attach schema after deserialization, dropping entries it rejects.
    pub fn attach_schema(&mut self, schema: &'static AttrSchema) {
        self.schema = Some(schema);
        let map = std::mem::take(&mut self.map);
        for (key, value) in map {
            if self.set(key.clone(), value) == SetOutcome::Rejected {
                warn!("{}: dropping unknown or mistyped attribute '{}'", schema.name, key);
            }
        }
    }

    pub fn schema(&self) -> Option<&'static AttrSchema> {
        self.schema
    }

    pub fn set(&mut self, key: impl Into<String>, value: AttrValue) -> SetOutcome {
        let key = key.into();
        let (value, dag) = match self.schema {
            Some(schema) => {
                let Some(def) = schema.get(&key) else {
                    return SetOutcome::Rejected;
                };
                match value.coerce(def.ty) {
                    Some(v) => (v, def.is_dag()),
                    None => return SetOutcome::Rejected,
                }
            }
            None => (value, true),
        };
        if self.map.get(&key) == Some(&value) {
            return SetOutcome::Unchanged;
        }
        self.map.insert(key, value);
        if dag { SetOutcome::DirtyDependents } else { SetOutcome::Stored }
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.map.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.map.get(key) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.map.get(key) {
            Some(AttrValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.map.get(key) {
            Some(AttrValue::Double(v)) => Some(*v),
            Some(AttrValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.map.get(key) {
            Some(AttrValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get_str(key).unwrap_or(default)
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Copy limited to storable attributes (all of them without a schema).
    pub fn storable(&self) -> Attrs {
        let map = self
            .map
            .iter()
            .filter(|(k, _)| self.schema.and_then(|s| s.get(k)).map(|d| d.is_storable()).unwrap_or(true))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Attrs { map, schema: self.schema }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFS: &[AttrDef] = &[
        AttrDef::new("path", AttrType::String, FLAG_DAG | FLAG_STORABLE),
        AttrDef::new("time", AttrType::Double, FLAG_DAG | FLAG_STORABLE),
        AttrDef::new("label", AttrType::String, FLAG_DISPLAY),
    ];
    static SCHEMA: AttrSchema = AttrSchema::new("Test", DEFS);

    #[test]
    fn test_set_outcomes() {
        let mut attrs = Attrs::with_schema(&SCHEMA);
        assert_eq!(attrs.set("path", "a".into()), SetOutcome::DirtyDependents);
        assert_eq!(attrs.set("path", "a".into()), SetOutcome::Unchanged);
        assert_eq!(attrs.set("label", "x".into()), SetOutcome::Stored);
        assert_eq!(attrs.set("path", AttrValue::Int(1)), SetOutcome::Rejected);
        assert_eq!(attrs.set("nope", AttrValue::Int(1)), SetOutcome::Rejected);
    }

    #[test]
    fn test_int_widens_to_double() {
        let mut attrs = Attrs::with_schema(&SCHEMA);
        attrs.set("time", AttrValue::Int(2));
        assert_eq!(attrs.get("time"), Some(&AttrValue::Double(2.0)));
    }

    #[test]
    fn test_serde_keeps_only_storable() {
        let mut attrs = Attrs::with_schema(&SCHEMA);
        attrs.set("path", "scene.json".into());
        attrs.set("label", "ui".into());
        let json = serde_json::to_string(&attrs.storable()).unwrap();
        assert!(!json.contains("label"));

        let mut back: Attrs = serde_json::from_str(&json).unwrap();
        back.attach_schema(&SCHEMA);
        assert_eq!(back.get_str("path"), Some("scene.json"));
        assert_eq!(back.len(), 1);
    }
}
