//! Absolute prim paths (`/World/Geo`).
//!
//! Only the subset of path syntax the proxy needs: absolute paths made of
//! `/`-separated identifiers, with `/` itself naming the pseudo-root.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Absolute path to a prim in a composed stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrimPath(String);

impl PrimPath {
    /// The pseudo-root path `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Parse an absolute prim path. Trailing slashes are dropped.
    /// Returns None for relative paths, empty elements or invalid characters.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if !s.starts_with('/') {
            return None;
        }
        let trimmed = s.trim_end_matches('/');
        if trimmed.is_empty() {
            return Some(Self::root());
        }
        for elem in trimmed[1..].split('/') {
            if !is_identifier(elem) {
                return None;
            }
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Last path element, empty for the pseudo-root.
    pub fn name(&self) -> &str {
        if self.is_root() {
            return "";
        }
        self.0.rsplit('/').next().unwrap_or_default()
    }

    /// Parent path. The pseudo-root has no parent.
    pub fn parent(&self) -> Option<PrimPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append a child element.
    pub fn child(&self, name: &str) -> Option<PrimPath> {
        if !is_identifier(name) {
            return None;
        }
        if self.is_root() {
            Some(Self(format!("/{}", name)))
        } else {
            Some(Self(format!("{}/{}", self.0, name)))
        }
    }

    /// True if `self` equals `prefix` or lies beneath it.
    pub fn has_prefix(&self, prefix: &PrimPath) -> bool {
        if prefix.is_root() || self == prefix {
            return true;
        }
        self.0.starts_with(prefix.as_str()) && self.0.as_bytes().get(prefix.0.len()) == Some(&b'/')
    }

    /// Number of elements (0 for the pseudo-root).
    pub fn depth(&self) -> usize {
        if self.is_root() { 0 } else { self.0.matches('/').count() }
    }
}

fn is_identifier(elem: &str) -> bool {
    let mut chars = elem.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Default for PrimPath {
    fn default() -> Self {
        Self::root()
    }
}

impl fmt::Display for PrimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PrimPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PrimPath::parse(&value).ok_or_else(|| format!("Invalid prim path: {}", value))
    }
}

impl From<PrimPath> for String {
    fn from(p: PrimPath) -> Self {
        p.0
    }
}

/// Parse a list of paths, skipping (and logging) invalid entries.
pub fn parse_path_list<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<PrimPath> {
    let mut out = Vec::new();
    for item in items {
        if item.trim().is_empty() {
            continue;
        }
        match PrimPath::parse(item) {
            Some(p) => out.push(p),
            None => log::warn!("Ignoring invalid prim path: {:?}", item),
        }
    }
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert!(PrimPath::parse("/").unwrap().is_root());
        assert_eq!(PrimPath::parse("/World/Geo/").unwrap().as_str(), "/World/Geo");
        assert!(PrimPath::parse("World").is_none());
        assert!(PrimPath::parse("/World//Geo").is_none());
        assert!(PrimPath::parse("/9abc").is_none());
    }

    #[test]
    fn test_parent_and_prefix() {
        let p = PrimPath::parse("/World/Geo/Mesh").unwrap();
        assert_eq!(p.name(), "Mesh");
        assert_eq!(p.parent().unwrap().as_str(), "/World/Geo");
        assert_eq!(PrimPath::parse("/World").unwrap().parent(), Some(PrimPath::root()));
        assert!(p.has_prefix(&PrimPath::parse("/World").unwrap()));
        assert!(!PrimPath::parse("/WorldX").unwrap().has_prefix(&PrimPath::parse("/World").unwrap()));
        assert!(p.has_prefix(&PrimPath::root()));
        assert_eq!(p.depth(), 3);
    }

    #[test]
    fn test_path_list_dedup() {
        let list = parse_path_list(["/B", "/A", "bad", "", "/A"]);
        assert_eq!(list, vec![PrimPath::parse("/A").unwrap(), PrimPath::parse("/B").unwrap()]);
    }
}
