//! Typed Paths - Resolution-Tagged File References
//!
//! Manifests never name files directly. Each reference carries a resolution
//! kind, written on the wire as `"<kind>:<path>"` (e.g. `"local:bin/app"`).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Malformed typed path `{0}`: expected `<kind>:<path>`")]
    MalformedPath(String),

    #[error("Unknown path kind `{0}`")]
    UnknownPathKind(String),
}

/// How a typed path is resolved when the package is built or installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathKind {
    /// Relative to a directory inside the package template.
    Local,
}

impl PathKind {
    pub const ALL: [PathKind; 1] = [PathKind::Local];

    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::Local => "local",
        }
    }
}

impl FromStr for PathKind {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PathError::UnknownPathKind(s.to_string()))
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedPath {
    pub kind: PathKind,
    pub path: String,
}

impl TypedPath {
    pub fn new(kind: PathKind, path: impl Into<String>) -> Self {
        Self { kind, path: path.into() }
    }

    pub fn local(path: impl Into<String>) -> Self {
        Self::new(PathKind::Local, path)
    }

    /// Parse the wire form. Only the first `:` separates kind from path,
    /// so the path itself may contain colons.
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let (kind, path) = s
            .split_once(':')
            .ok_or_else(|| PathError::MalformedPath(s.to_string()))?;
        Ok(Self {
            kind: kind.parse()?,
            path: path.to_string(),
        })
    }

    pub fn is_local(&self) -> bool {
        self.kind == PathKind::Local
    }
}

impl FromStr for TypedPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TypedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.path)
    }
}

impl Serialize for TypedPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypedPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TypedPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}
