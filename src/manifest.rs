//! Manifest Model - Header + Kind-Specific Payload
//!
//! The manifest is read twice: once as an untyped JSON tree to pull out the
//! common header (which names the package kind), then structurally into the
//! payload shape that kind selects.

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::typed_path::{PathError, TypedPath};

pub const BINARY_PACKAGE_KIND: &str = "binPkg";
pub const INTEGRATION_SCRIPTS_PACKAGE_KIND: &str = "isPkg";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Manifest is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Manifest must be a JSON object, got {0}")]
    NotAnObject(JsonType),

    #[error("Expected field not found: `{0}`")]
    FieldMissing(String),

    #[error("Wrong type for field `{field}`: expected {expected}, got {actual}")]
    FieldTypeMismatch {
        field: String,
        expected: JsonType,
        actual: JsonType,
    },

    #[error("Invalid semantic version in `{field}`: `{raw}`")]
    InvalidVersion {
        field: String,
        raw: String,
        #[source]
        source: semver::Error,
    },

    #[error("Unknown package kind `{0}`")]
    UnknownPackageKind(String),

    #[error("Invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid typed path in `{field}` at `{key}`: {source}")]
    InvalidTypedPath {
        field: String,
        key: String,
        #[source]
        source: PathError,
    },
}

/// JSON value categories, used to report field type mismatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonType::Null,
            Value::Bool(_) => JsonType::Bool,
            Value::Number(_) => JsonType::Number,
            Value::String(_) => JsonType::String,
            Value::Array(_) => JsonType::Array,
            Value::Object(_) => JsonType::Object,
        }
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonType::Null => "null",
            JsonType::Bool => "bool",
            JsonType::Number => "number",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestHeader {
    #[serde(rename = "raftpmVersion")]
    pub tool_version: Version,
    #[serde(rename = "version")]
    pub package_version: Version,
    #[serde(rename = "name")]
    pub package_name: String,
    #[serde(rename = "type")]
    pub package_kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryPackage {
    pub arch: BTreeMap<String, Vec<String>>,
    pub about: BTreeMap<String, String>,
    /// Logical binary id -> file providing it.
    pub bin_registry: BTreeMap<String, TypedPath>,
    /// Shell-exposed executable name -> `bin_registry` id.
    pub bin_shell_exe: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityScript {
    pub capability: String,
    pub path: TypedPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationScriptsPackage {
    pub target_name: String,
    pub target_type: String,
    pub detection_script: TypedPath,
    pub capability_scripts: Vec<CapabilityScript>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PackageVariant {
    Binary(BinaryPackage),
    IntegrationScripts(IntegrationScriptsPackage),
}

impl PackageVariant {
    pub fn kind(&self) -> &'static str {
        match self {
            PackageVariant::Binary(_) => BINARY_PACKAGE_KIND,
            PackageVariant::IntegrationScripts(_) => INTEGRATION_SCRIPTS_PACKAGE_KIND,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub header: ManifestHeader,
    pub package: PackageVariant,
}

impl Manifest {
    /// Parse raw manifest bytes into the header and the kind-specific payload.
    pub fn parse(raw: &[u8]) -> Result<Self, ManifestError> {
        let value: Value = serde_json::from_slice(raw).map_err(ManifestError::InvalidJson)?;
        let object = value
            .as_object()
            .ok_or_else(|| ManifestError::NotAnObject(JsonType::of(&value)))?;

        let header = parse_header(object)?;
        let package = match header.package_kind.as_str() {
            BINARY_PACKAGE_KIND => PackageVariant::Binary(parse_binary_package(&value)?),
            INTEGRATION_SCRIPTS_PACKAGE_KIND => {
                PackageVariant::IntegrationScripts(parse_integration_scripts_package(&value)?)
            }
            other => return Err(ManifestError::UnknownPackageKind(other.to_string())),
        };

        Ok(Self { header, package })
    }
}

fn parse_header(object: &Map<String, Value>) -> Result<ManifestHeader, ManifestError> {
    Ok(ManifestHeader {
        tool_version: version_field(object, "raftpmVersion")?,
        package_version: version_field(object, "version")?,
        package_name: string_field(object, "name")?.to_string(),
        package_kind: string_field(object, "type")?.to_string(),
    })
}

/// Look up `name` and check its JSON type. `null` counts as missing.
fn field<'a>(
    object: &'a Map<String, Value>,
    name: &str,
    expected: JsonType,
) -> Result<&'a Value, ManifestError> {
    let value = match object.get(name) {
        None | Some(Value::Null) => return Err(ManifestError::FieldMissing(name.to_string())),
        Some(value) => value,
    };

    let actual = JsonType::of(value);
    if actual != expected {
        return Err(ManifestError::FieldTypeMismatch {
            field: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(value)
}

fn string_field<'a>(object: &'a Map<String, Value>, name: &str) -> Result<&'a str, ManifestError> {
    let value = field(object, name, JsonType::String)?;
    // field() already checked the type
    Ok(value.as_str().unwrap_or_default())
}

fn version_field(object: &Map<String, Value>, name: &str) -> Result<Version, ManifestError> {
    let raw = string_field(object, name)?;
    Version::parse(raw).map_err(|source| ManifestError::InvalidVersion {
        field: name.to_string(),
        raw: raw.to_string(),
        source,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBinaryPackage {
    arch: BTreeMap<String, Vec<String>>,
    about: BTreeMap<String, String>,
    bin_registry: BTreeMap<String, String>,
    bin_shell_exe: BTreeMap<String, String>,
}

fn parse_binary_package(value: &Value) -> Result<BinaryPackage, ManifestError> {
    let raw = RawBinaryPackage::deserialize(value).map_err(|source| {
        ManifestError::InvalidPayload {
            kind: BINARY_PACKAGE_KIND.to_string(),
            source,
        }
    })?;

    let bin_registry = raw
        .bin_registry
        .into_iter()
        .map(|(id, path)| -> Result<_, ManifestError> {
            let path = typed_path("binRegistry", id.clone(), &path)?;
            Ok((id, path))
        })
        .collect::<Result<_, ManifestError>>()?;

    Ok(BinaryPackage {
        arch: raw.arch,
        about: raw.about,
        bin_registry,
        bin_shell_exe: raw.bin_shell_exe,
    })
}

#[derive(Deserialize)]
struct RawCapabilityScript {
    capability: String,
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIntegrationScriptsPackage {
    target_name: String,
    target_type: String,
    detection_script: String,
    capability_scripts: Vec<RawCapabilityScript>,
}

fn parse_integration_scripts_package(
    value: &Value,
) -> Result<IntegrationScriptsPackage, ManifestError> {
    let raw = RawIntegrationScriptsPackage::deserialize(value).map_err(|source| {
        ManifestError::InvalidPayload {
            kind: INTEGRATION_SCRIPTS_PACKAGE_KIND.to_string(),
            source,
        }
    })?;

    let detection_script = typed_path(
        "detectionScript",
        "detectionScript".to_string(),
        &raw.detection_script,
    )?;
    let capability_scripts = raw
        .capability_scripts
        .into_iter()
        .map(|script| -> Result<_, ManifestError> {
            let path = typed_path("capabilityScripts", script.capability.clone(), &script.path)?;
            Ok(CapabilityScript {
                capability: script.capability,
                path,
            })
        })
        .collect::<Result<_, ManifestError>>()?;

    Ok(IntegrationScriptsPackage {
        target_name: raw.target_name,
        target_type: raw.target_type,
        detection_script,
        capability_scripts,
    })
}

fn typed_path(field: &str, key: String, raw: &str) -> Result<TypedPath, ManifestError> {
    TypedPath::parse(raw).map_err(|source| ManifestError::InvalidTypedPath {
        field: field.to_string(),
        key,
        source,
    })
}
