//! raftpm Core - Package Compiler
//!
//! Turns a template directory into a portable package archive:
//! 1. Parse `metadata/manifest.json`
//! 2. Validate the template layout the manifest demands
//! 3. Walk the tree, transform metadata, pack everything into a zip

pub mod typed_path;
pub mod manifest;
pub mod layout;
pub mod validation;
pub mod encoding;
pub mod archive;
pub mod pipeline;
pub mod inspect;

pub use typed_path::{PathError, PathKind, TypedPath};
pub use manifest::{
    BinaryPackage, CapabilityScript, IntegrationScriptsPackage, Manifest, ManifestError,
    ManifestHeader, PackageVariant,
};
pub use validation::{
    PathRequirement, RequirementRegistry, RequirementsBuilder, ValidationError, Validator,
};
pub use encoding::{compact_json, decode_metadata, encode_metadata, sha256_hex};
pub use archive::{ArchiveError, ArchiveWriter, FileEntry, ZipArchiveWriter};
pub use pipeline::{compile_template, CompileError, CompiledPackage, TemplateCompiler};
pub use inspect::{inspect_package, InspectError, PackageInfo};

pub const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");
