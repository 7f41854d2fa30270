//! Package Inspection - Reading Compiled Archives Back
//!
//! Decodes the metadata members of a compiled package and checks that the
//! generated executable listing matches the archive contents.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Read, Seek};
use thiserror::Error;
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::encoding::decode_metadata;
use crate::layout::{EXECUTABLE_FILES_MEMBER, MANIFEST_MEMBER, MEMBER_COMMENTS_MEMBER};
use crate::manifest::{Manifest, ManifestError};

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("Not a readable package archive: {0}")]
    Zip(#[from] ZipError),

    #[error("Package read error: {0}")]
    Io(#[from] io::Error),

    #[error("Package is missing member `{0}`")]
    MissingMember(String),

    #[error("Member `{member}` is not valid base64: {source}")]
    Decode {
        member: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Member `{0}` is not valid UTF-8")]
    NotUtf8(String),

    #[error("Member `{member}` is not a JSON string map: {source}")]
    InvalidJson {
        member: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Packaged manifest is invalid: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Executable `{0}` is listed but not packaged")]
    MissingExecutable(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageInfo {
    pub comment: String,
    pub manifest: Manifest,
    pub executables: Vec<String>,
    pub members: Vec<String>,
    /// Members tagged with a per-member comment.
    pub member_comments: BTreeMap<String, String>,
}

pub fn inspect_package<R: Read + Seek>(reader: R) -> Result<PackageInfo, InspectError> {
    let mut archive = ZipArchive::new(reader)?;
    let comment = String::from_utf8_lossy(archive.comment()).into_owned();
    let members: Vec<String> = archive.file_names().map(str::to_string).collect();

    let manifest = Manifest::parse(&read_metadata(&mut archive, MANIFEST_MEMBER)?)?;

    let listing = read_metadata(&mut archive, EXECUTABLE_FILES_MEMBER)?;
    let listing = String::from_utf8(listing)
        .map_err(|_| InspectError::NotUtf8(EXECUTABLE_FILES_MEMBER.to_string()))?;
    let executables: Vec<String> = listing
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if let Some(missing) = executables.iter().find(|exe| !members.contains(exe)) {
        return Err(InspectError::MissingExecutable(missing.clone()));
    }

    // Absent when no member carries a comment.
    let member_comments = match read_metadata(&mut archive, MEMBER_COMMENTS_MEMBER) {
        Ok(raw) => serde_json::from_slice(&raw).map_err(|source| InspectError::InvalidJson {
            member: MEMBER_COMMENTS_MEMBER.to_string(),
            source,
        })?,
        Err(InspectError::MissingMember(_)) => BTreeMap::new(),
        Err(err) => return Err(err),
    };

    debug!(
        name = %manifest.header.package_name,
        members = members.len(),
        "inspected package"
    );
    Ok(PackageInfo {
        comment,
        manifest,
        executables,
        members,
        member_comments,
    })
}

fn read_metadata<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    member: &str,
) -> Result<Vec<u8>, InspectError> {
    let mut file = match archive.by_name(member) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Err(InspectError::MissingMember(member.to_string())),
        Err(err) => return Err(err.into()),
    };

    let mut encoded = Vec::new();
    file.read_to_end(&mut encoded)?;
    decode_metadata(&encoded).map_err(|source| InspectError::Decode {
        member: member.to_string(),
        source,
    })
}
