//! Compilation Pipeline - Template to Package Archive
//!
//! Phases run in a fixed order: read manifest, parse, validate, walk and
//! serialize, finalize. Any failure ends the call; nothing is rolled back.
//! The caller owns the output sink and removes it on failure.

use std::fs;
use std::io::{self, Seek, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

use crate::archive::{ArchiveError, ArchiveWriter, FileEntry, ZipArchiveWriter};
use crate::encoding::encode_metadata;
use crate::layout::{
    ARCHIVE_COMMENT, EXECUTABLE_FILES_MEMBER, GENERATED_DIR, IGNORE_DIR, MANIFEST_FILE,
    METADATA_COMMENT, METADATA_DIR,
};
use crate::manifest::{Manifest, ManifestError};
use crate::validation::{ValidationError, Validator};
use crate::TOOL_VERSION;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("I/O error at `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Couldn't parse manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Couldn't validate the template: {0}")]
    Validation(#[from] ValidationError),

    #[error("Template walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Metadata file `{}` is not valid JSON: {source}", path.display())]
    MetadataJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

/// What a successful walk wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledPackage {
    pub members: usize,
    /// Non-metadata files with an execute bit, in walk order.
    pub executables: Vec<String>,
}

/// Compile the template at `template_root` into a zip package on `sink`.
pub fn compile_template<W: Write + Seek>(
    template_root: &Path,
    sink: W,
) -> Result<(), CompileError> {
    let compiler = TemplateCompiler::new(template_root);
    let manifest = compiler.load_manifest()?;
    compiler.validate(&manifest)?;
    compiler.write_archive(ZipArchiveWriter::new(sink))?;
    Ok(())
}

pub struct TemplateCompiler {
    root: PathBuf,
}

impl TemplateCompiler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read and parse `metadata/manifest.json`.
    pub fn load_manifest(&self) -> Result<Manifest, CompileError> {
        let path = self.root.join(MANIFEST_FILE);
        let raw = fs::read(&path).map_err(|source| CompileError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest = Manifest::parse(&raw)?;

        info!(
            name = %manifest.header.package_name,
            version = %manifest.header.package_version,
            kind = manifest.package.kind(),
            "parsed manifest"
        );
        check_tool_version(&manifest.header.tool_version);
        Ok(manifest)
    }

    /// Check the template layout the manifest demands.
    pub fn validate(&self, manifest: &Manifest) -> Result<(), CompileError> {
        let validator = Validator::for_package(&self.root, &manifest.package)?;
        validator.validate()?;
        info!(
            root = %self.root.display(),
            requirements = validator.registry().len(),
            "validated template"
        );
        Ok(())
    }

    /// Walk the template into `writer` and finalize it. Expects a
    /// template that already passed [`TemplateCompiler::validate`].
    pub fn write_archive<A: ArchiveWriter>(
        &self,
        mut writer: A,
    ) -> Result<CompiledPackage, CompileError> {
        writer.set_comment(ARCHIVE_COMMENT);

        let mut package = CompiledPackage::default();
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let ignored = entry.depth() == 1 && entry.file_name() == IGNORE_DIR;
                if ignored {
                    trace!(path = %entry.path().display(), "skipping ignore directory");
                }
                !ignored
            });

        for entry in walker {
            let entry = entry?;
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            let name = member_name(relative);

            // Links are classified by their target but never descended.
            let is_dir = if entry.path_is_symlink() {
                fs::metadata(entry.path())
                    .map_err(|source| CompileError::Io {
                        path: entry.path().to_path_buf(),
                        source,
                    })?
                    .is_dir()
            } else {
                entry.file_type().is_dir()
            };

            if is_dir {
                debug!(member = %name, "adding directory");
                writer.add_directory(&name)?;
                package.members += 1;
                continue;
            }

            self.write_file(&mut writer, entry.path(), relative, &name, &mut package)?;
        }

        self.write_generated(&mut writer, &mut package)?;
        writer.finalize()?;

        info!(
            members = package.members,
            executables = package.executables.len(),
            "finalized package archive"
        );
        Ok(package)
    }

    fn write_file<A: ArchiveWriter>(
        &self,
        writer: &mut A,
        path: &Path,
        relative: &Path,
        name: &str,
        package: &mut CompiledPackage,
    ) -> Result<(), CompileError> {
        let io_error = |source| CompileError::Io {
            path: path.to_path_buf(),
            source,
        };
        let metadata = fs::metadata(path).map_err(io_error)?;
        let contents = fs::read(path).map_err(io_error)?;
        let mode = unix_mode(&metadata);

        let in_metadata_dir = root_dir(relative) == Some(METADATA_DIR);
        if in_metadata_dir {
            let is_json = relative.extension().is_some_and(|ext| ext == "json");
            let encoded = encode_metadata(&contents, is_json).map_err(|source| {
                CompileError::MetadataJson {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            let stripped = member_name(&relative.with_extension(""));

            debug!(member = %stripped, json = is_json, "adding metadata file");
            writer.add_file(&FileEntry {
                name: &stripped,
                mode,
                comment: Some(METADATA_COMMENT),
                contents: &encoded,
            })?;
        } else {
            if is_executable(mode) {
                package.executables.push(name.to_string());
            }

            debug!(member = %name, ?mode, "adding file");
            writer.add_file(&FileEntry {
                name,
                mode,
                comment: None,
                contents: &contents,
            })?;
        }

        package.members += 1;
        Ok(())
    }

    /// Synthesize `metadata/raftpmGen/executableFiles`.
    fn write_generated<A: ArchiveWriter>(
        &self,
        writer: &mut A,
        package: &mut CompiledPackage,
    ) -> Result<(), CompileError> {
        writer.add_directory(GENERATED_DIR)?;

        let listing = package.executables.join("\n");
        let encoded = encode_metadata(listing.trim_end_matches('\n').as_bytes(), false)
            .map_err(|source| CompileError::MetadataJson {
                path: PathBuf::from(EXECUTABLE_FILES_MEMBER),
                source,
            })?;
        writer.add_file(&FileEntry {
            name: EXECUTABLE_FILES_MEMBER,
            mode: None,
            comment: Some(METADATA_COMMENT),
            contents: &encoded,
        })?;

        package.members += 2;
        Ok(())
    }
}

/// A manifest written for a newer tool still compiles; the installer decides.
fn check_tool_version(required: &semver::Version) {
    match semver::Version::parse(TOOL_VERSION) {
        Ok(current) if current < *required => {
            warn!(%required, %current, "manifest targets a newer raftpm");
        }
        Ok(_) => {}
        Err(err) => warn!(%err, "invalid tool version"),
    }
}

/// Archive member name: `/`-separated regardless of platform.
fn member_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn root_dir(relative: &Path) -> Option<&str> {
    relative.components().next().and_then(|c| c.as_os_str().to_str())
}

#[cfg(unix)]
fn unix_mode(metadata: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &fs::Metadata) -> Option<u32> {
    None
}

/// Owner, group or other execute bit.
fn is_executable(mode: Option<u32>) -> bool {
    mode.is_some_and(|mode| mode & 0o111 != 0)
}
