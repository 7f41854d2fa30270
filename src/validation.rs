//! Validation System - Template Layout Requirements
//!
//! The manifest decides which files and directories a template must contain.
//! Requirements are collected as `(path, requirement)` pairs, frozen into an
//! ordered registry, then checked against the filesystem in path order.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, trace};

use crate::layout::{
    COPY_DATA_DIR, IGNORE_DIR, INTEGRATION_SCRIPTS_DIR, MANIFEST_FILE, METADATA_DIR,
};
use crate::manifest::{BinaryPackage, IntegrationScriptsPackage, PackageVariant};
use crate::typed_path::TypedPath;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required path is missing: `{}`", .0.display())]
    PathMissing(PathBuf),

    #[error("Required file is a directory: `{}`", .0.display())]
    RequiredFileIsDirectory(PathBuf),

    #[error("Required directory is a file: `{}`", .0.display())]
    RequiredDirIsFile(PathBuf),

    #[error("Unregistered binary was referenced: `{0}`")]
    UnregisteredBinaryReferenced(String),

    #[error("Path escapes its package directory: `{0}`")]
    PathEscapesTemplate(String),

    #[error("Could not stat `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRequirement {
    RequiredFile,
    RequiredDir,
    /// Excluded from every check.
    Masked,
}

/// Collects requirements for one template. Later entries for the same path
/// replace earlier ones when the registry is built.
#[derive(Debug)]
pub struct RequirementsBuilder {
    root: PathBuf,
    entries: Vec<(PathBuf, PathRequirement)>,
}

impl RequirementsBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            entries: vec![(root.clone(), PathRequirement::RequiredDir)],
            root,
        }
    }

    pub fn mask(&mut self, path: impl AsRef<Path>) {
        self.push(path.as_ref(), PathRequirement::Masked);
    }

    pub fn require_dir(&mut self, path: impl AsRef<Path>) {
        self.push(path.as_ref(), PathRequirement::RequiredDir);
    }

    pub fn require_file(&mut self, path: impl AsRef<Path>) {
        self.push(path.as_ref(), PathRequirement::RequiredFile);
    }

    fn push(&mut self, path: &Path, requirement: PathRequirement) {
        let path = self.root.join(path);
        debug!(path = %path.display(), ?requirement, "registered path requirement");
        self.entries.push((path, requirement));
    }

    pub fn build(self) -> RequirementRegistry {
        RequirementRegistry {
            entries: self.entries.into_iter().collect(),
        }
    }
}

/// Final requirement per path, ordered by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirementRegistry {
    entries: BTreeMap<PathBuf, PathRequirement>,
}

impl RequirementRegistry {
    pub fn get(&self, path: &Path) -> Option<PathRequirement> {
        self.entries.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, PathRequirement)> {
        self.entries.iter().map(|(path, req)| (path.as_path(), *req))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check every non-masked entry in path order; the first failure aborts.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (path, requirement) in self.iter() {
            if requirement == PathRequirement::Masked {
                trace!(path = %path.display(), "skipping masked path");
                continue;
            }
            check_path(path, requirement)?;
        }
        Ok(())
    }
}

fn check_path(path: &Path, requirement: PathRequirement) -> Result<(), ValidationError> {
    let metadata = fs::metadata(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ValidationError::PathMissing(path.to_path_buf())
        } else {
            ValidationError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    match requirement {
        PathRequirement::RequiredFile if metadata.is_dir() => {
            Err(ValidationError::RequiredFileIsDirectory(path.to_path_buf()))
        }
        PathRequirement::RequiredDir if !metadata.is_dir() => {
            Err(ValidationError::RequiredDirIsFile(path.to_path_buf()))
        }
        _ => Ok(()),
    }
}

/// Validator for one template, derived from its parsed manifest.
#[derive(Debug)]
pub struct Validator {
    registry: RequirementRegistry,
}

impl Validator {
    /// Run the manifest-internal checks and derive the path requirements.
    /// Nothing on disk is touched until [`Validator::validate`].
    pub fn for_package(root: &Path, package: &PackageVariant) -> Result<Self, ValidationError> {
        let mut builder = RequirementsBuilder::new(root);
        builder.require_dir(METADATA_DIR);
        builder.require_file(MANIFEST_FILE);
        builder.mask(IGNORE_DIR);

        match package {
            PackageVariant::Binary(package) => binary_requirements(&mut builder, package)?,
            PackageVariant::IntegrationScripts(package) => {
                integration_scripts_requirements(&mut builder, package)?
            }
        }

        Ok(Self {
            registry: builder.build(),
        })
    }

    pub fn registry(&self) -> &RequirementRegistry {
        &self.registry
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.registry.validate()
    }
}

fn binary_requirements(
    builder: &mut RequirementsBuilder,
    package: &BinaryPackage,
) -> Result<(), ValidationError> {
    for binary in package.bin_shell_exe.values() {
        if !package.bin_registry.contains_key(binary) {
            return Err(ValidationError::UnregisteredBinaryReferenced(binary.clone()));
        }
    }

    builder.require_dir(COPY_DATA_DIR);
    for path in package.bin_registry.values().filter(|p| p.is_local()) {
        builder.require_file(Path::new(COPY_DATA_DIR).join(local_path(path)?));
    }
    Ok(())
}

fn integration_scripts_requirements(
    builder: &mut RequirementsBuilder,
    package: &IntegrationScriptsPackage,
) -> Result<(), ValidationError> {
    builder.require_dir(INTEGRATION_SCRIPTS_DIR);

    let scripts = std::iter::once(&package.detection_script)
        .chain(package.capability_scripts.iter().map(|script| &script.path));
    for path in scripts.filter(|p| p.is_local()) {
        builder.require_file(Path::new(INTEGRATION_SCRIPTS_DIR).join(local_path(path)?));
    }
    Ok(())
}

/// A local path must stay inside the directory it resolves against.
fn local_path(path: &TypedPath) -> Result<&Path, ValidationError> {
    let relative = Path::new(&path.path);
    let contained = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if contained {
        Ok(relative)
    } else {
        Err(ValidationError::PathEscapesTemplate(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn binary_package(registry: &[(&str, &str)], shell: &[(&str, &str)]) -> PackageVariant {
        PackageVariant::Binary(BinaryPackage {
            arch: BTreeMap::new(),
            about: BTreeMap::new(),
            bin_registry: registry
                .iter()
                .map(|(id, path)| (id.to_string(), TypedPath::local(*path)))
                .collect(),
            bin_shell_exe: shell
                .iter()
                .map(|(name, id)| (name.to_string(), id.to_string()))
                .collect(),
        })
    }

    fn binary_template() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("metadata")).unwrap();
        fs::create_dir_all(dir.path().join("cpdata")).unwrap();
        fs::write(dir.path().join("metadata/manifest.json"), "{}").unwrap();
        fs::write(dir.path().join("cpdata/app"), "#!/bin/sh\n").unwrap();
        dir
    }

    #[test]
    fn test_builder_last_write_wins() {
        let mut builder = RequirementsBuilder::new("/tmpl");
        builder.require_file("x");
        builder.require_dir("x");
        builder.mask("x");
        let registry = builder.build();

        assert_eq!(registry.get(Path::new("/tmpl/x")), Some(PathRequirement::Masked));
        assert_eq!(registry.get(Path::new("/tmpl")), Some(PathRequirement::RequiredDir));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_ordered_by_path() {
        let mut builder = RequirementsBuilder::new("/tmpl");
        builder.require_file("b");
        builder.require_file("a");
        let paths: Vec<_> = builder.build().iter().map(|(p, _)| p.to_path_buf()).collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/tmpl"), PathBuf::from("/tmpl/a"), PathBuf::from("/tmpl/b")]
        );
    }

    #[test]
    fn test_binary_requirements() {
        let package = binary_package(&[("app", "app")], &[("app", "app")]);
        let validator = Validator::for_package(Path::new("/tmpl"), &package).unwrap();
        let registry = validator.registry();

        assert_eq!(registry.get(Path::new("/tmpl/cpdata")), Some(PathRequirement::RequiredDir));
        assert_eq!(
            registry.get(Path::new("/tmpl/cpdata/app")),
            Some(PathRequirement::RequiredFile)
        );
        assert_eq!(registry.get(Path::new("/tmpl/.ignore")), Some(PathRequirement::Masked));
        assert_eq!(
            registry.get(Path::new("/tmpl/metadata/manifest.json")),
            Some(PathRequirement::RequiredFile)
        );
    }

    #[test]
    fn test_valid_binary_template() {
        let dir = binary_template();
        let package = binary_package(&[("app", "app")], &[("app", "app")]);
        Validator::for_package(dir.path(), &package)
            .unwrap()
            .validate()
            .unwrap();
    }

    #[test]
    fn test_unregistered_binary_is_semantic() {
        // Fails before any filesystem access: the root does not even exist.
        let package = binary_package(&[("app", "app")], &[("tool", "tool")]);
        let err = Validator::for_package(Path::new("/does/not/exist"), &package).unwrap_err();
        assert!(matches!(err, ValidationError::UnregisteredBinaryReferenced(ref b) if b == "tool"));
    }

    #[test]
    fn test_missing_registry_file() {
        let dir = binary_template();
        let package = binary_package(&[("app", "app"), ("other", "other")], &[]);
        let err = Validator::for_package(dir.path(), &package)
            .unwrap()
            .validate()
            .unwrap_err();
        match err {
            ValidationError::PathMissing(path) => assert_eq!(path, dir.path().join("cpdata/other")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_required_file_is_directory() {
        let dir = binary_template();
        fs::create_dir(dir.path().join("cpdata/tool")).unwrap();
        let package = binary_package(&[("tool", "tool")], &[]);
        let err = Validator::for_package(dir.path(), &package)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::RequiredFileIsDirectory(ref p) if p.ends_with("cpdata/tool")));
    }

    #[test]
    fn test_required_dir_is_file() {
        let dir = binary_template();
        fs::remove_file(dir.path().join("cpdata/app")).unwrap();
        fs::remove_dir(dir.path().join("cpdata")).unwrap();
        fs::write(dir.path().join("cpdata"), "not a dir").unwrap();
        let package = binary_package(&[], &[]);
        let err = Validator::for_package(dir.path(), &package)
            .unwrap()
            .validate()
            .unwrap_err();
        assert!(matches!(err, ValidationError::RequiredDirIsFile(ref p) if p.ends_with("cpdata")));
    }

    #[test]
    fn test_masked_path_never_checked() {
        let dir = binary_template();
        let mut builder = RequirementsBuilder::new(dir.path());
        builder.require_file(".ignore/missing");
        builder.mask(".ignore/missing");
        builder.build().validate().unwrap();
    }

    #[test]
    fn test_escaping_local_path() {
        let package = binary_package(&[("app", "../../etc/passwd")], &[]);
        let err = Validator::for_package(Path::new("/tmpl"), &package).unwrap_err();
        assert!(matches!(err, ValidationError::PathEscapesTemplate(ref p) if p == "local:../../etc/passwd"));
    }

    #[test]
    fn test_integration_scripts_requirements() {
        let package = PackageVariant::IntegrationScripts(IntegrationScriptsPackage {
            target_name: "bash".to_string(),
            target_type: "shell".to_string(),
            detection_script: TypedPath::local("detect.sh"),
            capability_scripts: vec![crate::manifest::CapabilityScript {
                capability: "path".to_string(),
                path: TypedPath::local("caps/path.sh"),
            }],
        });
        let validator = Validator::for_package(Path::new("/tmpl"), &package).unwrap();
        let registry = validator.registry();

        assert_eq!(registry.get(Path::new("/tmpl/iscripts")), Some(PathRequirement::RequiredDir));
        assert_eq!(
            registry.get(Path::new("/tmpl/iscripts/detect.sh")),
            Some(PathRequirement::RequiredFile)
        );
        assert_eq!(
            registry.get(Path::new("/tmpl/iscripts/caps/path.sh")),
            Some(PathRequirement::RequiredFile)
        );
        assert_eq!(registry.get(Path::new("/tmpl/cpdata")), None);
    }
}
