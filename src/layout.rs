//! Template Layout - Fixed Directory Names
//!
//! Every template shares the same top-level layout. These names are part of
//! the package format, so they are constants rather than configuration.

/// Package metadata; archived through the metadata transform.
pub const METADATA_DIR: &str = "metadata";

/// Scratch space excluded from validation and from the archive.
pub const IGNORE_DIR: &str = ".ignore";

/// Files copied verbatim on install (binary packages).
pub const COPY_DATA_DIR: &str = "cpdata";

/// Scripts for integration-scripts packages.
pub const INTEGRATION_SCRIPTS_DIR: &str = "iscripts";

pub const MANIFEST_FILE: &str = "metadata/manifest.json";

/// Directory of files synthesized by the compiler inside the archive.
pub const GENERATED_DIR: &str = "metadata/raftpmGen";

pub const EXECUTABLE_FILES_MEMBER: &str = "metadata/raftpmGen/executableFiles";

/// Base64 JSON object mapping member names to their comments.
pub const MEMBER_COMMENTS_MEMBER: &str = "metadata/raftpmGen/memberComments";

/// Archive member name of the transformed manifest.
pub const MANIFEST_MEMBER: &str = "metadata/manifest";

pub const ARCHIVE_COMMENT: &str = "raftpm package";

pub const METADATA_COMMENT: &str = "package metadata";
