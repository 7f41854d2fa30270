//! Archive Writer - Container Format Abstraction
//!
//! The compiler only sees [`ArchiveWriter`]. The zip backend is the current
//! container; swapping it must not touch the walk or the transforms.

use std::collections::BTreeMap;
use std::io::{self, Seek, Write};
use thiserror::Error;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::encoding::encode_metadata;
use crate::layout::MEMBER_COMMENTS_MEMBER;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Archive format error: {0}")]
    Zip(#[from] ZipError),

    #[error("Archive write error: {0}")]
    Io(#[from] io::Error),

    #[error("Couldn't encode member comments: {0}")]
    Comments(#[source] serde_json::Error),
}

/// One file member, consumed immediately by the writer.
#[derive(Debug, Clone, Copy)]
pub struct FileEntry<'a> {
    pub name: &'a str,
    /// POSIX permission bits copied from the source file.
    pub mode: Option<u32>,
    pub comment: Option<&'a str>,
    pub contents: &'a [u8],
}

pub trait ArchiveWriter {
    fn set_comment(&mut self, comment: &str);

    /// Add a directory member. A trailing `/` is optional.
    fn add_directory(&mut self, name: &str) -> Result<(), ArchiveError>;

    fn add_file(&mut self, entry: &FileEntry<'_>) -> Result<(), ArchiveError>;

    /// Flush and close the container.
    fn finalize(self) -> Result<(), ArchiveError>
    where
        Self: Sized;
}

/// Zip-compatible container.
///
/// The zip writer has no per-member comment slot and the archive comment is
/// capped at 64 KiB, so member comments are collected and written on
/// finalize as one metadata member: a base64-encoded JSON object mapping
/// member name to comment.
pub struct ZipArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    member_comments: BTreeMap<String, String>,
}

impl<W: Write + Seek> ZipArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            zip: ZipWriter::new(sink),
            member_comments: BTreeMap::new(),
        }
    }

    fn options(mode: Option<u32>) -> SimpleFileOptions {
        // Fixed timestamps keep archives of the same tree identical.
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        match mode {
            Some(mode) => options.unix_permissions(mode),
            None => options,
        }
    }

    fn write_member_comments(&mut self) -> Result<(), ArchiveError> {
        if self.member_comments.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_vec(&self.member_comments).map_err(ArchiveError::Comments)?;
        let encoded = encode_metadata(&json, false).map_err(ArchiveError::Comments)?;
        self.zip
            .start_file(MEMBER_COMMENTS_MEMBER.to_string(), Self::options(None))?;
        self.zip.write_all(&encoded)?;
        Ok(())
    }
}

impl<W: Write + Seek> ArchiveWriter for ZipArchiveWriter<W> {
    fn set_comment(&mut self, comment: &str) {
        self.zip.set_comment(comment.to_string());
    }

    fn add_directory(&mut self, name: &str) -> Result<(), ArchiveError> {
        let name = format!("{}/", name.trim_end_matches('/'));
        self.zip.add_directory(name, Self::options(None))?;
        Ok(())
    }

    fn add_file(&mut self, entry: &FileEntry<'_>) -> Result<(), ArchiveError> {
        self.zip
            .start_file(entry.name.to_string(), Self::options(entry.mode))?;
        self.zip.write_all(entry.contents)?;
        if let Some(comment) = entry.comment {
            self.member_comments
                .insert(entry.name.to_string(), comment.to_string());
        }
        Ok(())
    }

    fn finalize(mut self) -> Result<(), ArchiveError> {
        self.write_member_comments()?;
        self.zip.finish()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::decode_metadata;
    use std::io::{Cursor, Read};
    use zip::ZipArchive;

    fn read_member(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
        let mut contents = Vec::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        contents
    }

    fn member_comments(archive: &mut ZipArchive<Cursor<Vec<u8>>>) -> BTreeMap<String, String> {
        let encoded = read_member(archive, MEMBER_COMMENTS_MEMBER);
        serde_json::from_slice(&decode_metadata(&encoded).unwrap()).unwrap()
    }

    #[test]
    fn test_zip_members_and_modes() {
        let mut sink = Cursor::new(Vec::new());
        let mut writer = ZipArchiveWriter::new(&mut sink);
        writer.set_comment("raftpm package");
        writer.add_directory("bin").unwrap();
        writer
            .add_file(&FileEntry {
                name: "bin/app",
                mode: Some(0o755),
                comment: None,
                contents: b"#!/bin/sh\n",
            })
            .unwrap();
        writer
            .add_file(&FileEntry {
                name: "metadata/manifest",
                mode: None,
                comment: Some("package metadata"),
                contents: b"e30=",
            })
            .unwrap();
        writer.finalize().unwrap();

        let mut archive = ZipArchive::new(Cursor::new(sink.into_inner())).unwrap();
        assert_eq!(archive.comment(), b"raftpm package");
        assert_eq!(
            member_comments(&mut archive),
            BTreeMap::from([("metadata/manifest".to_string(), "package metadata".to_string())])
        );

        assert!(archive.by_name("bin/").unwrap().is_dir());

        let mut app = archive.by_name("bin/app").unwrap();
        assert_eq!(app.unix_mode().unwrap() & 0o777, 0o755);
        let mut contents = String::new();
        app.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "#!/bin/sh\n");
    }

    #[test]
    fn test_member_names_with_separators_survive() {
        let names = ["metadata/a: b", "metadata/line\nbreak", "metadata/plain"];
        let mut sink = Cursor::new(Vec::new());
        let mut writer = ZipArchiveWriter::new(&mut sink);
        for name in names {
            writer
                .add_file(&FileEntry {
                    name,
                    mode: None,
                    comment: Some("note: with colon"),
                    contents: b"",
                })
                .unwrap();
        }
        writer.finalize().unwrap();

        let mut archive = ZipArchive::new(Cursor::new(sink.into_inner())).unwrap();
        let comments = member_comments(&mut archive);
        assert_eq!(comments.len(), 3);
        for name in names {
            assert_eq!(comments[name], "note: with colon");
        }
    }

    #[test]
    fn test_no_comments_member_without_comments() {
        let mut sink = Cursor::new(Vec::new());
        let mut writer = ZipArchiveWriter::new(&mut sink);
        writer.add_directory("a/b//").unwrap();
        writer.finalize().unwrap();

        let archive = ZipArchive::new(Cursor::new(sink.into_inner())).unwrap();
        let names: Vec<_> = archive.file_names().collect();
        assert_eq!(names, vec!["a/b/"]);
    }
}
