//! Input selection: a bare `export.xml` or the `export.zip` the phone produces

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use super::ExportParser;
use crate::error::{HealthError, Result};

/// File name of the export document inside the archive
pub const EXPORT_MEMBER_NAME: &str = "export.xml";

const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// An export on disk, either the raw document or a single-document archive
pub enum ExportSource {
    Document {
        path: PathBuf,
    },
    Archive {
        path: PathBuf,
        archive: ZipArchive<BufReader<File>>,
        member: String,
    },
}

impl ExportSource {
    /// Open an export, detecting archives by their signature rather than extension
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;

        if !starts_with_zip_magic(&mut file)? {
            return Ok(Self::Document {
                path: path.to_path_buf(),
            });
        }

        file.seek(SeekFrom::Start(0))?;
        let archive = ZipArchive::new(BufReader::new(file))?;
        let member = find_export_member(archive.file_names())?;
        tracing::debug!(archive = %path.display(), %member, "Selected export member");

        Ok(Self::Archive {
            path: path.to_path_buf(),
            archive,
            member,
        })
    }

    /// Start a fresh parse of the export document
    pub fn entries(&mut self) -> Result<ExportParser<Box<dyn BufRead + '_>>> {
        let reader: Box<dyn BufRead + '_> = match self {
            Self::Document { path } => {
                Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, File::open(path)?))
            }
            Self::Archive {
                archive, member, ..
            } => Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                archive.by_name(member)?,
            )),
        };
        Ok(ExportParser::new(reader))
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Archive { .. })
    }

    /// Human readable location, `archive.zip!member` for archives
    pub fn describe(&self) -> String {
        match self {
            Self::Document { path } => path.display().to_string(),
            Self::Archive { path, member, .. } => format!("{}!{}", path.display(), member),
        }
    }
}

fn starts_with_zip_magic(file: &mut File) -> Result<bool> {
    let mut magic = [0u8; 4];
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == ZIP_MAGIC),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Pick the single `export.xml` member, ignoring directories and macOS resource forks
fn find_export_member<'a>(names: impl Iterator<Item = &'a str>) -> Result<String> {
    let candidates: Vec<&str> = names
        .filter(|name| !name.starts_with("__MACOSX/"))
        .filter(|name| name.rsplit('/').next() == Some(EXPORT_MEMBER_NAME))
        .collect();

    match candidates.as_slice() {
        [member] => Ok((*member).to_string()),
        [] => Err(HealthError::archive(format!(
            "no {} found in archive",
            EXPORT_MEMBER_NAME
        ))),
        many => Err(HealthError::archive(format!(
            "{} candidate export documents in archive: {}",
            many.len(),
            many.join(", ")
        ))),
    }
}
