/*! Readable files, on disk or inside an archive.

A [VirtualFile] is what the cache hands to readers: a plain downloaded file, a member of an
extracted tar archive, or a member of a zip archive that is only extracted on first open.
!*/
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use zip::ZipArchive;

use crate::error::Error;
use crate::io::textio::{wrap_reader, TextReader};

use super::lock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualFile {
    Plain(PathBuf),
    /// Member of a tar archive, extracted to `path`.
    Tar {
        archive: PathBuf,
        member: String,
        path: PathBuf,
    },
    /// Member of a zip archive, extracted to `dest` on first use.
    Zip {
        archive: PathBuf,
        member: String,
        dest: PathBuf,
        lock_timeout: Duration,
    },
}

fn basename(name: &str) -> String {
    name.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(name)
        .to_string()
}

/// Extracts a single zip member to `dest`.
pub(super) fn extract_zip_member(archive: &Path, member: &str, dest: &Path) -> Result<(), Error> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut entry = zip.by_name(member)?;
    if entry.enclosed_name().is_none() {
        return Err(Error::Format(format!(
            "{:?}: member {} escapes the extraction directory",
            archive, member
        )));
    }
    debug!("extracting {} from {:?}", member, archive);
    let mut out = File::create(dest)?;
    io::copy(&mut entry, &mut out)?;
    Ok(())
}

impl VirtualFile {
    /// File name used for format and compression detection.
    pub fn name(&self) -> String {
        match self {
            VirtualFile::Plain(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            VirtualFile::Tar { member, .. } | VirtualFile::Zip { member, .. } => basename(member),
        }
    }

    pub fn exists(&self) -> bool {
        match self {
            VirtualFile::Plain(path) | VirtualFile::Tar { path, .. } => path.exists(),
            VirtualFile::Zip {
                archive,
                member,
                dest,
                ..
            } => {
                lock::is_valid(dest)
                    || File::open(archive)
                        .ok()
                        .and_then(|f| ZipArchive::new(f).ok())
                        .map(|mut z| z.by_name(member).is_ok())
                        .unwrap_or(false)
            }
        }
    }

    /// Path of the file on disk, extracting it first if needed.
    pub fn materialize(&self) -> Result<PathBuf, Error> {
        match self {
            VirtualFile::Plain(path) | VirtualFile::Tar { path, .. } => Ok(path.clone()),
            VirtualFile::Zip {
                archive,
                member,
                dest,
                lock_timeout,
            } => {
                lock::ensure(dest, *lock_timeout, |dest| {
                    extract_zip_member(archive, member, dest)
                })?;
                Ok(dest.clone())
            }
        }
    }

    /// Opens the content for reading, decompressing `.gz` members.
    pub fn open_for_read(&self) -> Result<TextReader, Error> {
        let path = self.materialize()?;
        let file = File::open(&path)?;
        Ok(wrap_reader(file, &self.name()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use tempfile::tempdir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    use super::*;

    #[test]
    fn test_zip_member_lazy() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("data.zip");
        let mut zip = ZipWriter::new(File::create(&archive).unwrap());
        zip.start_file("corpus/train.en", FileOptions::default())
            .unwrap();
        zip.write_all(b"hello\n").unwrap();
        zip.finish().unwrap();

        let dest = dir.path().join("data").join("train.en");
        let vf = VirtualFile::Zip {
            archive,
            member: "corpus/train.en".to_string(),
            dest: dest.clone(),
            lock_timeout: Duration::from_secs(5),
        };
        assert_eq!(vf.name(), "train.en");
        assert!(vf.exists());
        assert!(!dest.exists());

        let mut content = String::new();
        vf.open_for_read()
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hello\n");
        assert!(lock::is_valid(&dest));
    }
}
