/*! Archive sniffing, listing and extraction.

Archives are recognised by content, not by extension. Zip archives are listed from their
central directory and members are extracted one by one when read. Tar archives (optionally
gzipped) can only be streamed, so they are extracted once as a whole.
!*/
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};

use flate2::read::MultiGzDecoder;
use glob::{MatchOptions, Pattern};
use log::{debug, info};
use tar::Archive;
use zip::ZipArchive;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

const TAR_MAGIC_OFFSET: usize = 257;
const TAR_MAGIC: &[u8] = b"ustar";

fn is_tar_header(block: &[u8]) -> bool {
    block.len() >= TAR_MAGIC_OFFSET + TAR_MAGIC.len()
        && &block[TAR_MAGIC_OFFSET..TAR_MAGIC_OFFSET + TAR_MAGIC.len()] == TAR_MAGIC
}

fn read_head<R: Read>(reader: R, len: usize) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// Detects the archive kind of a file from its first bytes.
pub fn sniff(path: &Path) -> Result<Option<ArchiveKind>, Error> {
    let head = read_head(File::open(path)?, 512)?;
    if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        return Ok(Some(ArchiveKind::Zip));
    }
    if is_tar_header(&head) {
        return Ok(Some(ArchiveKind::Tar));
    }
    if head.starts_with(&[0x1f, 0x8b]) {
        // a corrupt gzip stream is not our concern here, readers will report it
        let inner = read_head(MultiGzDecoder::new(File::open(path)?), 512).unwrap_or_default();
        if is_tar_header(&inner) {
            return Ok(Some(ArchiveKind::TarGz));
        }
    }
    Ok(None)
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Resolves each glob against `members`. Each must match exactly one member.
pub fn match_globs(members: &[String], globs: &[String]) -> Result<Vec<String>, Error> {
    let mut matched = Vec::with_capacity(globs.len());
    for glob in globs {
        let pattern = Pattern::new(glob)?;
        let hits: Vec<&String> = members
            .iter()
            .filter(|m| pattern.matches_with(m, match_options()))
            .collect();
        match hits.as_slice() {
            [one] => matched.push(one.to_string()),
            [] => return Err(Error::Format(format!("{glob} matches no archive member"))),
            many => {
                return Err(Error::Format(format!(
                    "{glob} is ambiguous, it matches {} archive members: {:?}",
                    many.len(),
                    many.iter().take(5).collect::<Vec<_>>()
                )))
            }
        }
    }
    Ok(matched)
}

/// File members of a zip archive, directories excluded.
pub fn zip_members(path: &Path) -> Result<Vec<String>, Error> {
    let zip = ZipArchive::new(File::open(path)?)?;
    Ok(zip
        .file_names()
        .filter(|n| !n.ends_with('/'))
        .map(String::from)
        .collect())
}

/// `true` if extracting `member` would stay inside the extraction directory.
pub fn is_enclosed(member: &Path) -> bool {
    member.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Extracts a whole tar archive into `dir`, refusing members that would escape it.
///
/// Returns the relative paths of the extracted files.
pub fn extract_tar(path: &Path, kind: ArchiveKind, dir: &Path) -> Result<Vec<String>, Error> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = match kind {
        ArchiveKind::TarGz => Box::new(MultiGzDecoder::new(file)),
        ArchiveKind::Tar => Box::new(file),
        ArchiveKind::Zip => {
            return Err(Error::Format(format!("{:?} is not a tar archive", path)))
        }
    };
    info!("extracting {:?} into {:?}", path, dir);
    std::fs::create_dir_all(dir)?;
    let mut archive = Archive::new(reader);
    let mut members = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.into_owned();
        if !is_enclosed(&member) {
            return Err(Error::Format(format!(
                "{:?}: member {:?} escapes the extraction directory",
                path, member
            )));
        }
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            debug!("skipping link {:?}", member);
            continue;
        }
        entry.unpack_in(dir)?;
        if entry_type.is_file() {
            members.push(member.to_string_lossy().into_owned());
        }
    }
    debug!("extracted {} files from {:?}", members.len(), path);
    Ok(members)
}

/// Relative paths of all files under `dir`.
pub fn list_extracted(dir: &Path) -> Result<Vec<String>, Error> {
    let pattern = format!("{}/**/*", Pattern::escape(&dir.to_string_lossy()));
    let mut members = Vec::new();
    for path in glob::glob(&pattern)? {
        let path = path.map_err(|e| Error::Io(e.into_error()))?;
        if path.is_file() {
            if let Ok(rel) = path.strip_prefix(dir) {
                members.push(rel.to_string_lossy().into_owned());
            }
        }
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    use super::*;

    fn members(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_match_globs() {
        let m = members(&[
            "training/europarl-v7.de-en.de",
            "training/europarl-v7.de-en.en",
            "training/europarl-v7.fr-en.en",
        ]);
        let found = match_globs(&m, &["*/*.de-en.de".to_string()]).unwrap();
        assert_eq!(found, vec!["training/europarl-v7.de-en.de"]);

        let ambiguous = match_globs(&m, &["training/*.en".to_string()]);
        assert!(matches!(ambiguous, Err(Error::Format(_))));

        let none = match_globs(&m, &["*.de".to_string()]);
        assert!(matches!(none, Err(Error::Format(_))));
    }

    #[test]
    fn test_sniff() {
        let dir = tempdir().unwrap();

        let zip_path = dir.path().join("a.bin");
        let mut zip = ZipWriter::new(File::create(&zip_path).unwrap());
        zip.start_file("x.txt", FileOptions::default()).unwrap();
        zip.write_all(b"x").unwrap();
        zip.finish().unwrap();
        assert_eq!(sniff(&zip_path).unwrap(), Some(ArchiveKind::Zip));

        let tgz_path = dir.path().join("b.bin");
        let enc = GzEncoder::new(File::create(&tgz_path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(enc);
        let data = b"hello\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "dir/x.txt", &data[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        assert_eq!(sniff(&tgz_path).unwrap(), Some(ArchiveKind::TarGz));

        let gz_path = dir.path().join("c.txt.gz");
        let mut enc = GzEncoder::new(File::create(&gz_path).unwrap(), Compression::default());
        enc.write_all(b"just text\n").unwrap();
        enc.finish().unwrap();
        assert_eq!(sniff(&gz_path).unwrap(), None);

        let extract = dir.path().join("b");
        let extracted = extract_tar(&tgz_path, ArchiveKind::TarGz, &extract).unwrap();
        assert_eq!(extracted, vec!["dir/x.txt"]);
        assert_eq!(list_extracted(&extract).unwrap(), vec!["dir/x.txt"]);
    }

    #[test]
    fn test_enclosed() {
        assert!(is_enclosed(Path::new("a/b/c.txt")));
        assert!(is_enclosed(Path::new("./a.txt")));
        assert!(!is_enclosed(Path::new("../evil.txt")));
        assert!(!is_enclosed(Path::new("a/../../evil.txt")));
        assert!(!is_enclosed(Path::new("/etc/passwd")));
    }
}
