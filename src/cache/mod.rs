/*!
# Download cache

Content-addressed local store of remote resources:

```text
<root>/<hostname>/<md5[0:4]>/<md5[4:]>/<filename>
<root>/<hostname>/<md5[0:4]>/<md5[4:]>/<filename>._valid
```

Every download and extraction goes through the [lock] protocol, so that concurrent threads or
processes sharing a root transfer each resource at most once, and nobody ever reads a partial
file.
!*/
mod archive;
mod fetch;
pub mod lock;
mod vfile;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use md5::{Digest, Md5};
use url::Url;

use crate::catalog::Entry;
use crate::config::Config;
use crate::error::Error;
use crate::formats::detect_extension;

pub use archive::{match_globs, sniff, ArchiveKind};
pub use fetch::{copy_chunked, Fetch, HttpFetcher, CHUNK_SIZE};
pub use vfile::VirtualFile;

/// Default lock timeout: long enough for multi-gigabyte downloads.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Host directory used for URLs without a host (`file://`).
const LOCAL_HOST: &str = "localhost";

pub struct Cache {
    root: PathBuf,
    fetcher: Arc<dyn Fetch>,
    lock_timeout: Duration,
}

fn md5_hex(data: &str) -> String {
    let digest = Md5::digest(data.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Extraction directory of an archive: its path without the archive extension.
fn extract_dir(archive: &Path) -> PathBuf {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = detect_extension(&name);
    let stem = name
        .strip_suffix(&format!(".{ext}"))
        .filter(|s| !ext.is_empty() && !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| format!("{name}-extracted"));
    archive.with_file_name(stem)
}

impl Cache {
    /// Cache at `root` with an HTTP fetcher.
    pub fn new(root: &Path) -> Result<Self, Error> {
        Ok(Self {
            root: root.to_path_buf(),
            fetcher: Arc::new(HttpFetcher::new()?),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Ok(Self::new(&config.cache_root)?.with_lock_timeout(config.lock_timeout))
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of `url` stored as `filename`.
    pub fn local_path(&self, url: &str, filename: &str) -> Result<PathBuf, Error> {
        let parsed = Url::parse(url)?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .unwrap_or(LOCAL_HOST);
        let hash = md5_hex(url);
        Ok(self
            .root
            .join(host)
            .join(&hash[..4])
            .join(&hash[4..])
            .join(filename))
    }

    /// Downloads `url` once, returning its complete local path.
    pub fn download(&self, url: &str, filename: &str) -> Result<PathBuf, Error> {
        let target = self.local_path(url, filename)?;
        let parsed = Url::parse(url)?;
        lock::ensure(&target, self.lock_timeout, |target| {
            let mut out = BufWriter::new(File::create(target)?);
            let nb_bytes = self.fetcher.fetch(&parsed, &mut out)?;
            out.flush()?;
            info!("fetched {} ({} bytes) to {:?}", url, nb_bytes, target);
            Ok(())
        })?;
        debug!("{} is at {:?}", url, target);
        Ok(target)
    }

    /// Fetches the resources of `entry` and returns the files to read, fully present.
    ///
    /// Archives are recognised by content. Their members are selected with the entry's
    /// globs, each of which must match exactly one member.
    pub fn resolve(&self, entry: &Entry) -> Result<Vec<VirtualFile>, Error> {
        entry.validate()?;
        let filenames = entry.local_filenames();
        let paths = entry
            .urls
            .iter()
            .zip(&filenames)
            .map(|(url, name)| self.download(url, name))
            .collect::<Result<Vec<_>, _>>()?;

        if entry.is_alignment() {
            return Ok(paths.into_iter().map(VirtualFile::Plain).collect());
        }

        let mut files = Vec::new();
        for path in paths {
            match (sniff(&path)?, entry.in_paths.is_empty()) {
                (Some(kind), false) => files.extend(self.resolve_members(&path, kind, &entry.in_paths)?),
                (Some(kind), true) => {
                    return Err(Error::Format(format!(
                        "{}: {:?} is a {:?} archive but no in-archive paths are given",
                        entry.did, path, kind
                    )))
                }
                (None, in_paths_empty) => {
                    if !in_paths_empty {
                        warn!(
                            "[{}] {:?} is not an archive; in-archive paths ignored",
                            entry.did, path
                        );
                    }
                    files.push(VirtualFile::Plain(path));
                }
            }
        }
        Ok(files)
    }

    fn resolve_members(
        &self,
        archive: &Path,
        kind: ArchiveKind,
        globs: &[String],
    ) -> Result<Vec<VirtualFile>, Error> {
        let dir = extract_dir(archive);
        match kind {
            ArchiveKind::Zip => {
                let members = archive::zip_members(archive)?;
                let matched = match_globs(&members, globs)?;
                matched
                    .into_iter()
                    .map(|member| {
                        if !archive::is_enclosed(Path::new(&member)) {
                            return Err(Error::Format(format!(
                                "{:?}: member {} escapes the extraction directory",
                                archive, member
                            )));
                        }
                        Ok(VirtualFile::Zip {
                            archive: archive.to_path_buf(),
                            dest: dir.join(&member),
                            member,
                            lock_timeout: self.lock_timeout,
                        })
                    })
                    .collect()
            }
            ArchiveKind::Tar | ArchiveKind::TarGz => {
                lock::ensure(&dir, self.lock_timeout, |dir| {
                    if dir.exists() {
                        std::fs::remove_dir_all(dir)?;
                    }
                    archive::extract_tar(archive, kind, dir).map(|_| ())
                })?;
                let members = archive::list_extracted(&dir)?;
                let matched = match_globs(&members, globs)?;
                Ok(matched
                    .into_iter()
                    .map(|member| VirtualFile::Tar {
                        archive: archive.to_path_buf(),
                        path: dir.join(&member),
                        member,
                    })
                    .collect())
            }
        }
    }

    /// Files under the root that have no validity marker: interrupted downloads or
    /// extractions. They are only reported, a later resolve redoes them.
    pub fn stale_partials(&self) -> Result<Vec<PathBuf>, Error> {
        let mut stale = Vec::new();
        let pattern = format!("{}/*/*/*/*", glob::Pattern::escape(&self.root.to_string_lossy()));
        for path in glob::glob(&pattern)? {
            let path = path.map_err(|e| Error::Io(e.into_error()))?;
            let name = path.to_string_lossy();
            if !path.is_file() || name.ends_with("._valid") || name.ends_with("._lock") {
                continue;
            }
            if !lock::marker_path(&path).exists() {
                stale.push(path);
            }
        }
        if !stale.is_empty() {
            warn!("{} incomplete files in {:?}", stale.len(), self.root);
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_local_path() {
        let cache = Cache::new(Path::new("/cache")).unwrap();
        let url = "http://data.statmt.org/news-commentary/v16/training/nc.tsv.gz";
        let path = cache.local_path(url, "nc.tsv.gz").unwrap();
        let hash = md5_hex(url);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            path,
            Path::new("/cache/data.statmt.org")
                .join(&hash[..4])
                .join(&hash[4..])
                .join("nc.tsv.gz")
        );

        let local = cache.local_path("file:///tmp/x.txt", "x.txt").unwrap();
        assert!(local.starts_with("/cache/localhost"));
    }

    #[test]
    fn test_md5() {
        assert_eq!(md5_hex(""), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_extract_dir() {
        assert_eq!(extract_dir(Path::new("/c/de-en.tgz")), Path::new("/c/de-en"));
        assert_eq!(extract_dir(Path::new("/c/a.tar.gz")), Path::new("/c/a"));
        assert_eq!(extract_dir(Path::new("/c/data")), Path::new("/c/data-extracted"));
    }

    #[test]
    fn test_stale_partials() {
        let dir = tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        let done = cache.local_path("http://a.org/done.txt", "done.txt").unwrap();
        let partial = cache.local_path("http://a.org/part.txt", "part.txt").unwrap();
        for p in [&done, &partial] {
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, "x").unwrap();
        }
        std::fs::write(lock::marker_path(&done), "").unwrap();
        assert_eq!(cache.stale_partials().unwrap(), vec![partial]);
    }
}
