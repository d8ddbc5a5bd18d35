/*! Transfers of remote resources.

[Fetch] is the only place network activity happens, so that it can be replaced (counted,
mocked) in tests. [HttpFetcher] handles `http(s)://` with a blocking client and `file://` by
local copy.
!*/
use std::fs::File;
use std::io::{Read, Write};
use std::time::Instant;

use log::{debug, info};
use url::Url;

use crate::error::Error;

/// Size of the chunks transfers are streamed in.
pub const CHUNK_SIZE: usize = 1 << 20;

pub trait Fetch: Send + Sync {
    /// Writes the whole content of `url` into `dst`, returning the number of bytes written.
    fn fetch(&self, url: &Url, dst: &mut dyn Write) -> Result<u64, Error>;
}

/// Streams `src` into `dst` in [CHUNK_SIZE] chunks.
pub fn copy_chunked(src: &mut dyn Read, dst: &mut dyn Write) -> std::io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        dst.write_all(&buf[..n])?;
        total += n as u64;
    }
    dst.flush()?;
    Ok(total)
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("mtdata/", env!("CARGO_PKG_VERSION")))
            .timeout(None)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, url: &Url, dst: &mut dyn Write) -> Result<u64, Error> {
        let fail = |message: String| Error::Fetch {
            url: url.to_string(),
            message,
        };
        let start = Instant::now();
        let nb_bytes = match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| fail("not a local path".to_string()))?;
                debug!("copying {:?}", path);
                let mut src = File::open(&path).map_err(|e| fail(e.to_string()))?;
                copy_chunked(&mut src, dst).map_err(|e| fail(e.to_string()))?
            }
            "http" | "https" => {
                info!("downloading {}", url);
                let mut resp = self
                    .client
                    .get(url.clone())
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| fail(e.to_string()))?;
                copy_chunked(&mut resp, dst).map_err(|e| fail(e.to_string()))?
            }
            scheme => return Err(fail(format!("unsupported scheme {scheme}"))),
        };
        debug!(
            "fetched {} bytes from {} in {:.1}s",
            nb_bytes,
            url,
            start.elapsed().as_secs_f32()
        );
        Ok(nb_bytes)
    }
}
