//! Stream locators
//!
//! A track's locator is either a filesystem path, a `file://` URL, or an
//! `http(s)://` URL such as the library host's `/audio/<path>` endpoint.

use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use symphonia::core::io::MediaSource;
use url::Url;

use crate::error::{AudioError, Result};

/// Where a stream's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLocator {
    /// Local file
    File(PathBuf),

    /// Remote stream fetched over HTTP(S)
    Http(Url),
}

impl StreamLocator {
    /// Parse a track's stream locator
    pub fn parse(locator: &str) -> Result<Self> {
        let trimmed = locator.trim();
        if trimmed.is_empty() {
            return Err(AudioError::InvalidLocator("empty locator".into()));
        }

        let url = match Url::parse(trimmed) {
            Ok(url) => url,
            // Relative or plain absolute paths are not URLs
            Err(_) => return Ok(Self::File(PathBuf::from(trimmed))),
        };

        match url.scheme() {
            "http" | "https" => Ok(Self::Http(url)),
            "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|()| AudioError::InvalidLocator(trimmed.to_string())),
            // Windows drive letters parse as one-letter schemes
            scheme if scheme.len() == 1 => Ok(Self::File(PathBuf::from(trimmed))),
            scheme => Err(AudioError::InvalidLocator(format!(
                "unsupported scheme '{}' in {}",
                scheme, trimmed
            ))),
        }
    }

    /// File extension used as a format hint
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            Self::File(path) => path.file_name()?.to_str()?.to_string(),
            Self::Http(url) => url.path_segments()?.next_back()?.to_string(),
        };
        Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// Open the stream's bytes
    ///
    /// Remote streams are downloaded in full so decoding never waits on the
    /// network.
    pub async fn open(&self, client: &reqwest::Client) -> Result<Box<dyn MediaSource>> {
        match self {
            Self::File(path) => Ok(Box::new(File::open(path)?)),
            Self::Http(url) => {
                let response = client.get(url.clone()).send().await?.error_for_status()?;
                let bytes = response.bytes().await?;
                Ok(Box::new(Cursor::new(bytes.to_vec())))
            }
        }
    }
}
