//! Audio URL resolution and byte fetching.
//!
//! Relative paths and `file://` URLs are read from disk, relative ones under the media
//! root. `http://` and `https://` URLs are downloaded with a size cap.

use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use read_aloud::MediaError;

/// Download cap for remote clips.
pub const MAX_REMOTE_BYTES: u64 = 64 * 1024 * 1024;

/// Where a clip's bytes come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClipSource {
    File(PathBuf),
    Remote(String),
}

impl ClipSource {
    /// Resolve `url` against `media_root`. Fails for unknown schemes and for relative
    /// paths that climb out of the root.
    pub fn resolve(url: &str, media_root: &Path) -> Result<Self, MediaError> {
        let url = url.trim();
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(ClipSource::Remote(url.to_string()));
        }
        let path = match lower.strip_prefix("file://") {
            Some(_) => &url["file://".len()..],
            None if has_scheme(url) => return Err(MediaError::UnsupportedUrl(url.to_string())),
            None => url,
        };
        if path.is_empty() {
            return Err(MediaError::UnsupportedUrl(url.to_string()));
        }
        let path = Path::new(path);
        if path.is_absolute() {
            return Ok(ClipSource::File(path.to_path_buf()));
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(MediaError::UnsupportedUrl(url.to_string()));
        }
        Ok(ClipSource::File(media_root.join(path)))
    }

    /// Lowercase file extension, used as a probe hint.
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            ClipSource::File(path) => path.file_name()?.to_str()?.to_string(),
            ClipSource::Remote(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.rsplit('/').next()?.to_string()
            }
        };
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn fetch(&self) -> Result<Vec<u8>> {
        match self {
            ClipSource::File(path) => {
                std::fs::read(path).with_context(|| format!("read audio {:?}", path))
            }
            ClipSource::Remote(url) => {
                let resp = ureq::get(url)
                    .call()
                    .with_context(|| format!("request {url}"))?;
                let bytes = resp
                    .into_body()
                    .with_config()
                    .limit(MAX_REMOTE_BYTES)
                    .read_to_vec()
                    .with_context(|| format!("download {url}"))?;
                if bytes.is_empty() {
                    return Err(anyhow!("empty response from {url}"));
                }
                Ok(bytes)
            }
        }
    }
}

fn has_scheme(url: &str) -> bool {
    match url.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/audio")
    }

    #[test]
    fn relative_paths_land_under_media_root() {
        assert_eq!(
            ClipSource::resolve("chapter1/a.mp3", &root()).unwrap(),
            ClipSource::File(PathBuf::from("/srv/audio/chapter1/a.mp3"))
        );
        assert_eq!(
            ClipSource::resolve("file://a.ogg", &root()).unwrap(),
            ClipSource::File(PathBuf::from("/srv/audio/a.ogg"))
        );
    }

    #[test]
    fn absolute_file_urls_are_kept() {
        assert_eq!(
            ClipSource::resolve("file:///tmp/a.wav", &root()).unwrap(),
            ClipSource::File(PathBuf::from("/tmp/a.wav"))
        );
    }

    #[test]
    fn http_urls_are_remote() {
        assert_eq!(
            ClipSource::resolve("HTTPS://example.com/a.mp3", &root()).unwrap(),
            ClipSource::Remote("HTTPS://example.com/a.mp3".to_string())
        );
    }

    #[test]
    fn rejects_escapes_and_unknown_schemes() {
        for url in ["../secret.mp3", "a/../../b.mp3", "ftp://host/a.mp3", "file://", ""] {
            assert!(
                matches!(ClipSource::resolve(url, &root()), Err(MediaError::UnsupportedUrl(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn extension_ignores_query_and_case() {
        let remote = ClipSource::Remote("https://x.test/clip.MP3?sig=1#t".to_string());
        assert_eq!(remote.extension().as_deref(), Some("mp3"));
        let file = ClipSource::File(PathBuf::from("/a/b.flac"));
        assert_eq!(file.extension().as_deref(), Some("flac"));
        let bare = ClipSource::File(PathBuf::from("/a/noext"));
        assert_eq!(bare.extension(), None);
    }

    #[test]
    fn missing_file_reports_path() {
        let source = ClipSource::File(PathBuf::from("/definitely/not/here.mp3"));
        let err = source.fetch().unwrap_err();
        assert!(format!("{err:#}").contains("here.mp3"));
    }
}
