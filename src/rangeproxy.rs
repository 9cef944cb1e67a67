//! RangeProxy (§4.8): serves bytes from the local FUSE-mounted catalog (or a
//! processed-remux output file) when promotion to a direct debrid URL
//! failed or a remux produced a local file.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bytes::Bytes;
use tokio::io::AsyncSeekExt;

use crate::error::AppError;

pub fn encode_stream_id(absolute_path: &str) -> String {
    URL_SAFE_NO_PAD.encode(absolute_path.as_bytes())
}

pub fn decode_stream_id(stream_id: &str) -> Result<String, AppError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(stream_id)
        .map_err(|_| AppError::PathNotAllowed)?;
    String::from_utf8(bytes).map_err(|_| AppError::PathNotAllowed)
}

#[derive(Debug, Clone, Copy)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// Parses a single-range `Range: bytes=start-end` header; anything else
/// (multi-range, malformed) is rejected rather than approximated.
pub fn parse_single_range(header: &str, file_len: u64) -> Option<ByteRange> {
    let spec = header.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start_s, end_s) = spec.split_once('-')?;
    if start_s.is_empty() {
        // suffix range: bytes=-N means the last N bytes
        let suffix_len: u64 = end_s.parse().ok()?;
        if suffix_len == 0 || suffix_len > file_len {
            return Some(ByteRange { start: 0, end: file_len.saturating_sub(1) });
        }
        return Some(ByteRange {
            start: file_len - suffix_len,
            end: file_len - 1,
        });
    }
    let start: u64 = start_s.parse().ok()?;
    let end: u64 = if end_s.is_empty() {
        file_len.saturating_sub(1)
    } else {
        end_s.parse().ok()?
    };
    if start > end || start >= file_len {
        return None;
    }
    Some(ByteRange { start, end: end.min(file_len.saturating_sub(1)) })
}

/// Collapses `.` and `..` components without touching the filesystem (the
/// mount may contain FUSE paths that don't resolve via `fs::canonicalize`).
/// A leading `..` with nothing left to pop is kept, so it still fails the
/// caller's `starts_with` containment check rather than silently escaping.
fn normalize_lexical(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                _ => result.push(component),
            },
            other => result.push(other),
        }
    }
    result
}

pub struct RangeProxy {
    mount_root: PathBuf,
    stat_timeout: Duration,
}

pub struct FileSlice {
    pub range: ByteRange,
    pub total_len: u64,
    pub bytes: Bytes,
}

impl RangeProxy {
    pub fn new(mount_root: PathBuf, stat_timeout: Duration) -> Self {
        RangeProxy { mount_root, stat_timeout }
    }

    /// Resolves a `streamId` to an absolute path, rejecting anything that
    /// escapes `mount_root`. The decoded path is lexically normalized (`.`
    /// and `..` components collapsed) before the containment check, since a
    /// component-wise `starts_with` on the raw path would accept something
    /// like `/mnt/zurg/../../etc/passwd`.
    pub fn resolve_path(&self, stream_id: &str) -> Result<PathBuf, AppError> {
        let decoded = decode_stream_id(stream_id)?;
        let candidate = normalize_lexical(Path::new(&decoded));
        if !candidate.starts_with(&self.mount_root) {
            return Err(AppError::PathNotAllowed);
        }
        Ok(candidate)
    }

    /// Stats the file under the configured deadline; a timeout maps to the
    /// retryable `FS_UNAVAILABLE` kind (§7) rather than hanging the caller.
    pub async fn stat(&self, path: &Path) -> Result<u64, AppError> {
        let path = path.to_path_buf();
        let metadata = tokio::time::timeout(self.stat_timeout, tokio::fs::metadata(path))
            .await
            .map_err(|_| AppError::FsUnavailable)?
            .map_err(|_| AppError::FsUnavailable)?;
        Ok(metadata.len())
    }

    /// Reads the requested range (or the whole file if `range` is `None`).
    pub async fn read_range(&self, path: &Path, range: Option<ByteRange>) -> Result<FileSlice, AppError> {
        use tokio::io::AsyncReadExt;

        let total_len = self.stat(path).await?;
        let range = range.unwrap_or(ByteRange {
            start: 0,
            end: total_len.saturating_sub(1),
        });
        if range.start > range.end || range.start >= total_len.max(1) {
            return Err(AppError::RangeNotSatisfiable);
        }

        let mut file = tokio::fs::File::open(path).await.map_err(|_| AppError::FsUnavailable)?;
        file.seek(std::io::SeekFrom::Start(range.start))
            .await
            .map_err(|_| AppError::FsUnavailable)?;
        let len = (range.end - range.start + 1) as usize;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await.map_err(|_| AppError::FsUnavailable)?;

        Ok(FileSlice {
            range,
            total_len,
            bytes: Bytes::from(buf),
        })
    }

    /// Opens the file seeked to the start of `range` and returns a bounded
    /// reader the HTTP layer can stream out via `ReaderStream`, instead of
    /// buffering the whole range in memory (§4.8: large-file byte serving).
    pub async fn open_range(
        &self,
        path: &Path,
        range: Option<ByteRange>,
    ) -> Result<(ByteRange, u64, tokio::io::Take<tokio::fs::File>), AppError> {
        use tokio::io::AsyncReadExt;

        let total_len = self.stat(path).await?;
        let range = range.unwrap_or(ByteRange {
            start: 0,
            end: total_len.saturating_sub(1),
        });
        if range.start > range.end || range.start >= total_len.max(1) {
            return Err(AppError::RangeNotSatisfiable);
        }

        let mut file = tokio::fs::File::open(path).await.map_err(|_| AppError::FsUnavailable)?;
        file.seek(std::io::SeekFrom::Start(range.start))
            .await
            .map_err(|_| AppError::FsUnavailable)?;
        let len = range.end - range.start + 1;
        Ok((range, total_len, file.take(len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_id_round_trips() {
        let id = encode_stream_id("/mnt/zurg/movie.mkv");
        assert_eq!(decode_stream_id(&id).unwrap(), "/mnt/zurg/movie.mkv");
    }

    #[test]
    fn invalid_stream_id_is_rejected() {
        assert!(decode_stream_id("not-base64!!!").is_err());
    }

    #[test]
    fn path_outside_mount_root_is_rejected() {
        let proxy = RangeProxy::new(PathBuf::from("/mnt/zurg"), Duration::from_secs(1));
        let id = encode_stream_id("/etc/passwd");
        assert!(matches!(proxy.resolve_path(&id), Err(AppError::PathNotAllowed)));
    }

    #[test]
    fn path_inside_mount_root_is_allowed() {
        let proxy = RangeProxy::new(PathBuf::from("/mnt/zurg"), Duration::from_secs(1));
        let id = encode_stream_id("/mnt/zurg/show/ep1.mkv");
        assert!(proxy.resolve_path(&id).is_ok());
    }

    #[test]
    fn dot_dot_traversal_out_of_the_mount_root_is_rejected() {
        let proxy = RangeProxy::new(PathBuf::from("/mnt/zurg"), Duration::from_secs(1));
        let id = encode_stream_id("/mnt/zurg/../../etc/passwd");
        assert!(matches!(proxy.resolve_path(&id), Err(AppError::PathNotAllowed)));
    }

    #[test]
    fn dot_dot_that_stays_inside_the_mount_root_is_allowed() {
        let proxy = RangeProxy::new(PathBuf::from("/mnt/zurg"), Duration::from_secs(1));
        let id = encode_stream_id("/mnt/zurg/show/../movie.mkv");
        let resolved = proxy.resolve_path(&id).unwrap();
        assert_eq!(resolved, PathBuf::from("/mnt/zurg/movie.mkv"));
    }

    #[test]
    fn parses_a_simple_byte_range() {
        let range = parse_single_range("bytes=0-99", 1000).unwrap();
        assert_eq!(range.start, 0);
        assert_eq!(range.end, 99);
    }

    #[test]
    fn parses_an_open_ended_range() {
        let range = parse_single_range("bytes=500-", 1000).unwrap();
        assert_eq!(range.start, 500);
        assert_eq!(range.end, 999);
    }

    #[test]
    fn parses_a_suffix_range() {
        let range = parse_single_range("bytes=-100", 1000).unwrap();
        assert_eq!(range.start, 900);
        assert_eq!(range.end, 999);
    }

    #[test]
    fn rejects_multi_range_requests() {
        assert!(parse_single_range("bytes=0-10,20-30", 1000).is_none());
    }

    #[test]
    fn rejects_start_past_end_of_file() {
        assert!(parse_single_range("bytes=5000-6000", 1000).is_none());
    }
}
