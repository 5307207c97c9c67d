//! File-based session storage: one pretty-printed JSON file per session.
//!
//! Storage location: `~/.filachat/sessions/<encoded id>.json`
//!
//! Session ids come from callers, so they are encoded into a filename-safe
//! form: ASCII letters, digits, `-` and `_` pass through, every other byte
//! becomes `%XX`. Encodings longer than [`MAX_STEM_LEN`] are replaced by
//! `~` plus the hex SHA-256 of the id; those files are listed by the id
//! stored inside the record.

use async_trait::async_trait;
use filachat_core::Session;
use filachat_core::error::StorageError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::storage::SessionStorage;

const EXTENSION: &str = "json";

/// Longest filename stem written as-is. Most filesystems cap names at 255 bytes.
pub(crate) const MAX_STEM_LEN: usize = 200;

/// Marks a hashed stem. Never produced by the plain encoding.
const HASHED_PREFIX: char = '~';

/// A directory of JSON session files.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir` for session files. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", encode_key(key)))
    }

    async fn read_session(&self, path: &Path, key: &str) -> Result<Option<Session>, StorageError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(key, e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::Corrupted {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Encode a session id into a filename stem of at most [`MAX_STEM_LEN`] bytes.
pub(crate) fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    if out.len() > MAX_STEM_LEN {
        return format!("{HASHED_PREFIX}{}", hex::encode(Sha256::digest(key.as_bytes())));
    }
    out
}

fn is_hashed(stem: &str) -> bool {
    stem.starts_with(HASHED_PREFIX)
}

/// Reverse of [`encode_key`] for plain stems. `None` for hashed stems and
/// for stems this backend never writes.
pub(crate) fn decode_key(stem: &str) -> Option<String> {
    if is_hashed(stem) {
        return None;
    }
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn io_error(key: &str, e: std::io::Error) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl SessionStorage for FileStorage {
    fn name(&self) -> &str {
        "file"
    }

    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            // Nothing written yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir.display().to_string(), e)),
        };

        let mut keys = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if is_hashed(stem) {
                match self.read_session(&path, stem).await {
                    Ok(Some(session)) => keys.push(session.id.0),
                    Ok(None) => {}
                    Err(e) => warn!(
                        file = %path.display(),
                        error = %e,
                        "Ignoring unreadable session file"
                    ),
                }
                continue;
            }
            match decode_key(stem) {
                Some(key) => keys.push(key),
                None => warn!(file = %path.display(), "Ignoring file with undecodable name"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn load(&self, key: &str) -> Result<Option<Session>, StorageError> {
        let session = self.read_session(&self.path_for(key), key).await?;
        // A hashed name only matches its own id
        Ok(session.filter(|s| s.id.as_str() == key))
    }

    async fn save(&self, session: &Session) -> Result<(), StorageError> {
        let key = session.id.as_str();
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(key, e))?;

        let data = serde_json::to_string_pretty(session).map_err(|e| StorageError::Io {
            key: key.to_string(),
            reason: format!("serialization failed: {e}"),
        })?;

        // Write then rename so a crash never leaves a half-written record
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(|e| io_error(key, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(key, e))?;

        debug!(session_id = %key, path = %path.display(), "Session saved");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(key, e)),
        }
    }
}
