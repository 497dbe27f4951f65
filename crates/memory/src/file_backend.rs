//! File-based backend: one JSON-lines file per key.
//!
//! Each key maps to `<root>/<encoded key>.jsonl` where every line is one
//! record. Appends go straight to the end of the file in a single write;
//! replacements write a sibling temp file and rename it over the original.
//!
//! Storage location: `~/.memoria/data/kv/` by default.
//!
//! Keys are encoded so that opaque device ids can never escape the root
//! directory (`/`, `\`, and other unsafe bytes become `%XX`).

use async_trait::async_trait;
use memoria_core::error::StorageError;
use memoria_core::store::KvStore;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const EXTENSION: &str = "jsonl";

/// A directory of JSONL files, one per key.
pub struct FileKv {
    root: PathBuf,
}

impl FileKv {
    /// Open (and create if needed) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::io(root.display().to_string(), e))?;
        debug!(root = %root.display(), "File key-value backend opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{EXTENSION}", encode_key(key)))
    }

    fn read_lines(path: &Path, key: &str) -> Result<Vec<String>, StorageError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(String::from)
                .collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    fn render(values: &[String]) -> String {
        let mut content = String::with_capacity(values.iter().map(|v| v.len() + 1).sum());
        for value in values {
            content.push_str(value);
            content.push('\n');
        }
        content
    }
}

#[async_trait]
impl KvStore for FileKv {
    fn name(&self) -> &str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Vec<String>, StorageError> {
        Self::read_lines(&self.path_for(key), key)
    }

    async fn append(&self, key: &str, values: Vec<String>) -> Result<usize, StorageError> {
        let path = self.path_for(key);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(key, e))?;

        file.write_all(Self::render(&values).as_bytes())
            .map_err(|e| StorageError::io(key, e))?;

        Ok(Self::read_lines(&path, key)?.len())
    }

    async fn replace(&self, key: &str, values: Vec<String>) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        std::fs::write(&tmp, Self::render(&values)).map_err(|e| StorageError::io(key, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| StorageError::io(key, e))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let dir = std::fs::read_dir(&self.root).map_err(|e| StorageError::io(prefix, e))?;

        let mut keys: Vec<String> = dir
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let stem = name.strip_suffix(&format!(".{EXTENSION}"))?.to_string();
                decode_key(&stem)
            })
            .filter(|key| key.starts_with(prefix))
            .collect();

        keys.sort();
        Ok(keys)
    }
}

fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn decode_key(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_encoding_roundtrip() {
        for key in ["turns/phone-1", "links", "turns/../etc/passwd", "models/llama3:8b"] {
            let encoded = encode_key(key);
            assert!(!encoded.contains('/'));
            assert_eq!(decode_key(&encoded).as_deref(), Some(key));
        }
    }

    #[tokio::test]
    async fn append_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path()).unwrap();
        assert_eq!(kv.append("turns/a", vec!["{\"n\":1}".into()]).await.unwrap(), 1);
        assert_eq!(
            kv.append("turns/a", vec!["{\"n\":2}".into(), "{\"n\":3}".into()])
                .await
                .unwrap(),
            3
        );

        let reopened = FileKv::new(dir.path()).unwrap();
        assert_eq!(reopened.get("turns/a").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn replace_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path()).unwrap();
        kv.append("links", vec!["a".into(), "b".into()]).await.unwrap();
        kv.replace("links", vec!["c".into()]).await.unwrap();
        assert_eq!(kv.get("links").await.unwrap(), vec!["c"]);
    }

    #[tokio::test]
    async fn missing_key_is_empty_and_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path()).unwrap();
        assert!(kv.get("turns/nobody").await.unwrap().is_empty());
        assert!(!kv.remove("turns/nobody").await.unwrap());
    }

    #[tokio::test]
    async fn keys_decode_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path()).unwrap();
        kv.append("turns/phone-1", vec!["x".into()]).await.unwrap();
        kv.append("turns/laptop 1", vec!["x".into()]).await.unwrap();
        kv.append("links", vec!["x".into()]).await.unwrap();

        assert_eq!(
            kv.keys("turns/").await.unwrap(),
            vec!["turns/laptop 1", "turns/phone-1"]
        );
    }
}
