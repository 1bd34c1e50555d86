//!
//! src/sink.rs
//!
//! Optional archive of raw catalog responses, one zstd compressed json
//! file per run, written through a temp file and renamed into place.
//! An existing archive is never replaced
//!

use std::{fs, path::{Path, PathBuf}};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::EtlError;

#[derive(Debug, Clone, Copy)]
pub enum RawType {
    DeezerSearch
}

pub struct DiskZstdSink {
    root: PathBuf,
    level: i32
}

impl DiskZstdSink {
    pub fn new(root: impl AsRef<Path>, level: i32) -> Self {
        Self { root: root.as_ref().to_path_buf(), level: level.clamp(0, 21) }
    }

    /// Writes `records` under `<root>/raw/deezer/search/<key>/<stamp>-<run_id>.json.zst`
    pub fn write_batch(
        &self,
        kind: RawType,
        key: &str,
        stamp: i64,
        run_id: Uuid,
        records: Vec<Value>
    ) -> Result<PathBuf, EtlError> {

        let mut json = Value::Array(records);
        match kind {
            RawType::DeezerSearch => Self::prune_deezer_search(&mut json)
        }

        let path = self.root.join(Self::rel_path(kind, &Self::sanitize_key(key), stamp, run_id));
        let parent = path.parent()
            .ok_or_else(|| EtlError::Config(format!("no parent for {}", path.display())))?;

        fs::create_dir_all(parent)?;

        let temp = tempfile::NamedTempFile::new_in(parent)?;

        {
            let mut enc = zstd::stream::write::Encoder::new(temp.as_file(), self.level)?;
            serde_json::to_writer(&mut enc, &json)
                .map_err(|e| EtlError::Io(std::io::Error::other(e)))?;
            enc.finish()?;
        }

        temp.persist_noclobber(&path).map_err(|e| EtlError::Io(e.error))?;

        Ok(path)
    }

    fn rel_path(kind: RawType, sanitized_key: &str, stamp: i64, run_id: Uuid) -> PathBuf {
        match kind {
            RawType::DeezerSearch =>
                PathBuf::from("raw/deezer/search")
                    .join(sanitized_key)
                    .join(format!("{stamp}-{run_id}.json.zst"))
        }
    }

    fn sanitize_key(key: &str) -> String {
        let sanitized: String = key.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.is_empty() { "_".to_string() } else { sanitized }
    }

    /// Drops presentation-only keys the pipeline never reads
    fn prune_deezer_search(v: &mut Value) {
        Self::drop_keys_recursive(v, &[
            "link", "share", "preview", "md5_image", "tracklist", "type",
            "picture", "picture_small", "picture_big", "picture_xl",
            "cover", "cover_small", "cover_big", "cover_xl"
        ]);
    }

    fn drop_keys_recursive(v: &mut Value, keys: &[&str]) {
        match v {
            Value::Object(map) => {
                for key in keys {
                    map.remove(*key);
                }
                for val in map.values_mut() {
                    Self::drop_keys_recursive(val, keys);
                }
            }
            Value::Array(arr) => {
                for element in arr {
                    Self::drop_keys_recursive(element, keys);
                }
            }
            _ => {}
        }
    }
}
