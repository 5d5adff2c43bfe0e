//! Whole-document JSON persistence.
//!
//! The worker's durable state (reputation ledger, community activity) lives
//! in single JSON documents with read-modify-write semantics and a single
//! writer per invocation. Loading a missing or corrupt document yields the
//! default value with a warning so a run never fails on state it can
//! regenerate; losing history is preferable to losing the digest.

use std::fs;
use std::marker::PhantomData;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to serialize document {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write document {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 単一JSONドキュメントのストア。
pub struct JsonDocumentStore<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> JsonDocumentStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// ドキュメントを読み込む。
    ///
    /// ファイルが存在しない、または壊れている場合は警告を出して
    /// デフォルト値を返す。エラーにはしない。
    pub fn load(&self) -> T {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "store document not found, starting empty");
                return T::default();
            }
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    %error,
                    "failed to read store document, starting empty"
                );
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    %error,
                    "store document is corrupt, starting empty"
                );
                T::default()
            }
        }
    }

    /// ドキュメントを書き戻す。
    ///
    /// # Errors
    /// シリアライズまたは書き込みに失敗した場合はエラーを返す。呼び出し側は
    /// ログに残してラン自体は続行する。
    pub fn save(&self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        let body =
            serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
                path: self.path.clone(),
                source,
            })?;

        fs::write(&self.path, body).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}
