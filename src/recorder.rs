//! Result recorder
//!
//! Fetches the canonical `jsonParsed` record of a confirmed transaction and
//! writes it once to `<output_dir>/<label>.json`. The record usually lags
//! confirmation, so the fetch polls under the same discipline as
//! confirmation itself.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    signature::Signature,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::metrics;
use crate::pipeline::StageFailure;
use crate::retry::{poll_until, PollError, PollPolicy};
use crate::rpc::{LedgerRpc, RpcError};

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("transaction {signature} not queryable after {attempts} attempts")]
    FetchTimeout { signature: Signature, attempts: u32 },

    #[error("recording {signature} cancelled")]
    Cancelled { signature: Signature },

    #[error("{path} already exists; records are write-once")]
    AlreadyRecorded { path: PathBuf },

    #[error("invalid label {0:?}")]
    InvalidLabel(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persisted audit artifact
#[derive(Debug, Clone, Serialize)]
pub struct ParsedTransactionRecord {
    pub label: String,
    pub signature: String,
    pub recorded_at: DateTime<Utc>,
    pub slot: Option<u64>,
    pub block_time: Option<i64>,
    /// Program-reported error, `null` on success
    pub err: serde_json::Value,
    pub log_messages: Vec<String>,
    /// The full `getTransaction` response
    pub transaction: serde_json::Value,
}

impl ParsedTransactionRecord {
    pub fn from_rpc(label: &str, signature: &Signature, raw: serde_json::Value) -> Self {
        let meta = raw.get("meta");
        let log_messages = meta
            .and_then(|m| m.get("logMessages"))
            .and_then(|l| l.as_array())
            .map(|lines| {
                lines
                    .iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            label: label.to_string(),
            signature: signature.to_string(),
            recorded_at: Utc::now(),
            slot: raw.get("slot").and_then(|s| s.as_u64()),
            block_time: raw.get("blockTime").and_then(|t| t.as_i64()),
            err: meta
                .and_then(|m| m.get("err"))
                .cloned()
                .unwrap_or(serde_json::Value::Null),
            log_messages,
            transaction: raw,
        }
    }
}

pub struct ResultRecorder<'a> {
    rpc: &'a dyn LedgerRpc,
    output_dir: PathBuf,
    commitment: CommitmentConfig,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl<'a> ResultRecorder<'a> {
    pub fn new(
        rpc: &'a dyn LedgerRpc,
        output_dir: impl Into<PathBuf>,
        commitment: CommitmentConfig,
        policy: PollPolicy,
        cancel: CancellationToken,
    ) -> Self {
        // getTransaction does not serve processed-only records
        let commitment = if commitment.commitment == CommitmentLevel::Processed {
            CommitmentConfig::confirmed()
        } else {
            commitment
        };
        Self {
            rpc,
            output_dir: output_dir.into(),
            commitment,
            policy,
            cancel,
        }
    }

    /// Fetch the parsed record of `signature` and persist it under `label`
    pub async fn record(&self, signature: &Signature, label: &str) -> Result<PathBuf, RecorderError> {
        let path = self.artifact_path(label, "json")?;
        ensure_absent(&path).await?;

        let raw = self.fetch(signature).await?;
        let record = ParsedTransactionRecord::from_rpc(label, signature, raw);
        write_once(&path, &serde_json::to_vec_pretty(&record)?).await?;
        metrics().records_written.inc();

        info!(signature = %signature, path = %path.display(), "transaction record written");
        Ok(path)
    }

    /// Persist a stage that ended without success, refused at submit included
    pub async fn record_failure(&self, failure: &StageFailure, label: &str) -> Result<PathBuf, RecorderError> {
        let path = self.artifact_path(label, "failed.json")?;
        write_once(&path, &serde_json::to_vec_pretty(failure)?).await?;
        info!(
            signature = %failure.signature,
            stage = %failure.stage,
            category = failure.category,
            path = %path.display(),
            "failure record written"
        );
        Ok(path)
    }

    async fn fetch(&self, signature: &Signature) -> Result<serde_json::Value, RecorderError> {
        let rpc = self.rpc;
        let commitment = self.commitment;

        let result = poll_until("fetch_parsed_transaction", &self.policy, &self.cancel, |attempt| async move {
            debug!(signature = %signature, attempt = attempt + 1, "fetching parsed transaction");
            rpc.get_parsed_transaction(signature, commitment).await
        })
        .await;

        match result {
            Ok(raw) => Ok(raw),
            Err(PollError::Exhausted { attempts, .. }) => Err(RecorderError::FetchTimeout {
                signature: *signature,
                attempts,
            }),
            Err(PollError::Cancelled { .. }) => Err(RecorderError::Cancelled {
                signature: *signature,
            }),
            Err(PollError::Fatal(err)) => Err(err.into()),
        }
    }

    fn artifact_path(&self, label: &str, extension: &str) -> Result<PathBuf, RecorderError> {
        let name = sanitize_label(label)?;
        Ok(self.output_dir.join(format!("{}.{}", name, extension)))
    }
}

/// File-safe stem for `label`; a trailing `.json` is dropped
pub fn sanitize_label(label: &str) -> Result<String, RecorderError> {
    let stem = label.trim().trim_end_matches(".json");
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        return Err(RecorderError::InvalidLabel(label.to_string()));
    }
    Ok(cleaned)
}

async fn ensure_absent(path: &Path) -> Result<(), RecorderError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Err(RecorderError::AlreadyRecorded {
            path: path.to_path_buf(),
        }),
        Ok(false) => Ok(()),
        Err(source) => Err(RecorderError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Stage the bytes in a synced temp file next to `path`, then link it into
/// place only if `path` does not exist yet. A failed write leaves nothing at
/// `path`.
async fn write_once(path: &Path, bytes: &[u8]) -> Result<(), RecorderError> {
    let target = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || persist_new(&target, &bytes))
        .await
        .map_err(|join| RecorderError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(join),
        })?
}

fn persist_new(path: &Path, bytes: &[u8]) -> Result<(), RecorderError> {
    let io_err = |source: std::io::Error| RecorderError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".lut-flow-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err)?;
    staged.write_all(bytes).map_err(io_err)?;
    staged.as_file().sync_all().map_err(io_err)?;

    staged.persist_noclobber(path).map_err(|err| {
        if err.error.kind() == std::io::ErrorKind::AlreadyExists {
            RecorderError::AlreadyRecorded {
                path: path.to_path_buf(),
            }
        } else {
            io_err(err.error)
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_strips_json_suffix() {
        assert_eq!(sanitize_label("lut_tx.json").unwrap(), "lut_tx");
        assert_eq!(sanitize_label("run 1/final").unwrap(), "run_1_final");
        assert!(sanitize_label("  ").is_err());
        assert!(sanitize_label("..").is_err());
    }

    #[test]
    fn test_record_extracts_meta_fields() {
        let sig = Signature::from([9u8; 64]);
        let raw = json!({
            "slot": 77,
            "blockTime": 1_700_000_000,
            "meta": {
                "err": {"InstructionError": [0, {"Custom": 1}]},
                "logMessages": ["Program log: hello", "Program consumed 10 units"]
            },
            "transaction": {"signatures": [sig.to_string()]}
        });

        let record = ParsedTransactionRecord::from_rpc("lut_tx", &sig, raw);
        assert_eq!(record.slot, Some(77));
        assert_eq!(record.block_time, Some(1_700_000_000));
        assert_eq!(record.log_messages.len(), 2);
        assert!(!record.err.is_null());
        assert_eq!(record.signature, sig.to_string());
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_write_once_leaves_only_the_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("lut_tx.json");

        write_once(&path, br#"{"a":1}"#).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), br#"{"a":1}"#);

        // a refused second write keeps the first and strands no staging file
        let err = write_once(&path, b"{}").await.unwrap_err();
        assert!(matches!(err, RecorderError::AlreadyRecorded { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), br#"{"a":1}"#);
        assert_eq!(dir_entries(path.parent().unwrap()), vec!["lut_tx.json".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_write_does_not_claim_the_label() {
        let dir = tempfile::tempdir().unwrap();
        // the output directory cannot be created: a file sits in its place
        let blocker = dir.path().join("out");
        std::fs::write(&blocker, b"").unwrap();
        let path = blocker.join("lut_tx.json");

        let err = write_once(&path, b"{}").await.unwrap_err();
        assert!(matches!(err, RecorderError::Io { .. }));
        assert!(!matches!(
            ensure_absent(&path).await,
            Err(RecorderError::AlreadyRecorded { .. })
        ));
        assert_eq!(dir_entries(dir.path()), vec!["out".to_string()]);
    }

    #[tokio::test]
    async fn test_write_once_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");

        write_once(&path, b"{}").await.unwrap();
        let err = write_once(&path, b"{}").await.unwrap_err();
        assert!(matches!(err, RecorderError::AlreadyRecorded { .. }));
        assert!(matches!(
            ensure_absent(&path).await,
            Err(RecorderError::AlreadyRecorded { .. })
        ));
    }
}
