//! Registry version oracle.
//!
//! Queries the npm CLI (`npm view --json <name> <field>`) for published
//! version lists and peer-dependency declarations. The subprocess boundary
//! is untrusted: every failure is retryable up to a configured bound, and
//! exhausting that bound aborts the run (without version data the rest of
//! resolution is meaningless).

use crate::error::CheckError;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default bound on attempts per registry query.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// A single failed registry query. Retryable by the oracle.
#[derive(Debug, Clone)]
pub struct QueryFailure {
    message: String,
}

impl QueryFailure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One external registry query, parsed as JSON.
///
/// Implementations must not retry internally; the oracle owns the retry
/// policy.
pub trait RegistryBackend: Send + Sync {
    fn view(&self, name: &str, field: &'static str) -> BoxFuture<'static, Result<Value, QueryFailure>>;
}

/// Production backend shelling out to the npm CLI.
#[derive(Debug, Clone)]
pub struct NpmCliBackend {
    program: String,
}

impl NpmCliBackend {
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NpmCliBackend {
    fn default() -> Self {
        Self::new("npm")
    }
}

impl RegistryBackend for NpmCliBackend {
    fn view(&self, name: &str, field: &'static str) -> BoxFuture<'static, Result<Value, QueryFailure>> {
        let program = self.program.clone();
        let name = name.to_string();

        Box::pin(async move {
            let output = Command::new(&program)
                .args(["view", "--json", &name, field])
                .output()
                .await
                .map_err(|e| QueryFailure::new(format!("failed to run {program}: {e}")))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(QueryFailure::new(format!(
                    "{program} view {name} {field} failed ({}): {}",
                    output.status,
                    stderr.trim()
                )));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stdout = stdout.trim();
            if stdout.is_empty() {
                // npm prints nothing for a field the package doesn't declare.
                return Ok(Value::Null);
            }

            serde_json::from_str(stdout).map_err(|e| {
                QueryFailure::new(format!("unparseable {program} output for {name} {field}: {e}"))
            })
        })
    }
}

/// The retrying oracle in front of a [`RegistryBackend`].
#[derive(Clone)]
pub struct RegistryOracle {
    backend: Arc<dyn RegistryBackend>,
    max_retries: u32,
}

impl RegistryOracle {
    /// `max_retries` is the total attempt budget per query; zero is clamped
    /// to one so every query runs at least once.
    #[must_use]
    pub fn new(backend: Arc<dyn RegistryBackend>, max_retries: u32) -> Self {
        Self {
            backend,
            max_retries: max_retries.max(1),
        }
    }

    /// The full published version list for a package.
    ///
    /// npm emits a bare string instead of an array when only one version
    /// was ever published.
    pub async fn versions(&self, name: &str) -> Result<Vec<String>, CheckError> {
        let value = self.query(name, "versions").await?;
        Ok(match value {
            Value::Array(entries) => entries
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            Value::String(version) => vec![version],
            Value::Null => Vec::new(),
            other => {
                warn!("unexpected versions payload for {name}: {other}");
                Vec::new()
            }
        })
    }

    /// The latest published peer-dependency declarations for a package.
    pub async fn peer_dependencies(&self, name: &str) -> Result<BTreeMap<String, String>, CheckError> {
        let value = self.query(name, "peerDependencies").await?;
        Ok(match value {
            Value::Object(entries) => entries
                .into_iter()
                .filter_map(|(peer, range)| match range {
                    Value::String(range) => Some((peer, range)),
                    _ => None,
                })
                .collect(),
            Value::Null => BTreeMap::new(),
            other => {
                warn!("unexpected peerDependencies payload for {name}: {other}");
                BTreeMap::new()
            }
        })
    }

    /// Issue a query with immediate retries, no backoff.
    async fn query(&self, name: &str, field: &'static str) -> Result<Value, CheckError> {
        let mut last_error = String::new();

        for attempt in 1..=self.max_retries {
            match self.backend.view(name, field).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    debug!(
                        "query {name} {field} failed (attempt {attempt}/{}): {e}",
                        self.max_retries
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(CheckError::RegistryExhausted {
            package: name.to_string(),
            field,
            attempts: self.max_retries,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend that fails a fixed number of times before succeeding.
    struct FlakyBackend {
        failures: u32,
        calls: AtomicU32,
        payload: Value,
    }

    impl FlakyBackend {
        fn new(failures: u32, payload: Value) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                payload,
            }
        }
    }

    impl RegistryBackend for FlakyBackend {
        fn view(&self, _name: &str, _field: &'static str) -> BoxFuture<'static, Result<Value, QueryFailure>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let result = if call < self.failures {
                Err(QueryFailure::new("simulated registry outage"))
            } else {
                Ok(self.payload.clone())
            };
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn test_recovers_within_retry_budget() {
        let backend = Arc::new(FlakyBackend::new(1, json!(["1.0.0", "2.0.0"])));
        let oracle = RegistryOracle::new(backend.clone(), 2);

        let versions = oracle.versions("left-pad").await.unwrap();

        assert_eq!(versions, vec!["1.0.0", "2.0.0"]);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhaustion_is_fatal_and_bounded() {
        let backend = Arc::new(FlakyBackend::new(u32::MAX, Value::Null));
        let oracle = RegistryOracle::new(backend.clone(), 3);

        let err = oracle.versions("left-pad").await.unwrap_err();

        // Exactly max_retries attempts, never one more.
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        let CheckError::RegistryExhausted {
            package,
            field,
            attempts,
            ..
        } = err;
        assert_eq!(package, "left-pad");
        assert_eq!(field, "versions");
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_zero_retries_clamped_to_one_attempt() {
        let backend = Arc::new(FlakyBackend::new(u32::MAX, Value::Null));
        let oracle = RegistryOracle::new(backend.clone(), 0);

        let _ = oracle.versions("left-pad").await.unwrap_err();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_published_version_is_bare_string() {
        let backend = Arc::new(FlakyBackend::new(0, json!("1.0.0")));
        let oracle = RegistryOracle::new(backend, DEFAULT_MAX_RETRIES);

        let versions = oracle.versions("one-hit-wonder").await.unwrap();

        assert_eq!(versions, vec!["1.0.0"]);
    }

    #[tokio::test]
    async fn test_missing_peer_dependencies_is_empty() {
        let backend = Arc::new(FlakyBackend::new(0, Value::Null));
        let oracle = RegistryOracle::new(backend, DEFAULT_MAX_RETRIES);

        let peers = oracle.peer_dependencies("lodash").await.unwrap();

        assert!(peers.is_empty());
    }

    #[tokio::test]
    async fn test_peer_dependencies_object() {
        let backend = Arc::new(FlakyBackend::new(
            0,
            json!({ "react": "^18.0.0", "react-dom": "^18.0.0" }),
        ));
        let oracle = RegistryOracle::new(backend, DEFAULT_MAX_RETRIES);

        let peers = oracle.peer_dependencies("react-router").await.unwrap();

        assert_eq!(peers.get("react").map(String::as_str), Some("^18.0.0"));
        assert_eq!(peers.len(), 2);
    }
}
