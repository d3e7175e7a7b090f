use thiserror::Error;

/// Core error type for a peerlint run.
///
/// Almost nothing here is fatal: missing installed manifests are skipped,
/// unreadable project manifests degrade to an empty dependency set, and
/// unsatisfied peer constraints are diagnostics, not errors. The one
/// condition that aborts a run is a registry query exhausting its retries,
/// because without version data the remaining resolution is meaningless.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("registry query for {package} ({field}) failed after {attempts} attempt(s): {last_error}")]
    RegistryExhausted {
        package: String,
        field: &'static str,
        attempts: u32,
        last_error: String,
    },
}
