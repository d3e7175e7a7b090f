#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod check;
pub mod error;
pub mod manifest;
pub mod registry;
pub mod report;
pub mod versions;

pub use check::{run_check, CheckContext, CheckOptions, CheckOutcome, CheckReport};
pub use error::CheckError;
pub use manifest::{DirManifests, ManifestSource};
pub use registry::{NpmCliBackend, QueryFailure, RegistryBackend, RegistryOracle, DEFAULT_MAX_RETRIES};
pub use report::Diagnostic;
pub use versions::{RangeMatcher, VersionInfo};
