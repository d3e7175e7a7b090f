//! Manifest access and dependency extraction.
//!
//! The core never touches the filesystem directly; it goes through the
//! [`ManifestSource`] seam so tests can substitute fixed data.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// Read access to the project manifest and the installed package tree.
pub trait ManifestSource: Send + Sync {
    /// The project's own `package.json`.
    ///
    /// Read or parse failures degrade to an empty JSON object (logged at
    /// WARN); they never surface as errors. An unreadable manifest simply
    /// means there are no dependencies to check.
    fn project_manifest(&self) -> Value;

    /// The installed manifest for a dependency, if one exists.
    ///
    /// `None` covers every failure mode: not installed, unreadable,
    /// unparseable. A package may legitimately have no local copy to
    /// inspect (hoisted monorepos, optional peers), so absence is silent.
    fn installed_manifest(&self, name: &str) -> Option<Value>;
}

/// Filesystem-backed [`ManifestSource`] rooted at a project directory.
#[derive(Debug, Clone)]
pub struct DirManifests {
    root: PathBuf,
}

impl DirManifests {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_json(path: &Path) -> Option<Value> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

impl ManifestSource for DirManifests {
    fn project_manifest(&self) -> Value {
        let path = self.root.join("package.json");
        match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(value) => value,
                Err(e) => {
                    warn!("failed to parse {}: {e}", path.display());
                    Value::Object(serde_json::Map::new())
                }
            },
            Err(e) => {
                warn!("failed to read {}: {e}", path.display());
                Value::Object(serde_json::Map::new())
            }
        }
    }

    fn installed_manifest(&self, name: &str) -> Option<Value> {
        let path = self.root.join("node_modules").join(name).join("package.json");
        let manifest = Self::read_json(&path);
        if manifest.is_none() {
            trace!("no installed manifest for {name} at {}", path.display());
        }
        manifest
    }
}

/// Build the flat dependency set: name -> declared range.
///
/// `dependencies` always contributes; `devDependencies` only when
/// `include_dev` is set and is merged second, so on a name collision the
/// devDependencies range wins.
#[must_use]
pub fn dependency_set(manifest: &Value, include_dev: bool) -> BTreeMap<String, String> {
    let mut deps = BTreeMap::new();
    extract_section(manifest, "dependencies", &mut deps);
    if include_dev {
        extract_section(manifest, "devDependencies", &mut deps);
    }
    deps
}

/// Extract `resolutions` pins, keyed `"<owner>/<peer>"` -> pinned version.
#[must_use]
pub fn resolutions(manifest: &Value) -> BTreeMap<String, String> {
    let mut pins = BTreeMap::new();
    extract_section(manifest, "resolutions", &mut pins);
    pins
}

/// Extract `peerDependencies` from an installed manifest.
#[must_use]
pub fn peer_dependencies(manifest: &Value) -> BTreeMap<String, String> {
    let mut peers = BTreeMap::new();
    extract_section(manifest, "peerDependencies", &mut peers);
    peers
}

/// The `version` field of an installed manifest.
#[must_use]
pub fn manifest_version(manifest: &Value) -> Option<&str> {
    manifest.get("version")?.as_str()
}

/// Copy one string-to-string section of a manifest into `out`, overwriting
/// existing keys. Entries of the wrong type are skipped with a warning.
fn extract_section(manifest: &Value, section: &str, out: &mut BTreeMap<String, String>) {
    let Some(section_value) = manifest.get(section) else {
        return;
    };

    let Some(entries) = section_value.as_object() else {
        warn!(
            "'{section}' must be an object, got {}",
            json_type_name(section_value)
        );
        return;
    };

    for (name, range) in entries {
        if let Some(range) = range.as_str() {
            out.insert(name.clone(), range.to_string());
        } else {
            warn!(
                "ignoring '{name}' in {section}: expected string, got {}",
                json_type_name(range)
            );
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
