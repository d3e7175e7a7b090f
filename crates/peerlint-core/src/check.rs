//! Peer-dependency discovery, resolution and reconciliation.
//!
//! A run is a straight-line pipeline over shared in-memory maps owned by a
//! [`CheckContext`]: build the flat dependency set, discover each
//! dependency's peer requirements (fanning out across owners), resolve the
//! version range of every peer target that is itself a project dependency
//! (fanning out across names), then check every (owner, peer) pair
//! sequentially so the output order is deterministic.

use crate::error::CheckError;
use crate::manifest::{self, ManifestSource};
use crate::registry::{RegistryBackend, RegistryOracle};
use crate::report::Diagnostic;
use crate::versions::{self, RangeMatcher, VersionInfo};
use futures::stream::{self, StreamExt, TryStreamExt};
use semver::Version;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Maximum concurrent registry queries during fan-out phases.
const MAX_CONCURRENT_QUERIES: usize = 16;

/// Options for a check run.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Include devDependencies in the dependency set.
    pub include_dev: bool,
    /// Honor `resolutions` pins from the project manifest.
    pub include_resolutions: bool,
    /// Total attempt budget per registry query.
    pub max_retries: u32,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            include_dev: true,
            include_resolutions: false,
            max_retries: crate::registry::DEFAULT_MAX_RETRIES,
        }
    }
}

/// Outcome of a run.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The manifest declared nothing to check. A configuration problem to
    /// report, not an error exit.
    NoDependencies,
    /// The check ran to completion; the report may or may not be clean.
    Report(CheckReport),
}

/// Everything the checker concluded.
#[derive(Debug)]
pub struct CheckReport {
    /// Unmet constraints, in (owner, peer) order.
    pub diagnostics: Vec<Diagnostic>,
    /// How many owners declared peer requirements.
    pub owners: usize,
    /// How many (owner, peer) pairs were checked.
    pub constraints: usize,
}

impl CheckReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Shared state for one run. Owns every map the phases touch; nothing is
/// process-global.
pub struct CheckContext {
    deps: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
    manifests: Arc<dyn ManifestSource>,
    oracle: RegistryOracle,
    versions: RwLock<HashMap<String, Arc<VersionInfo>>>,
    peers: RwLock<BTreeMap<String, BTreeMap<String, String>>>,
}

impl CheckContext {
    #[must_use]
    pub fn new(
        deps: BTreeMap<String, String>,
        overrides: BTreeMap<String, String>,
        manifests: Arc<dyn ManifestSource>,
        oracle: RegistryOracle,
    ) -> Self {
        Self {
            deps,
            overrides,
            manifests,
            oracle,
            versions: RwLock::new(HashMap::new()),
            peers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Discover peer requirements for every dependency, concurrently across
    /// owners. Joins before returning; the first fatal error cancels the
    /// remaining in-flight work.
    pub async fn discover_all(&self) -> Result<(), CheckError> {
        stream::iter(self.deps.clone())
            .map(|(name, range)| async move { self.discover_one(&name, &range).await })
            .buffer_unordered(MAX_CONCURRENT_QUERIES)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    /// Resolve the version range of every peer target that is also a
    /// project dependency, concurrently across names.
    pub async fn resolve_peer_targets(&self) -> Result<(), CheckError> {
        let mut targets = BTreeSet::new();
        {
            let peers = self.peers.read().await;
            for requirements in peers.values() {
                targets.extend(requirements.keys().cloned());
            }
        }

        let pending: Vec<(String, String)> = {
            let cache = self.versions.read().await;
            targets
                .into_iter()
                .filter(|name| !cache.contains_key(name))
                .filter_map(|name| {
                    let range = self.deps.get(&name)?.clone();
                    Some((name, range))
                })
                .collect()
        };

        stream::iter(pending)
            .map(|(name, range)| async move { self.version_info(&name, &range).await.map(|_| ()) })
            .buffer_unordered(MAX_CONCURRENT_QUERIES)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    /// Evaluate every collected (owner, peer, range) triple.
    #[must_use]
    pub fn into_report(self) -> CheckReport {
        let versions = self.versions.into_inner();
        let peers = self.peers.into_inner();
        check_all(&self.deps, &self.overrides, &versions, &peers)
    }

    /// Discover one owner's peer requirements, preferring the locally
    /// installed manifest unless it is stale relative to what a fresh
    /// install would pull.
    async fn discover_one(&self, name: &str, range: &str) -> Result<(), CheckError> {
        let Some(installed) = self.manifests.installed_manifest(name) else {
            return Ok(());
        };

        let local_peers = manifest::peer_dependencies(&installed);
        if local_peers.is_empty() {
            return Ok(());
        }

        let info = self.version_info(name, range).await?;
        let installed_version =
            manifest::manifest_version(&installed).and_then(|v| Version::parse(v).ok());

        // If nothing published satisfies the declared range there is no
        // maximum to compare against; trust the local manifest.
        let stale = match (installed_version.as_ref(), info.maximum.as_ref()) {
            (Some(installed), Some(maximum)) => installed < maximum,
            _ => false,
        };

        let peers = if stale {
            debug!("{name}: installed version below the newest allowed; using the registry to determine peerDependencies");
            self.oracle.peer_dependencies(name).await?
        } else {
            debug!("{name}: using the local package.json to determine peerDependencies");
            local_peers
        };

        if !peers.is_empty() {
            self.add_peer_requirements(name, peers).await;
        }
        Ok(())
    }

    /// Memoized version info for a package. The first caller's range wins
    /// the cache entry; names carry one relevant range per run.
    async fn version_info(&self, name: &str, range: &str) -> Result<Arc<VersionInfo>, CheckError> {
        if let Some(info) = self.versions.read().await.get(name) {
            return Ok(Arc::clone(info));
        }

        debug!("Getting versions for {name}@{range}...");
        let published = self.oracle.versions(name).await?;
        let info = Arc::new(VersionInfo::from_published(&published, range));
        debug!(
            "{name}@{range}: '{}' to '{}'",
            fmt_bound(info.minimum.as_ref()),
            fmt_bound(info.maximum.as_ref())
        );

        let mut cache = self.versions.write().await;
        Ok(Arc::clone(cache.entry(name.to_string()).or_insert(info)))
    }

    /// Merge requirements for an owner. Merges add keys, never remove.
    async fn add_peer_requirements(&self, owner: &str, incoming: BTreeMap<String, String>) {
        let mut peers = self.peers.write().await;
        let entry = peers.entry(owner.to_string()).or_default();
        for (peer, range) in incoming {
            debug!("{owner} peerDependency: {peer}@{range}");
            entry.insert(peer, range);
        }
    }
}

/// Run the whole pipeline against injected manifest and registry seams.
pub async fn run_check(
    manifests: Arc<dyn ManifestSource>,
    backend: Arc<dyn RegistryBackend>,
    options: &CheckOptions,
) -> Result<CheckOutcome, CheckError> {
    let project = manifests.project_manifest();

    let deps = manifest::dependency_set(&project, options.include_dev);
    if deps.is_empty() {
        return Ok(CheckOutcome::NoDependencies);
    }
    for (name, range) in &deps {
        debug!("dependency {name}: {range}");
    }

    let overrides = if options.include_resolutions {
        manifest::resolutions(&project)
    } else {
        BTreeMap::new()
    };

    let oracle = RegistryOracle::new(backend, options.max_retries);
    let ctx = CheckContext::new(deps, overrides, manifests, oracle);

    debug!("Determining peerDependencies...");
    ctx.discover_all().await?;

    debug!("Determining peerDependency version ranges from the registry...");
    ctx.resolve_peer_targets().await?;

    debug!("Checking versions...");
    Ok(CheckOutcome::Report(ctx.into_report()))
}

/// The reconciliation pass. Pure and sequential over BTreeMap order, so a
/// given input always renders the same output.
fn check_all(
    deps: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
    versions: &HashMap<String, Arc<VersionInfo>>,
    peers: &BTreeMap<String, BTreeMap<String, String>>,
) -> CheckReport {
    let mut diagnostics = Vec::new();
    let mut constraints = 0;

    for (owner, requirements) in peers {
        for (peer, required_range) in requirements {
            constraints += 1;
            debug!("Checking {owner}'s peerDependency of '{peer}@{required_range}'");

            let matcher = RangeMatcher::lenient(required_range);

            // Path (a): the project's own dependency on the peer, judged by
            // the minimum version its declared range resolves to.
            let mut found = false;
            if deps.contains_key(peer) {
                if let (Some(matcher), Some(info)) = (matcher.as_ref(), versions.get(peer)) {
                    found = info.minimum.as_ref().is_some_and(|min| matcher.matches(min));
                }
            }

            // Path (b): an explicit resolution pin for this exact pair.
            // Independent of (a); either suffices.
            if !found {
                if let Some(pin) = overrides.get(&format!("{owner}/{peer}")) {
                    found = versions::version_satisfies(pin, required_range);
                }
            }

            if !found {
                let declared_range = deps.get(peer).cloned();
                let satisfiable = declared_range.as_ref().and_then(|_| {
                    let info = versions.get(peer)?;
                    Some(matcher.as_ref().is_some_and(|m| info.any_satisfies(m)))
                });
                diagnostics.push(Diagnostic {
                    owner: owner.clone(),
                    peer: peer.clone(),
                    required_range: required_range.clone(),
                    declared_range,
                    satisfiable,
                });
            }
        }
    }

    CheckReport {
        diagnostics,
        owners: peers.len(),
        constraints,
    }
}

fn fmt_bound(bound: Option<&Version>) -> String {
    bound.map_or_else(|| "none".to_string(), ToString::to_string)
}
