//! Domain types shared across the pipeline (spec §3).

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Namespace a build belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Rpms,
    Modules,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Rpms => "rpms",
            Namespace::Modules => "modules",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which build-system role a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Destination,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Destination => "destination",
        }
    }
}

/// The tuple passed from the classifier to the orchestrator (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildData {
    pub ns: Namespace,
    pub comp: String,
    pub version: String,
    pub release: String,
    pub scmurl: String,
    /// Present only when a side-tag/stack-gate trigger resolved a
    /// downstream target override (spec §4.1 rule 5).
    pub downstream_target: Option<String>,
    /// Present only for modules: rpm component name -> pinned git ref,
    /// extracted from `xmd.mbs.rpms[*].ref` (spec §3).
    pub ref_overrides: Option<BTreeMap<String, String>>,
}

impl RebuildData {
    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.comp, self.version, self.release)
    }
}

/// An incoming tagging or repo-done event (spec §4.1, §6).
#[derive(Debug, Clone)]
pub struct TagEvent {
    pub topic: String,
    pub tag: String,
    pub name: String,
    pub version: String,
    pub release: String,
    pub build_id: i64,
}

#[derive(Debug, Clone)]
pub struct RepoDoneEvent {
    pub topic: String,
    pub tag: String,
}

/// Default per-handle wait timeout for `wait_repo` (spec §3, §4.6).
pub const WAIT_REPO_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Default batch-flush quiet period (spec §4.2).
pub const DEFAULT_BATCH_TIMER: Duration = Duration::from_secs(2);

/// Default config-reload tick interval (spec §4.4).
pub const DEFAULT_CONFIG_TIMER: Duration = Duration::from_secs(300);

/// Per-batch multicall size cap (spec §4.2).
pub const KOJI_BATCH: usize = 500;

/// Session TTL before forced re-login (spec §4.7).
pub const SESSION_TTL: Duration = Duration::from_secs(3550);
