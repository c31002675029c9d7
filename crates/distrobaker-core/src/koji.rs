//! Build-system client contract (spec §2.1, §4) — the async trait the
//! orchestrator, classifier, and side-tag mapper drive; a concrete
//! implementation talks XML-RPC to the upstream and downstream build
//! systems, but nothing in this crate depends on that wire format
//! directly.
//!
//! Grounded on `kojihelpers.py`'s `get_session`/`get_build_target`/
//! `get_tag`/`multicall` helpers, reshaped as a `dyn`-compatible trait the
//! way the pack's `odgrim-abathur-swarm` and `openai-codex` crates expose
//! their backends (`#[async_trait]` over a plain trait, so callers hold a
//! `Arc<dyn BuildSystemClient>`).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DaemonError;
use crate::types::Role;

/// A logged-in handle to one build-system instance. Cheaply `Clone`
/// (backed by an `Arc`), so the [`crate::session::SessionCache`] can hand
/// out copies without re-authenticating.
#[derive(Clone)]
pub struct BuildSystemSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    token: String,
}

impl BuildSystemSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner { token: token.into() }),
        }
    }

    #[cfg(test)]
    pub fn new_for_test(token: impl Into<String>) -> Self {
        Self::new(token)
    }

    pub fn token(&self) -> &str {
        &self.inner.token
    }

    /// Best-effort: a build system that has already torn down the
    /// connection shouldn't prevent reauthentication.
    pub fn logout(&self) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub name: String,
    pub build_tag: String,
    pub dest_tag: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagInfo {
    pub name: String,
    pub id: i64,
    pub parents: Vec<String>,
    /// Koji tag `extra` map; `downstream_sidetag` memoizes the side-tag
    /// mapping protocol (spec §4.5).
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    pub name: String,
    pub version: String,
    pub release: String,
    pub nvr: String,
    pub source: Option<String>,
    /// Raw modulemd YAML for module builds, carrying the per-rpm ref
    /// overrides under `data.xmd.mbs.rpms` (spec §4.1 module enrichment).
    pub modulemd: Option<String>,
}

/// One `tagBuild`/`build` pair queued into a multicall (spec §4.2, §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRebuild {
    pub tag: String,
    pub scmurl: String,
    pub target: String,
    pub scratch: bool,
}

/// Outcome of one queued entry in a submitted multicall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildOutcome {
    Submitted { task_id: i64 },
    Failed { reason: String },
    /// `control.build: false` — logged as if submitted, never sent to the
    /// build system (spec §9 dry-run open question).
    DryRun,
}

#[async_trait]
pub trait BuildSystemClient: Send + Sync {
    async fn login(&self, role: Role) -> Result<BuildSystemSession, DaemonError>;

    async fn get_build_target(
        &self,
        session: &BuildSystemSession,
        name: &str,
    ) -> Result<Option<BuildTarget>, DaemonError>;

    async fn get_tag(
        &self,
        session: &BuildSystemSession,
        name: &str,
    ) -> Result<Option<TagInfo>, DaemonError>;

    async fn get_build(
        &self,
        session: &BuildSystemSession,
        nvr: &str,
    ) -> Result<Option<BuildInfo>, DaemonError>;

    /// Builds currently tagged into `tag`, newest first.
    async fn list_tagged(
        &self,
        session: &BuildSystemSession,
        tag: &str,
        package: Option<&str>,
    ) -> Result<Vec<BuildInfo>, DaemonError>;

    /// Create (or return the existing) side tag inheriting from `parent`
    /// (spec §4.1 rule 5, stack-gate).
    async fn create_side_tag(
        &self,
        session: &BuildSystemSession,
        parent: &str,
    ) -> Result<String, DaemonError>;

    /// Merge `extra` into a tag's extra map (spec §4.5 step 3, persisting
    /// the `downstream_sidetag` memoization after `create_side_tag`).
    async fn edit_tag2(
        &self,
        session: &BuildSystemSession,
        tag: &str,
        extra: BTreeMap<String, String>,
    ) -> Result<(), DaemonError>;

    /// Bulk `tagBuild(target, nvr)` multicall for the pre-tag step (spec
    /// §4.3 step 2), capped at [`crate::types::KOJI_BATCH`] entries per
    /// call by the orchestrator. Issued before `wait_repo` and before any
    /// `build` call for the same batch (spec §8 "Tag-before-build").
    async fn tag_builds(
        &self,
        session: &BuildSystemSession,
        target: &str,
        nvrs: &[String],
    ) -> Result<Vec<RebuildOutcome>, DaemonError>;

    /// Submit a batch of rebuilds as one multicall, capped at
    /// [`crate::types::KOJI_BATCH`] entries per call by the orchestrator.
    async fn submit_batch(
        &self,
        session: &BuildSystemSession,
        rebuilds: &[QueuedRebuild],
    ) -> Result<Vec<RebuildOutcome>, DaemonError>;
}

/// In-memory double used by unit and integration tests (spec-grounded
/// replacement for a real XML-RPC client, same role as the teacher's
/// `MockReporter` in `engine_parallel.rs` tests).
#[derive(Default)]
pub struct FakeBuildSystem {
    pub targets: std::sync::Mutex<BTreeMap<String, BuildTarget>>,
    pub tags: std::sync::Mutex<BTreeMap<String, TagInfo>>,
    pub builds: std::sync::Mutex<BTreeMap<String, BuildInfo>>,
    pub tagged: std::sync::Mutex<BTreeMap<String, Vec<BuildInfo>>>,
    pub submitted: std::sync::Mutex<Vec<QueuedRebuild>>,
    /// `(target, nvr)` pairs passed to `tag_builds`, in call order.
    pub tag_build_calls: std::sync::Mutex<Vec<(String, String)>>,
    pub next_task_id: std::sync::atomic::AtomicI64,
}

#[async_trait]
impl BuildSystemClient for FakeBuildSystem {
    async fn login(&self, role: Role) -> Result<BuildSystemSession, DaemonError> {
        Ok(BuildSystemSession::new(format!("fake-{}", role.as_str())))
    }

    async fn get_build_target(
        &self,
        _session: &BuildSystemSession,
        name: &str,
    ) -> Result<Option<BuildTarget>, DaemonError> {
        Ok(self.targets.lock().unwrap().get(name).cloned())
    }

    async fn get_tag(
        &self,
        _session: &BuildSystemSession,
        name: &str,
    ) -> Result<Option<TagInfo>, DaemonError> {
        Ok(self.tags.lock().unwrap().get(name).cloned())
    }

    async fn get_build(
        &self,
        _session: &BuildSystemSession,
        nvr: &str,
    ) -> Result<Option<BuildInfo>, DaemonError> {
        Ok(self.builds.lock().unwrap().get(nvr).cloned())
    }

    async fn list_tagged(
        &self,
        _session: &BuildSystemSession,
        tag: &str,
        package: Option<&str>,
    ) -> Result<Vec<BuildInfo>, DaemonError> {
        let all = self.tagged.lock().unwrap().get(tag).cloned().unwrap_or_default();
        Ok(match package {
            Some(p) => all.into_iter().filter(|b| b.name == p).collect(),
            None => all,
        })
    }

    async fn create_side_tag(
        &self,
        _session: &BuildSystemSession,
        parent: &str,
    ) -> Result<String, DaemonError> {
        let mut tags = self.tags.lock().unwrap();
        let n = tags.keys().filter(|k| k.starts_with(&format!("{parent}-side-"))).count();
        let name = format!("{parent}-side-{n}");
        tags.insert(
            name.clone(),
            TagInfo {
                name: name.clone(),
                id: tags.len() as i64,
                parents: vec![parent.to_string()],
                extra: HashMap::new(),
            },
        );
        Ok(name)
    }

    async fn edit_tag2(
        &self,
        _session: &BuildSystemSession,
        tag: &str,
        extra: BTreeMap<String, String>,
    ) -> Result<(), DaemonError> {
        let mut tags = self.tags.lock().unwrap();
        let entry = tags.entry(tag.to_string()).or_insert_with(|| TagInfo {
            name: tag.to_string(),
            id: 0,
            parents: Vec::new(),
            extra: HashMap::new(),
        });
        entry.extra.extend(extra);
        Ok(())
    }

    async fn tag_builds(
        &self,
        _session: &BuildSystemSession,
        target: &str,
        nvrs: &[String],
    ) -> Result<Vec<RebuildOutcome>, DaemonError> {
        let mut calls = self.tag_build_calls.lock().unwrap();
        let mut out = Vec::with_capacity(nvrs.len());
        for nvr in nvrs {
            calls.push((target.to_string(), nvr.clone()));
            let task_id = self
                .next_task_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            out.push(RebuildOutcome::Submitted { task_id });
        }
        Ok(out)
    }

    async fn submit_batch(
        &self,
        _session: &BuildSystemSession,
        rebuilds: &[QueuedRebuild],
    ) -> Result<Vec<RebuildOutcome>, DaemonError> {
        let mut submitted = self.submitted.lock().unwrap();
        let mut out = Vec::with_capacity(rebuilds.len());
        for r in rebuilds {
            submitted.push(r.clone());
            let task_id = self
                .next_task_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            out.push(RebuildOutcome::Submitted { task_id });
        }
        Ok(out)
    }
}
