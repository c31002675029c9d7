//! Side-Tag Mapping (spec §3, §4.1 rule 5) — memoizes which side tags the
//! orchestrator has created, so a later tagging event arriving via that
//! side tag is recognized and routed to the right downstream target
//! instead of falling through as unrecognized.
//!
//! In dry-run (`control.build: false`), no side tag is ever created on the
//! real build system; the mapper still records a synthetic name so the
//! rest of the pipeline exercises the same code path (spec §4.1, §9).

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::DaemonError;
use crate::koji::{BuildSystemClient, BuildSystemSession};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SideTagEntry {
    downstream_target: String,
    /// The provisioned downstream side tag, once known (spec §4.5).
    side_tag: String,
}

/// Tracks side tags this daemon created, keyed by the upstream tag name
/// events arrive on (the stack-gate or `-side` tag itself). Side tags
/// only ever route rpms builds (spec rule 5), so there's no namespace to
/// track alongside the mapping.
pub struct SideTagMap {
    entries: Mutex<HashMap<String, SideTagEntry>>,
}

impl SideTagMap {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record the provisioned side tag for `upstream_sidetag` (spec §4.5).
    fn record_side_tag(&self, upstream_sidetag: &str, side_tag: &str, downstream_target: &str) {
        self.entries.lock().unwrap().insert(
            upstream_sidetag.to_string(),
            SideTagEntry {
                downstream_target: downstream_target.to_string(),
                side_tag: side_tag.to_string(),
            },
        );
    }

    /// The previously-provisioned side tag for `upstream_sidetag`, if any
    /// (local fast path for [`ensure_side_tag`]'s memoization).
    fn side_tag_for(&self, upstream_sidetag: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(upstream_sidetag)
            .map(|e| e.side_tag.clone())
    }

    /// A deterministic synthetic side-tag name used in dry-run, so the
    /// pipeline exercises the side-tag code path without ever calling
    /// `createSideTag` (spec §4.1 rule 5, §9 dry-run open question).
    pub fn synthetic_name(build_tag: &str) -> String {
        format!("{build_tag}-dry-run-mode-stack-gate")
    }

    /// The configured build target a previously-provisioned side tag's
    /// builds route through. Used by tests and diagnostics; production
    /// routing reads it off [`crate::types::RebuildData`] directly.
    pub fn downstream_target_for(&self, tag: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap()
            .get(tag)
            .map(|e| e.downstream_target.clone())
    }
}

impl Default for SideTagMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Provision (once) the downstream side tag for a stack-gate or `-side`
/// upstream tag (spec §4.5). Memoized both locally, so a second
/// classification in this process never repeats the round trip, and on
/// the upstream tag's own `extra.downstream_sidetag`, so a fresh process
/// picks up a mapping created by an earlier one.
///
/// `downstream_target` is the configured build target builds routed
/// through this side tag ultimately land on; it's recorded for
/// [`SideTagMap::downstream_target_for`] lookups, not used to name the
/// side tag itself.
pub async fn ensure_side_tag(
    map: &SideTagMap,
    build_system: &dyn BuildSystemClient,
    source_session: &BuildSystemSession,
    dest_session: &BuildSystemSession,
    upstream_sidetag: &str,
    downstream_build_target: &str,
    downstream_target: &str,
    dry_run: bool,
) -> Result<String, DaemonError> {
    if let Some(side_tag) = map.side_tag_for(upstream_sidetag) {
        return Ok(side_tag);
    }

    if dry_run {
        let synthetic = SideTagMap::synthetic_name(downstream_build_target);
        map.record_side_tag(upstream_sidetag, &synthetic, downstream_target);
        return Ok(synthetic);
    }

    if let Some(tag_info) = build_system.get_tag(source_session, upstream_sidetag).await? {
        if let Some(existing) = tag_info.extra.get("downstream_sidetag") {
            map.record_side_tag(upstream_sidetag, existing, downstream_target);
            return Ok(existing.clone());
        }
    }

    let new_tag = build_system
        .create_side_tag(dest_session, downstream_build_target)
        .await?;

    let mut extra = BTreeMap::new();
    extra.insert("downstream_sidetag".to_string(), new_tag.clone());
    build_system
        .edit_tag2(source_session, upstream_sidetag, extra)
        .await?;

    map.record_side_tag(upstream_sidetag, &new_tag, downstream_target);
    Ok(new_tag)
}
