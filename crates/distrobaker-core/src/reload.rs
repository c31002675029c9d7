//! Config Reloader (spec §4.4) — periodically checks the config
//! repository's tracked ref, and when it moves, clones, parses, validates,
//! synthesizes `comps`, optionally refreshes the autopackagelist, and
//! atomically swaps the published [`ConfigSnapshot`].
//!
//! Each tick resolves the ref with a bare `git ls-remote` first; the
//! expensive clone+parse+synthesize only runs when that ref moved or an
//! autopackagelist is configured (its package set can drift independently
//! of the config repo's own commits). This is a deliberate improvement
//! over `config.py`'s `update_config`, which reloads unconditionally on
//! every tick.
//!
//! Grounded on `config.py`'s `load_config`/`get_config` pair. `git
//! ls-remote` resolution and the clone live in [`crate::gitscm`]; this
//! module is the orchestration of those primitives plus the validation and
//! synthesis already built in [`crate::config`].

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use distrobaker_retry::RetryStrategyConfig;

use crate::config::{
    explicit_components, parse_main, synthesize_comps, ComponentSource, ConfigSnapshot,
    ConfigStore,
};
use crate::error::DaemonError;
use crate::gitscm;
use crate::http::fetch_autopackagelist;
use crate::session::SessionCache;

/// Everything the reloader needs to resolve and fetch one config revision,
/// independent of how config repo access is actually performed (a real
/// deployment points this at a git remote; tests point it at a `file://`
/// fixture).
pub struct ReloadSource {
    pub repo_url: String,
    pub refname: String,
    pub yaml_path: String,
}

fn load_yaml_file(dir: &Path, relative: &str) -> Result<String, DaemonError> {
    std::fs::read_to_string(dir.join(relative))
        .map_err(|e| DaemonError::Config(format!("reading {relative}: {e}")))
}

/// Clone the config repo at the currently resolved commit and parse+
/// validate+synthesize a full [`ConfigSnapshot`] (spec §4.4 steps 1-5).
pub async fn load_once(
    source: &ReloadSource,
    http_client: &reqwest::Client,
    retry: &RetryStrategyConfig,
) -> Result<ConfigSnapshot, DaemonError> {
    let repo_url = source.repo_url.clone();
    let refname = source.refname.clone();
    let commit = tokio::task::spawn_blocking(move || gitscm::resolve_ref(&repo_url, &refname))
        .await
        .map_err(|e| DaemonError::Config(format!("reload task panicked: {e}")))??;

    let repo_url = source.repo_url.clone();
    let yaml_path = source.yaml_path.clone();
    let commit_for_clone = commit.clone();
    let (yaml_text, _tempdir) = tokio::task::spawn_blocking(move || -> Result<(String, TempDir), DaemonError> {
        let tempdir = tempfile::tempdir()
            .map_err(|e| DaemonError::Config(format!("creating scratch dir: {e}")))?;
        gitscm::clone_at(&repo_url, &commit_for_clone, tempdir.path())?;
        let text = load_yaml_file(tempdir.path(), &yaml_path)?;
        Ok((text, tempdir))
    })
    .await
    .map_err(|e| DaemonError::Config(format!("reload task panicked: {e}")))??;

    let doc: serde_yaml::Value = serde_yaml::from_str(&yaml_text)
        .map_err(|e| DaemonError::Config(format!("invalid YAML in {}: {e}", source.yaml_path)))?;

    let main = parse_main(&doc)?;
    let (explicit_rpms, explicit_modules) = explicit_components(&doc);

    let rpms_source = match &main.control.autopackagelist {
        Some(apl) if explicit_rpms.is_empty() => {
            let base = apl.content_resolver.clone().unwrap_or_default();
            match fetch_autopackagelist(http_client, &base, &apl.view, retry).await {
                Ok(names) => ComponentSource::Names(names),
                Err(e) => {
                    warn!("autopackagelist fetch failed, falling back to explicit components: {e}");
                    ComponentSource::Explicit(explicit_rpms)
                }
            }
        }
        _ => ComponentSource::Explicit(explicit_rpms),
    };
    let modules_source = ComponentSource::Explicit(explicit_modules);

    let comps = synthesize_comps(&main, rpms_source, modules_source);

    info!(
        rpms = comps.len_for(crate::types::Namespace::Rpms),
        modules = comps.len_for(crate::types::Namespace::Modules),
        config_ref = %commit,
        "configuration loaded"
    );

    Ok(ConfigSnapshot {
        main,
        comps,
        config_ref: commit,
    })
}

/// Resolve just the config SCMURL's tracked ref, without cloning (spec
/// §4.4 step 1) — the cheap check `run`'s tick loop uses to decide
/// whether a full reload is warranted at all.
async fn resolve_config_ref(source: &ReloadSource) -> Result<String, DaemonError> {
    let repo_url = source.repo_url.clone();
    let refname = source.refname.clone();
    tokio::task::spawn_blocking(move || gitscm::resolve_ref(&repo_url, &refname))
        .await
        .map_err(|e| DaemonError::Config(format!("reload task panicked: {e}")))?
}

/// Whether a tick should do the full clone+parse+synthesize (spec §4.4
/// step 2): the observed ref moved, or an autopackagelist fetch is
/// configured and so the component set can change independently of the
/// config repo's own ref.
fn needs_reload(observed_ref: &str, current_ref: &str, autopackagelist_set: bool) -> bool {
    observed_ref != current_ref || autopackagelist_set
}

/// Run the periodic reload loop forever, swapping `store` whenever the
/// tracked ref moves to a new commit (spec §4.4). On the initial load
/// failure, propagates the error so the daemon can exit with the
/// configuration-error status (spec §6); failures on subsequent ticks are
/// logged and the previous configuration stays live.
pub async fn run(
    source: ReloadSource,
    store: Arc<ConfigStore>,
    sessions: Arc<SessionCache>,
    http_client: reqwest::Client,
    retry: RetryStrategyConfig,
    tick: Duration,
) -> Result<(), DaemonError> {
    let initial = load_once(&source, &http_client, &retry).await?;
    store.swap(initial).await;

    let mut ticker = interval(tick);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let current = store.snapshot().await;

        let observed = match resolve_config_ref(&source).await {
            Ok(r) => r,
            Err(e) => {
                error!("resolving configuration ref failed, skipping this tick: {e}");
                continue;
            }
        };

        if !needs_reload(&observed, &current.config_ref, current.main.control.autopackagelist.is_some()) {
            continue;
        }

        match load_once(&source, &http_client, &retry).await {
            Ok(snapshot) => {
                if snapshot.config_ref != current.config_ref {
                    info!(from = %current.config_ref, to = %snapshot.config_ref, "configuration ref changed, swapping");
                    sessions.invalidate_all().await;
                }
                store.swap(snapshot).await;
            }
            Err(e) => {
                error!("config reload failed, keeping previous configuration: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn init_repo_with_yaml(yaml: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .args(args)
                .current_dir(dir.path())
                .status()
                .unwrap();
            assert!(status.success());
        };
        run(&["init", "--quiet"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.path().join("distrobaker.yaml"), yaml).unwrap();
        run(&["add", "."]);
        run(&["commit", "--quiet", "-m", "initial"]);
        dir
    }

    fn sample_yaml() -> &'static str {
        r#"
configuration:
  source:
    scm: "https://src.example.com"
    cache: {url: "https://cache.src", cgi: "https://cache.src/cgi", path: "/src"}
    profile: "src-profile"
    mbs: {}
  destination:
    scm: "https://dst.example.com"
    cache: {url: "https://cache.dst", cgi: "https://cache.dst/cgi", path: "/dst"}
    profile: "dst-profile"
    mbs: {}
  trigger: {rpms: "f42-gate", modules: "f42-modular-gate"}
  build: {prefix: "git+https://pkgs.example.com", target: "f42", platform: "f42", scratch: false}
  git: {author: "bot", email: "bot@example.com", message: "sync"}
  control: {build: true, merge: true, strict: false}
  defaults:
    cache: {source: "cache/%(component)s", destination: "cache/%(component)s"}
    rpms: {source: "rpms/%(component)s", destination: "rpms/%(component)s"}
    modules: {source: "modules/%(component)s/%(stream)s", destination: "modules/%(component)s/%(stream)s"}
components:
  rpms:
    bash: {}
"#
    }

    #[tokio::test]
    async fn load_once_parses_a_real_repo_checkout() {
        let repo = init_repo_with_yaml(sample_yaml());
        let source = ReloadSource {
            repo_url: repo.path().to_str().unwrap().to_string(),
            refname: "HEAD".to_string(),
            yaml_path: "distrobaker.yaml".to_string(),
        };
        let client = reqwest::Client::new();
        let retry = RetryStrategyConfig::with_attempts(1);
        let snapshot = load_once(&source, &client, &retry).await.unwrap();
        assert_eq!(snapshot.main.trigger.rpms, "f42-gate");
        assert!(snapshot.comps.rpms.contains_key("bash"));
        assert_eq!(snapshot.config_ref.len(), 40);
    }

    #[tokio::test]
    async fn unknown_ref_is_a_config_error() {
        let repo = init_repo_with_yaml(sample_yaml());
        let source = ReloadSource {
            repo_url: repo.path().to_str().unwrap().to_string(),
            refname: "refs/heads/does-not-exist".to_string(),
            yaml_path: "distrobaker.yaml".to_string(),
        };
        let client = reqwest::Client::new();
        let retry = RetryStrategyConfig::with_attempts(1);
        let err = load_once(&source, &client, &retry).await.unwrap_err();
        assert!(matches!(err, DaemonError::UnknownRef(_)));
    }

    #[test]
    fn needs_reload_skips_when_ref_unchanged_and_no_autopackagelist() {
        assert!(!needs_reload("abc123", "abc123", false));
    }

    #[test]
    fn needs_reload_fires_when_ref_moved() {
        assert!(needs_reload("def456", "abc123", false));
    }

    #[test]
    fn needs_reload_fires_when_autopackagelist_configured_even_if_ref_unchanged() {
        assert!(needs_reload("abc123", "abc123", true));
    }

    #[tokio::test]
    async fn resolve_config_ref_does_not_clone_anything() {
        let repo = init_repo_with_yaml(sample_yaml());
        let source = ReloadSource {
            repo_url: repo.path().to_str().unwrap().to_string(),
            refname: "HEAD".to_string(),
            yaml_path: "distrobaker.yaml".to_string(),
        };
        let observed = resolve_config_ref(&source).await.unwrap();
        assert_eq!(observed.len(), 40);
    }
}
