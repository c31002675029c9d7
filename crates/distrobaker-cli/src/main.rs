//! `distrobaker` — mirrors upstream build-system tagging events into a
//! downstream build system (spec §6).
//!
//! The concrete Koji-shaped client and message-bus transport are external
//! collaborators this crate doesn't implement (spec §1 Out of scope); this
//! binary wires the pipeline against `distrobaker_core`'s in-memory
//! reference implementations (`FakeBuildSystem`, `FakeBus`) so the
//! end-to-end process is runnable and testable without a real Koji
//! instance. Swapping in a real client means implementing
//! `BuildSystemClient`/`MessageBus` against the deployment's actual RPC
//! and bus libraries.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use regex::Regex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use distrobaker_core::awaited::AwaitedRepoRegistry;
use distrobaker_core::bus::FakeBus;
use distrobaker_core::config::ConfigStore;
use distrobaker_core::daemon::Daemon;
use distrobaker_core::http::GitSyncClient;
use distrobaker_core::koji::FakeBuildSystem;
use distrobaker_core::oneshot::{self, Selector};
use distrobaker_core::reload::{load_once, ReloadSource};
use distrobaker_core::scmurl::split_scmurl;
use distrobaker_core::session::SessionCache;
use distrobaker_core::sidetag::SideTagMap;
use distrobaker_core::types::Namespace;
use distrobaker_retry::RetryStrategyConfig;

const EXIT_OK: u8 = 0;
const EXIT_CLI_MISUSE: u8 = 1;
const EXIT_CONFIG_LOAD_FAILURE: u8 = 128;

/// Mirrors upstream build-system tagging events into a downstream build system.
#[derive(Parser, Debug)]
#[command(name = "distrobaker", version)]
struct Cli {
    /// Config-repo SCMURL (`<git-url>[#ref]`, ref defaults to `master`).
    config: String,

    /// Logging verbosity (error, warn, info, debug, trace).
    #[arg(short = 'l', long, default_value = "info")]
    loglevel: String,

    /// Config-reload period in minutes.
    #[arg(short = 'u', long, default_value_t = 5)]
    update: u64,

    /// Attempts for git clone / Content-Resolver fetches.
    #[arg(short = 'r', long, default_value_t = 3)]
    retry: u32,

    /// Process the selection once and exit instead of running the daemon loop.
    #[arg(short = '1', long)]
    oneshot: bool,

    /// Log what would happen without contacting the build system.
    #[arg(short = 'd', long = "dry-run", visible_short_alias = 'n')]
    dry_run: bool,

    /// `ns/comp` entries to process in oneshot mode (requires --oneshot).
    #[arg(short = 's', long, value_delimiter = ' ')]
    select: Vec<String>,

    /// Base URL of the git-sync endpoint this daemon notifies after a push.
    #[arg(long)]
    distrogitsync_endpoint: Option<String>,
}

fn parse_selector(raw: &[String]) -> Result<Vec<(Namespace, String)>, String> {
    let pattern = Regex::new(r"^(rpms|modules)/[A-Za-z0-9:._+-]+$").unwrap();
    raw.iter()
        .map(|entry| {
            let caps = pattern
                .captures(entry)
                .ok_or_else(|| format!("invalid selector {entry:?}, expected ns/comp"))?;
            let ns = match &caps[1] {
                "rpms" => Namespace::Rpms,
                "modules" => Namespace::Modules,
                _ => unreachable!(),
            };
            let comp = entry[caps[1].len() + 1..].to_string();
            Ok((ns, comp))
        })
        .collect()
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if !cli.select.is_empty() && !cli.oneshot {
        eprintln!("-s/--select requires --oneshot");
        return ExitCode::from(EXIT_CLI_MISUSE);
    }

    let selection = match parse_selector(&cli.select) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EXIT_CLI_MISUSE);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.loglevel).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e}");
            return ExitCode::from(EXIT_CLI_MISUSE);
        }
    };

    runtime.block_on(run(cli, selection))
}

async fn run(cli: Cli, selection: Vec<(Namespace, String)>) -> ExitCode {
    let parsed = split_scmurl(&cli.config);
    let refname = parsed.ref_.unwrap_or_else(|| "master".to_string());
    let reload_source = ReloadSource {
        repo_url: parsed.link,
        refname,
        yaml_path: "distrobaker.yaml".to_string(),
    };

    let http_client = reqwest::Client::new();
    let retry = RetryStrategyConfig::with_attempts(cli.retry);

    let mut initial = match load_once(&reload_source, &http_client, &retry).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("initial configuration load failed: {e}");
            return ExitCode::from(EXIT_CONFIG_LOAD_FAILURE);
        }
    };
    if cli.dry_run {
        initial.main.control.build = false;
    }

    let build_system = Arc::new(FakeBuildSystem::default());
    let awaited = Arc::new(AwaitedRepoRegistry::new());
    let sessions = Arc::new(SessionCache::new());
    let git_sync = cli
        .distrogitsync_endpoint
        .as_ref()
        .map(|endpoint| GitSyncClient::new(http_client.clone(), endpoint.clone()));

    if cli.oneshot {
        let store = Arc::new(ConfigStore::new(initial));
        let snapshot = store.snapshot().await;
        let session = match build_system.login(distrobaker_core::types::Role::Destination).await {
            Ok(s) => s,
            Err(e) => {
                error!("login failed: {e}");
                return ExitCode::from(EXIT_CLI_MISUSE);
            }
        };
        let selector = if selection.is_empty() {
            Selector::All
        } else {
            Selector::Named(selection)
        };
        let results = oneshot::run(
            &snapshot,
            build_system.as_ref(),
            &session,
            &awaited,
            git_sync.as_ref(),
            selector,
        )
        .await;
        for result in results {
            match result.outcome {
                Ok(outcome) => info!(component = %result.data.comp, "{outcome:?}"),
                Err(e) => error!(component = %result.data.comp, "{e}"),
            }
        }
        return ExitCode::from(EXIT_OK);
    }

    let store = Arc::new(ConfigStore::new(initial));
    let daemon = Daemon {
        store,
        sessions,
        awaited,
        sidetags: Arc::new(SideTagMap::new()),
        build_system,
        bus: Arc::new(FakeBus::new()),
        http_client,
        retry,
        reload_source,
        git_sync,
        batch_timer: distrobaker_core::daemon::default_batch_timer(),
        config_timer: Duration::from_secs(cli.update * 60),
    };

    match daemon.run().await {
        Ok(()) => ExitCode::from(EXIT_OK),
        Err(e) => {
            error!("daemon exited: {e}");
            ExitCode::from(EXIT_CLI_MISUSE)
        }
    }
}
