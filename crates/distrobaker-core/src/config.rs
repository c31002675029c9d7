//! Configuration Store (spec §2.2, §3) — the `main`/`comps`/`config_ref`
//! triple, its explicit record types, and the atomic swap that publishes a
//! freshly-loaded configuration.
//!
//! The teacher's `.shipper.toml` loader derives its structure straight
//! from serde; `distrobaker.yaml` cannot, because every missing key has to
//! be reported with a specific path (`"defaults.cache.source missing"`,
//! spec Design Notes). So this module walks a `serde_yaml::Value` by hand,
//! the way the original Python `load_config` does, and turns each missing
//! or malformed key into a `DaemonError::Config` with that path baked in.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_yaml::Value;
use tokio::sync::RwLock;

use crate::error::DaemonError;
use crate::module::split_module;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDestPair {
    pub scm: String,
    pub cache_url: String,
    pub cache_cgi: String,
    pub cache_path: String,
    pub profile: String,
    pub mbs: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub rpms: String,
    pub modules: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    pub prefix: String,
    pub target: String,
    pub platform: String,
    pub scratch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitMeta {
    pub author: String,
    pub email: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeSet {
    pub rpms: BTreeSet<String>,
    pub modules: BTreeSet<String>,
}

impl ExcludeSet {
    pub fn get(&self, ns: crate::types::Namespace) -> &BTreeSet<String> {
        match ns {
            crate::types::Namespace::Rpms => &self.rpms,
            crate::types::Namespace::Modules => &self.modules,
        }
    }
}

/// Both observed shapes (`{content_resolver, view}` and `{view}`) are
/// accepted (spec §9 open question).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutopackagelistConfig {
    pub content_resolver: Option<String>,
    pub view: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub build: bool,
    pub merge: bool,
    pub strict: bool,
    pub autopackagelist: Option<AutopackagelistConfig>,
    pub exclude: ExcludeSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTemplate {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub cache: CacheTemplate,
    pub rpms: CacheTemplate,
    pub modules: CacheTemplate,
}

/// The `main` global policy record (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainConfig {
    pub source: SourceDestPair,
    pub destination: SourceDestPair,
    pub trigger: Trigger,
    pub build: BuildConfig,
    pub git: GitMeta,
    pub control: Control,
    pub defaults: Defaults,
}

impl MainConfig {
    /// The upstream build tag (`trigger.rpms` with `-gate` -> `-build`,
    /// spec §4.1).
    pub fn upstream_build_tag(&self) -> String {
        if let Some(stripped) = self.trigger.rpms.strip_suffix("-gate") {
            format!("{stripped}-build")
        } else {
            self.trigger.rpms.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteCache {
    pub source: String,
    pub destination: String,
}

/// A single component's routing (spec §3 `comps`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRoute {
    pub source: String,
    pub destination: String,
    pub cache: RouteCache,
}

/// Per-component routing tables, keyed by component name (`rpms`) or
/// `"name:stream"` (`modules`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Comps {
    pub rpms: BTreeMap<String, ComponentRoute>,
    pub modules: BTreeMap<String, ComponentRoute>,
}

impl Comps {
    pub fn get(&self, ns: crate::types::Namespace, key: &str) -> Option<&ComponentRoute> {
        match ns {
            crate::types::Namespace::Rpms => self.rpms.get(key),
            crate::types::Namespace::Modules => self.modules.get(key),
        }
    }

    pub fn contains(&self, ns: crate::types::Namespace, key: &str) -> bool {
        self.get(ns, key).is_some()
    }

    pub fn len_for(&self, ns: crate::types::Namespace) -> usize {
        match ns {
            crate::types::Namespace::Rpms => self.rpms.len(),
            crate::types::Namespace::Modules => self.modules.len(),
        }
    }
}

/// A fully loaded, validated configuration, ready to publish atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub main: MainConfig,
    pub comps: Comps,
    pub config_ref: String,
}

// --- YAML walking helpers -------------------------------------------------

fn path_err(path: &str) -> DaemonError {
    DaemonError::Config(format!("{path} missing"))
}

fn get<'a>(map: &'a Value, key: &str) -> Option<&'a Value> {
    map.get(key)
}

fn require_map<'a>(map: &'a Value, key: &str, path: &str) -> Result<&'a Value, DaemonError> {
    match get(map, key) {
        Some(v) if v.is_mapping() => Ok(v),
        _ => Err(path_err(path)),
    }
}

fn require_str(map: &Value, key: &str, path: &str) -> Result<String, DaemonError> {
    match get(map, key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(v) if !v.is_null() => Ok(yaml_scalar_to_string(v)),
        _ => Err(path_err(path)),
    }
}

fn yaml_scalar_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn optional_bool(map: &Value, key: &str, default: bool) -> bool {
    match get(map, key) {
        Some(Value::Bool(b)) => *b,
        _ => default,
    }
}

fn require_bool(map: &Value, key: &str, path: &str) -> Result<bool, DaemonError> {
    match get(map, key) {
        Some(Value::Bool(b)) => Ok(*b),
        _ => Err(path_err(path)),
    }
}

/// Parse and structurally validate `distrobaker.yaml`'s `configuration`
/// block into a [`MainConfig`] (spec §3, §4.4 step 4).
pub fn parse_main(y: &Value) -> Result<MainConfig, DaemonError> {
    let cnf = require_map(y, "configuration", "configuration")?;

    let parse_source_dest = |which: &str| -> Result<SourceDestPair, DaemonError> {
        let block = require_map(cnf, which, which)?;
        let scm = require_str(block, "scm", &format!("{which}.scm"))?;
        let cache = require_map(block, "cache", &format!("{which}.cache"))?;
        let cache_url = require_str(cache, "url", &format!("{which}.cache.url"))?;
        let cache_cgi = require_str(cache, "cgi", &format!("{which}.cache.cgi"))?;
        let cache_path = require_str(cache, "path", &format!("{which}.cache.path"))?;
        let profile = require_str(block, "profile", &format!("{which}.profile"))?;
        let mbs = get(block, "mbs")
            .cloned()
            .ok_or_else(|| path_err(&format!("{which}.mbs")))?;
        Ok(SourceDestPair {
            scm,
            cache_url,
            cache_cgi,
            cache_path,
            profile,
            mbs,
        })
    };

    let source = parse_source_dest("source")?;
    let destination = parse_source_dest("destination")?;

    let trigger_block = require_map(cnf, "trigger", "trigger")?;
    let trigger = Trigger {
        rpms: require_str(trigger_block, "rpms", "trigger.rpms")?,
        modules: require_str(trigger_block, "modules", "trigger.modules")?,
    };

    let build_block = require_map(cnf, "build", "build")?;
    let build = BuildConfig {
        prefix: require_str(build_block, "prefix", "build.prefix")?,
        target: require_str(build_block, "target", "build.target")?,
        platform: require_str(build_block, "platform", "build.platform")?,
        scratch: optional_bool(build_block, "scratch", false),
    };

    let git_block = require_map(cnf, "git", "git")?;
    let git = GitMeta {
        author: require_str(git_block, "author", "git.author")?,
        email: require_str(git_block, "email", "git.email")?,
        message: require_str(git_block, "message", "git.message")?,
    };

    let control_block = require_map(cnf, "control", "control")?;
    let mut exclude = ExcludeSet::default();
    if let Some(ex) = get(control_block, "exclude").filter(|v| v.is_mapping()) {
        if let Some(Value::Sequence(items)) = get(ex, "rpms") {
            exclude.rpms = items.iter().filter_map(|v| v.as_str()).map(String::from).collect();
        }
        if let Some(Value::Sequence(items)) = get(ex, "modules") {
            exclude.modules = items
                .iter()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect();
        }
    }
    let autopackagelist = match get(control_block, "autopackagelist") {
        None | Some(Value::Null) => None,
        Some(v) if v.is_mapping() => {
            let view = require_str(v, "view", "control.autopackagelist.view")?;
            let content_resolver = match get(v, "content_resolver") {
                Some(Value::String(s)) => Some(s.clone()),
                None | Some(Value::Null) => None,
                Some(_) => return Err(path_err("control.autopackagelist.content_resolver")),
            };
            Some(AutopackagelistConfig {
                content_resolver,
                view,
            })
        }
        Some(_) => {
            return Err(DaemonError::Config(
                "control.autopackagelist has an unrecognized shape".into(),
            ));
        }
    };
    let control = Control {
        build: require_bool(control_block, "build", "control.build")?,
        merge: require_bool(control_block, "merge", "control.merge")?,
        strict: require_bool(control_block, "strict", "control.strict")?,
        autopackagelist,
        exclude,
    };

    let defaults_block = require_map(cnf, "defaults", "defaults")?;
    let parse_template = |key: &str| -> Result<CacheTemplate, DaemonError> {
        let block = require_map(defaults_block, key, &format!("defaults.{key}"))?;
        Ok(CacheTemplate {
            source: require_str(block, "source", &format!("defaults.{key}.source"))?,
            destination: require_str(block, "destination", &format!("defaults.{key}.destination"))?,
        })
    };
    let defaults = Defaults {
        cache: parse_template("cache")?,
        rpms: parse_template("rpms")?,
        modules: parse_template("modules")?,
    };

    Ok(MainConfig {
        source,
        destination,
        trigger,
        build,
        git,
        control,
        defaults,
    })
}

/// Replace the two documented placeholders verbatim; every other `%`
/// sequence is left literal (spec Design Notes).
pub fn interpolate(template: &str, component: &str, stream: &str) -> String {
    template
        .replace("%(component)s", component)
        .replace("%(stream)s", stream)
}

/// Names of packages for a single namespace, sourced either from the YAML
/// `components` block or from the Content-Resolver fetch (spec §4.4 step
/// 5, autopackagelist).
pub enum ComponentSource {
    /// Explicit per-component override blocks, straight from the YAML.
    Explicit(BTreeMap<String, Value>),
    /// Just a flat package-name set (from the Content Resolver); no
    /// per-component overrides are possible in this mode.
    Names(BTreeSet<String>),
}

/// Synthesize `comps` from `defaults` templates plus explicit overrides
/// (spec §3, §4.4 step 5).
pub fn synthesize_comps(
    main: &MainConfig,
    rpms: ComponentSource,
    modules: ComponentSource,
) -> Comps {
    let mut comps = Comps::default();
    comps.rpms = synthesize_namespace(main, crate::types::Namespace::Rpms, rpms);
    comps.modules = synthesize_namespace(main, crate::types::Namespace::Modules, modules);
    comps
}

fn synthesize_namespace(
    main: &MainConfig,
    ns: crate::types::Namespace,
    source: ComponentSource,
) -> BTreeMap<String, ComponentRoute> {
    let template = match ns {
        crate::types::Namespace::Rpms => &main.defaults.rpms,
        crate::types::Namespace::Modules => &main.defaults.modules,
    };
    let cache_template = &main.defaults.cache;

    let mut out = BTreeMap::new();
    let names: Vec<String> = match &source {
        ComponentSource::Explicit(map) => map.keys().cloned().collect(),
        ComponentSource::Names(set) => set.iter().cloned().collect(),
    };

    for key in names {
        let (cname, sname) = if ns == crate::types::Namespace::Modules {
            let m = split_module(&key);
            (m.name, m.stream)
        } else {
            (key.clone(), String::new())
        };

        let mut route = ComponentRoute {
            source: interpolate(&template.source, &cname, &sname),
            destination: interpolate(&template.destination, &cname, &sname),
            cache: RouteCache {
                source: interpolate(&cache_template.source, &cname, &sname),
                destination: interpolate(&cache_template.destination, &cname, &sname),
            },
        };

        if let ComponentSource::Explicit(map) = &source {
            if let Some(override_block) = map.get(&key).filter(|v| v.is_mapping()) {
                if let Some(Value::String(s)) = get(override_block, "source") {
                    route.source = s.clone();
                }
                if let Some(Value::String(s)) = get(override_block, "destination") {
                    route.destination = s.clone();
                }
                if let Some(cache_override) = get(override_block, "cache").filter(|v| v.is_mapping())
                {
                    if let Some(Value::String(s)) = get(cache_override, "source") {
                        route.cache.source = s.clone();
                    }
                    if let Some(Value::String(s)) = get(cache_override, "destination") {
                        route.cache.destination = s.clone();
                    }
                }
            }
        }

        out.insert(key, route);
    }
    out
}

/// Pull the `components.rpms`/`components.modules` blocks out of the raw
/// YAML document, returning empty maps if the block or either namespace is
/// absent (no components explicitly configured is not an error, spec
/// §4.4).
pub fn explicit_components(y: &Value) -> (BTreeMap<String, Value>, BTreeMap<String, Value>) {
    let mut rpms = BTreeMap::new();
    let mut modules = BTreeMap::new();
    if let Some(components) = get(y, "components").filter(|v| v.is_mapping()) {
        if let Some(Value::Mapping(map)) = get(components, "rpms") {
            for (k, v) in map {
                if let Some(name) = k.as_str() {
                    rpms.insert(name.to_string(), v.clone());
                }
            }
        }
        if let Some(Value::Mapping(map)) = get(components, "modules") {
            for (k, v) in map {
                if let Some(name) = k.as_str() {
                    modules.insert(name.to_string(), v.clone());
                }
            }
        }
    }
    (rpms, modules)
}

/// Extract RPM component -> pinned git ref overrides from a modulemd YAML
/// string's `data.xmd.mbs.rpms[*].ref` (spec §3, §4.1).
pub fn ref_overrides_from_modulemd(modulemd: &str) -> Result<BTreeMap<String, String>, DaemonError> {
    let doc: Value = serde_yaml::from_str(modulemd)
        .map_err(|e| DaemonError::Config(format!("invalid modulemd YAML: {e}")))?;
    let rpms = doc
        .get("data")
        .and_then(|v| v.get("xmd"))
        .and_then(|v| v.get("mbs"))
        .and_then(|v| v.get("rpms"))
        .and_then(|v| v.as_mapping())
        .ok_or_else(|| DaemonError::Config("data.xmd.mbs.rpms missing from modulemd".into()))?;

    let mut overrides = BTreeMap::new();
    for (name, data) in rpms {
        let name = name
            .as_str()
            .ok_or_else(|| DaemonError::Config("modulemd rpm entry has a non-string name".into()))?;
        let ref_ = data
            .get("ref")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DaemonError::Config(format!("modulemd rpm {name} missing ref")))?;
        overrides.insert(name.to_string(), ref_.to_string());
    }
    Ok(overrides)
}

/// In-memory `main`/`comps`/`config_ref` store, swapped atomically by the
/// Config Reloader and read by everything else (spec §2.2, §5).
pub struct ConfigStore {
    inner: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Read a consistent snapshot. An in-progress reload never partially
    /// overwrites `main`/`comps`/`config_ref` (spec §3 invariant): the
    /// whole triple lives behind one `Arc`, swapped in one assignment.
    pub async fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.inner.read().await.clone()
    }

    /// Atomically publish a newly loaded configuration.
    pub async fn swap(&self, snapshot: ConfigSnapshot) {
        *self.inner.write().await = Arc::new(snapshot);
    }

    pub async fn config_ref(&self) -> String {
        self.inner.read().await.config_ref.clone()
    }
}
