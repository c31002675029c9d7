//! SCMURL parsing (`link[#ref]`, spec §3).
//!
//! `ns` and `comp` are derived from the last two `/`-separated segments of
//! `link`, matching the dist-git `<host>/<ns>/<comp>` layout; they're
//! best-effort and can be bogus for non-dist-git links, as the original
//! docstring warns.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scmurl {
    pub link: String,
    pub ref_: Option<String>,
    pub ns: Option<String>,
    pub comp: Option<String>,
}

/// Split a `link#ref` URL into its parts. Empty or malformed input
/// returns empty/`None` fields rather than failing (spec §3 invariant).
pub fn split_scmurl(scmurl: &str) -> Scmurl {
    let mut parts = scmurl.splitn(2, '#');
    let link = parts.next().unwrap_or("").to_string();
    let ref_ = parts.next().map(|s| s.to_string());

    let segments: Vec<&str> = link.split('/').collect();
    let ns = if segments.len() >= 2 {
        Some(segments[segments.len() - 2].to_string())
    } else {
        None
    };
    let comp = segments.last().filter(|s| !s.is_empty()).map(|s| s.to_string());

    Scmurl {
        link,
        ref_,
        ns,
        comp,
    }
}
