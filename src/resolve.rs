use regex::Regex;
use std::sync::OnceLock;

/// Base URL normalized for joining: always carries a trailing `/`.
///
/// The scheme and origin root are extracted once so that protocol-relative
/// and root-relative references can be resolved without re-parsing.
#[derive(Debug, Clone)]
pub struct BaseUrl {
    url: String,
    scheme: String,
    root: String,
}

impl BaseUrl {
    pub fn parse(raw: &str) -> Self {
        let url = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{}/", raw)
        };

        static SCHEME_RE: OnceLock<Regex> = OnceLock::new();
        let scheme_re =
            SCHEME_RE.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").unwrap());
        let scheme = scheme_re
            .find(&url)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "https:".to_string());

        // Origin root: scheme://host/ when present, otherwise the base itself.
        let root = match url.find("://") {
            Some(pos) => {
                let after = pos + 3;
                match url[after..].find('/') {
                    Some(slash) => url[..after + slash + 1].to_string(),
                    None => url.clone(),
                }
            }
            None => url.clone(),
        };

        Self { url, scheme, root }
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn root(&self) -> &str {
        &self.root
    }
}

fn trusted_scheme(url: &str) -> bool {
    // Only commonly trusted schemes pass through untouched. Among data URIs
    // only the image/* subtype (with its `;` terminator) is accepted; other
    // data URIs fall through to path resolution.
    static TRUSTED_RE: OnceLock<Regex> = OnceLock::new();
    TRUSTED_RE
        .get_or_init(|| {
            Regex::new(r"(?i)^(?:(?:https?|file|ftps?|mailto|javascript):|data:image/[^;]{2,9};)")
                .unwrap()
        })
        .is_match(url)
}

/// Resolve a single URL against the base, returning an absolute URL.
///
/// Trusted-scheme URLs are returned unchanged, empty or whitespace-only input
/// collapses to the empty string, and everything else is joined textually and
/// normalized. The result has `"`, `'`, `<` and `>` percent-escaped so it can
/// be re-embedded into an attribute without opening a new boundary.
pub fn resolve_url(url: &str, base: &BaseUrl) -> String {
    if trusted_scheme(url) {
        return url.to_string();
    }
    if url.starts_with("//") {
        return format!("{}{}", base.scheme(), url);
    }
    if let Some(rest) = url.strip_prefix('/') {
        return format!("{}{}", base.root(), rest);
    }
    if url.trim().is_empty() {
        return String::new();
    }

    let mut resolved = format!("{}{}", base.as_str(), url);

    // Collapse segment/../ pairs to a fixpoint. The length shrinks on every
    // pass, so this terminates even on irreducible inputs like a bare "/../".
    static COLLAPSE_RE: OnceLock<Regex> = OnceLock::new();
    let collapse_re = COLLAPSE_RE.get_or_init(|| Regex::new(r"[^/]+/+\.\./").unwrap());
    loop {
        let collapsed = collapse_re.replace_all(&resolved, "");
        if collapsed == resolved {
            break;
        }
        resolved = collapsed.into_owned();
    }

    static TRAILING_DOT_RE: OnceLock<Regex> = OnceLock::new();
    let trailing_dot_re = TRAILING_DOT_RE.get_or_init(|| Regex::new(r"\.$").unwrap());
    let resolved = trailing_dot_re.replace(&resolved, "").into_owned();

    resolved
        .replace("/.", "")
        .replace('"', "%22")
        .replace('\'', "%27")
        .replace('<', "%3C")
        .replace('>', "%3E")
}

/// Join two URL fragments segment-wise, resolving `.` and `..` in both.
///
/// Purely textual, no scheme or authority handling; used for resolving
/// catalog-relative resource references outside of HTML rewriting.
pub fn join_url(base: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(relative.split('/')) {
        match segment {
            ".." => {
                segments.pop();
            }
            "." => {}
            other => segments.push(other),
        }
    }
    segments.join("/")
}
