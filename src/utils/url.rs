use crate::constants::network::DEFAULT_HOST;
use crate::errors::ClientError;
use std::collections::BTreeMap;
use url::Url;

/// Builds `scheme://host[:port]` from endpoint parts.
///
/// When no explicit port is given, a `host:port` form in `host` is honoured.
pub fn base_url(host: &str, port: Option<u16>, use_tls: bool) -> String {
    let scheme = if use_tls { "https" } else { "http" };
    let mut host = host.trim().to_string();
    if host.is_empty() {
        host = DEFAULT_HOST.to_string();
    }
    let mut port = port;
    if port.is_none() {
        if let Some(idx) = host.rfind(':') {
            if let Ok(parsed) = host[idx + 1..].parse::<u16>() {
                port = Some(parsed);
                host.truncate(idx);
            }
        }
    }
    match port {
        Some(port) => format!("{}://{}:{}", scheme, host, port),
        None => format!("{}://{}", scheme, host),
    }
}

/// Joins path segments with exactly one `/` between them, keeping the
/// leading slash of the first non-empty segment and a trailing slash of the last.
pub fn join_path(parts: &[&str]) -> String {
    let leading = parts
        .iter()
        .find(|p| !p.is_empty())
        .map(|p| p.starts_with('/'))
        .unwrap_or(false);
    let trailing = parts.last().map(|p| p.ends_with('/')).unwrap_or(false);
    let segments: Vec<&str> = parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect();
    let mut out = String::new();
    if leading {
        out.push('/');
    }
    out.push_str(&segments.join("/"));
    if trailing && !out.ends_with('/') {
        out.push('/');
    }
    out
}

/// Lower-cases header names. Later duplicates win.
pub fn normalize_headers<'a, I>(headers: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    headers
        .into_iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.clone()))
        .collect()
}

/// Query strings may carry credentials; logs and error text only show the
/// part before `?`.
pub fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

/// Splits an absolute URL into its origin and the path-plus-query part.
pub fn split_url(raw: &str) -> Result<(String, String), ClientError> {
    let parsed = Url::parse(raw.trim())
        .map_err(|err| ClientError::invalid_config(format!("Invalid URL {}: {}", raw, err)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ClientError::invalid_config(format!("URL has no host: {}", raw)))?;
    let origin = match parsed.port() {
        Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
        None => format!("{}://{}", parsed.scheme(), host),
    };
    let mut path = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        path.push('?');
        path.push_str(query);
    }
    Ok((origin, path))
}
