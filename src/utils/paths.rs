use crate::constants::env::CACHE_DIR;
use std::env;
use std::path::PathBuf;

fn normalize_env_path(value: Option<String>) -> Option<PathBuf> {
    let raw = value?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_lowercase();
    if lowered == "undefined" || lowered == "null" {
        return None;
    }
    Some(PathBuf::from(trimmed))
}

fn resolve_home_dir() -> Option<PathBuf> {
    normalize_env_path(env::var("HOME").ok())
}

fn resolve_xdg_cache_dir() -> Option<PathBuf> {
    if let Some(path) = normalize_env_path(env::var("XDG_CACHE_HOME").ok()) {
        return Some(path);
    }
    resolve_home_dir().map(|home| home.join(".cache"))
}

/// Directory used by the file-backed response cache when none is given.
pub fn resolve_cache_dir() -> PathBuf {
    if let Some(path) = normalize_env_path(env::var(CACHE_DIR).ok()) {
        return path;
    }
    if let Some(path) = resolve_xdg_cache_dir() {
        return path.join("apilink");
    }
    env::temp_dir().join("apilink-cache")
}
