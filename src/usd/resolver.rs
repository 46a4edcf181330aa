//! Asset resolution: turn an asset path into readable layer contents.

use log::debug;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::ResolveError;

/// A resolved asset: stable identifier plus its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub identifier: String,
    pub contents: String,
}

/// Resolves asset paths. Implementations must be shareable across nodes.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Result<ResolvedAsset, ResolveError>;
}

/// Filesystem resolver. Relative paths are tried against each search path
/// in order, then against the current directory.
#[derive(Debug, Clone, Default)]
pub struct FsResolver {
    search_paths: Vec<PathBuf>,
}

impl FsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_paths(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    fn candidates(&self, path: &str) -> Vec<PathBuf> {
        let p = Path::new(path);
        if p.is_absolute() {
            return vec![p.to_path_buf()];
        }
        let mut out: Vec<PathBuf> = self.search_paths.iter().map(|dir| dir.join(p)).collect();
        out.push(p.to_path_buf());
        out
    }
}

impl AssetResolver for FsResolver {
    fn resolve(&self, path: &str) -> Result<ResolvedAsset, ResolveError> {
        if path.trim().is_empty() {
            return Err(ResolveError::NotFound(String::new()));
        }
        let mut last_err = ResolveError::NotFound(path.to_string());
        for candidate in self.candidates(path) {
            match std::fs::read_to_string(&candidate) {
                Ok(contents) => {
                    let identifier = candidate
                        .canonicalize()
                        .unwrap_or(candidate)
                        .to_string_lossy()
                        .into_owned();
                    debug!("Resolved {} -> {}", path, identifier);
                    return Ok(ResolvedAsset { identifier, contents });
                }
                Err(e) => {
                    last_err = match e.kind() {
                        ErrorKind::NotFound => ResolveError::NotFound(candidate.display().to_string()),
                        ErrorKind::PermissionDenied => {
                            // Permission problems are final, don't mask them with later misses
                            return Err(ResolveError::PermissionDenied(candidate.display().to_string()));
                        }
                        _ => ResolveError::Io(format!("{}: {}", candidate.display(), e)),
                    };
                }
            }
        }
        Err(last_err)
    }
}

/// In-memory resolver keyed by exact asset path.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    assets: RwLock<HashMap<String, String>>,
    denied: RwLock<Vec<String>>,
    reads: AtomicU64,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, contents: impl Into<String>) {
        self.assets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.into(), contents.into());
    }

    pub fn remove(&self, path: &str) -> Option<String> {
        self.assets.write().unwrap_or_else(|e| e.into_inner()).remove(path)
    }

    /// Make `path` fail with `PermissionDenied`.
    pub fn deny(&self, path: impl Into<String>) {
        self.denied.write().unwrap_or_else(|e| e.into_inner()).push(path.into());
    }

    /// Successful resolutions so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl AssetResolver for MemoryResolver {
    fn resolve(&self, path: &str) -> Result<ResolvedAsset, ResolveError> {
        if self.denied.read().unwrap_or_else(|e| e.into_inner()).iter().any(|d| d == path) {
            return Err(ResolveError::PermissionDenied(path.to_string()));
        }
        let assets = self.assets.read().unwrap_or_else(|e| e.into_inner());
        match assets.get(path) {
            Some(contents) => {
                self.reads.fetch_add(1, Ordering::Relaxed);
                Ok(ResolvedAsset {
                    identifier: format!("mem:{}", path),
                    contents: contents.clone(),
                })
            }
            None => Err(ResolveError::NotFound(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_resolver() {
        let r = MemoryResolver::new();
        r.insert("a.json", "{}");
        assert_eq!(r.resolve("a.json").unwrap().identifier, "mem:a.json");
        assert_eq!(r.resolve("b.json"), Err(ResolveError::NotFound("b.json".into())));
        r.deny("a.json");
        assert!(matches!(r.resolve("a.json"), Err(ResolveError::PermissionDenied(_))));
        assert_eq!(r.reads(), 1);
    }

    #[test]
    fn test_fs_resolver_search_paths() {
        let dir = std::env::temp_dir().join(format!("usdproxy_resolver_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("scene.json"), "{\"prims\": []}").unwrap();

        let resolver = FsResolver::with_search_paths(vec![dir.clone()]);
        let asset = resolver.resolve("scene.json").unwrap();
        assert!(asset.identifier.ends_with("scene.json"));
        assert!(matches!(resolver.resolve("missing.json"), Err(ResolveError::NotFound(_))));
        assert!(matches!(resolver.resolve(""), Err(ResolveError::NotFound(_))));

        std::fs::remove_dir_all(&dir).ok();
    }
}
