// SPDX-License-Identifier: MIT
//! Admission filter: decides whether a filesystem event becomes a scan
//! request.
//!
//! A pure predicate over the current filesystem state plus two whitelist
//! sets, both mutable while the pipeline is running. Stat failures
//! (vanished file, permission denied, path too long) are a skip, never an
//! error; they are logged at debug level only.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

/// Whitelist-based admission gate. Shared between the watcher callback
/// thread and whoever mutates the whitelists at runtime, hence std locks.
pub struct AdmissionFilter {
    whitelist_paths: RwLock<HashSet<PathBuf>>,
    whitelist_extensions: RwLock<HashSet<String>>,
}

impl AdmissionFilter {
    pub fn new(
        paths: impl IntoIterator<Item = PathBuf>,
        extensions: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            whitelist_paths: RwLock::new(paths.into_iter().collect()),
            whitelist_extensions: RwLock::new(
                extensions.into_iter().map(|e| normalize_ext(&e)).collect(),
            ),
        }
    }

    /// Should this path enter the scan pipeline?
    ///
    /// Rejects whitelisted paths (exact or ancestor-prefix match),
    /// whitelisted extensions (an empty set excludes nothing), anything
    /// that is not a regular file, and anything that fails to stat.
    pub fn should_enqueue(&self, path: &Path) -> bool {
        if self.is_whitelisted(path) {
            debug!(path = %path.display(), "skipping whitelisted path");
            return false;
        }

        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => true,
            Ok(_) => false,
            Err(e) => {
                debug!(path = %path.display(), err = %e, "skipping path on stat error");
                false
            }
        }
    }

    /// Check the path against both whitelist sets without touching the
    /// filesystem.
    pub fn is_whitelisted(&self, path: &Path) -> bool {
        {
            let paths = self.read_paths();
            if path.ancestors().any(|a| paths.contains(a)) {
                return true;
            }
        }

        let exts = self.read_exts();
        if exts.is_empty() {
            return false;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => exts.contains(&ext.to_ascii_lowercase()),
            None => false,
        }
    }

    pub fn add_path(&self, path: PathBuf) {
        self.write_paths().insert(path);
    }

    pub fn remove_path(&self, path: &Path) {
        self.write_paths().remove(path);
    }

    pub fn add_extension(&self, ext: &str) {
        self.write_exts().insert(normalize_ext(ext));
    }

    pub fn remove_extension(&self, ext: &str) {
        self.write_exts().remove(&normalize_ext(ext));
    }

    fn read_paths(&self) -> std::sync::RwLockReadGuard<'_, HashSet<PathBuf>> {
        self.whitelist_paths.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_paths(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<PathBuf>> {
        self.whitelist_paths.write().unwrap_or_else(|e| e.into_inner())
    }

    fn read_exts(&self) -> std::sync::RwLockReadGuard<'_, HashSet<String>> {
        self.whitelist_extensions
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn write_exts(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<String>> {
        self.whitelist_extensions
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// Store extensions lowercase without a leading dot, accepting both `.log`
/// and `log` from config.
fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn temp_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "contents").unwrap();
        path
    }

    #[test]
    fn admits_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = temp_file(&dir, "sample.bin");
        let filter = AdmissionFilter::new([], []);
        assert!(filter.should_enqueue(&file));
    }

    #[test]
    fn rejects_missing_path() {
        let filter = AdmissionFilter::new([], []);
        assert!(!filter.should_enqueue(Path::new("/nonexistent/definitely/missing")));
    }

    #[test]
    fn rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let filter = AdmissionFilter::new([], []);
        assert!(!filter.should_enqueue(dir.path()));
    }

    #[test]
    fn whitelisted_prefix_rejects_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = temp_file(&dir, "inside.txt");
        let filter = AdmissionFilter::new([dir.path().to_path_buf()], []);
        assert!(!filter.should_enqueue(&file));
    }

    #[test]
    fn whitelisted_extension_rejects_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let file = temp_file(&dir, "notes.LOG");
        let filter = AdmissionFilter::new([], [".log".to_string()]);
        assert!(!filter.should_enqueue(&file));
    }

    #[test]
    fn empty_extension_set_excludes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let file = temp_file(&dir, "anything.xyz");
        let filter = AdmissionFilter::new([], []);
        assert!(filter.should_enqueue(&file));
    }

    #[test]
    fn runtime_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let file = temp_file(&dir, "tool.exe");
        let filter = AdmissionFilter::new([], []);

        assert!(filter.should_enqueue(&file));
        filter.add_extension("exe");
        assert!(!filter.should_enqueue(&file));
        filter.remove_extension("exe");
        assert!(filter.should_enqueue(&file));

        filter.add_path(file.clone());
        assert!(!filter.should_enqueue(&file));
        filter.remove_path(&file);
        assert!(filter.should_enqueue(&file));
    }
}
