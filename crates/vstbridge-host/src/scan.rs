//! Locating plugin modules on disk.

use std::path::{Path, PathBuf};

use vstbridge_core::Result;

/// Colon-separated (semicolon on Windows) extra search directories.
pub const VST_PATH_VAR: &str = "VST_PATH";

// ============================================================================
// Search Paths
// ============================================================================

/// `VST_PATH` entries first, then the platform's usual VST2 directories.
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::env::var_os(VST_PATH_VAR)
        .map(|value| std::env::split_paths(&value).collect())
        .unwrap_or_default();
    paths.extend(platform_search_paths());
    paths
}

fn platform_search_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        vec![
            PathBuf::from("/Library/Audio/Plug-Ins/VST"),
            PathBuf::from(format!(
                "{}/Library/Audio/Plug-Ins/VST",
                std::env::var("HOME").unwrap_or_default()
            )),
        ]
    }

    #[cfg(target_os = "windows")]
    {
        vec![
            PathBuf::from("C:\\Program Files\\VstPlugins"),
            PathBuf::from("C:\\Program Files\\Common Files\\VST2"),
            PathBuf::from("C:\\Program Files (x86)\\VstPlugins"),
        ]
    }

    #[cfg(target_os = "linux")]
    {
        vec![
            PathBuf::from("/usr/lib/vst"),
            PathBuf::from("/usr/local/lib/vst"),
            PathBuf::from(format!(
                "{}/.vst",
                std::env::var("HOME").unwrap_or_default()
            )),
        ]
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        Vec::new()
    }
}

// ============================================================================
// Scanning
// ============================================================================

/// Check if a path looks like a VST2 module
pub fn is_plugin_module(path: &Path) -> bool {
    match path.extension().and_then(|s| s.to_str()) {
        Some("vst") => true,
        Some(ext) => matches!(ext.to_ascii_lowercase().as_str(), "so" | "dll" | "dylib"),
        None => false,
    }
}

/// Every plugin module under `dir`, sorted. Recurses into plain
/// directories but treats `.vst` bundles as modules.
pub fn scan_directory(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    walk(dir.as_ref(), &mut found)?;
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if is_plugin_module(&path) {
            found.push(path);
        } else if path.is_dir() {
            walk(&path, found)?;
        }
    }
    Ok(())
}

/// Scan every existing directory in [`default_search_paths`].
pub fn scan_default_paths() -> Vec<PathBuf> {
    let mut found = Vec::new();
    for dir in default_search_paths() {
        if !dir.is_dir() {
            continue;
        }
        match scan_directory(&dir) {
            Ok(modules) => {
                tracing::debug!(dir = %dir.display(), count = modules.len(), "scanned");
                found.extend(modules);
            }
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "scan failed"),
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_plugin_module() {
        assert!(is_plugin_module(Path::new("/path/to/plugin.so")));
        assert!(is_plugin_module(Path::new("/path/to/plugin.DLL")));
        assert!(is_plugin_module(Path::new("/path/to/Plugin.vst")));
        assert!(is_plugin_module(Path::new("/path/to/plugin.dylib")));
        assert!(!is_plugin_module(Path::new("/path/to/plugin.vst3")));
        assert!(!is_plugin_module(Path::new("/path/to/readme.txt")));
        assert!(!is_plugin_module(Path::new("/path/to/noext")));
    }

    #[test]
    fn test_scan_recurses_but_not_into_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.so"), b"").unwrap();
        fs::write(root.join("notes.txt"), b"").unwrap();
        fs::create_dir_all(root.join("vendor")).unwrap();
        fs::write(root.join("vendor").join("b.dll"), b"").unwrap();
        let bundle = root.join("C.vst").join("Contents").join("MacOS");
        fs::create_dir_all(&bundle).unwrap();
        fs::write(bundle.join("inner.so"), b"").unwrap();

        let found = scan_directory(root).unwrap();
        assert_eq!(
            found,
            vec![
                root.join("C.vst"),
                root.join("a.so"),
                root.join("vendor").join("b.dll"),
            ]
        );
    }

    #[test]
    fn test_scan_missing_directory_is_error() {
        assert!(scan_directory("/nonexistent/vst/dir").is_err());
    }
}
