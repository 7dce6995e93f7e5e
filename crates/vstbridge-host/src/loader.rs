//! Loading plugin modules from disk.

use libloading::Library;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use vstbridge_core::abi::ENTRY_POINT_SYMBOLS;
use vstbridge_core::{BridgeError, EntryPointProc, LoadStage, Result};

use crate::config::HostConfig;
use crate::host::Host;
use crate::instance::PluginInstance;

/// A loaded plugin library and its resolved entry point.
///
/// Instances created from a module keep it alive, so the module can be
/// dropped by the caller at any time.
pub struct Module {
    path: PathBuf,
    entry: EntryPointProc,
    symbol: &'static str,
    _library: Library,
}

impl Module {
    /// Resolve a macOS `.vst` bundle path to the inner binary.
    ///
    /// Bundles are directories with the actual library at
    /// `Contents/MacOS/<name>`. Anything else is returned unchanged.
    pub fn resolve_bundle_path(path: &Path) -> PathBuf {
        if path.is_dir() && path.extension().and_then(|e| e.to_str()) == Some("vst") {
            if let Some(stem) = path.file_stem() {
                let inner = path.join("Contents").join("MacOS").join(stem);
                if inner.exists() {
                    return inner;
                }
            }
        }
        path.to_path_buf()
    }

    /// Load the library at `path` and find its entry point.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let resolved = Self::resolve_bundle_path(path);
        tracing::info!(path = %resolved.display(), "loading plugin module");

        // SAFETY: loading runs the library's initializers; that is inherent
        // to hosting native plugins.
        let library = unsafe { Library::new(&resolved) }.map_err(|e| BridgeError::LoadFailed {
            path: path.to_path_buf(),
            stage: LoadStage::Opening,
            reason: e.to_string(),
        })?;

        let mut resolved_entry = None;
        for name in ENTRY_POINT_SYMBOLS {
            // SAFETY: every entry symbol has the `EntryPointProc` signature.
            if let Ok(symbol) = unsafe { library.get::<EntryPointProc>(name) } {
                let label = std::str::from_utf8(&name[..name.len() - 1]).unwrap_or("entry");
                resolved_entry = Some((*symbol, label));
                break;
            }
        }

        let Some((entry, symbol)) = resolved_entry else {
            return Err(BridgeError::LoadFailed {
                path: path.to_path_buf(),
                stage: LoadStage::EntryPoint,
                reason: "no VSTPluginMain, main_macho or main symbol".to_string(),
            });
        };
        tracing::debug!(symbol, "resolved entry point");

        Ok(Arc::new(Self {
            path: path.to_path_buf(),
            entry,
            symbol,
            _library: library,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Name of the symbol the entry point was found under.
    pub fn entry_symbol(&self) -> &'static str {
        self.symbol
    }

    /// Create a new instance in the `Constructed` state.
    pub fn construct(self: &Arc<Self>, host: Arc<dyn Host>) -> Result<PluginInstance> {
        // SAFETY: `entry` came from this library, which the instance keeps
        // loaded.
        unsafe { PluginInstance::construct_with_module(self.entry, host, Some(Arc::clone(self))) }
            .map_err(|e| self.stage_error(LoadStage::Instantiation, e))
    }

    /// Create, open and configure a new instance. Each call yields an
    /// independent instance.
    pub fn instantiate(
        self: &Arc<Self>,
        host: Arc<dyn Host>,
        config: &HostConfig,
    ) -> Result<PluginInstance> {
        let instance = self.construct(host)?;
        instance
            .setup(config)
            .map_err(|e| self.stage_error(LoadStage::Setup, e))?;
        tracing::info!(path = %self.path.display(), "plugin instantiated");
        Ok(instance)
    }

    fn stage_error(&self, stage: LoadStage, error: BridgeError) -> BridgeError {
        match error {
            BridgeError::LoadFailed { .. } => error,
            BridgeError::InvalidMagic(_) | BridgeError::InvalidDescriptor(_) => {
                BridgeError::LoadFailed {
                    path: self.path.clone(),
                    stage: LoadStage::Validation,
                    reason: error.to_string(),
                }
            }
            other => BridgeError::LoadFailed {
                path: self.path.clone(),
                stage,
                reason: other.to_string(),
            },
        }
    }
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Module")
            .field("path", &self.path)
            .field("symbol", &self.symbol)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_fails_at_opening() {
        let err = Module::open("/nonexistent/plugin.so").unwrap_err();
        match err {
            BridgeError::LoadFailed { stage, path, .. } => {
                assert_eq!(stage, LoadStage::Opening);
                assert_eq!(path, PathBuf::from("/nonexistent/plugin.so"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bundle_path_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("Synth.vst");
        let inner = bundle.join("Contents").join("MacOS");
        std::fs::create_dir_all(&inner).unwrap();
        std::fs::write(inner.join("Synth"), b"").unwrap();

        assert_eq!(Module::resolve_bundle_path(&bundle), inner.join("Synth"));

        let plain = dir.path().join("effect.so");
        assert_eq!(Module::resolve_bundle_path(&plain), plain);
    }

    #[test]
    fn test_non_library_fails_at_opening() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.so");
        std::fs::write(&bogus, b"not a shared object").unwrap();
        let err = Module::open(&bogus).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::LoadFailed {
                stage: LoadStage::Opening,
                ..
            }
        ));
    }
}
