//! Module loader - discovers and instantiates plugins from compiled modules.
//!
//! Each module is a shared library exporting [`MODULE_ENTRY_SYMBOL`], a
//! function that fills a [`ModuleRegistrar`] with the module version and one
//! constructor per plugin type. The host runs every constructor itself, so a
//! panicking constructor skips only that type.

use libloading::{Library, Symbol};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::application::errors::PluginError;
use crate::plugins::api::Plugin;

/// Symbol every plugin module must export.
pub const MODULE_ENTRY_SYMBOL: &[u8] = b"ember_module_entry";

/// Signature of the exported entry function.
pub type ModuleEntryFn = unsafe extern "C" fn(&mut ModuleRegistrar);

type PluginCtor = Box<dyn FnOnce() -> Result<Box<dyn Plugin>, String> + Send>;

/// Registration manifest a module fills from its entry function: the module
/// version and an explicit constructor list, instead of runtime type
/// discovery.
#[derive(Default)]
pub struct ModuleRegistrar {
    version: String,
    constructors: Vec<PluginCtor>,
}

impl ModuleRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the module's version. Comes from the module's own metadata
    /// (typically `env!("CARGO_PKG_VERSION")`), never from user input.
    pub fn set_version(&mut self, version: &str) {
        self.version = version.to_string();
    }

    /// Register a constructor for one plugin type.
    pub fn register_plugin<F>(&mut self, constructor: F)
    where
        F: FnOnce() -> Result<Box<dyn Plugin>, String> + Send + 'static,
    {
        self.constructors.push(Box::new(constructor));
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn constructor_count(&self) -> usize {
        self.constructors.len()
    }

    /// Run every registered constructor, skipping the ones that fail or
    /// panic. Returns the instances plus the per-type failure count.
    pub fn instantiate(self, module_name: &str) -> (Vec<Box<dyn Plugin>>, usize) {
        let mut instances = Vec::new();
        let mut failures = 0;
        for constructor in self.constructors {
            match panic::catch_unwind(AssertUnwindSafe(constructor)) {
                Ok(Ok(plugin)) => instances.push(plugin),
                Ok(Err(e)) => {
                    warn!("Constructor in module '{}' failed: {}", module_name, e);
                    failures += 1;
                }
                Err(_) => {
                    warn!("Constructor in module '{}' panicked, skipping type", module_name);
                    failures += 1;
                }
            }
        }
        (instances, failures)
    }
}

/// One discovered module: the file it came from, the loaded library (kept
/// alive for the process lifetime) and the instances it yielded.
pub struct ExtensionModule {
    pub path: PathBuf,
    pub name: String,
    pub version: String,
    pub instances: Vec<Box<dyn Plugin>>,
    pub library: Library,
}

/// Result of one directory scan.
pub struct ScanReport {
    pub modules: Vec<ExtensionModule>,
    pub load_failures: usize,
    pub instantiation_failures: usize,
}

/// Scans a directory of compiled modules. The scan is restartable: every
/// call re-reads the directory from scratch.
pub struct ModuleLoader {
    module_dir: PathBuf,
}

impl ModuleLoader {
    pub fn new(module_dir: impl Into<PathBuf>) -> Self {
        Self {
            module_dir: module_dir.into(),
        }
    }

    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport {
            modules: Vec::new(),
            load_failures: 0,
            instantiation_failures: 0,
        };

        if !self.module_dir.exists() {
            warn!(
                "Plugin directory does not exist: {}",
                self.module_dir.display()
            );
            return report;
        }

        let entries = match std::fs::read_dir(&self.module_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Failed to read plugin directory {}: {}",
                    self.module_dir.display(),
                    e
                );
                return report;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };
            if !is_module_file(&path) {
                continue;
            }
            match self.load_module(&path) {
                Ok((module, type_failures)) => {
                    info!(
                        "Loaded module '{}' v{} with {} plugin instance(s)",
                        module.name,
                        module.version,
                        module.instances.len()
                    );
                    report.instantiation_failures += type_failures;
                    report.modules.push(module);
                }
                Err(e) => {
                    warn!("Failed to load module from {}: {}", path.display(), e);
                    report.load_failures += 1;
                }
            }
        }

        report
    }

    fn load_module(&self, path: &Path) -> Result<(ExtensionModule, usize), PluginError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let library = unsafe {
            Library::new(path).map_err(|e| PluginError::Load(format!("Incompatible module: {}", e)))?
        };

        let entry: Symbol<ModuleEntryFn> = unsafe {
            library
                .get(MODULE_ENTRY_SYMBOL)
                .map_err(|e| PluginError::Load(format!("Missing module entry: {}", e)))?
        };

        let mut registrar = ModuleRegistrar::new();
        unsafe { entry(&mut registrar) };

        let version = registrar.version().to_string();
        let (instances, failures) = registrar.instantiate(&name);

        Ok((
            ExtensionModule {
                path: path.to_path_buf(),
                name,
                version,
                instances,
                library,
            },
            failures,
        ))
    }
}

fn is_module_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == std::env::consts::DLL_EXTENSION)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::PluginError as PErr;
    use crate::infrastructure::database::PluginStorage;
    use async_trait::async_trait;

    struct NamedPlugin(String);

    #[async_trait]
    impl Plugin for NamedPlugin {
        fn name(&self) -> &str {
            &self.0
        }
        fn set_name(&mut self, name: String) {
            self.0 = name;
        }
        async fn init(&mut self, _storage: PluginStorage) -> Result<(), PErr> {
            Ok(())
        }
    }

    #[test]
    fn registrar_instantiates_registered_types() {
        let mut registrar = ModuleRegistrar::new();
        registrar.set_version("1.2.3");
        registrar.register_plugin(|| Ok(Box::new(NamedPlugin("a".into())) as Box<dyn Plugin>));
        registrar.register_plugin(|| Ok(Box::new(NamedPlugin("b".into())) as Box<dyn Plugin>));

        assert_eq!(registrar.version(), "1.2.3");
        let (instances, failures) = registrar.instantiate("mod");
        assert_eq!(instances.len(), 2);
        assert_eq!(failures, 0);
    }

    #[test]
    fn failing_constructor_skips_only_that_type() {
        let mut registrar = ModuleRegistrar::new();
        registrar.register_plugin(|| Err("no usable constructor".to_string()));
        registrar.register_plugin(|| panic!("constructor blew up"));
        registrar.register_plugin(|| Ok(Box::new(NamedPlugin("ok".into())) as Box<dyn Plugin>));

        let (instances, failures) = registrar.instantiate("mod");
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name(), "ok");
        assert_eq!(failures, 2);
    }

    #[test]
    fn corrupt_files_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ext = std::env::consts::DLL_EXTENSION;
        std::fs::write(dir.path().join(format!("broken.{}", ext)), b"not a library").unwrap();
        std::fs::write(dir.path().join(format!("also_broken.{}", ext)), b"junk").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

        let loader = ModuleLoader::new(dir.path());
        let report = loader.scan();
        assert_eq!(report.load_failures, 2);
        assert!(report.modules.is_empty());

        // Restartable: a second scan sees the same state.
        let report = loader.scan();
        assert_eq!(report.load_failures, 2);
    }

    #[test]
    fn missing_directory_yields_empty_report() {
        let loader = ModuleLoader::new("no/such/dir");
        let report = loader.scan();
        assert!(report.modules.is_empty());
        assert_eq!(report.load_failures, 0);
    }
}
