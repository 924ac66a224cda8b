//! Local workspace: `buf.yaml`, its modules, and their `.proto` files

pub mod imports;

pub use imports::{analyze, parse_imports, UsedModules};

use crate::config::BufYaml;
use crate::error::{BufError, BufResult};
use crate::module::{ModuleFullName, ModuleRef};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One module whose sources live in the workspace
#[derive(Debug, Clone)]
pub struct LocalModule {
    pub name: Option<ModuleFullName>,
    pub root: PathBuf,
    /// `.proto` files keyed by slash-separated path relative to `root`
    pub files: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
    config: BufYaml,
    modules: Vec<LocalModule>,
}

impl Workspace {
    pub fn load(dir: &Path) -> BufResult<Self> {
        let config = BufYaml::load(dir)?;
        let mut modules = Vec::new();
        for entry in config.module_entries() {
            let root = dir.join(&entry.path);
            if !root.is_dir() {
                return Err(BufError::ConfigInvalid {
                    path: BufYaml::path_in(dir),
                    reason: format!("module path {:?} is not a directory", entry.path),
                });
            }
            let name = entry
                .name
                .as_deref()
                .map(ModuleFullName::parse)
                .transpose()?;
            let mut files = BTreeMap::new();
            collect_proto_files(&root, &root, &mut files)?;
            debug!("Loaded local module at {} ({} files)", root.display(), files.len());
            modules.push(LocalModule { name, root, files });
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            modules,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &BufYaml {
        &self.config
    }

    pub fn modules(&self) -> &[LocalModule] {
        &self.modules
    }

    pub fn local_names(&self) -> HashSet<ModuleFullName> {
        self.modules.iter().filter_map(|m| m.name.clone()).collect()
    }

    /// Declared dependencies, excluding workspace modules and repeats
    pub fn declared_refs(&self) -> BufResult<Vec<ModuleRef>> {
        let local = self.local_names();
        let mut seen = HashSet::new();
        let mut refs = Vec::new();
        for module_ref in self.config.dep_refs()? {
            let name = module_ref.full_name();
            if local.contains(name) {
                debug!("Skipping dependency {} provided by the workspace", name);
                continue;
            }
            if !seen.insert(name.clone()) {
                warn!("Dependency {} is declared more than once, using the first", name);
                continue;
            }
            refs.push(module_ref);
        }
        Ok(refs)
    }

    /// All local `.proto` files as `(path, content)` pairs
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.modules
            .iter()
            .flat_map(|m| m.files.iter().map(|(p, c)| (p.as_str(), c.as_slice())))
    }
}

fn collect_proto_files(
    root: &Path,
    dir: &Path,
    files: &mut BTreeMap<String, Vec<u8>>,
) -> BufResult<()> {
    let entries =
        fs::read_dir(dir).map_err(|e| BufError::io(format!("reading {}", dir.display()), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| BufError::io(format!("reading {}", dir.display()), e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| BufError::io(format!("inspecting {}", path.display()), e))?;
        if file_type.is_dir() {
            collect_proto_files(root, &path, files)?;
        } else if path.extension().is_some_and(|ext| ext == "proto") {
            let relative = path
                .strip_prefix(root)
                .map_err(|_| {
                    BufError::internal(format!("{} escaped {}", path.display(), root.display()))
                })?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let content = fs::read(&path)
                .map_err(|e| BufError::io(format!("reading {}", path.display()), e))?;
            files.insert(relative, content);
        }
    }
    Ok(())
}
