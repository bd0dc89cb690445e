//! Directory Carousel
//!
//! Stands in for the broadcast data carousel. The layout mirrors resource
//! references:
//!
//! ```text
//! <root>/program.json        optional program information
//! <root>/<cc>/<mmmm>/<file>  resources of module mmmm in component cc
//! <root>/<cc>/<mmmm>/.version optional module version, defaults to 1
//! ```
//!
//! Every component directory is part of the program map and every module
//! directory is announced in the download info.

use anyhow::Context;
use bml_engine::bml_resource::{CachedModule, ComponentId, FetchError, ModuleId, ModuleKey};
use bml_engine::ProgramInfo;
use smol::stream::StreamExt;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const VERSION_FILE: &str = ".version";
const PROGRAM_FILE: &str = "program.json";

/// Snapshot of what the carousel announces
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Announcement {
    pub components: BTreeMap<ComponentId, Vec<(ModuleId, u8)>>,
}

/// Carousel backed by a directory tree
#[derive(Debug, Clone)]
pub struct Carousel {
    root: PathBuf,
}

impl Carousel {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the program map and download info from the directory layout
    pub async fn scan(&self) -> anyhow::Result<Announcement> {
        let mut announcement = Announcement::default();

        for (name, path) in subdirectories(&self.root).await? {
            let Some(component) = ComponentId::parse(&name) else {
                tracing::debug!("Skipping {}: not a component", path.display());
                continue;
            };
            let mut modules = Vec::new();
            for (name, path) in subdirectories(&path).await? {
                let Some(module) = ModuleId::parse(&name) else {
                    continue;
                };
                modules.push((module, read_version(&path).await));
            }
            tracing::debug!("Component {}: {} modules", component, modules.len());
            announcement.components.insert(component, modules);
        }

        Ok(announcement)
    }

    /// Program information, if the carousel carries any
    pub async fn program_info(&self) -> anyhow::Result<Option<ProgramInfo>> {
        let path = self.root.join(PROGRAM_FILE);
        match smol::fs::read(&path).await {
            Ok(bytes) => {
                let info = serde_json::from_slice(&bytes).with_context(|| format!("Invalid {}", path.display()))?;
                Ok(Some(info))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn module_dir(&self, key: ModuleKey) -> PathBuf {
        self.root
            .join(key.component.to_string())
            .join(key.module.to_string())
    }

    /// Download a whole module
    pub async fn fetch(&self, key: ModuleKey) -> Result<CachedModule, FetchError> {
        let dir = self.module_dir(key);
        let mut entries = match smol::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(FetchError::NotFound(key)),
            Err(e) => return Err(FetchError::Network(e.to_string())),
        };

        let mut module = CachedModule::new(read_version(&dir).await);
        while let Some(entry) = entries.next().await {
            let entry = entry.map_err(|e| FetchError::Network(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == VERSION_FILE {
                continue;
            }
            let bytes = smol::fs::read(entry.path())
                .await
                .map_err(|e| FetchError::Network(e.to_string()))?;
            module.resources.insert(name, bytes);
        }

        tracing::debug!("Fetched module {} ({} resources)", key, module.resources.len());
        Ok(module)
    }
}

/// Directory entries that are themselves directories, sorted by name
async fn subdirectories(dir: &Path) -> anyhow::Result<Vec<(String, PathBuf)>> {
    let mut entries = smol::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next().await {
        let entry = entry?;
        let path = entry.path();
        if smol::fs::metadata(&path).await?.is_dir() {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    dirs.sort();
    Ok(dirs)
}

async fn read_version(module_dir: &Path) -> u8 {
    match smol::fs::read_to_string(module_dir.join(VERSION_FILE)).await {
        Ok(text) => text.trim().parse().unwrap_or(1),
        Err(_) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn carousel_dir(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("bml-carousel-{}-{}", name, std::process::id()));
        let module = root.join("40").join("0000");
        std::fs::create_dir_all(&module).unwrap();
        std::fs::write(module.join("startup.bml"), b"<bml/>").unwrap();
        let second = root.join("40").join("0001");
        std::fs::create_dir_all(&second).unwrap();
        std::fs::write(second.join(VERSION_FILE), b"3\n").unwrap();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        root
    }

    #[test]
    fn test_scan() {
        smol::block_on(async {
            let root = carousel_dir("scan");
            let announcement = Carousel::new(&root).scan().await.unwrap();
            assert_eq!(announcement.components.len(), 1);
            assert_eq!(
                announcement.components[&ComponentId(0x40)],
                vec![(ModuleId(0), 1), (ModuleId(1), 3)]
            );
            std::fs::remove_dir_all(&root).unwrap();
        });
    }

    #[test]
    fn test_fetch() {
        smol::block_on(async {
            let root = carousel_dir("fetch");
            let carousel = Carousel::new(&root);

            let module = carousel.fetch(ModuleKey::new(0x40, 0)).await.unwrap();
            assert_eq!(module.resources.get("startup.bml").map(Vec::as_slice), Some(&b"<bml/>"[..]));

            let empty = carousel.fetch(ModuleKey::new(0x40, 1)).await.unwrap();
            assert_eq!(empty.version, 3);
            assert!(empty.resources.is_empty());

            let missing = ModuleKey::new(0x41, 0);
            assert_eq!(carousel.fetch(missing).await, Err(FetchError::NotFound(missing)));
            std::fs::remove_dir_all(&root).unwrap();
        });
    }

    #[test]
    fn test_program_info() {
        smol::block_on(async {
            let root = carousel_dir("program");
            let carousel = Carousel::new(&root);
            assert_eq!(carousel.program_info().await.unwrap(), None);

            std::fs::write(root.join(PROGRAM_FILE), br#"{"event_name": "News", "service_id": 1024}"#).unwrap();
            let info = carousel.program_info().await.unwrap().unwrap();
            assert_eq!(info.event_name, "News");
            assert_eq!(info.service_id, Some(1024));
            std::fs::remove_dir_all(&root).unwrap();
        });
    }
}
