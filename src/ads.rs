//! Analysis data service: the process-wide name → workspace registry.
//!
//! Observers are notified after the registry lock is released, so a callback
//! may itself query or modify the service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::data::workspace::{MatrixHandle, Workspace};
use crate::error::{FrameworkError, Result};

/// Change notifications broadcast to subscribers.
#[derive(Debug, Clone)]
pub enum AdsEvent {
    Add { name: String, workspace: Workspace },
    Replace { name: String, workspace: Workspace },
    Delete { name: String },
    Rename { old_name: String, new_name: String },
    Clear,
}

impl AdsEvent {
    pub fn name(&self) -> Option<&str> {
        match self {
            AdsEvent::Add { name, .. } | AdsEvent::Replace { name, .. } | AdsEvent::Delete { name } => Some(name),
            AdsEvent::Rename { new_name, .. } => Some(new_name),
            AdsEvent::Clear => None,
        }
    }
}

pub trait AdsObserver: Send + Sync {
    fn notify(&self, event: &AdsEvent);
}

impl<F> AdsObserver for F
where
    F: Fn(&AdsEvent) + Send + Sync,
{
    fn notify(&self, event: &AdsEvent) {
        self(event)
    }
}

/// Token returned by [`AnalysisDataService::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct AnalysisDataService {
    workspaces: RwLock<BTreeMap<String, Workspace>>,
    observers: RwLock<Vec<(ObserverId, Arc<dyn AdsObserver>)>>,
    next_observer: AtomicU64,
}

impl std::fmt::Debug for AnalysisDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisDataService")
            .field("names", &self.names())
            .field("observers", &self.observers.read().len())
            .finish()
    }
}

impl AnalysisDataService {
    /// An isolated service, independent of [`AnalysisDataService::global`].
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn global() -> Arc<AnalysisDataService> {
        static GLOBAL: OnceLock<Arc<AnalysisDataService>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(AnalysisDataService::new))
    }

    fn check_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(FrameworkError::Validation {
                property: "name".to_string(),
                message: "workspace names must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Register under a new name; an existing name is an error.
    pub fn add(&self, name: &str, workspace: Workspace) -> Result<()> {
        Self::check_name(name)?;
        {
            let mut map = self.workspaces.write();
            if map.contains_key(name) {
                return Err(FrameworkError::DuplicateName(name.to_string()));
            }
            map.insert(name.to_string(), workspace.clone());
        }
        log::debug!("ADS: added '{name}'");
        self.broadcast(&AdsEvent::Add {
            name: name.to_string(),
            workspace,
        });
        Ok(())
    }

    pub fn add_or_replace(&self, name: &str, workspace: Workspace) -> Result<()> {
        Self::check_name(name)?;
        let replaced = self
            .workspaces
            .write()
            .insert(name.to_string(), workspace.clone())
            .is_some();
        let name = name.to_string();
        self.broadcast(&if replaced {
            AdsEvent::Replace { name, workspace }
        } else {
            AdsEvent::Add { name, workspace }
        });
        Ok(())
    }

    pub fn retrieve(&self, name: &str) -> Result<Workspace> {
        self.workspaces
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| FrameworkError::NotFound(name.to_string()))
    }

    /// Retrieve a workspace that must be a matrix workspace.
    pub fn retrieve_matrix(&self, name: &str) -> Result<MatrixHandle> {
        match self.retrieve(name)? {
            Workspace::Matrix(m) => Ok(m),
            Workspace::Group(_) => Err(FrameworkError::UnsupportedType(format!(
                "'{name}' is a WorkspaceGroup, a matrix workspace was expected"
            ))),
        }
    }

    pub fn does_exist(&self, name: &str) -> bool {
        self.workspaces.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Result<Workspace> {
        let removed = self
            .workspaces
            .write()
            .remove(name)
            .ok_or_else(|| FrameworkError::NotFound(name.to_string()))?;
        self.broadcast(&AdsEvent::Delete {
            name: name.to_string(),
        });
        Ok(removed)
    }

    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        Self::check_name(new_name)?;
        {
            let mut map = self.workspaces.write();
            if map.contains_key(new_name) {
                return Err(FrameworkError::DuplicateName(new_name.to_string()));
            }
            let ws = map
                .remove(old_name)
                .ok_or_else(|| FrameworkError::NotFound(old_name.to_string()))?;
            map.insert(new_name.to_string(), ws);
        }
        self.broadcast(&AdsEvent::Rename {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    pub fn clear(&self) {
        self.workspaces.write().clear();
        self.broadcast(&AdsEvent::Clear);
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.workspaces.read().keys().cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.workspaces.read().len()
    }

    // -- observers --

    pub fn subscribe(&self, observer: Arc<dyn AdsObserver>) -> ObserverId {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Returns whether the observer was registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    fn broadcast(&self, event: &AdsEvent) {
        let observers: Vec<Arc<dyn AdsObserver>> =
            self.observers.read().iter().map(|(_, o)| Arc::clone(o)).collect();
        for observer in observers {
            observer.notify(event);
        }
    }
}
