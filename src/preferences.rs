//! Per-user dashboard preferences: the watchlist and the theme flag
//!
//! Both are loaded once from a `KeyValueStore` and written through on every
//! mutation. A mutation whose write fails leaves the in-memory value untouched.

use crate::{
    constants::{THEME_STORAGE_KEY, WATCHLIST_STORAGE_KEY},
    error::StorageError,
    storage::{load_json, save_json, KeyValueStore},
    types::{CoinSummary, Snapshot},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Insertion-ordered set of watched coin identifiers
pub struct Watchlist {
    store: Arc<dyn KeyValueStore>,
    ids: RwLock<Vec<String>>,
}

impl Watchlist {
    /// Loads the persisted watchlist
    ///
    /// A missing key yields an empty list. A corrupt value is logged and
    /// treated as empty; it is overwritten by the next mutation.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let ids = match load_json::<Vec<String>>(store.as_ref(), WATCHLIST_STORAGE_KEY) {
            Ok(Some(ids)) => dedup(ids),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable watchlist");
                Vec::new()
            }
        };
        tracing::debug!(count = ids.len(), "Loaded watchlist");

        Self {
            store,
            ids: RwLock::new(ids),
        }
    }

    /// Watched identifiers in the order they were added
    pub fn ids(&self) -> Vec<String> {
        self.read().clone()
    }

    pub fn contains(&self, coin_id: &str) -> bool {
        self.read().iter().any(|id| id == coin_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Adds a coin; returns false when it was already watched
    pub fn add(&self, coin_id: &str) -> Result<bool, StorageError> {
        let mut ids = self.write();
        if ids.iter().any(|id| id == coin_id) {
            return Ok(false);
        }
        let mut next = ids.clone();
        next.push(coin_id.to_string());
        self.commit(&mut ids, next)?;
        Ok(true)
    }

    /// Removes a coin; returns false when it was not watched
    pub fn remove(&self, coin_id: &str) -> Result<bool, StorageError> {
        let mut ids = self.write();
        if !ids.iter().any(|id| id == coin_id) {
            return Ok(false);
        }
        let next = ids.iter().filter(|id| *id != coin_id).cloned().collect();
        self.commit(&mut ids, next)?;
        Ok(true)
    }

    /// Flips membership of a coin
    ///
    /// # Returns
    /// Whether the coin is watched after the call
    pub fn toggle(&self, coin_id: &str) -> Result<bool, StorageError> {
        let mut ids = self.write();
        let watched = ids.iter().any(|id| id == coin_id);
        let next = if watched {
            ids.iter().filter(|id| *id != coin_id).cloned().collect()
        } else {
            let mut next = ids.clone();
            next.push(coin_id.to_string());
            next
        };
        self.commit(&mut ids, next)?;
        Ok(!watched)
    }

    /// Watched coins present in the snapshot, in snapshot order
    pub fn filter(&self, snapshot: &Snapshot) -> Vec<CoinSummary> {
        let ids = self.read();
        snapshot
            .coins
            .iter()
            .filter(|coin| ids.iter().any(|id| *id == coin.id))
            .cloned()
            .collect()
    }

    fn commit(&self, ids: &mut Vec<String>, next: Vec<String>) -> Result<(), StorageError> {
        save_json(self.store.as_ref(), WATCHLIST_STORAGE_KEY, &next)?;
        *ids = next;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<String>> {
        self.ids.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<String>> {
        self.ids.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}

/// Dark-mode flag, off by default
pub struct ThemePreference {
    store: Arc<dyn KeyValueStore>,
    dark: AtomicBool,
}

impl ThemePreference {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let dark = match load_json::<bool>(store.as_ref(), THEME_STORAGE_KEY) {
            Ok(value) => value.unwrap_or(false),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable theme preference");
                false
            }
        };
        Self {
            store,
            dark: AtomicBool::new(dark),
        }
    }

    pub fn is_dark(&self) -> bool {
        self.dark.load(Ordering::Relaxed)
    }

    pub fn set_dark(&self, dark: bool) -> Result<(), StorageError> {
        save_json(self.store.as_ref(), THEME_STORAGE_KEY, &dark)?;
        self.dark.store(dark, Ordering::Relaxed);
        Ok(())
    }

    /// Flips the flag and returns the new value
    pub fn toggle(&self) -> Result<bool, StorageError> {
        let dark = !self.is_dark();
        self.set_dark(dark)?;
        Ok(dark)
    }
}
