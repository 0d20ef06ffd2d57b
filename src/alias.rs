//! Short, deduplicated display names for source file identifiers.
//!
//! Report rows name their source with a full acquisition path such as
//! `D:\runs\20240114_PLC_M_1_Slot2-43_1_16419.d`. The registry maps each
//! distinct identifier to a short alias (`PLC_M_1`) and disambiguates
//! collisions with a counter suffix: the first identifier with a given
//! base name keeps it bare, later ones become `PLC_M_1(1)`, `PLC_M_1(2)`.

use crate::tsv::{LoadError, Result};
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Marker that ends the sample part of an acquisition name.
const SLOT_MARKER: &str = "_Slot";

/// Extract the alias candidate from a source identifier.
///
/// Strips any directory prefix and the extension, then removes a leading
/// `digits_` date stamp together with everything from `_Slot` onwards.
///
/// # Example
///
/// ```
/// use precursor_pivot::alias::base_name;
///
/// assert_eq!(base_name("D:\\data\\20240114_PLC_M_1_Slot2-43_1_16419.d"), "PLC_M_1");
/// assert_eq!(base_name("simple.raw"), "simple");
/// ```
pub fn base_name(original: &str) -> &str {
    let filename = match original.rfind(['/', '\\']) {
        Some(idx) => &original[idx + 1..],
        None => original,
    };

    let stem = match filename.rfind('.') {
        Some(idx) => &filename[..idx],
        None => filename,
    };

    if let Some(underscore) = stem.find('_') {
        let prefix = &stem[..underscore];
        if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) {
            let rest = &stem[underscore + 1..];
            // `_Slot` is searched from the first underscore itself, so a
            // stem like `2024_Slot3` yields an empty sample name.
            return match stem[underscore..].find(SLOT_MARKER) {
                Some(slot) => &rest[..slot.saturating_sub(1)],
                None => rest,
            };
        }
    }

    stem
}

/// A source identifier together with its resolved alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceName {
    pub original: Arc<str>,
    pub alias: Arc<str>,
}

/// Source-to-alias resolution used by the line classifier.
pub trait ResolveSource: Sync {
    /// Shared identifier and alias for `original`.
    fn source_name(&self, original: &str) -> Result<SourceName>;
}

#[derive(Debug, Default)]
struct AliasState {
    /// original identifier -> final alias
    canonical: FxHashMap<Arc<str>, SourceName>,
    /// base alias -> number of distinct identifiers that produced it
    use_count: FxHashMap<String, usize>,
}

/// Concurrency-safe original-to-alias mapping.
///
/// Lookup and registration happen under one lock, so an identifier is
/// assigned exactly once even when several tasks see it first at the
/// same time.
#[derive(Debug, Default)]
pub struct AliasRegistry {
    state: Mutex<AliasState>,
}

impl AliasRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, AliasState>> {
        self.state
            .lock()
            .map_err(|_| LoadError::Internal("alias registry lock poisoned".to_string()))
    }

    /// Resolve an identifier to its alias, registering it on first sight.
    pub fn resolve(&self, original: &str) -> Result<Arc<str>> {
        self.resolve_source(original).map(|source| source.alias)
    }

    /// Like [`resolve`](Self::resolve), but also returns the shared
    /// identifier so records can reference it without copying.
    pub fn resolve_source(&self, original: &str) -> Result<SourceName> {
        let mut state = self.lock()?;
        Ok(register_locked(&mut state, original))
    }

    /// Register identifiers in the given order under a single lock.
    ///
    /// Already known identifiers are skipped, so the suffixes handed out
    /// follow the order of first appearance in `originals`.
    pub fn register_all<'a, I>(&self, originals: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut state = self.lock()?;
        for original in originals {
            register_locked(&mut state, original);
        }
        Ok(())
    }

    /// Alias previously assigned to `original`, if any.
    pub fn get(&self, original: &str) -> Result<Option<Arc<str>>> {
        let state = self.lock()?;
        Ok(state.canonical.get(original).map(|s| Arc::clone(&s.alias)))
    }

    /// Number of distinct identifiers that have produced `base`.
    pub fn base_count(&self, base: &str) -> Result<usize> {
        let state = self.lock()?;
        Ok(state.use_count.get(base).copied().unwrap_or(0))
    }

    /// Number of registered identifiers.
    pub fn len(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.canonical.len(),
            Err(poisoned) => poisoned.into_inner().canonical.len(),
        }
    }

    /// True when no identifier has been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of the original-to-alias mapping.
    pub fn snapshot(&self) -> Result<BTreeMap<Arc<str>, Arc<str>>> {
        let state = self.lock()?;
        Ok(state
            .canonical
            .values()
            .map(|s| (Arc::clone(&s.original), Arc::clone(&s.alias)))
            .collect())
    }

    /// Lock-free copy of the current assignments.
    ///
    /// Used once every identifier of a load has been registered, so that
    /// parsing tasks look aliases up without contending for the mutex.
    pub fn frozen(&self) -> Result<FrozenAliases> {
        let state = self.lock()?;
        Ok(FrozenAliases {
            by_original: state.canonical.clone(),
        })
    }
}

impl ResolveSource for AliasRegistry {
    fn source_name(&self, original: &str) -> Result<SourceName> {
        self.resolve_source(original)
    }
}

/// Read-only original-to-alias map taken from a fully populated registry.
///
/// Lookups never register anything: an identifier missing from the map
/// is an [`LoadError::Internal`] error.
#[derive(Debug, Default, Clone)]
pub struct FrozenAliases {
    by_original: FxHashMap<Arc<str>, SourceName>,
}

impl FrozenAliases {
    /// Number of identifiers in the map.
    pub fn len(&self) -> usize {
        self.by_original.len()
    }

    /// True when no identifier has been registered.
    pub fn is_empty(&self) -> bool {
        self.by_original.is_empty()
    }
}

impl ResolveSource for FrozenAliases {
    fn source_name(&self, original: &str) -> Result<SourceName> {
        self.by_original.get(original).cloned().ok_or_else(|| {
            LoadError::Internal(format!(
                "source '{}' was not registered before parsing",
                original
            ))
        })
    }
}

fn register_locked(state: &mut AliasState, original: &str) -> SourceName {
    if let Some(existing) = state.canonical.get(original) {
        return existing.clone();
    }

    let base = base_name(original);
    let count = state.use_count.entry(base.to_string()).or_insert(0);
    let alias: Arc<str> = if *count == 0 {
        Arc::from(base)
    } else {
        Arc::from(format!("{}({})", base, count))
    };
    *count += 1;

    debug!(original, alias = %alias, "registered source alias");

    let source = SourceName {
        original: Arc::from(original),
        alias,
    };
    state
        .canonical
        .insert(Arc::clone(&source.original), source.clone());
    source
}
