//! Vocabulary tables and the process-wide cache that memoizes them.
//!
//! A [`VocabularyTable`] maps the tokens an encoder emits to the integer
//! dimensions a vector store indexes. Deriving it can be expensive (tens of
//! thousands of entries read from a tokenizer), so [`VocabularyCache`] keeps
//! one table per [`ModelKey`] for as long as the cache lives.
//!
//! Entries are keyed by model identity, never by encoder instance: two
//! encoders loaded from the same model path resolve to the same table.

use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Stable identity of an encoder model, e.g. its path or hub name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelKey(Arc<str>);

impl ModelKey {
    pub fn new(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ModelKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

/// Token to dimension mapping of one encoder model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabularyTable {
    token_to_id: HashMap<String, u32>,
}

impl VocabularyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table that numbers `tokens` in iteration order, skipping
    /// duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoder`] if there are more distinct tokens than `u32`
    /// dimensions.
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for token in tokens {
            let next = table.token_to_id.len();
            if let Entry::Vacant(slot) = table.token_to_id.entry(token.into()) {
                slot.insert(dimension(next)?);
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, token: impl Into<String>, id: u32) -> Option<u32> {
        self.token_to_id.insert(token.into(), id)
    }

    pub fn get(&self, token: &str) -> Option<u32> {
        self.token_to_id.get(token).copied()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.token_to_id.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }
}

/// Dimension assigned to the token numbered `position`.
fn dimension(position: usize) -> Result<u32> {
    u32::try_from(position).map_err(|_| {
        Error::encoder(format!(
            "vocabulary has more than {} distinct tokens",
            u64::from(u32::MAX) + 1
        ))
    })
}

impl From<HashMap<String, u32>> for VocabularyTable {
    fn from(token_to_id: HashMap<String, u32>) -> Self {
        Self { token_to_id }
    }
}

impl FromIterator<(String, u32)> for VocabularyTable {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self {
            token_to_id: iter.into_iter().collect(),
        }
    }
}

/// A slot is populated at most once; `None` means "not loaded yet" (or the
/// last load attempt failed).
type Slot = Mutex<Option<Arc<VocabularyTable>>>;

static GLOBAL_VOCABULARY_CACHE: LazyLock<Arc<VocabularyCache>> =
    LazyLock::new(|| Arc::new(VocabularyCache::new()));

/// Compute-once cache of [`VocabularyTable`]s keyed by [`ModelKey`].
///
/// The outer map lock is only held long enough to find or create the slot for
/// a key. The slot lock is then held across the loader call, so concurrent
/// first use of one key runs the loader exactly once while loads for other
/// keys proceed independently. After population every read is a clone of an
/// `Arc`.
///
/// Keys are never evicted.
#[derive(Default)]
pub struct VocabularyCache {
    slots: Mutex<HashMap<ModelKey, Arc<Slot>>>,
}

impl VocabularyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-lifetime cache used by pipelines that are not given their
    /// own.
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_VOCABULARY_CACHE)
    }

    /// Returns the table for `key`, invoking `loader` only if no table has
    /// been stored for it yet.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error. A failed load leaves the slot empty so a
    /// later call may retry.
    pub fn get_or_load<F>(&self, key: &ModelKey, loader: F) -> Result<Arc<VocabularyTable>>
    where
        F: FnOnce() -> Result<VocabularyTable>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut guard = slot.lock();
        if let Some(table) = guard.as_ref() {
            return Ok(Arc::clone(table));
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Loading vocabulary for model {key}");

        let table = Arc::new(loader()?);

        #[cfg(feature = "tracing")]
        tracing::info!("Cached vocabulary for model {key} ({} tokens)", table.len());

        *guard = Some(Arc::clone(&table));
        Ok(table)
    }

    /// Returns the cached table for `key` without loading.
    pub fn get(&self, key: &ModelKey) -> Option<Arc<VocabularyTable>> {
        let slot = self.slots.lock().get(key).cloned()?;
        let guard = slot.lock();
        guard.as_ref().map(Arc::clone)
    }

    pub fn contains(&self, key: &ModelKey) -> bool {
        self.get(key).is_some()
    }

    /// Number of models with a populated table.
    pub fn len(&self) -> usize {
        let slots: Vec<_> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for VocabularyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VocabularyCache")
            .field("models", &self.len())
            .finish()
    }
}
