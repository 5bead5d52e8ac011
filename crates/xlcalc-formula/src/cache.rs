//! Last evaluated outcome per formula cell

use ahash::AHashMap;

use crate::dependency::CellKey;
use crate::error::EvalError;
use crate::value::FormulaValue;

/// Outcome of evaluating one cell
pub type Outcome = Result<FormulaValue, EvalError>;

#[derive(Debug, Clone)]
struct Entry {
    outcome: Outcome,
    dirty: bool,
}

/// Evaluation cache keyed by physical cell
#[derive(Debug, Default)]
pub struct EvalCache {
    entries: AHashMap<CellKey, Entry>,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached outcome, unless it was invalidated
    pub fn fresh(&self, key: CellKey) -> Option<&Outcome> {
        self.entries
            .get(&key)
            .filter(|e| !e.dirty)
            .map(|e| &e.outcome)
    }

    pub fn is_fresh(&self, key: CellKey) -> bool {
        self.fresh(key).is_some()
    }

    pub fn store(&mut self, key: CellKey, outcome: Outcome) {
        self.entries.insert(
            key,
            Entry {
                outcome,
                dirty: false,
            },
        );
    }

    /// Mark stale; returns whether the entry was fresh before
    pub fn mark_dirty(&mut self, key: CellKey) -> bool {
        match self.entries.get_mut(&key) {
            Some(entry) if !entry.dirty => {
                entry.dirty = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_dirty(&mut self) {
        for entry in self.entries.values_mut() {
            entry.dirty = true;
        }
    }

    pub fn remove(&mut self, key: CellKey) {
        self.entries.remove(&key);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Move entries to new keys, keeping them stale
    pub fn rekey(&mut self, moves: &[(CellKey, CellKey)]) {
        let moved: Vec<_> = moves
            .iter()
            .filter_map(|(from, to)| self.entries.remove(from).map(|e| (*to, e)))
            .collect();
        for (to, mut entry) in moved {
            entry.dirty = true;
            self.entries.insert(to, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_entries_are_not_fresh() {
        let mut cache = EvalCache::new();
        let key = CellKey::new(0, 0, 0);
        cache.store(key, Ok(1.0.into()));
        assert_eq!(cache.fresh(key), Some(&Ok(1.0.into())));
        assert!(cache.mark_dirty(key));
        assert!(!cache.mark_dirty(key));
        assert_eq!(cache.fresh(key), None);
        assert!(!cache.mark_dirty(CellKey::new(0, 5, 5)));
    }

    #[test]
    fn test_rekey_moves_and_dirties() {
        let mut cache = EvalCache::new();
        let a = CellKey::new(0, 0, 0);
        let b = CellKey::new(0, 1, 0);
        cache.store(a, Ok(1.0.into()));
        cache.rekey(&[(a, b)]);
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_fresh(a));
        assert!(!cache.is_fresh(b));
    }
}
