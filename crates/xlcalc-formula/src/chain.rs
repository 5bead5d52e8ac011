//! Calculation chain: formula cells in entry order

use std::collections::BTreeMap;

use ahash::AHashMap;

use crate::dependency::CellKey;

/// Formula cells in the order they were entered or loaded
///
/// Batch recalculation walks the chain; evaluation itself pulls precedents
/// on demand, so the order only decides which cell is visited first.
#[derive(Debug, Default, Clone)]
pub struct CalcChain {
    order: BTreeMap<u64, CellKey>,
    position: AHashMap<CellKey, u64>,
    next: u64,
}

impl CalcChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key` unless it is already present
    pub fn push(&mut self, key: CellKey) -> bool {
        if self.position.contains_key(&key) {
            return false;
        }
        self.order.insert(self.next, key);
        self.position.insert(key, self.next);
        self.next += 1;
        true
    }

    pub fn remove(&mut self, key: CellKey) -> bool {
        match self.position.remove(&key) {
            Some(seq) => {
                self.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: CellKey) -> bool {
        self.position.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.order.values().copied()
    }

    /// Replace keys in place, keeping each entry's position
    ///
    /// Entries already sitting at a destination are dropped first.
    pub fn rekey(&mut self, moves: &[(CellKey, CellKey)]) {
        let seqs: Vec<_> = moves
            .iter()
            .filter_map(|(from, to)| self.position.remove(from).map(|seq| (seq, *to)))
            .collect();
        for (_, to) in &seqs {
            self.remove(*to);
        }
        for (seq, to) in seqs {
            self.order.insert(seq, to);
            self.position.insert(to, seq);
        }
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.position.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(row: u32) -> CellKey {
        CellKey::new(0, row, 0)
    }

    #[test]
    fn test_entry_order_and_removal() {
        let mut chain = CalcChain::new();
        assert!(chain.push(key(3)));
        assert!(chain.push(key(1)));
        assert!(!chain.push(key(3)));
        assert!(chain.push(key(2)));
        assert!(chain.remove(key(1)));
        assert!(!chain.remove(key(1)));
        assert_eq!(chain.iter().collect::<Vec<_>>(), vec![key(3), key(2)]);
    }

    #[test]
    fn test_rekey_keeps_position_and_drops_overwritten() {
        let mut chain = CalcChain::new();
        chain.push(key(0));
        chain.push(key(1));
        chain.push(key(5));
        // rows 0..=1 move down by one, landing on row 1 and row 2
        chain.rekey(&[(key(0), key(1)), (key(1), key(2))]);
        assert_eq!(chain.iter().collect::<Vec<_>>(), vec![key(1), key(2), key(5)]);

        chain.rekey(&[(key(1), key(5))]);
        assert_eq!(chain.iter().collect::<Vec<_>>(), vec![key(5), key(2)]);
        assert_eq!(chain.len(), 2);
    }
}
