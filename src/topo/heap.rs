//! Indexed binary min-heap with decrease-key
//!
//! Keys are dense integers in `0..capacity` (node handles for the planner).
//! A position table maps each key to its slot so `decrease_key` finds the
//! entry in O(1). Equal priorities pop in insertion order.

use crate::error::{NavError, Result};

#[derive(Clone, Copy, Debug)]
struct Entry {
    key: usize,
    priority: f64,
    seq: u64,
}

impl Entry {
    fn before(&self, other: &Entry) -> bool {
        match self.priority.total_cmp(&other.priority) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => self.seq < other.seq,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IndexedMinHeap {
    entries: Vec<Entry>,
    positions: Vec<Option<usize>>,
    next_seq: u64,
}

impl IndexedMinHeap {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            positions: vec![None; capacity],
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: usize) -> bool {
        self.positions.get(key).map(|p| p.is_some()).unwrap_or(false)
    }

    pub fn priority(&self, key: usize) -> Option<f64> {
        let pos = (*self.positions.get(key)?)?;
        Some(self.entries[pos].priority)
    }

    pub fn insert(&mut self, key: usize, priority: f64) -> Result<()> {
        if key >= self.positions.len() {
            return Err(NavError::InvalidState(format!(
                "heap key {} out of range 0..{}",
                key,
                self.positions.len()
            )));
        }
        if self.positions[key].is_some() {
            return Err(NavError::InvalidState(format!("heap key {} inserted twice", key)));
        }
        let slot = self.entries.len();
        self.entries.push(Entry {
            key,
            priority,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        self.positions[key] = Some(slot);
        self.sift_up(slot);
        Ok(())
    }

    pub fn peek_min(&self) -> Result<(usize, f64)> {
        self.entries
            .first()
            .map(|e| (e.key, e.priority))
            .ok_or(NavError::EmptyHeap)
    }

    pub fn extract_min(&mut self) -> Result<(usize, f64)> {
        if self.entries.is_empty() {
            return Err(NavError::EmptyHeap);
        }
        let last = self.entries.len() - 1;
        self.swap(0, last);
        let min = self.entries.pop().ok_or(NavError::EmptyHeap)?;
        self.positions[min.key] = None;
        if !self.entries.is_empty() {
            self.sift_down(0);
        }
        Ok((min.key, min.priority))
    }

    /// Lower the priority of a queued key; raising it is ignored
    pub fn decrease_key(&mut self, key: usize, priority: f64) -> Result<()> {
        let pos = self
            .positions
            .get(key)
            .copied()
            .flatten()
            .ok_or_else(|| NavError::InvalidState(format!("heap key {} not queued", key)))?;
        if priority < self.entries[pos].priority {
            self.entries[pos].priority = priority;
            self.sift_up(pos);
        }
        Ok(())
    }

    /// Every queued key sits where its position entry says, and parents precede children
    pub fn check_invariant(&self) -> bool {
        let positions_ok = self
            .entries
            .iter()
            .enumerate()
            .all(|(slot, e)| self.positions[e.key] == Some(slot));
        let queued = self.positions.iter().filter(|p| p.is_some()).count();
        let order_ok = (1..self.entries.len())
            .all(|i| !self.entries[i].before(&self.entries[(i - 1) / 2]));
        positions_ok && order_ok && queued == self.entries.len()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.positions[self.entries[a].key] = Some(a);
        self.positions[self.entries[b].key] = Some(b);
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.entries[slot].before(&self.entries[parent]) {
                self.swap(slot, parent);
                slot = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let n = self.entries.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < n && self.entries[left].before(&self.entries[smallest]) {
                smallest = left;
            }
            if right < n && self.entries[right].before(&self.entries[smallest]) {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_empty_heap_errors() {
        let mut heap = IndexedMinHeap::with_capacity(4);
        assert!(matches!(heap.peek_min(), Err(NavError::EmptyHeap)));
        assert!(matches!(heap.extract_min(), Err(NavError::EmptyHeap)));
    }

    #[test]
    fn test_insert_extract_order() {
        let mut heap = IndexedMinHeap::with_capacity(5);
        for (k, p) in [(0, 5.0), (1, 3.0), (2, 8.0), (3, 1.0), (4, 3.0)] {
            heap.insert(k, p).unwrap();
            assert!(heap.check_invariant());
        }
        assert_eq!(heap.peek_min().unwrap(), (3, 1.0));
        let order: Vec<usize> = std::iter::from_fn(|| heap.extract_min().ok().map(|(k, _)| k)).collect();
        // key 1 was inserted before key 4 with the same priority
        assert_eq!(order, vec![3, 1, 4, 0, 2]);
    }

    #[test]
    fn test_decrease_key() {
        let mut heap = IndexedMinHeap::with_capacity(3);
        heap.insert(0, 10.0).unwrap();
        heap.insert(1, 20.0).unwrap();
        heap.insert(2, 30.0).unwrap();
        heap.decrease_key(2, 5.0).unwrap();
        assert!(heap.check_invariant());
        assert_eq!(heap.peek_min().unwrap(), (2, 5.0));
        // raising is ignored
        heap.decrease_key(0, 50.0).unwrap();
        assert_eq!(heap.priority(0), Some(10.0));
        assert!(heap.decrease_key(7, 1.0).is_err());
    }

    #[test]
    fn test_duplicate_and_out_of_range_insert() {
        let mut heap = IndexedMinHeap::with_capacity(2);
        heap.insert(1, 1.0).unwrap();
        assert!(heap.insert(1, 2.0).is_err());
        assert!(heap.insert(2, 2.0).is_err());
        assert!(heap.contains(1));
        assert!(!heap.contains(0));
    }

    #[test]
    fn test_random_interleaving_keeps_invariant() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 64;
        let mut heap = IndexedMinHeap::with_capacity(n);
        let mut live: Vec<Option<f64>> = vec![None; n];
        let mut extracted = std::collections::HashSet::new();

        for _ in 0..2000 {
            let key = rng.gen_range(0..n);
            match rng.gen_range(0..3) {
                0 if live[key].is_none() && !extracted.contains(&key) => {
                    let p = rng.gen_range(0.0..100.0);
                    heap.insert(key, p).unwrap();
                    live[key] = Some(p);
                }
                1 if live[key].is_some() => {
                    let current = live[key].unwrap_or(0.0);
                    let p = current - rng.gen_range(0.0..10.0);
                    heap.decrease_key(key, p).unwrap();
                    live[key] = Some(p);
                }
                2 if !heap.is_empty() => {
                    let (k, p) = heap.extract_min().unwrap();
                    let min = live.iter().flatten().cloned().fold(f64::INFINITY, f64::min);
                    assert_eq!(p, min);
                    assert_eq!(live[k], Some(p));
                    live[k] = None;
                    extracted.insert(k);
                }
                _ => {}
            }
            assert!(heap.check_invariant());
            assert_eq!(heap.len(), live.iter().flatten().count());
        }
    }
}
