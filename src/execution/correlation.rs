use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Side table with a hard size bound
///
/// Entries are removed when consumed with `take`; once `capacity` is reached
/// the oldest entry is evicted to make room.
#[derive(Debug, Clone)]
pub struct CorrelationMap<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K, V> CorrelationMap<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert, returning the evicted oldest entry if the map was full
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.entries.insert(key.clone(), value).is_some() {
            self.order.retain(|k| k != &key);
            self.order.push_back(key);
            return None;
        }
        self.order.push_back(key);

        if self.entries.len() > self.capacity {
            while let Some(oldest) = self.order.pop_front() {
                if let Some(value) = self.entries.remove(&oldest) {
                    return Some((oldest, value));
                }
            }
        }
        None
    }

    /// Remove and return the entry for `key`
    pub fn take(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(value)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_consumes_entry() {
        let mut map = CorrelationMap::new(4);
        map.insert("p-1".to_string(), 1);
        assert_eq!(map.take(&"p-1".to_string()), Some(1));
        assert_eq!(map.take(&"p-1".to_string()), None);
        assert!(map.is_empty());
    }

    #[test]
    fn test_evicts_oldest_at_capacity() {
        let mut map = CorrelationMap::new(2);
        assert!(map.insert(1, 'a').is_none());
        assert!(map.insert(2, 'b').is_none());
        assert_eq!(map.insert(3, 'c'), Some((1, 'a')));

        assert_eq!(map.len(), 2);
        assert!(!map.contains(&1));
        assert_eq!(map.get(&3), Some(&'c'));
    }

    #[test]
    fn test_reinsert_refreshes_position() {
        let mut map = CorrelationMap::new(2);
        map.insert(1, 'a');
        map.insert(2, 'b');
        map.insert(1, 'z');
        assert_eq!(map.insert(3, 'c'), Some((2, 'b')));
        assert_eq!(map.get(&1), Some(&'z'));
    }

    #[test]
    fn test_taken_keys_do_not_count_toward_eviction() {
        let mut map = CorrelationMap::new(2);
        map.insert(1, 'a');
        map.take(&1);
        map.insert(2, 'b');
        assert!(map.insert(3, 'c').is_none());
        assert_eq!(map.len(), 2);
    }
}
