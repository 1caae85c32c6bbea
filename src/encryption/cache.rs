use dashmap::DashMap;
use uuid::Uuid;

/// Process-lifetime cache of decrypted key material, keyed by
/// `(universe id, key reference)`. Never persisted.
///
/// Owned by whoever builds the commissioner and shared through `Arc`, so tests
/// get isolated instances.
#[derive(Debug, Default)]
pub struct KeyMaterialCache {
    entries: DashMap<(Uuid, Vec<u8>), Vec<u8>>,
}

impl KeyMaterialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, universe_id: Uuid, key_ref: &[u8]) -> Option<Vec<u8>> {
        self.entries
            .get(&(universe_id, key_ref.to_vec()))
            .map(|entry| entry.value().clone())
    }

    pub fn insert(&self, universe_id: Uuid, key_ref: Vec<u8>, material: Vec<u8>) {
        self.entries.insert((universe_id, key_ref), material);
    }

    /// Drop every entry of a universe, on key rotation or universe deletion
    pub fn invalidate(&self, universe_id: Uuid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| *id != universe_id);
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
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
    fn test_invalidate_only_touches_one_universe() {
        let cache = KeyMaterialCache::new();
        let rotated = Uuid::new_v4();
        let other = Uuid::new_v4();
        cache.insert(rotated, b"k1".to_vec(), b"m1".to_vec());
        cache.insert(rotated, b"k2".to_vec(), b"m2".to_vec());
        cache.insert(other, b"k1".to_vec(), b"m3".to_vec());

        assert_eq!(cache.invalidate(rotated), 2);
        assert!(cache.get(rotated, b"k1").is_none());
        assert_eq!(cache.get(other, b"k1"), Some(b"m3".to_vec()));
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = KeyMaterialCache::new();
        let b = KeyMaterialCache::new();
        a.insert(Uuid::nil(), b"k".to_vec(), b"m".to_vec());
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
