use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use log::debug;

use super::{CursorError, OrderedStore, Record, Relation, Result};

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<Vec<u8>, Vec<u8>>,
    // Highest record number handed out by `append`
    last_recno: u64,
}

/// An in-memory [OrderedStore] using a [BTreeMap].
///
/// The map sits behind an [RwLock]: any number of cursors may read concurrently while writes are
/// exclusive, so each call observes one consistent snapshot. Cloning shares the same records.
#[derive(Clone, Default)]
pub struct MemStore {
    inner: Arc<RwLock<Inner>>,
}

impl std::fmt::Debug for MemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStore").finish()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|e| CursorError::StoreFailure(format!("failed to acquire read lock; {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|e| CursorError::StoreFailure(format!("failed to acquire write lock; {e}")))
    }
}

fn owned((k, v): (&Vec<u8>, &Vec<u8>)) -> Record {
    (k.clone(), v.clone())
}

fn recno_of(key: &[u8]) -> Result<u64> {
    let bytes: [u8; 8] = key.try_into().map_err(|_| {
        CursorError::StoreFailure(format!(
            "record number key has {} bytes, expected 8",
            key.len()
        ))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

impl OrderedStore for MemStore {
    fn seek_first(&self) -> Result<Option<Record>> {
        Ok(self.read()?.records.iter().next().map(owned))
    }

    fn seek_last(&self) -> Result<Option<Record>> {
        Ok(self.read()?.records.iter().next_back().map(owned))
    }

    fn seek_exact(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.records.get(key).cloned())
    }

    fn seek_nearest(&self, key: &[u8]) -> Result<Option<(Record, Relation)>> {
        let guard = self.read()?;

        if let Some((k, v)) = guard.records.get_key_value(key) {
            return Ok(Some((owned((k, v)), Relation::Equal)));
        }

        let larger = guard
            .records
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next();
        if let Some(record) = larger {
            return Ok(Some((owned(record), Relation::Larger)));
        }

        let smaller = guard
            .records
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back();
        Ok(smaller.map(|record| (owned(record), Relation::Smaller)))
    }

    fn successor(&self, key: &[u8]) -> Result<Option<Record>> {
        Ok(self
            .read()?
            .records
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(owned))
    }

    fn predecessor(&self, key: &[u8]) -> Result<Option<Record>> {
        Ok(self
            .read()?
            .records
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
            .map(owned))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>> {
        debug!("store put; {} byte key", key.len());
        Ok(self.write()?.records.insert(key.to_vec(), value.to_vec()))
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        debug!("store delete; {} byte key", key.len());
        Ok(self.write()?.records.remove(key).is_some())
    }

    fn insert_new(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut guard = self.write()?;
        if guard.records.contains_key(key) {
            return Ok(false);
        }

        debug!("store insert; {} byte key", key.len());
        guard.records.insert(key.to_vec(), value.to_vec());
        Ok(true)
    }

    fn replace(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        let mut guard = self.write()?;
        match guard.records.get_mut(key) {
            Some(existing) => {
                debug!("store replace; {} byte key", key.len());
                *existing = value.to_vec();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn append(&self, value: &[u8]) -> Result<u64> {
        let mut guard = self.write()?;

        let highest = match guard.records.keys().next_back() {
            Some(key) => recno_of(key)?,
            None => 0,
        };
        let recno = guard
            .last_recno
            .max(highest)
            .checked_add(1)
            .ok_or_else(|| CursorError::StoreFailure("record numbers exhausted".into()))?;

        guard.last_recno = recno;
        guard.records.insert(recno.to_be_bytes().to_vec(), value.to_vec());
        debug!("store append; allocated record {recno}");

        Ok(recno)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.read()?.records.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn store_with(keys: &[&str]) -> MemStore {
        let store = MemStore::new();
        for k in keys {
            store.put(k.as_bytes(), b"v").unwrap();
        }
        store
    }

    #[test]
    fn first_and_last() {
        let store = store_with(&["b", "a", "c"]);
        assert_eq!(store.seek_first().unwrap().unwrap().0, b"a");
        assert_eq!(store.seek_last().unwrap().unwrap().0, b"c");
        assert!(MemStore::new().seek_first().unwrap().is_none());
    }

    #[test]
    fn neighbours_of_missing_keys() {
        let store = store_with(&["b", "d"]);
        assert_eq!(store.successor(b"c").unwrap().unwrap().0, b"d");
        assert_eq!(store.predecessor(b"c").unwrap().unwrap().0, b"b");
        assert!(store.successor(b"d").unwrap().is_none());
        assert!(store.predecessor(b"b").unwrap().is_none());
    }

    #[test]
    fn nearest_prefers_larger() {
        let store = store_with(&["b", "d"]);

        let ((k, _), rel) = store.seek_nearest(b"b").unwrap().unwrap();
        assert_eq!((k.as_slice(), rel), (&b"b"[..], Relation::Equal));

        let ((k, _), rel) = store.seek_nearest(b"c").unwrap().unwrap();
        assert_eq!((k.as_slice(), rel), (&b"d"[..], Relation::Larger));

        let ((k, _), rel) = store.seek_nearest(b"e").unwrap().unwrap();
        assert_eq!((k.as_slice(), rel), (&b"d"[..], Relation::Smaller));

        assert!(MemStore::new().seek_nearest(b"x").unwrap().is_none());
    }

    #[test]
    fn conditional_writes() {
        let store = MemStore::new();
        assert!(store.insert_new(b"k", b"1").unwrap());
        assert!(!store.insert_new(b"k", b"2").unwrap());
        assert_eq!(store.seek_exact(b"k").unwrap().unwrap(), b"1");

        assert!(store.replace(b"k", b"3").unwrap());
        assert!(!store.replace(b"missing", b"3").unwrap());
        assert_eq!(store.seek_exact(b"k").unwrap().unwrap(), b"3");

        assert!(store.delete(b"k").unwrap());
        assert!(!store.delete(b"k").unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn append_never_reuses_numbers() {
        let store = MemStore::new();
        assert_eq!(store.append(b"a").unwrap(), 1);
        assert_eq!(store.append(b"b").unwrap(), 2);
        assert!(store.delete(&2_u64.to_be_bytes()).unwrap());
        assert_eq!(store.append(b"c").unwrap(), 3);

        store.put(&10_u64.to_be_bytes(), b"explicit").unwrap();
        assert_eq!(store.append(b"d").unwrap(), 11);
        assert_eq!(store.len().unwrap(), 4);
    }

    #[test]
    fn clones_share_records() {
        let store = MemStore::new();
        let other = store.clone();
        store.put(b"k", b"v").unwrap();
        assert_eq!(other.seek_exact(b"k").unwrap().unwrap(), b"v");
    }
}
