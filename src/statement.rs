//! Prepared statement naming and per-connection cache.
use lru::LruCache;
use std::{
    hash::{DefaultHasher, Hash, Hasher},
    num::NonZeroUsize,
    sync::Arc,
};

use crate::{postgres::Oid, row::FieldDescription};

/// Hash of the trimmed query text, the cache key.
pub(crate) fn sql_id(sql: &str) -> u64 {
    let mut buf = DefaultHasher::new();
    sql.trim().hash(&mut buf);
    buf.finish()
}

const NAME_LEN: usize = 1 + 16;

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Server-side prepared statement name.
///
/// Derived deterministically from the query text hash (`s` followed by 16
/// hex digits), so a reconnect re-prepares under the same name. The unnamed
/// statement encodes as the empty string on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct StatementName([u8; NAME_LEN]);

impl StatementName {
    /// The unnamed statement.
    pub fn unnamed() -> Self {
        Self([b'?'; NAME_LEN])
    }

    pub(crate) fn derive(sqlid: u64) -> Self {
        let mut buf = [b's'; NAME_LEN];
        for i in 0..16 {
            buf[NAME_LEN - 1 - i] = HEX[(sqlid >> (i * 4)) as usize & 0xf];
        }
        Self(buf)
    }

    pub fn as_str(&self) -> &str {
        if self.is_unnamed() {
            return "";
        }
        // SAFETY: ascii only construction and is immutable
        unsafe { std::str::from_utf8_unchecked(&self.0[..]) }
    }

    pub fn is_unnamed(&self) -> bool {
        self.0[0] == b'?'
    }
}

impl std::fmt::Display for StatementName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for StatementName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("StatementName").field(&self.as_str()).finish()
    }
}

impl AsRef<str> for StatementName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// A successfully parsed statement the connection knows about.
#[derive(Debug, Clone)]
pub(crate) struct CachedStatement {
    pub name: StatementName,
    /// Parameter type oids reported by the first Describe.
    pub param_oids: Vec<Oid>,
    /// Row description from the first Describe, `None` after NoData.
    pub columns: Option<Arc<[FieldDescription]>>,
}

/// Per-connection memoisation of parsed statements.
///
/// Every entry corresponds to a Parse the connection has sent and not
/// discarded. Unbounded by default; with a capacity configured, the evicted
/// statement name is handed back so the caller can Close it on the server.
pub(crate) struct StatementCache {
    inner: LruCache<u64, CachedStatement>,
}

impl StatementCache {
    pub fn unbounded() -> Self {
        Self { inner: LruCache::unbounded() }
    }

    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self { inner: LruCache::new(capacity) }
    }

    pub fn get(&mut self, sqlid: u64) -> Option<&CachedStatement> {
        self.inner.get(&sqlid)
    }

    /// Add a parsed statement, returning the statement evicted to make room.
    pub fn insert(&mut self, sqlid: u64, stmt: CachedStatement) -> Option<CachedStatement> {
        self.inner
            .push(sqlid, stmt)
            .and_then(|(id,evicted)| (id != sqlid).then_some(evicted))
    }

    /// Drop every entry, on connection reset.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("len", &self.inner.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_deterministic() {
        let id = sql_id("select * from pg_type");
        assert_eq!(StatementName::derive(id), StatementName::derive(id));
        assert_eq!(id, sql_id("  select * from pg_type  "));
    }

    #[test]
    fn name_is_hex() {
        let name = StatementName::derive(0xdead_beef);
        assert_eq!(name.as_str(), "s00000000deadbeef");
        assert!(!name.is_unnamed());
    }

    #[test]
    fn unnamed_is_empty_on_the_wire() {
        assert_eq!(StatementName::unnamed().as_str(), "");
        assert!(StatementName::unnamed().is_unnamed());
    }

    fn entry(sqlid: u64) -> CachedStatement {
        CachedStatement {
            name: StatementName::derive(sqlid),
            param_oids: vec![],
            columns: None,
        }
    }

    #[test]
    fn unbounded_cache_never_evicts() {
        let mut cache = StatementCache::unbounded();
        for id in 0..100 {
            assert!(cache.insert(id, entry(id)).is_none());
        }
        assert_eq!(cache.len(), 100);
        assert!(cache.get(7).is_some());
        assert!(cache.get(100).is_none());
    }

    #[test]
    fn bounded_cache_hands_back_evicted() {
        let mut cache = StatementCache::with_capacity(NonZeroUsize::new(1).unwrap());
        assert!(cache.insert(1, entry(1)).is_none());
        let evicted = cache.insert(2, entry(2)).unwrap();
        assert_eq!(evicted.name, StatementName::derive(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn same_key_replace_is_not_eviction() {
        let mut cache = StatementCache::with_capacity(NonZeroUsize::new(1).unwrap());
        cache.insert(1, entry(1));
        assert!(cache.insert(1, entry(1)).is_none());
    }

    #[test]
    fn clear_on_reset() {
        let mut cache = StatementCache::unbounded();
        cache.insert(1, entry(1));
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
