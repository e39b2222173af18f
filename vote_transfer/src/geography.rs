// Geography lookups (provinces, municipalities, election rounds) and a cache
// of them keyed by the identity of the input file.

use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::aggregate::is_location_row;
use crate::config::BallotRecord;

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct GeographyIndex {
    /// Sorted election rounds.
    pub elections: Vec<String>,
    /// Province -> sorted municipalities.
    pub provinces: BTreeMap<String, Vec<String>>,
}

impl GeographyIndex {
    pub fn build(records: &[BallotRecord]) -> GeographyIndex {
        let mut elections: BTreeSet<&str> = BTreeSet::new();
        let mut provinces: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        for r in records.iter() {
            elections.insert(&r.election);
            if is_location_row(r) {
                provinces
                    .entry(r.province.clone())
                    .or_default()
                    .insert(&r.municipality);
            }
        }
        GeographyIndex {
            elections: elections.into_iter().map(|s| s.to_string()).collect(),
            provinces: provinces
                .into_iter()
                .map(|(p, ms)| (p, ms.into_iter().map(|m| m.to_string()).collect()))
                .collect(),
        }
    }

    pub fn municipalities(&self, province: &str) -> &[String] {
        self.provinces
            .get(province)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}

/// The identity of an input file: its path and a SHA-256 digest of its content.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Fingerprint {
    pub path: String,
    pub digest: String,
}

impl Fingerprint {
    pub fn new(path: &str, content: &[u8]) -> Fingerprint {
        Fingerprint {
            path: path.to_string(),
            digest: sha256::digest(content),
        }
    }
}

/// Geography indexes keyed by file fingerprint.
///
/// A changed file gets a new fingerprint, so stale entries are never returned;
/// `invalidate` and `clear` only release memory.
#[derive(Debug, Default)]
pub struct GeographyCache {
    entries: HashMap<Fingerprint, Arc<GeographyIndex>>,
}

impl GeographyCache {
    pub fn new() -> GeographyCache {
        GeographyCache::default()
    }

    pub fn get_or_build<F>(&mut self, fingerprint: &Fingerprint, builder: F) -> Arc<GeographyIndex>
    where
        F: FnOnce() -> GeographyIndex,
    {
        if let Some(idx) = self.entries.get(fingerprint) {
            debug!("get_or_build: cache hit for {}", fingerprint.path);
            return idx.clone();
        }
        debug!(
            "get_or_build: building geography for {} ({})",
            fingerprint.path, fingerprint.digest
        );
        let idx = Arc::new(builder());
        self.entries.insert(fingerprint.clone(), idx.clone());
        idx
    }

    pub fn invalidate(&mut self, fingerprint: &Fingerprint) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    pub fn clear(&mut self) {
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
    use crate::aggregate::tests::records;

    #[test]
    fn indexes_geography() {
        let idx = GeographyIndex::build(&records());
        assert_eq!(idx.elections, vec!["E1", "E2"]);
        assert_eq!(idx.municipalities("Cádiz"), ["Algar", "Rota", "Ubrique"]);
        assert_eq!(idx.municipalities("Sevilla"), ["Osuna", "Écija"]);
        assert!(idx.municipalities("Huelva").is_empty());
    }

    #[test]
    fn fingerprints_follow_content() {
        let a = Fingerprint::new("data.csv", b"one");
        let b = Fingerprint::new("data.csv", b"two");
        assert_ne!(a, b);
        assert_eq!(a, Fingerprint::new("data.csv", b"one"));
        assert_eq!(a.digest.len(), 64);
    }

    #[test]
    fn cache_builds_once_per_fingerprint() {
        let mut cache = GeographyCache::new();
        let fp = Fingerprint::new("data.csv", b"content");
        let mut builds = 0;
        let first = cache.get_or_build(&fp, || {
            builds += 1;
            GeographyIndex::build(&records())
        });
        let second = cache.get_or_build(&fp, || {
            builds += 1;
            GeographyIndex::default()
        });
        assert_eq!(builds, 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let other = Fingerprint::new("data.csv", b"changed");
        let third = cache.get_or_build(&other, GeographyIndex::default);
        assert!(third.elections.is_empty());
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate(&fp));
        assert!(!cache.invalidate(&fp));
        cache.clear();
        assert!(cache.is_empty());
    }
}
