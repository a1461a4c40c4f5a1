//! End-to-end tests of the file storage engine across both codecs and
//! both write strategies.

use std::sync::Arc;
use std::time::Duration;

use fscache::{
    codec, CacheError, CodecKind, Expiration, FileCache, FileCacheConfig, Result, WriteStrategy,
};
use tempfile::TempDir;

fn cache_with(dir: &TempDir, codec: CodecKind, strategy: WriteStrategy) -> FileCache {
    let config = FileCacheConfig::builder(dir.path())
        .with_codec(codec)
        .with_strategy(strategy)
        .build();
    FileCache::new(config).unwrap()
}

fn all_variants(dir: &TempDir) -> Vec<FileCache> {
    [
        (CodecKind::Binary, WriteStrategy::Atomic),
        (CodecKind::Binary, WriteStrategy::Locked),
        (CodecKind::Guarded, WriteStrategy::Atomic),
        (CodecKind::Guarded, WriteStrategy::Locked),
    ]
    .into_iter()
    .map(|(codec, strategy)| cache_with(dir, codec, strategy))
    .collect()
}

fn collect_keys(cache: &FileCache, prefix: &str) -> Vec<String> {
    let mut keys: Vec<_> = cache
        .list_keys(prefix)
        .unwrap()
        .collect::<Result<Vec<_>>>()
        .unwrap();
    keys.sort();
    keys
}

#[test]
fn round_trip_for_every_codec_and_strategy() {
    for (codec, strategy) in [
        (CodecKind::Binary, WriteStrategy::Atomic),
        (CodecKind::Binary, WriteStrategy::Locked),
        (CodecKind::Guarded, WriteStrategy::Atomic),
        (CodecKind::Guarded, WriteStrategy::Locked),
    ] {
        let dir = TempDir::new().unwrap();
        let cache = cache_with(&dir, codec, strategy);

        assert!(!cache.exists("some.key").unwrap());
        assert_eq!(cache.read("some.key").unwrap(), None);

        cache
            .write("some.key", b"\x00binary\xffbytes", None, false)
            .unwrap();
        assert!(cache.exists("some.key").unwrap());
        assert_eq!(
            cache.read("some.key").unwrap(),
            Some(b"\x00binary\xffbytes".to_vec())
        );

        cache.delete("some.key").unwrap();
        assert!(!cache.exists("some.key").unwrap());
    }
}

#[test]
fn non_overwrite_keeps_the_first_value() {
    let dir = TempDir::new().unwrap();
    for cache in all_variants(&dir) {
        cache.write("k", b"v1", None, false).unwrap();
        let err = cache.write("k", b"v2", None, false).unwrap_err();
        assert!(matches!(err, CacheError::AlreadyExists { .. }));
        assert_eq!(cache.read("k").unwrap(), Some(b"v1".to_vec()));
        cache.clear().unwrap();
    }
}

#[test]
fn overwrite_installs_the_new_value() {
    let dir = TempDir::new().unwrap();
    for cache in all_variants(&dir) {
        cache.write("k", b"v1", None, false).unwrap();
        cache.write("k", b"v2", None, true).unwrap();
        assert_eq!(cache.read("k").unwrap(), Some(b"v2".to_vec()));
        cache.clear().unwrap();
    }
}

#[test]
fn expired_entries_read_as_absent() {
    let dir = TempDir::new().unwrap();
    let cache = cache_with(&dir, CodecKind::Binary, WriteStrategy::Atomic);

    let past = Expiration::at(codec::unix_now() - 60);
    cache
        .write_with_expiration("expired", b"old", past, false)
        .unwrap();
    assert!(!cache.exists("expired").unwrap());
    assert_eq!(cache.read("expired").unwrap(), None);

    // Expired means writable again even without overwrite.
    cache.write("expired", b"fresh", None, false).unwrap();
    assert_eq!(cache.read("expired").unwrap(), Some(b"fresh".to_vec()));
}

#[test]
fn future_ttl_and_never_expiring_entries_stay_valid() {
    let dir = TempDir::new().unwrap();
    let cache = cache_with(&dir, CodecKind::Binary, WriteStrategy::Atomic);

    cache
        .write("with.ttl", b"v", Some(Duration::from_secs(3600)), false)
        .unwrap();
    cache.write("forever", b"v", None, false).unwrap();
    cache
        .write("zero.ttl", b"v", Some(Duration::ZERO), false)
        .unwrap();
    cache
        .write("huge.ttl", b"v", Some(Duration::MAX), false)
        .unwrap();

    assert!(cache.exists("with.ttl").unwrap());
    assert!(cache.exists("forever").unwrap());
    assert!(cache.exists("zero.ttl").unwrap());
    assert!(cache.exists("huge.ttl").unwrap());
}

#[test]
fn corrupt_guarded_footer_reads_as_absent_and_is_cleaned_up() {
    let dir = TempDir::new().unwrap();
    let cache = cache_with(&dir, CodecKind::Guarded, WriteStrategy::Atomic);

    // Preamble plus a footer position of u64::MAX, as a hostile or
    // truncated writer could leave behind.
    let rel = cache.factory().relative_path("junk");
    let path = dir.path().join(rel.trim_start_matches('/'));
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut raw = codec::GUARD_PREAMBLE.to_vec();
    raw.extend_from_slice(&0u64.to_be_bytes());
    raw.extend_from_slice(&u64::MAX.to_be_bytes());
    std::fs::write(&path, &raw).unwrap();

    assert!(!cache.exists("junk").unwrap());
    assert_eq!(cache.read("junk").unwrap(), None);

    cache.cleanup().unwrap();
    assert!(!path.exists());
}

#[test]
fn cleanup_removes_only_stale_entries_and_prunes_dirs() {
    let dir = TempDir::new().unwrap();
    let cache = cache_with(&dir, CodecKind::Binary, WriteStrategy::Atomic);

    cache.write("fresh", b"keep", None, false).unwrap();
    cache
        .write_with_expiration("stale", b"old", Expiration::at(1), false)
        .unwrap();

    // A structurally invalid file planted on a shard path of its own.
    let junk_rel = cache.factory().relative_path("junk.key");
    let junk_path = dir.path().join(junk_rel.trim_start_matches('/'));
    std::fs::create_dir_all(junk_path.parent().unwrap()).unwrap();
    std::fs::write(&junk_path, b"xx").unwrap();

    cache.cleanup().unwrap();

    assert_eq!(cache.read("fresh").unwrap(), Some(b"keep".to_vec()));
    assert!(!cache.exists("stale").unwrap());
    assert!(!junk_path.exists());

    // Shard directories of removed entries are pruned; occupied ones stay.
    assert!(!junk_path.parent().unwrap().exists());
    let fresh_rel = cache.factory().relative_path("fresh");
    let fresh_path = dir.path().join(fresh_rel.trim_start_matches('/'));
    assert!(fresh_path.parent().unwrap().exists());
}

#[test]
fn filter_removes_exactly_the_prefixed_keys() {
    let dir = TempDir::new().unwrap();
    for cache in all_variants(&dir) {
        for key in ["foo.lorem", "foo.ipsum", "foodolor", "bar.sit"] {
            cache.write(key, key.as_bytes(), None, false).unwrap();
        }

        cache.filter("foo.").unwrap();

        assert!(!cache.exists("foo.lorem").unwrap());
        assert!(!cache.exists("foo.ipsum").unwrap());
        assert!(cache.exists("foodolor").unwrap());
        assert!(cache.exists("bar.sit").unwrap());

        cache.filter("").unwrap();
        assert!(collect_keys(&cache, "").is_empty());
    }
}

#[test]
fn list_keys_yields_valid_matching_entries_only() {
    let dir = TempDir::new().unwrap();
    let cache = cache_with(&dir, CodecKind::Guarded, WriteStrategy::Atomic);

    cache.write("foo.lorem", b"1", None, false).unwrap();
    cache.write("foo.ipsum", b"2", None, false).unwrap();
    cache.write("bar.sit", b"3", None, false).unwrap();
    cache
        .write_with_expiration("foo.stale", b"4", Expiration::at(1), false)
        .unwrap();

    assert_eq!(
        collect_keys(&cache, "foo."),
        vec!["foo.ipsum".to_string(), "foo.lorem".to_string()]
    );
    assert_eq!(
        collect_keys(&cache, ""),
        vec![
            "bar.sit".to_string(),
            "foo.ipsum".to_string(),
            "foo.lorem".to_string()
        ]
    );
    // Nothing was deleted by enumeration.
    assert!(cache.exists("foo.lorem").unwrap());
}

#[test]
fn clear_empties_the_tree_and_prunes_shard_dirs() {
    let dir = TempDir::new().unwrap();
    let cache = cache_with(&dir, CodecKind::Binary, WriteStrategy::Locked);

    for key in ["a", "b", "c", "d"] {
        cache.write(key, b"v", None, false).unwrap();
    }
    cache.clear().unwrap();

    assert!(collect_keys(&cache, "").is_empty());
    let shard_dirs: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir() && e.file_name() != "tmp")
        .collect();
    assert!(shard_dirs.is_empty());
}

#[test]
fn bulk_operations_tolerate_a_missing_root() {
    let dir = TempDir::new().unwrap();
    let config = FileCacheConfig::new(dir.path().join("never-created"));
    let cache = FileCache::new(config).unwrap();

    cache.clear().unwrap();
    cache.cleanup().unwrap();
    cache.filter("foo").unwrap();
    assert!(collect_keys(&cache, "").is_empty());
    assert!(!cache.exists("k").unwrap());
}

#[test]
fn concurrent_atomic_writers_leave_one_valid_payload() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(cache_with(&dir, CodecKind::Binary, WriteStrategy::Atomic));

    let mut handles = Vec::new();
    for writer in 0..8u8 {
        let cache = Arc::clone(&cache);
        handles.push(std::thread::spawn(move || {
            let payload = vec![writer; 4096];
            for _ in 0..20 {
                cache.write("contended.key", &payload, None, true).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let payload = cache.read("contended.key").unwrap().expect("entry valid");
    assert_eq!(payload.len(), 4096);
    // Exactly one writer's bytes, never interleaved.
    assert!(payload.iter().all(|b| *b == payload[0]));
}

#[test]
fn guarded_files_on_disk_start_with_the_preamble() {
    let dir = TempDir::new().unwrap();
    let cache = cache_with(&dir, CodecKind::Guarded, WriteStrategy::Atomic);
    cache.write("secret", b"do not leak", None, false).unwrap();

    let rel = cache.factory().relative_path("secret");
    assert!(rel.ends_with(".php"));
    let raw = std::fs::read(dir.path().join(rel.trim_start_matches('/'))).unwrap();
    assert!(raw.starts_with(b"<?php "));
}

#[test]
fn binary_files_land_on_deterministic_paths() {
    let dir = TempDir::new().unwrap();
    let cache = cache_with(&dir, CodecKind::Binary, WriteStrategy::Atomic);
    cache.write("foo.bar", b"v", None, false).unwrap();

    assert!(dir.path().join("a9/a93287ddf7050214.dat").is_file());
}
