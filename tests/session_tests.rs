use std::net::Ipv4Addr;
use tcpcarve::sessions::{SESSION_BUCKETS, SessionStore};
use tcpcarve::types::FourTuple;

fn tuple(n: u32) -> FourTuple {
    FourTuple::new(
        Ipv4Addr::new(10, (n >> 16) as u8, (n >> 8) as u8, n as u8),
        1024 + (n % 1000) as u16,
        Ipv4Addr::new(192, 168, 0, 1),
        80,
    )
}

#[test]
fn test_find_or_create_is_idempotent() {
    let mut store = SessionStore::new();
    store.find_or_create(tuple(1), 0);
    store.find_or_create(tuple(1), 10);
    assert_eq!(store.population(), 1);
    assert_eq!(store.stats().unchained, 1);
    assert_eq!(store.stats().chained, 0);
}

#[test]
fn test_overload_chains_instead_of_dropping() {
    let mut store = SessionStore::new();
    let count = SESSION_BUCKETS as u32 + 100;
    for n in 0..count {
        store.find_or_create(tuple(n), 0);
    }
    let stats = store.stats();
    assert_eq!(stats.entries, count);
    assert!(stats.chained >= 100);
    assert!(stats.longest_chain >= 1);
    for n in 0..count {
        assert!(store.get(&tuple(n)).is_some(), "session {n} lost");
    }
    assert_eq!(store.iter().count(), count as usize);
}

#[test]
fn test_lookup_hit_refreshes_timestamp() {
    let mut store = SessionStore::new();
    store.find_or_create(tuple(1), 0);
    store.find_or_create(tuple(2), 0);
    store.find_or_create(tuple(1), 200);
    assert_eq!(store.expire(300, 300), 1);
    assert!(store.get(&tuple(1)).is_some());
    assert!(store.get(&tuple(2)).is_none());
}

#[test]
fn test_get_does_not_refresh_timestamp() {
    let mut store = SessionStore::new();
    store.find_or_create(tuple(7), 0);
    assert!(store.get(&tuple(7)).is_some());
    assert_eq!(store.expire(500, 300), 1);
    assert_eq!(store.population(), 0);
}

#[test]
fn test_expire_removes_only_idle_sessions() {
    let mut store = SessionStore::new();
    store.find_or_create(tuple(1), 0);
    store.find_or_create(tuple(2), 100);
    store.find_or_create(tuple(3), 250);
    let removed = store.expire(300, 300);
    assert_eq!(removed, 1);
    assert_eq!(store.population(), 2);
    assert!(store.get(&tuple(1)).is_none());
    assert!(store.get(&tuple(2)).is_some());
    assert!(store.get(&tuple(3)).is_some());
}

#[test]
fn test_expire_at_exact_threshold() {
    let mut store = SessionStore::new();
    store.find_or_create(tuple(1), 0);
    assert_eq!(store.expire(299, 300), 0);
    assert_eq!(store.expire(300, 300), 1);
}

#[test]
fn test_clear_keeps_longest_chain_high_water() {
    let mut store = SessionStore::new();
    for n in 0..(SESSION_BUCKETS as u32 + 100) {
        store.find_or_create(tuple(n), 0);
    }
    let high_water = store.stats().longest_chain;
    assert!(high_water >= 1);
    store.clear();
    assert_eq!(store.population(), 0);
    assert_eq!(store.stats().longest_chain, high_water);
}

#[test]
fn test_colliding_tuples_stay_distinct() {
    // same endpoints reversed hash however they like; membership is a
    // full-tuple compare either way
    let a = FourTuple::new(Ipv4Addr::new(10, 0, 0, 1), 4444, Ipv4Addr::new(10, 0, 0, 2), 80);
    let b = FourTuple::new(Ipv4Addr::new(10, 0, 0, 2), 80, Ipv4Addr::new(10, 0, 0, 1), 4444);
    let mut store = SessionStore::new();
    store.find_or_create(a, 0);
    store.find_or_create(b, 0);
    assert_eq!(store.population(), 2);
    assert!(store.get(&a).is_some());
    assert!(store.get(&b).is_some());
}
