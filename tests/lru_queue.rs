use stratacache::{Cache, CacheBuilder, EntryKind, Key, PriorityIter, ReserveError, UserInfo};

fn new_lru_cache(max_size: u64, max_elements: u64) -> Cache {
  CacheBuilder::new()
    .max_size(max_size)
    .max_elements(max_elements)
    .lru()
    .build()
    .unwrap()
}

fn user() -> UserInfo {
  UserInfo::new("query-thread")
}

fn add(cache: &Cache, key: u128, size: u64) -> PriorityIter {
  let metadata = stratacache::KeyMetadata::new(Key::new(key));
  cache
    .priority()
    .lock()
    .add(metadata, 0, size, &user(), false)
    .expect("entry fits")
}

#[test]
fn test_basic_fit() {
  let cache = new_lru_cache(100, 10);

  add(&cache, 1, 30);
  add(&cache, 2, 30);

  let lock = cache.priority().lock();
  assert!(lock.can_fit(40, 1, None, false));
  assert!(!lock.can_fit(41, 1, None, false));
  assert_eq!(lock.size(), 60);
  assert_eq!(lock.elements_count(), 2);
}

#[test]
fn test_eviction_order_is_least_recently_used() {
  let cache = new_lru_cache(100, 10);
  let a = add(&cache, 1, 10);
  add(&cache, 2, 10);
  add(&cache, 3, 10);

  // Touch the oldest entry; the dump is victims-first, so entry 2 becomes
  // the first candidate.
  a.increase_priority(&mut cache.priority().lock());

  let dump = cache.dump();
  let keys: Vec<u128> = dump.entries.iter().map(|e| e.key.raw()).collect();
  assert_eq!(keys, vec![2, 3, 1]);
  assert!(dump.entries.iter().all(|e| e.kind == EntryKind::Lru));
}

#[test]
fn test_hits_count_promotions_under_the_lock() {
  let cache = new_lru_cache(100, 10);
  let iter = add(&cache, 1, 10);

  let mut lock = cache.priority().lock();
  assert_eq!(iter.increase_priority(&mut lock), 1);
  assert_eq!(iter.increase_priority(&mut lock), 2);
  assert_eq!(iter.entry().hits(), 2);
}

#[test]
fn test_invalidated_handle_is_inert() {
  let cache = new_lru_cache(100, 10);
  let iter = add(&cache, 1, 40);

  iter.invalidate();
  assert!(iter.is_invalidated());

  let mut lock = cache.priority().lock();
  assert_eq!(iter.increase_priority(&mut lock), 0, "no promotion");
  iter
    .increment_size(10, &mut lock)
    .expect("no-op growth reports success");
  drop(lock);
  iter.decrement_size(10);

  assert_eq!(iter.entry().size(), 40, "size untouched");
  assert_eq!(cache.priority().lock().size(), 40, "totals untouched");
}

#[test]
fn test_modify_size_limits_at_runtime() {
  let cache = new_lru_cache(100, 10);
  add(&cache, 1, 60);

  assert!(cache.modify_size_limits(200, 20, 0.0));
  assert!(cache.priority().lock().can_fit(140, 1, None, false));

  assert!(
    !cache.modify_size_limits(50, 20, 0.0),
    "limits below current usage report pressure"
  );
  let err = cache
    .reserve(Key::new(9), 0, 60, &user())
    .expect_err("60 bytes can never fit under a 50-byte limit");
  assert!(matches!(err, ReserveError::NotEnoughSpaceEven));
}

#[test]
fn test_approximate_getters_never_understate() {
  let cache = new_lru_cache(1000, 100);
  for key in 0..5u128 {
    add(&cache, key, 10);
  }

  assert_eq!(cache.priority().size_approx(), 50);
  assert_eq!(cache.priority().elements_count_approx(), 5);

  let lock = cache.priority().lock();
  let hold = cache.priority().take_hold(30, 2, EntryKind::Lru, &lock);
  drop(lock);
  assert_eq!(
    cache.priority().size_approx(),
    80,
    "holds are included, pessimistically"
  );
  assert_eq!(cache.priority().elements_count_approx(), 7);
  drop(hold);
  assert_eq!(cache.priority().size_approx(), 50);
}

#[test]
fn test_shuffle_then_check() {
  let cache = new_lru_cache(1000, 100);
  for key in 0..32u128 {
    add(&cache, key, 5);
  }

  let mut lock = cache.priority().lock();
  lock.shuffle();
  lock.check().expect("shuffle keeps accounting intact");
  assert_eq!(lock.size(), 160);
  assert_eq!(lock.elements_count(), 32);
}
