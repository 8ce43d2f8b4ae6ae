use stratacache::{Cache, CacheBuilder, EntryKind, Key, PriorityIter, UserInfo};

fn new_slru_cache(max_size: u64, max_elements: u64, size_ratio: f64) -> Cache {
  CacheBuilder::new()
    .max_size(max_size)
    .max_elements(max_elements)
    .slru(size_ratio)
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

fn protected_size(cache: &Cache) -> u64 {
  cache
    .dump()
    .entries
    .iter()
    .filter(|e| e.kind == EntryKind::Protected)
    .map(|e| e.size)
    .sum()
}

#[test]
fn test_new_entries_start_probationary() {
  let cache = new_slru_cache(100, 10, 0.5);
  let iter = add(&cache, 1, 20);

  assert_eq!(iter.kind(), EntryKind::Probationary);
  assert!(cache
    .dump()
    .entries
    .iter()
    .all(|e| e.kind == EntryKind::Probationary));
}

#[test]
fn test_promotion_demotes_protected_overflow() {
  // size_ratio=0.5 over 100 bytes: protected budget is 50.
  let cache = new_slru_cache(100, 10, 0.5);
  let a = add(&cache, 1, 20);
  let b = add(&cache, 2, 20);
  let c = add(&cache, 3, 20);

  {
    let mut lock = cache.priority().lock();
    a.increase_priority(&mut lock);
    assert_eq!(a.kind(), EntryKind::Protected);
    b.increase_priority(&mut lock);
    c.increase_priority(&mut lock);
  }

  // a, b, c would make protected 60 > 50: the protected LRU (a) was
  // demoted back to probationary.
  assert_eq!(a.kind(), EntryKind::Probationary);
  assert_eq!(b.kind(), EntryKind::Protected);
  assert_eq!(c.kind(), EntryKind::Protected);
  assert!(protected_size(&cache) <= 50);

  // Promote a again: protected wants 60 again, so its LRU (b) demotes.
  a.increase_priority(&mut cache.priority().lock());
  assert_eq!(a.kind(), EntryKind::Protected);
  assert_eq!(b.kind(), EntryKind::Probationary);
  assert!(protected_size(&cache) <= 50);
  cache.priority().lock().check().expect("accounting intact");
}

#[test]
fn test_protected_budget_holds_across_operations() {
  let cache = new_slru_cache(200, 100, 0.4); // protected budget 80
  let mut iters = Vec::new();
  for key in 0..10u128 {
    iters.push(add(&cache, key, 15));
  }

  for (round, iter) in iters.iter().enumerate() {
    let mut lock = cache.priority().lock();
    iter.increase_priority(&mut lock);
    if round % 3 == 0 {
      iter.increase_priority(&mut lock);
    }
    drop(lock);
    assert!(
      protected_size(&cache) <= 80,
      "protected exceeded its budget after round {round}"
    );
  }
}

#[test]
fn test_eviction_prefers_probationary() {
  let cache = new_slru_cache(100, 10, 0.5);
  let a = add(&cache, 1, 20);
  add(&cache, 2, 20);
  add(&cache, 3, 20);
  a.increase_priority(&mut cache.priority().lock());

  // Eviction order: probationary LRU first (2, then 3), protected last.
  let keys: Vec<u128> = cache.dump().entries.iter().map(|e| e.key.raw()).collect();
  assert_eq!(keys, vec![2, 3, 1]);
}

#[test]
fn test_demoted_entry_lands_at_probationary_front() {
  let cache = new_slru_cache(100, 10, 0.4); // protected budget 40
  let a = add(&cache, 1, 30);
  let b = add(&cache, 2, 30);
  add(&cache, 3, 20);

  {
    let mut lock = cache.priority().lock();
    a.increase_priority(&mut lock);
    b.increase_priority(&mut lock); // a demotes, lands probationary-MRU
  }

  assert_eq!(a.kind(), EntryKind::Probationary);
  let keys: Vec<u128> = cache.dump().entries.iter().map(|e| e.key.raw()).collect();
  // Victim order: untouched 3 first, then demoted a, then protected b.
  assert_eq!(keys, vec![3, 1, 2]);
}

#[test]
fn test_ratio_change_rebalances_protected() {
  let cache = new_slru_cache(100, 10, 0.8); // protected budget 80
  let a = add(&cache, 1, 30);
  let b = add(&cache, 2, 30);
  {
    let mut lock = cache.priority().lock();
    a.increase_priority(&mut lock);
    b.increase_priority(&mut lock);
  }
  assert_eq!(protected_size(&cache), 60);

  // Shrinking the ratio demotes down to the new budget.
  assert!(cache.modify_size_limits(100, 10, 0.3));
  assert!(protected_size(&cache) <= 30);
  cache.priority().lock().check().expect("accounting intact");
}
