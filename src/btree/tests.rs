#![allow(clippy::undocumented_unsafe_blocks)]

extern crate alloc;
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use std::collections::HashMap;
use std::error::Error;

use itertools::assert_equal;
use proptest::prelude::*;
use typenum::{U1, U2, U3, U4, U8};

use crate::search::{BinaryBranchless, Dynamic, LinearBranchless};
use crate::test_alloc::CountingAlloc;

use super::*;

struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new() -> Self {
        XorShift64 { state: 123456789 }
    }

    fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

#[test]
fn test_constructor() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAlloc::default();
    {
        let map = BTreeMap::<u64, u64, U8, Linear, Linear, &CountingAlloc>::new_in(&alloc)?;
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert_eq!(map.depth(), 0);
        assert_eq!(map.get(&1), None);
        assert!(!map.contains_key(&1));
        map.validate();
        assert_eq!(alloc.n_allocations(), 1);
    }
    assert_eq!(alloc.net_allocations(), 0);
    assert_eq!(alloc.net_bytes(), 0);
    Ok(())
}

#[test]
fn test_small_sequential() -> Result<(), Box<dyn Error>> {
    let mut map = BTreeMap::<u64, u64>::new();
    assert_eq!(map.put(1, 10)?, PutOutcome::Inserted);
    assert_eq!(map.put(2, 20)?, PutOutcome::Inserted);
    assert_eq!(map.put(3, 30)?, PutOutcome::Inserted);

    assert_eq!(map.len(), 3);
    assert_eq!(map.get(&1), Some(&10));
    assert_eq!(map.get(&2), Some(&20));
    assert_eq!(map.get(&3), Some(&30));
    assert_eq!(map.get(&4), None);
    map.validate();
    Ok(())
}

#[test]
fn test_overwrite_keeps_count() -> Result<(), Box<dyn Error>> {
    let mut map = BTreeMap::<u64, u64>::new();
    assert_eq!(map.put(7, 1)?, PutOutcome::Inserted);
    assert_eq!(map.len(), 1);
    assert_eq!(map.put(7, 2)?, PutOutcome::Replaced);
    assert_eq!(map.len(), 1);
    assert_eq!(map.put(7, 3)?, PutOutcome::Replaced);

    assert_eq!(map.len(), 1);
    assert_eq!(map.get(&7), Some(&3));
    map.validate();
    Ok(())
}

#[test]
fn test_root_split_structure() -> Result<(), Box<dyn Error>> {
    let mut map = BTreeMap::<u64, u64, U2>::new();
    map.put(1, 1)?;
    map.put(2, 2)?;
    assert_eq!(map.depth(), 0);
    map.put(3, 3)?;

    // The third insert overflows the root leaf: the median pair moves into
    // a fresh root branch with one key and two leaf children.
    assert_eq!(map.depth(), 1);
    let root = unsafe { map.root.as_ref() };
    assert!(!root.is_leaf());
    assert_eq!(root.len(), 1);
    assert_eq!(*root.key_at(0), 2);
    assert_eq!(*root.value_at(0), 2);
    let lhs = unsafe { root.child(0).unwrap().as_ref() };
    let rhs = unsafe { root.child(1).unwrap().as_ref() };
    assert!(lhs.is_leaf());
    assert!(rhs.is_leaf());
    assert_eq!(lhs.len() + rhs.len(), 2);

    assert_eq!(map.get(&1), Some(&1));
    assert_eq!(map.get(&2), Some(&2));
    assert_eq!(map.get(&3), Some(&3));
    map.validate();
    Ok(())
}

#[test]
fn test_descending_inserts() -> Result<(), Box<dyn Error>> {
    let mut map = BTreeMap::<u64, u64, U4>::new();
    for k in (1..=100).rev() {
        assert_eq!(map.put(k, k)?, PutOutcome::Inserted);
        map.validate();
    }

    assert_eq!(map.len(), 100);
    for k in 1..=100 {
        assert_eq!(map.get(&k), Some(&k));
    }
    assert_eq!(map.get(&0), None);
    assert_eq!(map.get(&101), None);
    Ok(())
}

#[test]
fn test_min_capacity_descending() -> Result<(), Box<dyn Error>> {
    // Capacity 2 with descending keys drives every split through the
    // low-index case, where an unbalanced split would starve the new
    // sibling; validate after every put enforces the minimum fill.
    let mut map = BTreeMap::<u64, u64, U2>::new();
    for k in (1..=60).rev() {
        assert_eq!(map.put(k, k * 2)?, PutOutcome::Inserted);
        map.validate();
    }

    assert_eq!(map.len(), 60);
    for k in 1..=60 {
        assert_eq!(map.get(&k), Some(&(k * 2)));
    }
    assert_eq!(map.get(&0), None);
    assert_eq!(map.get(&61), None);
    Ok(())
}

#[test]
fn test_min_capacity_shuffled() -> Result<(), Box<dyn Error>> {
    let mut rng = XorShift64::new();
    let mut map = BTreeMap::<u64, u64, U2>::new();
    let mut keys: Vec<u64> = (0..200).collect();
    for i in (1..keys.len()).rev() {
        let j = (rng.next() % (i as u64 + 1)) as usize;
        keys.swap(i, j);
    }
    for &k in &keys {
        map.put(k, k * 3)?;
        map.validate();
    }

    assert_eq!(map.len(), 200);
    for k in 0..200 {
        assert_eq!(map.get(&k), Some(&(k * 3)));
    }
    assert_eq!(map.get(&200), None);
    Ok(())
}

#[test]
fn test_branch_hit_overwrite() -> Result<(), Box<dyn Error>> {
    let mut map = BTreeMap::<u64, u64, U2>::new();
    for k in 1..=10 {
        map.put(k, k)?;
    }
    assert!(map.depth() >= 1);

    // The root's key lives in a branch; overwriting it must short-circuit
    // there rather than descend.
    let root_key = *unsafe { map.root.as_ref() }.key_at(0);
    assert_eq!(map.put(root_key, 999)?, PutOutcome::Replaced);
    assert_eq!(map.get(&root_key), Some(&999));
    assert_eq!(map.len(), 10);
    map.validate();
    Ok(())
}

#[test]
fn test_depth_stays_logarithmic() -> Result<(), Box<dyn Error>> {
    let mut map = BTreeMap::<u64, u64, U4>::new();
    let n = 2000u64;
    for k in 0..n {
        map.put(k, k)?;
    }
    map.validate();

    // Every branch keeps at least ceil(C / 2) = 2 children, so the depth is
    // bounded by log2(n + 1) plus the root level.
    let mut bound = 0;
    let mut reach = 1u64;
    while reach < n + 1 {
        reach *= 2;
        bound += 1;
    }
    assert!(
        map.depth() <= bound + 1,
        "depth {} exceeds bound {}",
        map.depth(),
        bound + 1
    );
    Ok(())
}

#[test]
fn test_random_workload_roundtrip() -> Result<(), Box<dyn Error>> {
    let mut rng = XorShift64::new();
    let mut map = BTreeMap::<u64, u64>::new();
    let mut model: HashMap<u64, u64> = HashMap::new();

    let mut pairs = Vec::new();
    for _ in 0..(1 << 14) {
        let k = rng.next();
        let v = rng.next();
        pairs.push((k, v));
        map.put(k, v)?;
        model.insert(k, v);
    }
    map.validate();
    assert_eq!(map.len(), model.len());
    for (k, v) in &model {
        assert_eq!(map.get(k), Some(v));
    }

    // Re-putting every original pair only replaces.
    for (k, v) in pairs {
        assert_eq!(map.put(k, v)?, PutOutcome::Replaced);
    }
    assert_eq!(map.len(), model.len());
    map.validate();
    Ok(())
}

fn shuffled_roundtrip<BS: Search, LS: Search>() -> Result<(), Box<dyn Error>> {
    let mut rng = XorShift64::new();
    let mut map = BTreeMap::<u64, u64, U3, BS, LS>::new();
    let mut keys: Vec<u64> = (0..500).collect();
    // Fisher-Yates with the bench generator; reproducible across runs.
    for i in (1..keys.len()).rev() {
        let j = (rng.next() % (i as u64 + 1)) as usize;
        keys.swap(i, j);
    }
    for &k in &keys {
        map.put(k, k * 3)?;
    }
    map.validate();
    assert_eq!(map.len(), 500);
    for k in 0..500 {
        assert_eq!(map.get(&k), Some(&(k * 3)));
    }
    assert_eq!(map.get(&500), None);
    Ok(())
}

#[test]
fn test_strategy_linear_pair() -> Result<(), Box<dyn Error>> {
    shuffled_roundtrip::<Linear, Linear>()
}

#[test]
fn test_strategy_branchless_linear() -> Result<(), Box<dyn Error>> {
    shuffled_roundtrip::<LinearBranchless, LinearBranchless>()
}

#[test]
fn test_strategy_branchless_binary() -> Result<(), Box<dyn Error>> {
    shuffled_roundtrip::<BinaryBranchless, BinaryBranchless>()
}

#[test]
fn test_strategy_dynamic() -> Result<(), Box<dyn Error>> {
    shuffled_roundtrip::<Dynamic<U2>, Dynamic<U1>>()?;
    shuffled_roundtrip::<BinaryBranchless, Dynamic<U2>>()
}

#[test]
fn test_string_keys_borrowed_lookup() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAlloc::default();
    {
        let mut map =
            BTreeMap::<String, String, U2, Linear, Linear, &CountingAlloc>::new_in(&alloc)?;
        for word in ["delta", "alpha", "echo", "bravo", "charlie"] {
            map.put(word.to_string(), word.to_uppercase())?;
        }
        map.put("alpha".to_string(), "ALPHA2".to_string())?;

        assert_eq!(map.len(), 5);
        assert_eq!(map.get("alpha"), Some(&"ALPHA2".to_string()));
        assert_eq!(map.get("echo"), Some(&"ECHO".to_string()));
        assert_eq!(map.get("foxtrot"), None);
        map.validate();
    }
    // Dropping the map must release every node and every heap string.
    assert_eq!(alloc.net_allocations(), 0);
    assert_eq!(alloc.net_bytes(), 0);
    Ok(())
}

#[test]
fn test_out_of_memory_on_construction() {
    let alloc = CountingAlloc::fail_after(0);
    let result = BTreeMap::<u64, u64, U2, Linear, Linear, &CountingAlloc>::new_in(&alloc);
    assert_eq!(result.err(), Some(TreeError::OutOfMemory));
    assert_eq!(alloc.net_allocations(), 0);
}

#[test]
fn test_out_of_memory_put_is_atomic() -> Result<(), Box<dyn Error>> {
    // Budget covers the root leaf and nothing else: the first split cannot
    // reserve its nodes and must fail without touching the tree.
    let alloc = CountingAlloc::fail_after(2);
    {
        let mut map = BTreeMap::<u64, u64, U2, Linear, Linear, &CountingAlloc>::new_in(&alloc)?;
        map.put(1, 1)?;
        map.put(2, 2)?;

        assert_eq!(map.put(3, 3), Err(TreeError::OutOfMemory));
        assert_eq!(map.len(), 2);
        assert_eq!(map.depth(), 0);
        assert_eq!(map.get(&1), Some(&1));
        assert_eq!(map.get(&2), Some(&2));
        assert_eq!(map.get(&3), None);
        map.validate();

        // Overwrites never allocate, so they still succeed.
        assert_eq!(map.put(2, 22)?, PutOutcome::Replaced);
        assert_eq!(map.get(&2), Some(&22));
    }
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
fn test_node_allocation_count() -> Result<(), Box<dyn Error>> {
    let alloc = CountingAlloc::default();
    {
        let mut map = BTreeMap::<u64, u64, U2, Linear, Linear, &CountingAlloc>::new_in(&alloc)?;
        assert_eq!(alloc.n_allocations(), 1);
        map.put(1, 1)?;
        map.put(2, 2)?;
        assert_eq!(alloc.n_allocations(), 1);
        // Root split: one sibling leaf plus the new root.
        map.put(3, 3)?;
        assert_eq!(alloc.n_allocations(), 3);
        assert_eq!(map.depth(), 1);
    }
    assert_eq!(alloc.net_allocations(), 0);
    Ok(())
}

#[test]
#[should_panic(expected = "out of order")]
fn test_validate_detects_disorder() {
    let mut map = BTreeMap::<u64, u64, U4>::new();
    // Stays within the root leaf, so the damage is a plain ordering break.
    for k in 0..4 {
        map.put(k, k).unwrap();
    }
    let root = unsafe { map.root.as_mut() };
    root.set_key(0, 100);
    map.validate();
}

#[test]
#[should_panic(expected = "separator")]
fn test_validate_detects_bad_separator() {
    let mut map = BTreeMap::<u64, u64, U2>::new();
    for k in 0..10 {
        map.put(k, k).unwrap();
    }
    assert!(map.depth() >= 1);
    // Push the first root separator past everything beneath its right
    // child.
    let root = unsafe { map.root.as_mut() };
    root.set_key(0, 1000);
    map.validate();
}

proptest! {
    #[test]
    fn prop_model_equivalence(pairs in prop::collection::vec((0..500u64, any::<u64>()), 0..400)) {
        let alloc = CountingAlloc::default();
        {
            let mut map =
                BTreeMap::<u64, u64, U3, Linear, Linear, &CountingAlloc>::new_in(&alloc)?;
            let mut model: HashMap<u64, u64> = HashMap::new();
            for &(k, v) in &pairs {
                let outcome = map.put(k, v)?;
                let expected = if model.insert(k, v).is_some() {
                    PutOutcome::Replaced
                } else {
                    PutOutcome::Inserted
                };
                prop_assert_eq!(outcome, expected);
            }
            map.validate();
            prop_assert_eq!(map.len(), model.len());
            for (k, v) in &model {
                prop_assert_eq!(map.get(k), Some(v));
            }
            for k in 500..520 {
                prop_assert_eq!(map.get(&k), None);
            }
        }
        prop_assert_eq!(alloc.net_allocations(), 0);
    }
}

proptest! {
    #[test]
    fn prop_insertion_order_is_irrelevant(
        keys in prop::collection::hash_set(0..10_000u64, 1..200),
        seed in any::<u64>(),
    ) {
        let keys: Vec<u64> = keys.into_iter().collect();
        let mut shuffled = keys.clone();
        let mut rng = XorShift64 { state: seed | 1 };
        for i in (1..shuffled.len()).rev() {
            let j = (rng.next() % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }

        let mut a = BTreeMap::<u64, u64, U4>::new();
        let mut b = BTreeMap::<u64, u64, U4>::new();
        for &k in &keys {
            a.put(k, k * 7)?;
        }
        for &k in &shuffled {
            b.put(k, k * 7)?;
        }
        a.validate();
        b.validate();
        prop_assert_eq!(a.len(), b.len());
        for &k in &keys {
            prop_assert_eq!(a.get(&k), b.get(&k));
        }
    }
}

#[test]
fn test_print_dump_shape() -> Result<(), Box<dyn Error>> {
    let mut map = BTreeMap::<u64, u64, U2>::new();
    for k in 1..=5 {
        map.put(k, k * 10)?;
    }
    let mut out = Vec::new();
    map.print(&mut out)?;
    let text = String::from_utf8(out)?;
    let lines: Vec<&str> = text.lines().collect();
    // One line per node; the root line is unindented, children are not.
    assert!(lines[0].starts_with("node "));
    assert!(lines[1].starts_with("  "));
    assert!(text.contains("2=20"));
    assert!(text.contains("5=50"));
    Ok(())
}

#[test]
fn test_ordered_model_cross_check() -> Result<(), Box<dyn Error>> {
    // Cross-check a mixed workload against an ordered model.
    let mut map = BTreeMap::<u64, u64, U2>::new();
    let mut model = std::collections::BTreeMap::new();
    let mut rng = XorShift64::new();
    for _ in 0..300 {
        let k = rng.next() % 64;
        let v = rng.next();
        map.put(k, v)?;
        model.insert(k, v);
    }
    map.validate();
    assert_equal(
        model.iter().map(|(k, v)| (*k, *v)),
        model.keys().map(|k| (*k, *map.get(k).unwrap())),
    );
    Ok(())
}
