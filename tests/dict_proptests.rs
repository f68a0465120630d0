use proptest::prelude::*;
use rehash_dict::{Dict, DictError, ResizeGate, ResizePolicy, StdType};
use std::collections::{BTreeMap, BTreeSet};

fn local_dict() -> Dict<u32, u32> {
    Dict::with_policy(StdType, ResizePolicy::new().with_gate(ResizeGate::new(true)))
}

// Model add/delete/find against a BTreeMap with explicit rehash steps mixed in.
proptest! {
    #[test]
    fn prop_dict_matches_model(ops in proptest::collection::vec((0u8..=4u8, 0u32..64u32), 1..300)) {
        let mut d = local_dict();
        let mut model = BTreeMap::new();
        for (op, k) in ops {
            match op {
                // Insert value == k * 2
                0 => {
                    let res = d.add(k, k * 2);
                    if model.insert(k, k * 2).is_some() {
                        prop_assert_eq!(res, Err(DictError::AlreadyExists));
                    } else {
                        prop_assert_eq!(res, Ok(()));
                    }
                }
                1 => {
                    let res = d.delete(&k);
                    prop_assert_eq!(res.is_ok(), model.remove(&k).is_some());
                }
                2 => prop_assert_eq!(d.fetch_value(&k), model.get(&k)),
                // Rehash a few buckets
                3 => { d.rehash((k % 4) as usize); }
                // Start a resize to a random multiple of the population
                4 => {
                    if !d.is_rehashing() {
                        let _ = d.begin_resize(d.len() + k as usize);
                    }
                }
                _ => unreachable!(),
            }
            prop_assert_eq!(d.len(), model.len());
        }
        let got: BTreeMap<u32, u32> = d.iter().map(|(_, k, v)| (*k, *v)).collect();
        prop_assert_eq!(got, model);
    }
}

// After rehashing settles, the load factor is at most one with the gate open.
proptest! {
    #[test]
    fn prop_load_factor_bounded(n in 1u32..2000) {
        let mut d = local_dict();
        for i in 0..n {
            d.add(i, i).unwrap();
        }
        while d.rehash(100) {}
        let (size, incoming) = d.table_sizes();
        prop_assert_eq!(incoming, 0);
        prop_assert!(size.is_power_of_two());
        prop_assert!(d.len() <= size);
        // Growth doubles at one entry per bucket, so the table ends at the
        // smallest power of two that holds every key.
        prop_assert!(size >= (n as usize).next_power_of_two());
        prop_assert_eq!(size, (n as usize).next_power_of_two().max(4));
    }
}

// A scan started at any point of a rehash visits every key exactly once.
proptest! {
    #[test]
    fn prop_scan_complete_mid_rehash(n in 1u32..500, steps in 0usize..64, safe in any::<bool>()) {
        let mut d = local_dict();
        for i in 0..n {
            d.add(i, i).unwrap();
        }
        while d.rehash(100) {}
        let size = d.table_sizes().0;
        d.begin_resize(size * 2).unwrap();
        d.rehash(steps);
        let mut it = d.iterator(safe);
        let mut seen = Vec::new();
        while let Some(h) = it.next(&d) {
            seen.push(*h.key(&d).unwrap());
        }
        it.release(&d);
        prop_assert_eq!(seen.len(), n as usize);
        let set: BTreeSet<u32> = seen.into_iter().collect();
        prop_assert_eq!(set, (0..n).collect::<BTreeSet<_>>());
    }
}

// Shrinking to fit keeps every entry and lands on the smallest adequate size.
proptest! {
    #[test]
    fn prop_resize_to_fit(n in 1u32..1000, keep in 0u32..1000) {
        let mut d = local_dict();
        for i in 0..n {
            d.add(i, i).unwrap();
        }
        while d.rehash(100) {}
        for i in keep.min(n)..n {
            d.delete(&i).unwrap();
        }
        d.resize_to_fit().unwrap();
        while d.rehash(100) {}
        let left = d.len();
        prop_assert_eq!(left, keep.min(n) as usize);
        prop_assert_eq!(d.table_sizes().0, left.max(4).next_power_of_two());
        prop_assert!(d.keys().all(|k| *k < keep));
    }
}
