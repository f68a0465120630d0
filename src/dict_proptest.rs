#![cfg(test)]

// Property tests for Dict kept inside the crate so they can check the
// bucket structure directly (chains, counters, rehash cursor).

use crate::dict::{Dict, Handle};
use crate::dict_type::{DictType, StdType};
use crate::error::DictError;
use crate::policy::{ResizeGate, ResizePolicy};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Clone, Debug)]
enum Op {
    Add(usize, i32),
    Replace(usize, i32),
    Delete(usize),
    DeleteNoFree(usize),
    Find(usize),
    Mutate(usize, i32),
    Rehash(usize),
    Grow(u8),
    Fit,
    Gate(bool),
    Random,
    Iterate,
    // Safe scan that deletes every yielded key whose pool index is in the
    // first set, adds the keys of the second set part-way through, and
    // deletes the keys of the third set right after the first entry.
    SafeScan(Vec<usize>, Vec<usize>, Vec<usize>),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,6}", 1..=24).prop_flat_map(|pool| {
        let n = pool.len();
        let idx = 0..n;
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Add(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Replace(i, v)),
            2 => idx.clone().prop_map(Op::Delete),
            1 => idx.clone().prop_map(Op::DeleteNoFree),
            2 => idx.clone().prop_map(Op::Find),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            2 => (0usize..8).prop_map(Op::Rehash),
            1 => (1u8..4).prop_map(Op::Grow),
            1 => Just(Op::Fit),
            1 => any::<bool>().prop_map(Op::Gate),
            1 => Just(Op::Random),
            1 => Just(Op::Iterate),
            2 => (
                proptest::collection::vec(idx.clone(), 0..6),
                proptest::collection::vec(idx.clone(), 0..6),
                proptest::collection::vec(idx.clone(), 0..8)
            )
                .prop_map(|(del, add, other)| Op::SafeScan(del, add, other)),
        ];
        proptest::collection::vec(op, 1..120).prop_map(move |ops| (pool.clone(), ops))
    })
}

/// Structural invariants of the two generations.
fn check_structure<V, T>(d: &Dict<String, V, T>) -> Result<(), TestCaseError>
where
    T: DictType<String, V>,
{
    let mut seen = HashSet::new();
    for gen in 0..2 {
        let t = &d.tables[gen];
        let mut count = 0;
        for slot in 0..t.size() {
            let mut cur = t.head(slot);
            while let Some(id) = cur {
                let e = &d.entries[id];
                prop_assert_eq!(t.slot_of(e.hash), slot, "entry chained in the wrong slot");
                prop_assert_eq!(e.hash, T::hash(d.dict_type(), &e.key));
                prop_assert!(seen.insert(id), "entry linked twice");
                count += 1;
                cur = e.next;
            }
        }
        prop_assert_eq!(count, t.used);
        prop_assert!(t.size() == 0 || t.size().is_power_of_two());
    }
    prop_assert_eq!(seen.len(), d.entries.len());
    match d.rehash_cursor() {
        Some(idx) => {
            prop_assert!(d.tables[1].is_allocated());
            for slot in 0..idx.min(d.tables[0].size()) {
                prop_assert!(d.tables[0].head(slot).is_none(), "migrated slot not empty");
            }
        }
        None => prop_assert!(!d.tables[1].is_allocated()),
    }
    Ok(())
}

fn run(
    d: &mut Dict<String, i32, impl DictType<String, i32>>,
    gate: &ResizeGate,
    pool: &[String],
    ops: Vec<Op>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<String, i32> = HashMap::new();
    for op in ops {
        match op {
            Op::Add(i, v) => {
                let k = pool[i].clone();
                let res = d.add(k.clone(), v);
                if model.contains_key(&k) {
                    prop_assert_eq!(res, Err(DictError::AlreadyExists));
                } else {
                    prop_assert_eq!(res, Ok(()));
                    model.insert(k, v);
                }
            }
            Op::Replace(i, v) => {
                let k = pool[i].clone();
                let inserted = d.replace(k.clone(), v).expect("replace never fails here");
                prop_assert_eq!(inserted, model.insert(k, v).is_none());
            }
            Op::Delete(i) => {
                let k = &pool[i];
                let res = d.delete(k);
                match model.remove(k) {
                    Some(_) => prop_assert_eq!(res, Ok(())),
                    None => prop_assert!(matches!(res, Err(DictError::NotFound | DictError::Empty))),
                }
            }
            Op::DeleteNoFree(i) => {
                let k = &pool[i];
                let res = d.delete_no_free(k);
                match model.remove(k) {
                    Some(v) => prop_assert_eq!(res, Ok((k.clone(), v))),
                    None => prop_assert!(res.is_err()),
                }
            }
            Op::Find(i) => {
                let k = &pool[i];
                prop_assert_eq!(d.fetch_value(k).copied(), model.get(k).copied());
            }
            Op::Mutate(i, delta) => {
                let k = &pool[i];
                if let Some(v) = d.fetch_value_mut(k) {
                    *v = v.wrapping_add(delta);
                    let m = model.get_mut(k).expect("model agrees on presence");
                    *m = m.wrapping_add(delta);
                } else {
                    prop_assert!(!model.contains_key(k));
                }
            }
            Op::Rehash(n) => {
                let more = d.rehash(n);
                prop_assert_eq!(more, d.is_rehashing());
            }
            Op::Grow(mult) => {
                let target = d.len().max(1) * usize::from(mult) * 2;
                let was = d.is_rehashing();
                let res = d.begin_resize(target);
                prop_assert_eq!(res.is_err(), was);
            }
            Op::Fit => {
                let _ = d.resize_to_fit();
            }
            Op::Gate(open) => gate.set_enabled(open),
            Op::Random => match d.random_entry() {
                Some(h) => {
                    let k = h.key(d).expect("sampled handle resolves");
                    prop_assert!(model.contains_key(k));
                }
                None => prop_assert!(model.is_empty()),
            },
            Op::Iterate => {
                let keys: Vec<String> = d.keys().cloned().collect();
                let set: BTreeSet<String> = keys.iter().cloned().collect();
                prop_assert_eq!(keys.len(), set.len(), "iteration repeated a key");
                prop_assert_eq!(set, model.keys().cloned().collect::<BTreeSet<_>>());
            }
            Op::SafeScan(del, add, other) => {
                let del: BTreeSet<&String> = del.iter().map(|&i| &pool[i]).collect();
                let before: BTreeSet<String> = model.keys().cloned().collect();
                let cursor = d.rehash_cursor();
                let mut yielded: BTreeSet<String> = BTreeSet::new();
                let mut deleted: BTreeSet<String> = BTreeSet::new();
                let mut it = d.iterator(true);
                let mut step = 0;
                while let Some(h) = it.next(d) {
                    let k = h.key(d).expect("yielded handle resolves").clone();
                    prop_assert!(yielded.insert(k.clone()), "safe scan repeated {:?}", k);
                    if del.contains(&k) {
                        d.delete_entry(h, true).expect("current entry is deletable");
                        model.remove(&k);
                        deleted.insert(k.clone());
                    }
                    if step == 0 {
                        // Arbitrary keys, usually not the one just returned.
                        for &i in &other {
                            let victim = &pool[i];
                            let res = d.delete(victim);
                            prop_assert_eq!(res.is_ok(), model.remove(victim).is_some());
                            if res.is_ok() {
                                deleted.insert(victim.clone());
                            }
                        }
                    }
                    if step == 1 {
                        for &i in &add {
                            let k = pool[i].clone();
                            if !yielded.contains(&k) && d.add(k.clone(), 0).is_ok() {
                                deleted.remove(&k);
                                model.insert(k, 0);
                            }
                        }
                    }
                    // Nothing migrates while the scan is open; an insertion
                    // may only start a fresh rehash.
                    match cursor {
                        Some(_) => prop_assert_eq!(d.rehash_cursor(), cursor),
                        None => prop_assert!(matches!(d.rehash_cursor(), None | Some(0))),
                    }
                    step += 1;
                }
                it.release(d);
                prop_assert_eq!(d.paused_iterators(), 0);
                // Every key present when the scan began and still present
                // now was seen exactly once.
                for k in &before {
                    if model.contains_key(k) {
                        prop_assert!(yielded.contains(k), "safe scan skipped {:?}", k);
                    }
                }
                for k in &deleted {
                    prop_assert!(!model.contains_key(k));
                }
            }
        }
        check_structure(d)?;
        prop_assert_eq!(d.len(), model.len());
    }
    gate.set_enabled(true);
    while d.rehash(100) {}
    check_structure(d)?;
    if d.len() > 0 {
        let (size, incoming) = d.table_sizes();
        prop_assert_eq!(incoming, 0);
        prop_assert!(size >= d.policy().initial_size());
    }
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - add rejects duplicates; replace reports whether it inserted.
// - delete distinguishes absent keys; delete_no_free returns contents.
// - lookups agree with the model wherever the key currently lives.
// - every chain entry hashes to its slot; counters match chain totals;
//   slots below the rehash cursor are empty.
// - a safe scan yields every surviving pre-existing key exactly once,
//   even while deleting the current entry or other keys and adding keys,
//   and nothing migrates.
proptest! {
    #![proptest_config(ProptestConfig { cases: 96, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let gate = ResizeGate::new(true);
        let mut d: Dict<String, i32> =
            Dict::with_policy(StdType, ResizePolicy::new().with_gate(gate.clone()));
        run(&mut d, &gate, &pool, ops)?;
    }
}

/// Everything lands in one of two buckets.
struct TwoBuckets;

impl DictType<String, i32> for TwoBuckets {
    fn hash(&self, key: &String) -> u32 {
        key.len() as u32 & 1
    }
    fn key_eq(&self, a: &String, b: &String) -> bool {
        a == b
    }
}

// Same invariants under near-total collision, which stresses chain
// unlinking and whole-chain migration.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let gate = ResizeGate::new(true);
        let mut d = Dict::with_policy(TwoBuckets, ResizePolicy::new().with_gate(gate.clone()));
        run(&mut d, &gate, &pool, ops)?;
    }
}

// Property: handles stay valid across any amount of migration and stop
// resolving once their entry is deleted.
proptest! {
    #[test]
    fn prop_handles_track_entries(n in 1u32..300, deletes in proptest::collection::vec(0u32..300, 0..50)) {
        let mut d: Dict<u32, u32> = Dict::new();
        let handles: Vec<Handle> = (0..n).map(|i| d.add_with(i, || i).unwrap()).collect();
        let mut gone = BTreeSet::new();
        for k in deletes {
            if k < n && gone.insert(k) {
                d.delete(&k).unwrap();
            }
        }
        while d.rehash(7) {}
        for (i, h) in handles.iter().enumerate() {
            let i = i as u32;
            if gone.contains(&i) {
                prop_assert!(h.value(&d).is_none());
            } else {
                prop_assert_eq!(h.value(&d), Some(&i));
            }
        }
    }
}
