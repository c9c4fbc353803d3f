//! Randomized checks of the B+ tree against an ordered-map model

use std::collections::BTreeMap;

use blockdb::{BPlusKey, BPlusTree, RecordId};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Insert(BPlusKey),
    /// Remove the oldest entry for the key
    Delete(BPlusKey),
    /// Remove one specific entry, picked among those currently stored
    DeleteEntry(prop::sample::Index),
}

fn arb_op() -> impl Strategy<Value = Op> {
    // Narrow key space so duplicates are common
    prop_oneof![
        3 => (0i64..40).prop_map(Op::Insert),
        1 => (0i64..40).prop_map(Op::Delete),
        1 => any::<prop::sample::Index>().prop_map(Op::DeleteEntry),
    ]
}

type Model = BTreeMap<BPlusKey, Vec<RecordId>>;

fn model_entries(model: &Model) -> Vec<(BPlusKey, RecordId)> {
    model
        .iter()
        .flat_map(|(&k, rids)| rids.iter().map(move |&rid| (k, rid)))
        .collect()
}

fn apply(tree: &mut BPlusTree, model: &mut Model, op: &Op, next_rid: &mut usize) {
    match op {
        Op::Insert(key) => {
            let rid = RecordId::new(*next_rid / 16, *next_rid % 16);
            *next_rid += 1;
            tree.insert(*key, rid).unwrap();
            model.entry(*key).or_default().push(rid);
        }
        Op::Delete(key) => {
            let expected = model.get(key).is_some_and(|rids| !rids.is_empty());
            assert_eq!(tree.delete(*key).unwrap(), expected);
            if let Some(rids) = model.get_mut(key) {
                if !rids.is_empty() {
                    rids.remove(0);
                }
                if rids.is_empty() {
                    model.remove(key);
                }
            }
        }
        Op::DeleteEntry(index) => {
            let entries = model_entries(model);
            if entries.is_empty() {
                return;
            }
            let (key, rid) = entries[index.index(entries.len())];
            assert!(tree.delete_entry(key, rid).unwrap());
            if let Some(rids) = model.get_mut(&key) {
                rids.retain(|&r| r != rid);
                if rids.is_empty() {
                    model.remove(&key);
                }
            }
        }
    }
}

proptest! {
    /// Search results and the leaf chain always agree with the model
    #[test]
    fn prop_matches_model(
        order in 2usize..7,
        ops in proptest::collection::vec(arb_op(), 1..300),
    ) {
        let mut tree = BPlusTree::new(order).unwrap();
        let mut model = Model::new();
        let mut next_rid = 0;

        for op in &ops {
            apply(&mut tree, &mut model, op, &mut next_rid);
            prop_assert!(tree.validate().is_ok(), "invalid tree after {:?}: {:?}", op, tree.validate());
        }

        prop_assert_eq!(tree.len(), model.values().map(Vec::len).sum::<usize>());
        prop_assert_eq!(tree.iter().collect::<Vec<_>>(), model_entries(&model));

        for key in 0..40 {
            let expected = model.get(&key).cloned().unwrap_or_default();
            prop_assert_eq!(tree.exact_search(key), expected, "key {}", key);
        }
    }

    /// Range search returns exactly the model's entries inside the bounds
    #[test]
    fn prop_range_matches_model(
        order in 2usize..7,
        ops in proptest::collection::vec(arb_op(), 1..200),
        lower in -5i64..45,
        span in 0i64..30,
    ) {
        let mut tree = BPlusTree::new(order).unwrap();
        let mut model = Model::new();
        let mut next_rid = 0;

        for op in &ops {
            apply(&mut tree, &mut model, op, &mut next_rid);
        }

        let upper = lower + span;
        let expected: Vec<RecordId> = model
            .range(lower..=upper)
            .flat_map(|(_, rids)| rids.iter().copied())
            .collect();
        prop_assert_eq!(tree.range_search(lower, upper), expected);
    }

    /// One insert or delete moves the height by at most one level
    #[test]
    fn prop_height_changes_by_at_most_one(
        order in 2usize..7,
        ops in proptest::collection::vec(arb_op(), 1..300),
    ) {
        let mut tree = BPlusTree::new(order).unwrap();
        let mut model = Model::new();
        let mut next_rid = 0;

        for op in &ops {
            let before = tree.height();
            apply(&mut tree, &mut model, op, &mut next_rid);
            let after = tree.height();
            prop_assert!(before.abs_diff(after) <= 1, "height {} -> {} after {:?}", before, after, op);
        }
    }

    /// Removing every inserted pair leaves an empty tree
    #[test]
    fn prop_insert_then_delete_all_empties(
        order in 2usize..7,
        keys in proptest::collection::vec(-100i64..100, 1..200),
    ) {
        let mut tree = BPlusTree::new(order).unwrap();
        let rids: Vec<RecordId> = (0..keys.len()).map(|i| RecordId::new(i, 0)).collect();

        for (&key, &rid) in keys.iter().zip(&rids) {
            tree.insert(key, rid).unwrap();
        }
        for (&key, &rid) in keys.iter().zip(&rids).rev() {
            prop_assert!(tree.delete_entry(key, rid).unwrap());
            prop_assert!(!tree.exact_search(key).contains(&rid));
        }

        prop_assert!(tree.is_empty());
        prop_assert!(tree.validate().is_ok());
    }
}
