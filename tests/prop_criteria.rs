mod common;

use bson::{Bson, doc};
use proptest::prelude::*;
use std::collections::HashMap;

const OPS: [&str; 4] = ["$gt", "$gte", "$lt", "$lte"];

fn apply(c: &nexusodm::Criteria, op: usize, v: i32) -> nexusodm::Criteria {
    match op {
        0 => c.gt("likes", v),
        1 => c.gte("likes", v),
        2 => c.lt("likes", v),
        _ => c.lte("likes", v),
    }
    .unwrap()
}

proptest! {
    #[test]
    fn prop_comparisons_accumulate_last_write_wins(ops in proptest::collection::vec((0usize..4, any::<i32>()), 1..12)) {
        let fx = common::setup();
        let base = fx.bands();
        let mut c = base.clone();
        let mut expected: HashMap<&str, i32> = HashMap::new();
        for (op, v) in &ops {
            c = apply(&c, *op, *v);
            expected.insert(OPS[*op], *v);
        }
        prop_assert!(base.selector().is_empty());
        let sel = c.selector();
        let likes = sel.get_document("likes").unwrap();
        prop_assert_eq!(likes.len(), expected.len());
        for (k, v) in expected {
            prop_assert_eq!(likes.get(k), Some(&Bson::Int32(v)));
        }
    }

    #[test]
    fn prop_between_matches_a_manual_filter(
        values in proptest::collection::vec(-50i32..50, 0..30),
        low in -60i32..60,
        span in 0i32..40,
    ) {
        let fx = common::setup();
        fx.seed("bands", values.iter().map(|v| doc! { "likes": *v }).collect());
        let high = low + span;
        let c = fx.bands().between("likes", low, high).unwrap();
        let expected = values.iter().filter(|v| (low..=high).contains(*v)).count() as u64;
        prop_assert_eq!(c.count().unwrap(), expected);
        let docs = c.to_vec().unwrap();
        let all_in_range = docs.iter().all(|d| {
            d.get("likes").ok().flatten().and_then(Bson::as_i32).is_some_and(|n| (low..=high).contains(&n))
        });
        prop_assert!(all_in_range);
    }

    #[test]
    fn prop_first_n_is_a_prefix_of_the_sorted_set(values in proptest::collection::vec(any::<i32>(), 0..25), n in 0u64..30) {
        let fx = common::setup();
        fx.seed("bands", values.iter().map(|v| doc! { "likes": *v }).collect());
        let c = fx.bands().asc(&["likes"]);
        let all = c.to_vec().unwrap();
        let head = c.first_n(n).unwrap();
        let take = usize::try_from(n).unwrap().min(all.len());
        prop_assert_eq!(head.len(), take);
        for (a, b) in head.iter().zip(&all) {
            prop_assert_eq!(a.id(), b.id());
        }
        let tail = c.last_n(n).unwrap();
        prop_assert_eq!(tail.len(), take);
        for (a, b) in tail.iter().zip(&all[all.len() - take..]) {
            prop_assert_eq!(a.id(), b.id());
        }
    }
}
