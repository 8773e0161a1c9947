mod common;

use bson::doc;
use common::{seed_bands, setup};
use nexusodm::types::Projection;
use nexusodm::{Conditions, IdSort, OdmError, Order, Pattern, SortSpec, field};

#[test]
fn chaining_never_mutates_the_receiver() {
    let fx = setup();
    let base = fx.bands().where_(("country", "England")).unwrap();
    let before = base.selector();
    let _narrowed = base.gt("likes", 100).unwrap().asc(&["name"]).limit(5).unwrap();
    assert_eq!(base.selector(), before);
    assert!(base.sort().is_empty());
    assert_eq!(base.options().limit, None);
}

#[test]
fn operators_on_one_field_accumulate_across_calls() {
    let fx = setup();
    let c = fx.bands().gte("likes", 10).unwrap().lt("likes", 100).unwrap();
    assert_eq!(c.selector(), doc! { "likes": { "$gte": 10_i32, "$lt": 100_i32 } });
}

#[test]
fn equality_replaces_prior_operators() {
    let fx = setup();
    let c = fx.bands().gt("likes", 10).unwrap().where_(("likes", 50)).unwrap();
    assert_eq!(c.selector(), doc! { "likes": 50 });
}

#[test]
fn where_accepts_operator_keys_and_raw_documents() {
    let fx = setup();
    let a = fx.bands().where_([(field("likes").gte(), 5), (field("likes").lte(), 9)]).unwrap();
    let b = fx.bands().where_(doc! { "likes": { "$gte": 5, "$lte": 9 } }).unwrap();
    assert_eq!(a.selector(), b.selector());
    let c = fx.bands().where_(Conditions::from_json(r#"{"likes": {"$gte": 5, "$lte": 9}}"#).unwrap()).unwrap();
    assert_eq!(a, c);
}

#[test]
fn values_are_coerced_by_field_type() {
    let fx = setup();
    let c = fx.bands().where_(("likes", "42")).unwrap();
    assert_eq!(c.selector(), doc! { "likes": 42_i64 });
    let c = fx.bands().in_("likes", ["1", "2"]).unwrap();
    assert_eq!(c.selector(), doc! { "likes": { "$in": [1_i64, 2_i64] } });
}

#[test]
fn elem_match_on_referenced_association_is_rejected() {
    let fx = setup();
    let err = fx.bands().elem_match("albums", ("year", 1990)).unwrap_err();
    assert!(matches!(err, OdmError::UnsupportedQueryShape(_)));
    let ok = fx.bands().elem_match("members", [(field("age").gt(), 30)]).unwrap();
    assert_eq!(ok.selector(), doc! { "members": { "$elemMatch": { "age": { "$gt": 30 } } } });
}

#[test]
fn regex_forms_produce_the_same_condition() {
    let fx = setup();
    let native = fx.bands().matches("name", regex::Regex::new("(?i)^dep").unwrap()).unwrap();
    let raw = fx.bands().matches("name", Pattern::raw("^dep", "i")).unwrap();
    assert_eq!(native.selector(), raw.selector());
    assert_eq!(raw.selector(), doc! { "name": { "$regex": "^dep", "$options": "i" } });
}

#[test]
fn later_pattern_replaces_earlier_flags() {
    let fx = setup();
    let c = fx.bands().matches("name", Pattern::raw("^dep", "i")).unwrap().matches("name", Pattern::raw("^Tool", "")).unwrap();
    assert_eq!(c.selector(), doc! { "name": { "$regex": "^Tool" } });
}

#[test]
fn chained_where_on_disjoint_fields_equals_one_where() {
    let fx = setup();
    let a = doc! { "country": "England", "likes": { "$gt": 100 } };
    let b = doc! { "name": { "$ne": "Tool" }, "active": true };
    let chained = fx.bands().where_(a.clone()).unwrap().where_(b.clone()).unwrap();
    let mut both = a;
    both.extend(b);
    assert_eq!(chained, fx.bands().where_(both).unwrap());
}

#[test]
fn logical_combinators() {
    let fx = setup();
    let c = fx
        .bands()
        .or([Conditions::from(("country", "USA")), Conditions::from((field("likes").gt(), 200))])
        .unwrap()
        .nor([("name", "Tool")])
        .unwrap();
    assert_eq!(
        c.selector(),
        doc! {
            "$or": [{ "country": "USA" }, { "likes": { "$gt": 200_i32 } }],
            "$nor": [{ "name": "Tool" }],
        }
    );
    let and = fx.bands().and(("country", "England")).unwrap().and(("active", true)).unwrap();
    assert_eq!(and.selector(), doc! { "$and": [{ "country": "England" }, { "active": true }] });
}

#[test]
fn text_search_adds_text_operator() {
    let fx = setup();
    let c = fx.bands().text_search("synth pop", Some("english")).unwrap();
    assert_eq!(c.selector(), doc! { "$text": { "$search": "synth pop", "$language": "english" } });
}

#[test]
fn merge_strategies_apply_once() {
    let fx = setup();
    let base = fx.bands().in_("genres", ["rock", "pop"]).unwrap();
    let unioned = base.union().in_("genres", ["jazz"]).unwrap();
    assert_eq!(unioned.selector(), doc! { "genres": { "$in": ["rock", "pop", "jazz"] } });
    let intersected = base.intersect().in_("genres", ["pop", "jazz"]).unwrap();
    assert_eq!(intersected.selector(), doc! { "genres": { "$in": ["pop"] } });
    let plain = unioned.in_("genres", ["blues"]).unwrap();
    assert_eq!(plain.selector(), doc! { "genres": { "$in": ["blues"] } });
}

#[test]
fn only_and_without_conflict_fails_fast() {
    let fx = setup();
    let only = fx.bands().only(&["name"]).unwrap().only(&["likes"]).unwrap();
    assert_eq!(only.projection(), Some(Projection::Only(vec!["name".into(), "likes".into()])));
    assert!(matches!(only.without(&["country"]), Err(OdmError::ProjectionConflict(_))));
    let without = fx.bands().without(&["likes"]).unwrap();
    assert!(matches!(without.only(&["name"]), Err(OdmError::ProjectionConflict(_))));
}

#[test]
fn only_keeps_id_and_guards_unloaded_fields() {
    let fx = setup();
    seed_bands(&fx);
    let docs = fx.bands().only(&["name"]).unwrap().to_vec().unwrap();
    assert_eq!(docs.len(), 3);
    assert!(docs[0].id().is_some());
    assert!(docs[0].get_str("name").unwrap().is_some());
    assert!(matches!(docs[0].get("likes"), Err(OdmError::MissingAttribute { .. })));
}

#[test]
fn negative_options_are_rejected() {
    let fx = setup();
    for err in [fx.bands().limit(-1), fx.bands().skip(-5), fx.bands().batch_size(-2)] {
        assert!(matches!(err, Err(OdmError::InvalidOption { .. })));
    }
    assert!(fx.bands().with_size("genres", -1).is_err());
    assert_eq!(fx.bands().limit(0).unwrap().options().limit, Some(0));
}

#[test]
fn includes_validates_associations() {
    let fx = setup();
    assert!(matches!(fx.bands().includes(&["nope"]), Err(OdmError::InvalidIncludes { .. })));
    assert!(matches!(fx.bands().includes(&["members"]), Err(OdmError::InvalidIncludes { .. })));
    assert!(matches!(fx.bands().includes(&["owner"]), Err(OdmError::InvalidConfig(_))));
    let c = fx.bands().includes(&["albums", "label"]).unwrap().includes(&["albums"]).unwrap();
    assert_eq!(c.inclusions(), vec!["albums".to_string(), "label".to_string()]);
}

#[test]
fn sorting_builders() {
    let fx = setup();
    let c = fx.bands().asc(&["name"]).desc(&["likes"]).asc(&["name"]);
    assert_eq!(c.sort(), vec![SortSpec::new("likes", Order::Desc), SortSpec::new("name", Order::Asc)]);
    let r = c.reorder([SortSpec::new("country", Order::Asc)]);
    assert_eq!(r.sort(), vec![SortSpec::new("country", Order::Asc)]);
    assert_eq!(r.query_spec().sort, Some(doc! { "country": 1 }));
}

#[test]
fn first_and_last_use_id_tie_breaker() {
    let fx = setup();
    let ids = seed_bands(&fx);
    let first = fx.bands().first().unwrap().unwrap();
    let last = fx.bands().last().unwrap().unwrap();
    assert_eq!(first.id(), Some(&ids[0]));
    assert_eq!(last.id(), Some(&ids[2]));
    let by_likes = fx.bands().desc(&["likes"]);
    assert_eq!(by_likes.first().unwrap().unwrap().get_str("name").unwrap(), Some("Depeche Mode"));
    assert_eq!(by_likes.last().unwrap().unwrap().get_str("name").unwrap(), Some("Tool"));
    let tail = by_likes.last_n(2).unwrap();
    assert_eq!(common::names(&tail), vec!["New Order", "Tool"]);
    let natural = fx.bands().id_sort(IdSort::None).last().unwrap().unwrap();
    assert_eq!(natural.id(), Some(&ids[2]));
}

#[test]
fn merge_combines_two_criteria_of_one_model() {
    let fx = setup();
    let a = fx.bands().where_(("country", "England")).unwrap().asc(&["name"]);
    let b = fx.bands().gt("likes", 100).unwrap().limit(2).unwrap();
    let m = a.merge(&b).unwrap();
    assert_eq!(m.selector(), doc! { "country": "England", "likes": { "$gt": 100_i32 } });
    assert_eq!(m.options().limit, Some(2));
    assert_eq!(m.sort(), vec![SortSpec::new("name", Order::Asc)]);
    assert!(matches!(a.merge(&fx.albums()), Err(OdmError::InvalidConfig(_))));
}

#[test]
fn criteria_is_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<nexusodm::Criteria>();
}

#[test]
fn exists_with_size_and_between() {
    let fx = setup();
    seed_bands(&fx);
    let c = fx.bands().with_size("genres", 2).unwrap().between("likes", 90, 200).unwrap();
    assert_eq!(c.selector(), doc! { "genres": { "$size": 2_i64 }, "likes": { "$gte": 90_i32, "$lte": 200_i32 } });
    assert_eq!(common::names(&c.to_vec().unwrap()), vec!["Tool"]);
    assert!(fx.bands().field_exists("likes", true).unwrap().exists().unwrap());
    assert!(!fx.bands().field_exists("likes", false).unwrap().exists().unwrap());
    assert_eq!(fx.bands().ne("country", "England").unwrap().count().unwrap(), 1);
    assert_eq!(fx.bands().not_in("country", ["USA"]).unwrap().count().unwrap(), 2);
    assert_eq!(fx.bands().all_in("genres", ["rock", "synth"]).unwrap().count().unwrap(), 1);
}
