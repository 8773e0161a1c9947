mod common;

use bson::{Bson, doc};
use common::{band_model, seed_bands, setup, setup_with};
use nexusodm::{OdmConfig, OdmError};
use parking_lot::Mutex;
use std::sync::Arc;

fn stored(fx: &common::Fixture) -> Vec<bson::Document> {
    fx.backend.inner.snapshot("bands")
}

#[test]
fn create_seeds_attributes_from_conditions() {
    let fx = setup();
    let d = fx
        .bands()
        .where_(("country", "England"))
        .unwrap()
        .gt("likes", 10)
        .unwrap()
        .create(doc! { "name": "Blur" })
        .unwrap();
    assert!(!d.is_new_record());
    assert!(d.id().is_some());
    assert_eq!(d.get_str("country").unwrap(), Some("England"));
    assert!(d.get("likes").unwrap().is_none());
    assert_eq!(fx.backend.calls(), vec!["insert:bands"]);
    assert_eq!(stored(&fx).len(), 1);
}

#[test]
fn illegal_keys_are_rejected() {
    let fx = setup();
    let err = fx.bands().create(doc! { "a.b": 1 }).unwrap_err();
    assert!(matches!(err, OdmError::IllegalKey(_)));
    let err = fx.bands().create(doc! { "nested": { "$bad": 1 } }).unwrap_err();
    assert!(matches!(err, OdmError::IllegalKey(_)));
    assert!(stored(&fx).is_empty());
}

#[test]
fn update_touches_one_and_update_all_every_match() {
    let fx = setup();
    seed_bands(&fx);
    let english = fx.bands().where_(("country", "England")).unwrap();
    let one = english.update(doc! { "active": false }).unwrap();
    assert_eq!(one.modified, 1);
    let all = english.update_all(doc! { "$set": { "active": true } }).unwrap();
    assert_eq!((all.matched, all.modified), (2, 2));
    assert_eq!(fx.bands().where_(("active", true)).unwrap().count().unwrap(), 2);
}

#[test]
fn atomic_shortcuts() {
    let fx = setup();
    seed_bands(&fx);
    let tool = fx.bands().where_(("name", "Tool")).unwrap();
    tool.inc("likes", 10).unwrap();
    tool.set("active", true).unwrap();
    tool.push("genres", "prog").unwrap();
    tool.add_to_set("genres", "rock").unwrap();
    tool.pull("genres", "metal").unwrap();
    tool.rename("country", "origin").unwrap();
    let d = fx.bands().where_(("name", "Tool")).unwrap().first().unwrap().unwrap();
    assert_eq!(d.get("likes").unwrap(), Some(&Bson::Int32(100)));
    assert_eq!(d.get("active").unwrap(), Some(&Bson::Boolean(true)));
    assert_eq!(d.get("genres").unwrap(), Some(&Bson::from(vec!["rock", "prog"])));
    assert_eq!(d.get_str("origin").unwrap(), Some("USA"));
    assert!(d.get("country").unwrap().is_none());

    tool.pop("genres", true).unwrap();
    tool.unset("active").unwrap();
    tool.set("flags", 6).unwrap();
    tool.bit("flags", doc! { "and": 3, "or": 8 }).unwrap();
    let d = tool.first().unwrap().unwrap();
    assert_eq!(d.get("genres").unwrap(), Some(&Bson::from(vec!["prog"])));
    assert!(d.get("active").unwrap().is_none());
    assert_eq!(d.get("flags").unwrap(), Some(&Bson::Int32(10)));
}

#[test]
fn delete_skips_loading() {
    let fx = setup();
    seed_bands(&fx);
    let removed = fx.bands().where_(("country", "England")).unwrap().delete().unwrap();
    assert_eq!(removed, 2);
    assert_eq!(fx.backend.calls(), vec!["delete:bands"]);
    assert_eq!(stored(&fx).len(), 1);
}

#[test]
fn destroy_runs_the_teardown_hook_per_document() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let hook_seen = Arc::clone(&seen);
    let fx = setup_with(
        OdmConfig::default(),
        band_model().on_destroy(move |d| {
            hook_seen.lock().push(d.get_str("name")?.unwrap_or_default().to_string());
            Ok(())
        }),
    );
    seed_bands(&fx);
    let removed = fx.bands().where_(("country", "England")).unwrap().destroy().unwrap();
    assert_eq!(removed, 2);
    assert_eq!(*seen.lock(), vec!["Depeche Mode", "New Order"]);
    assert_eq!(common::names(&fx.bands().to_vec().unwrap()), vec!["Tool"]);
}

#[test]
fn destroy_stops_at_the_first_hook_error() {
    let fx = setup_with(
        OdmConfig::default(),
        band_model().on_destroy(|d| match d.get_str("name")? {
            Some("New Order") => Err(OdmError::Backend("refusing to remove".into())),
            _ => Ok(()),
        }),
    );
    seed_bands(&fx);
    assert!(fx.bands().destroy().is_err());
    assert_eq!(common::names(&fx.bands().to_vec().unwrap()), vec!["New Order", "Tool"]);
}

#[test]
fn find_or_create_and_initialize() {
    let fx = setup();
    seed_bands(&fx);
    let existing = fx.bands().find_or_create_by(("name", "Tool")).unwrap();
    assert_eq!(existing.get_str("country").unwrap(), Some("USA"));
    assert_eq!(stored(&fx).len(), 3);

    let created = fx.bands().find_or_create_by(("name", "Blur")).unwrap();
    assert!(!created.is_new_record());
    assert_eq!(stored(&fx).len(), 4);

    let fresh = fx.bands().where_(("country", "Iceland")).unwrap().first_or_initialize().unwrap();
    assert!(fresh.is_new_record());
    assert_eq!(fresh.get_str("country").unwrap(), Some("Iceland"));
    let fresh = fx.bands().find_or_initialize_by(("name", "Sigur Ros")).unwrap();
    assert!(fresh.is_new_record());
    assert_eq!(stored(&fx).len(), 4);

    let made = fx.bands().where_(("name", "Mew")).unwrap().first_or_create().unwrap();
    assert_eq!(made.get_str("name").unwrap(), Some("Mew"));
    assert_eq!(stored(&fx).len(), 5);
}
