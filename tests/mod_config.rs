mod common;

use common::{band_model, seed_bands, setup_with};
use nexusodm::{ModelBuilder, Odm, OdmConfig, OdmError};
use std::io::Write;

#[test]
fn config_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "raise_not_found_error = false").unwrap();
    writeln!(file, "query_cache = true").unwrap();
    writeln!(file, "query_cache_capacity = 8").unwrap();
    let cfg = OdmConfig::load(file.path()).unwrap();
    assert_eq!(cfg.query_cache_capacity, 8);
    assert!(cfg.query_cache);
    let text = toml::to_string(&cfg).unwrap();
    assert_eq!(OdmConfig::from_toml_str(&text).unwrap(), cfg);
}

#[test]
fn missing_config_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = OdmConfig::load(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, OdmError::Io(_)));
}

#[test]
fn default_batch_size_reaches_the_backend() {
    let cfg = OdmConfig { default_batch_size: Some(2), ..OdmConfig::default() };
    let fx = setup_with(cfg, band_model());
    seed_bands(&fx);
    assert_eq!(fx.bands().query_spec().batch_size, Some(2));
    assert_eq!(fx.bands().batch_size(50).unwrap().query_spec().batch_size, Some(50));
    fx.bands().to_vec().unwrap();
    assert_eq!(fx.backend.round_trips(), 2);
}

#[test]
fn cache_switch_starts_from_config() {
    let fx = setup_with(OdmConfig { query_cache: true, ..OdmConfig::default() }, band_model());
    assert!(fx.odm.query_cache_enabled());
    fx.odm.set_query_cache(false);
    assert!(!fx.odm.query_cache_enabled());
    assert!(!fx.odm.config().query_cache);
}

#[test]
fn shrinking_the_cache_evicts_least_recent_entries() {
    let fx = setup_with(OdmConfig { query_cache: true, ..OdmConfig::default() }, band_model());
    seed_bands(&fx);
    fx.bands().to_vec().unwrap();
    fx.bands().where_(("country", "USA")).unwrap().to_vec().unwrap();
    assert_eq!(fx.odm.query_cache_len(), 2);
    fx.odm.set_query_cache_capacity(1);
    assert_eq!(fx.odm.query_cache_len(), 1);
    assert_eq!(fx.odm.config().query_cache_capacity, 1);
    fx.backend.reset();
    fx.bands().where_(("country", "USA")).unwrap().to_vec().unwrap();
    assert!(fx.backend.calls().is_empty());
}

#[test]
fn models_are_registered_once() {
    let odm = Odm::in_memory();
    odm.define(ModelBuilder::new("Band")).unwrap();
    assert!(matches!(odm.define(ModelBuilder::new("Band")), Err(OdmError::ModelAlreadyDefined(_))));
    assert!(matches!(odm.criteria("Album"), Err(OdmError::UnknownModel(_))));
    assert_eq!(odm.model("Band").unwrap().collection(), "bands");
    let custom = odm.define(ModelBuilder::new("Person").collection("people")).unwrap();
    assert_eq!(custom.collection(), "people");
    assert_eq!(odm.model_names(), vec!["Band".to_string(), "Person".to_string()]);
    odm.reset();
    assert!(odm.model_names().is_empty());
}
