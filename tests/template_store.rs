mod common;

use std::fs;

use common::*;
use docanchor::{
    template::{record::TemplateRecord, MatchStrategy, Template},
    EngineConfig, TemplateCache, TemplateStore,
};

#[test]
fn appended_template_equals_rebuilt_template() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let store = TemplateStore::new(dir.path());
    let template: Template = learn_template("Acme Corp.", &vendor_page(1, (0, 0)), &config).into();
    let record = TemplateRecord::from(&template);
    store.save(template.vendor_name(), &record).unwrap();

    let mut appended = TemplateCache::default();
    appended.append(&record, &config).unwrap();
    let (rebuilt, stats) = TemplateCache::load(&store, &config);

    assert_eq!(stats.loaded, 1);
    assert_eq!(appended.feature_templates(), rebuilt.feature_templates());
    assert_eq!(
        Template::TwoAnchorFeatures(rebuilt.feature_templates()[0].clone()),
        template
    );
}

#[test]
fn saved_file_uses_the_documented_shape() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let store = TemplateStore::new(dir.path());
    let template: Template = learn_template("Acme Corp.", &vendor_page(1, (0, 0)), &config).into();
    let path = store.save("Acme Corp.", &TemplateRecord::from(&template)).unwrap();
    assert_eq!(path, dir.path().join("acme_corp.json"));

    let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(json["vendor_name"], "Acme Corp.");
    assert_eq!(json["match_strategy"], "two_anchor_features");
    let primary = &json["primary_anchor"];
    assert_eq!(primary["bounding_box"]["width"], 96);
    assert!(primary["descriptors_b64"].is_string());
    assert_eq!(
        primary["keypoints_pts"].as_array().unwrap().len(),
        match &template {
            Template::TwoAnchorFeatures(t) => t.primary_anchor.len(),
            Template::LegacyPerceptualHash(_) => unreachable!(),
        }
    );
    assert_eq!(json["fields"][0]["field_name"], "invoice_number");
    assert_eq!(json["fields"][0]["coordinates"]["x"], 300);
    assert!(json.get("identifier_hash").is_none());
}

#[test]
fn corrupt_and_weak_templates_do_not_stop_warm_up() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let store = TemplateStore::new(dir.path());
    let good: Template = learn_template("Acme", &vendor_page(1, (0, 0)), &config).into();
    store.save("Acme", &TemplateRecord::from(&good)).unwrap();

    // an anchor below the configured minimum never reaches the cache
    let strict = EngineConfig {
        features: docanchor::config::FeatureConfig {
            min_features_for_valid_anchor: 10_000,
            ..config.features.clone()
        },
        ..config.clone()
    };
    fs::write(dir.path().join("bad.json"), b"{\"vendor_name\": \"Bad\"}").unwrap();
    fs::write(dir.path().join("truncated.json"), b"{\"vendor_na").unwrap();

    let (cache, stats) = TemplateCache::load(&store, &config);
    assert_eq!((stats.loaded, stats.skipped), (1, 2));
    assert_eq!(cache.vendor_names(), ["Acme"]);
    assert_eq!(cache.templates().next().unwrap().match_strategy(), MatchStrategy::TwoAnchorFeatures);

    let (strict_cache, strict_stats) = TemplateCache::load(&store, &strict);
    assert!(strict_cache.is_empty());
    assert_eq!(strict_stats.skipped, 3);
}
