use super::*;
use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn defaults_match_the_domain_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.rotation_interval_ms, 5000);
    assert_eq!(settings.locale, "en-US");
    assert!(!settings.json);
}

#[test]
fn file_overrides_only_the_keys_it_names() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "rotation_interval_ms = 750\nlocale = \"it-IT\"\n").expect("parse");

    assert_eq!(settings.rotation_interval_ms, 750);
    assert_eq!(settings.locale, "it-IT");
    assert_eq!(settings.run_seconds, Settings::default().run_seconds);
}

#[test]
fn unknown_file_keys_are_rejected() {
    let mut settings = Settings::default();
    assert!(apply_file(&mut settings, "interval = 10\n").is_err());
}

#[test]
fn environment_wins_over_file() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "rotation_interval_ms = 750\n").expect("parse");
    apply_env(
        &mut settings,
        env_of(&[("APP__ROTATION_INTERVAL_MS", "2000"), ("APP__JSON", "true")]),
    )
    .expect("env");

    assert_eq!(settings.rotation_interval_ms, 2000);
    assert!(settings.json);
}

#[test]
fn malformed_environment_interval_is_an_error() {
    let mut settings = Settings::default();
    let error = apply_env(&mut settings, env_of(&[("APP__ROTATION_INTERVAL_MS", "fast")]))
        .expect_err("should fail");
    assert!(error.to_string().contains("APP__ROTATION_INTERVAL_MS"));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let missing = env::temp_dir().join(format!("banner_cli_missing_{suffix}.toml"));

    assert!(load_settings(Some(missing.as_path())).is_err());
}

#[test]
fn explicit_file_is_read() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("banner_cli_settings_{suffix}.toml"));
    fs::write(&path, "run_seconds = 3\n").expect("write settings");

    let settings = load_settings(Some(path.as_path())).expect("load");
    fs::remove_file(&path).expect("cleanup");

    assert_eq!(settings.run_seconds, 3);
}
