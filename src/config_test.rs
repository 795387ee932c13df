use super::*;

#[test]
fn env_parse_missing_returns_default() {
    let val: usize = env_parse("__SC_TEST_NONEXISTENT_KEY__", 42);
    assert_eq!(val, 42);
}

#[test]
fn env_parse_present_valid() {
    unsafe { std::env::set_var("__SC_TEST_EP_VALID__", "99") };
    let val: usize = env_parse("__SC_TEST_EP_VALID__", 0);
    assert_eq!(val, 99);
    unsafe { std::env::remove_var("__SC_TEST_EP_VALID__") };
}

#[test]
fn env_parse_present_invalid_returns_default() {
    unsafe { std::env::set_var("__SC_TEST_EP_INVALID__", "lots") };
    let val: u64 = env_parse("__SC_TEST_EP_INVALID__", 7);
    assert_eq!(val, 7);
    unsafe { std::env::remove_var("__SC_TEST_EP_INVALID__") };
}

#[test]
fn parse_origins_trims_and_drops_blanks() {
    let origins = parse_origins(" https://a.example , ,https://b.example,");
    assert_eq!(origins, vec!["https://a.example".to_string(), "https://b.example".to_string()]);
}

#[test]
fn parse_origins_empty_string() {
    assert!(parse_origins("").is_empty());
}

#[test]
fn environment_labels() {
    assert_eq!(Environment::from_label("production"), Environment::Production);
    assert_eq!(Environment::from_label(" PROD "), Environment::Production);
    assert_eq!(Environment::from_label("development"), Environment::Development);
    assert_eq!(Environment::from_label(""), Environment::Development);
    assert!(Environment::Production.is_production());
}

#[test]
fn canvas_defaults() {
    let cfg = CanvasConfig::default();
    assert_eq!(cfg.max_shapes, 1000);
    assert_eq!(cfg.shape_ttl_ms, 600_000);
    assert_eq!(cfg.max_history, 10);
    assert_eq!(cfg.validation.max_points, 1000);
    assert_eq!(cfg.validation.max_traces, 64);
}

#[test]
fn config_default_is_memory_only_development() {
    let cfg = Config::default();
    assert_eq!(cfg.port, 3000);
    assert!(cfg.database_url.is_none());
    assert!(cfg.admin_token.is_none());
    assert_eq!(cfg.environment, Environment::Development);
    assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
}
