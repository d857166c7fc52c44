use cs_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn explicit_zero_host_parses() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 4020
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
}

#[test]
fn sweeper_overrides_parse_alongside_defaults() {
    let toml_str = r#"
[sweeper]
ghost_timeout_minutes = 90

[alerts]
webhook_url = "https://hooks.example.test/alerts"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.sweeper.ghost_timeout_minutes, 90);
    assert_eq!(config.sweeper.interval_secs, 300);
    assert_eq!(
        config.alerts.webhook_url.as_deref(),
        Some("https://hooks.example.test/alerts")
    );
}
