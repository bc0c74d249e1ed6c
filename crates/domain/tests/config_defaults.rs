use sa_domain::config::Config;

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.gateway.host, "127.0.0.1");
}

#[test]
fn explicit_host_parses() {
    let toml_str = r#"
[gateway]
host = "0.0.0.0"
port = 3336
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.gateway.host, "0.0.0.0");
    assert_eq!(config.gateway.port, 3336);
}
