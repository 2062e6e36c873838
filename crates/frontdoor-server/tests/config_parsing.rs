use std::{env, fs, time::Duration};

use frontdoor_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("frontdoor.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081

[logging]
level = "debug"

[oauth]
client_id = "frontdoor"
client_secret = "s3cret"
redirect_uri = "http://localhost:8081/oauth2/callback"
authorization_uri = "https://idp.example.com/oauth2/authorize"
token_uri = "https://idp.example.com/oauth2/token"
dpop_enabled = true
request_timeout = "10s"

[dpop]
private_key_path = "keys/dpop"
public_key_path = "keys/dpop.pub"

[session]
cookie_name = "SID"
secure_cookies = true
idle_timeout = "15m"

[filter]
extra_public_paths = ["/health", "/static/*"]
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.oauth.client_id, "frontdoor");
    assert!(cfg.oauth.dpop_enabled);
    assert_eq!(cfg.oauth.request_timeout, Duration::from_secs(10));
    assert_eq!(cfg.oauth.scope, "openid");
    assert_eq!(cfg.dpop.private_key_path.to_str(), Some("keys/dpop"));
    assert_eq!(cfg.session.cookie_name, "SID");
    assert!(cfg.session.secure_cookies);
    assert_eq!(cfg.session.idle_timeout, Duration::from_secs(15 * 60));
    assert_eq!(cfg.filter.extra_public_paths.len(), 2);

    let client = cfg.client_config().unwrap();
    assert_eq!(client.client_secret(), Some("s3cret"));
    assert!(client.userinfo_uri().is_none());

    // 2) Env override should win over file
    unsafe {
        env::set_var("FRONTDOOR__OAUTH__CLIENT_ID", "from-env");
        env::set_var("FRONTDOOR__SERVER__PORT", "9090");
        env::set_var("FRONTDOOR__OAUTH__DPOP_ENABLED", "false");
        env::set_var("FRONTDOOR__FILTER__EXTRA_PUBLIC_PATHS", "/metrics,/assets/*");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.oauth.client_id, "from-env");
    assert_eq!(cfg_env.server.port, 9090);
    assert!(!cfg_env.oauth.dpop_enabled);
    assert_eq!(
        cfg_env.filter.extra_public_paths,
        vec!["/metrics".to_string(), "/assets/*".to_string()]
    );

    // Numeric-looking strings are taken as written
    unsafe {
        env::set_var("FRONTDOOR__OAUTH__CLIENT_ID", "00123");
        env::set_var("FRONTDOOR__OAUTH__CLIENT_SECRET", "1e3");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.oauth.client_id, "00123");
    assert_eq!(cfg_env.oauth.client_secret, "1e3");
    let client = cfg_env.client_config().unwrap();
    assert_eq!(client.client_id(), "00123");
    assert_eq!(client.client_secret(), Some("1e3"));
    unsafe {
        env::remove_var("FRONTDOOR__OAUTH__CLIENT_ID");
        env::remove_var("FRONTDOOR__OAUTH__CLIENT_SECRET");
        env::remove_var("FRONTDOOR__SERVER__PORT");
        env::remove_var("FRONTDOOR__OAUTH__DPOP_ENABLED");
        env::remove_var("FRONTDOOR__FILTER__EXTRA_PUBLIC_PATHS");
    }

    // 3) Incomplete client registration is fatal
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[oauth]
client_id = "frontdoor"
redirect_uri = "http://localhost:8081/oauth2/callback"
authorization_uri = "/relative/authorize"
token_uri = "https://idp.example.com/oauth2/token"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("oauth.authorization_uri"), "{err}");

    // 4) Bad durations are rejected while deserializing
    let bad_duration = dir.path().join("bad_duration.toml");
    fs::write(
        &bad_duration,
        format!("{toml_content}\n").replace("idle_timeout = \"15m\"", "idle_timeout = \"soon\""),
    )
    .expect("write toml");
    let err = load_config(bad_duration.to_str()).expect_err("expected deserialize error");
    assert!(err.contains("deserialize"), "{err}");
}
