//! Unit tests for API token loading.
//!
//! The keychain service `lms-sync` is absent in test environments, so
//! these exercise the env-var fallback and the error message that names
//! both sources.
//!
//! NOTE: These tests mutate process-global env vars and must run serially.

use lms_sync::config::{GlobalConfig, KEYCHAIN_SERVICE, TOKEN_ENV_VAR};

fn make_config() -> GlobalConfig {
    GlobalConfig::from_toml_str(
        r#"
base_url = "https://canvas.example.edu"

[user]
id = "7"
name = "Grace"
"#,
    )
    .expect("config parses")
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn env_var_token_is_loaded() {
    let mut config = make_config();

    unsafe {
        std::env::set_var(TOKEN_ENV_VAR, "token-from-env");
    }

    let result = config.load_credentials().await;
    assert!(result.is_ok(), "load_credentials should succeed with env var");
    assert_eq!(config.api_token, "token-from-env");
    assert!(config.session().is_some());

    unsafe {
        std::env::remove_var(TOKEN_ENV_VAR);
    }
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn missing_token_error_names_both_sources() {
    let mut config = make_config();

    unsafe {
        std::env::remove_var(TOKEN_ENV_VAR);
    }

    let result = config.load_credentials().await;
    let err_msg = format!("{}", result.expect_err("no credential source"));
    assert!(
        err_msg.contains(KEYCHAIN_SERVICE),
        "error should mention keychain service name, got: {err_msg}"
    );
    assert!(
        err_msg.contains(TOKEN_ENV_VAR),
        "error should mention the env var name, got: {err_msg}"
    );
}

#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn empty_env_var_counts_as_missing() {
    let mut config = make_config();

    unsafe {
        std::env::set_var(TOKEN_ENV_VAR, "");
    }

    let result = config.load_credentials().await;
    assert!(result.is_err(), "empty token should be rejected");
    assert!(config.api_token.is_empty());

    unsafe {
        std::env::remove_var(TOKEN_ENV_VAR);
    }
}
