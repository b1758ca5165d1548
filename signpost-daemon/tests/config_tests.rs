//! Configuration loading and rule compilation tests.
//!
//! Tests YAML parsing from files, validation failures that must refuse
//! startup, and end-to-end rule compilation from a config file.

use signpost_core::config::Settings;
use signpost_router::rule::loader::RuleLoader;

const FULL_CONFIG: &str = r#"
global:
  listen:
    address: "127.0.0.1"
    port: 1514
  status:
    address: "127.0.0.1"
    port: 8585
  kafka:
    buffer: 512
    topic: "logs-unknown"
    conf:
      bootstrap.servers: "localhost:9092"
  metrics:
    statsd: "localhost:8125"

rules:
  - jmespath: "meta.topic"
    field: msg
    actions:
      - type: merge
        json:
          meta:
            signpost:
              version: "{{version}}"
              timestamp: "{{timestamp}}"
      - type: stop
  - regex: ".*"
    field: msg
    actions:
      - type: stop
"#;

async fn load_from_temp(yaml: &str) -> Result<Settings, signpost_core::error::SignpostError> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signpost.yml");
    std::fs::write(&path, yaml).unwrap();
    Settings::from_file(&path).await
}

#[tokio::test]
async fn loads_full_config_from_file() {
    // Given: a complete YAML config on disk
    let settings = load_from_temp(FULL_CONFIG).await.unwrap();

    // Then: every section is populated
    assert_eq!(settings.global.listen.port, 1514);
    assert_eq!(settings.global.kafka.buffer, 512);
    assert_eq!(
        settings.global.metrics.statsd.as_deref(),
        Some("localhost:8125")
    );
    assert_eq!(settings.rules.len(), 2);
}

#[tokio::test]
async fn compiles_rules_from_loaded_config() {
    // Given: a loaded config
    let settings = load_from_temp(FULL_CONFIG).await.unwrap();

    // When: compiling the rule set
    let ruleset = RuleLoader::from_settings(&settings).unwrap();

    // Then: rules are in configured order with the configured default topic
    assert_eq!(ruleset.rule_count(), 2);
    assert_eq!(ruleset.default_topic(), "logs-unknown");
}

#[tokio::test]
async fn missing_file_is_a_config_error() {
    let result = Settings::from_file("/nonexistent/signpost.yml").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn invalid_regex_refuses_startup() {
    // Given: a config whose regex does not compile
    let yaml = r#"
rules:
  - regex: "[unclosed"
    actions:
      - type: stop
"#;
    let settings = load_from_temp(yaml).await.unwrap();

    // When: compiling the rule set
    let result = RuleLoader::from_settings(&settings);

    // Then: compilation fails (the process must refuse to start)
    assert!(result.is_err());
}

#[tokio::test]
async fn invalid_jmespath_refuses_startup() {
    let yaml = r#"
rules:
  - jmespath: "meta.[broken"
    actions:
      - type: stop
"#;
    let settings = load_from_temp(yaml).await.unwrap();
    assert!(RuleLoader::from_settings(&settings).is_err());
}

#[tokio::test]
async fn unknown_action_type_refuses_startup() {
    // Given: a config with an unknown action tag
    let yaml = r#"
rules:
  - regex: ".*"
    actions:
      - type: drop_table
"#;

    // Then: parsing already rejects it
    assert!(load_from_temp(yaml).await.is_err());
}

#[tokio::test]
async fn zero_buffer_refuses_startup() {
    let yaml = r#"
global:
  kafka:
    buffer: 0
    topic: "logs"
    conf:
      bootstrap.servers: "localhost:9092"
"#;
    assert!(load_from_temp(yaml).await.is_err());
}

#[tokio::test]
async fn missing_bootstrap_servers_refuses_startup() {
    let yaml = r#"
global:
  kafka:
    buffer: 64
    topic: "logs"
    conf: {}
"#;
    assert!(load_from_temp(yaml).await.is_err());
}

#[tokio::test]
async fn kafka_conf_is_passed_through_verbatim() {
    // Given: opaque client settings
    let yaml = r#"
global:
  kafka:
    conf:
      bootstrap.servers: "broker:9092"
      queue.buffering.max.ms: "50"
      compression.codec: "zstd"
"#;
    let settings = load_from_temp(yaml).await.unwrap();

    // Then: every key survives untouched
    let conf = &settings.global.kafka.conf;
    assert_eq!(conf.get("queue.buffering.max.ms").unwrap(), "50");
    assert_eq!(conf.get("compression.codec").unwrap(), "zstd");
}
