//! 配置加载集成测试

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;

use chips_runtime::{ActivatorRegistry, CoreError, Framework, FrameworkConfig, ModuleState};

fn write_temp(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn test_load_yaml_config() {
    let file = write_temp(
        ".yaml",
        r#"
logging:
  level: debug
events:
  synchronous_stop: true
  handler_timeout_ms: 1500
properties:
  env: test
modules:
  - headers:
      Module-SymbolicName: "com.example.a; singleton:=true"
      Module-Version: "1.2"
  - symbolic_name: com.example.b
    version: not-a-version
    location: file:///opt/b
"#,
    );

    let config = FrameworkConfig::from_file(file.path()).await.unwrap();
    assert_eq!(config.logging.level, "debug");
    assert!(config.events.synchronous_stop);
    assert!(!config.events.synchronous_delivery);
    assert_eq!(config.events.handler_timeout_ms, 1500);
    assert_eq!(config.config_path.as_deref(), Some(file.path()));

    let descriptors = config.module_descriptors();
    assert_eq!(descriptors.len(), 2);
    assert_eq!(descriptors[0].symbolic_name.as_deref(), Some("com.example.a"));
    assert_eq!(descriptors[0].version.to_string(), "1.2.0");
    assert_eq!(descriptors[0].location, "config:0");
    assert_eq!(descriptors[1].version.to_string(), "0.0.0");
    assert_eq!(descriptors[1].location, "file:///opt/b");
}

#[tokio::test]
async fn test_load_json_config() {
    let file = write_temp(
        ".json",
        r#"{"events": {"synchronous_delivery": true}, "properties": {"k": "v"}}"#,
    );

    let config = FrameworkConfig::from_file(file.path()).await.unwrap();
    assert!(config.events.synchronous_delivery);
    assert_eq!(config.events.handler_timeout_ms, 5000);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.properties.get("k").map(String::as_str), Some("v"));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let file = write_temp(".yaml", "events:\n  handler_timeout_ms: 0\n");
    let err = FrameworkConfig::from_file(file.path()).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfigValue { .. }));

    let file = write_temp(".json", "{ not json");
    let err = FrameworkConfig::from_file(file.path()).await.unwrap_err();
    assert!(matches!(err, CoreError::Json(_)));

    let err = FrameworkConfig::from_file("/nonexistent/runtime.yaml")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConfigLoadFailed(_)));
}

#[tokio::test]
async fn test_framework_from_config_file() {
    let file = write_temp(
        ".yaml",
        r#"
events:
  synchronous_stop: true
properties:
  greeting: hello
modules:
  - symbolic_name: plain
"#,
    );
    let config = FrameworkConfig::from_file(file.path()).await.unwrap();
    let fw = Framework::new(config, Arc::new(ActivatorRegistry::new()));

    fw.start().await.unwrap();
    let plain = fw.module_by_name("plain").unwrap();
    assert_eq!(plain.state(), ModuleState::Active);
    let context = plain.context().unwrap();
    assert_eq!(context.property("greeting").as_deref(), Some("hello"));
    assert_eq!(context.property("missing"), None);

    fw.stop().await.unwrap();
    assert_eq!(plain.state(), ModuleState::Resolved);
}
