use tessel_rs::{BackendId, EngineConfig, EngineError, ExecutionMode};

#[test]
fn config_round_trips_through_json() {
    let config = EngineConfig::new(["GpuAcc", "CpuRef"]).with_execution_mode(ExecutionMode::Async);
    let json = config.to_json_string().unwrap();
    assert!(json.contains("\"async\""));
    assert_eq!(EngineConfig::from_json_str(&json).unwrap(), config);
}

#[test]
fn empty_document_uses_defaults() {
    let config = EngineConfig::from_json_str("{}").unwrap();
    assert!(config.backends.is_empty());
    assert_eq!(config.execution_mode, ExecutionMode::Sync);
}

#[test]
fn malformed_documents_are_config_errors() {
    let err = EngineConfig::from_json_str(r#"{ "execution_mode": "later" }"#).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[test]
fn backend_ids_are_case_sensitive() {
    assert_ne!(BackendId::new("CpuRef"), BackendId::new("cpuref"));
}
