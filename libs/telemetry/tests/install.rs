use gsm_telemetry::{LogFormat, TelemetryConfig, init_tracing, install};

#[test]
fn install_is_idempotent() {
    install("gsm-test").unwrap();
    install("gsm-test").unwrap();
    let json = TelemetryConfig::new("gsm-test").with_format(LogFormat::Json);
    init_tracing(&json).unwrap();
    tracing::info!(provider = "log", "still logging after repeated installs");
}
