use std::env;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "text" | "pretty" | "plain" => LogFormat::Text,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            format: LogFormat::Text,
            default_filter: "info".into(),
        }
    }

    /// Reads `LOG_FORMAT` (json unless `text`/`pretty`/`plain`) and
    /// `GSM_LOG_LEVEL` for the fallback filter.
    pub fn from_env(default_service_name: &str) -> Self {
        let service_name =
            env::var("GSM_SERVICE_NAME").unwrap_or_else(|_| default_service_name.to_string());
        let format = env::var("LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or(LogFormat::Text);
        let default_filter = env::var("GSM_LOG_LEVEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "info".into());
        Self {
            service_name,
            format,
            default_filter,
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_formats_fall_back_to_json() {
        assert_eq!(LogFormat::parse("TEXT"), LogFormat::Text);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Text);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Json);
    }

    #[test]
    fn new_defaults_to_text_at_info() {
        let cfg = TelemetryConfig::new("gsm-dispatcher");
        assert_eq!(cfg.format, LogFormat::Text);
        assert_eq!(cfg.default_filter, "info");
        assert_eq!(cfg.with_format(LogFormat::Json).format, LogFormat::Json);
    }
}
