/// Label set attached to every metric sample.
#[derive(Debug, Clone, Default)]
pub struct TelemetryLabels {
    pub provider: Option<String>,
    pub contact_type: Option<String>,
    pub code: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl TelemetryLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provider(provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            ..Self::default()
        }
    }

    pub fn with_contact_type(mut self, contact_type: impl Into<String>) -> Self {
        self.contact_type = Some(contact_type.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        let mut tags = Vec::with_capacity(3 + self.extra.len());
        if let Some(provider) = &self.provider {
            tags.push(("provider".into(), provider.clone()));
        }
        if let Some(kind) = &self.contact_type {
            tags.push(("contact_type".into(), kind.clone()));
        }
        if let Some(code) = &self.code {
            tags.push(("code".into(), code.clone()));
        }
        for (key, value) in &self.extra {
            tags.push((key.clone(), value.clone()));
        }
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_keep_insertion_order_and_skip_missing() {
        let labels = TelemetryLabels::provider("smssync")
            .with_code("timeout")
            .with_extra("cycle", "send");
        assert_eq!(
            labels.tags(),
            vec![
                ("provider".to_string(), "smssync".to_string()),
                ("code".to_string(), "timeout".to_string()),
                ("cycle".to_string(), "send".to_string()),
            ]
        );
        assert!(TelemetryLabels::new().tags().is_empty());
    }
}
