//! Model types
//!
//! Model metadata as reported by the provider's model list.

use serde::{Deserialize, Serialize};

/// Model used when settings don't name one
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

/// Information about a remote model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Resource name, e.g. `models/gemini-1.5-pro`
    pub name: String,
    /// Display name of the model
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_token_limit: Option<u64>,
    #[serde(default)]
    pub output_token_limit: Option<u64>,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    /// Model id without the `models/` prefix
    pub fn id(&self) -> &str {
        self.name.strip_prefix("models/").unwrap_or(&self.name)
    }
}

/// Keep only the Gemini family from a model listing
pub fn filter_models(models: Vec<ModelInfo>) -> Vec<ModelInfo> {
    models
        .into_iter()
        .filter(|m| m.name.starts_with("models/gemini-"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(name: &str) -> ModelInfo {
        ModelInfo {
            name: name.to_string(),
            display_name: String::new(),
            description: String::new(),
            input_token_limit: None,
            output_token_limit: None,
            supported_generation_methods: Vec::new(),
        }
    }

    #[test]
    fn test_filter_models() {
        let models = vec![
            model("models/gemini-1.5-pro"),
            model("models/embedding-001"),
            model("models/gemini-1.5-flash"),
            model("models/text-bison-001"),
        ];
        let filtered = filter_models(models);
        let ids: Vec<&str> = filtered.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["gemini-1.5-pro", "gemini-1.5-flash"]);
    }

    #[test]
    fn test_model_listing_shape() {
        let json = r#"{"name":"models/gemini-pro","displayName":"Gemini Pro","outputTokenLimit":2048}"#;
        let info: ModelInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.display_name, "Gemini Pro");
        assert_eq!(info.output_token_limit, Some(2048));
        assert!(info.supported_generation_methods.is_empty());
    }
}
