//! Suggestion content behind the quota gate

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("suggestion backend failed: {0}")]
    Backend(String),
}

/// Produces suggestions for an app name
#[async_trait]
pub trait SuggestionSource: Send + Sync {
    async fn suggest(&self, app_name: &str) -> Result<Vec<String>, SuggestionError>;
}

/// Fixed list, for running without a generator backend
#[derive(Debug, Clone)]
pub struct PlaceholderSuggestions {
    items: Vec<String>,
}

impl PlaceholderSuggestions {
    pub fn new(items: Vec<String>) -> Self {
        Self { items }
    }
}

impl Default for PlaceholderSuggestions {
    fn default() -> Self {
        Self::new(vec![
            "1. Placeholder suggestion 1".to_string(),
            "2. Placeholder suggestion 2".to_string(),
        ])
    }
}

#[async_trait]
impl SuggestionSource for PlaceholderSuggestions {
    async fn suggest(&self, _app_name: &str) -> Result<Vec<String>, SuggestionError> {
        Ok(self.items.clone())
    }
}
