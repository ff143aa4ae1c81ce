use std::path::Path;
use tracing::{debug, warn};

/// Directive used when no system prompt file is available.
pub const DEFAULT_DIRECTIVE: &str =
    "Process this text segment maintaining its original style and context.";

/// Wraps each unit's raw sentences with the processing directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    directive: String,
}

impl PromptTemplate {
    pub fn new(directive: impl Into<String>) -> Self {
        Self {
            directive: directive.into(),
        }
    }

    /// Read the directive from `path`, falling back to [`DEFAULT_DIRECTIVE`]
    /// when no path is given, the file is unreadable, or it is blank.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => {
                debug!("Loaded system prompt from {}", path.display());
                Self::new(text.trim())
            }
            Ok(_) => {
                warn!("System prompt {} is empty, using default", path.display());
                Self::default()
            }
            Err(e) => {
                warn!(
                    "Could not read system prompt {}: {}, using default",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn directive(&self) -> &str {
        &self.directive
    }

    pub fn wrap(&self, text: &str) -> String {
        format!(
            "System Instructions: {}\n\nInput Text to Process: {}\n\n\
             Please process the above text according to the system instructions \
             while maintaining context and flow.",
            self.directive, text
        )
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_DIRECTIVE)
    }
}
