pub mod types;
pub mod language;
pub mod naming;
pub mod config;

// Re-export commonly used types for convenience
pub use types::{ExecutionRequest, ExecutionResult, Language, UnsupportedLanguage};
pub use language::{CommandArg, LanguageProfile};
pub use config::Config;
