use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strongly-typed language enum
/// Every language the sandbox knows how to build and run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Java,
    Python,
    JavaScript,
    Go,
    Rust,
    Ruby,
    Php,
    Perl,
    Swift,
    Haskell,
    R,
}

impl Language {
    /// Returns all language variants
    /// This is the single source of truth for available languages
    /// Add new languages here and they'll automatically propagate everywhere
    pub fn all_variants() -> &'static [Language] {
        &[
            Language::JavaScript,
            Language::Python,
            Language::C,
            Language::Cpp,
            Language::Java,
            Language::Go,
            Language::Rust,
            Language::Ruby,
            Language::Php,
            Language::Perl,
            Language::Swift,
            Language::Haskell,
            Language::R,
        ]
    }

    /// Canonical lowercase identifier, used in image tags and file names
    pub fn id(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Perl => "perl",
            Language::Swift => "swift",
            Language::Haskell => "haskell",
            Language::R => "r",
        }
    }
}

/// Returned when a language identifier doesn't name a supported language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedLanguage(pub String);

impl fmt::Display for UnsupportedLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported language: {}", self.0)
    }
}

impl std::error::Error for UnsupportedLanguage {}

impl FromStr for Language {
    type Err = UnsupportedLanguage;

    /// Parse a language from string (case-insensitive, common aliases accepted)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let language = match s.trim().to_lowercase().as_str() {
            "c" => Language::C,
            "cpp" | "c++" | "cxx" => Language::Cpp,
            "java" => Language::Java,
            "python" | "python3" | "py" => Language::Python,
            "javascript" | "js" | "node" => Language::JavaScript,
            "go" | "golang" => Language::Go,
            "rust" | "rs" => Language::Rust,
            "ruby" | "rb" => Language::Ruby,
            "php" => Language::Php,
            "perl" | "pl" => Language::Perl,
            "swift" => Language::Swift,
            "haskell" | "hs" => Language::Haskell,
            "r" => Language::R,
            _ => return Err(UnsupportedLanguage(s.to_string())),
        };
        Ok(language)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Execution Input (Immutable)
/// Created by the caller, validated by the orchestrator before any
/// filesystem or container work happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            code: code.into(),
            stdin: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Stdin that should actually be fed to the program.
    /// Empty input is treated the same as no input.
    pub fn effective_stdin(&self) -> Option<&str> {
        self.stdin.as_deref().filter(|s| !s.is_empty())
    }
}

/// Execution Output
/// Produced exactly once per request
///
/// ## Semantics:
/// - stdout/stderr are `None` when the program never produced the capture file
///   (e.g. the run step was skipped after a compile failure)
/// - system_error marks an infrastructure failure, distinct from the guest
///   program failing; partial output may still be present alongside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub timed_out: bool,
    pub exceeded_memory: bool,
    pub exit_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_error: Option<String>,
    #[serde(default)]
    pub output_truncated: bool,
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    /// Result carrying only an infrastructure failure
    pub fn system_failure(message: impl Into<String>) -> Self {
        Self {
            stdout: None,
            stderr: None,
            timed_out: false,
            exceeded_memory: false,
            exit_code: None,
            system_error: Some(message.into()),
            output_truncated: false,
            execution_time_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.system_error.is_none()
            && !self.timed_out
            && !self.exceeded_memory
            && self.exit_code == Some(0)
    }

    /// Coarse outcome label for logs and metrics
    pub fn outcome(&self) -> &'static str {
        if self.system_error.is_some() {
            "system_error"
        } else if self.timed_out {
            "timed_out"
        } else if self.exceeded_memory {
            "memory_exceeded"
        } else if self.exit_code == Some(0) {
            "success"
        } else {
            "program_error"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_serialization() {
        let lang = Language::JavaScript;
        let json = serde_json::to_string(&lang).unwrap();
        assert_eq!(json, "\"javascript\"");

        let deserialized: Language = serde_json::from_str("\"cpp\"").unwrap();
        assert_eq!(deserialized, Language::Cpp);
    }

    #[test]
    fn test_language_all_variants() {
        let variants = Language::all_variants();
        assert_eq!(variants.len(), 13);
        assert!(variants.contains(&Language::Haskell));
        assert!(variants.contains(&Language::R));
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("python".parse::<Language>(), Ok(Language::Python));
        assert_eq!("Python".parse::<Language>(), Ok(Language::Python));
        assert_eq!("C++".parse::<Language>(), Ok(Language::Cpp));
        assert_eq!("cpp".parse::<Language>(), Ok(Language::Cpp));
        assert_eq!("R".parse::<Language>(), Ok(Language::R));

        assert_eq!(
            "lua".parse::<Language>(),
            Err(UnsupportedLanguage("lua".to_string()))
        );
        assert!("".parse::<Language>().is_err());
    }

    #[test]
    fn test_display_matches_id() {
        for language in Language::all_variants() {
            assert_eq!(language.to_string(), language.id());
            assert_eq!(language.id().parse::<Language>(), Ok(*language));
        }
    }

    #[test]
    fn test_request_deserializes_without_stdin() {
        let req: ExecutionRequest =
            serde_json::from_str(r#"{"language":"python","code":"print(1)"}"#).unwrap();
        assert_eq!(req.language, "python");
        assert!(req.stdin.is_none());
        assert!(req.effective_stdin().is_none());
    }

    #[test]
    fn test_empty_stdin_is_absent() {
        let req = ExecutionRequest::new("c", "int main(){}").with_stdin("");
        assert!(req.effective_stdin().is_none());

        let req = req.with_stdin("42\n");
        assert_eq!(req.effective_stdin(), Some("42\n"));
    }

    #[test]
    fn test_result_serialization_skips_missing_system_error() {
        let result = ExecutionResult {
            stdout: Some("hi\n".to_string()),
            stderr: Some(String::new()),
            timed_out: false,
            exceeded_memory: false,
            exit_code: Some(0),
            system_error: None,
            output_truncated: false,
            execution_time_ms: 12,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stdout"], "hi\n");
        assert_eq!(json["exit_code"], 0);
        assert!(json.get("system_error").is_none());
        assert!(result.succeeded());
        assert_eq!(result.outcome(), "success");
    }

    #[test]
    fn test_result_outcome_labels() {
        let mut result = ExecutionResult::system_failure("docker unavailable");
        assert_eq!(result.outcome(), "system_error");
        assert!(!result.succeeded());

        result.system_error = None;
        result.timed_out = true;
        assert_eq!(result.outcome(), "timed_out");

        result.timed_out = false;
        result.exit_code = Some(1);
        assert_eq!(result.outcome(), "program_error");
    }
}
