//! Language detection and file-type categories.
//!
//! Detection is by file extension only; the daemon never sniffs content.
//! The category feeds the ranking stage: code files are boosted,
//! documentation penalized, configuration lightly boosted.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Language tag attached to a file entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Rust,
    Go,
    Python,
    JavaScript,
    TypeScript,
    Java,
    Kotlin,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Shell,
    Markdown,
    Json,
    Yaml,
    Toml,
    Text,
}

/// Coarse file-type bucket used by the ranking stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Code,
    Documentation,
    Config,
}

impl Language {
    /// Detect language from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "py" | "pyi" => Some(Self::Python),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            "java" => Some(Self::Java),
            "kt" | "kts" => Some(Self::Kotlin),
            "c" | "h" => Some(Self::C),
            "cc" | "cpp" | "cxx" | "hpp" | "hxx" | "hh" => Some(Self::Cpp),
            "cs" => Some(Self::CSharp),
            "rb" => Some(Self::Ruby),
            "php" => Some(Self::Php),
            "swift" => Some(Self::Swift),
            "sh" | "bash" | "zsh" => Some(Self::Shell),
            "md" | "markdown" | "rst" | "txt" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" | "ini" | "cfg" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Detect language from a file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn category(&self) -> FileCategory {
        match self {
            Self::Markdown | Self::Text => FileCategory::Documentation,
            Self::Json | Self::Yaml | Self::Toml => FileCategory::Config,
            _ => FileCategory::Code,
        }
    }

    /// Stable tag used for registry keys and wire responses.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Java => "java",
            Self::Kotlin => "kotlin",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::CSharp => "csharp",
            Self::Ruby => "ruby",
            Self::Php => "php",
            Self::Swift => "swift",
            Self::Shell => "shell",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Toml => "toml",
            Self::Text => "text",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_from_path() {
        assert_eq!(Language::from_path(Path::new("src/main.rs")), Some(Language::Rust));
        assert_eq!(Language::from_path(Path::new("a/b.tsx")), Some(Language::TypeScript));
        assert_eq!(Language::from_path(Path::new("README.md")), Some(Language::Markdown));
        assert_eq!(Language::from_path(Path::new("Cargo.toml")), Some(Language::Toml));
        assert_eq!(Language::from_path(Path::new("binary.bin")), None);
        assert_eq!(Language::from_path(Path::new("Makefile")), None);
    }

    #[test]
    fn test_extension_case_insensitive() {
        assert_eq!(Language::from_extension("RS"), Some(Language::Rust));
        assert_eq!(Language::from_extension("Py"), Some(Language::Python));
    }

    #[test]
    fn test_categories() {
        assert_eq!(Language::Rust.category(), FileCategory::Code);
        assert_eq!(Language::Markdown.category(), FileCategory::Documentation);
        assert_eq!(Language::Yaml.category(), FileCategory::Config);
    }
}
