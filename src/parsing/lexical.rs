//! Built-in heuristic parser.
//!
//! A line-oriented declaration and call-site scanner that works across the
//! supported languages without a grammar. It exists so the daemon indexes
//! real trees out of the box; precise language parsers plug in through the
//! registry and replace it per language tag.
//!
//! Heuristics:
//! - declarations are matched by per-language line regexes;
//! - call sites are `name(` occurrences outside the keyword set;
//! - doc text and `@key value` annotations come from the contiguous
//!   comment block directly above a declaration;
//! - import lines map referenced names to an import path.

use crate::parsing::parser::{
    ParseDiagnostic, ParseOutput, ParsedReference, ParsedSymbol, SourceParser,
};
use crate::parsing::{Language, shingle};
use crate::types::{AnnotationSet, ScopeKind, SymbolKind};
use dashmap::DashMap;
use regex::Regex;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, LazyLock};

/// One declaration matcher: the regex's first capture group is the name.
struct DeclPattern {
    kind: SymbolKind,
    regex: Regex,
}

fn pattern(kind: SymbolKind, re: &str) -> DeclPattern {
    DeclPattern {
        kind,
        // Patterns are static strings; a failure here is a programming
        // error caught by the pattern tests below.
        regex: Regex::new(re).unwrap(),
    }
}

/// Compiled patterns per language, built at most once per key.
static DECL_PATTERNS: LazyLock<DashMap<Language, Arc<Vec<DeclPattern>>>> =
    LazyLock::new(DashMap::new);

static CALL_SITE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([A-Za-z_][A-Za-z0-9_-]*)\s+(\S[^\r\n]*)").unwrap());

fn decl_patterns(language: Language) -> Arc<Vec<DeclPattern>> {
    DECL_PATTERNS
        .entry(language)
        .or_insert_with(|| Arc::new(build_patterns(language)))
        .clone()
}

fn build_patterns(language: Language) -> Vec<DeclPattern> {
    use SymbolKind::*;
    let ident = r"([A-Za-z_][A-Za-z0-9_]*)";
    match language {
        Language::Rust => vec![
            pattern(Function, &format!(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:unsafe\s+)?fn\s+{ident}")),
            pattern(Struct, &format!(r"^\s*(?:pub(?:\([^)]*\))?\s+)?struct\s+{ident}")),
            pattern(Enum, &format!(r"^\s*(?:pub(?:\([^)]*\))?\s+)?enum\s+{ident}")),
            pattern(Interface, &format!(r"^\s*(?:pub(?:\([^)]*\))?\s+)?trait\s+{ident}")),
            pattern(Type, &format!(r"^\s*(?:pub(?:\([^)]*\))?\s+)?type\s+{ident}")),
            pattern(Constant, &format!(r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const|static)\s+{ident}")),
            pattern(Module, &format!(r"^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+{ident}")),
        ],
        Language::Go => vec![
            pattern(Method, &format!(r"^func\s+\([^)]*\)\s+{ident}")),
            pattern(Function, &format!(r"^func\s+{ident}")),
            pattern(Struct, &format!(r"^type\s+{ident}\s+struct\b")),
            pattern(Interface, &format!(r"^type\s+{ident}\s+interface\b")),
            pattern(Type, &format!(r"^type\s+{ident}")),
            pattern(Constant, &format!(r"^const\s+{ident}")),
            pattern(Variable, &format!(r"^var\s+{ident}")),
        ],
        Language::Python => vec![
            pattern(Function, &format!(r"^\s*(?:async\s+)?def\s+{ident}")),
            pattern(Class, &format!(r"^\s*class\s+{ident}")),
        ],
        Language::JavaScript | Language::TypeScript => vec![
            pattern(Function, &format!(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*{ident}")),
            pattern(Class, &format!(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+{ident}")),
            pattern(Interface, &format!(r"^\s*(?:export\s+)?interface\s+{ident}")),
            pattern(Enum, &format!(r"^\s*(?:export\s+)?(?:const\s+)?enum\s+{ident}")),
            pattern(Type, &format!(r"^\s*(?:export\s+)?type\s+{ident}")),
            pattern(Variable, &format!(r"^\s*(?:export\s+)?(?:const|let|var)\s+{ident}\s*=")),
        ],
        Language::Java | Language::CSharp | Language::Kotlin => vec![
            pattern(Class, &format!(r"^\s*(?:[\w@]+\s+)*class\s+{ident}")),
            pattern(Interface, &format!(r"^\s*(?:[\w@]+\s+)*interface\s+{ident}")),
            pattern(Enum, &format!(r"^\s*(?:[\w@]+\s+)*enum(?:\s+class)?\s+{ident}")),
            pattern(Function, &format!(r"^\s*(?:[\w@]+\s+)*fun\s+{ident}")),
        ],
        Language::C | Language::Cpp => vec![
            pattern(Struct, &format!(r"^\s*(?:typedef\s+)?struct\s+{ident}")),
            pattern(Enum, &format!(r"^\s*(?:typedef\s+)?enum\s+{ident}")),
            pattern(Class, &format!(r"^\s*class\s+{ident}")),
            pattern(Namespace, &format!(r"^\s*namespace\s+{ident}")),
        ],
        Language::Ruby => vec![
            pattern(Function, &format!(r"^\s*def\s+{ident}")),
            pattern(Class, &format!(r"^\s*class\s+{ident}")),
            pattern(Module, &format!(r"^\s*module\s+{ident}")),
        ],
        Language::Php => vec![
            pattern(Function, &format!(r"^\s*(?:[\w]+\s+)*function\s+{ident}")),
            pattern(Class, &format!(r"^\s*(?:abstract\s+|final\s+)?class\s+{ident}")),
            pattern(Interface, &format!(r"^\s*interface\s+{ident}")),
        ],
        Language::Swift => vec![
            pattern(Function, &format!(r"^\s*(?:[\w]+\s+)*func\s+{ident}")),
            pattern(Class, &format!(r"^\s*(?:[\w]+\s+)*class\s+{ident}")),
            pattern(Struct, &format!(r"^\s*(?:[\w]+\s+)*struct\s+{ident}")),
            pattern(Enum, &format!(r"^\s*(?:[\w]+\s+)*enum\s+{ident}")),
        ],
        Language::Shell => vec![
            pattern(Function, &format!(r"^\s*(?:function\s+)?{ident}\s*\(\)\s*\{{")),
        ],
        // Documentation and config files contribute content shingles only.
        Language::Markdown
        | Language::Json
        | Language::Yaml
        | Language::Toml
        | Language::Text => Vec::new(),
    }
}

/// Names that look like calls but never are.
static NON_CALL_KEYWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "if", "else", "for", "while", "switch", "match", "return", "fn", "func", "function",
        "def", "catch", "try", "new", "delete", "sizeof", "typeof", "assert", "print", "panic",
        "loop", "unless", "until", "defer", "go", "await", "yield", "in", "not", "and", "or",
    ]
    .into_iter()
    .collect()
});

fn is_comment_line(trimmed: &str) -> bool {
    trimmed.starts_with("//")
        || trimmed.starts_with('#')
        || trimmed.starts_with("/*")
        || trimmed.starts_with('*')
        || trimmed.starts_with("--")
}

fn strip_comment_marker(trimmed: &str) -> &str {
    trimmed
        .trim_start_matches('/')
        .trim_start_matches('*')
        .trim_start_matches('#')
        .trim_start_matches('-')
        .trim_start_matches('!')
        .trim()
}

/// Extract an import path when the line is an import/use statement.
fn import_path_of(trimmed: &str) -> Option<&str> {
    let rest = trimmed
        .strip_prefix("use ")
        .or_else(|| trimmed.strip_prefix("import "))
        .or_else(|| trimmed.strip_prefix("from "))
        .or_else(|| trimmed.strip_prefix("require "))?;
    let rest = rest.trim_end_matches(';').trim();
    if rest.is_empty() { None } else { Some(rest) }
}

/// Line-oriented heuristic parser covering every supported language.
#[derive(Debug, Default)]
pub struct LexicalParser;

impl LexicalParser {
    pub fn new() -> Self {
        Self
    }

    fn doc_block(lines: &[&str], decl_index: usize) -> (Option<String>, Option<AnnotationSet>) {
        let mut doc_lines: Vec<&str> = Vec::new();
        let mut annotations = AnnotationSet::new();

        for line in lines[..decl_index].iter().rev() {
            let trimmed = line.trim_start();
            if !is_comment_line(trimmed) {
                break;
            }
            let text = strip_comment_marker(trimmed);
            for cap in ANNOTATION.captures_iter(text) {
                annotations
                    .entry(cap[1].into())
                    .or_insert_with(|| cap[2].trim().into());
            }
            doc_lines.push(text);
        }

        let doc = if doc_lines.is_empty() {
            None
        } else {
            doc_lines.reverse();
            Some(doc_lines.join("\n").trim().to_string())
        };
        let annotations = (!annotations.is_empty()).then_some(annotations);
        (doc, annotations)
    }
}

impl SourceParser for LexicalParser {
    fn parse(&self, language: Language, _path: &Path, bytes: &[u8]) -> ParseOutput {
        let mut output = ParseOutput::default();

        let content: Cow<'_, str> = String::from_utf8_lossy(bytes);
        if matches!(content, Cow::Owned(_)) {
            output.diagnostics.push(ParseDiagnostic {
                line: 1,
                message: "invalid UTF-8 sequences replaced".to_string(),
            });
        }

        output.shingles = shingle::shingles_of(&content);

        let patterns = decl_patterns(language);
        let lines: Vec<&str> = content.lines().collect();

        // Pass 1: declarations.
        let mut declared: HashSet<&str> = HashSet::new();
        let mut decl_lines: HashMap<usize, &str> = HashMap::new();
        for (index, line) in lines.iter().enumerate() {
            for p in patterns.iter() {
                let Some(caps) = p.regex.captures(line) else {
                    continue;
                };
                let m = caps.get(1).expect("declaration patterns capture a name");
                let name = m.as_str();
                let (doc, annotations) = Self::doc_block(&lines, index);
                let scope = if line.starts_with(char::is_whitespace) {
                    ScopeKind::Block
                } else {
                    ScopeKind::Module
                };

                output.symbols.push(ParsedSymbol {
                    name: name.into(),
                    kind: p.kind,
                    scope,
                    line: (index + 1) as u32,
                    column: m.start().min(u16::MAX as usize) as u16,
                    signature: Some(line.trim().chars().take(160).collect::<String>().into()),
                    doc: doc.map(Into::into),
                    annotations,
                });
                declared.insert(name);
                decl_lines.insert(index, name);
                break;
            }
        }

        // Pass 2: imports, so external references can carry their path.
        let mut imports: HashMap<&str, &str> = HashMap::new();
        for line in &lines {
            let trimmed = line.trim_start();
            if let Some(path) = import_path_of(trimmed) {
                // Last path segment-ish identifier names the import.
                if let Some(name) = path
                    .rsplit(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .find(|s| !s.is_empty())
                {
                    imports.insert(name, path);
                }
            }
        }

        // Pass 3: call sites.
        for (index, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            if is_comment_line(trimmed) || import_path_of(trimmed).is_some() {
                continue;
            }
            for caps in CALL_SITE.captures_iter(line) {
                let m = caps.get(1).expect("call-site pattern captures a name");
                let name = m.as_str();
                if NON_CALL_KEYWORDS.contains(name) {
                    continue;
                }
                // The declaration line itself is not a use of the name.
                if decl_lines.get(&index) == Some(&name) {
                    continue;
                }
                let is_external = !declared.contains(name);
                output.references.push(ParsedReference {
                    name: name.into(),
                    line: (index + 1) as u32,
                    column: m.start().min(u16::MAX as usize) as u16,
                    is_external,
                    import_path: is_external
                        .then(|| imports.get(name).map(|p| (*p).into()))
                        .flatten(),
                });
            }
        }

        output
    }
}
