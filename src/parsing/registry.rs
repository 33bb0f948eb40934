//! Parser registry.
//!
//! Implementations are registered in a table keyed by language tag; the
//! indexer never hard-wires a parser. The built-in lexical parser is the
//! fallback for any language without a registered implementation.

use crate::parsing::lexical::LexicalParser;
use crate::parsing::parser::SourceParser;
use crate::parsing::Language;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ParserRegistry {
    table: HashMap<Language, Arc<dyn SourceParser>>,
    fallback: Arc<dyn SourceParser>,
}

impl ParserRegistry {
    /// Registry with the lexical parser as the universal fallback.
    pub fn new() -> Self {
        Self {
            table: HashMap::new(),
            fallback: Arc::new(LexicalParser::new()),
        }
    }

    /// Register (or replace) the parser for a language.
    pub fn register(&mut self, language: Language, parser: Arc<dyn SourceParser>) {
        self.table.insert(language, parser);
    }

    /// The parser for a language; never fails, the fallback always applies.
    pub fn get(&self, language: Language) -> Arc<dyn SourceParser> {
        self.table
            .get(&language)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
