//! Call-hierarchy ("tree") queries.
//!
//! The tree roots at every callable symbol carrying the requested name and
//! expands through outgoing references: a reference emitted from a file is
//! attributed to the nearest preceding callable symbol in that file, the
//! lexical stand-in for body-range enclosure. Cycles are marked and not
//! expanded; depth is bounded by the request.

use crate::error::IndexResult;
use crate::index::{IndexKind, IndexWarning, ReadView, Requirements};
use crate::search::engine::SearchEngine;
use crate::types::{CompositeSymbolId, FileId, SymbolRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::atomic::Ordering;

#[derive(Debug, Clone, Deserialize)]
pub struct TreeOptions {
    pub function_name: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default)]
    pub show_lines: bool,
    #[serde(default)]
    pub compact: bool,
    /// Name or path fragments to prune from the tree.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Hint for machine consumption: compact rendering, no line numbers.
    #[serde(default)]
    pub agent_mode: bool,
}

fn default_max_depth() -> usize {
    3
}

#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// True when this node closes a cycle; its children are not expanded.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub cycle: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<TreeNode>,
}

#[derive(Debug, Serialize)]
pub struct TreeResponse {
    pub roots: Vec<TreeNode>,
    /// Pre-rendered text when `compact` or `agent_mode` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered: Option<String>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<IndexWarning>,
}

impl SearchEngine {
    /// Call-hierarchy tree rooted at `function_name`.
    pub fn tree(&self, options: &TreeOptions) -> IndexResult<TreeResponse> {
        self.counters().trees.fetch_add(1, Ordering::Relaxed);

        let req = Requirements::new()
            .with(IndexKind::References)
            .with(IndexKind::Locations);
        // Tree expansion happens under one consistent view.
        let view = self.coordinator().acquire_read(req, self.lock_deadline())?;

        let mut roots = Vec::new();
        if let Some(symbols) = view.symbols() {
            for id in symbols.lookup_by_name(&options.function_name) {
                let Some(record) = symbols.resolve(id) else {
                    continue;
                };
                if !record.kind.is_callable() {
                    continue;
                }
                let mut visited = HashSet::new();
                visited.insert(id);
                roots.push(expand(&view, record, options, &mut visited, options.max_depth));
            }
        }

        let rendered = (options.compact || options.agent_mode)
            .then(|| render(&roots, options));

        Ok(TreeResponse {
            roots,
            rendered,
            degraded: view.degraded(),
            warnings: view.warnings().to_vec(),
        })
    }
}

fn excluded(options: &TreeOptions, name: &str, path: Option<&str>) -> bool {
    options.exclude.iter().any(|fragment| {
        name.contains(fragment.as_str())
            || path.is_some_and(|p| p.contains(fragment.as_str()))
    })
}

fn path_of(view: &ReadView<'_>, file_id: FileId) -> Option<String> {
    view.locations()
        .and_then(|l| l.get(file_id))
        .map(|e| e.path.to_string())
        .or_else(|| {
            view.symbols()
                .and_then(|s| s.path_of(file_id))
                .map(str::to_string)
        })
}

fn expand(
    view: &ReadView<'_>,
    record: &SymbolRecord,
    options: &TreeOptions,
    visited: &mut HashSet<CompositeSymbolId>,
    depth_left: usize,
) -> TreeNode {
    let mut node = TreeNode {
        name: record.name.to_string(),
        path: path_of(view, record.id.file),
        line: Some(record.location.line),
        cycle: false,
        calls: Vec::new(),
    };
    if depth_left == 0 {
        return node;
    }

    for (callee_name, callee_id) in callees_of(view, record) {
        let resolved = callee_id.and_then(|id| view.symbols().and_then(|s| s.resolve(id)));
        let callee_path = callee_id.and_then(|id| path_of(view, id.file));
        if excluded(options, &callee_name, callee_path.as_deref()) {
            continue;
        }

        match resolved {
            Some(callee) if callee.kind.is_callable() => {
                let id = callee.id;
                if visited.contains(&id) {
                    node.calls.push(TreeNode {
                        name: callee.name.to_string(),
                        path: callee_path,
                        line: Some(callee.location.line),
                        cycle: true,
                        calls: Vec::new(),
                    });
                } else {
                    visited.insert(id);
                    node.calls
                        .push(expand(view, callee, options, visited, depth_left - 1));
                    visited.remove(&id);
                }
            }
            Some(_) => {}
            // Unresolved callee: keep the name as a leaf.
            None => node.calls.push(TreeNode {
                name: callee_name,
                path: None,
                line: None,
                cycle: false,
                calls: Vec::new(),
            }),
        }
    }
    node
}

/// Calls made within a function's body: the references emitted from its
/// file whose nearest preceding callable symbol is that function.
fn callees_of(
    view: &ReadView<'_>,
    caller: &SymbolRecord,
) -> Vec<(String, Option<CompositeSymbolId>)> {
    let (Some(symbols), Some(references)) = (view.symbols(), view.references()) else {
        return Vec::new();
    };
    let file_id = caller.id.file;

    // Callable symbols of the file, in declaration order.
    let mut callables: Vec<&SymbolRecord> = symbols
        .symbols_in(file_id)
        .filter(|s| s.kind.is_callable())
        .collect();
    callables.sort_by_key(|s| s.location.line);

    let mut out = Vec::new();
    for reference in references.references_from(file_id) {
        let enclosing = callables
            .iter()
            .take_while(|s| s.location.line <= reference.location.line)
            .last();
        if enclosing.map(|s| s.id) != Some(caller.id) {
            continue;
        }
        // References committed before their target dangle; re-resolve by
        // name under the current view so expansion does not depend on
        // commit order.
        let target = reference.symbol.or_else(|| {
            symbols
                .lookup_by_name(&reference.name)
                .find(|id| symbols.resolve(*id).is_some_and(|r| r.kind.is_callable()))
        });
        out.push((reference.name.to_string(), target));
    }
    out
}

fn render(roots: &[TreeNode], options: &TreeOptions) -> String {
    let mut out = String::new();
    for root in roots {
        render_node(&mut out, root, 0, options);
    }
    out
}

fn render_node(out: &mut String, node: &TreeNode, depth: usize, options: &TreeOptions) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str(&node.name);
    // Agent mode stays terse: names and structure only.
    if !options.agent_mode {
        if let Some(path) = &node.path {
            let _ = write!(out, " ({path}");
            if options.show_lines {
                if let Some(line) = node.line {
                    let _ = write!(out, ":{line}");
                }
            }
            out.push(')');
        }
    }
    if node.cycle {
        out.push_str(" [cycle]");
    }
    out.push('\n');
    for child in &node.calls {
        render_node(out, child, depth + 1, options);
    }
}
