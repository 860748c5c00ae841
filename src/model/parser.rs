use std::time::Duration;
use tree_sitter::{Node, Parser, Tree, TreeCursor};

use super::span::ByteSpan;
use crate::core::error::ParseError;

/// Parses Java source with a bounded time budget.
///
/// A tree containing ERROR or MISSING nodes is rejected: a file is either
/// fully parsed or excluded from transformation.
pub fn parse_java(text: &str, timeout: Duration) -> Result<Tree, ParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::language())
        .map_err(|e| ParseError::Language {
            reason: e.to_string(),
        })?;
    parser.set_timeout_micros(timeout.as_micros().min(u64::MAX as u128) as u64);

    let tree = parser.parse(text, None).ok_or(ParseError::Timeout {
        timeout_ms: timeout.as_millis() as u64,
    })?;

    if tree.root_node().has_error() {
        if let Some(err) = first_syntax_error(tree.root_node(), text) {
            return Err(err);
        }
    }
    Ok(tree)
}

fn first_syntax_error(root: Node<'_>, text: &str) -> Option<ParseError> {
    let node = descendants(root).find(|n| n.is_error() || n.is_missing())?;
    let point = node.start_position();
    let line_start = node.start_byte().saturating_sub(point.column);
    let column = text
        .get(line_start..node.start_byte())
        .map(|prefix| prefix.chars().count())
        .unwrap_or(point.column);

    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let snippet: String = node_text(node, text)
            .chars()
            .take(24)
            .take_while(|c| *c != '\n' && *c != '\r')
            .collect();
        format!("unexpected `{}`", snippet)
    };

    Some(ParseError::Syntax {
        line: point.row as u32,
        column: column as u32,
        message,
    })
}

pub fn node_span(node: Node<'_>) -> ByteSpan {
    ByteSpan::new(node.start_byte(), node.end_byte())
}

pub fn node_text<'a>(node: Node<'_>, text: &'a str) -> &'a str {
    text.get(node.byte_range()).unwrap_or("")
}

/// Pre-order walk over `node` and everything below it.
pub fn descendants(node: Node<'_>) -> Descendants<'_> {
    Descendants {
        cursor: node.walk(),
        depth: 0,
        finished: false,
    }
}

pub struct Descendants<'tree> {
    cursor: TreeCursor<'tree>,
    depth: usize,
    finished: bool,
}

impl<'tree> Iterator for Descendants<'tree> {
    type Item = Node<'tree>;

    fn next(&mut self) -> Option<Node<'tree>> {
        if self.finished {
            return None;
        }
        let node = self.cursor.node();
        if self.cursor.goto_first_child() {
            self.depth += 1;
        } else {
            loop {
                if self.depth == 0 {
                    self.finished = true;
                    break;
                }
                if self.cursor.goto_next_sibling() {
                    break;
                }
                self.cursor.goto_parent();
                self.depth -= 1;
            }
        }
        Some(node)
    }
}

/// Nearest ancestor (or the node itself) of the given kind.
pub fn enclosing<'tree>(node: Node<'tree>, kind: &str) -> Option<Node<'tree>> {
    let mut current = Some(node);
    while let Some(n) = current {
        if n.kind() == kind {
            return Some(n);
        }
        current = n.parent();
    }
    None
}
