//! Parsed source files and tree-sitter helpers shared across extractors.

use std::ops::Range;

use tree_sitter::{Language, Node, Parser as TSParser, Tree};

use super::error::ExtractError;

/// One parsed file. Owns its text and tree so both passes can share it.
pub struct SourceFile {
    path: String,
    content: String,
    tree: Tree,
}

impl SourceFile {
    /// Parse `content`. A tree containing error or missing nodes fails the
    /// whole file.
    pub fn parse(grammar: &Language, path: impl Into<String>, content: String) -> Result<Self, ExtractError> {
        let path = path.into();
        let mut parser = TSParser::new();
        parser.set_language(grammar).map_err(|e| ExtractError::Parse {
            path: path.clone(),
            message: format!("Failed to set language: {}", e),
        })?;

        let tree = parser.parse(&content, None).ok_or_else(|| ExtractError::Parse {
            path: path.clone(),
            message: "Failed to parse content".to_string(),
        })?;

        let root = tree.root_node();
        if root.has_error() {
            let line = first_error(root).map(|n| line(&n)).unwrap_or(1);
            return Err(ExtractError::Syntax { path, line });
        }

        Ok(Self { path, content, tree })
    }

    /// Path relative to the scan root, `/`-separated.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Get text for a node.
    pub fn text(&self, node: &Node) -> &str {
        &self.content[node.byte_range()]
    }

    /// Locate the node of one of `kinds` spanning exactly `span`.
    pub fn find(&self, span: &Range<usize>, kinds: &[&str]) -> Option<Node<'_>> {
        let mut node = self.root().descendant_for_byte_range(span.start, span.end)?;
        loop {
            if node.byte_range() == *span && kinds.contains(&node.kind()) {
                return Some(node);
            }
            if node.start_byte() < span.start || node.end_byte() > span.end {
                return None;
            }
            node = node.parent()?;
        }
    }
}

/// Get line number (1-based) for a node.
pub fn line(node: &Node) -> u32 {
    node.start_position().row as u32 + 1
}

/// Named children of a node.
pub fn children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Named children of a specific kind.
pub fn children_of_kind<'t>(node: &Node<'t>, kinds: &[&str]) -> Vec<Node<'t>> {
    children(node)
        .into_iter()
        .filter(|n| kinds.contains(&n.kind()))
        .collect()
}

/// Whether any direct child (named or not) has the given kind.
pub fn has_token(node: &Node, kind: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|n| n.kind() == kind);
    found
}

/// Pre-order walk. `visit` returns whether to descend into the node.
pub fn walk<'t, F>(node: Node<'t>, visit: &mut F)
where
    F: FnMut(Node<'t>) -> bool,
{
    if visit(node) {
        let mut cursor = node.walk();
        let kids: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
        for child in kids {
            walk(child, visit);
        }
    }
}

/// First error or missing node, in document order.
fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let kids: Vec<Node<'_>> = node.children(&mut cursor).collect();
    kids.into_iter()
        .filter(|child| child.has_error() || child.is_missing())
        .find_map(first_error)
}

/// Unquote a string literal's text. Handles the common prefixes and quote
/// styles of every supported language; returns `None` for interpolated or
/// otherwise non-constant forms.
pub fn unquote(text: &str) -> Option<String> {
    let mut body = text.trim();

    // Python string prefixes; f-strings are dynamic.
    let prefix_len = body
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_alphabetic() || *c == '@')
        .count();
    let prefix = &body[..prefix_len];
    if prefix.contains('f') || prefix.contains('F') || prefix.contains('$') {
        return None;
    }
    body = &body[prefix_len..];

    for quote in ["\"\"\"", "'''", "\"", "'", "`"] {
        if body.len() >= quote.len() * 2 && body.starts_with(quote) && body.ends_with(quote) {
            return Some(body[quote.len()..body.len() - quote.len()].to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote_forms() {
        assert_eq!(unquote("\"http://a\"").as_deref(), Some("http://a"));
        assert_eq!(unquote("@\"C:\\tmp\"").as_deref(), Some("C:\\tmp"));
        assert_eq!(unquote("`raw`").as_deref(), Some("raw"));
        assert_eq!(unquote("r'x'").as_deref(), Some("x"));
        assert_eq!(unquote("'''doc'''").as_deref(), Some("doc"));
        assert_eq!(unquote("f\"{base}/x\""), None);
        assert_eq!(unquote("$\"{a}\""), None);
        assert_eq!(unquote("name"), None);
    }

    #[test]
    fn test_syntax_error_fails_file() {
        let grammar: Language = tree_sitter_python::LANGUAGE.into();
        let result = SourceFile::parse(&grammar, "bad.py", "def broken(:\n    pass\n".to_string());
        assert!(matches!(result, Err(ExtractError::Syntax { line: 1, .. })));
    }

    #[test]
    fn test_find_by_span() {
        let grammar: Language = tree_sitter_python::LANGUAGE.into();
        let file = SourceFile::parse(&grammar, "ok.py", "def a():\n    return 1\n".to_string()).unwrap();
        let def = children(&file.root())[0];
        let found = file.find(&def.byte_range(), &["function_definition"]).unwrap();
        assert_eq!(found.id(), def.id());
        assert_eq!(line(&found), 1);
    }
}
