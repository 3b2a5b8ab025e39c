//! Top-level Python imports and carrying them over into rewritten code.
//!
//! Models often return only the changed lines of a snippet and drop imports
//! the rest of the file relies on. [`reconcile_imports`] prepends every
//! original import that the rewrite no longer has.

use std::fmt;

use thiserror::Error;
use tracing::warn;
use tree_sitter::{Node, Parser};

#[derive(Debug, Error)]
pub enum ImportParseError {
    #[error("failed to load python grammar: {0}")]
    Language(String),

    #[error("parser produced no tree")]
    NoTree,

    #[error("code has syntax errors")]
    Syntax,
}

/// One imported name. `import a.b as c` and `from a import b as c` both
/// flatten to a single entry per name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Dotted module path of a `from` import; empty for plain `import`.
    pub module: Vec<String>,
    pub name: Vec<String>,
    pub alias: Option<String>,
}

impl fmt::Display for Import {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_empty() {
            write!(f, "from {} ", self.module.join("."))?;
        }
        write!(f, "import {}", self.name.join("."))?;
        if let Some(alias) = &self.alias {
            write!(f, " as {alias}")?;
        }
        Ok(())
    }
}

/// Imports at module level, in source order. Nested imports are ignored.
pub fn parse_imports(code: &str) -> Result<Vec<Import>, ImportParseError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ImportParseError::Language(e.to_string()))?;
    let tree = parser.parse(code, None).ok_or(ImportParseError::NoTree)?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(ImportParseError::Syntax);
    }

    let mut imports = Vec::new();
    let mut cursor = root.walk();
    for node in root.children(&mut cursor) {
        let module = match node.kind() {
            "import_statement" => Vec::new(),
            "import_from_statement" => node
                .child_by_field_name("module_name")
                .map(|m| dotted(&text(&m, code)))
                .unwrap_or_default(),
            "future_import_statement" => vec!["__future__".to_string()],
            _ => continue,
        };

        let mut names = node.walk();
        let wildcard = node
            .children(&mut names)
            .any(|c| c.kind() == "wildcard_import");
        if wildcard {
            imports.push(Import {
                module,
                name: vec!["*".to_string()],
                alias: None,
            });
            continue;
        }

        let mut names = node.walk();
        for name_node in node.children_by_field_name("name", &mut names) {
            let (name, alias) = if name_node.kind() == "aliased_import" {
                (
                    name_node.child_by_field_name("name"),
                    name_node
                        .child_by_field_name("alias")
                        .map(|a| text(&a, code)),
                )
            } else {
                (Some(name_node), None)
            };
            let Some(name) = name else { continue };
            imports.push(Import {
                module: module.clone(),
                name: dotted(&text(&name, code)),
                alias,
            });
        }
    }
    Ok(imports)
}

/// Prepend original imports missing from `updated`, in their original order.
///
/// If either side fails to parse, `updated` is returned unchanged.
pub fn reconcile_imports(original: &str, updated: &str) -> String {
    let (old, new) = match (parse_imports(original), parse_imports(updated)) {
        (Ok(old), Ok(new)) => (old, new),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "could not parse imports, keeping updated code as is");
            return updated.to_string();
        }
    };

    let mut missing: Vec<&Import> = Vec::new();
    for import in &old {
        if !new.contains(import) && !missing.contains(&import) {
            missing.push(import);
        }
    }
    if missing.is_empty() {
        return updated.to_string();
    }

    let mut out = String::new();
    for import in missing {
        out.push_str(&import.to_string());
        out.push('\n');
    }
    out.push_str(updated);
    out
}

fn text(node: &Node, code: &str) -> String {
    code[node.start_byte()..node.end_byte()].to_string()
}

fn dotted(path: &str) -> Vec<String> {
    path.split('.').map(|p| p.trim().to_string()).collect()
}
