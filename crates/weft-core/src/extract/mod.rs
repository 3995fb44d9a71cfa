//! Per-language extraction.
//!
//! Provides an [`Extractor`] trait that every language implements, with
//! tree-sitter based implementations for C#, Go, Java and Python.
//!
//! ## Passes
//!
//! 1. [`Extractor::declarations`] - namespace context, imports, types and
//!    callables of one file
//! 2. [`SymbolIndex::build`] - merges every file's declarations and
//!    resolves written type names in their declaring file's import context
//! 3. [`emit::file_facts`] - nodes, base relationships and classified call
//!    sites of one file, driven by [`Extractor::relationships`] and
//!    [`Extractor::call_sites`]
//!
//! Extractors never touch the graph; they only produce facts.

mod capability;
mod classify;
mod csharp;
pub mod emit;
mod error;
mod go;
mod java;
mod python;
mod registry;
mod source;
mod symbols;

pub use capability::{Capabilities, DataAccess, HttpClientType, HttpFunction, ReturnRule};
pub use classify::{ArgValue, CallShape, CallSite, ChainLink, Classified, Receiver};
pub use csharp::CSharpExtractor;
pub use error::ExtractError;
pub use go::GoExtractor;
pub use java::JavaExtractor;
pub use python::PythonExtractor;
pub use registry::ExtractorRegistry;
pub use source::SourceFile;
pub use symbols::{
    qualify, CallableDecl, CallableSymbol, FieldDecl, FieldSymbol, FileDeclarations, Import,
    Owner, OwnerRef, Param, SymbolIndex, TypeDecl, TypeKind, TypeRef, TypeSymbol,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::graph::{Label, Relationship};

/// Supported source languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    CSharp,
    Go,
    Java,
    Python,
}

impl Language {
    pub const ALL: [Language; 4] = [Language::CSharp, Language::Go, Language::Java, Language::Python];

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Language::CSharp => "C#",
            Language::Go => "Go",
            Language::Java => "Java",
            Language::Python => "Python",
        }
    }

    /// File extensions, without the leading dot.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::CSharp => &["cs"],
            Language::Go => &["go"],
            Language::Java => &["java"],
            Language::Python => &["py"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csharp" | "c#" | "cs" | "dotnet" => Ok(Language::CSharp),
            "go" | "golang" => Ok(Language::Go),
            "java" => Ok(Language::Java),
            "python" | "py" => Ok(Language::Python),
            other => Err(format!(
                "unsupported language '{}' (expected csharp, go, java or python)",
                other
            )),
        }
    }
}

/// Labels one language writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSet {
    pub namespace: Label,
    pub class: Label,
    pub interface: Label,
    pub structure: Label,
    pub method: Label,
    pub function: Label,
}

impl LabelSet {
    pub fn for_kind(&self, kind: TypeKind) -> Label {
        match kind {
            TypeKind::Class => self.class,
            TypeKind::Interface => self.interface,
            TypeKind::Struct => self.structure,
        }
    }

    /// Every label a run of this language can create, root and shared
    /// nodes included. Used to declare uniqueness constraints.
    pub fn all(&self) -> Vec<Label> {
        let mut labels = vec![
            Label::Root,
            self.namespace,
            self.class,
            self.interface,
            self.structure,
            self.method,
            self.function,
            Label::ExternalService,
            Label::Collection,
        ];
        labels.sort();
        labels.dedup();
        labels
    }
}

/// Run-wide settings extraction needs.
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub project: String,
    pub source_url_base: String,
    pub resource_store: String,
    pub resource_database: String,
}

/// Resolution context: the index plus where in the source we are.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub index: &'a SymbolIndex,
    pub file: &'a FileDeclarations,
    /// Namespace the code being resolved sits in.
    pub namespace: &'a str,
    /// Qualified name of the enclosing type, if any.
    pub owner: Option<&'a str>,
    pub capabilities: &'static Capabilities,
    pub settings: &'a ExtractSettings,
}

impl<'a> Scope<'a> {
    pub fn new(
        index: &'a SymbolIndex,
        file: &'a FileDeclarations,
        capabilities: &'static Capabilities,
        settings: &'a ExtractSettings,
    ) -> Self {
        Self {
            index,
            file,
            namespace: &file.namespace,
            owner: None,
            capabilities,
            settings,
        }
    }

    pub fn within(self, namespace: &'a str, owner: Option<&'a str>) -> Self {
        Self {
            namespace,
            owner,
            ..self
        }
    }

    /// Enclosing types, then namespaces a simple name is looked up in,
    /// innermost first. The default namespace comes last.
    pub fn enclosing(&self) -> Vec<String> {
        let mut scopes = Vec::new();
        if let Some(owner) = self.owner {
            let mut current = owner;
            loop {
                scopes.push(current.to_string());
                match current.rsplit_once('.') {
                    Some((parent, _)) if parent.len() >= self.namespace.len() && parent != self.namespace => {
                        current = parent
                    }
                    _ => break,
                }
            }
        }
        let mut namespace = self.namespace;
        loop {
            scopes.push(namespace.to_string());
            match namespace.rsplit_once('.') {
                Some((parent, _)) => namespace = parent,
                None => break,
            }
        }
        if !self.namespace.is_empty() {
            scopes.push(String::new());
        }
        scopes
    }
}

/// A base-type relationship of one declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRelation {
    pub relationship: Relationship,
    /// Qualified name of the target type.
    pub target: String,
}

/// Capability contract every language extractor satisfies.
pub trait Extractor: Send + Sync {
    fn language(&self) -> Language;

    /// Tree-sitter grammar.
    fn grammar(&self) -> tree_sitter::Language;

    fn labels(&self) -> LabelSet;

    /// HTTP and data-access types this language's ecosystem provides.
    fn capabilities(&self) -> &'static Capabilities;

    /// Whether a discovered file belongs to this language.
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.language()
                    .extensions()
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Parse one file. Syntax errors fail the file.
    fn parse(&self, path: &str, content: String) -> Result<SourceFile, ExtractError> {
        SourceFile::parse(&self.grammar(), path, content)
    }

    /// Namespace context, imports, types and callables of one file.
    fn declarations(&self, file: &SourceFile) -> FileDeclarations;

    /// Bind a written type name in the given scope.
    fn resolve_type(&self, raw: &str, scope: &Scope<'_>) -> TypeRef;

    /// Final kind of a type once its bases are resolved.
    fn refine_kind(&self, decl: &TypeDecl, _bases: &[TypeRef]) -> TypeKind {
        decl.kind
    }

    /// `INHERITS_FROM` / `IMPLEMENTS` relationships of a declared type.
    fn relationships(&self, ty: &TypeSymbol, scope: &Scope<'_>) -> Vec<TypeRelation> {
        declared_base_relations(ty, scope)
    }

    /// Classified call sites inside one callable's body.
    fn call_sites(&self, callable: &CallableDecl, file: &SourceFile, scope: &Scope<'_>) -> Vec<Classified>;
}

/// Relationship typing shared by every language: the resolved kind of both
/// ends decides between `IMPLEMENTS` and `INHERITS_FROM`.
pub fn declared_base_relations(ty: &TypeSymbol, scope: &Scope<'_>) -> Vec<TypeRelation> {
    ty.bases
        .iter()
        .filter_map(|base| match base {
            TypeRef::Declared(target) => scope.index.type_symbol(target).map(|symbol| {
                let relationship = if symbol.kind == TypeKind::Interface && ty.kind != TypeKind::Interface {
                    Relationship::Implements
                } else {
                    Relationship::InheritsFrom
                };
                TypeRelation {
                    relationship,
                    target: target.clone(),
                }
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!("CSharp".parse::<Language>(), Ok(Language::CSharp));
        assert_eq!("golang".parse::<Language>(), Ok(Language::Go));
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn test_language_serde_names() {
        let json = serde_json::to_string(&Language::CSharp).unwrap();
        assert_eq!(json, "\"csharp\"");
    }

    #[test]
    fn test_label_set_dedups() {
        let labels = CSharpExtractor::new().labels().all();
        assert!(labels.contains(&Label::Root));
        assert!(labels.contains(&Label::Collection));
        let mut sorted = labels.clone();
        sorted.dedup();
        assert_eq!(labels, sorted);
    }
}
