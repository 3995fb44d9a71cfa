//! Declarations and the run-wide symbol index.
//!
//! The first extraction pass turns every file into [`FileDeclarations`].
//! [`SymbolIndex::build`] merges them and resolves every written type name
//! (bases, field types, return types) in the scope of its declaring file, so
//! that the second pass can bind call receivers across files.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;

use super::{ExtractSettings, Extractor, LabelSet, Scope};
use crate::graph::NodeRef;
use crate::identity::{self, Identity, DEFAULT_NAMESPACE};

/// Kind of a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
}

/// A written type name after binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A type declared in the scanned project, by qualified name.
    Declared(String),
    /// A type from outside the project. `name` is `*` for "some type of
    /// that namespace", which is how data-access chains propagate.
    External { namespace: String, name: String },
    /// A module or package used as a value (Python modules, Go packages).
    Module(String),
    Unknown,
}

impl TypeRef {
    pub fn external(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeRef::External {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeRef::Unknown)
    }

    pub fn or_else(self, f: impl FnOnce() -> TypeRef) -> TypeRef {
        if self.is_unknown() {
            f()
        } else {
            self
        }
    }
}

/// A parameter as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub type_name: String,
    /// Has a default value.
    pub optional: bool,
    /// Accepts any number of trailing arguments.
    pub variadic: bool,
}

/// A field, property or constant as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    pub type_name: Option<String>,
    /// String value for constants initialized with a literal.
    pub value: Option<String>,
    /// Collection name when the field is assigned a data-access lookup.
    pub resource: Option<String>,
}

impl FieldDecl {
    pub fn new(name: impl Into<String>, type_name: Option<String>) -> Self {
        Self {
            name: name.into(),
            type_name,
            value: None,
            resource: None,
        }
    }
}

/// A type declaration as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub namespace: String,
    /// Simple name; nested types are dotted (`Outer.Inner`).
    pub name: String,
    pub kind: TypeKind,
    pub bases: Vec<String>,
    pub fields: Vec<FieldDecl>,
    pub line: u32,
}

impl TypeDecl {
    pub fn qualified(&self) -> String {
        qualify(&self.namespace, &self.name)
    }
}

/// Who declares a callable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    /// A type of the callable's namespace, by (possibly dotted) simple name.
    Type(String),
    /// The namespace itself (Go functions, Python module functions).
    Namespace,
}

/// Resolved owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerRef {
    Type(String),
    Namespace(String),
}

/// A method, constructor or free function as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableDecl {
    pub name: String,
    pub namespace: String,
    pub owner: Owner,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    pub line: u32,
    /// Byte range of the declaring node, to find it again in pass two.
    pub span: Range<usize>,
}

impl CallableDecl {
    pub fn owner_ref(&self) -> OwnerRef {
        match &self.owner {
            Owner::Type(name) => OwnerRef::Type(qualify(&self.namespace, name)),
            Owner::Namespace => OwnerRef::Namespace(self.namespace.clone()),
        }
    }

    pub fn owner_type(&self) -> Option<String> {
        match &self.owner {
            Owner::Type(name) => Some(qualify(&self.namespace, name)),
            Owner::Namespace => None,
        }
    }

    pub fn parameter_types(&self) -> Vec<String> {
        self.params.iter().map(|p| p.type_name.clone()).collect()
    }

    pub fn signature(&self) -> String {
        identity::signature(&self.name, &self.parameter_types())
    }
}

/// An import, using or package reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Imported path (`System.Net.Http`, `net/http`, `app.models.User`).
    pub path: String,
    /// Local binding, when the import introduces one.
    pub alias: Option<String>,
    /// Brings every member of `path` into scope.
    pub wildcard: bool,
    /// Applies to every file of the project (C# `global using`).
    pub global: bool,
    /// Imports members of a type rather than types (Java `import static`).
    pub member: bool,
}

impl Import {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            alias: None,
            wildcard: false,
            global: false,
            member: false,
        }
    }

    pub fn wildcard(mut self) -> Self {
        self.wildcard = true;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn member(mut self) -> Self {
        self.member = true;
        self
    }
}

/// Everything the first pass learns from one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDeclarations {
    pub path: String,
    /// Primary namespace; empty for the default namespace.
    pub namespace: String,
    /// Every namespace the file contributes to (C# files can open several).
    pub namespaces: Vec<String>,
    /// Declared package name when it differs from the namespace path (Go).
    pub package_name: Option<String>,
    pub imports: Vec<Import>,
    pub types: Vec<TypeDecl>,
    pub callables: Vec<CallableDecl>,
    /// Namespace-level constants.
    pub constants: Vec<FieldDecl>,
}

impl FileDeclarations {
    pub fn new(path: impl Into<String>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            path: path.into(),
            namespaces: vec![namespace.clone()],
            namespace,
            ..Default::default()
        }
    }

    pub fn add_namespace(&mut self, namespace: &str) {
        if !self.namespaces.iter().any(|n| n == namespace) {
            self.namespaces.push(namespace.to_string());
        }
    }
}

/// A resolved field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSymbol {
    pub ty: TypeRef,
    pub value: Option<String>,
    pub resource: Option<String>,
}

/// A declared type with its bases and fields resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSymbol {
    pub namespace: String,
    pub name: String,
    pub kind: TypeKind,
    pub file: String,
    pub line: u32,
    pub bases: Vec<TypeRef>,
    pub fields: HashMap<String, FieldSymbol>,
}

impl TypeSymbol {
    pub fn qualified(&self) -> String {
        qualify(&self.namespace, &self.name)
    }
}

/// A declared callable with its return type resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallableSymbol {
    pub name: String,
    pub owner: OwnerRef,
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    pub signature: String,
    pub file: String,
    pub line: u32,
}

#[derive(Debug, Default)]
struct NamespaceInfo {
    /// Declared by a scanned file, not just a parent of one.
    declared: bool,
    package_name: Option<String>,
    constants: HashMap<String, String>,
    /// Typed namespace-level variables (Python module globals).
    variables: HashMap<String, FieldSymbol>,
}

/// Run-wide index of declarations.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    types: HashMap<String, TypeSymbol>,
    callables: Vec<CallableSymbol>,
    by_owner: HashMap<OwnerRef, Vec<usize>>,
    by_signature: HashMap<(OwnerRef, String), usize>,
    namespaces: HashMap<String, NamespaceInfo>,
    global_imports: Vec<Import>,
}

/// `namespace.name`, or just `name` in the default namespace.
pub fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() || namespace == DEFAULT_NAMESPACE {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

/// Namespace path as keyed in the graph.
pub fn namespace_path(namespace: &str) -> &str {
    if namespace.is_empty() {
        DEFAULT_NAMESPACE
    } else {
        namespace
    }
}

impl SymbolIndex {
    /// Merge every file's declarations and resolve written type names.
    /// `files` should be sorted by path so duplicate declarations resolve to
    /// the same winner every run.
    pub fn build(extractor: &dyn Extractor, files: &[FileDeclarations], settings: &ExtractSettings) -> Self {
        let mut index = SymbolIndex::default();
        for file in files {
            index.register(file);
        }

        let capabilities = extractor.capabilities();
        let mut resolved_types = Vec::new();
        let mut resolved_returns = Vec::new();
        let mut resolved_variables = Vec::new();
        for file in files {
            let base_scope = Scope::new(&index, file, capabilities, settings);

            for constant in &file.constants {
                if constant.type_name.is_none() && constant.resource.is_none() {
                    continue;
                }
                let ty = constant
                    .type_name
                    .as_deref()
                    .map(|raw| extractor.resolve_type(raw, &base_scope))
                    .unwrap_or(TypeRef::Unknown);
                resolved_variables.push((
                    file.namespace.clone(),
                    constant.name.clone(),
                    FieldSymbol {
                        ty,
                        value: constant.value.clone(),
                        resource: constant.resource.clone(),
                    },
                ));
            }

            for decl in &file.types {
                let qualified = decl.qualified();
                let scope = base_scope.within(&decl.namespace, Some(&qualified));
                let bases: Vec<TypeRef> = decl
                    .bases
                    .iter()
                    .map(|raw| extractor.resolve_type(raw, &scope))
                    .collect();
                let fields: Vec<(String, FieldSymbol)> = decl
                    .fields
                    .iter()
                    .map(|field| {
                        let ty = field
                            .type_name
                            .as_deref()
                            .map(|raw| extractor.resolve_type(raw, &scope))
                            .unwrap_or(TypeRef::Unknown);
                        (
                            field.name.clone(),
                            FieldSymbol {
                                ty,
                                value: field.value.clone(),
                                resource: field.resource.clone(),
                            },
                        )
                    })
                    .collect();
                let kind = extractor.refine_kind(decl, &bases);
                resolved_types.push((qualified, kind, bases, fields));
            }

            for decl in &file.callables {
                let owner = decl.owner_type();
                let scope = base_scope.within(&decl.namespace, owner.as_deref());
                let return_type = decl
                    .return_type
                    .as_deref()
                    .map(|raw| extractor.resolve_type(raw, &scope))
                    .unwrap_or(TypeRef::Unknown);
                resolved_returns.push((decl.owner_ref(), decl.signature(), return_type));
            }
        }

        for (qualified, kind, bases, fields) in resolved_types {
            if let Some(symbol) = index.types.get_mut(&qualified) {
                symbol.kind = kind;
                for base in bases {
                    if !symbol.bases.contains(&base) && base != TypeRef::Declared(qualified.clone()) {
                        symbol.bases.push(base);
                    }
                }
                for (name, field) in fields {
                    symbol.fields.entry(name).or_insert(field);
                }
            }
        }
        for (namespace, name, variable) in resolved_variables {
            if let Some(info) = index.namespaces.get_mut(&namespace) {
                info.variables.entry(name).or_insert(variable);
            }
        }
        for (owner, signature, return_type) in resolved_returns {
            if let Some(&idx) = index.by_signature.get(&(owner, signature)) {
                if index.callables[idx].return_type.is_unknown() {
                    index.callables[idx].return_type = return_type;
                }
            }
        }

        index
    }

    fn register(&mut self, file: &FileDeclarations) {
        for namespace in &file.namespaces {
            self.register_namespace(namespace, file.package_name.clone());
        }
        for import in file.imports.iter().filter(|i| i.global) {
            if !self.global_imports.contains(import) {
                self.global_imports.push(import.clone());
            }
        }
        for constant in &file.constants {
            if let Some(value) = &constant.value {
                self.register_namespace(&file.namespace, None)
                    .constants
                    .entry(constant.name.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        for decl in &file.types {
            self.register_namespace(&decl.namespace, None);
            // Partial declarations keep the first file's location.
            self.types.entry(decl.qualified()).or_insert_with(|| TypeSymbol {
                namespace: decl.namespace.clone(),
                name: decl.name.clone(),
                kind: decl.kind,
                file: file.path.clone(),
                line: decl.line,
                bases: Vec::new(),
                fields: HashMap::new(),
            });
        }

        for decl in &file.callables {
            let owner = decl.owner_ref();
            let signature = decl.signature();
            let key = (owner.clone(), signature.clone());
            if self.by_signature.contains_key(&key) {
                continue;
            }
            let idx = self.callables.len();
            self.callables.push(CallableSymbol {
                name: decl.name.clone(),
                owner: owner.clone(),
                params: decl.params.clone(),
                return_type: TypeRef::Unknown,
                signature,
                file: file.path.clone(),
                line: decl.line,
            });
            self.by_owner.entry(owner).or_default().push(idx);
            self.by_signature.insert(key, idx);
        }
    }

    fn register_namespace(&mut self, namespace: &str, package_name: Option<String>) -> &mut NamespaceInfo {
        // Parents of dotted namespaces resolve `using A;` against `A.B` types.
        let mut parent = namespace;
        while let Some((head, _)) = parent.rsplit_once('.') {
            self.namespaces.entry(head.to_string()).or_default();
            parent = head;
        }
        let info = self.namespaces.entry(namespace.to_string()).or_default();
        info.declared = true;
        if info.package_name.is_none() {
            info.package_name = package_name;
        }
        info
    }

    pub fn type_symbol(&self, qualified: &str) -> Option<&TypeSymbol> {
        self.types.get(qualified)
    }

    pub fn has_type(&self, qualified: &str) -> bool {
        self.types.contains_key(qualified)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeSymbol> {
        self.types.values()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    /// The declared namespace that `path` names, allowing either one to be a
    /// separator-bounded suffix of the other. Import paths carry module
    /// prefixes (`github.com/acme/svc/internal/db`) and scan roots add
    /// directory prefixes (`src.app.models`). The longest match wins; ties
    /// are ambiguous.
    pub fn namespace_by_suffix(&self, path: &str, separator: char) -> Option<&str> {
        if self.namespaces.get(path).is_some_and(|n| n.declared) {
            return self.namespaces.get_key_value(path).map(|(k, _)| k.as_str());
        }
        let bounded = |long: &str, short: &str| {
            long.len() > short.len()
                && long.ends_with(short)
                && long[..long.len() - short.len()].ends_with(separator)
        };
        let mut best: Option<&str> = None;
        let mut tied = false;
        for (namespace, info) in &self.namespaces {
            if !info.declared || namespace.is_empty() {
                continue;
            }
            if bounded(path, namespace) || bounded(namespace, path) {
                match best {
                    Some(current) if current.len() == namespace.len() => tied = true,
                    Some(current) if current.len() > namespace.len() => {}
                    _ => {
                        best = Some(namespace.as_str());
                        tied = false;
                    }
                }
            }
        }
        if tied {
            None
        } else {
            best
        }
    }

    pub fn package_name(&self, namespace: &str) -> Option<&str> {
        self.namespaces
            .get(namespace)
            .and_then(|n| n.package_name.as_deref())
    }

    pub fn constant(&self, namespace: &str, name: &str) -> Option<&str> {
        self.namespaces
            .get(namespace)
            .and_then(|n| n.constants.get(name))
            .map(String::as_str)
    }

    /// A typed namespace-level variable.
    pub fn variable(&self, namespace: &str, name: &str) -> Option<&FieldSymbol> {
        self.namespaces
            .get(namespace)
            .and_then(|n| n.variables.get(name))
    }

    pub fn global_imports(&self) -> &[Import] {
        &self.global_imports
    }

    pub fn callable(&self, idx: usize) -> &CallableSymbol {
        &self.callables[idx]
    }

    pub fn find_callable(&self, owner: &OwnerRef, signature: &str) -> Option<usize> {
        self.by_signature
            .get(&(owner.clone(), signature.to_string()))
            .copied()
    }

    /// Callables named `name` declared directly by `owner`.
    pub fn owned(&self, owner: &OwnerRef, name: &str) -> Vec<usize> {
        self.by_owner
            .get(owner)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|&i| self.callables[i].name == name)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Names of the methods a type declares directly.
    pub fn method_names(&self, qualified: &str) -> HashSet<&str> {
        self.by_owner
            .get(&OwnerRef::Type(qualified.to_string()))
            .map(|ids| ids.iter().map(|&i| self.callables[i].name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Methods named `name` on a type, searching its declared bases
    /// nearest-first. The first level that has any wins.
    pub fn methods(&self, qualified: &str, name: &str) -> Vec<usize> {
        for ty in self.lineage(qualified) {
            let found = self.owned(&OwnerRef::Type(ty), name);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// Free functions named `name` in a namespace.
    pub fn functions(&self, namespace: &str, name: &str) -> Vec<usize> {
        self.owned(&OwnerRef::Namespace(namespace.to_string()), name)
    }

    /// A field of a type or of its declared bases.
    pub fn field(&self, qualified: &str, name: &str) -> Option<&FieldSymbol> {
        self.lineage(qualified)
            .into_iter()
            .find_map(|ty| self.types.get(&ty).and_then(|t| t.fields.get(name)))
    }

    /// The type itself followed by its declared bases, breadth-first.
    pub fn lineage(&self, qualified: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([qualified.to_string()]);
        while let Some(ty) = queue.pop_front() {
            if !seen.insert(ty.clone()) {
                continue;
            }
            if let Some(symbol) = self.types.get(&ty) {
                for base in &symbol.bases {
                    if let TypeRef::Declared(next) = base {
                        queue.push_back(next.clone());
                    }
                }
            }
            order.push(ty);
        }
        order
    }

    /// External types a declared type derives from, at any depth.
    pub fn external_bases(&self, qualified: &str) -> Vec<&TypeRef> {
        self.lineage(qualified)
            .iter()
            .filter_map(|ty| self.types.get(ty))
            .flat_map(|symbol| symbol.bases.iter())
            .filter(|base| matches!(base, TypeRef::External { .. }))
            .collect()
    }

    pub fn type_node(&self, symbol: &TypeSymbol, project: &str, labels: &LabelSet) -> NodeRef {
        NodeRef::new(
            labels.for_kind(symbol.kind),
            Identity::Type {
                project,
                namespace: &symbol.namespace,
                name: &symbol.name,
            }
            .key(),
        )
    }

    pub fn owner_node(&self, owner: &OwnerRef, project: &str, labels: &LabelSet) -> Option<NodeRef> {
        match owner {
            OwnerRef::Type(qualified) => self
                .types
                .get(qualified)
                .map(|symbol| self.type_node(symbol, project, labels)),
            OwnerRef::Namespace(namespace) => Some(namespace_node(project, namespace, labels)),
        }
    }

    pub fn callable_node(&self, idx: usize, project: &str, labels: &LabelSet) -> Option<NodeRef> {
        let symbol = self.callables.get(idx)?;
        let owner = self.owner_node(&symbol.owner, project, labels)?;
        let label = match symbol.owner {
            OwnerRef::Type(_) => labels.method,
            OwnerRef::Namespace(_) => labels.function,
        };
        Some(NodeRef::new(label, format!("{}.{}", owner.key, symbol.signature)))
    }
}

pub fn namespace_node(project: &str, namespace: &str, labels: &LabelSet) -> NodeRef {
    NodeRef::new(
        labels.namespace,
        Identity::Namespace {
            project,
            path: namespace_path(namespace),
        }
        .key(),
    )
}
