//! Go extractor using tree-sitter.
//!
//! A package is the directory a file sits in, relative to the scan root.
//! Methods belong to their receiver's type wherever they are declared, and
//! interface satisfaction is structural.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tree_sitter::Node;

use super::capability::{self, Capabilities};
use super::classify::{self, ArgValue, CallShape, ChainLink, Classified, Receiver};
use super::source::{children, children_of_kind, line, unquote, walk, SourceFile};
use super::symbols::{
    qualify, CallableDecl, FieldDecl, FileDeclarations, Import, Owner, Param, SymbolIndex, TypeDecl, TypeKind, TypeRef,
    TypeSymbol,
};
use super::{declared_base_relations, Extractor, Language, LabelSet, Scope, TypeRelation};
use crate::graph::{Label, Relationship};

const CALLABLE_KINDS: &[&str] = &["function_declaration", "method_declaration"];

const BUILTIN_FUNCTIONS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make", "max", "min", "new",
    "panic", "print", "println", "real", "recover",
];

const BUILTIN_TYPES: &[&str] = &[
    "any", "bool", "byte", "complex64", "complex128", "error", "float32", "float64", "int", "int8", "int16",
    "int32", "int64", "rune", "string", "uint", "uint8", "uint16", "uint32", "uint64", "uintptr",
];

/// Package-level variables of external packages with a known type.
const PACKAGE_VALUES: &[(&str, &str, &str)] = &[("net/http", "DefaultClient", "Client")];

/// Go extractor using tree-sitter.
pub struct GoExtractor {
    grammar: tree_sitter::Language,
}

impl GoExtractor {
    pub fn new() -> Self {
        Self {
            grammar: tree_sitter_go::LANGUAGE.into(),
        }
    }

    fn extract_types(&self, node: &Node, file: &SourceFile, namespace: &str, out: &mut FileDeclarations) {
        for spec in children_of_kind(node, &["type_spec", "type_alias"]) {
            let (Some(name), Some(ty)) = (spec.child_by_field_name("name"), spec.child_by_field_name("type")) else {
                continue;
            };
            let name = file.text(&name).to_string();
            let mut bases = Vec::new();
            let mut fields = Vec::new();
            let kind = match ty.kind() {
                "interface_type" => {
                    for element in children(&ty) {
                        match element.kind() {
                            "method_elem" | "method_spec" => {
                                if let Some(method) = self.interface_method(&element, file, namespace, &name) {
                                    out.callables.push(method);
                                }
                            }
                            "type_elem" | "constraint_elem" => {
                                bases.extend(
                                    children(&element)
                                        .iter()
                                        .filter(|t| matches!(t.kind(), "type_identifier" | "qualified_type"))
                                        .map(|t| file.text(t).to_string()),
                                );
                            }
                            "type_identifier" | "qualified_type" => bases.push(file.text(&element).to_string()),
                            _ => {}
                        }
                    }
                    TypeKind::Interface
                }
                "struct_type" => {
                    for list in children_of_kind(&ty, &["field_declaration_list"]) {
                        for field in children_of_kind(&list, &["field_declaration"]) {
                            let Some(field_type) = field.child_by_field_name("type") else {
                                continue;
                            };
                            let type_text = file.text(&field_type).to_string();
                            let names = field_names(&field, file);
                            if names.is_empty() {
                                // Embedded: promoted fields and methods.
                                let embedded = type_text.trim_start_matches('*').to_string();
                                let simple = embedded.rsplit('.').next().unwrap_or(&embedded).to_string();
                                fields.push(FieldDecl::new(simple, Some(embedded.clone())));
                                bases.push(embedded);
                            } else {
                                fields.extend(names.into_iter().map(|n| FieldDecl::new(n, Some(type_text.clone()))));
                            }
                        }
                    }
                    TypeKind::Struct
                }
                // Named non-struct types still own methods.
                _ => TypeKind::Struct,
            };
            out.types.push(TypeDecl {
                namespace: namespace.to_string(),
                name,
                kind,
                bases,
                fields,
                line: line(&spec),
            });
        }
    }

    fn interface_method(&self, node: &Node, file: &SourceFile, namespace: &str, owner: &str) -> Option<CallableDecl> {
        let name = file.text(&node.child_by_field_name("name")?).to_string();
        Some(CallableDecl {
            name,
            namespace: namespace.to_string(),
            owner: Owner::Type(owner.to_string()),
            params: parameters(node.child_by_field_name("parameters"), file),
            return_type: result_type(node, file),
            line: line(node),
            span: node.byte_range(),
        })
    }

    fn extract_callable(&self, node: &Node, file: &SourceFile, namespace: &str) -> Option<CallableDecl> {
        let name = file.text(&node.child_by_field_name("name")?).to_string();
        let owner = match node.child_by_field_name("receiver") {
            Some(receiver) => Owner::Type(receiver_type(&receiver, file)?),
            None => Owner::Namespace,
        };
        Some(CallableDecl {
            name,
            namespace: namespace.to_string(),
            owner,
            params: parameters(node.child_by_field_name("parameters"), file),
            return_type: result_type(node, file),
            line: line(node),
            span: node.byte_range(),
        })
    }
}

impl Default for GoExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for GoExtractor {
    fn language(&self) -> Language {
        Language::Go
    }

    fn grammar(&self) -> tree_sitter::Language {
        self.grammar.clone()
    }

    fn labels(&self) -> LabelSet {
        LabelSet {
            namespace: Label::Package,
            class: Label::Struct,
            interface: Label::Interface,
            structure: Label::Struct,
            method: Label::Method,
            function: Label::Function,
        }
    }

    fn capabilities(&self) -> &'static Capabilities {
        &capability::GO
    }

    fn accepts(&self, path: &Path) -> bool {
        let is_go = path.extension().and_then(|e| e.to_str()) == Some("go");
        let is_test = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("_test.go"));
        is_go && !is_test
    }

    fn declarations(&self, file: &SourceFile) -> FileDeclarations {
        let namespace = package_dir(file.path());
        let mut decls = FileDeclarations::new(file.path(), namespace.clone());
        let root = file.root();

        let mut resources: HashMap<(String, String), String> = HashMap::new();
        for child in children(&root) {
            match child.kind() {
                "package_clause" => {
                    decls.package_name = children(&child).first().map(|n| file.text(n).to_string());
                }
                "import_declaration" => {
                    let mut specs = children_of_kind(&child, &["import_spec"]);
                    for list in children_of_kind(&child, &["import_spec_list"]) {
                        specs.extend(children_of_kind(&list, &["import_spec"]));
                    }
                    decls.imports.extend(specs.iter().filter_map(|spec| extract_import(spec, file)));
                }
                "type_declaration" => self.extract_types(&child, file, &namespace, &mut decls),
                "const_declaration" => {
                    for spec in children_of_kind(&child, &["const_spec"]) {
                        decls.constants.extend(string_constants(&spec, file));
                    }
                }
                kind if CALLABLE_KINDS.contains(&kind) => {
                    if let Some(callable) = self.extract_callable(&child, file, &namespace) {
                        decls.callables.push(callable);
                    }
                }
                _ => {}
            }
        }

        // Struct fields initialized with a collection lookup in a literal:
        // `&Store{coll: db.Collection("users")}`.
        walk(root, &mut |n| {
            if n.kind() == "composite_literal" {
                collect_literal_resources(n, file, &mut resources);
            }
            true
        });
        for ty in &mut decls.types {
            for field in &mut ty.fields {
                if let Some(resource) = resources.get(&(ty.name.clone(), field.name.clone())) {
                    field.resource = Some(resource.clone());
                }
            }
        }
        decls
    }

    fn resolve_type(&self, raw: &str, scope: &Scope<'_>) -> TypeRef {
        let name = bare_type(raw);
        if name.is_empty() || BUILTIN_TYPES.contains(&name.as_str()) {
            return TypeRef::Unknown;
        }
        let index = scope.index;
        if let Some((package, simple)) = name.split_once('.') {
            return match package_target(package, scope) {
                Some(PackageTarget::Project(namespace)) => {
                    let qualified = qualify(&namespace, simple);
                    if index.has_type(&qualified) {
                        TypeRef::Declared(qualified)
                    } else {
                        TypeRef::Unknown
                    }
                }
                Some(PackageTarget::External(path)) => TypeRef::external(path, simple),
                None => TypeRef::Unknown,
            };
        }

        let local = qualify(scope.namespace, &name);
        if index.has_type(&local) {
            return TypeRef::Declared(local);
        }
        // Dot imports.
        for import in scope.file.imports.iter().filter(|i| i.wildcard) {
            if let Some(namespace) = project_package(&import.path, scope) {
                let qualified = qualify(namespace, &name);
                if index.has_type(&qualified) {
                    return TypeRef::Declared(qualified);
                }
            } else if scope.capabilities.knows(&import.path, &name) {
                return TypeRef::external(import.path.clone(), name);
            }
        }
        TypeRef::Unknown
    }

    /// Embedded types, plus every project interface whose method set the
    /// type's method set covers.
    fn relationships(&self, ty: &TypeSymbol, scope: &Scope<'_>) -> Vec<TypeRelation> {
        let mut relations = declared_base_relations(ty, scope);
        if ty.kind == TypeKind::Interface {
            return relations;
        }
        let qualified = ty.qualified();
        let methods = method_set(scope.index, &qualified);
        if methods.is_empty() {
            return relations;
        }
        let mut satisfied: Vec<String> = scope
            .index
            .types()
            .filter(|candidate| candidate.kind == TypeKind::Interface)
            .map(TypeSymbol::qualified)
            .filter(|interface| {
                let required = method_set(scope.index, interface);
                !required.is_empty() && required.is_subset(&methods)
            })
            .filter(|interface| !relations.iter().any(|r| &r.target == interface))
            .collect();
        satisfied.sort();
        relations.extend(satisfied.into_iter().map(|target| TypeRelation {
            relationship: Relationship::Implements,
            target,
        }));
        relations
    }

    fn call_sites(&self, callable: &CallableDecl, file: &SourceFile, scope: &Scope<'_>) -> Vec<Classified> {
        let Some(node) = file.find(&callable.span, CALLABLE_KINDS) else {
            return Vec::new();
        };
        let Some(block) = node.child_by_field_name("body") else {
            return Vec::new();
        };
        let mut body = Body {
            extractor: self,
            file,
            scope,
            locals: HashMap::new(),
            consts: HashMap::new(),
            hints: HashMap::new(),
            receiver: None,
        };
        body.bind_receiver(&node);
        body.bind_parameters(&node);
        body.bind_locals(block);

        let mut sites = Vec::new();
        walk(block, &mut |n| {
            if n.kind() == "call_expression" {
                if let Some(shape) = body.shape(n) {
                    sites.push(classify::classify(&shape, scope));
                }
            }
            true
        });
        sites
    }
}

/// Where a package binding points.
enum PackageTarget {
    Project(String),
    External(String),
}

/// The import a package identifier names in this file.
fn package_target(binding: &str, scope: &Scope<'_>) -> Option<PackageTarget> {
    let import = scope
        .file
        .imports
        .iter()
        .filter(|i| !i.wildcard)
        .find(|i| import_binding(i, scope).as_deref() == Some(binding))?;
    Some(match project_package(&import.path, scope) {
        Some(namespace) => PackageTarget::Project(namespace.to_string()),
        None => PackageTarget::External(import.path.clone()),
    })
}

/// The project package an import path names. Paths the capability tables
/// know are never project packages.
fn project_package<'i>(path: &str, scope: &Scope<'i>) -> Option<&'i str> {
    let caps = scope.capabilities;
    let known = caps.data_access(path).is_some()
        || caps.http_functions.iter().any(|f| f.module == path)
        || caps.http_clients.iter().any(|c| c.namespace == path);
    if known {
        return None;
    }
    scope.index.namespace_by_suffix(path, '/')
}

/// Local name an import binds: its alias, the project package's declared
/// name, or the last path element.
fn import_binding(import: &Import, scope: &Scope<'_>) -> Option<String> {
    if let Some(alias) = &import.alias {
        return Some(alias.clone());
    }
    if let Some(name) = project_package(&import.path, scope).and_then(|ns| scope.index.package_name(ns)) {
        return Some(name.to_string());
    }
    Some(default_binding(&import.path))
}

/// `gopkg.in/yaml.v3` binds `yaml`, `github.com/x/mongo/v2` binds `mongo`,
/// `github.com/go-redis/redis` binds `redis`.
fn default_binding(path: &str) -> String {
    let mut segments = path.rsplit('/');
    let mut last = segments.next().unwrap_or(path);
    let is_version = |s: &str| s.len() > 1 && s.starts_with('v') && s[1..].chars().all(|c| c.is_ascii_digit());
    if is_version(last) {
        last = segments.next().unwrap_or(last);
    }
    if let Some((head, tail)) = last.rsplit_once('.') {
        if is_version(tail) {
            last = head;
        }
    }
    last.trim_start_matches("go-").replace('-', "_")
}

fn method_set(index: &SymbolIndex, qualified: &str) -> HashSet<String> {
    index
        .lineage(qualified)
        .iter()
        .flat_map(|ty| index.method_names(ty))
        .map(str::to_string)
        .collect()
}

/// Per-callable resolution state.
struct Body<'a> {
    extractor: &'a GoExtractor,
    file: &'a SourceFile,
    scope: &'a Scope<'a>,
    locals: HashMap<String, TypeRef>,
    consts: HashMap<String, String>,
    hints: HashMap<String, String>,
    receiver: Option<String>,
}

impl<'a> Body<'a> {
    fn resolve(&self, raw: &str) -> TypeRef {
        self.extractor.resolve_type(raw, self.scope)
    }

    fn text(&self, node: &Node) -> &'a str {
        self.file.text(node)
    }

    fn bind_receiver(&mut self, callable: &Node) {
        let Some(owner) = self.scope.owner else {
            return;
        };
        let Some(list) = callable.child_by_field_name("receiver") else {
            return;
        };
        for param in children_of_kind(&list, &["parameter_declaration"]) {
            if let Some(name) = param.child_by_field_name("name") {
                let name = self.text(&name).to_string();
                self.locals.insert(name.clone(), TypeRef::Declared(owner.to_string()));
                self.receiver = Some(name);
            }
        }
    }

    fn bind_parameters(&mut self, callable: &Node) {
        let Some(list) = callable.child_by_field_name("parameters") else {
            return;
        };
        for param in children_of_kind(&list, &["parameter_declaration", "variadic_parameter_declaration"]) {
            let Some(ty) = param.child_by_field_name("type") else {
                continue;
            };
            let resolved = if param.kind() == "variadic_parameter_declaration" {
                TypeRef::Unknown
            } else {
                self.resolve(self.text(&ty))
            };
            for name in field_names(&param, self.file) {
                self.locals.insert(name.to_string(), resolved.clone());
            }
        }
    }

    /// Locals in document order, so `:=` sees earlier bindings.
    fn bind_locals(&mut self, block: Node) {
        let mut declarations = Vec::new();
        walk(block, &mut |n| {
            if matches!(n.kind(), "short_var_declaration" | "var_spec" | "const_spec" | "range_clause") {
                declarations.push(n);
            }
            n.kind() != "func_literal"
        });

        for decl in declarations {
            match decl.kind() {
                "short_var_declaration" => {
                    let (Some(left), Some(right)) = (decl.child_by_field_name("left"), decl.child_by_field_name("right"))
                    else {
                        continue;
                    };
                    let values = children(&right);
                    for (i, name) in children(&left).iter().enumerate() {
                        // `x, err := f()` types only the first result.
                        let ty = match values.get(i) {
                            Some(value) if values.len() > 1 || i == 0 => self.infer(*value),
                            _ => TypeRef::Unknown,
                        };
                        if let Some(resource) = values.get(i).and_then(|v| resource_literal(*v, self.file)) {
                            self.hints.insert(self.text(name).to_string(), resource);
                        }
                        self.locals.insert(self.text(name).to_string(), ty);
                    }
                }
                "var_spec" | "const_spec" => {
                    let declared = decl.child_by_field_name("type").map(|t| self.resolve(self.text(&t)));
                    let values: Vec<Node> = decl
                        .child_by_field_name("value")
                        .map(|list| children(&list))
                        .unwrap_or_default();
                    let names = children_of_kind(&decl, &["identifier"]);
                    for (i, name) in names.iter().enumerate() {
                        let name = self.text(name).to_string();
                        let value = values.get(i).copied();
                        if decl.kind() == "const_spec" {
                            if let Some(literal) = value.and_then(|v| string_value(&v, self.file)) {
                                self.consts.insert(name.clone(), literal);
                            }
                        }
                        if let Some(resource) = value.and_then(|v| resource_literal(v, self.file)) {
                            self.hints.insert(name.clone(), resource);
                        }
                        let ty = match (&declared, value) {
                            (Some(ty), _) => ty.clone(),
                            (None, Some(value)) => self.infer(value),
                            (None, None) => TypeRef::Unknown,
                        };
                        self.locals.insert(name, ty);
                    }
                }
                _ => {
                    if let Some(left) = decl.child_by_field_name("left") {
                        for name in children(&left) {
                            self.locals.insert(self.text(&name).to_string(), TypeRef::Unknown);
                        }
                    }
                }
            }
        }
    }

    fn infer(&self, node: Node) -> TypeRef {
        match node.kind() {
            "identifier" => self.locals.get(self.text(&node)).cloned().unwrap_or(TypeRef::Unknown),
            "selector_expression" => {
                let (Some(operand), Some(field)) = (node.child_by_field_name("operand"), node.child_by_field_name("field"))
                else {
                    return TypeRef::Unknown;
                };
                let name = self.text(&field);
                if let Some(target) = self.package(&operand) {
                    return match target {
                        PackageTarget::External(path) => PACKAGE_VALUES
                            .iter()
                            .find(|(package, value, _)| *package == path && *value == name)
                            .map(|(package, _, ty)| TypeRef::external(*package, *ty))
                            .unwrap_or(TypeRef::Unknown),
                        PackageTarget::Project(_) => TypeRef::Unknown,
                    };
                }
                match self.infer(operand) {
                    TypeRef::Declared(qualified) => self
                        .scope
                        .index
                        .field(&qualified, name)
                        .map(|f| f.ty.clone())
                        .unwrap_or(TypeRef::Unknown),
                    TypeRef::External { namespace, .. } if self.scope.capabilities.data_access(&namespace).is_some() => {
                        TypeRef::external(namespace, "*")
                    }
                    _ => TypeRef::Unknown,
                }
            }
            "call_expression" => {
                let Some(function) = node.child_by_field_name("function") else {
                    return TypeRef::Unknown;
                };
                if function.kind() == "identifier" {
                    let name = self.text(&function);
                    if name == "new" {
                        return arguments(node)
                            .first()
                            .map(|t| self.resolve(self.text(t)))
                            .unwrap_or(TypeRef::Unknown);
                    }
                    // Conversion: `Celsius(x)`.
                    if let TypeRef::Declared(ty) = self.resolve(name) {
                        return TypeRef::Declared(ty);
                    }
                }
                self.shape(node)
                    .map(|shape| classify::return_type(&shape, self.scope))
                    .unwrap_or(TypeRef::Unknown)
            }
            "composite_literal" => node
                .child_by_field_name("type")
                .map(|t| self.resolve(self.text(&t)))
                .unwrap_or(TypeRef::Unknown),
            "type_assertion_expression" | "type_conversion_expression" => node
                .child_by_field_name("type")
                .map(|t| self.resolve(self.text(&t)))
                .unwrap_or(TypeRef::Unknown),
            "unary_expression" => match node.child_by_field_name("operator").map(|o| self.text(&o)) {
                Some("&") | Some("*") => node
                    .child_by_field_name("operand")
                    .map(|o| self.infer(o))
                    .unwrap_or(TypeRef::Unknown),
                _ => TypeRef::Unknown,
            },
            "parenthesized_expression" => children(&node)
                .first()
                .map(|inner| self.infer(*inner))
                .unwrap_or(TypeRef::Unknown),
            _ => TypeRef::Unknown,
        }
    }

    /// The package an identifier operand names, unless a local shadows it.
    fn package(&self, operand: &Node) -> Option<PackageTarget> {
        if operand.kind() != "identifier" {
            return None;
        }
        let name = self.text(operand);
        if self.locals.contains_key(name) {
            return None;
        }
        package_target(name, self.scope)
    }

    fn arg_value(&self, node: Node) -> ArgValue {
        if let Some(value) = string_value(&node, self.file) {
            return ArgValue::Str(value);
        }
        match node.kind() {
            "int_literal" | "float_literal" | "imaginary_literal" => ArgValue::Number,
            "true" | "false" => ArgValue::Bool,
            "nil" => ArgValue::Null,
            "identifier" => {
                let name = self.text(&node);
                if let Some(value) = self.consts.get(name) {
                    return ArgValue::Str(value.clone());
                }
                if !self.locals.contains_key(name) {
                    if let Some(value) = self.scope.index.constant(self.scope.namespace, name) {
                        return ArgValue::Str(value.to_string());
                    }
                }
                typed(self.infer(node))
            }
            "selector_expression" => {
                let constant = match (node.child_by_field_name("operand"), node.child_by_field_name("field")) {
                    (Some(operand), Some(field)) => match self.package(&operand) {
                        Some(PackageTarget::Project(namespace)) => self
                            .scope
                            .index
                            .constant(&namespace, self.text(&field))
                            .map(str::to_string),
                        _ => None,
                    },
                    _ => None,
                };
                match constant {
                    Some(value) => ArgValue::Str(value),
                    None => typed(self.infer(node)),
                }
            }
            _ => typed(self.infer(node)),
        }
    }

    fn args(&self, call: &Node) -> Vec<ArgValue> {
        arguments(*call).into_iter().map(|a| self.arg_value(a)).collect()
    }

    fn shape(&self, node: Node) -> Option<CallShape> {
        let function = node.child_by_field_name("function")?;
        match function.kind() {
            "identifier" => {
                let name = self.text(&function);
                if BUILTIN_FUNCTIONS.contains(&name) || self.locals.contains_key(name) {
                    return None;
                }
                if !self.resolve(name).is_unknown() {
                    return None;
                }
                // Unqualified calls are package functions, never methods.
                let receiver = Receiver::Module(self.scope.namespace.to_string());
                Some(CallShape::new(line(&node), name, receiver).with_args(self.args(&node)))
            }
            "selector_expression" => {
                let operand = function.child_by_field_name("operand")?;
                let method = self.text(&function.child_by_field_name("field")?);
                let receiver = match self.package(&operand) {
                    Some(PackageTarget::Project(namespace)) => Receiver::Module(namespace),
                    Some(PackageTarget::External(path)) => Receiver::Module(path),
                    None => Receiver::Value(self.infer(operand)),
                };
                let mut shape = CallShape::new(line(&node), method, receiver).with_args(self.args(&node));
                shape.chain = self.chain(operand);
                shape.resource_hint = self.hint(operand);
                Some(shape)
            }
            _ => None,
        }
    }

    /// Calls chained before the receiver, nearest first.
    fn chain(&self, mut node: Node) -> Vec<ChainLink> {
        let mut links = Vec::new();
        loop {
            match node.kind() {
                "call_expression" => {
                    let Some(function) = node.child_by_field_name("function") else {
                        break;
                    };
                    let (method, next) = match function.kind() {
                        "selector_expression" => (
                            function.child_by_field_name("field").map(|f| self.text(&f)).unwrap_or_default(),
                            function.child_by_field_name("operand"),
                        ),
                        _ => (self.text(&function), None),
                    };
                    let first_arg = arguments(node)
                        .into_iter()
                        .next()
                        .map(|a| self.arg_value(a))
                        .unwrap_or(ArgValue::Dynamic);
                    links.push(ChainLink {
                        method: method.to_string(),
                        first_arg,
                    });
                    match next {
                        Some(next) => node = next,
                        None => break,
                    }
                }
                "selector_expression" => match node.child_by_field_name("operand") {
                    Some(next) => node = next,
                    None => break,
                },
                "parenthesized_expression" => match children(&node).first() {
                    Some(inner) => node = *inner,
                    None => break,
                },
                _ => break,
            }
        }
        links
    }

    fn hint(&self, target: Node) -> Option<String> {
        match target.kind() {
            "identifier" => self.hints.get(self.text(&target)).cloned(),
            "selector_expression" => {
                let operand = target.child_by_field_name("operand")?;
                let field = self.text(&target.child_by_field_name("field")?);
                let TypeRef::Declared(qualified) = self.infer(operand) else {
                    return None;
                };
                self.scope.index.field(&qualified, field).and_then(|f| f.resource.clone())
            }
            _ => None,
        }
    }
}

/// Directory of a relative path; empty at the root.
fn package_dir(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    }
}

fn extract_import(spec: &Node, file: &SourceFile) -> Option<Import> {
    let path = unquote(file.text(&spec.child_by_field_name("path")?))?;
    let import = Import::new(path);
    match spec.child_by_field_name("name") {
        None => Some(import),
        Some(name) => match name.kind() {
            "dot" => Some(import.wildcard()),
            "blank_identifier" => None,
            _ => Some(import.alias(file.text(&name))),
        },
    }
}

/// Identifier names of a field or parameter declaration.
fn field_names<'f>(node: &Node, file: &'f SourceFile) -> Vec<&'f str> {
    let type_id = node.child_by_field_name("type").map(|t| t.id());
    children_of_kind(node, &["field_identifier", "identifier"])
        .into_iter()
        .filter(|n| Some(n.id()) != type_id)
        .map(|n| file.text(&n))
        .collect()
}

fn parameters(list: Option<Node>, file: &SourceFile) -> Vec<Param> {
    let Some(list) = list else {
        return Vec::new();
    };
    let mut params = Vec::new();
    for decl in children_of_kind(&list, &["parameter_declaration", "variadic_parameter_declaration"]) {
        let Some(ty) = decl.child_by_field_name("type") else {
            continue;
        };
        let variadic = decl.kind() == "variadic_parameter_declaration";
        let type_name = if variadic {
            format!("...{}", file.text(&ty))
        } else {
            file.text(&ty).to_string()
        };
        let names = field_names(&decl, file);
        let names = if names.is_empty() { vec![""] } else { names };
        params.extend(names.into_iter().map(|name| Param {
            name: name.to_string(),
            type_name: type_name.clone(),
            optional: false,
            variadic,
        }));
    }
    params
}

/// First result type of a function, method or interface method.
fn result_type(node: &Node, file: &SourceFile) -> Option<String> {
    let result = node.child_by_field_name("result")?;
    if result.kind() == "parameter_list" {
        let first = children_of_kind(&result, &["parameter_declaration"]).into_iter().next()?;
        return first.child_by_field_name("type").map(|t| file.text(&t).to_string());
    }
    Some(file.text(&result).to_string())
}

/// Receiver type name without pointer or type parameters.
fn receiver_type(list: &Node, file: &SourceFile) -> Option<String> {
    let param = children_of_kind(list, &["parameter_declaration"]).into_iter().next()?;
    let ty = param.child_by_field_name("type")?;
    let name = bare_type(file.text(&ty));
    (!name.is_empty()).then_some(name)
}

fn string_constants(spec: &Node, file: &SourceFile) -> Vec<FieldDecl> {
    let values: Vec<Node> = spec
        .child_by_field_name("value")
        .map(|list| children(&list))
        .unwrap_or_default();
    let type_name = spec.child_by_field_name("type").map(|t| file.text(&t).to_string());
    children_of_kind(spec, &["identifier"])
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let value = string_value(values.get(i)?, file)?;
            let mut field = FieldDecl::new(file.text(name), type_name.clone());
            field.value = Some(value);
            Some(field)
        })
        .collect()
}

fn collect_literal_resources(literal: Node, file: &SourceFile, out: &mut HashMap<(String, String), String>) {
    let Some(ty) = literal.child_by_field_name("type") else {
        return;
    };
    if ty.kind() != "type_identifier" {
        return;
    }
    let Some(body) = literal.child_by_field_name("body") else {
        return;
    };
    for element in children_of_kind(&body, &["keyed_element"]) {
        let parts = children(&element);
        let (Some(key), Some(value)) = (parts.first(), parts.last()) else {
            continue;
        };
        let key = unwrap_element(*key);
        let value = unwrap_element(*value);
        if let Some(resource) = resource_literal(value, file) {
            out.insert((file.text(&ty).to_string(), file.text(&key).to_string()), resource);
        }
    }
}

/// Look through the `literal_element` wrapper of keyed elements.
fn unwrap_element(node: Node) -> Node {
    if node.kind() == "literal_element" {
        if let Some(inner) = children(&node).into_iter().next() {
            return inner;
        }
    }
    node
}

/// Literal collection name of a lookup call.
fn resource_literal(node: Node, file: &SourceFile) -> Option<String> {
    if node.kind() != "call_expression" {
        return None;
    }
    let function = node.child_by_field_name("function")?;
    if function.kind() != "selector_expression" {
        return None;
    }
    let method = file.text(&function.child_by_field_name("field")?);
    let is_lookup = capability::GO
        .data_access
        .iter()
        .any(|d| d.resource_lookup.contains(&method));
    if !is_lookup {
        return None;
    }
    let first = arguments(node).into_iter().next()?;
    string_value(&first, file)
}

fn typed(ty: TypeRef) -> ArgValue {
    if ty.is_unknown() {
        ArgValue::Dynamic
    } else {
        ArgValue::Typed(ty)
    }
}

/// Strip pointers, slices, variadics and type arguments. Maps, channels and
/// function types name nothing callable.
fn bare_type(raw: &str) -> String {
    let mut ty = raw.trim();
    loop {
        let next = ty
            .trim_start_matches('*')
            .trim_start_matches("...")
            .trim_start_matches("[]")
            .trim_start();
        if next == ty {
            break;
        }
        ty = next;
    }
    if ty.starts_with("map[") || ty.starts_with("chan ") || ty.starts_with("func") || ty.starts_with('[') {
        return String::new();
    }
    ty.split('[').next().unwrap_or(ty).trim().to_string()
}

fn arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    call.child_by_field_name("arguments")
        .map(|list| children(&list))
        .unwrap_or_default()
}

fn string_value(node: &Node, file: &SourceFile) -> Option<String> {
    match node.kind() {
        "interpreted_string_literal" | "raw_string_literal" => unquote(file.text(node)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CallSite, ExtractSettings};

    fn settings() -> ExtractSettings {
        ExtractSettings {
            project: "Sample".into(),
            source_url_base: "http://localhost".into(),
            resource_store: "mongo".into(),
            resource_database: "UnknownDatabase".into(),
        }
    }

    fn build(files: &[(&str, &str)]) -> (Vec<SourceFile>, Vec<FileDeclarations>, SymbolIndex) {
        let extractor = GoExtractor::new();
        let parsed: Vec<SourceFile> = files
            .iter()
            .map(|(p, c)| extractor.parse(p, c.to_string()).unwrap())
            .collect();
        let decls: Vec<FileDeclarations> = parsed.iter().map(|f| extractor.declarations(f)).collect();
        let index = SymbolIndex::build(&extractor, &decls, &settings());
        (parsed, decls, index)
    }

    fn sites(files: &[(&str, &str)], function: &str) -> (Vec<Classified>, SymbolIndex) {
        let extractor = GoExtractor::new();
        let settings = settings();
        let (parsed, decls, index) = build(files);
        for (file, decl) in parsed.iter().zip(&decls) {
            if let Some(callable) = decl.callables.iter().find(|c| c.name == function) {
                let owner = callable.owner_type();
                let scope = Scope::new(&index, decl, extractor.capabilities(), &settings)
                    .within(&callable.namespace, owner.as_deref());
                let found = extractor.call_sites(callable, file, &scope);
                return (found, index);
            }
        }
        panic!("function {} not found", function);
    }

    #[test]
    fn test_skips_test_files() {
        let extractor = GoExtractor::new();
        assert!(extractor.accepts(Path::new("internal/db/store.go")));
        assert!(!extractor.accepts(Path::new("internal/db/store_test.go")));
        assert!(!extractor.accepts(Path::new("README.md")));
    }

    #[test]
    fn test_declarations() {
        let (_, decls, _) = build(&[(
            "internal/db/store.go",
            r#"package db

import (
	"context"
	m "go.mongodb.org/mongo-driver/mongo"
)

const Users = "users"

type Store struct {
	Base
	coll *m.Collection
	a, b int
}

type Reader interface {
	Get(ctx context.Context, id string) (*Store, error)
}

func (s *Store) Get(ctx context.Context, id string) (*Store, error) { return s, nil }

func New(names ...string) *Store { return &Store{} }
"#,
        )]);
        let decls = &decls[0];
        assert_eq!(decls.namespace, "internal/db");
        assert_eq!(decls.package_name.as_deref(), Some("db"));
        assert_eq!(decls.imports[1].alias.as_deref(), Some("m"));
        assert_eq!(decls.constants[0].value.as_deref(), Some("users"));

        let store = &decls.types[0];
        assert_eq!(store.kind, TypeKind::Struct);
        assert_eq!(store.bases, vec!["Base"]);
        let names: Vec<&str> = store.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Base", "coll", "a", "b"]);
        assert_eq!(decls.types[1].kind, TypeKind::Interface);

        let signatures: Vec<String> = decls.callables.iter().map(|c| c.signature()).collect();
        assert_eq!(
            signatures,
            vec!["Get(context.Context,string)", "Get(context.Context,string)", "New(...string)"]
        );
        assert_eq!(decls.callables[1].owner, Owner::Type("Store".into()));
        assert_eq!(decls.callables[2].owner, Owner::Namespace);
        assert_eq!(decls.callables[2].return_type.as_deref(), Some("*Store"));
    }

    #[test]
    fn test_structural_interfaces() {
        let (_, decls, index) = build(&[
            (
                "shapes/shape.go",
                "package shapes\n\ntype Shape interface {\n\tArea() float64\n}\n\ntype Empty interface{}\n",
            ),
            (
                "shapes/square.go",
                "package shapes\n\ntype Square struct{ side float64 }\n\nfunc (s Square) Area() float64 { return s.side * s.side }\n",
            ),
        ]);
        let extractor = GoExtractor::new();
        let settings = settings();
        let square = index.type_symbol("shapes.Square").unwrap();
        let scope = Scope::new(&index, &decls[1], extractor.capabilities(), &settings);
        let relations = extractor.relationships(square, &scope);
        assert_eq!(
            relations,
            vec![TypeRelation {
                relationship: Relationship::Implements,
                target: "shapes.Shape".into()
            }]
        );
    }

    #[test]
    fn test_cross_package_calls() {
        let (found, index) = sites(
            &[
                (
                    "internal/db/store.go",
                    "package db\n\ntype Store struct{}\n\nfunc Open() *Store { return &Store{} }\n\nfunc (s *Store) Save(n int) {}\n",
                ),
                (
                    "cmd/app/main.go",
                    r#"package main

import "github.com/acme/svc/internal/db"

func main() {
	store := db.Open()
	store.Save(1)
	helper()
	_ = len("x")
}

func helper() {}
"#,
                ),
            ],
            "main",
        );
        let targets: Vec<String> = found
            .into_iter()
            .map(|c| match c {
                Classified::Site(CallSite::Ordinary { target, .. }) => index.callable(target).signature.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(targets, vec!["Open()", "Save(int)", "helper()"]);
    }

    #[test]
    fn test_http_and_mongo_calls() {
        let (found, _) = sites(
            &[(
                "svc/client.go",
                r#"package svc

import (
	"context"
	"net/http"

	"go.mongodb.org/mongo-driver/mongo"
)

const ordersURL = "http://orders/api"

type Repo struct {
	coll *mongo.Collection
}

func NewRepo(db *mongo.Database) *Repo {
	return &Repo{coll: db.Collection("orders")}
}

func (r *Repo) Sync(ctx context.Context, url string) {
	http.Get(ordersURL)
	http.Get(url)
	client, _ := mongo.Connect(ctx, nil)
	client.Database("shop").Collection("users").FindOne(ctx, nil)
	r.coll.InsertOne(ctx, nil)
	http.DefaultClient.Do(nil)
}
"#,
            )],
            "Sync",
        );
        let sites: Vec<CallSite> = found
            .into_iter()
            .filter_map(|c| match c {
                Classified::Site(site) => Some(site),
                _ => None,
            })
            .collect();
        assert_eq!(
            sites,
            vec![
                CallSite::Network {
                    line: 21,
                    url: "http://orders/api".into()
                },
                CallSite::Network {
                    line: 22,
                    url: crate::identity::UNKNOWN_SERVICE_URL.into()
                },
                CallSite::Resource {
                    line: 24,
                    database: "shop".into(),
                    collection: "users".into()
                },
                CallSite::Resource {
                    line: 25,
                    database: "UnknownDatabase".into(),
                    collection: "orders".into()
                },
                CallSite::Network {
                    line: 26,
                    url: crate::identity::UNKNOWN_SERVICE_URL.into()
                },
            ]
        );
    }

    #[test]
    fn test_bindings_and_types() {
        assert_eq!(default_binding("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(default_binding("go.mongodb.org/mongo-driver/v2/mongo"), "mongo");
        assert_eq!(default_binding("github.com/jackc/pgx/v5"), "pgx");
        assert_eq!(bare_type("*[]Store"), "Store");
        assert_eq!(bare_type("List[int]"), "List");
        assert_eq!(bare_type("map[string]int"), "");
        assert_eq!(package_dir("main.go"), "");
    }
}
