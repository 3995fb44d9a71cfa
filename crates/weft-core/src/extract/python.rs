//! Python extractor using tree-sitter.
//!
//! A module is the dotted path of its file. Unannotated parameters take the
//! type `Any` in signatures, and `self`/`cls` are not part of them.

use std::collections::HashMap;

use tree_sitter::Node;

use super::capability::{self, Capabilities};
use super::classify::{self, ArgValue, CallShape, ChainLink, Classified, Receiver};
use super::source::{children, children_of_kind, line, unquote, walk, SourceFile};
use super::symbols::{
    qualify, CallableDecl, FieldDecl, FileDeclarations, Import, Owner, Param, TypeDecl, TypeKind, TypeRef,
};
use super::{Extractor, Language, LabelSet, Scope};
use crate::graph::Label;

const UNTYPED: &str = "Any";

const BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "bytes", "callable", "dict", "dir", "enumerate", "filter", "float", "format",
    "getattr", "hasattr", "hash", "id", "input", "int", "isinstance", "issubclass", "iter", "len", "list", "map",
    "max", "min", "next", "object", "open", "print", "property", "range", "repr", "reversed", "round", "set",
    "setattr", "sorted", "str", "sum", "super", "tuple", "type", "vars", "zip",
];

/// Bases that make a class an interface.
const INTERFACE_MARKERS: &[(&str, &str)] = &[
    ("abc", "ABC"),
    ("abc", "ABCMeta"),
    ("typing", "Protocol"),
    ("typing_extensions", "Protocol"),
];

/// Python extractor using tree-sitter.
pub struct PythonExtractor {
    grammar: tree_sitter::Language,
}

impl PythonExtractor {
    pub fn new() -> Self {
        Self {
            grammar: tree_sitter_python::LANGUAGE.into(),
        }
    }

    fn collect(&self, file: &SourceFile, block: Node, module: &str, outer: Option<&str>, out: &mut FileDeclarations) {
        for child in children(&block) {
            let (definition, decorators) = match child.kind() {
                "decorated_definition" => match child.child_by_field_name("definition") {
                    Some(definition) => (definition, decorator_names(&child, file)),
                    None => continue,
                },
                _ => (child, Vec::new()),
            };
            match definition.kind() {
                "class_definition" => {
                    let Some(decl) = self.extract_class(&definition, file, module, outer) else {
                        continue;
                    };
                    let name = decl.name.clone();
                    out.types.push(decl);
                    if let Some(body) = definition.child_by_field_name("body") {
                        self.collect(file, body, module, Some(&name), out);
                    }
                }
                "function_definition" => {
                    if let Some(callable) = self.extract_function(&definition, &decorators, file, module, outer) {
                        out.callables.push(callable);
                    }
                }
                "expression_statement" if outer.is_none() => {
                    for assignment in children_of_kind(&definition, &["assignment"]) {
                        if let Some(variable) = module_variable(&assignment, file, &out.constants) {
                            out.constants.push(variable);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn extract_class(&self, node: &Node, file: &SourceFile, module: &str, outer: Option<&str>) -> Option<TypeDecl> {
        let simple = file.text(&node.child_by_field_name("name")?);
        let name = match outer {
            Some(outer) => format!("{}.{}", outer, simple),
            None => simple.to_string(),
        };

        let mut bases = Vec::new();
        if let Some(list) = node.child_by_field_name("superclasses") {
            for base in children(&list) {
                match base.kind() {
                    "identifier" | "attribute" => bases.push(file.text(&base).to_string()),
                    "subscript" => {
                        // `Generic[T]`, `Protocol[T]`
                        if let Some(value) = base.child_by_field_name("value") {
                            bases.push(file.text(&value).to_string());
                        }
                    }
                    "keyword_argument" => {
                        let is_metaclass = base
                            .child_by_field_name("name")
                            .is_some_and(|n| file.text(&n) == "metaclass");
                        if let (true, Some(value)) = (is_metaclass, base.child_by_field_name("value")) {
                            bases.push(file.text(&value).to_string());
                        }
                    }
                    _ => {}
                }
            }
        }

        let mut fields: Vec<FieldDecl> = Vec::new();
        if let Some(body) = node.child_by_field_name("body") {
            // Class attributes.
            for statement in children_of_kind(&body, &["expression_statement"]) {
                for assignment in children_of_kind(&statement, &["assignment"]) {
                    if let Some(field) = module_variable(&assignment, file, &fields) {
                        fields.push(field);
                    }
                }
            }
            // Instance attributes assigned through `self` in any method.
            for child in children(&body) {
                let method = match child.kind() {
                    "decorated_definition" => child.child_by_field_name("definition"),
                    "function_definition" => Some(child),
                    _ => None,
                };
                if let Some(method) = method.filter(|m| m.kind() == "function_definition") {
                    self.instance_attributes(&method, file, &mut fields);
                }
            }
        }

        Some(TypeDecl {
            namespace: module.to_string(),
            name,
            kind: TypeKind::Class,
            bases,
            fields,
            line: line(node),
        })
    }

    /// `self.x = ...` assignments of one method.
    fn instance_attributes(&self, method: &Node, file: &SourceFile, fields: &mut Vec<FieldDecl>) {
        let Some(body) = method.child_by_field_name("body") else {
            return;
        };
        let annotations: HashMap<&str, String> = method
            .child_by_field_name("parameters")
            .map(|list| {
                children(&list)
                    .iter()
                    .filter_map(|p| parameter(p, file))
                    .filter_map(|p| p.annotation.map(|a| (p.name, a.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let mut assignments = Vec::new();
        walk(body, &mut |n| {
            if n.kind() == "assignment" {
                assignments.push(n);
            }
            !matches!(n.kind(), "function_definition" | "class_definition" | "lambda")
        });
        for assignment in assignments {
            let Some(left) = assignment.child_by_field_name("left") else {
                continue;
            };
            if left.kind() != "attribute" {
                continue;
            }
            let is_self = left
                .child_by_field_name("object")
                .is_some_and(|o| file.text(&o) == "self");
            let Some(attribute) = left.child_by_field_name("attribute").filter(|_| is_self) else {
                continue;
            };
            let name = file.text(&attribute);
            if fields.iter().any(|f| f.name == name) {
                continue;
            }
            let right = assignment.child_by_field_name("right");
            let type_name = assignment
                .child_by_field_name("type")
                .map(|t| file.text(&t).to_string())
                .or_else(|| right.and_then(|r| value_type(r, file, &annotations, fields.as_slice())));
            let mut field = FieldDecl::new(name, type_name);
            if let Some(right) = right {
                field.value = string_value(&right, file);
                field.resource = resource_literal(right, file);
            }
            fields.push(field);
        }
    }

    fn extract_function(
        &self,
        node: &Node,
        decorators: &[String],
        file: &SourceFile,
        module: &str,
        owner: Option<&str>,
    ) -> Option<CallableDecl> {
        let name = file.text(&node.child_by_field_name("name")?).to_string();
        let bound = owner.is_some() && !decorators.iter().any(|d| d == "staticmethod");
        let params = node
            .child_by_field_name("parameters")
            .map(|list| {
                children(&list)
                    .iter()
                    .filter_map(|p| parameter(p, file))
                    .skip(usize::from(bound))
                    .map(|p| p.to_param())
                    .collect()
            })
            .unwrap_or_default();

        Some(CallableDecl {
            name,
            namespace: module.to_string(),
            owner: match owner {
                Some(owner) => Owner::Type(owner.to_string()),
                None => Owner::Namespace,
            },
            params,
            return_type: node.child_by_field_name("return_type").map(|t| file.text(&t).to_string()),
            line: line(node),
            span: node.byte_range(),
        })
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PythonExtractor {
    fn language(&self) -> Language {
        Language::Python
    }

    fn grammar(&self) -> tree_sitter::Language {
        self.grammar.clone()
    }

    fn labels(&self) -> LabelSet {
        LabelSet {
            namespace: Label::Module,
            class: Label::Class,
            interface: Label::Interface,
            structure: Label::Class,
            method: Label::Method,
            function: Label::Function,
        }
    }

    fn capabilities(&self) -> &'static Capabilities {
        &capability::PYTHON
    }

    fn declarations(&self, file: &SourceFile) -> FileDeclarations {
        let (module, package) = module_path(file.path());
        let mut decls = FileDeclarations::new(file.path(), module.clone());

        let mut imports = Vec::new();
        walk(file.root(), &mut |n| {
            match n.kind() {
                "import_statement" => imports.extend(plain_imports(&n, file)),
                "import_from_statement" => imports.extend(from_imports(&n, file, &package)),
                _ => {}
            }
            !matches!(n.kind(), "import_statement" | "import_from_statement")
        });
        decls.imports = imports;

        self.collect(file, file.root(), &module, None, &mut decls);
        decls
    }

    fn resolve_type(&self, raw: &str, scope: &Scope<'_>) -> TypeRef {
        let name = bare_type(raw);
        if name.is_empty() || name == "None" {
            return TypeRef::Unknown;
        }
        match lookup(&name, scope) {
            Binding::Type(ty) => ty,
            Binding::External(path) => match path.rsplit_once('.') {
                Some((namespace, simple)) => TypeRef::external(namespace, simple),
                None => TypeRef::Unknown,
            },
            _ => TypeRef::Unknown,
        }
    }

    fn refine_kind(&self, decl: &TypeDecl, bases: &[TypeRef]) -> TypeKind {
        let marked = bases.iter().any(|base| match base {
            TypeRef::External { namespace, name } => INTERFACE_MARKERS
                .iter()
                .any(|(ns, n)| ns == namespace && n == name),
            _ => false,
        });
        if marked {
            TypeKind::Interface
        } else {
            decl.kind
        }
    }

    fn call_sites(&self, callable: &CallableDecl, file: &SourceFile, scope: &Scope<'_>) -> Vec<Classified> {
        let Some(node) = file.find(&callable.span, &["function_definition"]) else {
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
        };
        body.bind_parameters(&node);
        body.bind_locals(block);

        let mut sites = Vec::new();
        walk(block, &mut |n| {
            if n.kind() == "call" {
                if let Some(shape) = body.shape(n) {
                    sites.push(classify::classify(&shape, scope));
                }
            }
            !matches!(n.kind(), "function_definition" | "class_definition")
        });
        sites
    }
}

/// What a dotted name refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Binding {
    /// A class, or a value of a known type.
    Type(TypeRef),
    /// A project module, by namespace.
    Module(String),
    /// Something outside the project, by dotted path.
    External(String),
    Function { module: String, name: String },
    Constant(String),
    Unknown,
}

/// Resolve a dotted name in a module's import context.
fn lookup(dotted: &str, scope: &Scope<'_>) -> Binding {
    let head = dotted.split('.').next().unwrap_or(dotted);
    let rest = &dotted[head.len()..];
    let imports = &scope.file.imports;

    if let Some(import) = imports.iter().find(|i| !i.wildcard && binds(i, head)) {
        let full = match &import.alias {
            Some(_) => format!("{}{}", import.path, rest),
            None => dotted.to_string(),
        };
        return resolve_path(&full, scope);
    }

    let index = scope.index;
    let local = qualify(scope.namespace, dotted);
    if index.has_type(&local) {
        return Binding::Type(TypeRef::Declared(local));
    }
    if rest.is_empty() && !index.functions(scope.namespace, head).is_empty() {
        return Binding::Function {
            module: scope.namespace.to_string(),
            name: head.to_string(),
        };
    }
    if rest.is_empty() {
        if let Some(value) = index.constant(scope.namespace, head) {
            return Binding::Constant(value.to_string());
        }
    }

    for import in imports.iter().filter(|i| i.wildcard) {
        match resolve_path(&format!("{}.{}", import.path, dotted), scope) {
            Binding::Unknown | Binding::External(_) => continue,
            found => return found,
        }
    }
    Binding::Unknown
}

/// Resolve a fully qualified dotted path: the longest prefix naming a
/// project module wins, otherwise the path is external.
fn resolve_path(full: &str, scope: &Scope<'_>) -> Binding {
    let index = scope.index;
    let segments: Vec<&str> = full.split('.').collect();
    for cut in (1..=segments.len()).rev() {
        let prefix = segments[..cut].join(".");
        let Some(module) = index.namespace_by_suffix(&prefix, '.') else {
            continue;
        };
        let rest = &segments[cut..];
        if rest.is_empty() {
            return Binding::Module(module.to_string());
        }
        let qualified = qualify(module, &rest.join("."));
        if index.has_type(&qualified) {
            return Binding::Type(TypeRef::Declared(qualified));
        }
        if let [name] = rest {
            if !index.functions(module, name).is_empty() {
                return Binding::Function {
                    module: module.to_string(),
                    name: name.to_string(),
                };
            }
            if let Some(value) = index.constant(module, name) {
                return Binding::Constant(value.to_string());
            }
        }
        return Binding::Unknown;
    }

    if let Some((namespace, name)) = full.rsplit_once('.') {
        if scope.capabilities.knows(namespace, name) {
            return Binding::Type(TypeRef::external(namespace, name));
        }
    }
    Binding::External(full.to_string())
}

/// Whether an import introduces `name`: its alias, or the top-level
/// package of a plain `import a.b`.
fn binds(import: &Import, name: &str) -> bool {
    match &import.alias {
        Some(alias) => alias == name,
        None => import.path.split('.').next() == Some(name),
    }
}

/// Per-callable resolution state.
struct Body<'a> {
    extractor: &'a PythonExtractor,
    file: &'a SourceFile,
    scope: &'a Scope<'a>,
    locals: HashMap<String, TypeRef>,
    consts: HashMap<String, String>,
    hints: HashMap<String, String>,
}

impl<'a> Body<'a> {
    fn resolve(&self, raw: &str) -> TypeRef {
        self.extractor.resolve_type(raw, self.scope)
    }

    fn text(&self, node: &Node) -> &'a str {
        self.file.text(node)
    }

    fn bind_parameters(&mut self, function: &Node) {
        let Some(list) = function.child_by_field_name("parameters") else {
            return;
        };
        let owner = self.scope.owner;
        let file = self.file;
        for (i, param) in children(&list).iter().filter_map(|p| parameter(p, file)).enumerate() {
            let ty = match (i, owner, param.annotation) {
                (0, Some(owner), None) if matches!(param.name, "self" | "cls") => TypeRef::Declared(owner.to_string()),
                (_, _, Some(annotation)) if !param.variadic => self.resolve(annotation),
                _ => TypeRef::Unknown,
            };
            self.locals.insert(param.name.to_string(), ty);
        }
    }

    /// Assignments in document order. A name assigned a string literal is a
    /// constant only while no other assignment rebinds it.
    fn bind_locals(&mut self, block: Node) {
        let file = self.file;
        let mut statements = Vec::new();
        walk(block, &mut |n| {
            if matches!(n.kind(), "assignment" | "as_pattern" | "for_statement") {
                statements.push(n);
            }
            !matches!(n.kind(), "function_definition" | "class_definition" | "lambda")
        });

        let mut assigned: HashMap<String, usize> = HashMap::new();
        for statement in statements {
            match statement.kind() {
                "assignment" => {
                    let Some(left) = statement.child_by_field_name("left") else {
                        continue;
                    };
                    if left.kind() != "identifier" {
                        for name in identifiers(left) {
                            self.locals.insert(file.text(&name).to_string(), TypeRef::Unknown);
                        }
                        continue;
                    }
                    let name = file.text(&left).to_string();
                    let right = statement.child_by_field_name("right");
                    let ty = match (statement.child_by_field_name("type"), right) {
                        (Some(annotation), _) => self.resolve(file.text(&annotation)),
                        (None, Some(value)) => self.infer(value),
                        (None, None) => TypeRef::Unknown,
                    };
                    *assigned.entry(name.clone()).or_default() += 1;
                    match right.and_then(|r| string_value(&r, file)) {
                        Some(literal) if assigned[&name] == 1 => {
                            self.consts.insert(name.clone(), literal);
                        }
                        _ => {
                            self.consts.remove(&name);
                        }
                    }
                    if let Some(resource) = right.and_then(|r| resource_literal(r, file)) {
                        self.hints.insert(name.clone(), resource);
                    }
                    self.locals.insert(name, ty);
                }
                "as_pattern" => {
                    let value = children(&statement).into_iter().next();
                    let Some(alias) = statement.child_by_field_name("alias") else {
                        continue;
                    };
                    let ty = value.map(|v| self.infer(v)).unwrap_or(TypeRef::Unknown);
                    for name in identifiers(alias) {
                        self.locals.insert(file.text(&name).to_string(), ty.clone());
                    }
                }
                _ => {
                    if let Some(left) = statement.child_by_field_name("left") {
                        for name in identifiers(left) {
                            self.locals.insert(file.text(&name).to_string(), TypeRef::Unknown);
                        }
                    }
                }
            }
        }
    }

    /// What a name refers to, locals first.
    fn name_binding(&self, name: &str) -> Binding {
        if let Some(ty) = self.locals.get(name) {
            return Binding::Type(ty.clone());
        }
        if let Some(variable) = self.scope.index.variable(self.scope.namespace, name) {
            return Binding::Type(variable.ty.clone());
        }
        lookup(name, self.scope)
    }

    /// What an expression evaluates to.
    fn value_of(&self, node: Node) -> Binding {
        match node.kind() {
            "identifier" => self.name_binding(self.text(&node)),
            "attribute" => {
                let (Some(object), Some(attribute)) =
                    (node.child_by_field_name("object"), node.child_by_field_name("attribute"))
                else {
                    return Binding::Unknown;
                };
                let name = self.text(&attribute);
                match self.value_of(object) {
                    Binding::Module(module) => resolve_path(&format!("{}.{}", module, name), self.scope),
                    Binding::External(path) => resolve_path(&format!("{}.{}", path, name), self.scope),
                    Binding::Type(TypeRef::Declared(qualified)) => {
                        if let Some(field) = self.scope.index.field(&qualified, name) {
                            return Binding::Type(field.ty.clone());
                        }
                        let nested = format!("{}.{}", qualified, name);
                        if self.scope.index.has_type(&nested) {
                            Binding::Type(TypeRef::Declared(nested))
                        } else {
                            Binding::Unknown
                        }
                    }
                    // `client.shop.users`: attribute access navigates.
                    Binding::Type(TypeRef::External { namespace, .. })
                        if self.scope.capabilities.data_access(&namespace).is_some() =>
                    {
                        Binding::Type(TypeRef::external(namespace, "*"))
                    }
                    _ => Binding::Unknown,
                }
            }
            "call" => Binding::Type(self.infer(node)),
            "subscript" => match node.child_by_field_name("value").map(|v| self.value_of(v)) {
                Some(Binding::Type(TypeRef::External { namespace, .. }))
                    if self.scope.capabilities.data_access(&namespace).is_some() =>
                {
                    Binding::Type(TypeRef::external(namespace, "*"))
                }
                _ => Binding::Unknown,
            },
            "await" | "parenthesized_expression" => children(&node)
                .into_iter()
                .next()
                .map(|inner| self.value_of(inner))
                .unwrap_or(Binding::Unknown),
            _ => Binding::Unknown,
        }
    }

    fn infer(&self, node: Node) -> TypeRef {
        match node.kind() {
            "call" => {
                let Some(function) = node.child_by_field_name("function") else {
                    return TypeRef::Unknown;
                };
                if function.kind() == "identifier" && self.text(&function) == "super" {
                    return self.base_type();
                }
                // Calling a class constructs an instance of it.
                if let Binding::Type(ty @ (TypeRef::Declared(_) | TypeRef::External { .. })) = self.callee_class(function)
                {
                    return ty;
                }
                self.shape(node)
                    .map(|shape| classify::return_type(&shape, self.scope))
                    .unwrap_or(TypeRef::Unknown)
            }
            _ => match self.value_of(node) {
                Binding::Type(ty) => ty,
                _ => TypeRef::Unknown,
            },
        }
    }

    /// The class a callee names, when it names one rather than a value.
    fn callee_class(&self, function: Node) -> Binding {
        match function.kind() {
            "identifier" if !self.locals.contains_key(self.text(&function)) => lookup(self.text(&function), self.scope),
            "attribute" => {
                let Some(object) = function.child_by_field_name("object") else {
                    return Binding::Unknown;
                };
                match self.value_of(object) {
                    Binding::Module(_) | Binding::External(_) => self.value_of(function),
                    _ => Binding::Unknown,
                }
            }
            _ => Binding::Unknown,
        }
    }

    fn base_type(&self) -> TypeRef {
        self.scope
            .owner
            .and_then(|o| self.scope.index.type_symbol(o))
            .and_then(|symbol| symbol.bases.first().cloned())
            .unwrap_or(TypeRef::Unknown)
    }

    fn arg_value(&self, node: Node) -> ArgValue {
        if let Some(value) = string_value(&node, self.file) {
            return ArgValue::Str(value);
        }
        match node.kind() {
            "integer" | "float" => ArgValue::Number,
            "true" | "false" => ArgValue::Bool,
            "none" => ArgValue::Null,
            "identifier" => {
                let name = self.text(&node);
                if let Some(value) = self.consts.get(name) {
                    return ArgValue::Str(value.clone());
                }
                if !self.locals.contains_key(name) {
                    if let Some(value) = self
                        .scope
                        .index
                        .variable(self.scope.namespace, name)
                        .and_then(|v| v.value.clone())
                    {
                        return ArgValue::Str(value);
                    }
                    if let Binding::Constant(value) = lookup(name, self.scope) {
                        return ArgValue::Str(value);
                    }
                }
                typed(self.infer(node))
            }
            "attribute" => {
                let constant = match (node.child_by_field_name("object"), node.child_by_field_name("attribute")) {
                    (Some(object), Some(attribute)) => match self.value_of(object) {
                        Binding::Type(TypeRef::Declared(q)) => self
                            .scope
                            .index
                            .field(&q, self.text(&attribute))
                            .and_then(|f| f.value.clone()),
                        Binding::Module(module) => {
                            match resolve_path(&format!("{}.{}", module, self.text(&attribute)), self.scope) {
                                Binding::Constant(value) => Some(value),
                                _ => None,
                            }
                        }
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

    /// Positional arguments, then keyword arguments with `url` first.
    fn args(&self, call: &Node) -> Vec<ArgValue> {
        let Some(list) = call.child_by_field_name("arguments") else {
            return Vec::new();
        };
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        for arg in children(&list) {
            match arg.kind() {
                "keyword_argument" => {
                    let name = arg.child_by_field_name("name").map(|n| self.text(&n)).unwrap_or_default();
                    if let Some(value) = arg.child_by_field_name("value") {
                        keywords.push((name != "url", self.arg_value(value)));
                    }
                }
                "list_splat" | "dictionary_splat" => positional.push(ArgValue::Dynamic),
                _ => positional.push(self.arg_value(arg)),
            }
        }
        keywords.sort_by_key(|(rank, _)| *rank);
        positional.extend(keywords.into_iter().map(|(_, value)| value));
        positional
    }

    fn shape(&self, node: Node) -> Option<CallShape> {
        let function = node.child_by_field_name("function")?;
        let line = line(&node);
        match function.kind() {
            "identifier" => {
                let name = self.text(&function);
                if self.locals.contains_key(name) {
                    return None;
                }
                let receiver = match lookup(name, self.scope) {
                    Binding::Type(TypeRef::Declared(qualified)) => {
                        // Construction runs `__init__` when the class (or a
                        // base) declares one.
                        if self.scope.index.methods(&qualified, "__init__").is_empty() {
                            return None;
                        }
                        let receiver = Receiver::Value(TypeRef::Declared(qualified));
                        return Some(CallShape::new(line, "__init__", receiver).with_args(self.args(&node)));
                    }
                    Binding::Function { module, name } => {
                        return Some(CallShape::new(line, name, Receiver::Module(module)).with_args(self.args(&node)));
                    }
                    Binding::External(path) => {
                        let (module, name) = path.rsplit_once('.')?;
                        return Some(
                            CallShape::new(line, name, Receiver::Module(module.to_string())).with_args(self.args(&node)),
                        );
                    }
                    Binding::Unknown if !is_builtin(name) => Receiver::Module(self.scope.namespace.to_string()),
                    _ => return None,
                };
                Some(CallShape::new(line, name, receiver).with_args(self.args(&node)))
            }
            "attribute" => {
                let object = function.child_by_field_name("object")?;
                let method = self.text(&function.child_by_field_name("attribute")?);
                let receiver = match self.value_of(object) {
                    Binding::Module(module) => Receiver::Module(module),
                    Binding::External(path) => Receiver::Module(path),
                    Binding::Type(ty) => Receiver::Value(ty),
                    _ => Receiver::Value(TypeRef::Unknown),
                };
                let mut shape = CallShape::new(line, method, receiver).with_args(self.args(&node));
                shape.chain = self.chain(object);
                shape.resource_hint = self.hint(object);
                Some(shape)
            }
            _ => None,
        }
    }

    /// Lookups chained before the receiver, nearest first. Subscripts and
    /// attribute access on a data-access handle count as `__getitem__`.
    fn chain(&self, mut node: Node) -> Vec<ChainLink> {
        let mut links = Vec::new();
        loop {
            match node.kind() {
                "call" => {
                    let Some(function) = node.child_by_field_name("function") else {
                        break;
                    };
                    if function.kind() != "attribute" {
                        break;
                    }
                    let method = function
                        .child_by_field_name("attribute")
                        .map(|a| self.text(&a))
                        .unwrap_or_default();
                    let first_arg = self.args(&node).into_iter().next().unwrap_or(ArgValue::Dynamic);
                    links.push(ChainLink {
                        method: method.to_string(),
                        first_arg,
                    });
                    match function.child_by_field_name("object") {
                        Some(next) => node = next,
                        None => break,
                    }
                }
                "subscript" => {
                    let first_arg = node
                        .child_by_field_name("subscript")
                        .map(|s| self.arg_value(s))
                        .unwrap_or(ArgValue::Dynamic);
                    links.push(ChainLink {
                        method: "__getitem__".to_string(),
                        first_arg,
                    });
                    match node.child_by_field_name("value") {
                        Some(next) => node = next,
                        None => break,
                    }
                }
                "attribute" => {
                    let Some(object) = node.child_by_field_name("object") else {
                        break;
                    };
                    let navigates = matches!(
                        self.value_of(object),
                        Binding::Type(TypeRef::External { ref namespace, .. })
                            if self.scope.capabilities.data_access(namespace).is_some()
                    );
                    if navigates {
                        if let Some(attribute) = node.child_by_field_name("attribute") {
                            links.push(ChainLink {
                                method: "__getitem__".to_string(),
                                first_arg: ArgValue::Str(self.text(&attribute).to_string()),
                            });
                        }
                    }
                    node = object;
                }
                "await" | "parenthesized_expression" => match children(&node).into_iter().next() {
                    Some(inner) => node = inner,
                    None => break,
                },
                _ => break,
            }
        }
        links
    }

    fn hint(&self, target: Node) -> Option<String> {
        match target.kind() {
            "identifier" => {
                let name = self.text(&target);
                if let Some(hint) = self.hints.get(name) {
                    return Some(hint.clone());
                }
                if self.locals.contains_key(name) {
                    return None;
                }
                self.scope
                    .index
                    .variable(self.scope.namespace, name)
                    .and_then(|v| v.resource.clone())
            }
            "attribute" => {
                let object = target.child_by_field_name("object")?;
                let attribute = self.text(&target.child_by_field_name("attribute")?);
                let Binding::Type(TypeRef::Declared(qualified)) = self.value_of(object) else {
                    return None;
                };
                self.scope
                    .index
                    .field(&qualified, attribute)
                    .and_then(|f| f.resource.clone())
            }
            _ => None,
        }
    }
}

/// A parameter as written.
struct Parameter<'f> {
    name: &'f str,
    annotation: Option<&'f str>,
    optional: bool,
    /// `*args` or `**kwargs`.
    variadic: bool,
    splat: &'static str,
}

impl Parameter<'_> {
    fn to_param(&self) -> Param {
        Param {
            name: self.name.to_string(),
            type_name: format!("{}{}", self.splat, self.annotation.unwrap_or(UNTYPED)),
            optional: self.optional,
            variadic: self.variadic,
        }
    }
}

fn parameter<'f>(node: &Node, file: &'f SourceFile) -> Option<Parameter<'f>> {
    let splat = |n: &Node| match n.kind() {
        "list_splat_pattern" => "*",
        "dictionary_splat_pattern" => "**",
        _ => "",
    };
    let name_of = |n: &Node| -> Option<&'f str> {
        match n.kind() {
            "identifier" => Some(file.text(n)),
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                children_of_kind(n, &["identifier"]).first().map(|i| file.text(i))
            }
            _ => None,
        }
    };
    match node.kind() {
        "identifier" => Some(Parameter {
            name: file.text(node),
            annotation: None,
            optional: false,
            variadic: false,
            splat: "",
        }),
        "list_splat_pattern" | "dictionary_splat_pattern" => Some(Parameter {
            name: name_of(node)?,
            annotation: None,
            optional: true,
            variadic: true,
            splat: splat(node),
        }),
        "typed_parameter" => {
            let inner = children(node).into_iter().next()?;
            let splat = splat(&inner);
            Some(Parameter {
                name: name_of(&inner)?,
                annotation: node.child_by_field_name("type").map(|t| file.text(&t)),
                optional: !splat.is_empty(),
                variadic: !splat.is_empty(),
                splat,
            })
        }
        "default_parameter" | "typed_default_parameter" => Some(Parameter {
            name: file.text(&node.child_by_field_name("name")?),
            annotation: node.child_by_field_name("type").map(|t| file.text(&t)),
            optional: true,
            variadic: false,
            splat: "",
        }),
        _ => None,
    }
}

fn decorator_names(decorated: &Node, file: &SourceFile) -> Vec<String> {
    children_of_kind(decorated, &["decorator"])
        .iter()
        .map(|d| file.text(d).trim_start_matches('@').trim().to_string())
        .collect()
}

/// `(module, package)` of a file: `app/models/user.py` is module
/// `app.models.user` in package `app.models`; an `__init__.py` is its own
/// package.
fn module_path(path: &str) -> (String, String) {
    let stem = path.strip_suffix(".py").unwrap_or(path);
    let dotted = stem.replace('/', ".");
    if dotted == "__init__" {
        return (String::new(), String::new());
    }
    if let Some(package) = dotted.strip_suffix(".__init__") {
        return (package.to_string(), package.to_string());
    }
    let package = dotted.rsplit_once('.').map(|(p, _)| p.to_string()).unwrap_or_default();
    (dotted, package)
}

fn plain_imports(node: &Node, file: &SourceFile) -> Vec<Import> {
    children(node)
        .iter()
        .filter_map(|name| match name.kind() {
            "dotted_name" => Some(Import::new(file.text(name))),
            "aliased_import" => {
                let path = name.child_by_field_name("name")?;
                let alias = name.child_by_field_name("alias")?;
                Some(Import::new(file.text(&path)).alias(file.text(&alias)))
            }
            _ => None,
        })
        .collect()
}

fn from_imports(node: &Node, file: &SourceFile, package: &str) -> Vec<Import> {
    let Some(module) = node.child_by_field_name("module_name") else {
        return Vec::new();
    };
    let base = match module.kind() {
        "relative_import" => {
            let dots = children_of_kind(&module, &["import_prefix"])
                .first()
                .map(|p| file.text(p).len())
                .unwrap_or(1);
            let mut anchor = package;
            for _ in 1..dots {
                anchor = anchor.rsplit_once('.').map(|(parent, _)| parent).unwrap_or("");
            }
            match children_of_kind(&module, &["dotted_name"]).first() {
                Some(name) => qualify(anchor, file.text(name)),
                None => anchor.to_string(),
            }
        }
        _ => file.text(&module).to_string(),
    };

    if !children_of_kind(node, &["wildcard_import"]).is_empty() {
        return vec![Import::new(base).wildcard()];
    }
    children(node)
        .iter()
        .filter(|n| n.id() != module.id())
        .filter_map(|name| {
            let (path, alias) = match name.kind() {
                "dotted_name" => (*name, *name),
                "aliased_import" => (name.child_by_field_name("name")?, name.child_by_field_name("alias")?),
                _ => return None,
            };
            let path = file.text(&path);
            let alias = file.text(&alias);
            Some(Import::new(qualify(&base, path)).alias(alias))
        })
        .collect()
}

/// A module-level or class-level assignment to a simple name.
fn module_variable(assignment: &Node, file: &SourceFile, known: &[FieldDecl]) -> Option<FieldDecl> {
    let left = assignment.child_by_field_name("left")?;
    if left.kind() != "identifier" {
        return None;
    }
    let right = assignment.child_by_field_name("right");
    let type_name = assignment
        .child_by_field_name("type")
        .map(|t| file.text(&t).to_string())
        .or_else(|| right.and_then(|r| value_type(r, file, &HashMap::new(), known)));
    let mut field = FieldDecl::new(file.text(&left), type_name);
    if let Some(right) = right {
        field.value = string_value(&right, file);
        field.resource = resource_literal(right, file);
    }
    Some(field)
}

/// Written type of an assigned value, as far as the first pass can tell:
/// the class being constructed, an annotated parameter, or the handle a
/// data-access lookup was made on.
fn value_type(value: Node, file: &SourceFile, params: &HashMap<&str, String>, known: &[FieldDecl]) -> Option<String> {
    let known_type = |name: &str| {
        known
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.type_name.clone())
    };
    match value.kind() {
        "call" => {
            let function = value.child_by_field_name("function")?;
            if function.kind() == "attribute" {
                let method = file.text(&function.child_by_field_name("attribute")?);
                let navigates = capability::PYTHON
                    .data_access
                    .iter()
                    .any(|d| d.resource_lookup.contains(&method) || d.database_lookup.contains(&method));
                if navigates {
                    return value_type(function.child_by_field_name("object")?, file, params, known);
                }
            }
            matches!(function.kind(), "identifier" | "attribute").then(|| file.text(&function).to_string())
        }
        "subscript" => value_type(value.child_by_field_name("value")?, file, params, known),
        "identifier" => {
            let name = file.text(&value);
            params.get(name).cloned().or_else(|| known_type(name))
        }
        "attribute" => {
            let object = value.child_by_field_name("object")?;
            let attribute = file.text(&value.child_by_field_name("attribute")?);
            if file.text(&object) == "self" {
                known_type(attribute)
            } else {
                value_type(object, file, params, known)
            }
        }
        "await" | "parenthesized_expression" => value_type(children(&value).into_iter().next()?, file, params, known),
        _ => None,
    }
}

/// Literal collection name of a lookup: `db["users"]`, `db.get_collection("users")`.
fn resource_literal(node: Node, file: &SourceFile) -> Option<String> {
    match node.kind() {
        "subscript" => string_value(&node.child_by_field_name("subscript")?, file),
        "call" => {
            let function = node.child_by_field_name("function")?;
            if function.kind() != "attribute" {
                return None;
            }
            let method = file.text(&function.child_by_field_name("attribute")?);
            let is_lookup = capability::PYTHON
                .data_access
                .iter()
                .any(|d| d.resource_lookup.contains(&method));
            if !is_lookup {
                return None;
            }
            let first = children(&node.child_by_field_name("arguments")?).into_iter().next()?;
            string_value(&first, file)
        }
        "await" => resource_literal(children(&node).into_iter().next()?, file),
        _ => None,
    }
}

fn identifiers(node: Node) -> Vec<Node> {
    let mut found = Vec::new();
    walk(node, &mut |n| {
        if n.kind() == "identifier" {
            found.push(n);
        }
        true
    });
    found
}

fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name) || name.ends_with("Error") || name.ends_with("Exception")
}

fn typed(ty: TypeRef) -> ArgValue {
    if ty.is_unknown() {
        ArgValue::Dynamic
    } else {
        ArgValue::Typed(ty)
    }
}

/// Strip quotes of forward references, `Optional[...]` and `| None`.
/// Other generics stand for their container.
fn bare_type(raw: &str) -> String {
    let raw = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    if let Some(inner) = raw
        .strip_prefix("Optional[")
        .or_else(|| raw.strip_prefix("typing.Optional["))
        .and_then(|r| r.strip_suffix(']'))
    {
        return bare_type(inner);
    }
    if raw.contains('|') {
        return raw
            .split('|')
            .map(str::trim)
            .find(|part| *part != "None")
            .map(bare_type)
            .unwrap_or_default();
    }
    raw.split('[').next().unwrap_or(raw).trim().to_string()
}

fn string_value(node: &Node, file: &SourceFile) -> Option<String> {
    match node.kind() {
        "string" => unquote(file.text(node)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CallSite, ExtractSettings, SymbolIndex};
    use crate::graph::Relationship;

    fn settings() -> ExtractSettings {
        ExtractSettings {
            project: "Sample".into(),
            source_url_base: "http://localhost".into(),
            resource_store: "mongo".into(),
            resource_database: "UnknownDatabase".into(),
        }
    }

    fn build(files: &[(&str, &str)]) -> (Vec<SourceFile>, Vec<FileDeclarations>, SymbolIndex) {
        let extractor = PythonExtractor::new();
        let parsed: Vec<SourceFile> = files
            .iter()
            .map(|(p, c)| extractor.parse(p, c.to_string()).unwrap())
            .collect();
        let decls: Vec<FileDeclarations> = parsed.iter().map(|f| extractor.declarations(f)).collect();
        let index = SymbolIndex::build(&extractor, &decls, &settings());
        (parsed, decls, index)
    }

    fn sites(files: &[(&str, &str)], function: &str) -> (Vec<Classified>, SymbolIndex) {
        let extractor = PythonExtractor::new();
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
    fn test_module_paths() {
        assert_eq!(module_path("app/models/user.py"), ("app.models.user".into(), "app.models".into()));
        assert_eq!(module_path("app/models/__init__.py"), ("app.models".into(), "app.models".into()));
        assert_eq!(module_path("main.py"), ("main".into(), "".into()));
    }

    #[test]
    fn test_declarations() {
        let (_, decls, _) = build(&[(
            "app/services/users.py",
            r#"
import requests
import pymongo as pm
from ..models import User, Role as R
from . import helpers
from typing import *

BASE_URL = "http://users"

class UserService(Base):
    TIMEOUT = 5

    def __init__(self, repo: Repo, name="x"):
        self.repo = repo
        self.session = requests.Session()

    @staticmethod
    def build(*args, **kwargs) -> "UserService":
        pass

    def load(self, user_id: int):
        pass

def helper(a, b: str = ""):
    pass
"#,
        )]);
        let decls = &decls[0];
        assert_eq!(decls.namespace, "app.services.users");
        let imports: Vec<(&str, Option<&str>, bool)> = decls
            .imports
            .iter()
            .map(|i| (i.path.as_str(), i.alias.as_deref(), i.wildcard))
            .collect();
        assert_eq!(
            imports,
            vec![
                ("requests", None, false),
                ("pymongo", Some("pm"), false),
                ("app.models.User", Some("User"), false),
                ("app.models.Role", Some("R"), false),
                ("app.services.helpers", Some("helpers"), false),
                ("typing", None, true),
            ]
        );
        assert_eq!(decls.constants[0].value.as_deref(), Some("http://users"));

        let service = &decls.types[0];
        assert_eq!(service.bases, vec!["Base"]);
        let fields: Vec<(&str, Option<&str>)> = service
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.type_name.as_deref()))
            .collect();
        assert_eq!(
            fields,
            vec![("TIMEOUT", None), ("repo", Some("Repo")), ("session", Some("requests.Session"))]
        );

        let signatures: Vec<String> = decls.callables.iter().map(|c| c.signature()).collect();
        assert_eq!(
            signatures,
            vec!["__init__(Repo,Any)", "build(*Any,**Any)", "load(int)", "helper(Any,str)"]
        );
        assert_eq!(decls.callables[3].owner, Owner::Namespace);
    }

    #[test]
    fn test_abc_classes_are_interfaces() {
        let (_, decls, index) = build(&[(
            "shapes.py",
            r#"
from abc import ABC, abstractmethod

class Shape(ABC):
    @abstractmethod
    def area(self): ...

class Square(Shape):
    def area(self):
        return 1
"#,
        )]);
        let extractor = PythonExtractor::new();
        let settings = settings();
        assert_eq!(index.type_symbol("shapes.Shape").unwrap().kind, TypeKind::Interface);
        let square = index.type_symbol("shapes.Square").unwrap();
        assert_eq!(square.kind, TypeKind::Class);
        let scope = Scope::new(&index, &decls[0], extractor.capabilities(), &settings);
        assert_eq!(extractor.relationships(square, &scope)[0].relationship, Relationship::Implements);
    }

    #[test]
    fn test_calls_across_modules() {
        let (found, index) = sites(
            &[
                (
                    "app/repo.py",
                    "class Repo:\n    def save(self, item):\n        pass\n\ndef connect() -> Repo:\n    return Repo()\n",
                ),
                (
                    "app/service.py",
                    r#"
from app.repo import Repo, connect
import app.repo

class Service:
    def __init__(self, repo: Repo):
        self.repo = repo

    def run(self):
        self.repo.save(1)
        connect().save(2)
        self.helper()
        app.repo.connect()
        len([])

    def helper(self):
        pass
"#,
                ),
            ],
            "run",
        );
        let targets: Vec<String> = found
            .into_iter()
            .map(|c| match c {
                Classified::Site(CallSite::Ordinary { target, .. }) => {
                    let symbol = index.callable(target);
                    format!("{:?}.{}", symbol.owner, symbol.signature)
                }
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            targets,
            vec![
                "Type(\"app.repo.Repo\").save(Any)",
                "Type(\"app.repo.Repo\").save(Any)",
                "Namespace(\"app.repo\").connect()",
                "Type(\"app.service.Service\").helper()",
                "Namespace(\"app.repo\").connect()",
            ]
        );
    }

    #[test]
    fn test_http_and_mongo_calls() {
        let (found, _) = sites(
            &[(
                "app/store.py",
                r#"
import requests
from pymongo import MongoClient

ORDERS_URL = "http://orders/api"
client = MongoClient("mongodb://db")
users = client["shop"]["users"]

def sync(path):
    requests.get(ORDERS_URL)
    requests.get(f"http://orders/{path}")
    users.find_one({})
    client["shop"]["orders"].insert_one({})
    client.shop.carts.delete_many({})
    requests.post(url="http://orders/new", json={})
"#,
            )],
            "sync",
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
                    line: 10,
                    url: "http://orders/api".into()
                },
                CallSite::Network {
                    line: 11,
                    url: crate::identity::UNKNOWN_SERVICE_URL.into()
                },
                CallSite::Resource {
                    line: 12,
                    database: "UnknownDatabase".into(),
                    collection: "users".into()
                },
                CallSite::Resource {
                    line: 13,
                    database: "shop".into(),
                    collection: "orders".into()
                },
                CallSite::Resource {
                    line: 14,
                    database: "shop".into(),
                    collection: "carts".into()
                },
                CallSite::Network {
                    line: 15,
                    url: "http://orders/new".into()
                },
            ]
        );
    }

    #[test]
    fn test_bare_type() {
        assert_eq!(bare_type("Optional[User]"), "User");
        assert_eq!(bare_type("User | None"), "User");
        assert_eq!(bare_type("'User'"), "User");
        assert_eq!(bare_type("list[User]"), "list");
    }
}
