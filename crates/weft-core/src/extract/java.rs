//! Java extractor using tree-sitter.

use std::collections::HashMap;

use tree_sitter::Node;

use super::capability::{self, Capabilities};
use super::classify::{self, ArgValue, CallShape, ChainLink, Classified, Receiver};
use super::source::{children, children_of_kind, has_token, line, unquote, walk, SourceFile};
use super::symbols::{
    qualify, CallableDecl, FieldDecl, FileDeclarations, Import, Owner, OwnerRef, Param, TypeDecl, TypeKind, TypeRef,
};
use super::{Extractor, Language, LabelSet, Scope};
use crate::graph::Label;

const TYPE_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

const CALLABLE_KINDS: &[&str] = &["method_declaration", "constructor_declaration"];

const BODY_KINDS: &[&str] = &["class_body", "interface_body", "enum_body", "enum_body_declarations"];

const PRIMITIVES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double", "void", "var",
];

/// Java extractor using tree-sitter.
pub struct JavaExtractor {
    grammar: tree_sitter::Language,
}

impl JavaExtractor {
    pub fn new() -> Self {
        Self {
            grammar: tree_sitter_java::LANGUAGE.into(),
        }
    }

    fn collect(&self, file: &SourceFile, node: Node, namespace: &str, outer: Option<&str>, out: &mut Collected) {
        let mut namespace = namespace.to_string();
        for child in children(&node) {
            match child.kind() {
                "package_declaration" => {
                    if let Some(name) = children_of_kind(&child, &["identifier", "scoped_identifier"])
                        .into_iter()
                        .next()
                    {
                        namespace = file.text(&name).to_string();
                        out.package = Some(namespace.clone());
                    }
                }
                "import_declaration" => {
                    if let Some(import) = extract_import(&child, file) {
                        out.imports.push(import);
                    }
                }
                kind if BODY_KINDS.contains(&kind) => self.collect(file, child, &namespace, outer, out),
                kind if TYPE_KINDS.contains(&kind) => {
                    let Some(decl) = self.extract_type(&child, file, &namespace, outer) else {
                        continue;
                    };
                    let type_name = decl.name.clone();
                    out.types.push(decl);
                    if let Some(body) = child.child_by_field_name("body") {
                        self.collect(file, body, &namespace, Some(&type_name), out);
                    }
                }
                kind if CALLABLE_KINDS.contains(&kind) => {
                    if let Some(owner) = outer {
                        if let Some(callable) = self.extract_callable(&child, file, &namespace, owner) {
                            out.callables.push(callable);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn extract_type(&self, node: &Node, file: &SourceFile, namespace: &str, outer: Option<&str>) -> Option<TypeDecl> {
        let simple = file.text(&node.child_by_field_name("name")?);
        let name = match outer {
            Some(outer) => format!("{}.{}", outer, simple),
            None => simple.to_string(),
        };
        let kind = match node.kind() {
            "interface_declaration" => TypeKind::Interface,
            _ => TypeKind::Class,
        };

        let mut bases = Vec::new();
        if let Some(superclass) = node.child_by_field_name("superclass") {
            bases.extend(children(&superclass).first().map(|t| file.text(t).to_string()));
        }
        let lists = node
            .child_by_field_name("interfaces")
            .into_iter()
            .chain(children_of_kind(node, &["extends_interfaces"]));
        for list in lists {
            for types in children_of_kind(&list, &["type_list"]) {
                bases.extend(children(&types).iter().map(|t| file.text(t).to_string()));
            }
        }

        let mut fields = Vec::new();
        if let Some(parameters) = node.child_by_field_name("parameters") {
            for component in children_of_kind(&parameters, &["formal_parameter"]) {
                if let (Some(name), Some(ty)) = (component.child_by_field_name("name"), component.child_by_field_name("type"))
                {
                    fields.push(FieldDecl::new(file.text(&name), Some(file.text(&ty).to_string())));
                }
            }
        }
        let mut assigned = HashMap::new();
        if let Some(body) = node.child_by_field_name("body") {
            for member in members(body) {
                match member.kind() {
                    "field_declaration" | "constant_declaration" => fields.extend(self.extract_fields(&member, file)),
                    "constructor_declaration" => {
                        if let Some(ctor_body) = member.child_by_field_name("body") {
                            self.assigned_resources(ctor_body, file, &mut assigned);
                        }
                    }
                    _ => {}
                }
            }
        }
        for field in &mut fields {
            if field.resource.is_none() {
                field.resource = assigned.get(&field.name).cloned();
            }
        }

        Some(TypeDecl {
            namespace: namespace.to_string(),
            name,
            kind,
            bases,
            fields,
            line: line(node),
        })
    }

    fn extract_fields(&self, node: &Node, file: &SourceFile) -> Vec<FieldDecl> {
        // Interface fields are implicitly static final.
        let constant = node.kind() == "constant_declaration"
            || children_of_kind(node, &["modifiers"])
                .first()
                .is_some_and(|m| has_token(m, "static") && has_token(m, "final"));
        let type_name = node.child_by_field_name("type").map(|t| file.text(&t).to_string());

        let mut fields = Vec::new();
        for declarator in children_of_kind(node, &["variable_declarator"]) {
            let Some(name) = declarator.child_by_field_name("name") else {
                continue;
            };
            let mut field = FieldDecl::new(file.text(&name), type_name.clone());
            if let Some(value) = declarator.child_by_field_name("value") {
                if constant {
                    field.value = string_value(&value, file);
                }
                field.resource = resource_literal(value, file);
            }
            fields.push(field);
        }
        fields
    }

    /// Fields assigned a collection lookup: `this.users = db.getCollection("users")`.
    fn assigned_resources(&self, body: Node, file: &SourceFile, out: &mut HashMap<String, String>) {
        walk(body, &mut |n| {
            if n.kind() == "assignment_expression" {
                if let (Some(left), Some(right)) = (n.child_by_field_name("left"), n.child_by_field_name("right")) {
                    let target = match left.kind() {
                        "identifier" => Some(file.text(&left)),
                        "field_access" => left.child_by_field_name("field").map(|f| file.text(&f)),
                        _ => None,
                    };
                    if let (Some(target), Some(resource)) = (target, resource_literal(right, file)) {
                        out.insert(target.to_string(), resource);
                    }
                }
            }
            !matches!(n.kind(), "class_body" | "lambda_expression")
        });
    }

    fn extract_callable(&self, node: &Node, file: &SourceFile, namespace: &str, owner: &str) -> Option<CallableDecl> {
        let name = match node.kind() {
            "constructor_declaration" => owner.rsplit('.').next().unwrap_or(owner).to_string(),
            _ => file.text(&node.child_by_field_name("name")?).to_string(),
        };
        let return_type = node.child_by_field_name("type").map(|t| file.text(&t).to_string());
        let params = node
            .child_by_field_name("parameters")
            .map(|list| {
                children_of_kind(&list, &["formal_parameter", "spread_parameter"])
                    .iter()
                    .filter_map(|p| parameter(p, file))
                    .map(|(name, type_name, variadic)| Param {
                        name: name.to_string(),
                        type_name: if variadic {
                            format!("{}...", type_name)
                        } else {
                            type_name.to_string()
                        },
                        optional: false,
                        variadic,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(CallableDecl {
            name,
            namespace: namespace.to_string(),
            owner: Owner::Type(owner.to_string()),
            params,
            return_type,
            line: line(node),
            span: node.byte_range(),
        })
    }
}

impl Default for JavaExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Collected {
    package: Option<String>,
    imports: Vec<Import>,
    types: Vec<TypeDecl>,
    callables: Vec<CallableDecl>,
}

impl Extractor for JavaExtractor {
    fn language(&self) -> Language {
        Language::Java
    }

    fn grammar(&self) -> tree_sitter::Language {
        self.grammar.clone()
    }

    fn labels(&self) -> LabelSet {
        LabelSet {
            namespace: Label::Package,
            class: Label::Class,
            interface: Label::Interface,
            structure: Label::Class,
            method: Label::Method,
            function: Label::Method,
        }
    }

    fn capabilities(&self) -> &'static Capabilities {
        &capability::JAVA
    }

    fn declarations(&self, file: &SourceFile) -> FileDeclarations {
        let mut out = Collected::default();
        self.collect(file, file.root(), "", None, &mut out);

        let mut decls = FileDeclarations::new(file.path(), out.package.unwrap_or_default());
        decls.imports = out.imports;
        decls.types = out.types;
        decls.callables = out.callables;
        decls
    }

    fn resolve_type(&self, raw: &str, scope: &Scope<'_>) -> TypeRef {
        let name = bare_type(raw);
        if name.is_empty() || PRIMITIVES.contains(&name.as_str()) {
            return TypeRef::Unknown;
        }
        let index = scope.index;
        let imports = &scope.file.imports;

        // Single-type imports bind the simple name of the leading segment.
        let head = name.split('.').next().unwrap_or(&name);
        if let Some(import) = imports
            .iter()
            .find(|i| !i.wildcard && !i.member && i.alias.as_deref() == Some(head))
        {
            let full = format!("{}{}", import.path, &name[head.len()..]);
            if index.has_type(&full) {
                return TypeRef::Declared(full);
            }
            return match full.rsplit_once('.') {
                Some((namespace, simple)) => TypeRef::external(namespace, simple),
                None => TypeRef::Unknown,
            };
        }

        for candidate in scope.enclosing() {
            let qualified = qualify(&candidate, &name);
            if index.has_type(&qualified) {
                return TypeRef::Declared(qualified);
            }
        }
        if index.has_type(&name) {
            return TypeRef::Declared(name);
        }
        if let Some((namespace, simple)) = name.rsplit_once('.') {
            return TypeRef::external(namespace, simple);
        }

        let on_demand: Vec<&Import> = imports.iter().filter(|i| i.wildcard && !i.member).collect();
        for import in &on_demand {
            let qualified = qualify(&import.path, &name);
            if index.has_type(&qualified) {
                return TypeRef::Declared(qualified);
            }
        }
        for import in &on_demand {
            if scope.capabilities.knows(&import.path, &name) {
                return TypeRef::external(import.path.clone(), name);
            }
        }
        // java.lang names nothing the tables know.
        scope.capabilities.fallback_type(&name).unwrap_or(TypeRef::Unknown)
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
        };
        body.bind_parameters(&node);
        body.bind_locals(block);

        let mut sites = Vec::new();
        walk(block, &mut |n| {
            match n.kind() {
                "method_invocation" => {
                    if let Some(shape) = body.shape(n) {
                        sites.push(classify::classify(&shape, scope));
                    }
                }
                "object_creation_expression" => {
                    if let Some(shape) = body.construction(n) {
                        sites.push(classify::classify(&shape, scope));
                    }
                }
                _ => {}
            }
            // Anonymous and local classes declare their own callables.
            n.kind() != "class_body" && !TYPE_KINDS.contains(&n.kind())
        });
        sites
    }
}

/// Per-callable resolution state.
struct Body<'a> {
    extractor: &'a JavaExtractor,
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

    fn owner(&self) -> Option<&'a str> {
        self.scope.owner
    }

    fn bind_parameters(&mut self, callable: &Node) {
        let Some(list) = callable.child_by_field_name("parameters") else {
            return;
        };
        for param in children_of_kind(&list, &["formal_parameter", "spread_parameter"]) {
            if let Some((name, ty, variadic)) = parameter(&param, self.file) {
                // Varargs are arrays; nothing is called on them directly.
                let resolved = if variadic { TypeRef::Unknown } else { self.resolve(ty) };
                self.locals.insert(name.to_string(), resolved);
            }
        }
    }

    /// Locals in document order, so `var` initializers see earlier locals.
    fn bind_locals(&mut self, block: Node) {
        let mut declarations = Vec::new();
        walk(block, &mut |n| {
            if matches!(n.kind(), "local_variable_declaration" | "enhanced_for_statement") {
                declarations.push(n);
            }
            n.kind() != "class_body"
        });

        for decl in declarations {
            let type_text = decl.child_by_field_name("type").map(|t| self.text(&t)).unwrap_or("var");
            if decl.kind() == "enhanced_for_statement" {
                if let Some(name) = decl.child_by_field_name("name") {
                    let ty = if type_text == "var" { TypeRef::Unknown } else { self.resolve(type_text) };
                    self.locals.insert(self.text(&name).to_string(), ty);
                }
                continue;
            }
            let constant = children_of_kind(&decl, &["modifiers"])
                .first()
                .is_some_and(|m| has_token(m, "final"));
            for declarator in children_of_kind(&decl, &["variable_declarator"]) {
                let Some(name) = declarator.child_by_field_name("name").map(|n| self.text(&n)) else {
                    continue;
                };
                let value = declarator.child_by_field_name("value");
                let ty = if type_text == "var" {
                    value.map(|v| self.infer(v)).unwrap_or(TypeRef::Unknown)
                } else {
                    self.resolve(type_text)
                };
                if let Some(value) = value {
                    if constant {
                        if let Some(literal) = string_value(&value, self.file) {
                            self.consts.insert(name.to_string(), literal);
                        }
                    }
                    if let Some(resource) = resource_literal(value, self.file) {
                        self.hints.insert(name.to_string(), resource);
                    }
                }
                self.locals.insert(name.to_string(), ty);
            }
        }
    }

    /// Declared types lexically enclosing the callable, innermost first.
    fn enclosing_types(&self) -> Vec<String> {
        self.scope
            .enclosing()
            .into_iter()
            .filter(|t| self.scope.index.has_type(t))
            .collect()
    }

    fn name_type(&self, name: &str) -> TypeRef {
        if let Some(ty) = self.locals.get(name) {
            return ty.clone();
        }
        for ty in self.enclosing_types() {
            if let Some(field) = self.scope.index.field(&ty, name) {
                return field.ty.clone();
            }
        }
        static_type(self.resolve(name), self.scope)
    }

    fn infer(&self, node: Node) -> TypeRef {
        match node.kind() {
            "identifier" => self.name_type(self.text(&node)),
            "this" => self
                .owner()
                .map(|o| TypeRef::Declared(o.to_string()))
                .unwrap_or(TypeRef::Unknown),
            "super" => self.base_type(),
            "field_access" => {
                let (Some(object), Some(field)) = (node.child_by_field_name("object"), node.child_by_field_name("field"))
                else {
                    return TypeRef::Unknown;
                };
                let name = self.text(&field);
                match self.infer(object) {
                    TypeRef::Declared(qualified) => {
                        if let Some(field) = self.scope.index.field(&qualified, name) {
                            return field.ty.clone();
                        }
                        let nested = format!("{}.{}", qualified, name);
                        if self.scope.index.has_type(&nested) {
                            TypeRef::Declared(nested)
                        } else {
                            TypeRef::Unknown
                        }
                    }
                    // A package-qualified type name: `java.net.http.HttpClient`.
                    TypeRef::Unknown => static_type(self.resolve(self.text(&node)), self.scope),
                    _ => TypeRef::Unknown,
                }
            }
            "method_invocation" => self
                .shape(node)
                .map(|shape| classify::return_type(&shape, self.scope))
                .unwrap_or(TypeRef::Unknown),
            "object_creation_expression" | "cast_expression" => node
                .child_by_field_name("type")
                .map(|t| self.resolve(self.text(&t)))
                .unwrap_or(TypeRef::Unknown),
            "parenthesized_expression" => children(&node)
                .first()
                .map(|inner| self.infer(*inner))
                .unwrap_or(TypeRef::Unknown),
            _ => TypeRef::Unknown,
        }
    }

    fn base_type(&self) -> TypeRef {
        self.owner()
            .and_then(|o| self.scope.index.type_symbol(o))
            .and_then(|symbol| symbol.bases.first().cloned())
            .unwrap_or(TypeRef::Unknown)
    }

    /// String value of a constant reachable by simple name.
    fn constant(&self, name: &str) -> Option<String> {
        if let Some(value) = self.consts.get(name) {
            return Some(value.clone());
        }
        if self.locals.contains_key(name) {
            return None;
        }
        for ty in self.enclosing_types() {
            if let Some(value) = self.scope.index.field(&ty, name).and_then(|f| f.value.clone()) {
                return Some(value);
            }
        }
        let owner = self.static_import(name)?;
        self.scope.index.field(&owner, name).and_then(|f| f.value.clone())
    }

    /// Declared type a statically imported member named `name` belongs to.
    fn static_import(&self, name: &str) -> Option<String> {
        let index = self.scope.index;
        for import in self.scope.file.imports.iter().filter(|i| i.member) {
            if import.wildcard {
                if index.has_type(&import.path)
                    && (!index.methods(&import.path, name).is_empty() || index.field(&import.path, name).is_some())
                {
                    return Some(import.path.clone());
                }
            } else if import.alias.as_deref() == Some(name) {
                if let Some((owner, _)) = import.path.rsplit_once('.') {
                    if index.has_type(owner) {
                        return Some(owner.to_string());
                    }
                }
            }
        }
        None
    }

    fn arg_value(&self, node: Node) -> ArgValue {
        if let Some(value) = string_value(&node, self.file) {
            return ArgValue::Str(value);
        }
        match node.kind() {
            "decimal_integer_literal"
            | "hex_integer_literal"
            | "octal_integer_literal"
            | "binary_integer_literal"
            | "decimal_floating_point_literal"
            | "hex_floating_point_literal" => ArgValue::Number,
            "true" | "false" => ArgValue::Bool,
            "null_literal" => ArgValue::Null,
            "identifier" => match self.constant(self.text(&node)) {
                Some(value) => ArgValue::Str(value),
                None => typed(self.infer(node)),
            },
            "field_access" => {
                let constant = match (node.child_by_field_name("object"), node.child_by_field_name("field")) {
                    (Some(object), Some(field)) => match self.infer(object) {
                        TypeRef::Declared(q) => self
                            .scope
                            .index
                            .field(&q, self.text(&field))
                            .and_then(|f| f.value.clone()),
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
        let method = self.text(&node.child_by_field_name("name")?);
        let object = node.child_by_field_name("object");
        let receiver = match object {
            Some(object) => Receiver::Value(self.infer(object)),
            None => self.implicit_receiver(method),
        };
        let mut shape = CallShape::new(line(&node), method, receiver).with_args(self.args(&node));
        if let Some(object) = object {
            shape.chain = self.chain(object);
            shape.resource_hint = self.hint(object);
        }
        Some(shape)
    }

    /// Unqualified calls reach methods of the enclosing types and statically
    /// imported members besides the type's own.
    fn implicit_receiver(&self, method: &str) -> Receiver {
        let index = self.scope.index;
        let types = self.enclosing_types();
        if types.first().is_some_and(|own| !index.methods(own, method).is_empty()) {
            return Receiver::Implicit;
        }
        if let Some(outer) = types.iter().skip(1).find(|t| !index.methods(t, method).is_empty()) {
            return Receiver::Value(TypeRef::Declared(outer.clone()));
        }
        match self.static_import(method) {
            Some(owner) => Receiver::Value(TypeRef::Declared(owner)),
            None => Receiver::Implicit,
        }
    }

    fn construction(&self, node: Node) -> Option<CallShape> {
        let ty = node.child_by_field_name("type")?;
        let TypeRef::Declared(qualified) = self.resolve(self.text(&ty)) else {
            return None;
        };
        let ctor = qualified.rsplit('.').next().unwrap_or(&qualified).to_string();
        // Types without declared constructors construct implicitly.
        if self
            .scope
            .index
            .owned(&OwnerRef::Type(qualified.clone()), &ctor)
            .is_empty()
        {
            return None;
        }
        Some(CallShape::new(line(&node), ctor, Receiver::Value(TypeRef::Declared(qualified))).with_args(self.args(&node)))
    }

    /// Calls chained before the receiver, nearest first.
    fn chain(&self, mut node: Node) -> Vec<ChainLink> {
        let mut links = Vec::new();
        loop {
            match node.kind() {
                "method_invocation" => {
                    let method = node
                        .child_by_field_name("name")
                        .map(|n| self.text(&n))
                        .unwrap_or_default();
                    let first_arg = arguments(node)
                        .into_iter()
                        .next()
                        .map(|a| self.arg_value(a))
                        .unwrap_or(ArgValue::Dynamic);
                    links.push(ChainLink {
                        method: method.to_string(),
                        first_arg,
                    });
                    match node.child_by_field_name("object") {
                        Some(next) => node = next,
                        None => break,
                    }
                }
                "field_access" => match node.child_by_field_name("object") {
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
        let name = match target.kind() {
            "identifier" => {
                let name = self.text(&target);
                if let Some(hint) = self.hints.get(name) {
                    return Some(hint.clone());
                }
                if self.locals.contains_key(name) {
                    return None;
                }
                name
            }
            "field_access" => {
                let object = target.child_by_field_name("object")?;
                if object.kind() != "this" {
                    return None;
                }
                self.text(&target.child_by_field_name("field")?)
            }
            _ => return None,
        };
        self.owner()
            .and_then(|o| self.scope.index.field(o, name))
            .and_then(|f| f.resource.clone())
    }
}

fn extract_import(node: &Node, file: &SourceFile) -> Option<Import> {
    let name = children_of_kind(node, &["identifier", "scoped_identifier"])
        .into_iter()
        .next()?;
    let path = file.text(&name).to_string();
    let member = has_token(node, "static");
    let wildcard = !children_of_kind(node, &["asterisk"]).is_empty() || has_token(node, "*");

    let mut import = if wildcard {
        Import::new(path).wildcard()
    } else {
        let simple = path.rsplit('.').next().unwrap_or(&path).to_string();
        Import::new(path).alias(simple)
    };
    if member {
        import = import.member();
    }
    Some(import)
}

/// Members of a type body, looking through an enum's declaration section.
fn members(body: Node) -> Vec<Node> {
    children(&body)
        .into_iter()
        .flat_map(|member| {
            if member.kind() == "enum_body_declarations" {
                children(&member)
            } else {
                vec![member]
            }
        })
        .collect()
}

/// `(name, type, variadic)` of a formal or spread parameter.
fn parameter<'f>(node: &Node, file: &'f SourceFile) -> Option<(&'f str, &'f str, bool)> {
    if node.kind() == "spread_parameter" {
        let ty = children(node)
            .into_iter()
            .find(|c| !matches!(c.kind(), "modifiers" | "variable_declarator"))?;
        let declarator = children_of_kind(node, &["variable_declarator"]).into_iter().next()?;
        let name = declarator.child_by_field_name("name")?;
        return Some((file.text(&name), file.text(&ty), true));
    }
    let name = node.child_by_field_name("name")?;
    let ty = node.child_by_field_name("type")?;
    Some((file.text(&name), file.text(&ty), false))
}

/// Literal collection name of a lookup call.
fn resource_literal(node: Node, file: &SourceFile) -> Option<String> {
    if node.kind() != "method_invocation" {
        return None;
    }
    let method = file.text(&node.child_by_field_name("name")?);
    let is_lookup = capability::JAVA
        .data_access
        .iter()
        .any(|d| d.resource_lookup.contains(&method));
    if !is_lookup {
        return None;
    }
    let first = arguments(node).into_iter().next()?;
    string_value(&first, file)
}

/// Keep only types that name something: project types or capability types.
fn static_type(ty: TypeRef, scope: &Scope<'_>) -> TypeRef {
    match &ty {
        TypeRef::Declared(_) => ty,
        TypeRef::External { namespace, name } if scope.capabilities.knows(namespace, name) => ty,
        _ => TypeRef::Unknown,
    }
}

fn typed(ty: TypeRef) -> ArgValue {
    if ty.is_unknown() {
        ArgValue::Dynamic
    } else {
        ArgValue::Typed(ty)
    }
}

/// Strip annotations, generic arguments, arrays and varargs.
fn bare_type(raw: &str) -> String {
    let mut raw = raw.trim();
    while raw.starts_with('@') {
        match raw.split_once(char::is_whitespace) {
            Some((_, rest)) => raw = rest.trim_start(),
            None => return String::new(),
        }
    }
    let mut head = raw.split('<').next().unwrap_or(raw).trim();
    head = head.trim_end_matches("...");
    while let Some(inner) = head.strip_suffix("[]") {
        head = inner.trim_end();
    }
    head.to_string()
}

fn arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    call.child_by_field_name("arguments")
        .map(|list| children(&list))
        .unwrap_or_default()
}

fn string_value(node: &Node, file: &SourceFile) -> Option<String> {
    match node.kind() {
        "string_literal" | "character_literal" => unquote(file.text(node)),
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

    fn parse(path: &str, code: &str) -> SourceFile {
        JavaExtractor::new().parse(path, code.to_string()).unwrap()
    }

    fn index_files(files: &[(&str, &str)]) -> (Vec<SourceFile>, Vec<FileDeclarations>, SymbolIndex) {
        let extractor = JavaExtractor::new();
        let parsed: Vec<SourceFile> = files.iter().map(|(p, c)| parse(p, c)).collect();
        let decls: Vec<FileDeclarations> = parsed.iter().map(|f| extractor.declarations(f)).collect();
        let index = SymbolIndex::build(&extractor, &decls, &settings());
        (parsed, decls, index)
    }

    fn sites(files: &[(&str, &str)], method: &str) -> (Vec<Classified>, SymbolIndex) {
        let extractor = JavaExtractor::new();
        let settings = settings();
        let (parsed, decls, index) = index_files(files);
        for (file, decl) in parsed.iter().zip(&decls) {
            if let Some(callable) = decl.callables.iter().find(|c| c.name == method) {
                let owner = callable.owner_type();
                let scope = Scope::new(&index, decl, extractor.capabilities(), &settings)
                    .within(&callable.namespace, owner.as_deref());
                let found = extractor.call_sites(callable, file, &scope);
                return (found, index);
            }
        }
        panic!("method {} not found", method);
    }

    fn ordinary_targets(found: Vec<Classified>, index: &SymbolIndex) -> Vec<String> {
        found
            .into_iter()
            .filter_map(|c| match c {
                Classified::Site(CallSite::Ordinary { target, .. }) => Some(index.callable(target).signature.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_declarations() {
        let file = parse(
            "src/main/java/com/acme/UserService.java",
            r#"
package com.acme;

import java.util.List;
import com.acme.data.*;
import static com.acme.Urls.BASE;

public class UserService extends BaseService implements Loader {
    private static final String USERS = "http://users";
    private final Repo repo;

    public UserService(Repo repo) { this.repo = repo; }

    public void load(int id) { }
    public void load(String name, int... rest) { }

    enum Mode { ON, OFF; void flip() { } }
}
"#,
        );
        let decls = JavaExtractor::new().declarations(&file);
        assert_eq!(decls.namespace, "com.acme");
        assert_eq!(decls.imports.len(), 3);
        assert_eq!(decls.imports[0].alias.as_deref(), Some("List"));
        assert!(decls.imports[1].wildcard);
        assert!(decls.imports[2].member);

        let names: Vec<&str> = decls.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["UserService", "UserService.Mode"]);
        assert_eq!(decls.types[0].bases, vec!["BaseService", "Loader"]);
        let users = decls.types[0].fields.iter().find(|f| f.name == "USERS").unwrap();
        assert_eq!(users.value.as_deref(), Some("http://users"));

        let signatures: Vec<String> = decls.callables.iter().map(|c| c.signature()).collect();
        assert_eq!(
            signatures,
            vec!["UserService(Repo)", "load(int)", "load(String,int...)", "flip()"]
        );
        assert!(decls.callables[2].params[1].variadic);
    }

    #[test]
    fn test_interfaces_and_cross_file_types() {
        let (_, decls, index) = index_files(&[
            ("a/Loader.java", "package com.acme.api;\npublic interface Loader { void load(); }\n"),
            (
                "b/Impl.java",
                "package com.acme.impl;\nimport com.acme.api.Loader;\npublic class Impl implements Loader { public void load() { } }\n",
            ),
        ]);
        let extractor = JavaExtractor::new();
        let settings = settings();
        let symbol = index.type_symbol("com.acme.impl.Impl").unwrap();
        assert_eq!(symbol.bases, vec![TypeRef::Declared("com.acme.api.Loader".into())]);
        let scope = Scope::new(&index, &decls[1], extractor.capabilities(), &settings);
        let relations = extractor.relationships(symbol, &scope);
        assert_eq!(relations[0].relationship, Relationship::Implements);
    }

    #[test]
    fn test_calls_bind_to_overloads_and_static_imports() {
        let (found, index) = sites(
            &[
                (
                    "Util.java",
                    "package com.acme;\npublic class Util { public static void audit(String s) { } }\n",
                ),
                (
                    "Foo.java",
                    r#"
package com.acme;
import static com.acme.Util.audit;
class Foo {
    void bar() { baz(); log("x"); log(1); audit("y"); new Helper().run(); }
    void baz() { }
    void log(String s) { }
    void log(int n) { }
}
class Helper { void run() { } }
"#,
                ),
            ],
            "bar",
        );
        assert_eq!(
            ordinary_targets(found, &index),
            vec!["baz()", "log(String)", "log(int)", "audit(String)", "run()"]
        );
    }

    #[test]
    fn test_http_and_mongo_calls() {
        let (found, _) = sites(
            &[(
                "Repo.java",
                r#"
package com.acme;

import org.springframework.web.client.RestTemplate;
import org.springframework.web.reactive.function.client.WebClient;
import com.mongodb.client.*;

class Repo {
    private static final String USERS = "http://users/api";
    private final RestTemplate rest = new RestTemplate();
    private final MongoCollection<Document> orders;

    Repo(MongoDatabase db) { this.orders = db.getCollection("orders"); }

    void sync(String path, MongoClient client, WebClient web) {
        rest.getForObject(USERS, String.class);
        rest.getForObject(path, String.class);
        client.getDatabase("shop").getCollection("users").find();
        orders.insertOne(null);
        web.get().uri("http://web/api").retrieve();
    }
}
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
        assert!(sites.contains(&CallSite::Network {
            line: 16,
            url: "http://users/api".into()
        }));
        assert!(sites.contains(&CallSite::Network {
            line: 17,
            url: crate::identity::UNKNOWN_SERVICE_URL.into()
        }));
        assert!(sites.contains(&CallSite::Resource {
            line: 18,
            database: "shop".into(),
            collection: "users".into()
        }));
        assert!(sites.contains(&CallSite::Resource {
            line: 19,
            database: "UnknownDatabase".into(),
            collection: "orders".into()
        }));
        assert!(sites.contains(&CallSite::Network {
            line: 20,
            url: "http://web/api".into()
        }));
    }

    #[test]
    fn test_bare_type() {
        assert_eq!(bare_type("List<String>"), "List");
        assert_eq!(bare_type("int[][]"), "int");
        assert_eq!(bare_type("String..."), "String");
        assert_eq!(bare_type("@NonNull User"), "User");
        assert_eq!(bare_type("Map.Entry<K, V>"), "Map.Entry");
    }
}
