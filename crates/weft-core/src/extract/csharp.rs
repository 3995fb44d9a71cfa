//! C# extractor using tree-sitter.

use std::collections::HashMap;

use tree_sitter::Node;

use super::capability::{self, Capabilities};
use super::classify::{self, ArgValue, CallShape, ChainLink, Classified, Receiver};
use super::source::{children, children_of_kind, has_token, line, unquote, walk, SourceFile};
use super::symbols::{
    qualify, CallableDecl, FieldDecl, FileDeclarations, Import, Owner, Param, TypeDecl, TypeKind, TypeRef,
};
use super::{Extractor, Language, LabelSet, Scope};
use crate::graph::Label;

const TYPE_KINDS: &[&str] = &[
    "class_declaration",
    "record_declaration",
    "record_struct_declaration",
    "struct_declaration",
    "interface_declaration",
];

const CALLABLE_KINDS: &[&str] = &["method_declaration", "constructor_declaration"];

const PREDEFINED: &[&str] = &[
    "bool", "byte", "sbyte", "char", "decimal", "double", "float", "int", "uint", "long", "ulong", "short",
    "ushort", "object", "string", "void", "dynamic", "var", "nint", "nuint",
];

/// C# extractor using tree-sitter.
pub struct CSharpExtractor {
    grammar: tree_sitter::Language,
}

impl CSharpExtractor {
    pub fn new() -> Self {
        Self {
            grammar: tree_sitter_c_sharp::LANGUAGE.into(),
        }
    }

    fn collect(&self, file: &SourceFile, node: Node, namespace: &str, outer: Option<&str>, out: &mut Collected) {
        let mut namespace = namespace.to_string();
        for child in children(&node) {
            match child.kind() {
                "using_directive" => {
                    if let Some(import) = self.extract_using(&child, file) {
                        out.imports.push(import);
                    }
                }
                "namespace_declaration" => {
                    let Some(name) = child.child_by_field_name("name") else {
                        continue;
                    };
                    let full = qualify(&namespace, file.text(&name));
                    out.namespace(&full);
                    if let Some(body) = child.child_by_field_name("body") {
                        self.collect(file, body, &full, None, out);
                    }
                }
                "file_scoped_namespace_declaration" => {
                    // Applies to the rest of the file, whether the grammar
                    // nests the members or leaves them as siblings.
                    if let Some(name) = child.child_by_field_name("name") {
                        namespace = file.text(&name).to_string();
                        out.namespace(&namespace);
                    }
                    self.collect(file, child, &namespace, None, out);
                }
                "declaration_list" => self.collect(file, child, &namespace, outer, out),
                kind if TYPE_KINDS.contains(&kind) => {
                    let Some(decl) = self.extract_type(&child, file, &namespace, outer) else {
                        continue;
                    };
                    out.namespace(&namespace);
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

    fn extract_using(&self, node: &Node, file: &SourceFile) -> Option<Import> {
        let named = children(node);
        let target = named.last()?;
        let mut import = Import::new(file.text(target).replace("global::", ""));
        if let Some(equals) = named.iter().find(|n| n.kind() == "name_equals") {
            let alias = children_of_kind(equals, &["identifier"]).into_iter().next()?;
            import = import.alias(file.text(&alias));
        } else if has_token(node, "=") {
            let alias = named.first().filter(|n| n.id() != target.id())?;
            import = import.alias(file.text(alias));
        } else {
            import = import.wildcard();
        }
        import.global = has_token(node, "global");
        Some(import)
    }

    fn extract_type(&self, node: &Node, file: &SourceFile, namespace: &str, outer: Option<&str>) -> Option<TypeDecl> {
        let name_node = node.child_by_field_name("name")?;
        let simple = file.text(&name_node);
        let name = match outer {
            Some(outer) => format!("{}.{}", outer, simple),
            None => simple.to_string(),
        };
        let kind = match node.kind() {
            "interface_declaration" => TypeKind::Interface,
            "struct_declaration" | "record_struct_declaration" => TypeKind::Struct,
            "record_declaration" if has_token(node, "struct") => TypeKind::Struct,
            _ => TypeKind::Class,
        };

        let bases = children_of_kind(node, &["base_list"])
            .into_iter()
            .flat_map(|list| children(&list))
            .filter_map(|base| match base.kind() {
                "primary_constructor_base_type" => children(&base).first().map(|t| file.text(t).to_string()),
                "argument_list" => None,
                _ => Some(file.text(&base).to_string()),
            })
            .collect();

        let mut fields = Vec::new();
        let mut assigned: HashMap<String, String> = HashMap::new();
        if let Some(body) = node.child_by_field_name("body") {
            for member in children(&body) {
                match member.kind() {
                    "field_declaration" => fields.extend(self.extract_fields(&member, file)),
                    "property_declaration" => {
                        if let Some(name) = member.child_by_field_name("name") {
                            let type_name = member.child_by_field_name("type").map(|t| file.text(&t).to_string());
                            fields.push(FieldDecl::new(file.text(&name), type_name));
                        }
                    }
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
        let constant = modifiers(node, file)
            .iter()
            .any(|m| *m == "const" || *m == "readonly");
        let mut fields = Vec::new();
        for declaration in children_of_kind(node, &["variable_declaration"]) {
            let type_name = declaration
                .child_by_field_name("type")
                .map(|t| file.text(&t).to_string());
            for declarator in children_of_kind(&declaration, &["variable_declarator"]) {
                let Some(name) = declarator_name(&declarator, file) else {
                    continue;
                };
                let mut field = FieldDecl::new(name, type_name.clone());
                if let Some(init) = initializer(&declarator) {
                    if constant {
                        field.value = string_value(&init, file);
                    }
                    field.resource = self.resource_literal(init, file);
                }
                fields.push(field);
            }
        }
        fields
    }

    /// Fields assigned a collection lookup: `_users = db.GetCollection<User>("users")`.
    fn assigned_resources(&self, body: Node, file: &SourceFile, out: &mut HashMap<String, String>) {
        walk(body, &mut |n| {
            if n.kind() == "assignment_expression" {
                if let (Some(left), Some(right)) = (n.child_by_field_name("left"), n.child_by_field_name("right")) {
                    let target = match left.kind() {
                        "identifier" => Some(file.text(&left)),
                        "member_access_expression" => left.child_by_field_name("name").map(|n| file.text(&n)),
                        _ => None,
                    };
                    if let (Some(target), Some(resource)) = (target, self.resource_literal(right, file)) {
                        out.insert(target.to_string(), resource);
                    }
                }
            }
            true
        });
    }

    /// Literal collection name of a lookup call, looking through `await`.
    fn resource_literal(&self, node: Node, file: &SourceFile) -> Option<String> {
        let node = unwrap_expression(node);
        if node.kind() != "invocation_expression" {
            return None;
        }
        let function = node.child_by_field_name("function")?;
        let method = function
            .child_by_field_name("name")
            .map(|n| simple_name(&n, file))
            .unwrap_or_default();
        let is_lookup = capability::CSHARP
            .data_access
            .iter()
            .any(|d| d.resource_lookup.contains(&method));
        if !is_lookup {
            return None;
        }
        let first = arguments(node).into_iter().next()?;
        string_value(&first, file)
    }

    fn extract_callable(&self, node: &Node, file: &SourceFile, namespace: &str, owner: &str) -> Option<CallableDecl> {
        let name = match node.kind() {
            "constructor_declaration" => owner.rsplit('.').next().unwrap_or(owner).to_string(),
            _ => file.text(&node.child_by_field_name("name")?).to_string(),
        };
        let return_type = node
            .child_by_field_name("returns")
            .or_else(|| node.child_by_field_name("type"))
            .map(|t| file.text(&t).to_string());

        let params = node
            .child_by_field_name("parameters")
            .map(|list| {
                children_of_kind(&list, &["parameter", "parameter_array"])
                    .into_iter()
                    .map(|p| Param {
                        name: p
                            .child_by_field_name("name")
                            .map(|n| file.text(&n).to_string())
                            .unwrap_or_default(),
                        type_name: p
                            .child_by_field_name("type")
                            .or_else(|| children_of_kind(&p, &["array_type"]).into_iter().next())
                            .map(|t| file.text(&t).to_string())
                            .unwrap_or_else(|| "object".to_string()),
                        optional: has_token(&p, "=") || !children_of_kind(&p, &["equals_value_clause"]).is_empty(),
                        variadic: p.kind() == "parameter_array"
                            || has_token(&p, "params")
                            || file.text(&p).starts_with("params "),
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

impl Default for CSharpExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Collected {
    namespaces: Vec<String>,
    imports: Vec<Import>,
    types: Vec<TypeDecl>,
    callables: Vec<CallableDecl>,
}

impl Collected {
    fn namespace(&mut self, namespace: &str) {
        if !self.namespaces.iter().any(|n| n == namespace) {
            self.namespaces.push(namespace.to_string());
        }
    }
}

impl Extractor for CSharpExtractor {
    fn language(&self) -> Language {
        Language::CSharp
    }

    fn grammar(&self) -> tree_sitter::Language {
        self.grammar.clone()
    }

    fn labels(&self) -> LabelSet {
        LabelSet {
            namespace: Label::Namespace,
            class: Label::Class,
            interface: Label::Interface,
            structure: Label::Struct,
            method: Label::Method,
            function: Label::Method,
        }
    }

    fn capabilities(&self) -> &'static Capabilities {
        &capability::CSHARP
    }

    fn declarations(&self, file: &SourceFile) -> FileDeclarations {
        let mut out = Collected::default();
        self.collect(file, file.root(), "", None, &mut out);

        let primary = out.namespaces.first().cloned().unwrap_or_default();
        let mut decls = FileDeclarations::new(file.path(), primary);
        for namespace in &out.namespaces {
            decls.add_namespace(namespace);
        }
        decls.imports = out.imports;
        decls.types = out.types;
        decls.callables = out.callables;
        decls
    }

    fn resolve_type(&self, raw: &str, scope: &Scope<'_>) -> TypeRef {
        let name = bare_type(raw);
        if name.is_empty() || PREDEFINED.contains(&name.as_str()) {
            return TypeRef::Unknown;
        }
        let index = scope.index;
        let imports: Vec<&Import> = scope
            .file
            .imports
            .iter()
            .chain(index.global_imports())
            .collect();

        // Aliases replace the leading segment.
        let head = name.split('.').next().unwrap_or(&name);
        let name = match imports.iter().find(|i| i.alias.as_deref() == Some(head)) {
            Some(alias) => format!("{}{}", alias.path, &name[head.len()..]),
            None => name,
        };

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

        for import in imports.iter().filter(|i| i.wildcard) {
            let qualified = qualify(&import.path, &name);
            if index.has_type(&qualified) {
                return TypeRef::Declared(qualified);
            }
        }
        for import in imports.iter().filter(|i| i.wildcard) {
            if scope.capabilities.knows(&import.path, &name) {
                return TypeRef::external(import.path.clone(), name);
            }
        }
        scope.capabilities.fallback_type(&name).unwrap_or(TypeRef::Unknown)
    }

    fn call_sites(&self, callable: &CallableDecl, file: &SourceFile, scope: &Scope<'_>) -> Vec<Classified> {
        let Some(node) = file.find(&callable.span, CALLABLE_KINDS) else {
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
        let Some(block) = node.child_by_field_name("body") else {
            return Vec::new();
        };
        body.bind_locals(block);

        let mut sites = Vec::new();
        walk(block, &mut |n| {
            match n.kind() {
                "invocation_expression" => {
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
            !TYPE_KINDS.contains(&n.kind())
        });
        sites
    }
}

/// Per-callable resolution state.
struct Body<'a> {
    extractor: &'a CSharpExtractor,
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

    fn bind_parameters(&mut self, callable: &Node) {
        let Some(list) = callable.child_by_field_name("parameters") else {
            return;
        };
        for param in children_of_kind(&list, &["parameter"]) {
            if let (Some(name), Some(ty)) = (param.child_by_field_name("name"), param.child_by_field_name("type")) {
                let resolved = self.resolve(self.text(&ty));
                self.locals.insert(self.text(&name).to_string(), resolved);
            }
        }
    }

    /// Locals in document order, so `var` initializers see earlier locals.
    fn bind_locals(&mut self, block: Node) {
        let mut declarations = Vec::new();
        walk(block, &mut |n| {
            if matches!(n.kind(), "variable_declaration" | "foreach_statement") {
                declarations.push(n);
            }
            !TYPE_KINDS.contains(&n.kind())
        });

        for decl in declarations {
            if decl.kind() == "foreach_statement" {
                if let (Some(left), Some(ty)) = (decl.child_by_field_name("left"), decl.child_by_field_name("type")) {
                    let resolved = self.resolve(self.text(&ty));
                    self.locals.insert(self.text(&left).to_string(), resolved);
                }
                continue;
            }
            let type_text = decl.child_by_field_name("type").map(|t| self.text(&t)).unwrap_or("var");
            let constant = decl
                .parent()
                .map(|p| self.text(&p).trim_start().starts_with("const "))
                .unwrap_or(false);
            for declarator in children_of_kind(&decl, &["variable_declarator"]) {
                let Some(name) = declarator_name(&declarator, self.file) else {
                    continue;
                };
                let init = initializer(&declarator);
                let ty = if type_text == "var" {
                    init.map(|i| self.infer(i)).unwrap_or(TypeRef::Unknown)
                } else {
                    self.resolve(type_text)
                };
                if let Some(init) = init {
                    if constant {
                        if let Some(value) = string_value(&init, self.file) {
                            self.consts.insert(name.to_string(), value);
                        }
                    }
                    if let Some(resource) = self.extractor.resource_literal(init, self.file) {
                        self.hints.insert(name.to_string(), resource);
                    }
                }
                self.locals.insert(name.to_string(), ty);
            }
        }
    }

    fn owner(&self) -> Option<&'a str> {
        self.scope.owner
    }

    fn name_type(&self, name: &str) -> TypeRef {
        if let Some(ty) = self.locals.get(name) {
            return ty.clone();
        }
        if let Some(field) = self.owner().and_then(|o| self.scope.index.field(o, name)) {
            return field.ty.clone();
        }
        static_type(self.resolve(name), self.scope)
    }

    fn infer(&self, node: Node) -> TypeRef {
        match node.kind() {
            "identifier" => self.name_type(self.text(&node)),
            "generic_name" | "qualified_name" => static_type(self.resolve(self.text(&node)), self.scope),
            "this" | "this_expression" => self
                .owner()
                .map(|o| TypeRef::Declared(o.to_string()))
                .unwrap_or(TypeRef::Unknown),
            "base" | "base_expression" => self.base_type(),
            "member_access_expression" => {
                let Some(name) = node.child_by_field_name("name").map(|n| simple_name(&n, self.file)) else {
                    return TypeRef::Unknown;
                };
                let target = node
                    .child_by_field_name("expression")
                    .map(|e| self.infer(e))
                    .unwrap_or(TypeRef::Unknown);
                match target {
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
                    TypeRef::External { namespace, .. } if self.scope.capabilities.data_access(&namespace).is_some() => {
                        TypeRef::external(namespace, "*")
                    }
                    TypeRef::Unknown => static_type(self.resolve(self.text(&node)), self.scope),
                    _ => TypeRef::Unknown,
                }
            }
            "invocation_expression" => self
                .shape(node)
                .map(|shape| classify::return_type(&shape, self.scope))
                .unwrap_or(TypeRef::Unknown),
            "object_creation_expression" => node
                .child_by_field_name("type")
                .map(|t| self.resolve(self.text(&t)))
                .unwrap_or(TypeRef::Unknown),
            "cast_expression" => node
                .child_by_field_name("type")
                .map(|t| self.resolve(self.text(&t)))
                .unwrap_or(TypeRef::Unknown),
            "as_expression" => node
                .child_by_field_name("right")
                .map(|t| self.resolve(self.text(&t)))
                .unwrap_or(TypeRef::Unknown),
            "await_expression" | "parenthesized_expression" | "checked_expression" => children(&node)
                .last()
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

    fn arg_value(&self, node: Node) -> ArgValue {
        if let Some(value) = string_value(&node, self.file) {
            return ArgValue::Str(value);
        }
        match node.kind() {
            "interpolated_string_expression" => ArgValue::Dynamic,
            "integer_literal" | "real_literal" => ArgValue::Number,
            "boolean_literal" => ArgValue::Bool,
            "null_literal" => ArgValue::Null,
            "identifier" => {
                let name = self.text(&node);
                if let Some(value) = self.consts.get(name) {
                    return ArgValue::Str(value.clone());
                }
                if let Some(value) = self
                    .owner()
                    .and_then(|o| self.scope.index.field(o, name))
                    .and_then(|f| f.value.clone())
                {
                    return ArgValue::Str(value);
                }
                typed(self.infer(node))
            }
            "member_access_expression" => {
                let constant = match (node.child_by_field_name("expression"), node.child_by_field_name("name")) {
                    (Some(target), Some(name)) => match self.infer(target) {
                        TypeRef::Declared(q) => self
                            .scope
                            .index
                            .field(&q, self.text(&name))
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
        let function = node.child_by_field_name("function")?;
        let (method, target) = match function.kind() {
            "identifier" | "generic_name" => (simple_name(&function, self.file), None),
            "member_access_expression" => (
                simple_name(&function.child_by_field_name("name")?, self.file),
                function.child_by_field_name("expression"),
            ),
            _ => return None,
        };

        let receiver = match target {
            None => Receiver::Implicit,
            Some(t) => Receiver::Value(self.infer(t)),
        };
        let mut shape = CallShape::new(line(&node), method, receiver).with_args(self.args(&node));
        if let Some(target) = target {
            shape.chain = self.chain(target);
            shape.resource_hint = self.hint(target);
        }
        Some(shape)
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
            .owned(&super::OwnerRef::Type(qualified.clone()), &ctor)
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
            node = unwrap_expression(node);
            match node.kind() {
                "invocation_expression" => {
                    let Some(function) = node.child_by_field_name("function") else {
                        break;
                    };
                    let method = match function.kind() {
                        "member_access_expression" => function
                            .child_by_field_name("name")
                            .map(|n| simple_name(&n, self.file))
                            .unwrap_or_default(),
                        _ => simple_name(&function, self.file),
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
                    match function.child_by_field_name("expression") {
                        Some(next) if function.kind() == "member_access_expression" => node = next,
                        _ => break,
                    }
                }
                "member_access_expression" => match node.child_by_field_name("expression") {
                    Some(next) => node = next,
                    None => break,
                },
                _ => break,
            }
        }
        links
    }

    fn hint(&self, target: Node) -> Option<String> {
        let target = unwrap_expression(target);
        let name = match target.kind() {
            "identifier" => {
                let name = self.text(&target);
                if let Some(hint) = self.hints.get(name) {
                    return Some(hint.clone());
                }
                name
            }
            "member_access_expression" => {
                let receiver = target.child_by_field_name("expression")?;
                if !matches!(receiver.kind(), "this" | "this_expression") {
                    return None;
                }
                self.text(&target.child_by_field_name("name")?)
            }
            _ => return None,
        };
        self.owner()
            .and_then(|o| self.scope.index.field(o, name))
            .and_then(|f| f.resource.clone())
    }
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

/// Strip `global::`, nullability, arrays and generic arguments. `Task<T>`
/// stands for `T`, since callers await it.
fn bare_type(raw: &str) -> String {
    let raw = raw.trim().replace("global::", "");
    if raw.starts_with('(') {
        return String::new();
    }
    if let Some((head, rest)) = raw.split_once('<') {
        let head = head.trim();
        if matches!(head, "Task" | "ValueTask" | "System.Threading.Tasks.Task") {
            if let Some(inner) = rest.strip_suffix('>') {
                return bare_type(inner);
            }
        }
        return head.to_string();
    }
    raw.trim_end_matches("[]").trim_end_matches('?').trim().to_string()
}

fn modifiers<'f>(node: &Node, file: &'f SourceFile) -> Vec<&'f str> {
    children_of_kind(node, &["modifier"])
        .iter()
        .map(|m| file.text(m))
        .collect()
}

fn declarator_name<'f>(declarator: &Node, file: &'f SourceFile) -> Option<&'f str> {
    declarator
        .child_by_field_name("name")
        .or_else(|| children_of_kind(declarator, &["identifier"]).into_iter().next())
        .map(|n| file.text(&n))
}

/// Initializer expression of a declarator, with or without an
/// `equals_value_clause` wrapper.
fn initializer<'t>(declarator: &Node<'t>) -> Option<Node<'t>> {
    let name_id = declarator.child_by_field_name("name").map(|n| n.id());
    let mut found = None;
    for child in children(declarator) {
        if Some(child.id()) == name_id || child.kind() == "bracketed_argument_list" {
            continue;
        }
        if child.kind() == "identifier" && name_id.is_none() && found.is_none() {
            continue;
        }
        found = if child.kind() == "equals_value_clause" {
            children(&child).into_iter().next()
        } else {
            Some(child)
        };
    }
    found
}

fn arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
    let Some(list) = call.child_by_field_name("arguments") else {
        return Vec::new();
    };
    children_of_kind(&list, &["argument"])
        .into_iter()
        .filter_map(|arg| children(&arg).into_iter().last())
        .collect()
}

fn unwrap_expression(mut node: Node) -> Node {
    while matches!(node.kind(), "await_expression" | "parenthesized_expression") {
        match children(&node).into_iter().last() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// Name of an identifier or generic name, without type arguments.
fn simple_name<'f>(node: &Node, file: &'f SourceFile) -> &'f str {
    if node.kind() == "generic_name" {
        if let Some(id) = children_of_kind(node, &["identifier"]).into_iter().next() {
            return file.text(&id);
        }
    }
    file.text(node)
}

fn string_value(node: &Node, file: &SourceFile) -> Option<String> {
    match node.kind() {
        "string_literal" | "verbatim_string_literal" | "raw_string_literal" => unquote(file.text(node)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{CallSite, ExtractSettings, SymbolIndex};

    fn settings() -> ExtractSettings {
        ExtractSettings {
            project: "Sample".into(),
            source_url_base: "http://localhost".into(),
            resource_store: "mongo".into(),
            resource_database: "UnknownDatabase".into(),
        }
    }

    fn parse(path: &str, code: &str) -> SourceFile {
        CSharpExtractor::new().parse(path, code.to_string()).unwrap()
    }

    fn sites(files: &[(&str, &str)], method: &str) -> (Vec<Classified>, SymbolIndex) {
        let extractor = CSharpExtractor::new();
        let parsed: Vec<SourceFile> = files.iter().map(|(p, c)| parse(p, c)).collect();
        let decls: Vec<FileDeclarations> = parsed.iter().map(|f| extractor.declarations(f)).collect();
        let settings = settings();
        let index = SymbolIndex::build(&extractor, &decls, &settings);
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

    #[test]
    fn test_trivial_file_parses() {
        let file = parse("A.cs", "class A { }\n");
        let decls = CSharpExtractor::new().declarations(&file);
        assert_eq!(decls.types.len(), 1);
    }

    #[test]
    fn test_declarations() {
        let file = parse(
            "Services/UserService.cs",
            r#"
using System.Net.Http;
using Store = App.Data;

namespace App.Services
{
    public interface IUserService { void Load(int id); }

    public class UserService : BaseService, IUserService
    {
        private const string BaseUrl = "http://users";
        private readonly HttpClient _http;

        public UserService(HttpClient http) { _http = http; }

        public void Load(int id) { }
        public void Load(string name, params int[] rest) { }

        public class Nested { }
    }
}
"#,
        );
        let decls = CSharpExtractor::new().declarations(&file);
        assert_eq!(decls.namespace, "App.Services");
        assert_eq!(decls.imports.len(), 2);
        assert!(decls.imports[0].wildcard);
        assert_eq!(decls.imports[1].alias.as_deref(), Some("Store"));

        let names: Vec<&str> = decls.types.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["IUserService", "UserService", "UserService.Nested"]);
        let service = &decls.types[1];
        assert_eq!(service.bases, vec!["BaseService", "IUserService"]);
        let base_url = service.fields.iter().find(|f| f.name == "BaseUrl").unwrap();
        assert_eq!(base_url.value.as_deref(), Some("http://users"));

        let signatures: Vec<String> = decls.callables.iter().map(|c| c.signature()).collect();
        assert_eq!(
            signatures,
            vec!["Load(int)", "UserService(HttpClient)", "Load(int)", "Load(string,int[])"]
        );
        assert!(decls.callables[3].params[1].variadic);
    }

    #[test]
    fn test_calls_bind_to_overloads() {
        let (found, index) = sites(
            &[(
                "Foo.cs",
                r#"
class Foo
{
    void Bar() { Baz(); Log("x"); Log(1); }
    void Baz() { }
    void Log(string s) { }
    void Log(int n) { }
}
"#,
            )],
            "Bar",
        );
        let targets: Vec<String> = found
            .into_iter()
            .map(|c| match c {
                Classified::Site(CallSite::Ordinary { target, .. }) => index.callable(target).signature.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(targets, vec!["Baz()", "Log(string)", "Log(int)"]);
    }

    #[test]
    fn test_http_and_mongo_calls() {
        let (found, _) = sites(
            &[(
                "Repo.cs",
                r#"
using System.Net.Http;
using MongoDB.Driver;

namespace App
{
    class Repo
    {
        private const string Users = "http://users/api";
        private readonly IMongoCollection<User> _orders;
        private readonly HttpClient _http = new HttpClient();

        public Repo(IMongoDatabase db) { _orders = db.GetCollection<User>("orders"); }

        public async Task Sync(string path)
        {
            await _http.GetAsync(Users);
            await _http.GetAsync(path);
            var client = new MongoClient("mongodb://x");
            client.GetDatabase("FanApp").GetCollection<User>("users").Find(x => true);
            _orders.InsertOne(null);
        }
    }
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
        assert!(sites.contains(&CallSite::Network {
            line: 17,
            url: "http://users/api".into()
        }));
        assert!(sites.contains(&CallSite::Network {
            line: 18,
            url: crate::identity::UNKNOWN_SERVICE_URL.into()
        }));
        assert!(sites.contains(&CallSite::Resource {
            line: 20,
            database: "FanApp".into(),
            collection: "users".into()
        }));
        assert!(sites.contains(&CallSite::Resource {
            line: 21,
            database: "UnknownDatabase".into(),
            collection: "orders".into()
        }));
    }

    #[test]
    fn test_bare_type() {
        assert_eq!(bare_type("List<string>"), "List");
        assert_eq!(bare_type("Task<User?>"), "User");
        assert_eq!(bare_type("global::System.Net.Http.HttpClient"), "System.Net.Http.HttpClient");
        assert_eq!(bare_type("int[]"), "int");
        assert_eq!(bare_type("(int, string)"), "");
    }
}
