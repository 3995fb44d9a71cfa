//! Call-site classification.
//!
//! Language extractors describe each call as a [`CallShape`] (receiver,
//! method, argument values, and the calls chained before it) and this module
//! decides what the call is:
//!
//! 1. an outbound HTTP request when the receiver is a known HTTP client type
//!    or the call is a known HTTP function
//! 2. a data-access query when the receiver is a data-access handle
//! 3. otherwise a call to a project callable, selected by overload
//!
//! URLs and collection names must be literals (or constants the extractor
//! already folded); anything else degrades to the unknown sentinels.

use super::capability::{DataAccess, HttpClientType};
use super::symbols::{Param, TypeRef};
use super::Scope;
use crate::identity::{UNKNOWN_COLLECTION, UNKNOWN_SERVICE_URL};

/// A classified call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallSite {
    /// Call to a project callable (index into the symbol index).
    Ordinary { line: u32, target: usize },
    /// Outbound HTTP request.
    Network { line: u32, url: String },
    /// Data-access query.
    Resource {
        line: u32,
        database: String,
        collection: String,
    },
}

/// Classification outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Site(CallSite),
    /// Not a fact: library calls, navigation on data-access handles.
    Ignored,
    /// A project call that could not be bound precisely.
    Unresolved { line: u32, detail: String },
}

/// What a call is made on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    /// No receiver: `Foo()`, inside a type or a namespace.
    Implicit,
    /// A value (or a type, for static calls) of known or unknown type.
    Value(TypeRef),
    /// A module or package: `requests.get`, `http.Get`.
    Module(String),
}

/// An argument as far as it can be known statically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Number,
    Bool,
    Null,
    Typed(TypeRef),
    Dynamic,
}

impl ArgValue {
    pub fn literal(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A call earlier in the same chain, nearest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub method: String,
    pub first_arg: ArgValue,
}

/// A call as the extractor sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallShape {
    pub line: u32,
    pub method: String,
    pub receiver: Receiver,
    pub args: Vec<ArgValue>,
    pub chain: Vec<ChainLink>,
    /// Collection name bound to the receiver variable where it was assigned.
    pub resource_hint: Option<String>,
}

impl CallShape {
    pub fn new(line: u32, method: impl Into<String>, receiver: Receiver) -> Self {
        Self {
            line,
            method: method.into(),
            receiver,
            args: Vec::new(),
            chain: Vec::new(),
            resource_hint: None,
        }
    }

    pub fn with_args(mut self, args: Vec<ArgValue>) -> Self {
        self.args = args;
        self
    }
}

/// Decide what a call is.
pub fn classify(shape: &CallShape, scope: &Scope<'_>) -> Classified {
    let index = scope.index;
    match &shape.receiver {
        Receiver::Module(module) => {
            if let Some(function) = scope.capabilities.http_function(module, &shape.method) {
                return network(shape, function.url_arg);
            }
            if index.has_namespace(module) {
                return ordinary(shape, index.functions(module, &shape.method), scope);
            }
            Classified::Ignored
        }
        Receiver::Value(ty) => {
            if let Some(client) = http_client_of(ty, scope) {
                if client.methods.contains(&shape.method.as_str()) {
                    return network(shape, 0);
                }
            }
            if let Some(access) = data_access_of(ty, scope) {
                return resource(shape, access, scope);
            }
            match ty {
                TypeRef::Declared(qualified) => ordinary(shape, index.methods(qualified, &shape.method), scope),
                _ => Classified::Ignored,
            }
        }
        Receiver::Implicit => {
            if let Some(owner) = scope.owner {
                let candidates = index.methods(owner, &shape.method);
                if !candidates.is_empty() {
                    return ordinary(shape, candidates, scope);
                }
                // Inherited request methods of a type deriving from a client.
                let this = TypeRef::Declared(owner.to_string());
                if let Some(client) = http_client_of(&this, scope) {
                    if client.methods.contains(&shape.method.as_str()) {
                        return network(shape, 0);
                    }
                }
            }
            let candidates = index.functions(scope.namespace, &shape.method);
            if candidates.is_empty() {
                Classified::Unresolved {
                    line: shape.line,
                    detail: format!("no declaration of {} in scope", shape.method),
                }
            } else {
                ordinary(shape, candidates, scope)
            }
        }
    }
}

/// Result type of a call, for typing receivers further along a chain or
/// the variable it is assigned to.
pub fn return_type(shape: &CallShape, scope: &Scope<'_>) -> TypeRef {
    let caps = scope.capabilities;
    let index = scope.index;
    let candidates = match &shape.receiver {
        Receiver::Module(module) => {
            if caps.data_access(module).is_some() {
                return TypeRef::external(module.clone(), "*");
            }
            index.functions(module, &shape.method)
        }
        Receiver::Value(TypeRef::External { namespace, name }) => {
            if let Some(ty) = caps.returns(namespace, name, &shape.method) {
                return ty;
            }
            if caps.data_access(namespace).is_some() {
                return TypeRef::external(namespace.clone(), "*");
            }
            return TypeRef::Unknown;
        }
        Receiver::Value(TypeRef::Declared(qualified)) => index.methods(qualified, &shape.method),
        Receiver::Value(_) => return TypeRef::Unknown,
        Receiver::Implicit => {
            let owned = scope
                .owner
                .map(|owner| index.methods(owner, &shape.method))
                .unwrap_or_default();
            if owned.is_empty() {
                index.functions(scope.namespace, &shape.method)
            } else {
                owned
            }
        }
    };
    select_overload(&candidates, &shape.args, scope)
        .map(|idx| index.callable(idx).return_type.clone())
        .unwrap_or(TypeRef::Unknown)
}

fn http_client_of(ty: &TypeRef, scope: &Scope<'_>) -> Option<&'static HttpClientType> {
    let caps = scope.capabilities;
    match ty {
        TypeRef::External { namespace, name } => caps.http_client(namespace, name),
        TypeRef::Declared(qualified) => scope
            .index
            .external_bases(qualified)
            .into_iter()
            .find_map(|base| match base {
                TypeRef::External { namespace, name } => caps.http_client(namespace, name),
                _ => None,
            }),
        _ => None,
    }
}

fn data_access_of(ty: &TypeRef, scope: &Scope<'_>) -> Option<&'static DataAccess> {
    let caps = scope.capabilities;
    match ty {
        TypeRef::External { namespace, .. } => caps.data_access(namespace),
        TypeRef::Declared(qualified) => scope
            .index
            .external_bases(qualified)
            .into_iter()
            .find_map(|base| match base {
                TypeRef::External { namespace, .. } => caps.data_access(namespace),
                _ => None,
            }),
        _ => None,
    }
}

fn network(shape: &CallShape, url_arg: usize) -> Classified {
    let url = shape
        .args
        .get(url_arg)
        .and_then(ArgValue::literal)
        .unwrap_or(UNKNOWN_SERVICE_URL);
    Classified::Site(CallSite::Network {
        line: shape.line,
        url: url.to_string(),
    })
}

fn resource(shape: &CallShape, access: &DataAccess, scope: &Scope<'_>) -> Classified {
    let method = shape.method.as_str();
    // Lookups only navigate to a handle; the query is what follows.
    if access.resource_lookup.contains(&method)
        || access.database_lookup.contains(&method)
        || access.non_queries.contains(&method)
    {
        return Classified::Ignored;
    }

    // Nearest lookup first.
    let lookups: Vec<&ArgValue> = shape
        .chain
        .iter()
        .filter(|link| access.resource_lookup.contains(&link.method.as_str()))
        .map(|link| &link.first_arg)
        .collect();

    let collection = lookups
        .first()
        .and_then(|arg| arg.literal())
        .or(shape.resource_hint.as_deref())
        .unwrap_or(UNKNOWN_COLLECTION);

    let database = shape
        .chain
        .iter()
        .find(|l| access.database_lookup.contains(&l.method.as_str()))
        .and_then(|l| l.first_arg.literal())
        .or_else(|| {
            if scope.capabilities.nested_lookup_names_database {
                lookups.get(1).and_then(|arg| arg.literal())
            } else {
                None
            }
        })
        .unwrap_or(scope.settings.resource_database.as_str());

    Classified::Site(CallSite::Resource {
        line: shape.line,
        database: database.to_string(),
        collection: collection.to_string(),
    })
}

fn ordinary(shape: &CallShape, candidates: Vec<usize>, scope: &Scope<'_>) -> Classified {
    if candidates.is_empty() {
        return Classified::Unresolved {
            line: shape.line,
            detail: format!("no declaration of {}", shape.method),
        };
    }
    match select_overload(&candidates, &shape.args, scope) {
        Some(target) => Classified::Site(CallSite::Ordinary {
            line: shape.line,
            target,
        }),
        None => Classified::Unresolved {
            line: shape.line,
            detail: format!(
                "{} matches {} overloads of {}",
                shape.args.len(),
                candidates.len(),
                shape.method
            ),
        },
    }
}

/// Pick the overload a call binds to: by argument count first, then by
/// literal and known argument types. Ambiguity yields `None`.
pub fn select_overload(candidates: &[usize], args: &[ArgValue], scope: &Scope<'_>) -> Option<usize> {
    if let [only] = candidates {
        return Some(*only);
    }
    let fitting: Vec<usize> = candidates
        .iter()
        .copied()
        .filter(|&idx| accepts_arity(&scope.index.callable(idx).params, args.len()))
        .collect();
    if let [only] = fitting.as_slice() {
        return Some(*only);
    }

    let mut best: Option<(usize, usize)> = None;
    let mut tied = false;
    for idx in fitting {
        let params = &scope.index.callable(idx).params;
        let Some(score) = score(params, args) else {
            continue;
        };
        match best {
            Some((_, top)) if top == score => tied = true,
            Some((_, top)) if top > score => {}
            _ => {
                best = Some((idx, score));
                tied = false;
            }
        }
    }
    if tied {
        None
    } else {
        best.map(|(idx, _)| idx)
    }
}

fn accepts_arity(params: &[Param], count: usize) -> bool {
    let required = params
        .iter()
        .filter(|p| !p.optional && !p.variadic)
        .count();
    let variadic = params.iter().any(|p| p.variadic);
    count >= required && (variadic || count <= params.len())
}

/// Number of arguments whose type positively matches; `None` when any is
/// known to mismatch.
fn score(params: &[Param], args: &[ArgValue]) -> Option<usize> {
    let mut score = 0;
    for (i, arg) in args.iter().enumerate() {
        let param = params.get(i).or_else(|| params.last().filter(|p| p.variadic))?;
        match compatible(arg, &param.type_name) {
            Some(true) => score += 1,
            Some(false) => return None,
            None => {}
        }
    }
    Some(score)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Primitive {
    Text,
    Number,
    Boolean,
}

fn primitive(type_name: &str) -> Option<Primitive> {
    let bare = type_name
        .trim()
        .trim_start_matches(['*', '&'])
        .trim_end_matches('?')
        .trim_start_matches("...")
        .trim_end_matches("...");
    let bare = bare.rsplit('.').next().unwrap_or(bare).to_lowercase();
    match bare.as_str() {
        "string" | "str" | "char" | "rune" => Some(Primitive::Text),
        "bool" | "boolean" => Some(Primitive::Boolean),
        "int" | "uint" | "long" | "ulong" | "short" | "ushort" | "byte" | "sbyte" | "float" | "double"
        | "decimal" | "integer" | "number" | "int8" | "int16" | "int32" | "int64" | "uint8" | "uint16"
        | "uint32" | "uint64" | "float32" | "float64" | "uintptr" => Some(Primitive::Number),
        _ => None,
    }
}

fn simple_name(type_name: &str) -> &str {
    let head = type_name
        .trim()
        .trim_start_matches(['*', '&'])
        .split(['<', '['])
        .next()
        .unwrap_or(type_name)
        .trim_end_matches('?');
    head.rsplit(['.', '/']).next().unwrap_or(head)
}

fn compatible(arg: &ArgValue, type_name: &str) -> Option<bool> {
    if type_name.is_empty() {
        return None;
    }
    let expected = primitive(type_name);
    match arg {
        ArgValue::Str(_) => expected.map(|p| p == Primitive::Text),
        ArgValue::Number => expected.map(|p| p == Primitive::Number),
        ArgValue::Bool => expected.map(|p| p == Primitive::Boolean),
        ArgValue::Null => expected.map(|_| type_name.trim_end().ends_with('?')),
        ArgValue::Typed(TypeRef::Declared(qualified)) => {
            if expected.is_some() {
                return Some(false);
            }
            let declared = qualified.rsplit(['.', '/']).next().unwrap_or(qualified);
            if declared == simple_name(type_name) {
                Some(true)
            } else {
                None
            }
        }
        ArgValue::Typed(_) | ArgValue::Dynamic => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::capability::{CSHARP, PYTHON};
    use crate::extract::{
        CallableDecl, Capabilities, ExtractSettings, FileDeclarations, Owner, SymbolIndex, TypeDecl, TypeKind,
    };

    fn settings() -> ExtractSettings {
        ExtractSettings {
            project: "P".into(),
            source_url_base: "http://localhost".into(),
            resource_store: "mongo".into(),
            resource_database: "UnknownDatabase".into(),
        }
    }

    fn param(type_name: &str) -> Param {
        Param {
            name: "x".into(),
            type_name: type_name.into(),
            optional: false,
            variadic: false,
        }
    }

    fn method(name: &str, params: Vec<Param>) -> CallableDecl {
        CallableDecl {
            name: name.into(),
            namespace: "App".into(),
            owner: Owner::Type("Svc".into()),
            params,
            return_type: None,
            line: 1,
            span: 0..0,
        }
    }

    fn file() -> FileDeclarations {
        let mut file = FileDeclarations::new("Svc.cs", "App");
        file.types.push(TypeDecl {
            namespace: "App".into(),
            name: "Svc".into(),
            kind: TypeKind::Class,
            bases: vec![],
            fields: vec![],
            line: 1,
        });
        file.callables.push(method("Log", vec![param("int")]));
        file.callables.push(method("Log", vec![param("string")]));
        file.callables.push(method("Log", vec![param("string"), param("int")]));
        file.callables.push(method("Send", vec![param("object")]));
        file.callables.push(method("Send", vec![param("string")]));
        file
    }

    fn with_scope<R>(caps: &'static Capabilities, f: impl FnOnce(&Scope<'_>) -> R) -> R {
        let settings = settings();
        let files = vec![file()];
        let index = SymbolIndex::build(&crate::extract::CSharpExtractor::new(), &files, &settings);
        let scope = Scope::new(&index, &files[0], caps, &settings).within("App", Some("App.Svc"));
        f(&scope)
    }

    fn call(method: &str, receiver: Receiver, args: Vec<ArgValue>) -> CallShape {
        CallShape::new(7, method, receiver).with_args(args)
    }

    fn target_signature(classified: Classified, scope: &Scope<'_>) -> String {
        match classified {
            Classified::Site(CallSite::Ordinary { target, .. }) => scope.index.callable(target).signature.clone(),
            other => panic!("expected ordinary call, got {:?}", other),
        }
    }

    #[test]
    fn test_overloads_by_arity_and_literal_type() {
        with_scope(&CSHARP, |scope| {
            let two = classify(&call("Log", Receiver::Implicit, vec![ArgValue::Str("a".into()), ArgValue::Number]), scope);
            assert_eq!(target_signature(two, scope), "Log(string,int)");

            let text = classify(&call("Log", Receiver::Implicit, vec![ArgValue::Str("a".into())]), scope);
            assert_eq!(target_signature(text, scope), "Log(string)");

            let number = classify(&call("Log", Receiver::Implicit, vec![ArgValue::Number]), scope);
            assert_eq!(target_signature(number, scope), "Log(int)");
        });
    }

    #[test]
    fn test_ambiguous_overload_is_unresolved() {
        with_scope(&CSHARP, |scope| {
            let dynamic = classify(&call("Log", Receiver::Implicit, vec![ArgValue::Dynamic]), scope);
            assert!(matches!(dynamic, Classified::Unresolved { line: 7, .. }));
        });
    }

    #[test]
    fn test_most_specific_match_wins() {
        with_scope(&CSHARP, |scope| {
            let send = classify(&call("Send", Receiver::Implicit, vec![ArgValue::Str("a".into())]), scope);
            assert_eq!(target_signature(send, scope), "Send(string)");
        });
    }

    #[test]
    fn test_http_client_urls() {
        with_scope(&CSHARP, |scope| {
            let client = Receiver::Value(TypeRef::external("System.Net.Http", "HttpClient"));
            let literal = classify(&call("GetAsync", client.clone(), vec![ArgValue::Str("http://a/b".into())]), scope);
            assert_eq!(
                literal,
                Classified::Site(CallSite::Network {
                    line: 7,
                    url: "http://a/b".into()
                })
            );
            let dynamic = classify(&call("GetAsync", client.clone(), vec![ArgValue::Dynamic]), scope);
            assert_eq!(
                dynamic,
                Classified::Site(CallSite::Network {
                    line: 7,
                    url: UNKNOWN_SERVICE_URL.into()
                })
            );
            assert_eq!(classify(&call("Dispose", client, vec![]), scope), Classified::Ignored);
        });
    }

    #[test]
    fn test_resource_lookups() {
        with_scope(&PYTHON, |scope| {
            let mut find = call("find", Receiver::Value(TypeRef::external("pymongo", "*")), vec![]);
            find.chain = vec![
                ChainLink {
                    method: "__getitem__".into(),
                    first_arg: ArgValue::Str("users".into()),
                },
                ChainLink {
                    method: "__getitem__".into(),
                    first_arg: ArgValue::Str("FanApp".into()),
                },
            ];
            assert_eq!(
                classify(&find, scope),
                Classified::Site(CallSite::Resource {
                    line: 7,
                    database: "FanApp".into(),
                    collection: "users".into()
                })
            );

            let bare = call("insert_one", Receiver::Value(TypeRef::external("pymongo", "*")), vec![ArgValue::Dynamic]);
            assert_eq!(
                classify(&bare, scope),
                Classified::Site(CallSite::Resource {
                    line: 7,
                    database: "UnknownDatabase".into(),
                    collection: UNKNOWN_COLLECTION.into()
                })
            );
        });
    }

    #[test]
    fn test_resource_hint_names_collection() {
        with_scope(&CSHARP, |scope| {
            let mut find = call("Find", Receiver::Value(TypeRef::external("MongoDB.Driver", "IMongoCollection")), vec![]);
            find.resource_hint = Some("orders".into());
            assert!(matches!(
                classify(&find, scope),
                Classified::Site(CallSite::Resource { collection, .. }) if collection == "orders"
            ));
            let database = call("GetDatabase", Receiver::Value(TypeRef::external("MongoDB.Driver", "MongoClient")), vec![]);
            assert_eq!(classify(&database, scope), Classified::Ignored);
            let lookup = call(
                "GetCollection",
                Receiver::Value(TypeRef::external("MongoDB.Driver", "*")),
                vec![ArgValue::Str("users".into())],
            );
            assert_eq!(classify(&lookup, scope), Classified::Ignored);
        });
    }

    #[test]
    fn test_unknown_receiver_is_ignored() {
        with_scope(&CSHARP, |scope| {
            assert_eq!(classify(&call("WriteLine", Receiver::Value(TypeRef::Unknown), vec![]), scope), Classified::Ignored);
            assert!(matches!(
                classify(&call("Missing", Receiver::Implicit, vec![]), scope),
                Classified::Unresolved { .. }
            ));
        });
    }
}
