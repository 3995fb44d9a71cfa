//! Canonical node keys.
//!
//! Every extractor derives node keys through [`Identity::key`], so a type
//! discovered as a declaration in one file and as a call target in another
//! lands on the same node. Keys are project-qualified (`{project}:...`)
//! except for the shared `service:` and resource keys, which merge across
//! projects. Shared nodes carry no project tag, so the wipe of a project
//! leaves them in place; a run then deletes those no edge references.
//!
//! | Kind | Key |
//! |---|---|
//! | Root | `root:{project}` |
//! | Namespace | `{project}:{path}` |
//! | Type | `{project}:{namespace}.{name}` (`{project}:{name}` in the default namespace) |
//! | Callable | `{owner}.{name}({T1},{T2})` |
//! | Service | `service:{url}` |
//! | Resource | `{store}:{database}.{collection}` |

/// Namespace path used for code that declares none (C# global namespace,
/// Java default package, Go files at the scan root). No language allows an
/// identifier with angle brackets, so it cannot collide with a real path.
pub const DEFAULT_NAMESPACE: &str = "<default>";

/// Destination used when an outbound call's URL is not statically known.
pub const UNKNOWN_SERVICE_URL: &str = "UnknownServiceUrl";

/// Resource name used when a query's collection is not statically known.
pub const UNKNOWN_COLLECTION: &str = "UnknownCollection";

const ROOT_PREFIX: &str = "root";
const SERVICE_PREFIX: &str = "service";

/// The kind of entity being keyed, together with its qualifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity<'a> {
    Root {
        project: &'a str,
    },
    Namespace {
        project: &'a str,
        path: &'a str,
    },
    Type {
        project: &'a str,
        namespace: &'a str,
        name: &'a str,
    },
    Callable {
        owner: &'a str,
        name: &'a str,
        parameter_types: &'a [String],
    },
    Service {
        url: &'a str,
    },
    Resource {
        store: &'a str,
        database: &'a str,
        collection: &'a str,
    },
}

impl Identity<'_> {
    pub fn key(&self) -> String {
        match *self {
            Identity::Root { project } => format!("{}:{}", ROOT_PREFIX, project),
            Identity::Namespace { project, path } => format!("{}:{}", project, path),
            Identity::Type {
                project,
                namespace,
                name,
            } => {
                if namespace.is_empty() || namespace == DEFAULT_NAMESPACE {
                    format!("{}:{}", project, name)
                } else {
                    format!("{}:{}.{}", project, namespace, name)
                }
            }
            Identity::Callable {
                owner,
                name,
                parameter_types,
            } => format!("{}.{}", owner, signature(name, parameter_types)),
            Identity::Service { url } => format!("{}:{}", SERVICE_PREFIX, url),
            Identity::Resource {
                store,
                database,
                collection,
            } => format!("{}:{}.{}", store, database, collection),
        }
    }
}

/// `Name(T1,T2)`: the callable name followed by its parameter types.
///
/// Whitespace inside a type is dropped so `Dictionary<string, int>` and
/// `Dictionary<string,int>` agree.
pub fn signature<S: AsRef<str>>(name: &str, parameter_types: &[S]) -> String {
    let params: Vec<String> = parameter_types
        .iter()
        .map(|t| normalize_type(t.as_ref()))
        .collect();
    format!("{}({})", name, params.join(","))
}

/// Strip all whitespace from a written type.
pub fn normalize_type(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callable(owner: &str, name: &str, params: &[&str]) -> String {
        let params: Vec<String> = params.iter().map(|s| s.to_string()).collect();
        Identity::Callable {
            owner,
            name,
            parameter_types: &params,
        }
        .key()
    }

    #[test]
    fn test_sample_keys() {
        let ty = Identity::Type {
            project: "Sample",
            namespace: "",
            name: "Foo",
        }
        .key();
        assert_eq!(ty, "Sample:Foo");
        assert_eq!(callable(&ty, "Bar", &[]), "Sample:Foo.Bar()");
        assert_eq!(Identity::Root { project: "Sample" }.key(), "root:Sample");
        assert_eq!(
            Identity::Service { url: UNKNOWN_SERVICE_URL }.key(),
            "service:UnknownServiceUrl"
        );
        assert_eq!(
            Identity::Resource {
                store: "mongo",
                database: "FanApp",
                collection: "users"
            }
            .key(),
            "mongo:FanApp.users"
        );
    }

    #[test]
    fn test_default_namespace_matches_empty() {
        let a = Identity::Type {
            project: "P",
            namespace: DEFAULT_NAMESPACE,
            name: "Foo",
        };
        let b = Identity::Type {
            project: "P",
            namespace: "",
            name: "Foo",
        };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_overloads_by_type_not_name() {
        let by_int = callable("P:Svc", "Save", &["int"]);
        let by_string = callable("P:Svc", "Save", &["string"]);
        assert_ne!(by_int, by_string);

        // Parameter names never reach the key, only types do.
        let spaced = callable("P:Svc", "Save", &["Dictionary<string, int>"]);
        let tight = callable("P:Svc", "Save", &["Dictionary<string,int>"]);
        assert_eq!(spaced, tight);
    }

    #[test]
    fn test_distinct_tuples_never_collide() {
        let projects = ["P", "Q"];
        let namespaces = ["", "app", "app.core", "internal/db"];
        let names = ["Foo", "Bar"];
        let signatures: [&[&str]; 3] = [&[], &["int"], &["int", "string"]];

        let mut seen = std::collections::HashMap::new();
        for project in projects {
            for namespace in namespaces {
                for name in names {
                    let owner = Identity::Type {
                        project,
                        namespace,
                        name,
                    }
                    .key();
                    for params in signatures {
                        let key = callable(&owner, "Run", params);
                        let tuple = (project, namespace, name, params.len());
                        if let Some(previous) = seen.insert(key.clone(), tuple) {
                            panic!("{} produced by both {:?} and {:?}", key, previous, tuple);
                        }
                        // Same tuple, same key.
                        assert_eq!(key, callable(&owner, "Run", params));
                    }
                }
            }
        }
    }
}
