//! Per-language tables of outbound HTTP and data-access APIs.
//!
//! Call classification never matches on receiver *names*: a receiver counts
//! as an HTTP client or a data-access handle only when its bound type is one
//! of the types listed here (or a project type deriving from one).

use super::symbols::TypeRef;

/// An HTTP client type and the methods that issue requests. The URL is the
/// first argument of each.
#[derive(Debug, Clone, Copy)]
pub struct HttpClientType {
    pub namespace: &'static str,
    pub name: &'static str,
    pub methods: &'static [&'static str],
}

/// A module-level function that issues a request.
#[derive(Debug, Clone, Copy)]
pub struct HttpFunction {
    pub module: &'static str,
    pub name: &'static str,
    /// Position of the URL argument.
    pub url_arg: usize,
}

/// A data-access library. Every value obtained from one of its types is
/// itself a handle of the library.
#[derive(Debug, Clone, Copy)]
pub struct DataAccess {
    pub namespace: &'static str,
    /// Types the namespace exports, for resolving bare names.
    pub types: &'static [&'static str],
    /// Methods whose first argument names a collection.
    pub resource_lookup: &'static [&'static str],
    /// Methods whose first argument names a database.
    pub database_lookup: &'static [&'static str],
    /// Methods that neither query nor navigate.
    pub non_queries: &'static [&'static str],
}

/// A method of an external type whose result type is known.
#[derive(Debug, Clone, Copy)]
pub struct ReturnRule {
    pub namespace: &'static str,
    pub type_name: &'static str,
    pub method: &'static str,
    pub returns_namespace: &'static str,
    pub returns_name: &'static str,
}

/// Everything classification knows about one language's ecosystem.
#[derive(Debug)]
pub struct Capabilities {
    pub http_clients: &'static [HttpClientType],
    pub http_functions: &'static [HttpFunction],
    pub data_access: &'static [DataAccess],
    pub returns: &'static [ReturnRule],
    /// Whether a lookup chained on a lookup names the database first
    /// (`client["db"]["users"]`).
    pub nested_lookup_names_database: bool,
}

impl Capabilities {
    pub fn http_client(&self, namespace: &str, name: &str) -> Option<&'static HttpClientType> {
        self.http_clients
            .iter()
            .find(|c| c.namespace == namespace && c.name == name)
    }

    pub fn http_function(&self, module: &str, name: &str) -> Option<&'static HttpFunction> {
        self.http_functions
            .iter()
            .find(|f| f.module == module && f.name == name)
    }

    /// The data-access library exporting `namespace`. Sub-namespaces
    /// (option builders, models) do not count.
    pub fn data_access(&self, namespace: &str) -> Option<&'static DataAccess> {
        self.data_access.iter().find(|d| d.namespace == namespace)
    }

    pub fn returns(&self, namespace: &str, type_name: &str, method: &str) -> Option<TypeRef> {
        self.returns
            .iter()
            .find(|r| r.namespace == namespace && r.type_name == type_name && r.method == method)
            .map(|r| TypeRef::external(r.returns_namespace, r.returns_name))
    }

    /// Whether `namespace` exports a type called `name` that this table knows.
    pub fn knows(&self, namespace: &str, name: &str) -> bool {
        self.http_client(namespace, name).is_some()
            || self
                .data_access(namespace)
                .is_some_and(|d| d.types.contains(&name))
            || self
                .returns
                .iter()
                .any(|r| r.namespace == namespace && r.type_name == name)
    }

    /// Last-resort binding of a bare type name no import explains: the
    /// unique capability type of that exact name. Callers only use it after
    /// project declarations and imports failed.
    pub fn fallback_type(&self, name: &str) -> Option<TypeRef> {
        let mut found: Vec<&'static str> = self
            .http_clients
            .iter()
            .filter(|c| c.name == name)
            .map(|c| c.namespace)
            .chain(
                self.data_access
                    .iter()
                    .filter(|d| d.types.contains(&name))
                    .map(|d| d.namespace),
            )
            .chain(
                self.returns
                    .iter()
                    .filter(|r| r.type_name == name)
                    .map(|r| r.namespace),
            )
            .collect();
        found.sort_unstable();
        found.dedup();
        match found.as_slice() {
            [namespace] => Some(TypeRef::external(*namespace, name)),
            _ => None,
        }
    }
}

// ============================================================================
// C#
// ============================================================================

pub static CSHARP: Capabilities = Capabilities {
    http_clients: &[
        HttpClientType {
            namespace: "System.Net.Http",
            name: "HttpClient",
            methods: &[
                "GetAsync",
                "PostAsync",
                "PutAsync",
                "PatchAsync",
                "DeleteAsync",
                "GetStringAsync",
                "GetStreamAsync",
                "GetByteArrayAsync",
                "GetFromJsonAsync",
                "PostAsJsonAsync",
                "PutAsJsonAsync",
                "PatchAsJsonAsync",
                "DeleteFromJsonAsync",
                "SendAsync",
                "Send",
            ],
        },
        HttpClientType {
            namespace: "RestSharp",
            name: "RestClient",
            methods: &[
                "Execute",
                "ExecuteAsync",
                "ExecuteGetAsync",
                "ExecutePostAsync",
                "GetAsync",
                "PostAsync",
                "PutAsync",
                "DeleteAsync",
                "GetJsonAsync",
                "PostJsonAsync",
            ],
        },
    ],
    http_functions: &[],
    data_access: &[DataAccess {
        namespace: "MongoDB.Driver",
        types: &[
            "MongoClient",
            "IMongoClient",
            "IMongoDatabase",
            "IMongoCollection",
            "MongoCollectionBase",
            "IMongoQueryable",
        ],
        resource_lookup: &["GetCollection"],
        database_lookup: &["GetDatabase"],
        non_queries: &[
            "ListDatabaseNames",
            "ListDatabaseNamesAsync",
            "StartSession",
            "StartSessionAsync",
            "WithReadPreference",
            "WithReadConcern",
            "WithWriteConcern",
        ],
    }],
    returns: &[ReturnRule {
        namespace: "System.Net.Http",
        type_name: "IHttpClientFactory",
        method: "CreateClient",
        returns_namespace: "System.Net.Http",
        returns_name: "HttpClient",
    }],
    nested_lookup_names_database: false,
};

// ============================================================================
// Go
// ============================================================================

pub static GO: Capabilities = Capabilities {
    http_clients: &[HttpClientType {
        namespace: "net/http",
        name: "Client",
        methods: &["Get", "Post", "Head", "PostForm", "Do"],
    }],
    http_functions: &[
        HttpFunction {
            module: "net/http",
            name: "Get",
            url_arg: 0,
        },
        HttpFunction {
            module: "net/http",
            name: "Post",
            url_arg: 0,
        },
        HttpFunction {
            module: "net/http",
            name: "Head",
            url_arg: 0,
        },
        HttpFunction {
            module: "net/http",
            name: "PostForm",
            url_arg: 0,
        },
        HttpFunction {
            module: "net/http",
            name: "NewRequest",
            url_arg: 1,
        },
        HttpFunction {
            module: "net/http",
            name: "NewRequestWithContext",
            url_arg: 2,
        },
    ],
    data_access: &[
        DataAccess {
            namespace: "go.mongodb.org/mongo-driver/mongo",
            types: &["Client", "Database", "Collection", "Cursor", "SingleResult"],
            resource_lookup: &["Collection"],
            database_lookup: &["Database"],
            non_queries: &["Connect", "Disconnect", "Ping", "StartSession", "Name", "Client", "NewClient"],
        },
        DataAccess {
            namespace: "go.mongodb.org/mongo-driver/v2/mongo",
            types: &["Client", "Database", "Collection", "Cursor", "SingleResult"],
            resource_lookup: &["Collection"],
            database_lookup: &["Database"],
            non_queries: &["Connect", "Disconnect", "Ping", "StartSession", "Name", "Client", "NewClient"],
        },
    ],
    returns: &[],
    nested_lookup_names_database: false,
};

// ============================================================================
// Java
// ============================================================================

const WEBCLIENT: &str = "org.springframework.web.reactive.function.client";

/// WebClient verbs return a spec; the URL arrives with `.uri(...)`.
const fn webclient_verb(method: &'static str, spec: &'static str) -> ReturnRule {
    ReturnRule {
        namespace: WEBCLIENT,
        type_name: "WebClient",
        method,
        returns_namespace: WEBCLIENT,
        returns_name: spec,
    }
}

pub static JAVA: Capabilities = Capabilities {
    http_clients: &[
        HttpClientType {
            namespace: "org.springframework.web.client",
            name: "RestTemplate",
            methods: &[
                "getForObject",
                "getForEntity",
                "postForObject",
                "postForEntity",
                "postForLocation",
                "put",
                "patchForObject",
                "delete",
                "exchange",
                "execute",
                "headForHeaders",
                "optionsForAllow",
            ],
        },
        HttpClientType {
            namespace: WEBCLIENT,
            name: "RequestHeadersUriSpec",
            methods: &["uri"],
        },
        HttpClientType {
            namespace: WEBCLIENT,
            name: "RequestBodyUriSpec",
            methods: &["uri"],
        },
        HttpClientType {
            namespace: "okhttp3",
            name: "OkHttpClient",
            methods: &["newCall"],
        },
        HttpClientType {
            namespace: "java.net.http",
            name: "HttpClient",
            methods: &["send", "sendAsync"],
        },
    ],
    http_functions: &[],
    data_access: &[DataAccess {
        namespace: "com.mongodb.client",
        types: &["MongoClient", "MongoDatabase", "MongoCollection", "MongoClients", "FindIterable"],
        resource_lookup: &["getCollection"],
        database_lookup: &["getDatabase"],
        non_queries: &["create", "close", "startSession", "listDatabaseNames", "getName", "withCodecRegistry"],
    }],
    returns: &[
        ReturnRule {
            namespace: "java.net.http",
            type_name: "HttpClient",
            method: "newHttpClient",
            returns_namespace: "java.net.http",
            returns_name: "HttpClient",
        },
        webclient_verb("get", "RequestHeadersUriSpec"),
        webclient_verb("delete", "RequestHeadersUriSpec"),
        webclient_verb("head", "RequestHeadersUriSpec"),
        webclient_verb("post", "RequestBodyUriSpec"),
        webclient_verb("put", "RequestBodyUriSpec"),
        webclient_verb("patch", "RequestBodyUriSpec"),
    ],
    nested_lookup_names_database: false,
};

// ============================================================================
// Python
// ============================================================================

const PYTHON_VERBS: &[&str] = &["get", "post", "put", "patch", "delete", "head", "options", "request"];

pub static PYTHON: Capabilities = Capabilities {
    http_clients: &[
        HttpClientType {
            namespace: "requests",
            name: "Session",
            methods: PYTHON_VERBS,
        },
        HttpClientType {
            namespace: "httpx",
            name: "Client",
            methods: PYTHON_VERBS,
        },
        HttpClientType {
            namespace: "httpx",
            name: "AsyncClient",
            methods: PYTHON_VERBS,
        },
        HttpClientType {
            namespace: "aiohttp",
            name: "ClientSession",
            methods: PYTHON_VERBS,
        },
    ],
    http_functions: &[
        HttpFunction {
            module: "requests",
            name: "get",
            url_arg: 0,
        },
        HttpFunction {
            module: "requests",
            name: "post",
            url_arg: 0,
        },
        HttpFunction {
            module: "requests",
            name: "put",
            url_arg: 0,
        },
        HttpFunction {
            module: "requests",
            name: "patch",
            url_arg: 0,
        },
        HttpFunction {
            module: "requests",
            name: "delete",
            url_arg: 0,
        },
        HttpFunction {
            module: "requests",
            name: "head",
            url_arg: 0,
        },
        HttpFunction {
            module: "requests",
            name: "request",
            url_arg: 1,
        },
        HttpFunction {
            module: "httpx",
            name: "get",
            url_arg: 0,
        },
        HttpFunction {
            module: "httpx",
            name: "post",
            url_arg: 0,
        },
        HttpFunction {
            module: "httpx",
            name: "put",
            url_arg: 0,
        },
        HttpFunction {
            module: "httpx",
            name: "patch",
            url_arg: 0,
        },
        HttpFunction {
            module: "httpx",
            name: "delete",
            url_arg: 0,
        },
        HttpFunction {
            module: "httpx",
            name: "request",
            url_arg: 1,
        },
    ],
    data_access: &[
        DataAccess {
            namespace: "pymongo",
            types: &["MongoClient"],
            resource_lookup: &["get_collection", "__getitem__"],
            database_lookup: &["get_database", "get_default_database"],
            non_queries: &["close", "server_info", "list_database_names", "start_session"],
        },
        DataAccess {
            namespace: "motor.motor_asyncio",
            types: &["AsyncIOMotorClient"],
            resource_lookup: &["get_collection", "__getitem__"],
            database_lookup: &["get_database", "get_default_database"],
            non_queries: &["close", "server_info", "list_database_names", "start_session"],
        },
    ],
    returns: &[],
    nested_lookup_names_database: true,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_access_is_exact() {
        assert!(JAVA.data_access("com.mongodb.client").is_some());
        assert!(JAVA.data_access("com.mongodb.client.model").is_none());
        assert!(GO.data_access("go.mongodb.org/mongo-driver/mongo/options").is_none());
        assert!(PYTHON.data_access("motor.motor_asyncio").is_some());
    }

    #[test]
    fn test_fallback_requires_unique_name() {
        assert_eq!(
            CSHARP.fallback_type("HttpClient"),
            Some(TypeRef::external("System.Net.Http", "HttpClient"))
        );
        // Present in both Mongo driver generations.
        assert_eq!(GO.fallback_type("Collection"), None);
        assert_eq!(CSHARP.fallback_type("List"), None);
    }

    #[test]
    fn test_return_rules() {
        assert_eq!(
            CSHARP.returns("System.Net.Http", "IHttpClientFactory", "CreateClient"),
            Some(TypeRef::external("System.Net.Http", "HttpClient"))
        );
        assert!(CSHARP.knows("MongoDB.Driver", "IMongoCollection"));
        assert!(!CSHARP.knows("MongoDB.Driver", "List"));
    }
}
