//! Second pass: turn one file's declarations into graph facts.

use tracing::trace;

use super::classify::{CallSite, Classified};
use super::symbols::{namespace_node, namespace_path, CallableSymbol, FileDeclarations, SymbolIndex, TypeSymbol};
use super::{ExtractSettings, Extractor, Scope, SourceFile};
use crate::facts::{DeferredTarget, FileFacts};
use crate::graph::{Label, NodeRef, Properties, Relationship, PROJECT_PROPERTY};
use crate::identity::Identity;

/// Nodes, edges and deferred relationships of one file.
pub fn file_facts(
    extractor: &dyn Extractor,
    file: &SourceFile,
    decls: &FileDeclarations,
    index: &SymbolIndex,
    settings: &ExtractSettings,
) -> FileFacts {
    let labels = extractor.labels();
    let project = settings.project.as_str();
    let scope = Scope::new(index, decls, extractor.capabilities(), settings);
    let mut facts = FileFacts::new(&decls.path);

    let root = root_node(project);
    facts.anchor(root.clone());

    for namespace in &decls.namespaces {
        let node = namespace_node(project, namespace, &labels);
        facts.add_node(node.clone(), namespace_properties(namespace, settings));
        facts.link(root.clone(), Relationship::Contains, node);
    }

    for decl in &decls.types {
        let qualified = decl.qualified();
        let Some(symbol) = index.type_symbol(&qualified) else {
            continue;
        };
        let node = index.type_node(symbol, project, &labels);
        facts.add_node(node.clone(), type_properties(symbol, settings));
        facts.link(
            namespace_node(project, &symbol.namespace, &labels),
            Relationship::Declares,
            node.clone(),
        );

        let type_scope = scope.within(&symbol.namespace, Some(&qualified));
        for relation in extractor.relationships(symbol, &type_scope) {
            if let Some(target) = index.type_symbol(&relation.target) {
                facts.link(node.clone(), relation.relationship, index.type_node(target, project, &labels));
            }
        }
    }

    for decl in &decls.callables {
        let owner = decl.owner_ref();
        let Some(idx) = index.find_callable(&owner, &decl.signature()) else {
            continue;
        };
        let (Some(node), Some(owner_node)) = (
            index.callable_node(idx, project, &labels),
            index.owner_node(&owner, project, &labels),
        ) else {
            continue;
        };
        facts.add_node(
            node.clone(),
            callable_properties(index.callable(idx), &owner_node, settings),
        );
        facts.link(owner_node, Relationship::Declares, node.clone());

        let owner_type = decl.owner_type();
        let call_scope = scope.within(&decl.namespace, owner_type.as_deref());
        for classified in extractor.call_sites(decl, file, &call_scope) {
            match classified {
                Classified::Site(CallSite::Ordinary { target, .. }) => {
                    if let Some(callee) = index.callable_node(target, project, &labels) {
                        facts.link(node.clone(), Relationship::Calls, callee);
                    }
                }
                Classified::Site(CallSite::Network { url, .. }) => {
                    let service = NodeRef::new(Label::ExternalService, Identity::Service { url: &url }.key());
                    let mut props = Properties::new();
                    props.insert("name".to_string(), url.clone());
                    props.insert("url".to_string(), url);
                    facts.add_node(service.clone(), props);
                    facts.link(node.clone(), Relationship::CallsService, service);
                }
                Classified::Site(CallSite::Resource {
                    database, collection, ..
                }) => {
                    facts.defer_resource(
                        node.clone(),
                        Relationship::Queries,
                        DeferredTarget::Resource {
                            store: settings.resource_store.clone(),
                            database,
                            collection,
                        },
                    );
                }
                Classified::Unresolved { line, detail } => {
                    trace!(path = %decls.path, line, detail = %detail, "Unresolved call");
                    facts.unresolved(line, detail);
                }
                Classified::Ignored => {}
            }
        }
    }

    facts.finish()
}

pub fn root_node(project: &str) -> NodeRef {
    NodeRef::new(Label::Root, Identity::Root { project }.key())
}

pub fn root_properties(project: &str) -> Properties {
    let mut props = Properties::new();
    props.insert("name".to_string(), project.to_string());
    props.insert(PROJECT_PROPERTY.to_string(), project.to_string());
    props
}

/// `{base}/{path}#{line}`, the browsable location of a declaration.
pub fn source_url(base: &str, path: &str, line: u32) -> String {
    format!("{}/{}#{}", base.trim_end_matches('/'), path.trim_start_matches('/'), line)
}

fn namespace_properties(namespace: &str, settings: &ExtractSettings) -> Properties {
    let mut props = Properties::new();
    props.insert("name".to_string(), namespace_path(namespace).to_string());
    props.insert(PROJECT_PROPERTY.to_string(), settings.project.clone());
    props
}

fn type_properties(symbol: &TypeSymbol, settings: &ExtractSettings) -> Properties {
    let mut props = Properties::new();
    props.insert("name".to_string(), symbol.name.clone());
    props.insert("namespace".to_string(), namespace_path(&symbol.namespace).to_string());
    props.insert(PROJECT_PROPERTY.to_string(), settings.project.clone());
    props.insert("file".to_string(), symbol.file.clone());
    props.insert(
        "url".to_string(),
        source_url(&settings.source_url_base, &symbol.file, symbol.line),
    );
    props
}

fn callable_properties(symbol: &CallableSymbol, owner: &NodeRef, settings: &ExtractSettings) -> Properties {
    let mut props = Properties::new();
    props.insert("name".to_string(), symbol.name.clone());
    props.insert("signature".to_string(), symbol.signature.clone());
    props.insert("owner".to_string(), owner.key.clone());
    props.insert(PROJECT_PROPERTY.to_string(), settings.project.clone());
    props.insert("file".to_string(), symbol.file.clone());
    props.insert(
        "url".to_string(),
        source_url(&settings.source_url_base, &symbol.file, symbol.line),
    );
    props
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_url() {
        assert_eq!(source_url("http://localhost", "src/Foo.cs", 12), "http://localhost/src/Foo.cs#12");
        assert_eq!(source_url("http://git/repo/", "a.go", 1), "http://git/repo/a.go#1");
    }

    #[test]
    fn test_root_node() {
        let root = root_node("Sample");
        assert_eq!(root.key, "root:Sample");
        assert_eq!(root_properties("Sample")["name"], "Sample");
    }
}
