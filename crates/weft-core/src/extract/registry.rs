//! Extractor registry for language selection.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::{CSharpExtractor, Extractor, GoExtractor, JavaExtractor, Language, PythonExtractor};

/// Registry of available extractors, keyed by language and by extension.
pub struct ExtractorRegistry {
    by_language: HashMap<Language, Arc<dyn Extractor>>,
    /// Extension to extractor mapping.
    by_extension: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Create a new registry with all built-in extractors.
    pub fn new() -> Self {
        let mut registry = Self {
            by_language: HashMap::new(),
            by_extension: HashMap::new(),
        };

        registry.register(Arc::new(CSharpExtractor::new()));
        registry.register(Arc::new(GoExtractor::new()));
        registry.register(Arc::new(JavaExtractor::new()));
        registry.register(Arc::new(PythonExtractor::new()));

        registry
    }

    /// Register an extractor for its language and extensions.
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        let language = extractor.language();
        for ext in language.extensions() {
            self.by_extension.insert(ext.to_lowercase(), Arc::clone(&extractor));
        }
        self.by_language.insert(language, extractor);
    }

    pub fn get(&self, language: Language) -> Option<Arc<dyn Extractor>> {
        self.by_language.get(&language).cloned()
    }

    /// Get the extractor that claims the given file path.
    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn Extractor>> {
        let ext = path.extension()?.to_str()?;
        self.by_extension
            .get(&ext.to_lowercase())
            .filter(|extractor| extractor.accepts(path))
            .cloned()
    }

    /// The language most of `paths` belong to. Ties go to the language
    /// listed first in [`Language::ALL`].
    pub fn detect<'p>(&self, paths: impl IntoIterator<Item = &'p Path>) -> Option<Language> {
        let mut counts: HashMap<Language, usize> = HashMap::new();
        for path in paths {
            if let Some(extractor) = self.for_path(path) {
                *counts.entry(extractor.language()).or_default() += 1;
            }
        }
        Language::ALL
            .iter()
            .filter_map(|language| counts.get(language).map(|count| (*language, *count)))
            .fold(None, |best: Option<(Language, usize)>, (language, count)| match best {
                Some((_, top)) if top >= count => best,
                _ => Some((language, count)),
            })
            .map(|(language, _)| language)
    }

    /// All registered languages, in a stable order.
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.by_language.keys().copied().collect();
        languages.sort();
        languages
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_every_grammar_loads() {
        let registry = ExtractorRegistry::new();
        let snippets = [
            (Language::CSharp, "A.cs", "class A { }\n"),
            (Language::Go, "a.go", "package a\n"),
            (Language::Java, "A.java", "class A { }\n"),
            (Language::Python, "a.py", "class A:\n    pass\n"),
        ];
        for (language, path, code) in snippets {
            let extractor = registry.get(language).unwrap();
            if let Err(e) = extractor.parse(path, code.to_string()) {
                panic!("{} grammar failed to load: {}", language, e);
            }
        }
    }

    #[test]
    fn test_registry_creation() {
        let registry = ExtractorRegistry::new();
        assert_eq!(registry.languages(), Language::ALL.to_vec());
        assert!(registry.for_path(Path::new("src/Foo.CS")).is_some());
        assert!(registry.for_path(Path::new("README.md")).is_none());
    }

    #[test]
    fn test_go_test_files_are_not_claimed() {
        let registry = ExtractorRegistry::new();
        assert!(registry.for_path(Path::new("pkg/store.go")).is_some());
        assert!(registry.for_path(Path::new("pkg/store_test.go")).is_none());
    }

    #[test]
    fn test_detect_dominant_language() {
        let registry = ExtractorRegistry::new();
        let paths: Vec<PathBuf> = ["a.py", "b.py", "tools/gen.go", "notes.txt"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(registry.detect(paths.iter().map(|p| p.as_path())), Some(Language::Python));

        let tie: Vec<PathBuf> = ["A.java", "b.py"].iter().map(PathBuf::from).collect();
        assert_eq!(registry.detect(tie.iter().map(|p| p.as_path())), Some(Language::Java));
        assert_eq!(registry.detect(std::iter::empty()), None);
    }
}
