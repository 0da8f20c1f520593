//! File-based module path resolution and caching (`spec.md` §4.5).
//!
//! A dotted path (`a.b.c`) resolves to `a/b/c.lang` relative to a base
//! directory, fixed for the life of a `ModuleLoader`. This type only owns the
//! cache and the diagnostics sink; it does not evaluate anything itself —
//! `eval.rs`'s `Interpreter` drives the read/parse/evaluate sequence so a
//! module that itself `import`s another module recurses through the same
//! `&mut Interpreter` the ordinary call stack already handles, rather than
//! through a re-entrant callback into a borrowed `ModuleLoader`.

use std::path::{Path, PathBuf};

use ahash::AHashMap;

use crate::ast::Node;
use crate::parser::Parser;
use crate::value::Value;

pub struct ModuleLoader {
    base_dir: PathBuf,
    cache: AHashMap<String, Value>,
    /// Human-readable failure messages accumulated by failed loads (§4.5:
    /// "write a diagnostic"). The core crate never prints directly — the CLI
    /// drains this and writes it to stderr.
    pub diagnostics: Vec<String>,
}

impl ModuleLoader {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), cache: AHashMap::new(), diagnostics: Vec::new() }
    }

    fn resolve_path(&self, dotted: &str) -> PathBuf {
        let mut path = self.base_dir.clone();
        for part in dotted.split('.') {
            path.push(part);
        }
        path.set_extension("lang");
        path
    }

    /// Resolves a dotted module path to its filesystem path and cache key.
    #[must_use]
    pub fn resolved_key(&self, dotted: &str) -> (PathBuf, String) {
        let path = self.resolve_path(dotted);
        let key = path.to_string_lossy().into_owned();
        (path, key)
    }

    #[must_use]
    pub fn cached(&self, key: &str) -> Option<Value> {
        self.cache.get(key).cloned()
    }

    pub fn store(&mut self, key: String, value: Value) {
        self.cache.insert(key, value);
    }

    pub fn fail(&mut self, message: String) {
        self.diagnostics.push(message);
    }

    /// Reads and parses a module file, independent of any particular
    /// `ModuleLoader` instance — this is the half of loading that never
    /// recurses back into the interpreter.
    pub fn parse_source(path: &Path, dotted: &str) -> Result<Node, String> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot load module '{dotted}' ({}): {e}", path.display()))?;
        let parser =
            Parser::new(&source).map_err(|e| format!("cannot load module '{dotted}': {e}"))?;
        let (program, parse_err) = parser.parse_program();
        if let Some(e) = parse_err {
            return Err(format!("cannot load module '{dotted}': {e}"));
        }
        Ok(program)
    }

    /// The file-basename stem used as a `Module` value's display name.
    #[must_use]
    pub fn stem(path: &Path, dotted: &str) -> String {
        path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| dotted.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("rlang-module-test-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn resolves_dotted_path_to_nested_lang_file() {
        let loader = ModuleLoader::new("/base");
        let (path, key) = loader.resolved_key("a.b.c");
        assert_eq!(path, PathBuf::from("/base/a/b/c.lang"));
        assert_eq!(key, path.to_string_lossy());
    }

    #[test]
    fn missing_file_is_reported_by_parse_source() {
        let dir = scratch_dir("missing");
        let loader = ModuleLoader::new(&dir);
        let (path, _) = loader.resolved_key("does.not.exist");
        let err = ModuleLoader::parse_source(&path, "does.not.exist").unwrap_err();
        assert!(err.contains("does.not.exist"));
    }

    #[test]
    fn cache_round_trips_a_value() {
        let mut loader = ModuleLoader::new("/base");
        assert!(loader.cached("k").is_none());
        loader.store("k".to_string(), Value::Int(9));
        assert!(matches!(loader.cached("k"), Some(Value::Int(9))));
    }

    #[test]
    fn parse_source_rejects_a_malformed_module() {
        let dir = scratch_dir("parse-error");
        std::fs::write(dir.join("broken.lang"), "var =").expect("write fixture");
        let loader = ModuleLoader::new(&dir);
        let (path, _) = loader.resolved_key("broken");
        assert!(ModuleLoader::parse_source(&path, "broken").is_err());
    }

    #[test]
    fn parse_source_accepts_a_well_formed_module() {
        let dir = scratch_dir("ok");
        std::fs::write(dir.join("util.lang"), "var x = 1").expect("write fixture");
        let loader = ModuleLoader::new(&dir);
        let (path, _) = loader.resolved_key("util");
        let program = ModuleLoader::parse_source(&path, "util").expect("parses");
        assert_eq!(program.children.len(), 1);
    }
}
