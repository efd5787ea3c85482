//! File-import resolution: the path cache, the cycle-detecting pending set,
//! and the trait the parser uses to pull in another file's exports without
//! knowing how that file is actually loaded from disk.
//!
//! Loading bytes for a path is a host concern (file I/O is explicitly out of
//! scope for this core) — see [`ImportHost`]. Parsing the file it names, and
//! remembering what it exported, is this core's job and lives in
//! [`crate::compile::Compilation`].

use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::Segment;
use crate::error::{Category, CompileError, Note};
use crate::intern::{Interner, StringId};
use crate::types::Type;

/// A file's exported function symbols: name → function type.
pub type ExportTable = Rc<AHashMap<StringId, Type>>;

/// Resolves and supplies the raw text of an imported file.
///
/// A path is whatever the host chooses it to mean (commonly: resolved
/// relative to the importing file's own path). This core never reads a
/// filesystem itself — callers in tests typically back this with an
/// in-memory map.
pub trait SourceLoader {
    fn load(&mut self, importer: &str, import_path: &str) -> Result<(String, String), CompileError>;
}

/// Resolves an `import`/`export import` path to the exports it offers,
/// recursively compiling the target file on first encounter and serving the
/// cached result afterward.
pub trait ImportHost {
    /// `interner` is threaded through explicitly (rather than owned by the
    /// host) so a recursive compile of the imported file shares the exact
    /// same [`Interner`] as the importer without the host needing to borrow
    /// both itself and that interner at once.
    fn resolve_import(&mut self, importer: &str, import_path: &str, span: Segment, interner: &mut Interner) -> Result<ExportTable, CompileError>;
}

/// Tracks completed imports (by resolved path) and the chain of paths
/// currently being compiled, to detect cycles.
#[derive(Debug, Default)]
pub struct ImportCache {
    completed: AHashMap<String, ExportTable>,
    pending: Vec<String>,
}

impl ImportCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn completed(&self, path: &str) -> Option<ExportTable> {
        self.completed.get(path).cloned()
    }

    /// Marks `path` as in-progress, reporting a cycle (with the full chain)
    /// if it is already on the pending stack.
    pub fn enter(&mut self, path: &str, span: Segment) -> Result<(), CompileError> {
        if let Some(start) = self.pending.iter().position(|p| p == path) {
            let chain = self.pending[start..].join(" -> ");
            return Err(CompileError::new(
                Category::Semantic,
                span,
                format!("recursive import: {chain} -> {path}"),
            ));
        }
        self.pending.push(path.to_owned());
        Ok(())
    }

    pub fn finish(&mut self, path: &str, exports: ExportTable) {
        self.pending.pop();
        self.completed.insert(path.to_owned(), exports);
    }

    /// Pops `path` off the pending stack without recording a result, used
    /// when compiling the imported file itself failed.
    pub fn abandon(&mut self, path: &str) {
        if self.pending.last().map(String::as_str) == Some(path) {
            self.pending.pop();
        }
    }
}

/// Combines a resolved imported file's exports into the importer's global
/// `imports` table, rejecting a name already imported under a different
/// type.
pub fn merge_imports(into: &mut AHashMap<StringId, Type>, exports: &ExportTable, span: Segment) -> Result<(), CompileError> {
    for (&name, ty) in exports.iter() {
        if let Some(existing) = into.get(&name) {
            if existing != ty {
                return Err(CompileError::new(
                    Category::Semantic,
                    span,
                    "imported name conflicts with a previous import of a different type",
                )
                .with_note(Note::without_span("both imports bind the same name")));
            }
        } else {
            into.insert(name, ty.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_import_is_cached() {
        let mut cache = ImportCache::new();
        assert!(cache.completed("a.pc").is_none());
        cache.enter("a.pc", Segment::default()).unwrap();
        cache.finish("a.pc", Rc::new(AHashMap::default()));
        assert!(cache.completed("a.pc").is_some());
    }

    #[test]
    fn re_entering_a_pending_path_is_a_cycle() {
        let mut cache = ImportCache::new();
        cache.enter("a.pc", Segment::default()).unwrap();
        cache.enter("b.pc", Segment::default()).unwrap();
        let err = cache.enter("a.pc", Segment::default()).unwrap_err();
        assert_eq!(err.category, Category::Semantic);
        assert!(err.message.contains("a.pc"));
    }

    #[test]
    fn abandon_pops_only_the_matching_top_of_stack() {
        let mut cache = ImportCache::new();
        cache.enter("a.pc", Segment::default()).unwrap();
        cache.abandon("b.pc");
        assert!(cache.enter("a.pc", Segment::default()).is_err());
        cache.abandon("a.pc");
        assert!(cache.enter("a.pc", Segment::default()).is_ok());
    }

    #[test]
    fn merge_imports_rejects_conflicting_types() {
        let mut interner = Interner::new();
        let name = interner.intern("f");
        let mut into = AHashMap::default();
        into.insert(name, Type::Int);
        let mut exports = AHashMap::default();
        exports.insert(name, Type::Bool);
        let err = merge_imports(&mut into, &Rc::new(exports), Segment::default()).unwrap_err();
        assert_eq!(err.category, Category::Semantic);
    }

    #[test]
    fn merge_imports_accepts_the_same_type_twice() {
        let mut interner = Interner::new();
        let name = interner.intern("f");
        let mut into = AHashMap::default();
        into.insert(name, Type::Int);
        let mut exports = AHashMap::default();
        exports.insert(name, Type::Int);
        merge_imports(&mut into, &Rc::new(exports), Segment::default()).unwrap();
        assert_eq!(into.len(), 1);
    }
}
