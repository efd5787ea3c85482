//! The top-level compilation driver: wires the lexer, parser, and IR
//! emitter together and owns the pieces of shared mutable state confined
//! to a single compilation — the current [`Source`], the current
//! [`GlobalScope`], and the import cache + pending set. The [`Interner`] is
//! threaded through explicitly rather than owned here (see
//! [`crate::import::ImportHost`]'s doc comment) so a recursive import
//! compile shares it without a self-referential borrow.
//!
//! Import resolution recurses synchronously: [`Compilation`] implements
//! [`ImportHost`] itself, compiling the target file the first time it is
//! named and serving the cached export table on every later import of the
//! same path. Loading the raw bytes for a path is left to a host-supplied
//! [`SourceLoader`].

use ahash::AHashMap;
use std::rc::Rc;

use crate::ast::Segment;
use crate::error::{CResult, Category, CompileError};
use crate::externs;
use crate::import::{ExportTable, ImportCache, ImportHost, SourceLoader};
use crate::intern::Interner;
use crate::ir;
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::source::Source;

/// A single file's compiled output: the LLVM IR text plus the export table
/// other files importing it will see.
pub struct CompiledFile {
    pub ir: String,
    pub exports: ExportTable,
}

pub struct Compilation<'l> {
    loader: &'l mut dyn SourceLoader,
    cache: ImportCache,
    debug: bool,
}

impl<'l> Compilation<'l> {
    #[must_use]
    pub fn new(loader: &'l mut dyn SourceLoader, debug: bool) -> Self {
        Self { loader, cache: ImportCache::new(), debug }
    }

    /// Compiles `path` (already resolved by the host) to LLVM IR, recursing
    /// into its imports as needed. `interner` is fresh per top-level
    /// compilation and shared with every file it transitively imports.
    pub fn compile_path(&mut self, path: &str, interner: &mut Interner) -> CResult<CompiledFile> {
        let (filename, text) = self.loader.load("", path)?;
        self.compile_text(&filename, &text, interner)
    }

    fn compile_text(&mut self, filename: &str, text: &str, interner: &mut Interner) -> CResult<CompiledFile> {
        let mut source = Source::new(filename, text);
        Lexer::new(&mut source).tokenize()?;

        let prelude = externs::host_signatures().into_iter().map(|(name, ty)| (interner.intern(name), ty)).collect::<Vec<_>>();

        let tokens = std::mem::take(&mut source.tokens);
        let globals = Parser::parse_file(&tokens, interner, filename, self, &prelude)?;

        let ir_text = ir::emit_module(&globals, &*interner, filename, self.debug);
        let exports: AHashMap<_, _> = globals.exports.iter().map(|(&name, ty)| (name, ty.clone())).collect();
        Ok(CompiledFile { ir: ir_text, exports: Rc::new(exports) })
    }
}

impl<'l> ImportHost for Compilation<'l> {
    fn resolve_import(&mut self, importer: &str, import_path: &str, span: Segment, interner: &mut Interner) -> CResult<ExportTable> {
        if let Some(cached) = self.cache.completed(import_path) {
            return Ok(cached);
        }
        self.cache.enter(import_path, span)?;
        let (filename, text) = match self.loader.load(importer, import_path) {
            Ok(pair) => pair,
            Err(e) => {
                self.cache.abandon(import_path);
                return Err(e);
            }
        };
        match self.compile_text(&filename, &text, interner) {
            Ok(compiled) => {
                self.cache.finish(import_path, compiled.exports.clone());
                Ok(compiled.exports)
            }
            Err(e) => {
                self.cache.abandon(import_path);
                Err(e)
            }
        }
    }
}

/// An in-memory [`SourceLoader`] backed by a flat path → text map, used by
/// tests and by any host that has already resolved every import to a known
/// set of files.
#[derive(Debug, Default)]
pub struct MapLoader {
    files: AHashMap<String, String>,
}

impl MapLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: impl Into<String>, text: impl Into<String>) -> &mut Self {
        self.files.insert(path.into(), text.into());
        self
    }
}

impl SourceLoader for MapLoader {
    fn load(&mut self, _importer: &str, import_path: &str) -> CResult<(String, String)> {
        self.files
            .get(import_path)
            .map(|text| (import_path.to_string(), text.clone()))
            .ok_or_else(|| CompileError::new(Category::Io, Segment::default(), format!("cannot open import '{import_path}'")))
    }
}
