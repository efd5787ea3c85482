//! PorkchopLite: lexer, combined parser/type-checker, and textual LLVM IR
//! emitter for a small statically-typed imperative language.
//!
//! The pipeline is a single forward pass, file by file: [`source::Source`]
//! owns the raw text, [`lexer::Lexer`] tokenizes it in place, [`parser`]
//! builds a type-checked [`ast::ExprNode`] tree while resolving scope and
//! folding constants, and [`ir::emit_module`] walks that tree to produce
//! LLVM textual IR. [`compile::Compilation`] is the driver that strings
//! these together across a file and the files it imports.

pub mod ast;
pub mod compile;
pub mod error;
pub mod externs;
pub mod import;
pub mod intern;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod source;
pub mod token;
pub mod types;
pub mod unicode;

pub use compile::{CompiledFile, Compilation, MapLoader};
pub use error::{CResult, CompileError};
