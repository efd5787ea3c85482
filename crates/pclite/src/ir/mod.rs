//! Textual LLVM IR emission: the tree-walking lowering pass over a
//! type-checked [`GlobalScope`].

mod builder;
mod debug;
mod emit;

pub use builder::IrBuilder;
pub use emit::Emitter;

use crate::intern::Interner;
use crate::scope::GlobalScope;

/// Emits a complete module: host-library externs, then every global `let`,
/// then every function — declarations for imports and unfulfilled forward
/// declarations, definitions for the rest — in source order.
#[must_use]
pub fn emit_module(scope: &GlobalScope, interner: &Interner, filename: &str, debug: bool) -> String {
    let mut emitter = Emitter::new(filename, interner, debug);
    emitter.emit_externs();
    for (&name, ty) in &scope.imports {
        emitter.emit_import_declare(interner.get(name), ty);
    }
    for decl in &scope.lets {
        emitter.emit_global_let(decl);
    }
    for f in &scope.fns {
        emitter.emit_function(f);
    }
    emitter.finish()
}
