//! Scope discipline: the local-context frame stack used while parsing a
//! function body, and the flat global scope shared by every top-level
//! declaration in a file.

use std::rc::Rc;

use ahash::AHashMap;

use crate::ast::{FunctionDeclarator, LetDecl, Lookup, ScopeKind};
use crate::error::{Category, CompileError, Note};
use crate::intern::StringId;
use crate::ast::Segment;
use crate::types::Type;

/// Names declared within a single lexical frame (a clause, an `if`/`else`
/// arm, or a `while` body).
#[derive(Debug, Default)]
struct LocalFrame {
    names: AHashMap<StringId, usize>,
}

/// A stack of [`LocalFrame`]s plus the parallel vector of local types
/// (indexed by slot) that the function's frame grows as it parses.
///
/// A [`ParameterList`](crate::ast::ParameterList) reserves slots `0..n` up
/// front by calling [`LocalContext::declare`] once per parameter before the
/// body is parsed.
#[derive(Debug, Default)]
pub struct LocalContext {
    frames: Vec<LocalFrame>,
    pub locals: Vec<Type>,
    /// One entry per open `while`, innermost last: whether a `break`
    /// targeting that loop has been seen yet. `break` always targets the
    /// innermost loop, so this is all a `break` or a `while`'s own
    /// `never`-typing needs — no back-pointer to the loop node required.
    break_seen: Vec<bool>,
}

impl LocalContext {
    #[must_use]
    pub fn new() -> Self {
        Self { frames: vec![LocalFrame::default()], locals: Vec::new(), break_seen: Vec::new() }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(LocalFrame::default());
    }

    pub fn pop_frame(&mut self) {
        self.frames.pop();
        debug_assert!(!self.frames.is_empty(), "popped the outermost local frame");
    }

    pub fn enter_loop(&mut self) {
        self.break_seen.push(false);
    }

    /// Pops the innermost loop, returning whether it saw a `break`.
    pub fn exit_loop(&mut self) -> bool {
        self.break_seen.pop().expect("exit_loop without enter_loop")
    }

    #[must_use]
    pub fn in_loop(&self) -> bool {
        !self.break_seen.is_empty()
    }

    /// Records that a `break` targeting the innermost loop was parsed.
    /// Panics if called outside a loop; callers must check `in_loop` first.
    pub fn mark_break(&mut self) {
        *self.break_seen.last_mut().expect("mark_break outside a loop") = true;
    }

    /// Declares `name` in the innermost frame, reserving a fresh local slot.
    /// `_` is the wildcard: it is never recorded, so it can be "declared"
    /// arbitrarily many times without colliding.
    pub fn declare(&mut self, name: StringId, is_wildcard: bool, ty: Type) -> usize {
        let slot = self.locals.len();
        self.locals.push(ty);
        if !is_wildcard {
            self.frames.last_mut().expect("at least one frame").names.insert(name, slot);
        }
        slot
    }

    /// Walks frames inner-to-outer looking for `name`.
    #[must_use]
    pub fn lookup(&self, name: StringId) -> Option<Lookup> {
        for frame in self.frames.iter().rev() {
            if let Some(&slot) = frame.names.get(&name) {
                return Some(Lookup { ty: self.locals[slot].clone(), index: slot, scope: ScopeKind::Local });
            }
        }
        None
    }
}

/// The flat, file-wide scope shared by every top-level declaration: function
/// and global-`let` names, the file's `imports`/`exports` tables, and the
/// ordered lists used for emission.
///
/// `labelUntil` is deliberately *not* kept here (see `DESIGN.md`): it is
/// per-function emitter state, reset at the start of each function, rather
/// than scope-wide mutable state threaded through parsing.
#[derive(Debug, Default)]
pub struct GlobalScope {
    names: AHashMap<StringId, Type>,
    pub imports: AHashMap<StringId, Type>,
    pub exports: AHashMap<StringId, Type>,
    pub lets: Vec<LetDecl>,
    pub fns: Vec<FunctionDeclarator>,
}

impl GlobalScope {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn lookup(&self, name: StringId) -> Option<Lookup> {
        self.names.get(&name).map(|ty| Lookup { ty: ty.clone(), index: 0, scope: ScopeKind::Global })
    }

    /// Reserves `name` as a global (function or `let`) binding. Rejects
    /// shadowing an already-declared global name.
    pub fn declare(&mut self, name: StringId, display_name: &Rc<str>, ty: Type, span: Segment) -> Result<(), CompileError> {
        if self.names.contains_key(&name) {
            return Err(CompileError::new(
                Category::Semantic,
                span,
                format!("duplicate global declaration '{display_name}'"),
            )
            .with_note(Note::without_span("first declared earlier in this file")));
        }
        self.names.insert(name, ty);
        Ok(())
    }

    #[must_use]
    pub fn is_declared(&self, name: StringId) -> bool {
        self.names.contains_key(&name)
    }

    /// Brings an imported name into scope. Unlike [`Self::declare`] this does
    /// not reject re-import of the same name (callers have already checked
    /// the types agree via [`crate::import::merge_imports`]).
    pub fn bind_import(&mut self, name: StringId, ty: Type) {
        self.names.entry(name).or_insert(ty);
    }

    /// Overwrites a previously reserved name's type. Used only to patch a
    /// self-recursive function's provisional `none` return type once its
    /// body has been fully type-checked and the real return type is known.
    pub fn update_type(&mut self, name: StringId, ty: Type) {
        self.names.insert(name, ty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::Interner;

    #[test]
    fn local_lookup_walks_frames_inner_to_outer() {
        let mut interner = Interner::new();
        let x = interner.intern("x");
        let mut ctx = LocalContext::new();
        ctx.declare(x, false, Type::Int);
        ctx.push_frame();
        ctx.declare(x, false, Type::Bool);
        assert_eq!(ctx.lookup(x).unwrap().ty, Type::Bool);
        ctx.pop_frame();
        assert_eq!(ctx.lookup(x).unwrap().ty, Type::Int);
    }

    #[test]
    fn wildcard_is_never_recorded() {
        let mut interner = Interner::new();
        let wildcard = interner.intern("_");
        let mut ctx = LocalContext::new();
        ctx.declare(wildcard, true, Type::Int);
        ctx.declare(wildcard, true, Type::Bool);
        assert!(ctx.lookup(wildcard).is_none());
        assert_eq!(ctx.locals.len(), 2);
    }

    #[test]
    fn loop_stack_tracks_innermost_break() {
        let mut ctx = LocalContext::new();
        assert!(!ctx.in_loop());
        ctx.enter_loop();
        ctx.enter_loop();
        ctx.mark_break();
        assert!(ctx.in_loop());
        assert!(ctx.exit_loop());
        assert!(!ctx.exit_loop());
        assert!(!ctx.in_loop());
    }

    #[test]
    fn global_scope_rejects_duplicate_declaration() {
        let mut interner = Interner::new();
        let f = interner.intern("f");
        let name: Rc<str> = Rc::from("f");
        let mut globals = GlobalScope::new();
        globals.declare(f, &name, Type::Int, Segment::default()).unwrap();
        assert!(globals.is_declared(f));
        let err = globals.declare(f, &name, Type::Bool, Segment::default()).unwrap_err();
        assert_eq!(err.category, Category::Semantic);
    }

    #[test]
    fn global_scope_import_binding_does_not_overwrite() {
        let mut interner = Interner::new();
        let g = interner.intern("g");
        let mut globals = GlobalScope::new();
        globals.bind_import(g, Type::Int);
        globals.bind_import(g, Type::Bool);
        assert_eq!(globals.lookup(g).unwrap().ty, Type::Int);
    }
}
