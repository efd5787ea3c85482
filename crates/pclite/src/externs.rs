//! Host library extern declarations: the fixed set of runtime functions a
//! compiled program may call without an explicit `import`.
//!
//! The core's only responsibility toward these is emitting correctly typed
//! `declare`s and calls — the functions themselves ship with the runtime,
//! not with anything this crate produces.

use crate::types::Type;

/// `(name, type)` pairs bound into a file's global scope before its first
/// token is parsed, and declared at the top of its emitted module.
#[must_use]
pub fn host_signatures() -> Vec<(&'static str, Type)> {
    vec![
        ("printint", Type::function(vec![Type::Int], Type::None)),
        ("printfloat", Type::function(vec![Type::Float], Type::None)),
        ("print_int_array", Type::function(vec![Type::pointer(Type::Int), Type::Int], Type::None)),
        ("alloc", Type::function(vec![Type::Int], Type::pointer(Type::None))),
        ("dealloc", Type::function(vec![Type::pointer(Type::None)], Type::None)),
        ("exit", Type::function(vec![Type::Int], Type::Never)),
        // Optional threading intrinsics; always declared, used only if
        // a program actually calls them.
        ("thread_create", Type::function(vec![Type::pointer(Type::None), Type::pointer(Type::None)], Type::Int)),
        ("thread_join", Type::function(vec![Type::Int], Type::pointer(Type::None))),
        ("thread_self", Type::function(vec![], Type::Int)),
        ("pc_time", Type::function(vec![], Type::Float)),
        (
            "parallel_reduce",
            Type::function(
                vec![Type::pointer(Type::None), Type::Int, Type::Int, Type::pointer(Type::None), Type::pointer(Type::None)],
                Type::pointer(Type::None),
            ),
        ),
        (
            "parallel_for",
            Type::function(vec![Type::pointer(Type::None), Type::Int, Type::pointer(Type::None)], Type::pointer(Type::None)),
        ),
    ]
}
