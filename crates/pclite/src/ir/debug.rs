//! Optional DWARF-style debug metadata: a compile unit, one
//! `DISubprogram` per function, nested `DILexicalBlock`s per clause, and a
//! `DILocation` for every instruction that participates in control flow.
//!
//! Metadata node numbering starts at `!10` — `!0`..`!9` are reserved for the
//! compile unit, file, and the module's globals list.

use crate::ast::Segment;

const FIRST_FREE_ID: u32 = 10;

#[derive(Debug)]
pub struct DebugInfo {
    next_id: u32,
    nodes: Vec<String>,
    scopes: Vec<u32>,
    globals: Vec<u32>,
}

impl DebugInfo {
    #[must_use]
    pub fn new(filename: &str) -> Self {
        let mut info = Self { next_id: FIRST_FREE_ID, nodes: Vec::new(), scopes: Vec::new(), globals: Vec::new() };
        info.nodes.push("!0 = distinct !DICompileUnit(language: DW_LANG_C99, file: !1, emissionKind: FullDebug, globals: !9)".to_string());
        info.nodes.push(format!("!1 = !DIFile(filename: \"{filename}\", directory: \".\")"));
        info.nodes.push(String::new()); // patched in `finish` once every global is known: !9
        info
    }

    fn alloc(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// A fresh `DILocation` in the innermost open scope.
    pub fn location(&mut self, span: Segment) -> u32 {
        let scope = *self.scopes.last().expect("dbg location emitted outside any open scope");
        let id = self.alloc();
        self.nodes.push(format!("!{id} = !DILocation(line: {}, column: {}, scope: !{scope})", span.line1 + 1, span.column1));
        id
    }

    /// Opens a function's top-level scope. Every clause nested inside opens
    /// a further [`Self::open_lexical_block`] and restores this on exit.
    pub fn open_subprogram(&mut self, name: &str, span: Segment) -> u32 {
        let id = self.alloc();
        self.nodes.push(format!(
            "!{id} = distinct !DISubprogram(name: \"{name}\", unit: !0, file: !1, line: {}, scopeLine: {}, spFlags: DISPFlagDefinition)",
            span.line1 + 1,
            span.line1 + 1,
        ));
        self.scopes.push(id);
        id
    }

    pub fn open_lexical_block(&mut self, span: Segment) -> u32 {
        let parent = *self.scopes.last().expect("lexical block opened outside a subprogram");
        let id = self.alloc();
        self.nodes.push(format!("!{id} = distinct !DILexicalBlock(scope: !{parent}, file: !1, line: {})", span.line1 + 1));
        self.scopes.push(id);
        id
    }

    pub fn close_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declares a parameter or local (`arg_index` `Some` only for parameters)
    /// and returns a ready-to-emit `llvm.dbg.declare` call line.
    pub fn declare_local(&mut self, name: &str, arg_index: Option<u32>, ptr_reg: &str, span: Segment) -> String {
        let scope = *self.scopes.last().expect("local variable declared outside any scope");
        let var_id = self.alloc();
        match arg_index {
            Some(n) => self.nodes.push(format!(
                "!{var_id} = !DILocalVariable(name: \"{name}\", arg: {}, scope: !{scope}, file: !1, line: {})",
                n + 1,
                span.line1 + 1
            )),
            None => self
                .nodes
                .push(format!("!{var_id} = !DILocalVariable(name: \"{name}\", scope: !{scope}, file: !1, line: {})", span.line1 + 1)),
        }
        let loc_id = self.location(span);
        format!("call void @llvm.dbg.declare(metadata ptr {ptr_reg}, metadata !{var_id}, metadata !DIExpression()), !dbg !{loc_id}")
    }

    pub fn global_variable(&mut self, name: &str, span: Segment) {
        let var_id = self.alloc();
        let expr_id = self.alloc();
        self.nodes
            .push(format!("!{var_id} = distinct !DIGlobalVariable(name: \"{name}\", scope: !0, file: !1, line: {})", span.line1 + 1));
        self.nodes.push(format!("!{expr_id} = !DIGlobalVariableExpression(var: !{var_id}, expr: !DIExpression())"));
        self.globals.push(expr_id);
    }

    #[must_use]
    pub fn finish(mut self) -> String {
        let list = self.globals.iter().map(|id| format!("!{id}")).collect::<Vec<_>>().join(", ");
        self.nodes[2] = format!("!9 = !{{{list}}}");
        let mut out = String::new();
        out.push_str("declare void @llvm.dbg.declare(metadata, metadata, metadata)\n\n");
        for line in &self.nodes {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}
