//! Low-level textual assembly: line buffering and the per-function
//! register/label counters.
//!
//! `label_until` lives here, reset by [`IrBuilder::reset_function`] at the
//! start of each function, rather than on `GlobalScope` — see `DESIGN.md`'s
//! note on the "global mutable label counter" redesign.

use crate::ast::Segment;
use crate::ir::debug::DebugInfo;

#[derive(Debug)]
pub struct IrBuilder {
    lines: Vec<String>,
    reg: u32,
    label_until: u32,
    pub(super) debug: Option<DebugInfo>,
}

impl IrBuilder {
    #[must_use]
    pub fn new(filename: &str, debug: bool) -> Self {
        Self { lines: Vec::new(), reg: 0, label_until: 0, debug: debug.then(|| DebugInfo::new(filename)) }
    }

    /// Resets the SSA register counter and `labelUntil` for a new function.
    /// `param_count` seeds the register counter past the parameters, which
    /// already occupy `%0..%param_count` positionally in the function header.
    /// `labelUntil` seeds at 1, since every function's entry block is the
    /// literal label `L0`, minted directly rather than through
    /// [`Self::mint_label`].
    pub fn reset_function(&mut self, param_count: u32) {
        self.reg = param_count;
        self.label_until = 1;
    }

    #[must_use]
    pub fn mint_reg(&mut self) -> String {
        let r = self.reg;
        self.reg += 1;
        format!("%{r}")
    }

    #[must_use]
    pub fn mint_label(&mut self) -> u32 {
        let l = self.label_until;
        self.label_until += 1;
        l
    }

    /// A module-level line: global/extern declarations, function headers,
    /// and the closing brace — never indented.
    pub fn top_level(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// A statement inside a function body, 4-space indented.
    pub fn stmt(&mut self, line: impl Into<String>) {
        self.lines.push(format!("    {}", line.into()));
    }

    /// Same as [`Self::stmt`], suffixing `, !dbg !K` when debug metadata is
    /// enabled, with a fresh `DILocation` covering `span`.
    pub fn stmt_at(&mut self, line: impl Into<String>, span: Segment) {
        let mut line = line.into();
        if let Some(dbg) = self.debug.as_mut() {
            let loc = dbg.location(span);
            line.push_str(&format!(", !dbg !{loc}"));
        }
        self.stmt(line);
    }

    /// A label line, unindented, at column 0.
    pub fn label(&mut self, n: u32) {
        self.lines.push(format!("L{n}:"));
    }

    #[must_use]
    pub fn finish(self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        if let Some(dbg) = self.debug {
            out.push('\n');
            out.push_str(&dbg.finish());
        }
        out
    }
}
