//! The tree-walking lowering pass: turns a type-checked [`ExprNode`] tree
//! into textual LLVM IR via [`IrBuilder`].
//!
//! Every node is handled by [`Emitter::emit_value`], which short-circuits on
//! `node.eval_const()` — a constant is rendered as an immediate operand
//! wherever it is used, rather than materialized through a register, which
//! is how `fn main(): int = 1 + 2` ends up as the single line `ret i64 3`
//! (the addition itself was already folded away by the parser; the emitter
//! never even sees an `Infix` node for it).

use crate::ast::{
    CompareOp, ConstValue, ExprKind, ExprNode, FunctionDeclarator, IdRef, IncDecOp, InfixOp, LetDecl, LogicalOp, PrefixOp, ScopeKind, Segment,
};
use crate::intern::Interner;
use crate::ir::builder::IrBuilder;
use crate::types::Type;

/// A branch of an if-else (or its logical-operator short-circuit encoding).
/// `Bool` stands in for the synthetic `true`/`false` arm `&&`/`||` lower
/// into without materializing an `ExprNode` for it.
enum Branch<'n> {
    Node(&'n ExprNode),
    Bool(bool),
}

impl<'n> Branch<'n> {
    fn ty(&self) -> Type {
        match self {
            Branch::Node(n) => n.get_type().clone(),
            Branch::Bool(_) => Type::Bool,
        }
    }
}

pub struct Emitter<'a> {
    builder: IrBuilder,
    interner: &'a Interner,
    /// Slot index → register holding that local's `alloca`'d pointer.
    locals: Vec<String>,
    /// Exit label of each open loop, innermost last — mirrors
    /// `LocalContext::break_seen`'s depth-stack discipline on the emit side.
    breakpoints: Vec<u32>,
}

impl<'a> Emitter<'a> {
    #[must_use]
    pub fn new(filename: &str, interner: &'a Interner, debug: bool) -> Self {
        Self { builder: IrBuilder::new(filename, debug), interner, locals: Vec::new(), breakpoints: Vec::new() }
    }

    #[must_use]
    pub fn finish(self) -> String {
        self.builder.finish()
    }

    pub fn emit_externs(&mut self) {
        for (name, ty) in crate::externs::host_signatures() {
            let f = ty.as_function().expect("host signatures are always function types");
            let params = f.params.iter().map(llvm_type).collect::<Vec<_>>().join(", ");
            self.builder.top_level(format!("declare {} {}({params})", llvm_type(&f.ret), symbol_name(name)));
        }
    }

    /// Declares a name pulled in via `import` so calls to it resolve inside
    /// this module; its definition is emitted by the file that owns it.
    pub fn emit_import_declare(&mut self, name: &str, ty: &Type) {
        let Some(f) = ty.as_function() else {
            // A non-function import is a `global` the owning file also
            // emits a definition for; this module only needs an `extern`
            // reference to the same symbol, expressed the same way.
            self.builder.top_level(format!("{} = external global {}", symbol_name(name), llvm_type(ty)));
            return;
        };
        let params = f.params.iter().map(llvm_type).collect::<Vec<_>>().join(", ");
        self.builder.top_level(format!("declare {} {}({params})", llvm_type(&f.ret), symbol_name(name)));
    }

    pub fn emit_global_let(&mut self, decl: &LetDecl) {
        let t = llvm_type(&decl.ty);
        let v = render_const(decl.value);
        self.builder.top_level(format!("{} = global {t} {v}", symbol_name(&decl.display_name)));
        if let Some(dbg) = self.builder.debug.as_mut() {
            dbg.global_variable(&decl.display_name, decl.span);
        }
    }

    pub fn emit_function(&mut self, f: &FunctionDeclarator) {
        let Some(def) = &f.def else {
            let ret_t = llvm_type(&f.params.ty.ret);
            let params_t = f.params.ty.params.iter().map(llvm_type).collect::<Vec<_>>().join(", ");
            self.builder.top_level(format!("declare {ret_t} {}({params_t})", symbol_name(&f.display_name)));
            return;
        };

        let param_count = f.params.names.len();
        self.builder.reset_function(param_count as u32);
        self.locals.clear();

        let ret_t = llvm_type(&f.params.ty.ret);
        let params_text = f
            .params
            .ty
            .params
            .iter()
            .enumerate()
            .map(|(i, t)| format!("{} %{i}", llvm_type(t)))
            .collect::<Vec<_>>()
            .join(", ");
        self.builder.top_level(format!("define {ret_t} {}({params_text}) {{", symbol_name(&f.display_name)));

        if let Some(dbg) = self.builder.debug.as_mut() {
            dbg.open_subprogram(&f.display_name, f.span);
        }

        self.builder.label(0);
        for (slot, ty) in def.locals.iter().enumerate() {
            let ptr = self.builder.mint_reg();
            self.builder.stmt(format!("{ptr} = alloca {}", llvm_type(ty)));
            let mut declare_line = None;
            if slot < param_count {
                self.builder.stmt(format!("store {} %{slot}, ptr {ptr}", llvm_type(ty)));
                if let Some(dbg) = self.builder.debug.as_mut() {
                    let name = self.interner.get(f.params.names[slot]);
                    declare_line = Some(dbg.declare_local(name, Some(slot as u32), &ptr, f.span));
                }
            }
            self.locals.push(ptr);
            if let Some(line) = declare_line {
                self.builder.stmt(line);
            }
        }

        let result = self.emit_value(&def.body);
        if !def.body.get_type().is_never() {
            match result {
                Some(v) if !f.params.ty.ret.is_none() => self.builder.stmt(format!("ret {ret_t} {v}")),
                _ => self.builder.stmt("ret void"),
            }
        }

        if self.builder.debug.is_some() {
            self.builder.debug.as_mut().unwrap().close_scope();
        }
        self.builder.top_level("}");
    }

    pub fn emit_value(&mut self, node: &ExprNode) -> Option<String> {
        if let Some(c) = node.eval_const() {
            return Some(render_const(c));
        }
        match &node.kind {
            ExprKind::BoolConst(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
            ExprKind::CharConst(c) => Some((*c as u32).to_string()),
            ExprKind::IntConst { value, .. } => Some(value.to_string()),
            ExprKind::FloatConst(f) => Some(format_float(*f)),
            ExprKind::Sizeof(ty) => Some(ty.size().to_string()),
            ExprKind::Id(id_ref) => Some(self.emit_load(id_ref, node.span())),
            ExprKind::Prefix { op, operand } => Some(self.emit_prefix(*op, operand, node.get_type(), node.span())),
            ExprKind::StatefulPrefix { op, operand } => Some(self.emit_inc_dec(*op, operand, true, node.span())),
            ExprKind::StatefulPostfix { op, operand } => Some(self.emit_inc_dec(*op, operand, false, node.span())),
            ExprKind::AddressOf(inner) => Some(self.emit_address_of(inner)),
            ExprKind::Dereference(inner) => Some(self.emit_deref_load(inner, node.get_type(), node.span())),
            ExprKind::Access { base, index } => Some(self.emit_access_load(base, index, node.get_type(), node.span())),
            ExprKind::Infix { op, lhs, rhs } => Some(self.emit_infix(*op, lhs, rhs, node.get_type(), node.span())),
            ExprKind::Compare { op, lhs, rhs } => Some(self.emit_compare(*op, lhs, rhs, node.span())),
            ExprKind::Logical { op, lhs, rhs } => {
                let (then_b, else_b) = match op {
                    LogicalOp::And => (Branch::Node(rhs), Branch::Bool(false)),
                    LogicalOp::Or => (Branch::Bool(true), Branch::Node(rhs)),
                };
                self.lower_if_else(lhs, then_b, Some(else_b), node.span())
            }
            ExprKind::Assign { target, op, value } => self.emit_assign(target, *op, value, node.get_type(), node.span()),
            ExprKind::As { operand, target } => Some(self.emit_cast(operand, target, node.span())),
            ExprKind::Invoke { callee, args } => self.emit_invoke(callee, args, node.get_type(), node.span()),
            ExprKind::InfixInvoke { lhs, func, rhs } => self.emit_infix_invoke(lhs, func, rhs, node.get_type(), node.span()),
            ExprKind::Clause(exprs) => self.emit_clause(exprs, node.get_type(), node.span()),
            ExprKind::IfElse { cond, then_branch, else_branch } => {
                self.lower_if_else(cond, Branch::Node(then_branch), else_branch.as_deref().map(Branch::Node), node.span())
            }
            ExprKind::While { cond, body } => {
                self.emit_while(cond, body, node.get_type(), node.span());
                None
            }
            ExprKind::Break => {
                self.emit_break(node.span());
                None
            }
            ExprKind::Return(value) => {
                self.emit_return(value.as_deref(), node.span());
                None
            }
            ExprKind::Let { name: _, slot, init } => {
                self.emit_let(*slot, init, node.span());
                None
            }
        }
    }

    fn emit_load(&mut self, id_ref: &IdRef, span: Segment) -> String {
        match id_ref.lookup.scope {
            ScopeKind::Local => {
                let ptr = self.locals[id_ref.lookup.index].clone();
                let r = self.builder.mint_reg();
                self.builder.stmt_at(format!("{r} = load {}, ptr {ptr}", llvm_type(&id_ref.lookup.ty)), span);
                r
            }
            ScopeKind::Global => {
                let sym = symbol_name(&id_ref.name);
                if id_ref.lookup.ty.as_function().is_some() {
                    sym
                } else {
                    let r = self.builder.mint_reg();
                    self.builder.stmt_at(format!("{r} = load {}, ptr {sym}", llvm_type(&id_ref.lookup.ty)), span);
                    r
                }
            }
            ScopeKind::None => unreachable!("the wildcard `_` is write-only and is never read"),
        }
    }

    fn emit_store_to(&mut self, target: &ExprNode, value: &str) {
        match &target.kind {
            ExprKind::Id(id_ref) => {
                let t = llvm_type(&id_ref.lookup.ty);
                match id_ref.lookup.scope {
                    ScopeKind::Local => {
                        let ptr = self.locals[id_ref.lookup.index].clone();
                        self.builder.stmt_at(format!("store {t} {value}, ptr {ptr}"), target.span());
                    }
                    ScopeKind::Global => {
                        let sym = symbol_name(&id_ref.name);
                        self.builder.stmt_at(format!("store {t} {value}, ptr {sym}"), target.span());
                    }
                    ScopeKind::None => {
                        // `_ = expr`: the value is still evaluated for its side
                        // effects but there is nowhere to store it.
                    }
                }
            }
            ExprKind::Dereference(inner) => {
                let ptr = self.emit_value(inner).expect("pointer operand of a dereference is never none/never-typed");
                let t = llvm_type(target.get_type());
                self.builder.stmt_at(format!("store {t} {value}, ptr {ptr}"), target.span());
            }
            ExprKind::Access { base, index } => {
                let elem_ptr = self.emit_access_ptr(base, index, target.span());
                let t = llvm_type(target.get_type());
                self.builder.stmt_at(format!("store {t} {value}, ptr {elem_ptr}"), target.span());
            }
            _ => unreachable!("the type checker only ever constructs Id/Dereference/Access assignment targets"),
        }
    }

    fn emit_address_of(&mut self, target: &ExprNode) -> String {
        match &target.kind {
            ExprKind::Id(id_ref) => match id_ref.lookup.scope {
                ScopeKind::Local => self.locals[id_ref.lookup.index].clone(),
                ScopeKind::Global => symbol_name(&id_ref.name),
                ScopeKind::None => unreachable!("`&_` is rejected at parse time"),
            },
            ExprKind::Dereference(inner) => self.emit_value(inner).expect("pointer operand of a dereference is never none/never-typed"),
            ExprKind::Access { base, index } => self.emit_access_ptr(base, index, target.span()),
            _ => unreachable!("`addressOf` of a non-lvalue is rejected at parse time"),
        }
    }

    fn emit_access_ptr(&mut self, base: &ExprNode, index: &ExprNode, span: Segment) -> String {
        let base_ptr = self.emit_value(base).expect("pointer base of an index is never none/never-typed");
        let idx = self.emit_value(index).expect("int index is never none/never-typed");
        let elem_ty = base.get_type().as_pointer().expect("index base is always a pointer").clone();
        let r = self.builder.mint_reg();
        self.builder.stmt_at(format!("{r} = getelementptr inbounds {}, ptr {base_ptr}, i64 {idx}", llvm_type(&elem_ty)), span);
        r
    }

    fn emit_access_load(&mut self, base: &ExprNode, index: &ExprNode, ty: &Type, span: Segment) -> String {
        let ptr = self.emit_access_ptr(base, index, span);
        let r = self.builder.mint_reg();
        self.builder.stmt_at(format!("{r} = load {}, ptr {ptr}", llvm_type(ty)), span);
        r
    }

    fn emit_deref_load(&mut self, inner: &ExprNode, ty: &Type, span: Segment) -> String {
        let ptr = self.emit_value(inner).expect("pointer operand of a dereference is never none/never-typed");
        let r = self.builder.mint_reg();
        self.builder.stmt_at(format!("{r} = load {}, ptr {ptr}", llvm_type(ty)), span);
        r
    }

    fn emit_prefix(&mut self, op: PrefixOp, operand: &ExprNode, ty: &Type, span: Segment) -> String {
        let v = self.emit_value(operand).expect("prefix operand is never none/never-typed");
        if op == PrefixOp::Plus {
            return v;
        }
        let r = self.builder.mint_reg();
        let line = match op {
            PrefixOp::Plus => unreachable!(),
            PrefixOp::Minus if *ty == Type::Float => format!("{r} = fneg double {v}"),
            PrefixOp::Minus => format!("{r} = sub i64 0, {v}"),
            PrefixOp::Not => format!("{r} = xor i1 {v}, 1"),
            PrefixOp::BitNot => format!("{r} = xor i64 {v}, -1"),
        };
        self.builder.stmt_at(line, span);
        r
    }

    fn emit_inc_dec(&mut self, op: IncDecOp, target: &ExprNode, is_pre: bool, span: Segment) -> String {
        let old = self.emit_value(target).expect("++/-- operand is never none/never-typed");
        let delta: i64 = match op {
            IncDecOp::Inc => 1,
            IncDecOp::Dec => -1,
        };
        let new = self.builder.mint_reg();
        if let Some(elem_ty) = target.get_type().as_pointer() {
            self.builder.stmt_at(format!("{new} = getelementptr inbounds {}, ptr {old}, i64 {delta}", llvm_type(elem_ty)), span);
        } else {
            self.builder.stmt_at(format!("{new} = add i64 {old}, {delta}"), span);
        }
        self.emit_store_to(target, &new);
        if is_pre { new } else { old }
    }

    fn emit_infix(&mut self, op: InfixOp, lhs: &ExprNode, rhs: &ExprNode, ty: &Type, span: Segment) -> String {
        if op == InfixOp::Sub {
            if let (Some(elem), Some(_)) = (lhs.get_type().as_pointer(), rhs.get_type().as_pointer()) {
                return self.emit_pointer_diff(lhs, rhs, elem.size(), span);
            }
        }
        let l = self.emit_value(lhs).expect("infix operand is never none/never-typed");
        let r = self.emit_value(rhs).expect("infix operand is never none/never-typed");
        self.emit_infix_values(op, &l, &r, ty, span)
    }

    fn emit_infix_values(&mut self, op: InfixOp, l: &str, r: &str, ty: &Type, span: Segment) -> String {
        let t = llvm_type(ty);
        let mnemonic = mnemonic_for(op, *ty == Type::Float);
        let reg = self.builder.mint_reg();
        self.builder.stmt_at(format!("{reg} = {mnemonic} {t} {l}, {r}"), span);
        reg
    }

    /// `a - b` on two same-type pointers: signed difference in elements, not
    /// bytes — cast both to `int`, subtract, then divide by `sizeof(elem)`.
    fn emit_pointer_diff(&mut self, lhs: &ExprNode, rhs: &ExprNode, elem_size: u32, span: Segment) -> String {
        let l = self.emit_value(lhs).expect("pointer operand is never none/never-typed");
        let r = self.emit_value(rhs).expect("pointer operand is never none/never-typed");
        let li = self.builder.mint_reg();
        self.builder.stmt_at(format!("{li} = ptrtoint ptr {l} to i64"), span);
        let ri = self.builder.mint_reg();
        self.builder.stmt_at(format!("{ri} = ptrtoint ptr {r} to i64"), span);
        let diff = self.builder.mint_reg();
        self.builder.stmt_at(format!("{diff} = sub i64 {li}, {ri}"), span);
        let result = self.builder.mint_reg();
        self.builder.stmt_at(format!("{result} = sdiv i64 {diff}, {elem_size}"), span);
        result
    }

    fn emit_compare(&mut self, op: CompareOp, lhs: &ExprNode, rhs: &ExprNode, span: Segment) -> String {
        let l = self.emit_value(lhs).expect("compare operand is never none/never-typed");
        let r = self.emit_value(rhs).expect("compare operand is never none/never-typed");
        let operand_ty = lhs.get_type();
        let t = llvm_type(operand_ty);
        let is_float = *operand_ty == Type::Float;
        let (kind, pred) = match (op, is_float) {
            (CompareOp::Eq, false) => ("icmp", "eq"),
            (CompareOp::Ne, false) => ("icmp", "ne"),
            (CompareOp::Lt, false) => ("icmp", "slt"),
            (CompareOp::Le, false) => ("icmp", "sle"),
            (CompareOp::Gt, false) => ("icmp", "sgt"),
            (CompareOp::Ge, false) => ("icmp", "sge"),
            (CompareOp::Eq, true) => ("fcmp", "oeq"),
            (CompareOp::Ne, true) => ("fcmp", "une"),
            (CompareOp::Lt, true) => ("fcmp", "olt"),
            (CompareOp::Le, true) => ("fcmp", "ole"),
            (CompareOp::Gt, true) => ("fcmp", "ogt"),
            (CompareOp::Ge, true) => ("fcmp", "oge"),
        };
        let reg = self.builder.mint_reg();
        self.builder.stmt_at(format!("{reg} = {kind} {pred} {t} {l}, {r}"), span);
        reg
    }

    fn emit_assign(&mut self, target: &ExprNode, op: Option<InfixOp>, value: &ExprNode, ty: &Type, span: Segment) -> Option<String> {
        let rhs = match op {
            None => self.emit_value(value).expect("assignment rhs is never none/never-typed"),
            Some(infix_op) => {
                let cur = self.emit_value(target).expect("compound-assignment lvalue is never none/never-typed");
                let rhs_v = self.emit_value(value).expect("compound-assignment rhs is never none/never-typed");
                self.emit_infix_values(infix_op, &cur, &rhs_v, ty, span)
            }
        };
        self.emit_store_to(target, &rhs);
        if ty.is_none() { None } else { Some(rhs) }
    }

    fn emit_cast(&mut self, operand: &ExprNode, target: &Type, span: Segment) -> String {
        let from = operand.get_type().clone();
        let v = self.emit_value(operand).expect("cast operand is never none/never-typed");
        // pointer-to-pointer `as` is a no-op: pointers share representation.
        if from.as_pointer().is_some() && target.as_pointer().is_some() {
            return v;
        }
        let op = match (&from, target) {
            (Type::Pointer(_), Type::Int) => "ptrtoint",
            (Type::Int, Type::Pointer(_)) => "inttoptr",
            (Type::Int, Type::Float) => "sitofp",
            (Type::Float, Type::Int) => "fptosi",
            _ => return v,
        };
        let reg = self.builder.mint_reg();
        self.builder.stmt_at(format!("{reg} = {op} {} {v} to {}", llvm_type(&from), llvm_type(target)), span);
        reg
    }

    fn emit_invoke(&mut self, callee: &IdRef, args: &[ExprNode], ty: &Type, span: Segment) -> Option<String> {
        let callee_sym = symbol_name(&callee.name);
        let mut arg_texts = Vec::with_capacity(args.len());
        for a in args {
            let v = self.emit_value(a).expect("call argument is never none/never-typed");
            arg_texts.push(format!("{} {v}", llvm_type(a.get_type())));
        }
        self.emit_call(&callee_sym, &arg_texts.join(", "), ty, span)
    }

    fn emit_infix_invoke(&mut self, lhs: &ExprNode, func: &IdRef, rhs: &ExprNode, ty: &Type, span: Segment) -> Option<String> {
        let callee_sym = symbol_name(&func.name);
        let l = self.emit_value(lhs).expect("infix-invoke operand is never none/never-typed");
        let r = self.emit_value(rhs).expect("infix-invoke operand is never none/never-typed");
        let args = format!("{} {l}, {} {r}", llvm_type(lhs.get_type()), llvm_type(rhs.get_type()));
        self.emit_call(&callee_sym, &args, ty, span)
    }

    fn emit_call(&mut self, callee_sym: &str, args: &str, ty: &Type, span: Segment) -> Option<String> {
        let ret_t = llvm_type(ty);
        if ty.is_none() {
            self.builder.stmt_at(format!("call {ret_t} {callee_sym}({args})"), span);
            return None;
        }
        let reg = self.builder.mint_reg();
        self.builder.stmt_at(format!("{reg} = call {ret_t} {callee_sym}({args})"), span);
        if ty.is_never() {
            self.builder.stmt("unreachable");
            None
        } else {
            Some(reg)
        }
    }

    fn emit_clause(&mut self, exprs: &[ExprNode], ty: &Type, span: Segment) -> Option<String> {
        if let Some(dbg) = self.builder.debug.as_mut() {
            dbg.open_lexical_block(span);
        }
        let mut last = None;
        for e in exprs {
            last = self.emit_value(e);
        }
        if let Some(dbg) = self.builder.debug.as_mut() {
            dbg.close_scope();
        }
        if ty.is_none() || ty.is_never() { None } else { last }
    }

    /// Shared lowering for both `if`/`else` and the short-circuit encoding of
    /// `&&`/`||`: mint three labels, `alloca` a result slot when the
    /// merged type carries a value, branch, lower each side with a `store` +
    /// `br C` when that side isn't itself `never`-typed, then `load` the
    /// slot at the join — or omit the join label entirely when the merged
    /// type is `never`.
    fn lower_if_else(&mut self, cond: &ExprNode, then_b: Branch, else_b: Option<Branch>, span: Segment) -> Option<String> {
        let then_ty = then_b.ty();
        let else_ty = else_b.as_ref().map(Branch::ty).unwrap_or(Type::None);
        let merged = then_ty.merge(&else_ty).expect("branches already type-checked to agree in the parser");

        let a = self.builder.mint_label();
        let b = self.builder.mint_label();
        let c = self.builder.mint_label();

        let slot = (!merged.is_none() && !merged.is_never()).then(|| {
            let r = self.builder.mint_reg();
            self.builder.stmt_at(format!("{r} = alloca {}", llvm_type(&merged)), span);
            r
        });

        let cond_v = self.emit_value(cond).expect("condition is never none/never-typed");
        self.builder.stmt_at(format!("br i1 {cond_v}, label %L{a}, label %L{b}"), span);

        self.builder.label(a);
        let then_v = self.emit_branch(&then_b, span);
        if !then_ty.is_never() {
            if let (Some(slot), Some(v)) = (&slot, &then_v) {
                self.builder.stmt_at(format!("store {} {v}, ptr {slot}", llvm_type(&merged)), span);
            }
            self.builder.stmt_at(format!("br label %L{c}"), span);
        }

        self.builder.label(b);
        let else_v = match &else_b {
            Some(e) => self.emit_branch(e, span),
            None => None,
        };
        if !else_ty.is_never() {
            if let (Some(slot), Some(v)) = (&slot, &else_v) {
                self.builder.stmt_at(format!("store {} {v}, ptr {slot}", llvm_type(&merged)), span);
            }
            self.builder.stmt_at(format!("br label %L{c}"), span);
        }

        if merged.is_never() {
            return None;
        }
        self.builder.label(c);
        slot.map(|slot| {
            let r = self.builder.mint_reg();
            self.builder.stmt_at(format!("{r} = load {}, ptr {slot}", llvm_type(&merged)), span);
            r
        })
    }

    fn emit_branch(&mut self, b: &Branch, _span: Segment) -> Option<String> {
        match b {
            Branch::Node(n) => self.emit_value(n),
            Branch::Bool(v) => Some(if *v { "1".to_string() } else { "0".to_string() }),
        }
    }

    fn emit_while(&mut self, cond: &ExprNode, body: &ExprNode, ty: &Type, span: Segment) {
        let a = self.builder.mint_label();
        let b = self.builder.mint_label();
        let c = self.builder.mint_label();
        self.breakpoints.push(c);

        self.builder.stmt_at(format!("br label %L{a}"), span);
        self.builder.label(a);
        let cond_v = self.emit_value(cond).expect("loop condition is never none/never-typed");
        self.builder.stmt_at(format!("br i1 {cond_v}, label %L{b}, label %L{c}"), span);

        self.builder.label(b);
        let body_ty = body.get_type().clone();
        self.emit_value(body);
        if !body_ty.is_never() {
            self.builder.stmt_at(format!("br label %L{a}"), span);
        }

        self.builder.label(c);
        if ty.is_never() {
            self.builder.stmt_at("unreachable", span);
        }

        self.breakpoints.pop();
    }

    fn emit_break(&mut self, span: Segment) {
        let target = *self.breakpoints.last().expect("`break` outside a loop is rejected at parse time");
        self.builder.stmt_at(format!("br label %L{target}"), span);
    }

    fn emit_return(&mut self, value: Option<&ExprNode>, span: Segment) {
        match value {
            Some(v) => match self.emit_value(v) {
                Some(r) => self.builder.stmt_at(format!("ret {} {r}", llvm_type(v.get_type())), span),
                None => self.builder.stmt_at("ret void", span),
            },
            None => self.builder.stmt_at("ret void", span),
        }
    }

    fn emit_let(&mut self, slot: usize, init: &ExprNode, span: Segment) {
        let v = self.emit_value(init).expect("let initializer is never none/never-typed");
        let ptr = self.locals[slot].clone();
        self.builder.stmt_at(format!("store {} {v}, ptr {ptr}", llvm_type(init.get_type())), span);
    }
}

fn mnemonic_for(op: InfixOp, is_float: bool) -> &'static str {
    match (op, is_float) {
        (InfixOp::Add, false) => "add",
        (InfixOp::Add, true) => "fadd",
        (InfixOp::Sub, false) => "sub",
        (InfixOp::Sub, true) => "fsub",
        (InfixOp::Mul, false) => "mul",
        (InfixOp::Mul, true) => "fmul",
        (InfixOp::Div, false) => "sdiv",
        (InfixOp::Div, true) => "fdiv",
        (InfixOp::Rem, false) => "srem",
        (InfixOp::Rem, true) => "frem",
        (InfixOp::BitAnd, _) => "and",
        (InfixOp::BitXor, _) => "xor",
        (InfixOp::BitOr, _) => "or",
        (InfixOp::Shl, _) => "shl",
        (InfixOp::Shr, _) => "ashr",
        (InfixOp::UShr, _) => "lshr",
    }
}

fn render_const(c: ConstValue) -> String {
    match c {
        // true -> 1, false -> 0.
        ConstValue::Bool(b) => if b { "1" } else { "0" }.to_string(),
        ConstValue::Int(i) => i.to_string(),
        ConstValue::Float(f) => format_float(f),
    }
}

fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 { format!("{f:.1}") } else { format!("{f}") }
}

pub(super) fn llvm_type(ty: &Type) -> String {
    match ty {
        Type::None | Type::Never => "void".to_string(),
        Type::Bool => "i1".to_string(),
        Type::Int => "i64".to_string(),
        Type::Float => "double".to_string(),
        Type::Pointer(_) | Type::Function(_) => "ptr".to_string(),
    }
}

/// Escapes a symbol name: identifiers outside `[A-Za-z0-9_]` are quoted with
/// each offending byte written as `\HH`.
pub(super) fn symbol_name(name: &str) -> String {
    if name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return format!("@{name}");
    }
    let mut s = String::from("@\"");
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || b == b'_' {
            s.push(b as char);
        } else {
            s.push_str(&format!("\\{b:02X}"));
        }
    }
    s.push('"');
    s
}
