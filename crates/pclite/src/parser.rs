//! The combined precedence-climbing parser and type checker.
//!
//! Parsing and type inference share a single pass: every [`ExprNode`] is
//! constructed with its type (and, where possible, its folded constant
//! value) already computed, so a type error is raised at the point the
//! offending expression is built rather than during a later walk.

use std::rc::Rc;

use crate::ast::{
    CompareOp, ConstCache, ConstValue, ExprKind, ExprNode, FunctionDeclarator, FunctionDefinition, IdRef, IncDecOp, InfixOp, LetDecl,
    Lookup, LogicalOp, ParameterList, PrefixOp, ScopeKind, Segment,
};
use crate::error::{CResult, Category, CompileError, Note};
use crate::import::{merge_imports, ImportHost};
use crate::intern::{Interner, StringId};
use crate::scope::{GlobalScope, LocalContext};
use crate::token::{IntRadix, Keyword, Punct, Token, TokenKind};
use crate::types::{FuncType, Type};

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    interner: &'a mut Interner,
    globals: GlobalScope,
    locals: LocalContext,
    /// Name of the function currently being defined, and the returns seen
    /// in its body so far (payload type, span). `None` outside a function.
    current_fn: Option<(StringId, Vec<(Type, Segment)>)>,
    /// Set when a call to the function currently being defined is parsed
    /// while its return type was not declared — see `parse_function`.
    saw_undeclared_self_call: bool,
    importer_path: String,
    host: &'a mut dyn ImportHost,
}

impl<'a> Parser<'a> {
    /// `prelude` seeds the global scope before any source is parsed — the
    /// host-library externs, bound the same way an ordinary `import`
    /// would bind them, so calls to `printint`/`alloc`/etc. type-check
    /// without the source file importing anything.
    pub fn parse_file(
        tokens: &'a [Token],
        interner: &'a mut Interner,
        importer_path: &str,
        host: &'a mut dyn ImportHost,
        prelude: &[(StringId, Type)],
    ) -> CResult<GlobalScope> {
        let mut globals = GlobalScope::new();
        for (name, ty) in prelude {
            globals.bind_import(*name, ty.clone());
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            interner,
            globals,
            locals: LocalContext::new(),
            current_fn: None,
            saw_undeclared_self_call: false,
            importer_path: importer_path.to_owned(),
            host,
        };
        parser.skip_linebreaks();
        while !parser.at_end() {
            parser.parse_top_level_form()?;
            if !parser.at_end() {
                parser.expect_linebreak_separator()?;
            }
        }
        Ok(parser.globals)
    }

    // ---- token-stream primitives ----------------------------------------

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn span_here(&self) -> Segment {
        match self.peek() {
            Some(t) => Segment::single(t.line, t.column, t.width),
            None => self.tokens.last().map_or(Segment::default(), |t| Segment::single(t.line, t.column + t.width, 0)),
        }
    }

    fn skip_linebreaks(&mut self) {
        while matches!(self.peek_kind(), Some(TokenKind::Linebreak)) {
            self.pos += 1;
        }
    }

    /// Consumes one or more `LINEBREAK`s between top-level forms.
    fn expect_linebreak_separator(&mut self) -> CResult<()> {
        if !matches!(self.peek_kind(), Some(TokenKind::Linebreak)) {
            return Err(self.error_here("expected a line break between top-level declarations"));
        }
        self.skip_linebreaks();
        Ok(())
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::new(Category::Parse, self.span_here(), message)
    }

    fn is_punct(&self, p: Punct) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Punct(q)) if *q == p)
    }

    fn is_keyword(&self, k: Keyword) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Keyword(q)) if *q == k)
    }

    fn eat_punct(&mut self, p: Punct) -> bool {
        if self.is_punct(p) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, k: Keyword) -> bool {
        if self.is_keyword(k) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: Punct) -> CResult<Segment> {
        let span = self.span_here();
        if self.eat_punct(p) {
            Ok(span)
        } else {
            Err(self.error_here(format!("expected '{p}'")))
        }
    }

    fn expect_keyword(&mut self, k: Keyword) -> CResult<Segment> {
        let span = self.span_here();
        if self.eat_keyword(k) {
            Ok(span)
        } else {
            Err(self.error_here(format!("expected '{k}'")))
        }
    }

    fn expect_identifier(&mut self) -> CResult<(String, Segment)> {
        let span = self.span_here();
        match self.peek_kind() {
            Some(TokenKind::Identifier(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok((name, span))
            }
            _ => Err(self.error_here("expected an identifier")),
        }
    }

    // ---- types -------------------------------------------------------

    fn parse_type(&mut self) -> CResult<Type> {
        if self.eat_punct(Punct::Star) {
            return Ok(Type::pointer(self.parse_type()?));
        }
        let (name, span) = self.expect_identifier()?;
        match name.as_str() {
            "int" => Ok(Type::Int),
            "float" => Ok(Type::Float),
            "bool" => Ok(Type::Bool),
            "none" => Ok(Type::None),
            _ => Err(CompileError::new(Category::Parse, span, format!("unknown type name '{name}'"))),
        }
    }

    // ---- top-level forms ----------------------------------------------

    fn parse_top_level_form(&mut self) -> CResult<()> {
        if self.is_keyword(Keyword::Import) {
            self.parse_import(false)
        } else if self.is_keyword(Keyword::Export) {
            self.pos += 1;
            self.expect_keyword(Keyword::Import)?;
            self.parse_import(true)
        } else if self.is_keyword(Keyword::Fn) {
            self.parse_function()
        } else if self.is_keyword(Keyword::Let) {
            self.parse_global_let()
        } else {
            Err(self.error_here("expected 'fn', 'let', or 'import' at top level"))
        }
    }

    fn parse_import(&mut self, exported: bool) -> CResult<()> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Import)?;
        let path_span = self.span_here();
        let path = match self.peek_kind() {
            Some(TokenKind::Str(s)) => {
                let s = s.clone();
                self.pos += 1;
                s
            }
            _ => return Err(self.error_here("expected a string literal naming the import path")),
        };
        let span = Segment::join(span, path_span);
        let exports = self.host.resolve_import(&self.importer_path, &path, span, &mut *self.interner)?;
        merge_imports(&mut self.globals.imports, &exports, span)?;
        for (&name, ty) in exports.iter() {
            self.globals.bind_import(name, ty.clone());
        }
        if exported {
            for (&name, ty) in exports.iter() {
                self.globals.exports.insert(name, ty.clone());
            }
        }
        Ok(())
    }

    fn parse_global_let(&mut self) -> CResult<()> {
        let span = self.span_here();
        self.expect_keyword(Keyword::Let)?;
        let (name, name_span) = self.expect_identifier()?;
        self.expect_punct(Punct::Assign)?;
        let init = self.parse_expr()?;
        let value = init.eval_const().ok_or_else(|| {
            CompileError::new(
                Category::Semantic,
                init.span(),
                "a file-scope 'let' initializer must be a compile-time constant",
            )
        })?;
        if init.get_type().is_none() || init.get_type().is_never() {
            return Err(CompileError::new(
                Category::Type,
                init.span(),
                "a file-scope 'let' may not have type 'none' or 'never'",
            ));
        }
        let ty = init.get_type().clone();
        let name_id = self.interner.intern(&name);
        let span = Segment::join(span, init.span());
        self.globals.declare(name_id, &Rc::from(name.as_str()), ty.clone(), span)?;
        self.globals.lets.push(LetDecl { name: name_id, display_name: Rc::from(name.as_str()), ty, value, span: name_span });
        Ok(())
    }

    fn parse_function(&mut self) -> CResult<()> {
        let start = self.span_here();
        self.expect_keyword(Keyword::Fn)?;
        let (name, name_span) = self.expect_identifier()?;
        let name_id = self.interner.intern(&name);
        let display_name: Rc<str> = Rc::from(name.as_str());

        self.expect_punct(Punct::LParen)?;
        let mut param_names = Vec::new();
        let mut param_types = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                let (pname, _) = self.expect_identifier()?;
                self.expect_punct(Punct::Colon)?;
                let pty = self.parse_type()?;
                param_names.push(self.interner.intern(&pname));
                param_types.push(pty);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        self.expect_punct(Punct::RParen)?;

        let declared_ret = if self.eat_punct(Punct::Colon) { Some(self.parse_type()?) } else { None };
        let provisional_ret = declared_ret.clone().unwrap_or(Type::None);
        let func_ty = Type::Function(Rc::new(FuncType { params: param_types.clone(), ret: provisional_ret.clone() }));

        let span = Segment::join(start, name_span);
        // A prior declaration-only `fn` (no `=`) forward-declares this name
        // for mutual recursion; a matching definition completes it in
        // place rather than colliding with it as a duplicate global.
        let forward_decl = self.globals.fns.iter().position(|f| f.name == name_id && f.def.is_none());
        match forward_decl {
            Some(idx) => {
                let existing = self.globals.lookup(name_id).expect("forward-declared name is in scope").ty;
                if existing != func_ty {
                    return Err(CompileError::new(
                        Category::Semantic,
                        span,
                        format!("definition of '{name}' does not match its forward declaration '{existing}'"),
                    ));
                }
                self.globals.fns.remove(idx);
            }
            None => self.globals.declare(name_id, &display_name, func_ty, span)?,
        }

        let params = ParameterList { names: param_names.clone(), ty: Rc::new(FuncType { params: param_types.clone(), ret: provisional_ret.clone() }) };

        let def = if self.eat_punct(Punct::Assign) {
            self.locals = LocalContext::new();
            for (pname, pty) in param_names.iter().zip(param_types.iter()) {
                self.locals.declare(*pname, false, pty.clone());
            }
            self.current_fn = Some((name_id, Vec::new()));
            self.saw_undeclared_self_call = false;

            let body = self.parse_expr()?;

            let (_, returns) = self.current_fn.take().expect("set above");
            let inferred = Self::infer_return_type(&body, &returns)?;
            let final_ret = match &declared_ret {
                Some(declared) => {
                    if !declared.assignable_from(&inferred) {
                        return Err(CompileError::new(
                            Category::Type,
                            body.span(),
                            format!("function returns are not assignable to the declared return type '{declared}'"),
                        ));
                    }
                    declared.clone()
                }
                None => inferred,
            };
            if declared_ret.is_none() && final_ret != provisional_ret {
                if self.saw_undeclared_self_call {
                    return Err(CompileError::new(
                        Category::Semantic,
                        body.span(),
                        "a self-recursive function must declare its return type explicitly unless it is 'none'",
                    ));
                }
                self.globals.update_type(
                    name_id,
                    Type::Function(Rc::new(FuncType { params: param_types.clone(), ret: final_ret.clone() })),
                );
            }

            Some(FunctionDefinition { body, locals: self.locals.locals.clone() })
        } else {
            None
        };

        self.globals.fns.push(FunctionDeclarator { name: name_id, display_name, params, def, span });
        Ok(())
    }

    /// The body's own tail-expression type is authoritative; a `return`'s
    /// payload type falls back to seeding it only when the tail itself
    /// never completes (so there is nothing for the tail to contribute).
    /// Every `return` must then equal that type exactly.
    fn infer_return_type(body: &ExprNode, returns: &[(Type, Segment)]) -> CResult<Type> {
        if returns.is_empty() {
            return Ok(body.get_type().clone());
        }
        let (type0, origin) =
            if body.get_type().is_never() { (returns[0].0.clone(), returns[0].1) } else { (body.get_type().clone(), body.span()) };
        for (ty, span) in returns {
            if *ty != type0 {
                return Err(CompileError::new(Category::Type, *span, "return statements disagree on their value's type")
                    .with_note(Note::new("conflicts with the function's inferred return type here", origin)));
            }
        }
        Ok(type0)
    }

    // ---- clauses -------------------------------------------------------

    fn parse_clause(&mut self) -> CResult<ExprNode> {
        let start = self.expect_punct(Punct::LBrace)?;
        self.locals.push_frame();
        self.skip_linebreaks();
        let mut exprs = Vec::new();
        while !self.is_punct(Punct::RBrace) {
            let expr = self.parse_expr()?;
            let diverges = expr.get_type().is_never();
            exprs.push(expr);
            self.skip_linebreaks();
            if diverges && !self.is_punct(Punct::RBrace) {
                return Err(CompileError::new(
                    Category::Semantic,
                    self.span_here(),
                    "unreachable code after a diverging expression",
                ));
            }
        }
        let end = self.expect_punct(Punct::RBrace)?;
        self.locals.pop_frame();
        let span = Segment::join(start, end);
        let ty = exprs.last().map_or(Type::None, |e| e.get_type().clone());
        // A clause folds to a constant only when it is a single constant
        // expression: anything more could carry side effects (an
        // assignment, a `let`) between construction and use.
        let konst = match exprs.as_slice() {
            [only] => only.eval_const().map_or(ConstCache::Runtime, ConstCache::Constant),
            _ => ConstCache::Runtime,
        };
        Ok(ExprNode::new(span, ty, konst, ExprKind::Clause(exprs)))
    }

    // ---- expressions: precedence climbing -------------------------------

    fn parse_expr(&mut self) -> CResult<ExprNode> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> CResult<ExprNode> {
        let target = self.parse_logical_or()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Punct(Punct::Assign)) => Some(None),
            Some(TokenKind::Punct(Punct::PlusAssign)) => Some(Some(InfixOp::Add)),
            Some(TokenKind::Punct(Punct::MinusAssign)) => Some(Some(InfixOp::Sub)),
            Some(TokenKind::Punct(Punct::StarAssign)) => Some(Some(InfixOp::Mul)),
            Some(TokenKind::Punct(Punct::SlashAssign)) => Some(Some(InfixOp::Div)),
            Some(TokenKind::Punct(Punct::PercentAssign)) => Some(Some(InfixOp::Rem)),
            Some(TokenKind::Punct(Punct::AmpAssign)) => Some(Some(InfixOp::BitAnd)),
            Some(TokenKind::Punct(Punct::CaretAssign)) => Some(Some(InfixOp::BitXor)),
            Some(TokenKind::Punct(Punct::PipeAssign)) => Some(Some(InfixOp::BitOr)),
            Some(TokenKind::Punct(Punct::ShlAssign)) => Some(Some(InfixOp::Shl)),
            Some(TokenKind::Punct(Punct::ShrAssign)) => Some(Some(InfixOp::Shr)),
            Some(TokenKind::Punct(Punct::UShrAssign)) => Some(Some(InfixOp::UShr)),
            _ => None,
        };
        let Some(op) = op else { return Ok(target) };
        self.pos += 1;
        if !is_lvalue(&target) {
            return Err(CompileError::new(Category::Type, target.span(), "assignment target is not an lvalue"));
        }
        let value = self.parse_assignment()?;
        let value_ty = if let Some(o) = op { infix_result_type(o, target.get_type(), value.get_type(), value.span())? } else { value.get_type().clone() };
        if !target.get_type().assignable_from(&value_ty) {
            return Err(CompileError::new(
                Category::Type,
                value.span(),
                format!("cannot assign a value of type '{}' to a target of type '{}'", value_ty, target.get_type()),
            ));
        }
        let span = Segment::join(target.span(), value.span());
        let ty = target.get_type().clone();
        Ok(ExprNode::new(span, ty, ConstCache::Runtime, ExprKind::Assign { target: Box::new(target), op, value: Box::new(value) }))
    }

    fn parse_logical_or(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_logical_and()?;
        while self.eat_punct(Punct::OrOr) {
            let rhs = self.parse_logical_and()?;
            lhs = self.build_logical(LogicalOp::Or, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_logical_and(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_bitor()?;
        while self.eat_punct(Punct::AndAnd) {
            let rhs = self.parse_bitor()?;
            lhs = self.build_logical(LogicalOp::And, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn build_logical(&self, op: LogicalOp, lhs: ExprNode, rhs: ExprNode) -> CResult<ExprNode> {
        check_bool_operand(&lhs)?;
        check_bool_operand(&rhs)?;
        let span = Segment::join(lhs.span(), rhs.span());
        let konst = match (lhs.eval_const(), rhs.eval_const()) {
            (Some(ConstValue::Bool(l)), Some(ConstValue::Bool(r))) => {
                ConstCache::Constant(ConstValue::Bool(match op {
                    LogicalOp::And => l && r,
                    LogicalOp::Or => l || r,
                }))
            }
            _ => ConstCache::Runtime,
        };
        Ok(ExprNode::new(span, Type::Bool, konst, ExprKind::Logical { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }))
    }

    fn parse_bitor(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_bitxor()?;
        while self.eat_punct(Punct::Pipe) {
            let rhs = self.parse_bitxor()?;
            lhs = self.build_infix(InfixOp::BitOr, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_bitxor(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_bitand()?;
        while self.eat_punct(Punct::Caret) {
            let rhs = self.parse_bitand()?;
            lhs = self.build_infix(InfixOp::BitXor, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_bitand(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_equality()?;
        while self.eat_punct(Punct::Amp) {
            let rhs = self.parse_equality()?;
            lhs = self.build_infix(InfixOp::BitAnd, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = if self.eat_punct(Punct::EqEq) {
                CompareOp::Eq
            } else if self.eat_punct(Punct::NotEq) {
                CompareOp::Ne
            } else {
                break;
            };
            let rhs = self.parse_comparison()?;
            lhs = self.build_compare(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_shift()?;
        loop {
            let op = if self.eat_punct(Punct::Lt) {
                CompareOp::Lt
            } else if self.eat_punct(Punct::Le) {
                CompareOp::Le
            } else if self.eat_punct(Punct::Gt) {
                CompareOp::Gt
            } else if self.eat_punct(Punct::Ge) {
                CompareOp::Ge
            } else {
                break;
            };
            let rhs = self.parse_shift()?;
            lhs = self.build_compare(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn build_compare(&self, op: CompareOp, lhs: ExprNode, rhs: ExprNode) -> CResult<ExprNode> {
        let span = Segment::join(lhs.span(), rhs.span());
        match op {
            CompareOp::Eq | CompareOp::Ne => {
                if lhs.get_type() != rhs.get_type() {
                    return Err(CompileError::new(Category::Type, span, "comparison operands must have the same type"));
                }
            }
            _ => {
                let ok = (lhs.get_type().is_arithmetic() && rhs.get_type().is_arithmetic() && lhs.get_type() == rhs.get_type())
                    || (lhs.get_type().as_pointer().is_some() && lhs.get_type() == rhs.get_type());
                if !ok {
                    return Err(CompileError::new(
                        Category::Type,
                        span,
                        "ordered comparison requires two operands of the same arithmetic or pointer type",
                    ));
                }
            }
        }
        let konst = fold_compare(op, &lhs, &rhs);
        Ok(ExprNode::new(span, Type::Bool, konst, ExprKind::Compare { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }))
    }

    fn parse_shift(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_addition()?;
        loop {
            let op = if self.eat_punct(Punct::Shl) {
                InfixOp::Shl
            } else if self.eat_punct(Punct::Shr) {
                InfixOp::Shr
            } else if self.eat_punct(Punct::UShr) {
                InfixOp::UShr
            } else {
                break;
            };
            let rhs = self.parse_addition()?;
            lhs = self.build_infix(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_addition(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_multiplication()?;
        loop {
            let op = if self.eat_punct(Punct::Plus) {
                InfixOp::Add
            } else if self.eat_punct(Punct::Minus) {
                InfixOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_multiplication()?;
            lhs = self.build_infix(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_multiplication(&mut self) -> CResult<ExprNode> {
        let mut lhs = self.parse_prefix()?;
        loop {
            if self.is_punct(Punct::Backtick) {
                lhs = self.parse_infix_invoke_tail(lhs)?;
                continue;
            }
            let op = if self.eat_punct(Punct::Star) {
                InfixOp::Mul
            } else if self.eat_punct(Punct::Slash) {
                InfixOp::Div
            } else if self.eat_punct(Punct::Percent) {
                InfixOp::Rem
            } else {
                break;
            };
            let rhs = self.parse_prefix()?;
            lhs = self.build_infix(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    /// `` x `f` y `` — binds as tightly as `* / %`, folded into
    /// `parse_multiplication`'s loop rather than given its own tier.
    fn parse_infix_invoke_tail(&mut self, lhs: ExprNode) -> CResult<ExprNode> {
        self.pos += 1; // opening backtick
        let (name, name_span) = self.expect_identifier()?;
        self.expect_punct(Punct::Backtick)?;
        let func = self.resolve_identifier(&name, name_span)?;
        let Some(fty) = func.lookup.ty.as_function().cloned() else {
            return Err(CompileError::new(Category::Type, name_span, format!("'{name}' is not callable")));
        };
        if fty.params.len() != 2 {
            return Err(CompileError::new(Category::Type, name_span, format!("'{name}' does not take exactly two parameters")));
        }
        let rhs = self.parse_prefix()?;
        if !fty.params[0].assignable_from(lhs.get_type()) || !fty.params[1].assignable_from(rhs.get_type()) {
            return Err(CompileError::new(Category::Type, rhs.span(), "argument types do not match the infix function's signature"));
        }
        let span = Segment::join(lhs.span(), rhs.span());
        let ty = fty.ret.clone();
        Ok(ExprNode::new(span, ty, ConstCache::Runtime, ExprKind::InfixInvoke { lhs: Box::new(lhs), func, rhs: Box::new(rhs) }))
    }

    fn build_infix(&self, op: InfixOp, lhs: ExprNode, rhs: ExprNode) -> CResult<ExprNode> {
        let span = Segment::join(lhs.span(), rhs.span());
        let ty = infix_result_type(op, lhs.get_type(), rhs.get_type(), span)?;
        if matches!(op, InfixOp::Div | InfixOp::Rem) && ty == Type::Int {
            if let Some(ConstValue::Int(0)) = rhs.eval_const() {
                return Err(CompileError::new(Category::Semantic, rhs.span(), "division by a constant zero"));
            }
        }
        let konst = fold_infix(op, &lhs, &rhs);
        Ok(ExprNode::new(span, ty, konst, ExprKind::Infix { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }))
    }

    fn parse_prefix(&mut self) -> CResult<ExprNode> {
        let start = self.span_here();
        if self.eat_punct(Punct::PlusPlus) {
            let operand = self.parse_prefix()?;
            return self.build_stateful(IncDecOp::Inc, operand, start, true);
        }
        if self.eat_punct(Punct::MinusMinus) {
            let operand = self.parse_prefix()?;
            return self.build_stateful(IncDecOp::Dec, operand, start, true);
        }
        if self.eat_punct(Punct::Amp) {
            let operand = self.parse_prefix()?;
            if !is_lvalue(&operand) {
                return Err(CompileError::new(Category::Type, operand.span(), "cannot take the address of a non-lvalue"));
            }
            if operand.get_type().as_function().is_some() {
                return Err(CompileError::new(Category::Type, operand.span(), "cannot take the address of a function"));
            }
            let span = Segment::join(start, operand.span());
            let ty = Type::pointer(operand.get_type().clone());
            return Ok(ExprNode::new(span, ty, ConstCache::Runtime, ExprKind::AddressOf(Box::new(operand))));
        }
        if self.eat_punct(Punct::Star) {
            let operand = self.parse_prefix()?;
            let Some(inner) = operand.get_type().as_pointer() else {
                return Err(CompileError::new(Category::Type, operand.span(), "cannot dereference a non-pointer"));
            };
            if inner.is_none() {
                return Err(CompileError::new(Category::Type, operand.span(), "cannot dereference a '*none' pointer"));
            }
            let span = Segment::join(start, operand.span());
            let ty = inner.clone();
            return Ok(ExprNode::new(span, ty, ConstCache::Runtime, ExprKind::Dereference(Box::new(operand))));
        }
        for (punct, op) in [(Punct::Plus, PrefixOp::Plus), (Punct::Minus, PrefixOp::Minus), (Punct::Bang, PrefixOp::Not), (Punct::Tilde, PrefixOp::BitNot)] {
            if self.is_punct(punct) {
                return self.parse_prefix_op(op, start);
            }
        }
        self.parse_postfix()
    }

    fn parse_prefix_op(&mut self, op: PrefixOp, start: Segment) -> CResult<ExprNode> {
        self.pos += 1;
        // `+N` / `-N`: fuse an adjacent, not-yet-merged integer literal so
        // `i64::MIN` is representable as a single token pair.
        if matches!(op, PrefixOp::Plus | PrefixOp::Minus) {
            if let Some(TokenKind::Int { value, .. }) = self.peek_kind() {
                let value = *value;
                let int_span = self.span_here();
                self.pos += 1;
                let merged_value = if op == PrefixOp::Minus { value.wrapping_neg() } else { value };
                let span = Segment::join(start, int_span);
                return Ok(ExprNode::new(
                    span,
                    Type::Int,
                    ConstCache::Constant(ConstValue::Int(merged_value)),
                    ExprKind::IntConst { value: merged_value, merged: true },
                ));
            }
        }
        let operand = self.parse_prefix()?;
        let ty = match op {
            PrefixOp::Plus | PrefixOp::Minus => {
                if !operand.get_type().is_arithmetic() {
                    return Err(CompileError::new(Category::Type, operand.span(), "unary +/- requires an arithmetic operand"));
                }
                operand.get_type().clone()
            }
            PrefixOp::Not => {
                check_bool_operand(&operand)?;
                Type::Bool
            }
            PrefixOp::BitNot => {
                check_int_operand(&operand)?;
                Type::Int
            }
        };
        let span = Segment::join(start, operand.span());
        let konst = fold_prefix(op, &operand);
        Ok(ExprNode::new(span, ty, konst, ExprKind::Prefix { op, operand: Box::new(operand) }))
    }

    fn build_stateful(&self, op: IncDecOp, operand: ExprNode, start: Segment, prefix: bool) -> CResult<ExprNode> {
        if !is_lvalue(&operand) {
            return Err(CompileError::new(Category::Type, operand.span(), "++/-- requires an lvalue operand"));
        }
        if *operand.get_type() != Type::Int && operand.get_type().as_pointer().is_none() {
            return Err(CompileError::new(Category::Type, operand.span(), "++/-- requires an int or pointer lvalue"));
        }
        let span = Segment::join(start, operand.span());
        let ty = operand.get_type().clone();
        let kind = if prefix {
            ExprKind::StatefulPrefix { op, operand: Box::new(operand) }
        } else {
            ExprKind::StatefulPostfix { op, operand: Box::new(operand) }
        };
        Ok(ExprNode::new(span, ty, ConstCache::Runtime, kind))
    }

    fn parse_postfix(&mut self) -> CResult<ExprNode> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_punct(Punct::PlusPlus) {
                let span_end = self.span_here();
                expr = self.build_stateful(IncDecOp::Inc, expr, span_end, false)?;
            } else if self.eat_punct(Punct::MinusMinus) {
                let span_end = self.span_here();
                expr = self.build_stateful(IncDecOp::Dec, expr, span_end, false)?;
            } else if self.eat_punct(Punct::LBracket) {
                let index = self.parse_expr()?;
                let end = self.expect_punct(Punct::RBracket)?;
                let Some(inner) = expr.get_type().as_pointer() else {
                    return Err(CompileError::new(Category::Type, expr.span(), "indexing requires a pointer base"));
                };
                if *index.get_type() != Type::Int {
                    return Err(CompileError::new(Category::Type, index.span(), "index must be of type 'int'"));
                }
                let span = Segment::join(expr.span(), end);
                let ty = inner.clone();
                expr = ExprNode::new(span, ty, ConstCache::Runtime, ExprKind::Access { base: Box::new(expr), index: Box::new(index) });
            } else if self.is_keyword(Keyword::As) {
                self.pos += 1;
                let target = self.parse_type()?;
                if !can_cast(expr.get_type(), &target) {
                    return Err(CompileError::new(
                        Category::Type,
                        expr.span(),
                        format!("cannot cast a value of type '{}' to '{target}'", expr.get_type()),
                    ));
                }
                let span = expr.span();
                let konst = fold_cast(&expr, &target);
                expr = ExprNode::new(span, target.clone(), konst, ExprKind::As { operand: Box::new(expr), target });
            } else if self.is_punct(Punct::LParen) && matches!(expr.kind, ExprKind::Id(_)) {
                expr = self.parse_invoke(expr)?;
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_invoke(&mut self, callee_expr: ExprNode) -> CResult<ExprNode> {
        let ExprKind::Id(callee) = callee_expr.kind else { unreachable!("guarded by caller") };
        let Some(fty) = callee.lookup.ty.as_function().cloned() else {
            return Err(CompileError::new(Category::Type, callee_expr.span(), format!("'{}' is not callable", callee.name)));
        };
        self.expect_punct(Punct::LParen)?;
        let mut args = Vec::new();
        if !self.is_punct(Punct::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat_punct(Punct::Comma) {
                    break;
                }
            }
        }
        let end = self.expect_punct(Punct::RParen)?;
        if args.len() != fty.params.len() {
            return Err(CompileError::new(
                Category::Type,
                end,
                format!("'{}' expects {} argument(s), got {}", callee.name, fty.params.len(), args.len()),
            ));
        }
        for (param_ty, arg) in fty.params.iter().zip(args.iter()) {
            if !param_ty.assignable_from(arg.get_type()) {
                return Err(CompileError::new(
                    Category::Type,
                    arg.span(),
                    format!("argument of type '{}' is not assignable to parameter of type '{param_ty}'", arg.get_type()),
                ));
            }
        }
        if let Some((current, _)) = &self.current_fn {
            if callee.name_id == *current && callee.lookup.scope == ScopeKind::Global {
                self.saw_undeclared_self_call = true;
            }
        }
        let span = Segment::join(callee_expr.span(), end);
        let ty = fty.ret.clone();
        Ok(ExprNode::new(span, ty, ConstCache::Runtime, ExprKind::Invoke { callee, args }))
    }

    fn parse_primary(&mut self) -> CResult<ExprNode> {
        let start = self.span_here();
        match self.peek_kind().cloned() {
            Some(TokenKind::Int { value, radix }) => {
                self.pos += 1;
                // A bare decimal literal is always entered unsigned; one
                // whose magnitude only fits via the sign bit (e.g. exactly
                // `i64::MIN`'s bit pattern) is only valid fused with a
                // preceding unary `-`, handled in `parse_prefix_op` before
                // this arm is ever reached.
                if radix == IntRadix::Decimal && value < 0 {
                    return Err(CompileError::new(Category::Tokenization, start, "decimal integer literal out of range"));
                }
                Ok(ExprNode::new(start, Type::Int, ConstCache::Constant(ConstValue::Int(value)), ExprKind::IntConst { value, merged: false }))
            }
            Some(TokenKind::Float(value)) => {
                self.pos += 1;
                Ok(ExprNode::new(start, Type::Float, ConstCache::Constant(ConstValue::Float(value)), ExprKind::FloatConst(value)))
            }
            Some(TokenKind::Char(c)) => {
                self.pos += 1;
                Ok(ExprNode::new(start, Type::Int, ConstCache::Constant(ConstValue::Int(c as i64)), ExprKind::CharConst(c)))
            }
            Some(TokenKind::Keyword(Keyword::True)) => {
                self.pos += 1;
                Ok(ExprNode::new(start, Type::Bool, ConstCache::Constant(ConstValue::Bool(true)), ExprKind::BoolConst(true)))
            }
            Some(TokenKind::Keyword(Keyword::False)) => {
                self.pos += 1;
                Ok(ExprNode::new(start, Type::Bool, ConstCache::Constant(ConstValue::Bool(false)), ExprKind::BoolConst(false)))
            }
            Some(TokenKind::Keyword(Keyword::Nan)) => {
                self.pos += 1;
                Ok(ExprNode::new(start, Type::Float, ConstCache::Constant(ConstValue::Float(f64::NAN)), ExprKind::FloatConst(f64::NAN)))
            }
            Some(TokenKind::Keyword(Keyword::Inf)) => {
                self.pos += 1;
                Ok(ExprNode::new(start, Type::Float, ConstCache::Constant(ConstValue::Float(f64::INFINITY)), ExprKind::FloatConst(f64::INFINITY)))
            }
            Some(TokenKind::Keyword(Keyword::Line)) => {
                self.pos += 1;
                let line = (start.line1 + 1) as i64;
                Ok(ExprNode::new(start, Type::Int, ConstCache::Constant(ConstValue::Int(line)), ExprKind::IntConst { value: line, merged: false }))
            }
            Some(TokenKind::Keyword(Keyword::Sizeof)) => {
                self.pos += 1;
                self.expect_punct(Punct::LParen)?;
                let ty = self.parse_type()?;
                let end = self.expect_punct(Punct::RParen)?;
                let span = Segment::join(start, end);
                Ok(ExprNode::new(span, Type::Int, ConstCache::Constant(ConstValue::Int(i64::from(ty.size()))), ExprKind::Sizeof(ty)))
            }
            Some(TokenKind::Keyword(Keyword::Break)) => {
                self.pos += 1;
                if !self.locals.in_loop() {
                    return Err(CompileError::new(Category::Semantic, start, "'break' outside of a loop"));
                }
                self.locals.mark_break();
                Ok(ExprNode::new(start, Type::Never, ConstCache::Runtime, ExprKind::Break))
            }
            Some(TokenKind::Keyword(Keyword::Return)) => self.parse_return(start),
            Some(TokenKind::Keyword(Keyword::If)) => self.parse_if(start),
            Some(TokenKind::Keyword(Keyword::While)) => self.parse_while(start),
            Some(TokenKind::Keyword(Keyword::Let)) => self.parse_let(start),
            Some(TokenKind::Identifier(name)) => {
                self.pos += 1;
                if name == "_" {
                    return Ok(ExprNode::new(
                        start,
                        Type::None,
                        ConstCache::Runtime,
                        ExprKind::Id(IdRef { name_id: self.interner.intern("_"), name: Rc::from("_"), lookup: Lookup { ty: Type::None, index: 0, scope: ScopeKind::None } }),
                    ));
                }
                let id = self.resolve_identifier(&name, start)?;
                Ok(ExprNode::new(start, id.lookup.ty.clone(), ConstCache::Runtime, ExprKind::Id(id)))
            }
            Some(TokenKind::Punct(Punct::LParen)) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect_punct(Punct::RParen)?;
                Ok(inner)
            }
            Some(TokenKind::Punct(Punct::LBrace)) => self.parse_clause(),
            _ => Err(self.error_here("expected an expression")),
        }
    }

    fn parse_return(&mut self, start: Segment) -> CResult<ExprNode> {
        self.pos += 1;
        if self.current_fn.is_none() {
            return Err(CompileError::new(Category::Semantic, start, "'return' outside of a function"));
        }
        let can_have_value = !matches!(self.peek_kind(), Some(TokenKind::Linebreak) | Some(TokenKind::Punct(Punct::RBrace)) | None);
        let value = if can_have_value { Some(Box::new(self.parse_expr()?)) } else { None };
        let span = value.as_ref().map_or(start, |v| Segment::join(start, v.span()));
        let payload_ty = value.as_ref().map_or(Type::None, |v| v.get_type().clone());
        if let Some((_, returns)) = &mut self.current_fn {
            returns.push((payload_ty, span));
        }
        Ok(ExprNode::new(span, Type::Never, ConstCache::Runtime, ExprKind::Return(value)))
    }

    fn parse_if(&mut self, start: Segment) -> CResult<ExprNode> {
        self.pos += 1;
        let cond = self.parse_expr()?;
        if !cond.get_type().is_never() && *cond.get_type() != Type::Bool {
            return Err(CompileError::new(Category::Type, cond.span(), "'if' condition must be of type 'bool'"));
        }
        let then_branch = self.parse_clause()?;
        let else_branch = if self.eat_keyword(Keyword::Else) {
            if self.is_keyword(Keyword::If) {
                let inner_start = self.span_here();
                Some(Box::new(self.parse_if(inner_start)?))
            } else {
                Some(Box::new(self.parse_clause()?))
            }
        } else {
            None
        };
        let span = else_branch.as_ref().map_or_else(|| Segment::join(start, then_branch.span()), |e| Segment::join(start, e.span()));
        let ty = if cond.get_type().is_never() {
            Type::Never
        } else {
            match &else_branch {
                Some(e) => then_branch.get_type().merge(e.get_type()).ok_or_else(|| {
                    CompileError::new(Category::Type, span, "type mismatch on both operands")
                        .with_note(Note::new("type of the 'if' branch", then_branch.span()))
                        .with_note(Note::new("type of the 'else' branch", e.span()))
                })?,
                None => Type::None,
            }
        };
        let konst = match cond.eval_const() {
            Some(ConstValue::Bool(true)) => then_branch.eval_const().map_or(ConstCache::Runtime, ConstCache::Constant),
            Some(ConstValue::Bool(false)) => match &else_branch {
                Some(e) => e.eval_const().map_or(ConstCache::Runtime, ConstCache::Constant),
                None => ConstCache::Runtime,
            },
            _ => ConstCache::Runtime,
        };
        Ok(ExprNode::new(
            span,
            ty,
            konst,
            ExprKind::IfElse { cond: Box::new(cond), then_branch: Box::new(then_branch), else_branch },
        ))
    }

    fn parse_while(&mut self, start: Segment) -> CResult<ExprNode> {
        self.pos += 1;
        let cond = self.parse_expr()?;
        if !cond.get_type().is_never() && *cond.get_type() != Type::Bool {
            return Err(CompileError::new(Category::Type, cond.span(), "'while' condition must be of type 'bool'"));
        }
        self.locals.enter_loop();
        let body = self.parse_clause()?;
        let broke = self.locals.exit_loop();
        let span = Segment::join(start, body.span());
        let ty = if cond.get_type().is_never() {
            Type::Never
        } else if matches!(cond.eval_const(), Some(ConstValue::Bool(true))) && !broke {
            Type::Never
        } else {
            Type::None
        };
        Ok(ExprNode::new(span, ty, ConstCache::Runtime, ExprKind::While { cond: Box::new(cond), body: Box::new(body) }))
    }

    fn parse_let(&mut self, start: Segment) -> CResult<ExprNode> {
        self.pos += 1;
        let (name, _) = self.expect_identifier()?;
        self.expect_punct(Punct::Assign)?;
        let init = self.parse_expr()?;
        let is_wildcard = name == "_";
        let name_id = self.interner.intern(&name);
        let slot = self.locals.declare(name_id, is_wildcard, init.get_type().clone());
        let span = Segment::join(start, init.span());
        Ok(ExprNode::new(span, Type::None, ConstCache::Runtime, ExprKind::Let { name: name_id, slot, init: Box::new(init) }))
    }

    fn resolve_identifier(&mut self, name: &str, span: Segment) -> CResult<IdRef> {
        let name_id = self.interner.intern(name);
        let lookup = self.locals.lookup(name_id).or_else(|| self.globals.lookup(name_id));
        let Some(lookup) = lookup else {
            return Err(CompileError::new(Category::Semantic, span, format!("undeclared name '{name}'")));
        };
        Ok(IdRef { name_id, name: Rc::from(name), lookup })
    }
}

// ---- free-standing semantic helpers ------------------------------------

fn is_lvalue(expr: &ExprNode) -> bool {
    match &expr.kind {
        ExprKind::Id(id) => id.lookup.scope != ScopeKind::None && id.lookup.ty.as_function().is_none(),
        ExprKind::Dereference(_) | ExprKind::Access { .. } => true,
        _ => false,
    }
}

fn check_bool_operand(expr: &ExprNode) -> CResult<()> {
    if *expr.get_type() != Type::Bool {
        return Err(CompileError::new(Category::Type, expr.span(), "expected an operand of type 'bool'"));
    }
    Ok(())
}

fn check_int_operand(expr: &ExprNode) -> CResult<()> {
    if *expr.get_type() != Type::Int {
        return Err(CompileError::new(Category::Type, expr.span(), "expected an operand of type 'int'"));
    }
    Ok(())
}

fn can_cast(from: &Type, to: &Type) -> bool {
    if to.is_none() {
        return true;
    }
    if from.is_arithmetic() && to.is_arithmetic() {
        return true;
    }
    if from.as_pointer().is_some() && to.as_pointer().is_some() {
        return true; // pointer-to-pointer is a representation no-op
    }
    if (from.as_pointer().is_some() && *to == Type::Int) || (*from == Type::Int && to.as_pointer().is_some()) {
        return true;
    }
    to.assignable_from(from)
}

fn infix_result_type(op: InfixOp, lhs: &Type, rhs: &Type, span: Segment) -> CResult<Type> {
    use InfixOp::*;
    match op {
        Add | Sub => {
            if lhs.is_arithmetic() && rhs.is_arithmetic() && lhs == rhs {
                return Ok(lhs.clone());
            }
            if let Some(inner) = lhs.as_pointer() {
                if *rhs == Type::Int && !inner.is_none() {
                    return Ok(lhs.clone());
                }
                if op == Sub {
                    if let Some(rinner) = rhs.as_pointer() {
                        if inner == rinner && !inner.is_none() {
                            return Ok(Type::Int);
                        }
                    }
                }
            }
            if op == Add && *lhs == Type::Int {
                if let Some(inner) = rhs.as_pointer() {
                    if !inner.is_none() {
                        return Ok(rhs.clone());
                    }
                }
            }
            Err(CompileError::new(Category::Type, span, format!("operator does not accept operands of type '{lhs}' and '{rhs}'")))
        }
        Mul | Div | Rem => {
            if lhs.is_arithmetic() && lhs == rhs {
                Ok(lhs.clone())
            } else {
                Err(CompileError::new(Category::Type, span, "arithmetic operator requires two operands of the same arithmetic type"))
            }
        }
        BitAnd | BitXor | BitOr | Shl | Shr | UShr => {
            if *lhs == Type::Int && *rhs == Type::Int {
                Ok(Type::Int)
            } else {
                Err(CompileError::new(Category::Type, span, "bitwise/shift operator requires two 'int' operands"))
            }
        }
    }
}

fn fold_infix(op: InfixOp, lhs: &ExprNode, rhs: &ExprNode) -> ConstCache {
    use InfixOp::*;
    match (lhs.eval_const(), rhs.eval_const()) {
        (Some(ConstValue::Int(a)), Some(ConstValue::Int(b))) => {
            let result = match op {
                Add => a.wrapping_add(b),
                Sub => a.wrapping_sub(b),
                Mul => a.wrapping_mul(b),
                Div => {
                    if b == 0 {
                        return ConstCache::Runtime;
                    }
                    a.wrapping_div(b)
                }
                Rem => {
                    if b == 0 {
                        return ConstCache::Runtime;
                    }
                    a.wrapping_rem(b)
                }
                BitAnd => a & b,
                BitXor => a ^ b,
                BitOr => a | b,
                Shl => a.wrapping_shl(b as u32),
                Shr => a.wrapping_shr(b as u32),
                UShr => ((a as u64) >> (b as u32)) as i64,
            };
            ConstCache::Constant(ConstValue::Int(result))
        }
        (Some(ConstValue::Float(a)), Some(ConstValue::Float(b))) => {
            let result = match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => a / b,
                Rem => a % b,
                _ => return ConstCache::Runtime,
            };
            ConstCache::Constant(ConstValue::Float(result))
        }
        _ => ConstCache::Runtime,
    }
}

fn fold_compare(op: CompareOp, lhs: &ExprNode, rhs: &ExprNode) -> ConstCache {
    use CompareOp::*;
    fn cmp<T: PartialOrd>(op: CompareOp, a: T, b: T) -> bool {
        match op {
            Eq => a == b,
            Ne => a != b,
            Lt => a < b,
            Le => a <= b,
            Gt => a > b,
            Ge => a >= b,
        }
    }
    match (lhs.eval_const(), rhs.eval_const()) {
        (Some(ConstValue::Int(a)), Some(ConstValue::Int(b))) => ConstCache::Constant(ConstValue::Bool(cmp(op, a, b))),
        (Some(ConstValue::Float(a)), Some(ConstValue::Float(b))) => ConstCache::Constant(ConstValue::Bool(cmp(op, a, b))),
        (Some(ConstValue::Bool(a)), Some(ConstValue::Bool(b))) if matches!(op, Eq | Ne) => ConstCache::Constant(ConstValue::Bool(cmp(op, a, b))),
        _ => ConstCache::Runtime,
    }
}

fn fold_prefix(op: PrefixOp, operand: &ExprNode) -> ConstCache {
    match (op, operand.eval_const()) {
        (PrefixOp::Plus, Some(v)) => ConstCache::Constant(v),
        (PrefixOp::Minus, Some(ConstValue::Int(v))) => ConstCache::Constant(ConstValue::Int(v.wrapping_neg())),
        (PrefixOp::Minus, Some(ConstValue::Float(v))) => ConstCache::Constant(ConstValue::Float(-v)),
        (PrefixOp::Not, Some(ConstValue::Bool(v))) => ConstCache::Constant(ConstValue::Bool(!v)),
        (PrefixOp::BitNot, Some(ConstValue::Int(v))) => ConstCache::Constant(ConstValue::Int(!v)),
        _ => ConstCache::Runtime,
    }
}

fn fold_cast(expr: &ExprNode, target: &Type) -> ConstCache {
    match (expr.eval_const(), target) {
        (Some(ConstValue::Int(v)), Type::Float) => ConstCache::Constant(ConstValue::Float(v as f64)),
        (Some(ConstValue::Float(v)), Type::Int) => ConstCache::Constant(ConstValue::Int(v as i64)),
        (Some(v), Type::Int | Type::Float | Type::Bool) => ConstCache::Constant(v),
        _ => ConstCache::Runtime,
    }
}
