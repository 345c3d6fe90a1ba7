//! Lexer and recursive-descent parser for the C subset.
//!
//! The parser produces a fully resolved [`Program`]: every identifier is
//! bound to a `DeclId` through a lexical scope stack (file scope,
//! parameters, one scope per block), and every expression carries its
//! structural type. The input is assumed well-typed; typing here exists to
//! drive evaluation (pointer scaling, load widths), not to diagnose.
//!
//! `#` introduces a line comment; there is no preprocessor.

use std::fmt;

use ahash::AHashMap;

use crate::error::{ParseError, ParseErrorKind};
use crate::expressions::{
    ArrayLen, BinaryOp, DeclId, DeclInfo, DeclKind, Expr, ExprKind, Function, GlobalVar, NodeId,
    Program, Stmt, StmtKind, Ty, UnaryOp, VarInit,
};
use crate::intern::{Interns, StringId};

type ParseResult<T> = Result<T, ParseError>;

/// Parses one translation unit.
pub fn parse(source: &str, file: &str) -> ParseResult<Program> {
    let tokens = lex(source, file)?;
    let parser = Parser {
        file,
        tokens,
        pos: 0,
        interns: Interns::default(),
        decls: Vec::new(),
        functions: AHashMap::new(),
        globals: Vec::new(),
        scopes: vec![AHashMap::new()],
        next_node: 0,
    };
    parser.translation_unit()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok<'s> {
    Ident(&'s str),
    Int(i64),
    Char(i64),
    KwInt,
    KwChar,
    KwVoid,
    KwIf,
    KwElse,
    KwWhile,
    KwFor,
    KwReturn,
    KwSizeof,
    KwExtern,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Semi,
    Comma,
    Star,
    Plus,
    Minus,
    Slash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Eof,
}

impl fmt::Display for Tok<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "`{name}`"),
            Self::Int(value) => write!(f, "`{value}`"),
            Self::Char(_) => write!(f, "character literal"),
            Self::KwInt => write!(f, "`int`"),
            Self::KwChar => write!(f, "`char`"),
            Self::KwVoid => write!(f, "`void`"),
            Self::KwIf => write!(f, "`if`"),
            Self::KwElse => write!(f, "`else`"),
            Self::KwWhile => write!(f, "`while`"),
            Self::KwFor => write!(f, "`for`"),
            Self::KwReturn => write!(f, "`return`"),
            Self::KwSizeof => write!(f, "`sizeof`"),
            Self::KwExtern => write!(f, "`extern`"),
            Self::LParen => write!(f, "`(`"),
            Self::RParen => write!(f, "`)`"),
            Self::LBracket => write!(f, "`[`"),
            Self::RBracket => write!(f, "`]`"),
            Self::LBrace => write!(f, "`{{`"),
            Self::RBrace => write!(f, "`}}`"),
            Self::Semi => write!(f, "`;`"),
            Self::Comma => write!(f, "`,`"),
            Self::Star => write!(f, "`*`"),
            Self::Plus => write!(f, "`+`"),
            Self::Minus => write!(f, "`-`"),
            Self::Slash => write!(f, "`/`"),
            Self::Percent => write!(f, "`%`"),
            Self::Assign => write!(f, "`=`"),
            Self::EqEq => write!(f, "`==`"),
            Self::NotEq => write!(f, "`!=`"),
            Self::Lt => write!(f, "`<`"),
            Self::Gt => write!(f, "`>`"),
            Self::Le => write!(f, "`<=`"),
            Self::Ge => write!(f, "`>=`"),
            Self::Eof => write!(f, "end of file"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Token<'s> {
    tok: Tok<'s>,
    line: u32,
}

fn lex<'s>(source: &'s str, file: &str) -> ParseResult<Vec<Token<'s>>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut line: u32 = 1;
    let mut i = 0;
    let err = |line: u32, kind: ParseErrorKind| ParseError {
        file: file.to_owned(),
        line,
        kind,
    };
    macro_rules! push {
        ($tok:expr, $len:expr) => {{
            tokens.push(Token { tok: $tok, line });
            i += $len;
        }};
    }
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                line += 1;
                i += 1;
            }
            b' ' | b'\t' | b'\r' => i += 1,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'#' => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = line;
                i += 2;
                loop {
                    if i + 1 >= bytes.len() {
                        return Err(err(start, ParseErrorKind::UnterminatedComment));
                    }
                    if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                        i += 2;
                        break;
                    }
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    i += 1;
                }
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let word = &source[start..i];
                let tok = match word {
                    "int" => Tok::KwInt,
                    "char" => Tok::KwChar,
                    "void" => Tok::KwVoid,
                    "if" => Tok::KwIf,
                    "else" => Tok::KwElse,
                    "while" => Tok::KwWhile,
                    "for" => Tok::KwFor,
                    "return" => Tok::KwReturn,
                    "sizeof" => Tok::KwSizeof,
                    "extern" => Tok::KwExtern,
                    _ => Tok::Ident(word),
                };
                tokens.push(Token { tok, line });
            }
            b'0'..=b'9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let value = source[start..i]
                    .parse::<i64>()
                    .map_err(|_| err(line, ParseErrorKind::IntOutOfRange))?;
                tokens.push(Token {
                    tok: Tok::Int(value),
                    line,
                });
            }
            b'\'' => {
                let value = match bytes.get(i + 1) {
                    None | Some(b'\n') | Some(b'\'') => {
                        return Err(err(line, ParseErrorKind::UnterminatedChar))
                    }
                    Some(b'\\') => {
                        let escaped = match bytes.get(i + 2) {
                            Some(b'n') => b'\n',
                            Some(b't') => b'\t',
                            Some(b'r') => b'\r',
                            Some(b'0') => 0,
                            Some(b'\\') => b'\\',
                            Some(b'\'') => b'\'',
                            Some(b'"') => b'"',
                            Some(&other) => {
                                return Err(err(line, ParseErrorKind::BadEscape(other as char)))
                            }
                            None => return Err(err(line, ParseErrorKind::UnterminatedChar)),
                        };
                        i += 1;
                        escaped
                    }
                    Some(&ch) => ch,
                };
                if bytes.get(i + 2) != Some(&b'\'') {
                    return Err(err(line, ParseErrorKind::UnterminatedChar));
                }
                tokens.push(Token {
                    tok: Tok::Char(i64::from(value)),
                    line,
                });
                i += 3;
            }
            b'(' => push!(Tok::LParen, 1),
            b')' => push!(Tok::RParen, 1),
            b'[' => push!(Tok::LBracket, 1),
            b']' => push!(Tok::RBracket, 1),
            b'{' => push!(Tok::LBrace, 1),
            b'}' => push!(Tok::RBrace, 1),
            b';' => push!(Tok::Semi, 1),
            b',' => push!(Tok::Comma, 1),
            b'*' => push!(Tok::Star, 1),
            b'+' => push!(Tok::Plus, 1),
            b'-' => push!(Tok::Minus, 1),
            b'/' => push!(Tok::Slash, 1),
            b'%' => push!(Tok::Percent, 1),
            b'=' if bytes.get(i + 1) == Some(&b'=') => push!(Tok::EqEq, 2),
            b'=' => push!(Tok::Assign, 1),
            b'!' if bytes.get(i + 1) == Some(&b'=') => push!(Tok::NotEq, 2),
            b'<' if bytes.get(i + 1) == Some(&b'=') => push!(Tok::Le, 2),
            b'<' => push!(Tok::Lt, 1),
            b'>' if bytes.get(i + 1) == Some(&b'=') => push!(Tok::Ge, 2),
            b'>' => push!(Tok::Gt, 1),
            other => return Err(err(line, ParseErrorKind::UnexpectedChar(other as char))),
        }
    }
    tokens.push(Token {
        tok: Tok::Eof,
        line,
    });
    Ok(tokens)
}

#[derive(Debug)]
struct Parser<'s> {
    file: &'s str,
    tokens: Vec<Token<'s>>,
    pos: usize,
    interns: Interns,
    decls: Vec<DeclInfo>,
    functions: AHashMap<DeclId, Function>,
    globals: Vec<GlobalVar>,
    scopes: Vec<AHashMap<StringId, DeclId>>,
    next_node: usize,
}

impl<'s> Parser<'s> {
    fn translation_unit(mut self) -> ParseResult<Program> {
        while self.peek() != Tok::Eof {
            self.top_level_item()?;
        }
        Ok(Program {
            decls: self.decls,
            functions: self.functions,
            globals: self.globals,
            interns: self.interns,
        })
    }

    fn top_level_item(&mut self) -> ParseResult<()> {
        // `extern` carries no meaning for the evaluator
        self.eat(Tok::KwExtern);
        let base = self.base_type()?;
        let ty = self.pointer_suffix(base.clone());
        let name = self.ident()?;
        if self.peek() == Tok::LParen {
            self.function_item(ty, name)
        } else {
            self.global_vars(&base, ty, name)
        }
    }

    fn function_item(&mut self, ret: Ty, name: &'s str) -> ParseResult<()> {
        let decl = self.declare_func(name, ret);
        self.expect(Tok::LParen, "`(`")?;
        let params = self.param_list()?;
        self.expect(Tok::RParen, "`)`")?;
        if self.eat(Tok::Semi) {
            // prototype; intrinsics arrive this way
            return Ok(());
        }
        self.scopes.push(AHashMap::new());
        let mut param_ids = Vec::with_capacity(params.len());
        for (ty, name, line) in params {
            let Some(name) = name else {
                return Err(self.error_at(line, ParseErrorKind::UnnamedParameter));
            };
            param_ids.push(self.declare(name, ty, DeclKind::Param));
        }
        let body = self.compound()?;
        self.scopes.pop();
        self.functions.insert(
            decl,
            Function {
                decl,
                params: param_ids,
                body,
            },
        );
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn param_list(&mut self) -> ParseResult<Vec<(Ty, Option<&'s str>, u32)>> {
        let mut params = Vec::new();
        if self.peek() == Tok::RParen {
            return Ok(params);
        }
        if self.peek() == Tok::KwVoid && self.peek_ahead(1) == Tok::RParen {
            self.bump();
            return Ok(params);
        }
        loop {
            let base = self.base_type()?;
            let ty = self.pointer_suffix(base);
            let line = self.line();
            let name = match self.peek() {
                Tok::Ident(name) => {
                    self.bump();
                    Some(name)
                }
                _ => None,
            };
            params.push((ty, name, line));
            if !self.eat(Tok::Comma) {
                return Ok(params);
            }
        }
    }

    fn global_vars(&mut self, base: &Ty, first_ty: Ty, first_name: &'s str) -> ParseResult<()> {
        let mut ty = first_ty;
        let mut name = first_name;
        loop {
            let full_ty = self.global_array_suffix(ty)?;
            let init = if self.eat(Tok::Assign) {
                Some(self.literal_init()?)
            } else {
                None
            };
            let decl = self.declare(name, full_ty, DeclKind::Var);
            self.globals.push(GlobalVar { decl, init });
            if !self.eat(Tok::Comma) {
                break;
            }
            ty = self.pointer_suffix(base.clone());
            name = self.ident()?;
        }
        self.expect(Tok::Semi, "`;`")
    }

    /// File-scope arrays must have a literal length.
    fn global_array_suffix(&mut self, ty: Ty) -> ParseResult<Ty> {
        if !self.eat(Tok::LBracket) {
            return Ok(ty);
        }
        let Tok::Int(len) = self.peek() else {
            return Err(self.error(ParseErrorKind::FileScopeVla));
        };
        self.bump();
        self.expect(Tok::RBracket, "`]`")?;
        Ok(Ty::Array(Box::new(ty), ArrayLen::Fixed(len)))
    }

    /// A file-scope initialiser is a literal, optionally negated.
    fn literal_init(&mut self) -> ParseResult<i64> {
        match self.peek() {
            Tok::Int(value) => {
                self.bump();
                Ok(value)
            }
            Tok::Char(value) => {
                self.bump();
                Ok(value)
            }
            Tok::Minus => {
                self.bump();
                let Tok::Int(value) = self.peek() else {
                    return Err(self.error(ParseErrorKind::BadGlobalInit));
                };
                self.bump();
                Ok(value.wrapping_neg())
            }
            _ => Err(self.error(ParseErrorKind::BadGlobalInit)),
        }
    }

    fn compound(&mut self) -> ParseResult<Stmt> {
        self.expect(Tok::LBrace, "`{`")?;
        self.scopes.push(AHashMap::new());
        let mut stmts = Vec::new();
        loop {
            if self.eat(Tok::RBrace) {
                break;
            }
            if self.peek() == Tok::Eof {
                return Err(self.expected("`}`"));
            }
            stmts.push(self.statement()?);
        }
        self.scopes.pop();
        Ok(self.stmt(StmtKind::Compound(stmts)))
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        match self.peek() {
            Tok::LBrace => self.compound(),
            Tok::KwInt | Tok::KwChar | Tok::KwVoid => self.declaration(),
            Tok::KwIf => {
                self.bump();
                self.expect(Tok::LParen, "`(`")?;
                let cond = self.expression()?;
                self.expect(Tok::RParen, "`)`")?;
                let then_branch = Box::new(self.statement()?);
                let else_branch = if self.eat(Tok::KwElse) {
                    Some(Box::new(self.statement()?))
                } else {
                    None
                };
                Ok(self.stmt(StmtKind::If {
                    cond,
                    then_branch,
                    else_branch,
                }))
            }
            Tok::KwWhile => {
                self.bump();
                self.expect(Tok::LParen, "`(`")?;
                let cond = self.expression()?;
                self.expect(Tok::RParen, "`)`")?;
                let body = Box::new(self.statement()?);
                Ok(self.stmt(StmtKind::While { cond, body }))
            }
            Tok::KwFor => {
                self.bump();
                self.expect(Tok::LParen, "`(`")?;
                let init = self.opt_expression(Tok::Semi)?;
                self.expect(Tok::Semi, "`;`")?;
                let cond = self.opt_expression(Tok::Semi)?;
                self.expect(Tok::Semi, "`;`")?;
                let step = self.opt_expression(Tok::RParen)?;
                self.expect(Tok::RParen, "`)`")?;
                let body = Box::new(self.statement()?);
                Ok(self.stmt(StmtKind::For {
                    init,
                    cond,
                    step,
                    body,
                }))
            }
            Tok::KwReturn => {
                self.bump();
                let expr = self.opt_expression(Tok::Semi)?;
                self.expect(Tok::Semi, "`;`")?;
                Ok(self.stmt(StmtKind::Return(expr)))
            }
            Tok::Semi => {
                self.bump();
                Ok(self.stmt(StmtKind::Empty))
            }
            _ => {
                let expr = self.expression()?;
                self.expect(Tok::Semi, "`;`")?;
                Ok(self.stmt(StmtKind::Expr(expr)))
            }
        }
    }

    fn declaration(&mut self) -> ParseResult<Stmt> {
        let base = self.base_type()?;
        let mut vars = Vec::new();
        loop {
            let ty = self.pointer_suffix(base.clone());
            let name = self.ident()?;
            let ty = self.local_array_suffix(ty)?;
            let init = if self.eat(Tok::Assign) {
                Some(self.assignment_expr()?)
            } else {
                None
            };
            let decl = self.declare(name, ty, DeclKind::Var);
            vars.push(VarInit { decl, init });
            if !self.eat(Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::Semi, "`;`")?;
        Ok(self.stmt(StmtKind::Declare(vars)))
    }

    /// Block-scope arrays: a literal length is fixed, anything else is a
    /// variable-length array evaluated at declaration time.
    fn local_array_suffix(&mut self, ty: Ty) -> ParseResult<Ty> {
        if !self.eat(Tok::LBracket) {
            return Ok(ty);
        }
        let len_expr = self.expression()?;
        self.expect(Tok::RBracket, "`]`")?;
        let len = match len_expr.kind {
            ExprKind::Literal(len) => ArrayLen::Fixed(len),
            _ => ArrayLen::Dynamic(Box::new(len_expr)),
        };
        Ok(Ty::Array(Box::new(ty), len))
    }

    fn opt_expression(&mut self, terminator: Tok<'s>) -> ParseResult<Option<Expr>> {
        if self.peek() == terminator {
            Ok(None)
        } else {
            Ok(Some(self.expression()?))
        }
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        self.assignment_expr()
    }

    fn assignment_expr(&mut self) -> ParseResult<Expr> {
        let left = self.equality_expr()?;
        if !self.eat(Tok::Assign) {
            return Ok(left);
        }
        self.check_assign_target(&left)?;
        let right = self.assignment_expr()?;
        let ty = left.ty.clone();
        Ok(self.expr(
            ty,
            ExprKind::Binary {
                op: BinaryOp::Assign,
                left: Box::new(left),
                right: Box::new(right),
            },
        ))
    }

    fn check_assign_target(&self, expr: &Expr) -> ParseResult<()> {
        match &expr.unparenthesized().kind {
            ExprKind::Name(_)
            | ExprKind::Subscript { .. }
            | ExprKind::Unary {
                op: UnaryOp::Deref,
                ..
            } => Ok(()),
            _ => Err(self.error(ParseErrorKind::InvalidAssignTarget)),
        }
    }

    fn equality_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.relational_expr()?;
        loop {
            let op = match self.peek() {
                Tok::EqEq => BinaryOp::Eq,
                Tok::NotEq => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.relational_expr()?;
            left = self.binary(op, left, right, Ty::Int);
        }
    }

    fn relational_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.additive_expr()?;
        loop {
            let op = match self.peek() {
                Tok::Lt => BinaryOp::Lt,
                Tok::Gt => BinaryOp::Gt,
                Tok::Le => BinaryOp::Le,
                Tok::Ge => BinaryOp::Ge,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.additive_expr()?;
            left = self.binary(op, left, right, Ty::Int);
        }
    }

    fn additive_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.multiplicative_expr()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinaryOp::Add,
                Tok::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.multiplicative_expr()?;
            let ty = additive_ty(&left.ty, &right.ty);
            left = self.binary(op, left, right, ty);
        }
    }

    fn multiplicative_expr(&mut self) -> ParseResult<Expr> {
        let mut left = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinaryOp::Mul,
                Tok::Slash => BinaryOp::Div,
                Tok::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.bump();
            let right = self.unary_expr()?;
            left = self.binary(op, left, right, Ty::Int);
        }
    }

    fn unary_expr(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Tok::Minus => {
                self.bump();
                let operand = self.unary_expr()?;
                Ok(self.expr(
                    Ty::Int,
                    ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                ))
            }
            Tok::Star => {
                self.bump();
                let operand = self.unary_expr()?;
                let ty = operand.ty.pointee().cloned().unwrap_or(Ty::Int);
                Ok(self.expr(
                    ty,
                    ExprKind::Unary {
                        op: UnaryOp::Deref,
                        operand: Box::new(operand),
                    },
                ))
            }
            Tok::LParen if is_type_token(self.peek_ahead(1)) => {
                self.bump();
                let base = self.base_type()?;
                let ty = self.pointer_suffix(base);
                self.expect(Tok::RParen, "`)`")?;
                let operand = self.unary_expr()?;
                Ok(self.expr(ty, ExprKind::Cast(Box::new(operand))))
            }
            _ => self.postfix_expr(),
        }
    }

    fn postfix_expr(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary_expr()?;
        loop {
            if self.eat(Tok::LBracket) {
                let index = self.expression()?;
                self.expect(Tok::RBracket, "`]`")?;
                let ty = expr.ty.pointee().cloned().unwrap_or(Ty::Int);
                expr = self.expr(
                    ty,
                    ExprKind::Subscript {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                );
            } else if self.peek() == Tok::LParen {
                let ExprKind::Name(callee) = expr.kind else {
                    return Err(self.error(ParseErrorKind::CallTarget));
                };
                self.bump();
                let mut args = Vec::new();
                if self.peek() != Tok::RParen {
                    loop {
                        args.push(self.assignment_expr()?);
                        if !self.eat(Tok::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Tok::RParen, "`)`")?;
                let ty = self.decls[callee.index()].ty.clone();
                expr = self.expr(ty, ExprKind::Call { callee, args });
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary_expr(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Tok::Int(value) => {
                self.bump();
                Ok(self.expr(Ty::Int, ExprKind::Literal(value)))
            }
            Tok::Char(value) => {
                self.bump();
                Ok(self.expr(Ty::Char, ExprKind::Literal(value)))
            }
            Tok::Ident(name) => {
                self.bump();
                let decl = self.resolve(name)?;
                let ty = self.decls[decl.index()].ty.clone();
                Ok(self.expr(ty, ExprKind::Name(decl)))
            }
            Tok::LParen => {
                self.bump();
                let inner = self.expression()?;
                self.expect(Tok::RParen, "`)`")?;
                let ty = inner.ty.clone();
                Ok(self.expr(ty, ExprKind::Paren(Box::new(inner))))
            }
            Tok::KwSizeof => {
                self.bump();
                self.expect(Tok::LParen, "`(`")?;
                let ty = if is_type_token(self.peek()) {
                    let base = self.base_type()?;
                    self.pointer_suffix(base)
                } else {
                    // expression operand: sizeof sees the undecayed type,
                    // so a named array reports its full extent
                    self.expression()?.ty
                };
                self.expect(Tok::RParen, "`)`")?;
                Ok(self.expr(Ty::Int, ExprKind::SizeOf(ty)))
            }
            _ => Err(self.expected("an expression")),
        }
    }

    fn base_type(&mut self) -> ParseResult<Ty> {
        let ty = match self.peek() {
            Tok::KwInt => Ty::Int,
            Tok::KwChar => Ty::Char,
            Tok::KwVoid => Ty::Void,
            _ => return Err(self.expected("a type")),
        };
        self.bump();
        Ok(ty)
    }

    fn pointer_suffix(&mut self, mut ty: Ty) -> Ty {
        while self.eat(Tok::Star) {
            ty = Ty::Ptr(Box::new(ty));
        }
        ty
    }

    fn declare(&mut self, name: &str, ty: Ty, kind: DeclKind) -> DeclId {
        let name = self.interns.intern(name);
        let id = DeclId::new(self.decls.len());
        self.decls.push(DeclInfo { name, ty, kind });
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name, id);
        id
    }

    /// Functions keep one decl across prototype and definition so call
    /// sites resolved early still reach the body.
    fn declare_func(&mut self, name: &'s str, ret: Ty) -> DeclId {
        let name_id = self.interns.intern(name);
        if let Some(&existing) = self.scopes[0].get(&name_id) {
            if self.decls[existing.index()].kind == DeclKind::Func {
                return existing;
            }
        }
        self.declare(name, ret, DeclKind::Func)
    }

    fn resolve(&mut self, name: &str) -> ParseResult<DeclId> {
        let name_id = self.interns.intern(name);
        for scope in self.scopes.iter().rev() {
            if let Some(&decl) = scope.get(&name_id) {
                return Ok(decl);
            }
        }
        Err(self.error(ParseErrorKind::UnknownName(name.to_owned())))
    }

    fn expr(&mut self, ty: Ty, kind: ExprKind) -> Expr {
        Expr {
            id: self.node_id(),
            ty,
            kind,
        }
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr, ty: Ty) -> Expr {
        self.expr(
            ty,
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    fn stmt(&mut self, kind: StmtKind) -> Stmt {
        Stmt {
            id: self.node_id(),
            kind,
        }
    }

    fn node_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_node);
        self.next_node += 1;
        id
    }

    fn ident(&mut self) -> ParseResult<&'s str> {
        match self.peek() {
            Tok::Ident(name) => {
                self.bump();
                Ok(name)
            }
            _ => Err(self.expected("an identifier")),
        }
    }

    fn peek(&self) -> Tok<'s> {
        self.tokens[self.pos].tok
    }

    fn peek_ahead(&self, offset: usize) -> Tok<'s> {
        let at = (self.pos + offset).min(self.tokens.len() - 1);
        self.tokens[at].tok
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn bump(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn eat(&mut self, tok: Tok<'s>) -> bool {
        if self.peek() == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok<'s>, expected: &'static str) -> ParseResult<()> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.expected(expected))
        }
    }

    fn expected(&self, expected: &'static str) -> ParseError {
        self.error(ParseErrorKind::Expected {
            expected,
            found: self.peek().to_string(),
        })
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        self.error_at(self.line(), kind)
    }

    fn error_at(&self, line: u32, kind: ParseErrorKind) -> ParseError {
        ParseError {
            file: self.file.to_owned(),
            line,
            kind,
        }
    }
}

fn is_type_token(tok: Tok<'_>) -> bool {
    matches!(tok, Tok::KwInt | Tok::KwChar | Tok::KwVoid)
}

/// `ptr + int` (either order) stays a pointer, arrays decaying to pointers
/// to their element; everything else is an int.
fn additive_ty(left: &Ty, right: &Ty) -> Ty {
    if left.pointee().is_some() {
        decay(left)
    } else if right.pointee().is_some() {
        decay(right)
    } else {
        Ty::Int
    }
}

fn decay(ty: &Ty) -> Ty {
    match ty {
        Ty::Array(elem, _) => Ty::Ptr(elem.clone()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse(source, "test.c").expect("program should parse")
    }

    #[test]
    fn resolves_functions_and_globals() {
        let program = parse_ok(
            "extern int GET();
             int counter = 3;
             int main() { counter = counter + 1; return counter; }",
        );
        assert_eq!(program.globals.len(), 1);
        assert_eq!(program.globals[0].init, Some(3));
        assert_eq!(program.functions.len(), 1);
        let main = program.functions.values().next().unwrap();
        assert_eq!(program.decl_name(main.decl), "main");
    }

    #[test]
    fn prototype_and_definition_share_a_decl() {
        let program = parse_ok(
            "int twice(int n);
             int main() { return twice(4); }
             int twice(int n) { return n + n; }",
        );
        // the early call site must reach the later body
        let twice = program
            .functions
            .values()
            .find(|f| program.decl_name(f.decl) == "twice")
            .unwrap();
        assert_eq!(twice.params.len(), 1);
    }

    #[test]
    fn pointer_addition_keeps_the_pointer_type() {
        let program = parse_ok("int main() { int* p; p = p + 2; return 0; }");
        let main = program.functions.values().next().unwrap();
        let StmtKind::Compound(stmts) = &main.body.kind else {
            panic!("function body is a compound");
        };
        let StmtKind::Expr(assign) = &stmts[1].kind else {
            panic!("second statement is the assignment");
        };
        let ExprKind::Binary { right, .. } = &assign.kind else {
            panic!("assignment expression");
        };
        assert_eq!(right.ty, Ty::Ptr(Box::new(Ty::Int)));
    }

    #[test]
    fn array_lengths_split_fixed_and_dynamic() {
        let program = parse_ok("int main() { int a[3]; int b[a[0]]; return 0; }");
        let fixed = program
            .decls
            .iter()
            .find(|d| program.interns.resolve(d.name) == "a")
            .unwrap();
        assert!(matches!(&fixed.ty, Ty::Array(_, ArrayLen::Fixed(3))));
        let dynamic = program
            .decls
            .iter()
            .find(|d| program.interns.resolve(d.name) == "b")
            .unwrap();
        assert!(matches!(&dynamic.ty, Ty::Array(_, ArrayLen::Dynamic(_))));
    }

    #[test]
    fn sizeof_of_an_array_name_keeps_the_array_type() {
        let program = parse_ok("int main() { int a[4]; return sizeof(a); }");
        let main = program.functions.values().next().unwrap();
        let StmtKind::Compound(stmts) = &main.body.kind else {
            panic!("compound body");
        };
        let StmtKind::Return(Some(ret)) = &stmts[1].kind else {
            panic!("return statement");
        };
        assert!(matches!(&ret.kind, ExprKind::SizeOf(Ty::Array(..))));
    }

    #[test]
    fn char_escapes_lex_to_code_points() {
        let program = parse_ok("char nl = '\\n'; int main() { return 0; }");
        assert_eq!(program.globals[0].init, Some(10));
    }

    #[test]
    fn unknown_names_are_rejected() {
        let err = parse("int main() { return missing; }", "test.c").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownName("missing".to_owned()));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn only_lvalues_can_be_assigned() {
        let err = parse("int main() { 3 = 4; return 0; }", "test.c").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidAssignTarget);
    }

    #[test]
    fn block_comments_track_lines() {
        let err = parse("/* one\ntwo */ int main() { return oops; }", "test.c").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
