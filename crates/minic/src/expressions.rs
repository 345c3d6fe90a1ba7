//! The abstract syntax tree consumed by the evaluator.
//!
//! Two identity spaces matter at run time: every statement and expression
//! carries a [`NodeId`] (the key under which its computed word is cached in
//! the active stack frame), and every named declaration carries a [`DeclId`]
//! (the key under which its binding lives in a frame or on the heap). Both
//! are stable for the lifetime of the parsed [`Program`].

use ahash::AHashMap;

use crate::intern::{Interns, StringId};

/// Width in bytes of the evaluator's universal word (and of pointers).
///
/// Every run-time value travels as a signed word of this width; `char`
/// values occupy a single byte in storage but are widened to a word on load.
pub const WORD_SIZE: usize = 8;

/// Identity of a statement or expression node, used as the result-cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(index: usize) -> Self {
        Self(index.try_into().expect("node id overflow"))
    }
}

/// Identity of a named declaration (variable, parameter, or function).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(u32);

impl DeclId {
    pub fn new(index: usize) -> Self {
        Self(index.try_into().expect("decl id overflow"))
    }

    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Length of an array type.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayLen {
    /// Constant length known at parse time, e.g. `int a[3]`.
    Fixed(i64),
    /// Variable length, e.g. `int a[n]`; the expression is evaluated when
    /// the declaration executes (and again for each `sizeof` of the array).
    Dynamic(Box<Expr>),
}

/// A resolvable type in the source language.
#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    Void,
    Char,
    Int,
    Ptr(Box<Ty>),
    Array(Box<Ty>, ArrayLen),
}

impl Ty {
    pub fn is_pointer(&self) -> bool {
        matches!(self, Self::Ptr(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(..))
    }

    /// The element type behind a pointer, or behind an array after decay.
    pub fn pointee(&self) -> Option<&Ty> {
        match self {
            Self::Ptr(inner) => Some(inner),
            Self::Array(elem, _) => Some(elem),
            _ => None,
        }
    }

    /// Storage width in bytes of a scalar of this type.
    ///
    /// `char` occupies one byte, and so does `void` (it only shows up
    /// behind `void *`, where byte-granular arithmetic is the useful
    /// reading); everything else occupies a full word.
    pub fn scalar_width(&self) -> usize {
        match self {
            Self::Char | Self::Void => 1,
            _ => WORD_SIZE,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation `-e`.
    Neg,
    /// Pointer dereference `*e`; the load is sized by the pointee type.
    Deref,
}

/// Binary operators, including assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

/// An expression node: identity, resolved type, and shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub ty: Ty,
    pub kind: ExprKind,
}

impl Expr {
    /// Strips any number of surrounding parentheses.
    ///
    /// Assignment targets and subscript bases are matched on structurally,
    /// so `(a) = 1` and `(a)[0]` must see through the wrapping.
    pub fn unparenthesized(&self) -> &Expr {
        let mut expr = self;
        while let ExprKind::Paren(inner) = &expr.kind {
            expr = inner;
        }
        expr
    }
}

/// The shape of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Integer or character literal; character literals carry their code
    /// point here and `Ty::Char` on the node.
    Literal(i64),
    /// Reference to a declared variable or parameter.
    Name(DeclId),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Explicit cast; the target type is the node's `ty`. Values pass
    /// through unchanged, the type only matters to later consumers.
    Cast(Box<Expr>),
    Paren(Box<Expr>),
    /// Array subscript `base[index]`; elements are word-sized.
    Subscript {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// `sizeof` with its operand reduced to a type at parse time.
    SizeOf(Ty),
    /// Direct call of a named function or intrinsic.
    Call {
        callee: DeclId,
        args: Vec<Expr>,
    },
}

/// One declarator inside a declaration statement.
#[derive(Debug, Clone, PartialEq)]
pub struct VarInit {
    pub decl: DeclId,
    pub init: Option<Expr>,
}

/// A statement node.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
}

/// The shape of a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    /// Declaration statement, possibly with several declarators
    /// (`int a = 1, b;`).
    Declare(Vec<VarInit>),
    Compound(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    /// `for` with optional expression init/cond/step; a missing condition
    /// iterates unconditionally.
    For {
        init: Option<Expr>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Return(Option<Expr>),
    /// Lone `;`.
    Empty,
}

/// What a declaration names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Param,
    Func,
}

/// Name, type, and kind of one declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclInfo {
    pub name: StringId,
    pub ty: Ty,
    pub kind: DeclKind,
}

/// A function definition: its declaration, parameter order, and body.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub decl: DeclId,
    pub params: Vec<DeclId>,
    pub body: Stmt,
}

/// A file-scope variable and its literal initialiser, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVar {
    pub decl: DeclId,
    pub init: Option<i64>,
}

/// A fully parsed and resolved translation unit.
#[derive(Debug)]
pub struct Program {
    /// All declarations, indexed by [`DeclId`].
    pub decls: Vec<DeclInfo>,
    /// Function definitions (prototypes without bodies are absent here).
    pub functions: AHashMap<DeclId, Function>,
    /// File-scope variables in declaration order.
    pub globals: Vec<GlobalVar>,
    pub interns: Interns,
}

impl Program {
    pub fn decl(&self, id: DeclId) -> &DeclInfo {
        &self.decls[id.index()]
    }

    pub fn decl_name(&self, id: DeclId) -> &str {
        self.interns.resolve(self.decl(id).name)
    }

    pub fn function(&self, id: DeclId) -> Option<&Function> {
        self.functions.get(&id)
    }
}
