//! Post-order tree walker driving the environment primitives.
//!
//! Expressions evaluate their children first, then hand the node to the
//! matching environment primitive, which reads the children's cached words
//! and caches its own. Control-flow statements read condition values back
//! out of the cache between walks.
//!
//! Early `return` is a sticky flag rather than an unwind: once a `return`
//! statement runs, every subsequent visit inside the current activation is
//! a no-op until the call site that pushed the frame clears the flag after
//! walking the callee's body.

use crate::environment::Environment;
use crate::error::RunResult;
use crate::expressions::{ArrayLen, Expr, ExprKind, Stmt, StmtKind, Ty};

pub struct TreeWalker<'env, 'p, 'io> {
    env: &'env mut Environment<'p, 'io>,
    returned: bool,
}

impl<'env, 'p, 'io> TreeWalker<'env, 'p, 'io> {
    pub fn new(env: &'env mut Environment<'p, 'io>) -> Self {
        Self {
            env,
            returned: false,
        }
    }

    /// Whether the statement walked last ended in a `return` that has not
    /// been consumed by a call site.
    pub fn returned(&self) -> bool {
        self.returned
    }

    pub fn walk_stmt(&mut self, stmt: &'p Stmt) -> RunResult<()> {
        if self.returned {
            return Ok(());
        }
        match &stmt.kind {
            StmtKind::Expr(expr) => self.walk_expr(expr),
            StmtKind::Declare(vars) => {
                for var in vars {
                    // a variable-length array evaluates its length now
                    if let Ty::Array(_, ArrayLen::Dynamic(len)) =
                        &self.env.program().decl(var.decl).ty
                    {
                        self.walk_expr(len)?;
                    }
                    if let Some(init) = &var.init {
                        self.walk_expr(init)?;
                    }
                }
                self.env.decl_stmt(vars)
            }
            StmtKind::Compound(stmts) => {
                for stmt in stmts {
                    self.walk_stmt(stmt)?;
                }
                Ok(())
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.walk_expr(cond)?;
                if self.env.stmt_val(cond.id)? != 0 {
                    self.walk_stmt(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.walk_stmt(else_branch)
                } else {
                    Ok(())
                }
            }
            StmtKind::While { cond, body } => {
                self.walk_expr(cond)?;
                while self.env.stmt_val(cond.id)? != 0 {
                    self.walk_stmt(body)?;
                    if self.returned {
                        return Ok(());
                    }
                    self.walk_expr(cond)?;
                }
                Ok(())
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.walk_expr(init)?;
                }
                if let Some(cond) = cond {
                    self.walk_expr(cond)?;
                }
                loop {
                    let go = match cond {
                        Some(cond) => self.env.stmt_val(cond.id)? != 0,
                        None => true,
                    };
                    if !go {
                        return Ok(());
                    }
                    self.walk_stmt(body)?;
                    if self.returned {
                        return Ok(());
                    }
                    if let Some(step) = step {
                        self.walk_expr(step)?;
                    }
                    if let Some(cond) = cond {
                        self.walk_expr(cond)?;
                    }
                }
            }
            StmtKind::Return(expr) => {
                if let Some(expr) = expr {
                    self.walk_expr(expr)?;
                }
                self.env.ret(expr.as_ref())?;
                self.returned = true;
                Ok(())
            }
            StmtKind::Empty => Ok(()),
        }
    }

    pub fn walk_expr(&mut self, expr: &'p Expr) -> RunResult<()> {
        if self.returned {
            return Ok(());
        }
        match &expr.kind {
            ExprKind::Literal(value) => self.env.literal(expr.id, *value),
            ExprKind::Name(decl) => self.env.declref(expr.id, *decl, &expr.ty),
            ExprKind::Paren(inner) => {
                self.walk_expr(inner)?;
                self.env.paren(expr.id, inner.id)
            }
            ExprKind::Cast(inner) => {
                self.walk_expr(inner)?;
                self.env.cast(expr.id, &expr.ty, inner.id)
            }
            ExprKind::Unary { op, operand } => {
                self.walk_expr(operand)?;
                self.env.unop(expr.id, *op, operand)
            }
            ExprKind::Binary { op, left, right } => {
                self.walk_expr(left)?;
                self.walk_expr(right)?;
                self.env.binop(expr.id, *op, left, right)
            }
            ExprKind::Subscript { base, index } => {
                self.walk_expr(base)?;
                self.walk_expr(index)?;
                self.env.arrsub(expr.id, base, index)
            }
            ExprKind::SizeOf(ty) => {
                if let Ty::Array(_, ArrayLen::Dynamic(len)) = ty {
                    self.walk_expr(len)?;
                }
                self.env.size_of(expr.id, ty)
            }
            ExprKind::Call { callee, args } => {
                for arg in args {
                    self.walk_expr(arg)?;
                }
                if let Some(body) = self.env.call(expr.id, *callee, args)? {
                    self.walk_stmt(body)?;
                    if !self.returned {
                        // implicit `return 0` when the body falls through
                        self.env.ret(None)?;
                    }
                    self.returned = false;
                }
                Ok(())
            }
        }
    }
}
