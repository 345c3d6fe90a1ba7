//! The execution environment: call stack, heap, intrinsics, and the
//! evaluator primitives.
//!
//! The environment is the only party that mutates frames and the heap on
//! behalf of the tree walker. Every primitive assumes its node's children
//! have already been evaluated (the walker is post-order) and publishes its
//! own result into the current frame's cache under the node's identity.

use ahash::AHashMap;

use crate::error::{RunError, RunResult};
use crate::expressions::{
    ArrayLen, BinaryOp, DeclId, DeclKind, Expr, ExprKind, NodeId, Program, Stmt, Ty, UnaryOp,
    VarInit, WORD_SIZE,
};
use crate::frame::{is_local_address, Binding, StackFrame};
use crate::heap::Heap;
use crate::io::{InputReader, PrintWriter};

/// The four host-provided functions, resolved by name during init.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum Intrinsic {
    #[strum(serialize = "GET")]
    Get,
    #[strum(serialize = "PRINT")]
    Print,
    #[strum(serialize = "MALLOC")]
    Malloc,
    #[strum(serialize = "FREE")]
    Free,
}

pub struct Environment<'p, 'io> {
    program: &'p Program,
    stack: Vec<StackFrame>,
    heap: Heap,
    intrinsics: AHashMap<DeclId, Intrinsic>,
    entry: Option<DeclId>,
    exit_value: i64,
    /// Serial of the next activation; picks its slice of the frame-local
    /// address region, so stale addresses never alias a later frame.
    next_frame: u32,
    input: &'io mut dyn InputReader,
    output: &'io mut dyn PrintWriter,
}

impl<'p, 'io> Environment<'p, 'io> {
    pub fn new(
        program: &'p Program,
        input: &'io mut dyn InputReader,
        output: &'io mut dyn PrintWriter,
    ) -> Self {
        Self {
            program,
            stack: Vec::new(),
            heap: Heap::new(),
            intrinsics: AHashMap::new(),
            entry: None,
            exit_value: 0,
            next_frame: 0,
            input,
            output,
        }
    }

    /// Scans the translation unit: records the intrinsic handles and the
    /// entry function, binds every file-scope variable into the heap, and
    /// pushes the root frame.
    pub fn init(&mut self) -> RunResult<()> {
        for (index, info) in self.program.decls.iter().enumerate() {
            if info.kind != DeclKind::Func {
                continue;
            }
            let id = DeclId::new(index);
            let name = self.program.interns.resolve(info.name);
            if let Ok(intrinsic) = name.parse::<Intrinsic>() {
                self.intrinsics.insert(id, intrinsic);
            } else if name == "main" && self.program.function(id).is_some() {
                self.entry = Some(id);
            }
        }
        for global in &self.program.globals {
            let info = self.program.decl(global.decl);
            match &info.ty {
                Ty::Array(_, len) => {
                    let count = match len {
                        ArrayLen::Fixed(n) => *n,
                        ArrayLen::Dynamic(_) => {
                            return Err(RunError::Internal("variable-length array at file scope"))
                        }
                    };
                    let size = usize::try_from(count)
                        .ok()
                        .and_then(|n| n.checked_mul(WORD_SIZE))
                        .ok_or(RunError::NegativeSize(count))?;
                    self.heap.bind_global_array(global.decl, size);
                }
                ty => {
                    let width = ty.scalar_width();
                    self.heap
                        .bind_global(global.decl, width, global.init.unwrap_or(0))?;
                }
            }
        }
        self.stack.push(StackFrame::new(self.next_frame));
        self.next_frame += 1;
        Ok(())
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn entry(&self) -> Option<DeclId> {
        self.entry
    }

    /// The word returned by the `return` that emptied the stack.
    pub fn exit_value(&self) -> i64 {
        self.exit_value
    }

    /// Reads a node's cached word from the current frame; fatal if the
    /// node was never evaluated.
    pub fn stmt_val(&self, node: NodeId) -> RunResult<i64> {
        self.cached(node, "statement value")
    }

    /// Caches an integer or character literal's value.
    pub fn literal(&mut self, node: NodeId, value: i64) -> RunResult<()> {
        self.frame_mut()?.bind_stmt(node, value);
        Ok(())
    }

    /// Caches the parenthesised child's value.
    pub fn paren(&mut self, node: NodeId, child: NodeId) -> RunResult<()> {
        let value = self.cached(child, "parenthesised expression")?;
        self.frame_mut()?.bind_stmt(node, value);
        Ok(())
    }

    /// Caches the cast child's value unchanged. A pointer cast whose child
    /// cached nothing is tolerated (the uninitialised-pointer read case);
    /// the slot stays unset.
    pub fn cast(&mut self, node: NodeId, ty: &Ty, child: NodeId) -> RunResult<()> {
        self.frame_mut()?.set_pc(node);
        match self.frame()?.stmt_val(child) {
            Some(value) => {
                self.frame_mut()?.bind_stmt(node, value);
                Ok(())
            }
            None if ty.is_pointer() => Ok(()),
            None => Err(RunError::UncachedValue("cast operand")),
        }
    }

    /// Looks up the referenced decl and caches its word: the current value
    /// for scalars and pointers, the base address for arrays. Lookup is
    /// two-level, current frame first and heap-resident globals second.
    pub fn declref(&mut self, node: NodeId, decl: DeclId, ty: &Ty) -> RunResult<()> {
        self.frame_mut()?.set_pc(node);
        if let Some(word) = self.frame()?.decl_val(decl) {
            self.frame_mut()?.bind_stmt(node, word);
            return Ok(());
        }
        if let Some(addr) = self.heap.global_addr(decl) {
            let word = if ty.is_array() {
                addr as i64
            } else {
                self.heap.load_scalar(addr, ty.scalar_width())?
            };
            self.frame_mut()?.bind_stmt(node, word);
            return Ok(());
        }
        if ty.is_pointer() {
            // uninitialised pointer read: leave the slot unset
            return Ok(());
        }
        Err(RunError::UnboundVariable(
            self.program.decl_name(decl).to_owned(),
        ))
    }

    /// Unary operators: negation, and dereference sized by the pointee.
    pub fn unop(&mut self, node: NodeId, op: UnaryOp, operand: &Expr) -> RunResult<()> {
        match op {
            UnaryOp::Neg => {
                let value = self.cached(operand.id, "negation operand")?;
                self.frame_mut()?.bind_stmt(node, value.wrapping_neg());
            }
            UnaryOp::Deref => {
                let addr = self.cached(operand.id, "dereference operand")?;
                let width = operand.ty.pointee().map_or(WORD_SIZE, Ty::scalar_width);
                let value = self.load_at(addr, width)?;
                self.frame_mut()?.bind_stmt(node, value);
            }
        }
        Ok(())
    }

    /// Binary operators. Additive operators apply C pointer scaling: an
    /// integer added to (or subtracted from) a pointer advances in units
    /// of the pointee width.
    pub fn binop(&mut self, node: NodeId, op: BinaryOp, left: &Expr, right: &Expr) -> RunResult<()> {
        match op {
            BinaryOp::Assign => self.assign(node, left, right),
            op => {
                let lhs = self.cached(left.id, "left operand")?;
                let rhs = self.cached(right.id, "right operand")?;
                let value = match op {
                    BinaryOp::Add | BinaryOp::Sub => {
                        let (l, r) = scaled_operands(left, right, lhs, rhs);
                        if op == BinaryOp::Add {
                            l.wrapping_add(r)
                        } else {
                            l.wrapping_sub(r)
                        }
                    }
                    BinaryOp::Mul => lhs.wrapping_mul(rhs),
                    BinaryOp::Div => {
                        if rhs == 0 {
                            return Err(RunError::DivisionByZero);
                        }
                        lhs.wrapping_div(rhs)
                    }
                    BinaryOp::Rem => {
                        if rhs == 0 {
                            return Err(RunError::DivisionByZero);
                        }
                        lhs.wrapping_rem(rhs)
                    }
                    BinaryOp::Lt => i64::from(lhs < rhs),
                    BinaryOp::Gt => i64::from(lhs > rhs),
                    BinaryOp::Le => i64::from(lhs <= rhs),
                    BinaryOp::Ge => i64::from(lhs >= rhs),
                    BinaryOp::Eq => i64::from(lhs == rhs),
                    BinaryOp::Ne => i64::from(lhs != rhs),
                    BinaryOp::Assign => {
                        return Err(RunError::Internal("assignment in arithmetic path"))
                    }
                };
                self.frame_mut()?.bind_stmt(node, value);
                Ok(())
            }
        }
    }

    /// Declaration statement: binds each declarator in the current frame.
    /// Arrays (fixed or variable length) get word-stride storage in the
    /// frame's local byte store; scalars and pointers get their initialiser
    /// value or zero.
    pub fn decl_stmt(&mut self, vars: &[VarInit]) -> RunResult<()> {
        for var in vars {
            let info = self.program.decl(var.decl);
            match &info.ty {
                Ty::Array(_, len) => {
                    let count = match len {
                        ArrayLen::Fixed(n) => *n,
                        ArrayLen::Dynamic(expr) => self.cached(expr.id, "array length")?,
                    };
                    let size = usize::try_from(count)
                        .ok()
                        .and_then(|n| n.checked_mul(WORD_SIZE))
                        .ok_or(RunError::NegativeSize(count))?;
                    let base = self.frame_mut()?.alloc_local(size);
                    self.frame_mut()?.init_decl(var.decl, Binding::Array(base));
                }
                ty => {
                    let value = match &var.init {
                        Some(init) => match self.frame()?.stmt_val(init.id) {
                            Some(value) => value,
                            // tolerated uninitialised-pointer initialiser
                            None if ty.is_pointer() => 0,
                            None => return Err(RunError::UncachedValue("declaration initialiser")),
                        },
                        None => 0,
                    };
                    self.frame_mut()?.init_decl(var.decl, Binding::Value(value));
                }
            }
        }
        Ok(())
    }

    /// Array subscript read: loads the word at `base + index * WORD_SIZE`
    /// from whichever store owns the address.
    pub fn arrsub(&mut self, node: NodeId, base: &Expr, index: &Expr) -> RunResult<()> {
        let addr = self.element_addr(base, index)?;
        let value = self.load_at(addr, WORD_SIZE)?;
        self.frame_mut()?.bind_stmt(node, value);
        Ok(())
    }

    /// `sizeof` with a type operand.
    pub fn size_of(&mut self, node: NodeId, ty: &Ty) -> RunResult<()> {
        let size = self.type_size(ty)?;
        self.frame_mut()?.bind_stmt(node, size);
        Ok(())
    }

    /// Call expression. Intrinsics complete here and return no body; a
    /// user function gets a fresh frame with its parameters pre-bound to
    /// the argument words (already evaluated in the caller's frame), and
    /// its body is handed back for the walker to descend into.
    pub fn call(
        &mut self,
        node: NodeId,
        callee: DeclId,
        args: &[Expr],
    ) -> RunResult<Option<&'p Stmt>> {
        self.frame_mut()?.set_pc(node);
        if let Some(&intrinsic) = self.intrinsics.get(&callee) {
            match intrinsic {
                Intrinsic::Get => {
                    let value = self.input.read_int()?;
                    self.frame_mut()?.bind_stmt(node, value);
                }
                Intrinsic::Print => {
                    let arg = args
                        .first()
                        .ok_or(RunError::Internal("PRINT with no argument"))?;
                    let value = self.cached(arg.id, "PRINT argument")?;
                    self.output.print_int(value);
                }
                Intrinsic::Malloc => {
                    let arg = args
                        .first()
                        .ok_or(RunError::Internal("MALLOC with no argument"))?;
                    let size = self.cached(arg.id, "MALLOC size")?;
                    let size = usize::try_from(size).map_err(|_| RunError::NegativeSize(size))?;
                    let addr = self.heap.alloc(size);
                    self.frame_mut()?.bind_stmt(node, addr as i64);
                }
                Intrinsic::Free => {
                    let arg = args
                        .first()
                        .ok_or(RunError::Internal("FREE with no argument"))?;
                    let addr = to_addr(self.cached(arg.id, "FREE address")?)?;
                    self.heap.free(addr)?;
                }
            }
            return Ok(None);
        }

        let program = self.program;
        let function = program.function(callee).ok_or_else(|| {
            RunError::UndefinedFunction(program.decl_name(callee).to_owned())
        })?;
        let mut frame = StackFrame::new(self.next_frame);
        self.next_frame += 1;
        for (param, arg) in function.params.iter().zip(args) {
            let value = self.cached(arg.id, "call argument")?;
            frame.init_decl(*param, Binding::Value(value));
        }
        self.stack.push(frame);
        Ok(Some(&function.body))
    }

    /// Return: pops the frame and deposits the return word into the
    /// caller's cache at the call expression the caller's pc anchors. The
    /// return that empties the stack ends the program instead.
    pub fn ret(&mut self, value_expr: Option<&Expr>) -> RunResult<()> {
        let value = match value_expr {
            Some(expr) => self.cached(expr.id, "return value")?,
            None => 0,
        };
        self.stack.pop().ok_or(RunError::StackUnderflow)?;
        match self.stack.last_mut() {
            Some(caller) => {
                let target = caller
                    .pc()
                    .ok_or(RunError::Internal("return with no recorded call site"))?;
                caller.bind_stmt(target, value);
            }
            None => self.exit_value = value,
        }
        Ok(())
    }

    /// Assignment: the right-hand word is cached on the LHS node (chained
    /// assignment) and on the whole expression, then stored into the
    /// target's owning scope.
    fn assign(&mut self, node: NodeId, left: &Expr, right: &Expr) -> RunResult<()> {
        let value = self.cached(right.id, "assignment value")?;
        let target = left.unparenthesized();
        self.frame_mut()?.bind_stmt(left.id, value);
        self.frame_mut()?.bind_stmt(target.id, value);
        match &target.kind {
            ExprKind::Name(decl) => self.bind_decl(*decl, value)?,
            ExprKind::Subscript { base, index } => {
                let addr = self.element_addr(base, index)?;
                self.store_at(addr, WORD_SIZE, value)?;
            }
            ExprKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => {
                let addr = self.cached(operand.id, "dereference target")?;
                let width = operand.ty.pointee().map_or(WORD_SIZE, Ty::scalar_width);
                self.store_at(addr, width, value)?;
            }
            _ => return Err(RunError::Internal("unsupported assignment target")),
        }
        self.frame_mut()?.bind_stmt(node, value);
        Ok(())
    }

    /// Updates a decl's binding in its owning scope: the current frame if
    /// it lives there, the heap if it is a file-scope variable.
    fn bind_decl(&mut self, decl: DeclId, value: i64) -> RunResult<()> {
        if self.frame()?.has_decl(decl) {
            self.frame_mut()?.bind_value(decl, value);
            return Ok(());
        }
        if let Some(addr) = self.heap.global_addr(decl) {
            let width = self.program.decl(decl).ty.scalar_width();
            return self.heap.store_scalar(addr, width, value);
        }
        Err(RunError::UnboundVariable(
            self.program.decl_name(decl).to_owned(),
        ))
    }

    /// Element address of `base[index]`. The owning arena is not decided
    /// here: frame-local and heap addresses occupy disjoint regions of the
    /// word space, so the address itself carries its provenance.
    fn element_addr(&self, base: &Expr, index: &Expr) -> RunResult<i64> {
        let base_word = self.cached(base.id, "subscript base")?;
        let idx = self.cached(index.id, "subscript index")?;
        Ok(base_word.wrapping_add(idx.wrapping_mul(WORD_SIZE as i64)))
    }

    /// Loads a scalar from whichever arena owns the address.
    fn load_at(&self, addr: i64, width: usize) -> RunResult<i64> {
        if is_local_address(addr) {
            self.local_frame(addr)?.load_scalar_local(addr, width)
        } else {
            self.heap.load_scalar(to_addr(addr)?, width)
        }
    }

    /// Stores a scalar into whichever arena owns the address.
    fn store_at(&mut self, addr: i64, width: usize, value: i64) -> RunResult<()> {
        if is_local_address(addr) {
            self.local_frame_mut(addr)?.store_scalar_local(addr, width, value)
        } else {
            self.heap.store_scalar(to_addr(addr)?, width, value)
        }
    }

    /// The live activation whose slice of the local region contains the
    /// address; an address whose frame has already been popped is fatal.
    fn local_frame(&self, addr: i64) -> RunResult<&StackFrame> {
        self.stack
            .iter()
            .rev()
            .find(|frame| frame.owns(addr))
            .ok_or(RunError::BadAddress(addr))
    }

    fn local_frame_mut(&mut self, addr: i64) -> RunResult<&mut StackFrame> {
        self.stack
            .iter_mut()
            .rev()
            .find(|frame| frame.owns(addr))
            .ok_or(RunError::BadAddress(addr))
    }

    fn type_size(&self, ty: &Ty) -> RunResult<i64> {
        match ty {
            Ty::Array(_, ArrayLen::Fixed(n)) => Ok(n.wrapping_mul(WORD_SIZE as i64)),
            Ty::Array(_, ArrayLen::Dynamic(len)) => {
                let n = self.cached(len.id, "array length")?;
                Ok(n.wrapping_mul(WORD_SIZE as i64))
            }
            scalar => Ok(scalar.scalar_width() as i64),
        }
    }

    fn cached(&self, node: NodeId, what: &'static str) -> RunResult<i64> {
        self.frame()?
            .stmt_val(node)
            .ok_or(RunError::UncachedValue(what))
    }

    fn frame(&self) -> RunResult<&StackFrame> {
        self.stack.last().ok_or(RunError::StackUnderflow)
    }

    fn frame_mut(&mut self) -> RunResult<&mut StackFrame> {
        self.stack.last_mut().ok_or(RunError::StackUnderflow)
    }
}

/// C pointer arithmetic: scale the integer operand by the pointee width of
/// the pointer operand (arrays decay). Two pointers, or two integers, pass
/// through unscaled.
fn scaled_operands(left: &Expr, right: &Expr, lhs: i64, rhs: i64) -> (i64, i64) {
    match (left.ty.pointee(), right.ty.pointee()) {
        (Some(pointee), None) => (lhs, rhs.wrapping_mul(pointee.scalar_width() as i64)),
        (None, Some(pointee)) => (lhs.wrapping_mul(pointee.scalar_width() as i64), rhs),
        _ => (lhs, rhs),
    }
}

/// A word used as a heap address: must be strictly positive (0 is null).
fn to_addr(word: i64) -> RunResult<usize> {
    if word <= 0 {
        return Err(RunError::BadAddress(word));
    }
    usize::try_from(word).map_err(|_| RunError::BadAddress(word))
}
