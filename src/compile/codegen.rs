use rustc_hash::FxHashMap;

use log::trace;

use super::CompileError;
use crate::code_attribute::{
    ArithOp, Cond, Constant, Handler, Instruction, InstructionError, InvokeMode, Label, MethodCode, ValueKind,
};
use crate::descriptor::{FunctionType, PrimitiveType, Type};
use crate::ir::*;

/// Prefix reserved for labels the generator invents.
const SYNTHETIC_PREFIX: char = '#';

/// Tracks local variable allocation.
struct LocalAllocator {
    /// (name, type, slot)
    locals: Vec<(String, Type, u16)>,
    next_slot: u16,
}

impl LocalAllocator {
    fn new(is_static: bool, params: &[Local]) -> Result<Self, CompileError> {
        let mut allocator = LocalAllocator {
            locals: Vec::new(),
            next_slot: if is_static { 0 } else { 1 },
        };
        for param in params {
            allocator.allocate(param)?;
        }
        Ok(allocator)
    }

    fn allocate(&mut self, local: &Local) -> Result<u16, CompileError> {
        if self.locals.iter().any(|(name, _, _)| *name == local.name) {
            return Err(CompileError::unsupported(format!("local `{}` declared twice", local.name)));
        }
        if local.ty.is_void() {
            return Err(CompileError::unsupported(format!("local `{}` has type void", local.name)));
        }
        let slot = self.next_slot;
        self.next_slot = slot
            .checked_add(local.ty.slot_size())
            .ok_or_else(|| CompileError::unsupported("more than 65535 local slots"))?;
        self.locals.push((local.name.clone(), local.ty.clone(), slot));
        Ok(slot)
    }

    fn find(&self, name: &str) -> Result<(u16, &Type), CompileError> {
        self.locals
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, ty, slot)| (*slot, ty))
            .ok_or_else(|| CompileError::unsupported(format!("unknown local `{}`", name)))
    }
}

/// Lowers one method body to semantic instructions.
pub struct CodeGenerator<'a> {
    this: &'a Type,
    method: &'a Method,
    locals: LocalAllocator,
    instructions: Vec<Instruction>,
    next_label: usize,
}

/// Lower `method` of the class `this` into instructions and handlers.
pub fn lower_method(this: &Type, method: &Method) -> Result<MethodCode, CompileError> {
    let body = method
        .body
        .as_ref()
        .ok_or_else(|| CompileError::unsupported("method has no body"))?;
    let mut codegen = CodeGenerator::new(this, method, body)?;
    codegen.generate_body(&body.stmts)?;
    let code = codegen.finish(&body.traps)?;
    trace!("lowered {} to {} instructions", method.name, code.instructions.len());
    Ok(code)
}

impl<'a> CodeGenerator<'a> {
    pub fn new(this: &'a Type, method: &'a Method, body: &Body) -> Result<Self, CompileError> {
        let mut locals = LocalAllocator::new(method.is_static(), &method.params)?;
        for local in &body.locals {
            locals.allocate(local)?;
        }
        Ok(CodeGenerator {
            this,
            method,
            locals,
            instructions: Vec::new(),
            next_label: 0,
        })
    }

    fn new_label(&mut self) -> Label {
        let label = Label::new(format!("{}{}", SYNTHETIC_PREFIX, self.next_label));
        self.next_label += 1;
        label
    }

    fn emit(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    fn emit_checked(&mut self, instr: Result<Instruction, InstructionError>) -> Result<(), CompileError> {
        let index = self.instructions.len();
        let instr = instr.map_err(|source| CompileError::Instruction { index, source })?;
        self.emit(instr);
        Ok(())
    }

    pub fn generate_body(&mut self, stmts: &[Stmt]) -> Result<(), CompileError> {
        for stmt in stmts {
            self.gen_stmt(stmt)?;
        }
        // A non-empty void body always ends in a return, reachable or not.
        let needs_return = match self.instructions.last() {
            None | Some(Instruction::Return(_)) => false,
            Some(_) => true,
        };
        if self.method.return_ty.is_void() && needs_return {
            self.emit(Instruction::Return(None));
        }
        Ok(())
    }

    /// Check label consistency and resolve traps to instruction indices.
    pub fn finish(self, traps: &[Trap]) -> Result<MethodCode, CompileError> {
        let mut positions: FxHashMap<&str, usize> = FxHashMap::default();
        for (index, instr) in self.instructions.iter().enumerate() {
            if let Instruction::Label(label) = instr {
                if positions.insert(label.0.as_str(), index).is_some() {
                    return Err(CompileError::unsupported(format!("label `{}` defined twice", label)));
                }
            }
        }
        for instr in &self.instructions {
            let targets: Vec<&Label> = match instr {
                Instruction::Branch(branch) => vec![&branch.target],
                Instruction::Switch(switch) => std::iter::once(&switch.default)
                    .chain(switch.cases.iter().map(|(_, label)| label))
                    .collect(),
                _ => Vec::new(),
            };
            if let Some(missing) = targets.into_iter().find(|l| !positions.contains_key(l.0.as_str())) {
                return Err(CompileError::unsupported(format!("jump to undefined label `{}`", missing)));
            }
        }

        let position = |name: &str| {
            positions
                .get(name)
                .copied()
                .ok_or_else(|| CompileError::unsupported(format!("trap refers to undefined label `{}`", name)))
        };
        let mut handlers = Vec::with_capacity(traps.len());
        for trap in traps {
            let start = position(&trap.start)?;
            let end = position(&trap.end)?;
            position(&trap.handler)?;
            if end < start {
                return Err(CompileError::unsupported(format!(
                    "trap ends at `{}` before it starts at `{}`",
                    trap.end, trap.start
                )));
            }
            handlers.push(Handler {
                start,
                end,
                target: Label::new(trap.handler.clone()),
                catch_type: trap.catch_type.clone(),
            });
        }

        Ok(MethodCode::new(
            self.instructions,
            handlers,
            self.method.is_static(),
            &self.method.param_types(),
        ))
    }

    // --- Statement codegen ---

    fn gen_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Assign { target, value } => self.gen_assign(target, value),
            Stmt::Eval(expr) => {
                let ty = self.gen_expr(expr)?;
                if !ty.is_void() {
                    self.emit_checked(Instruction::pop(&ty))?;
                }
                Ok(())
            }
            Stmt::Return(None) => {
                if !self.method.return_ty.is_void() {
                    return Err(CompileError::unsupported("value-less return in a non-void method"));
                }
                self.emit(Instruction::Return(None));
                Ok(())
            }
            Stmt::Return(Some(value)) => {
                let method = self.method;
                let ret = &method.return_ty;
                if ret.is_void() {
                    return Err(CompileError::unsupported("return with a value in a void method"));
                }
                self.gen_expr(value)?;
                self.emit_checked(Instruction::ret(ret))
            }
            Stmt::Throw(value) => {
                self.gen_expr(value)?;
                self.emit(Instruction::Throw);
                Ok(())
            }
            Stmt::Goto(target) => {
                self.emit(Instruction::goto(Label::new(target.clone())));
                Ok(())
            }
            Stmt::If { cond, target } => self.gen_condition(cond, &Label::new(target.clone()), true),
            Stmt::Label(name) => {
                if name.starts_with(SYNTHETIC_PREFIX) {
                    return Err(CompileError::unsupported(format!("label `{}` uses a reserved prefix", name)));
                }
                self.emit(Instruction::label(name.clone()));
                Ok(())
            }
            Stmt::Lock(value) => {
                self.gen_expr(value)?;
                self.emit(Instruction::MonitorEnter);
                Ok(())
            }
            Stmt::Unlock(value) => {
                self.gen_expr(value)?;
                self.emit(Instruction::MonitorExit);
                Ok(())
            }
            Stmt::Switch { key, cases, default } => {
                let ty = self.gen_expr(key)?;
                if !ty.as_primitive().is_some_and(PrimitiveType::is_int_like) {
                    return Err(CompileError::unsupported(format!("switch on {:?}", ty)));
                }
                let cases = cases
                    .iter()
                    .map(|(key, label)| (*key, Label::new(label.clone())))
                    .collect();
                self.emit_checked(Instruction::switch(Label::new(default.clone()), cases))
            }
        }
    }

    fn gen_assign(&mut self, target: &Place, value: &Expr) -> Result<(), CompileError> {
        match target {
            Place::Local(name) => {
                let (slot, ty) = self.locals.find(name)?;
                let store = Instruction::store(slot, ty);
                self.gen_expr(value)?;
                self.emit_checked(store)
            }
            Place::Field(field) => {
                let is_static = match &field.object {
                    Some(object) => {
                        self.gen_expr(object)?;
                        false
                    }
                    None => true,
                };
                self.gen_expr(value)?;
                self.emit_checked(Instruction::put_field(&field.owner, &field.name, &field.ty, is_static))
            }
            Place::ArrayElement { array, index, elem } => {
                self.gen_expr(array)?;
                self.gen_expr(index)?;
                self.gen_expr(value)?;
                self.emit_checked(Instruction::array_store(elem))
            }
        }
    }

    // --- Expression codegen ---

    /// Emit code leaving the value of `expr` on the stack; returns its type.
    fn gen_expr(&mut self, expr: &Expr) -> Result<Type, CompileError> {
        match expr {
            Expr::Literal(literal) => {
                self.gen_literal(literal)?;
                Ok(literal.ty())
            }
            Expr::Local(name) => {
                let (slot, ty) = self.locals.find(name)?;
                let ty = ty.clone();
                self.emit_checked(Instruction::load(slot, &ty))?;
                Ok(ty)
            }
            Expr::This => {
                if self.method.is_static() {
                    return Err(CompileError::unsupported("`this` in a static method"));
                }
                self.emit(Instruction::Load {
                    slot: 0,
                    kind: ValueKind::Reference,
                });
                Ok(self.this.clone())
            }
            Expr::Field(field) => {
                let is_static = match &field.object {
                    Some(object) => {
                        self.gen_expr(object)?;
                        false
                    }
                    None => true,
                };
                self.emit_checked(Instruction::get_field(&field.owner, &field.name, &field.ty, is_static))?;
                Ok(field.ty.clone())
            }
            Expr::ArrayIndex { array, index, elem } => {
                self.gen_expr(array)?;
                self.gen_expr(index)?;
                self.emit_checked(Instruction::array_load(elem))?;
                Ok(elem.clone())
            }
            Expr::ArrayLength(array) => {
                self.gen_expr(array)?;
                self.emit(Instruction::ArrayLength);
                Ok(Type::INT)
            }
            Expr::Invoke(invocation) => self.gen_invocation(invocation),
            Expr::New { class, ctor, args } => {
                self.emit_checked(Instruction::new_object(class))?;
                self.emit(Instruction::Dup { size: 1 });
                for arg in args {
                    self.gen_expr(arg)?;
                }
                let init = FunctionType::new(ctor.clone(), Type::VOID);
                self.emit(Instruction::invoke(class, "<init>", &init, InvokeMode::Special));
                Ok(class.clone())
            }
            Expr::NewArray { ty, dims } => {
                let elem = match ty {
                    Type::Array(elem) => elem.as_ref(),
                    other => return Err(CompileError::unsupported(format!("new array of non-array {:?}", other))),
                };
                for dim in dims {
                    self.gen_expr(dim)?;
                }
                match dims.len() {
                    0 => return Err(CompileError::unsupported("array creation without a length")),
                    1 => self.emit_checked(Instruction::new_array(elem))?,
                    n => self.emit_checked(Instruction::multi_new_array(ty, n))?,
                }
                Ok(ty.clone())
            }
            Expr::Unary {
                op: UnaryOp::Neg,
                operand,
                ty,
            } => {
                self.gen_expr(operand)?;
                self.emit_checked(Instruction::neg(ty))?;
                Ok(ty.clone())
            }
            Expr::Unary { op: UnaryOp::Not, .. } => self.gen_boolean_value(expr),
            Expr::Binary { op, .. } if op.is_comparison() || op.is_logical() => self.gen_boolean_value(expr),
            Expr::Binary { op, left, right, ty } => {
                self.gen_expr(left)?;
                self.gen_expr(right)?;
                self.emit_checked(Instruction::arith(arith_op(*op)?, ty))?;
                Ok(ty.clone())
            }
            Expr::InstanceOf { value, ty } => {
                self.gen_expr(value)?;
                self.emit_checked(Instruction::instance_of(ty))?;
                Ok(Type::BOOLEAN)
            }
            Expr::Cast { value, ty } => {
                let from = self.gen_expr(value)?;
                if from.as_primitive().is_some() && ty.as_primitive().is_some() {
                    if from != *ty {
                        self.emit_checked(Instruction::conversion(&from, ty))?;
                    }
                } else {
                    self.emit_checked(Instruction::check_cast(ty))?;
                }
                Ok(ty.clone())
            }
            Expr::Convert { value, from, to } => {
                self.gen_expr(value)?;
                if from != to {
                    self.emit_checked(Instruction::conversion(from, to))?;
                }
                Ok(to.clone())
            }
            // The handler entry already holds the thrown value.
            Expr::CaughtException(ty) => Ok(ty.clone()),
        }
    }

    fn gen_literal(&mut self, literal: &Literal) -> Result<(), CompileError> {
        let constant = match literal {
            Literal::Boolean(value) => Constant::Int(i32::from(*value)),
            Literal::Char(value) => Constant::Int(i32::from(*value)),
            Literal::Byte(value) => Constant::Int(i32::from(*value)),
            Literal::Short(value) => Constant::Int(i32::from(*value)),
            Literal::Int(value) => Constant::Int(*value),
            Literal::Long(value) => Constant::Long(*value),
            Literal::Float(value) => Constant::Float(*value),
            Literal::Double(value) => Constant::Double(*value),
            Literal::String(value) => Constant::String(value.clone()),
            Literal::Class(Type::Primitive(p)) => {
                // `int.class` and friends live in the wrapper's TYPE field.
                let wrapper = Type::class(wrapper_class(*p));
                return self.emit_checked(Instruction::get_field(&wrapper, "TYPE", &literal.ty(), true));
            }
            Literal::Class(ty) => Constant::Class(ty.erasure()),
            Literal::Null => Constant::Null,
        };
        self.emit(Instruction::LoadConst(constant));
        Ok(())
    }

    fn gen_invocation(&mut self, invocation: &Invocation) -> Result<Type, CompileError> {
        match (&invocation.receiver, invocation.mode) {
            (Some(_), InvokeMode::Static) => {
                return Err(CompileError::unsupported(format!(
                    "static call to {} with a receiver",
                    invocation.name
                )))
            }
            (None, mode) if mode != InvokeMode::Static => {
                return Err(CompileError::unsupported(format!(
                    "{:?} call to {} without a receiver",
                    mode, invocation.name
                )))
            }
            _ => {}
        }
        if invocation.args.len() != invocation.ty.params.len() {
            return Err(CompileError::unsupported(format!(
                "{} takes {} arguments, {} given",
                invocation.name,
                invocation.ty.params.len(),
                invocation.args.len()
            )));
        }
        if let Some(receiver) = &invocation.receiver {
            self.gen_expr(receiver)?;
        }
        for arg in &invocation.args {
            self.gen_expr(arg)?;
        }
        self.emit(Instruction::invoke(
            &invocation.owner,
            &invocation.name,
            &invocation.ty,
            invocation.mode,
        ));
        Ok(invocation.ty.ret.as_ref().clone())
    }

    /// Materialize a condition as 0 or 1.
    fn gen_boolean_value(&mut self, expr: &Expr) -> Result<Type, CompileError> {
        let on_false = self.new_label();
        let end = self.new_label();
        self.gen_condition(expr, &on_false, false)?;
        self.emit(Instruction::int(1));
        self.emit(Instruction::goto(end.clone()));
        self.emit(Instruction::Label(on_false));
        self.emit(Instruction::int(0));
        self.emit(Instruction::Label(end));
        Ok(Type::BOOLEAN)
    }

    /// Jump to `target` when `expr` evaluates to `jump_on_true`, fall
    /// through otherwise. `&&` and `||` never evaluate their right side
    /// when the left side decides.
    fn gen_condition(&mut self, expr: &Expr, target: &Label, jump_on_true: bool) -> Result<(), CompileError> {
        match expr {
            Expr::Literal(Literal::Boolean(value)) => {
                if *value == jump_on_true {
                    self.emit(Instruction::goto(target.clone()));
                }
                Ok(())
            }
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
                ..
            } => self.gen_condition(operand, target, !jump_on_true),
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
                ..
            } => {
                if jump_on_true {
                    let skip = self.new_label();
                    self.gen_condition(left, &skip, false)?;
                    self.gen_condition(right, target, true)?;
                    self.emit(Instruction::Label(skip));
                } else {
                    self.gen_condition(left, target, false)?;
                    self.gen_condition(right, target, false)?;
                }
                Ok(())
            }
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
                ..
            } => {
                if jump_on_true {
                    self.gen_condition(left, target, true)?;
                    self.gen_condition(right, target, true)?;
                } else {
                    let skip = self.new_label();
                    self.gen_condition(left, &skip, true)?;
                    self.gen_condition(right, target, false)?;
                    self.emit(Instruction::Label(skip));
                }
                Ok(())
            }
            Expr::Binary { op, left, right, ty } if op.is_comparison() => {
                let cond = compare_cond(*op)?;
                let branch_cond = if jump_on_true { cond } else { cond.negate() };
                self.gen_expr(left)?;
                self.gen_expr(right)?;
                let kind = ValueKind::of(ty).map_err(|source| CompileError::Instruction {
                    index: self.instructions.len(),
                    source,
                })?;
                match kind {
                    ValueKind::Int | ValueKind::Reference => {
                        self.emit_checked(Instruction::if_cmp(ty, branch_cond, target.clone()))
                    }
                    ValueKind::Long | ValueKind::Float | ValueKind::Double => {
                        // NaN handling follows the source operator, not the negated branch.
                        self.emit_checked(Instruction::compare(ty, cond))?;
                        self.emit(Instruction::if_zero(branch_cond, target.clone()));
                        Ok(())
                    }
                }
            }
            other => {
                let ty = self.gen_expr(other)?;
                if !ty.as_primitive().is_some_and(PrimitiveType::is_int_like) {
                    return Err(CompileError::unsupported(format!("condition of type {:?}", ty)));
                }
                let cond = if jump_on_true { Cond::Ne } else { Cond::Eq };
                self.emit(Instruction::if_zero(cond, target.clone()));
                Ok(())
            }
        }
    }
}

fn arith_op(op: BinaryOp) -> Result<ArithOp, CompileError> {
    Ok(match op {
        BinaryOp::Add => ArithOp::Add,
        BinaryOp::Sub => ArithOp::Sub,
        BinaryOp::Mul => ArithOp::Mul,
        BinaryOp::Div => ArithOp::Div,
        BinaryOp::Rem => ArithOp::Rem,
        BinaryOp::Shl => ArithOp::Shl,
        BinaryOp::Shr => ArithOp::Shr,
        BinaryOp::Ushr => ArithOp::Ushr,
        BinaryOp::BitAnd => ArithOp::And,
        BinaryOp::BitOr => ArithOp::Or,
        BinaryOp::BitXor => ArithOp::Xor,
        other => return Err(CompileError::unsupported(format!("{:?} is not arithmetic", other))),
    })
}

fn compare_cond(op: BinaryOp) -> Result<Cond, CompileError> {
    Ok(match op {
        BinaryOp::Eq => Cond::Eq,
        BinaryOp::Ne => Cond::Ne,
        BinaryOp::Lt => Cond::Lt,
        BinaryOp::Le => Cond::Le,
        BinaryOp::Gt => Cond::Gt,
        BinaryOp::Ge => Cond::Ge,
        other => return Err(CompileError::unsupported(format!("{:?} is not a comparison", other))),
    })
}

fn wrapper_class(p: PrimitiveType) -> &'static str {
    match p {
        PrimitiveType::Boolean => "java/lang/Boolean",
        PrimitiveType::Byte => "java/lang/Byte",
        PrimitiveType::Char => "java/lang/Character",
        PrimitiveType::Short => "java/lang/Short",
        PrimitiveType::Int => "java/lang/Integer",
        PrimitiveType::Long => "java/lang/Long",
        PrimitiveType::Float => "java/lang/Float",
        PrimitiveType::Double => "java/lang/Double",
        PrimitiveType::Void => "java/lang/Void",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code_attribute::{BranchKind, Branch};
    use crate::method_info::MethodAccessFlags;
    use pretty_assertions::assert_eq;

    fn method(params: Vec<Local>, return_ty: Type, locals: Vec<Local>, stmts: Vec<Stmt>) -> Method {
        Method {
            name: "m".into(),
            flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            type_params: Vec::new(),
            params,
            return_ty,
            exceptions: Vec::new(),
            body: Some(Body {
                locals,
                stmts,
                traps: Vec::new(),
            }),
        }
    }

    fn lower(m: &Method) -> Result<MethodCode, CompileError> {
        lower_method(&Type::class("pkg/Owner"), m)
    }

    #[test]
    fn test_return_sum_is_not_folded() {
        let m = method(
            Vec::new(),
            Type::INT,
            Vec::new(),
            vec![Stmt::Return(Some(Expr::binary(
                BinaryOp::Add,
                Expr::int(1),
                Expr::int(2),
                Type::INT,
            )))],
        );
        let code = lower(&m).unwrap();
        assert_eq!(
            code.instructions,
            vec![
                Instruction::int(1),
                Instruction::int(2),
                Instruction::Arith {
                    op: ArithOp::Add,
                    kind: ValueKind::Int
                },
                Instruction::Return(Some(ValueKind::Int)),
            ]
        );
    }

    #[test]
    fn test_slots_follow_parameter_widths() {
        let mut m = method(
            vec![Local::new("a", Type::LONG), Local::new("b", Type::INT)],
            Type::VOID,
            vec![Local::new("c", Type::DOUBLE)],
            vec![Stmt::Assign {
                target: Place::Local("c".into()),
                value: Expr::Convert {
                    value: Box::new(Expr::local("b")),
                    from: Type::INT,
                    to: Type::DOUBLE,
                },
            }],
        );
        m.flags = MethodAccessFlags::PUBLIC;
        let code = lower(&m).unwrap();
        assert_eq!(code.min_locals, 4);
        assert_eq!(
            code.instructions,
            vec![
                Instruction::Load {
                    slot: 3,
                    kind: ValueKind::Int
                },
                Instruction::Conversion {
                    from: PrimitiveType::Int,
                    to: PrimitiveType::Double
                },
                Instruction::Store {
                    slot: 4,
                    kind: ValueKind::Double
                },
                Instruction::Return(None),
            ]
        );
    }

    #[test]
    fn test_void_return_appended_once() {
        let m = method(Vec::new(), Type::VOID, Vec::new(), vec![Stmt::Return(None)]);
        assert_eq!(lower(&m).unwrap().instructions, vec![Instruction::Return(None)]);

        let m = method(Vec::new(), Type::VOID, Vec::new(), vec![Stmt::Label("end".into())]);
        assert_eq!(
            lower(&m).unwrap().instructions,
            vec![Instruction::label("end"), Instruction::Return(None)]
        );

        let m = method(
            vec![Local::new("e", Type::class("java/lang/Throwable"))],
            Type::VOID,
            Vec::new(),
            vec![Stmt::Throw(Expr::local("e"))],
        );
        assert_eq!(
            lower(&m).unwrap().instructions,
            vec![
                Instruction::Load {
                    slot: 0,
                    kind: ValueKind::Reference
                },
                Instruction::Throw,
                Instruction::Return(None),
            ]
        );

        let m = method(Vec::new(), Type::VOID, Vec::new(), Vec::new());
        assert!(lower(&m).unwrap().instructions.is_empty());
    }

    #[test]
    fn test_short_circuit_and_branches() {
        let cond = Expr::binary(
            BinaryOp::And,
            Expr::binary(BinaryOp::Lt, Expr::local("x"), Expr::int(10), Type::INT),
            Expr::binary(BinaryOp::Ne, Expr::local("x"), Expr::int(3), Type::INT),
            Type::BOOLEAN,
        );
        let m = method(
            vec![Local::new("x", Type::INT)],
            Type::VOID,
            Vec::new(),
            vec![
                Stmt::If {
                    cond,
                    target: "yes".into(),
                },
                Stmt::Label("yes".into()),
            ],
        );
        let code = lower(&m).unwrap();
        let load_x = Instruction::Load {
            slot: 0,
            kind: ValueKind::Int,
        };
        assert_eq!(
            code.instructions,
            vec![
                load_x.clone(),
                Instruction::int(10),
                Instruction::Branch(Branch {
                    kind: BranchKind::IfCmp(ValueKind::Int, Cond::Ge),
                    target: Label::new("#0"),
                }),
                load_x,
                Instruction::int(3),
                Instruction::Branch(Branch {
                    kind: BranchKind::IfCmp(ValueKind::Int, Cond::Ne),
                    target: Label::new("yes"),
                }),
                Instruction::label("#0"),
                Instruction::label("yes"),
                Instruction::Return(None),
            ]
        );
    }

    #[test]
    fn test_float_less_than_uses_cmpg() {
        let m = method(
            vec![Local::new("f", Type::FLOAT)],
            Type::BOOLEAN,
            Vec::new(),
            vec![Stmt::Return(Some(Expr::binary(
                BinaryOp::Lt,
                Expr::local("f"),
                Expr::Literal(Literal::Float(0.5)),
                Type::FLOAT,
            )))],
        );
        let code = lower(&m).unwrap();
        assert!(code.instructions.contains(&Instruction::Compare {
            kind: ValueKind::Float,
            nan_greater: true
        }));
        assert!(code.instructions.contains(&Instruction::if_zero(Cond::Ge, Label::new("#0"))));
    }

    #[test]
    fn test_new_object_sequence() {
        let sb = Type::class("java/lang/StringBuilder");
        let m = method(
            Vec::new(),
            sb.clone(),
            Vec::new(),
            vec![Stmt::Return(Some(Expr::New {
                class: sb.clone(),
                ctor: vec![Type::INT],
                args: vec![Expr::int(16)],
            }))],
        );
        let code = lower(&m).unwrap();
        assert_eq!(code.instructions[0], Instruction::New(sb.clone()));
        assert_eq!(code.instructions[1], Instruction::Dup { size: 1 });
        assert_eq!(
            code.instructions[3],
            Instruction::invoke(
                &sb,
                "<init>",
                &FunctionType::new(vec![Type::INT], Type::VOID),
                InvokeMode::Special
            )
        );
    }

    #[test]
    fn test_traps_resolve_to_indices() {
        let mut m = method(
            Vec::new(),
            Type::VOID,
            vec![Local::new("e", Type::class("java/lang/Exception"))],
            vec![
                Stmt::Label("try".into()),
                Stmt::Eval(Expr::Invoke(Invocation {
                    owner: Type::class("pkg/Owner"),
                    name: "risky".into(),
                    ty: FunctionType::new(Vec::new(), Type::INT),
                    mode: InvokeMode::Static,
                    receiver: None,
                    args: Vec::new(),
                })),
                Stmt::Label("end".into()),
                Stmt::Return(None),
                Stmt::Label("catch".into()),
                Stmt::Assign {
                    target: Place::Local("e".into()),
                    value: Expr::CaughtException(Type::class("java/lang/Exception")),
                },
                Stmt::Return(None),
            ],
        );
        if let Some(body) = m.body.as_mut() {
            body.traps.push(Trap {
                start: "try".into(),
                end: "end".into(),
                handler: "catch".into(),
                catch_type: Some(Type::class("java/lang/Exception")),
            });
        }
        let code = lower(&m).unwrap();
        assert_eq!(code.handlers.len(), 1);
        assert_eq!(code.handlers[0].start, 0);
        assert_eq!(code.handlers[0].end, 3);
        assert_eq!(code.handlers[0].target, Label::new("catch"));
        assert_eq!(
            code.instructions[2],
            Instruction::Pop { size: 1 }
        );
    }

    #[test]
    fn test_inconsistent_input_is_rejected() {
        let m = method(Vec::new(), Type::VOID, Vec::new(), vec![Stmt::Goto("nowhere".into())]);
        assert!(matches!(lower(&m), Err(CompileError::UnsupportedIr(_))));

        let m = method(
            Vec::new(),
            Type::VOID,
            Vec::new(),
            vec![Stmt::Label("a".into()), Stmt::Label("a".into())],
        );
        assert!(matches!(lower(&m), Err(CompileError::UnsupportedIr(_))));

        let m = method(Vec::new(), Type::INT, Vec::new(), vec![Stmt::Return(None)]);
        assert!(matches!(lower(&m), Err(CompileError::UnsupportedIr(_))));

        let m = method(
            Vec::new(),
            Type::INT,
            Vec::new(),
            vec![Stmt::Return(Some(Expr::local("missing")))],
        );
        assert!(matches!(lower(&m), Err(CompileError::UnsupportedIr(_))));
    }

    #[test]
    fn test_bad_operands_report_instruction_index() {
        let m = method(
            vec![Local::new("s", Type::string())],
            Type::string(),
            Vec::new(),
            vec![Stmt::Return(Some(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(Expr::local("s")),
                ty: Type::string(),
            }))],
        );
        match lower(&m) {
            Err(CompileError::Instruction { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
