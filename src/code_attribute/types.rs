use std::fmt;

use thiserror::Error;

use crate::descriptor::{FunctionType, PrimitiveType, Type};

/// Construction-time rejection of an operand combination no opcode covers.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum InstructionError {
    #[error("no value kind for {0:?}")]
    NoValueKind(Type),
    #[error("{0:?} compare needs a long, float or double operand")]
    CompareKind(ValueKind),
    #[error("{op:?} is not defined on {kind:?}")]
    ArithKind { op: ArithOp, kind: ValueKind },
    #[error("two-operand branch on {kind:?} cannot test {cond:?}")]
    IfCmpKind { kind: ValueKind, cond: Cond },
    #[error("no conversion from {from:?} to {to:?}")]
    Conversion { from: Type, to: Type },
    #[error("iinc delta {0} does not fit in 16 bits")]
    IincRange(i32),
    #[error("{0:?} is not a class type")]
    NotAClass(Type),
    #[error("cannot create {dims}-dimensional {ty:?}")]
    Dimensions { ty: Type, dims: usize },
    #[error("duplicate switch key {0}")]
    DuplicateCase(i32),
}

/// A label name, unique within one method.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Label(name.into())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The five computational categories opcode families are keyed by.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ValueKind {
    pub fn of(ty: &Type) -> Result<ValueKind, InstructionError> {
        match ty {
            Type::Primitive(PrimitiveType::Void) | Type::Function(_) => Err(InstructionError::NoValueKind(ty.clone())),
            Type::Primitive(PrimitiveType::Long) => Ok(ValueKind::Long),
            Type::Primitive(PrimitiveType::Float) => Ok(ValueKind::Float),
            Type::Primitive(PrimitiveType::Double) => Ok(ValueKind::Double),
            Type::Primitive(_) => Ok(ValueKind::Int),
            Type::Class(_) | Type::Array(_) | Type::TypeVar(_) | Type::Null => Ok(ValueKind::Reference),
        }
    }

    pub fn slot_size(self) -> u16 {
        match self {
            ValueKind::Long | ValueKind::Double => 2,
            _ => 1,
        }
    }

    /// Offset of this kind within a typed opcode family (`iload`, `lload`, …).
    pub(crate) fn family_index(self) -> u8 {
        match self {
            ValueKind::Int => 0,
            ValueKind::Long => 1,
            ValueKind::Float => 2,
            ValueKind::Double => 3,
            ValueKind::Reference => 4,
        }
    }

    pub fn is_floating(self) -> bool {
        matches!(self, ValueKind::Float | ValueKind::Double)
    }
}

/// A literal pushed by `LoadConst`. Floating values compare by bit pattern.
#[derive(Clone, Debug)]
pub enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    /// A class literal; arrays are allowed.
    Class(Type),
    Null,
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Long(a), Constant::Long(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            (Constant::Class(a), Constant::Class(b)) => a == b,
            (Constant::Null, Constant::Null) => true,
            _ => false,
        }
    }
}

impl Constant {
    pub fn kind(&self) -> ValueKind {
        match self {
            Constant::Int(_) => ValueKind::Int,
            Constant::Long(_) => ValueKind::Long,
            Constant::Float(_) => ValueKind::Float,
            Constant::Double(_) => ValueKind::Double,
            Constant::String(_) | Constant::Class(_) | Constant::Null => ValueKind::Reference,
        }
    }

    /// The literal negated, or `None` if it has no representable negation
    /// (non-numeric, or the minimum int/long).
    pub fn negated(&self) -> Option<Constant> {
        match self {
            Constant::Int(v) => v.checked_neg().map(Constant::Int),
            Constant::Long(v) => v.checked_neg().map(Constant::Long),
            Constant::Float(v) => Some(Constant::Float(-v)),
            Constant::Double(v) => Some(Constant::Double(-v)),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

impl ArithOp {
    pub fn is_shift(self) -> bool {
        matches!(self, ArithOp::Shl | ArithOp::Shr | ArithOp::Ushr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, ArithOp::And | ArithOp::Or | ArithOp::Xor) || self.is_shift()
    }
}

/// Branch condition, in opcode order (`ifeq` … `ifle`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Cond {
    pub fn negate(self) -> Cond {
        match self {
            Cond::Eq => Cond::Ne,
            Cond::Ne => Cond::Eq,
            Cond::Lt => Cond::Ge,
            Cond::Ge => Cond::Lt,
            Cond::Gt => Cond::Le,
            Cond::Le => Cond::Gt,
        }
    }

    pub(crate) fn opcode_offset(self) -> u8 {
        match self {
            Cond::Eq => 0,
            Cond::Ne => 1,
            Cond::Lt => 2,
            Cond::Ge => 3,
            Cond::Gt => 4,
            Cond::Le => 5,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum InvokeMode {
    Static,
    Virtual,
    Special,
    Interface,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BranchKind {
    Goto,
    /// Compare the top int against zero.
    If(Cond),
    /// Compare the top two values; `Int` or `Reference` (Eq/Ne only).
    IfCmp(ValueKind, Cond),
    IfNull,
    IfNonNull,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Branch {
    pub kind: BranchKind,
    pub target: Label,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SwitchForm {
    /// `tableswitch` covering `low..=high`.
    Table { low: i32, high: i32 },
    /// `lookupswitch` over the sorted keys.
    Lookup,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Switch {
    pub default: Label,
    /// Sorted by key, keys unique.
    pub cases: Vec<(i32, Label)>,
    pub form: SwitchForm,
}

impl Switch {
    pub fn new(default: Label, mut cases: Vec<(i32, Label)>) -> Result<Switch, InstructionError> {
        cases.sort_by_key(|(key, _)| *key);
        if let Some(pair) = cases.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(InstructionError::DuplicateCase(pair[0].0));
        }
        let form = match (cases.first(), cases.last()) {
            (Some(&(low, _)), Some(&(high, _))) => {
                let span = i64::from(high) - i64::from(low) + 1;
                let table_cost = 4 + 4 * span;
                let lookup_cost = 8 * cases.len() as i64;
                if table_cost <= lookup_cost {
                    SwitchForm::Table { low, high }
                } else {
                    SwitchForm::Lookup
                }
            }
            _ => SwitchForm::Lookup,
        };
        Ok(Switch { default, cases, form })
    }

    /// Target for `key`, falling back to the default label.
    pub fn target(&self, key: i32) -> &Label {
        self.cases
            .binary_search_by_key(&key, |(k, _)| *k)
            .map(|pos| &self.cases[pos].1)
            .unwrap_or(&self.default)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: Type,
    pub name: String,
    pub ty: Type,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: Type,
    pub name: String,
    pub ty: FunctionType,
}

/// One semantic instruction. Operand-specific opcode selection happens at
/// encode time, so the same `Load` may become `iload_1` or `wide iload`.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Zero-size marker binding a name to the position of the next instruction.
    Label(Label),
    Load { slot: u16, kind: ValueKind },
    Store { slot: u16, kind: ValueKind },
    Iinc { slot: u16, delta: i16 },
    LoadConst(Constant),
    Arith { op: ArithOp, kind: ValueKind },
    Neg(ValueKind),
    Conversion { from: PrimitiveType, to: PrimitiveType },
    /// `lcmp`, or `fcmp<l|g>` / `dcmp<l|g>`; `nan_greater` picks the `g` form.
    Compare { kind: ValueKind, nan_greater: bool },
    Branch(Branch),
    Switch(Switch),
    Dup { size: u16 },
    Pop { size: u16 },
    New(Type),
    /// One-dimensional array of the given element type.
    NewArray(Type),
    /// `ty` is the full array type; `dims` counts are popped.
    MultiNewArray { ty: Type, dims: u8 },
    ArrayLength,
    ArrayLoad(Type),
    ArrayStore(Type),
    CheckCast(Type),
    InstanceOf(Type),
    GetField { field: FieldRef, is_static: bool },
    PutField { field: FieldRef, is_static: bool },
    Invoke { method: MethodRef, mode: InvokeMode },
    Return(Option<ValueKind>),
    Throw,
    MonitorEnter,
    MonitorExit,
    Nop,
}

impl Instruction {
    pub fn label(name: impl Into<String>) -> Instruction {
        Instruction::Label(Label::new(name))
    }

    pub fn load(slot: u16, ty: &Type) -> Result<Instruction, InstructionError> {
        Ok(Instruction::Load {
            slot,
            kind: ValueKind::of(ty)?,
        })
    }

    pub fn store(slot: u16, ty: &Type) -> Result<Instruction, InstructionError> {
        Ok(Instruction::Store {
            slot,
            kind: ValueKind::of(ty)?,
        })
    }

    pub fn iinc(slot: u16, delta: i32) -> Result<Instruction, InstructionError> {
        let delta = i16::try_from(delta).map_err(|_| InstructionError::IincRange(delta))?;
        Ok(Instruction::Iinc { slot, delta })
    }

    pub fn int(value: i32) -> Instruction {
        Instruction::LoadConst(Constant::Int(value))
    }

    pub fn arith(op: ArithOp, ty: &Type) -> Result<Instruction, InstructionError> {
        let kind = ValueKind::of(ty)?;
        match kind {
            ValueKind::Reference => return Err(InstructionError::ArithKind { op, kind }),
            ValueKind::Float | ValueKind::Double if op.is_bitwise() => {
                return Err(InstructionError::ArithKind { op, kind })
            }
            _ => {}
        }
        Ok(Instruction::Arith { op, kind })
    }

    pub fn neg(ty: &Type) -> Result<Instruction, InstructionError> {
        match ValueKind::of(ty)? {
            ValueKind::Reference => Err(InstructionError::NoValueKind(ty.clone())),
            kind => Ok(Instruction::Neg(kind)),
        }
    }

    /// Primitive conversion. Boolean and void take no part in conversions.
    pub fn conversion(from: &Type, to: &Type) -> Result<Instruction, InstructionError> {
        let reject = || InstructionError::Conversion {
            from: from.clone(),
            to: to.clone(),
        };
        match (from.as_primitive(), to.as_primitive()) {
            (Some(f), Some(t))
                if !matches!(f, PrimitiveType::Boolean | PrimitiveType::Void)
                    && !matches!(t, PrimitiveType::Boolean | PrimitiveType::Void) =>
            {
                Ok(Instruction::Conversion { from: f, to: t })
            }
            _ => Err(reject()),
        }
    }

    /// Three-way compare feeding an `If` for `cond`. Floating `<`/`<=` use
    /// the `g` variant so that NaN makes the test fail.
    pub fn compare(ty: &Type, cond: Cond) -> Result<Instruction, InstructionError> {
        let kind = ValueKind::of(ty)?;
        match kind {
            ValueKind::Long | ValueKind::Float | ValueKind::Double => Ok(Instruction::Compare {
                kind,
                nan_greater: kind.is_floating() && matches!(cond, Cond::Lt | Cond::Le),
            }),
            _ => Err(InstructionError::CompareKind(kind)),
        }
    }

    pub fn goto(target: Label) -> Instruction {
        Instruction::Branch(Branch {
            kind: BranchKind::Goto,
            target,
        })
    }

    pub fn if_zero(cond: Cond, target: Label) -> Instruction {
        Instruction::Branch(Branch {
            kind: BranchKind::If(cond),
            target,
        })
    }

    pub fn if_cmp(ty: &Type, cond: Cond, target: Label) -> Result<Instruction, InstructionError> {
        let kind = ValueKind::of(ty)?;
        match kind {
            ValueKind::Int => {}
            ValueKind::Reference if matches!(cond, Cond::Eq | Cond::Ne) => {}
            _ => return Err(InstructionError::IfCmpKind { kind, cond }),
        }
        Ok(Instruction::Branch(Branch {
            kind: BranchKind::IfCmp(kind, cond),
            target,
        }))
    }

    pub fn if_null(target: Label) -> Instruction {
        Instruction::Branch(Branch {
            kind: BranchKind::IfNull,
            target,
        })
    }

    pub fn if_non_null(target: Label) -> Instruction {
        Instruction::Branch(Branch {
            kind: BranchKind::IfNonNull,
            target,
        })
    }

    pub fn switch(default: Label, cases: Vec<(i32, Label)>) -> Result<Instruction, InstructionError> {
        Ok(Instruction::Switch(Switch::new(default, cases)?))
    }

    pub fn dup(ty: &Type) -> Result<Instruction, InstructionError> {
        Ok(Instruction::Dup {
            size: ValueKind::of(ty)?.slot_size(),
        })
    }

    pub fn pop(ty: &Type) -> Result<Instruction, InstructionError> {
        Ok(Instruction::Pop {
            size: ValueKind::of(ty)?.slot_size(),
        })
    }

    pub fn new_object(ty: &Type) -> Result<Instruction, InstructionError> {
        match ty {
            Type::Class(_) => Ok(Instruction::New(ty.erasure())),
            _ => Err(InstructionError::NotAClass(ty.clone())),
        }
    }

    pub fn new_array(elem: &Type) -> Result<Instruction, InstructionError> {
        ValueKind::of(elem)?;
        Ok(Instruction::NewArray(elem.erasure()))
    }

    /// `dims` leading dimensions of `ty` get allocated; `ty` must have at
    /// least that many.
    pub fn multi_new_array(ty: &Type, dims: usize) -> Result<Instruction, InstructionError> {
        let mut depth = 0;
        let mut cursor = ty;
        while let Type::Array(elem) = cursor {
            depth += 1;
            cursor = elem;
        }
        if dims == 0 || dims > depth || dims > usize::from(u8::MAX) {
            return Err(InstructionError::Dimensions { ty: ty.clone(), dims });
        }
        Ok(Instruction::MultiNewArray {
            ty: ty.erasure(),
            dims: dims as u8,
        })
    }

    pub fn array_load(elem: &Type) -> Result<Instruction, InstructionError> {
        ValueKind::of(elem)?;
        Ok(Instruction::ArrayLoad(elem.erasure()))
    }

    pub fn array_store(elem: &Type) -> Result<Instruction, InstructionError> {
        ValueKind::of(elem)?;
        Ok(Instruction::ArrayStore(elem.erasure()))
    }

    pub fn check_cast(ty: &Type) -> Result<Instruction, InstructionError> {
        match ValueKind::of(ty)? {
            ValueKind::Reference => Ok(Instruction::CheckCast(ty.erasure())),
            _ => Err(InstructionError::NotAClass(ty.clone())),
        }
    }

    pub fn instance_of(ty: &Type) -> Result<Instruction, InstructionError> {
        match ValueKind::of(ty)? {
            ValueKind::Reference => Ok(Instruction::InstanceOf(ty.erasure())),
            _ => Err(InstructionError::NotAClass(ty.clone())),
        }
    }

    pub fn get_field(owner: &Type, name: &str, ty: &Type, is_static: bool) -> Result<Instruction, InstructionError> {
        ValueKind::of(ty)?;
        Ok(Instruction::GetField {
            field: FieldRef {
                owner: owner.erasure(),
                name: name.to_string(),
                ty: ty.erasure(),
            },
            is_static,
        })
    }

    pub fn put_field(owner: &Type, name: &str, ty: &Type, is_static: bool) -> Result<Instruction, InstructionError> {
        ValueKind::of(ty)?;
        Ok(Instruction::PutField {
            field: FieldRef {
                owner: owner.erasure(),
                name: name.to_string(),
                ty: ty.erasure(),
            },
            is_static,
        })
    }

    pub fn invoke(owner: &Type, name: &str, ty: &FunctionType, mode: InvokeMode) -> Instruction {
        Instruction::Invoke {
            method: MethodRef {
                owner: owner.erasure(),
                name: name.to_string(),
                ty: ty.erasure(),
            },
            mode,
        }
    }

    /// Return of a value of type `ty`; void gives the plain `return`.
    pub fn ret(ty: &Type) -> Result<Instruction, InstructionError> {
        if ty.is_void() {
            return Ok(Instruction::Return(None));
        }
        Ok(Instruction::Return(Some(ValueKind::of(ty)?)))
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }

    /// Local slot read or written, with the width of the value.
    pub fn local_access(&self) -> Option<(u16, u16)> {
        match self {
            Instruction::Load { slot, kind } | Instruction::Store { slot, kind } => Some((*slot, kind.slot_size())),
            Instruction::Iinc { slot, .. } => Some((*slot, 1)),
            _ => None,
        }
    }
}

/// A protected range over instruction indices, `end` exclusive.
#[derive(Clone, Debug, PartialEq)]
pub struct Handler {
    pub start: usize,
    pub end: usize,
    pub target: Label,
    /// `None` catches everything.
    pub catch_type: Option<Type>,
}

/// A lowered method body ready for optimization and assembly.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodCode {
    pub instructions: Vec<Instruction>,
    pub handlers: Vec<Handler>,
    /// Receiver plus parameter slots; the floor for `max_locals`.
    pub min_locals: u16,
}

impl MethodCode {
    pub fn new(instructions: Vec<Instruction>, handlers: Vec<Handler>, is_static: bool, params: &[Type]) -> Self {
        let receiver = if is_static { 0 } else { 1 };
        MethodCode {
            instructions,
            handlers,
            min_locals: receiver + params.iter().map(Type::slot_size).sum::<u16>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn l(name: &str) -> Label {
        Label::new(name)
    }

    #[test]
    fn test_switch_form_selection() {
        let dense = Switch::new(l("d"), vec![(2, l("c")), (0, l("a")), (1, l("b"))]).unwrap();
        assert_eq!(dense.form, SwitchForm::Table { low: 0, high: 2 });
        assert_eq!(dense.cases[0].0, 0);

        let sparse = Switch::new(l("d"), vec![(0, l("a")), (1000, l("b"))]).unwrap();
        assert_eq!(sparse.form, SwitchForm::Lookup);

        let extreme = Switch::new(l("d"), vec![(i32::MIN, l("a")), (i32::MAX, l("b"))]).unwrap();
        assert_eq!(extreme.form, SwitchForm::Lookup);
    }

    #[test]
    fn test_switch_rejects_duplicates() {
        let err = Switch::new(l("d"), vec![(3, l("a")), (3, l("b"))]).unwrap_err();
        assert_eq!(err, InstructionError::DuplicateCase(3));
    }

    #[test]
    fn test_switch_target() {
        let sw = Switch::new(l("d"), vec![(1, l("one")), (5, l("five"))]).unwrap();
        assert_eq!(sw.target(5), &l("five"));
        assert_eq!(sw.target(2), &l("d"));
    }

    #[test]
    fn test_compare_domain() {
        assert!(matches!(
            Instruction::compare(&Type::INT, Cond::Lt),
            Err(InstructionError::CompareKind(ValueKind::Int))
        ));
        assert_eq!(
            Instruction::compare(&Type::FLOAT, Cond::Lt).unwrap(),
            Instruction::Compare {
                kind: ValueKind::Float,
                nan_greater: true
            }
        );
        assert_eq!(
            Instruction::compare(&Type::DOUBLE, Cond::Gt).unwrap(),
            Instruction::Compare {
                kind: ValueKind::Double,
                nan_greater: false
            }
        );
    }

    #[test]
    fn test_arith_domain() {
        assert!(Instruction::arith(ArithOp::Xor, &Type::FLOAT).is_err());
        assert!(Instruction::arith(ArithOp::Add, &Type::string()).is_err());
        assert!(Instruction::arith(ArithOp::Shl, &Type::LONG).is_ok());
    }

    #[test]
    fn test_if_cmp_domain() {
        assert!(Instruction::if_cmp(&Type::string(), Cond::Lt, l("x")).is_err());
        assert!(Instruction::if_cmp(&Type::LONG, Cond::Eq, l("x")).is_err());
        assert!(Instruction::if_cmp(&Type::string(), Cond::Ne, l("x")).is_ok());
    }

    #[test]
    fn test_multi_new_array_dims() {
        let grid = Type::array(Type::array(Type::INT));
        assert!(Instruction::multi_new_array(&grid, 2).is_ok());
        assert!(Instruction::multi_new_array(&grid, 1).is_ok());
        assert!(Instruction::multi_new_array(&grid, 3).is_err());
        assert!(Instruction::multi_new_array(&grid, 0).is_err());
    }

    #[test]
    fn test_conversion_domain() {
        assert!(Instruction::conversion(&Type::BOOLEAN, &Type::INT).is_err());
        assert!(Instruction::conversion(&Type::INT, &Type::VOID).is_err());
        assert!(Instruction::conversion(&Type::LONG, &Type::BYTE).is_ok());
    }

    #[test]
    fn test_constant_equality_by_bits() {
        assert_ne!(Constant::Float(0.0), Constant::Float(-0.0));
        assert_eq!(Constant::Double(f64::NAN), Constant::Double(f64::NAN));
        assert_eq!(Constant::Int(i32::MIN).negated(), None);
        assert_eq!(Constant::Long(4).negated(), Some(Constant::Long(-4)));
    }

    #[test]
    fn test_min_locals() {
        let code = MethodCode::new(Vec::new(), Vec::new(), false, &[Type::LONG, Type::INT]);
        assert_eq!(code.min_locals, 4);
        let code = MethodCode::new(Vec::new(), Vec::new(), true, &[]);
        assert_eq!(code.min_locals, 0);
    }
}
