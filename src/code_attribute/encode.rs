use rustc_hash::FxHashMap;
use thiserror::Error;

use super::opcodes::*;
use super::types::*;
use crate::constant_info::{FrozenPool, MemberRef, PoolEntry, PoolError};
use crate::descriptor::{class_entry_name, descriptor, method_descriptor, PrimitiveType, Type};

#[derive(Clone, Debug, PartialEq, Error)]
pub enum EncodeError {
    #[error("branch to `{target}` needs offset {offset}, beyond the 16-bit form")]
    BranchOutOfRange { target: Label, offset: i64 },
    #[error("branch to `{target}` grew from {estimate} to {actual} bytes")]
    BranchGrew { target: Label, estimate: u32, actual: u32 },
    #[error("unresolved label `{0}`")]
    UnresolvedLabel(Label),
    #[error("label `{0}` defined more than once")]
    DuplicateLabel(Label),
    #[error("{0} argument slots do not fit invokeinterface")]
    TooManyArguments(u16),
    #[error("code is {0} bytes, the limit is 65535")]
    CodeTooLong(u32),
    #[error("encoded {actual} bytes where layout reserved {estimate}")]
    SizeMismatch { estimate: u32, actual: u32 },
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Label name to byte offset, filled in by layout.
#[derive(Debug, Default)]
pub struct LabelTable {
    offsets: FxHashMap<Label, u32>,
}

impl LabelTable {
    pub fn new() -> Self {
        LabelTable::default()
    }

    pub fn bind(&mut self, label: &Label, offset: u32) -> Result<(), EncodeError> {
        if self.offsets.insert(label.clone(), offset).is_some() {
            return Err(EncodeError::DuplicateLabel(label.clone()));
        }
        Ok(())
    }

    pub fn resolve(&self, label: &Label) -> Result<u32, EncodeError> {
        self.offsets
            .get(label)
            .copied()
            .ok_or_else(|| EncodeError::UnresolvedLabel(label.clone()))
    }
}

/// How a literal reaches the stack.
enum ConstForm {
    Opcode(u8),
    Bipush(i8),
    Sipush(i16),
    /// Pool-indexed; `wide` selects `ldc2_w`.
    Pool { entry: PoolEntry, wide: bool },
}

fn const_form(constant: &Constant) -> ConstForm {
    match constant {
        Constant::Int(v) => match *v {
            -1..=5 => ConstForm::Opcode((ICONST_0 as i32 + *v) as u8),
            -128..=127 => ConstForm::Bipush(*v as i8),
            -32768..=32767 => ConstForm::Sipush(*v as i16),
            _ => ConstForm::Pool {
                entry: PoolEntry::Integer(*v),
                wide: false,
            },
        },
        Constant::Long(v) => match *v {
            0 | 1 => ConstForm::Opcode(LCONST_0 + *v as u8),
            _ => ConstForm::Pool {
                entry: PoolEntry::Long(*v),
                wide: true,
            },
        },
        Constant::Float(v) => {
            if v.to_bits() == 0 {
                ConstForm::Opcode(FCONST_0)
            } else if *v == 1.0 {
                ConstForm::Opcode(FCONST_0 + 1)
            } else if *v == 2.0 {
                ConstForm::Opcode(FCONST_0 + 2)
            } else {
                ConstForm::Pool {
                    entry: PoolEntry::Float(*v),
                    wide: false,
                }
            }
        }
        Constant::Double(v) => {
            if v.to_bits() == 0 {
                ConstForm::Opcode(DCONST_0)
            } else if *v == 1.0 {
                ConstForm::Opcode(DCONST_0 + 1)
            } else {
                ConstForm::Pool {
                    entry: PoolEntry::Double(*v),
                    wide: true,
                }
            }
        }
        Constant::String(s) => ConstForm::Pool {
            entry: PoolEntry::String(s.clone()),
            wide: false,
        },
        Constant::Class(ty) => ConstForm::Pool {
            entry: PoolEntry::class_for(ty),
            wide: false,
        },
        Constant::Null => ConstForm::Opcode(ACONST_NULL),
    }
}

fn computational(p: PrimitiveType) -> ValueKind {
    match p {
        PrimitiveType::Long => ValueKind::Long,
        PrimitiveType::Float => ValueKind::Float,
        PrimitiveType::Double => ValueKind::Double,
        _ => ValueKind::Int,
    }
}

/// Opcodes implementing a primitive conversion. There is no direct
/// long/float/double to byte/char/short opcode, so those go through int.
pub fn conversion_opcodes(from: PrimitiveType, to: PrimitiveType) -> Vec<u8> {
    use ValueKind::*;
    let mut ops = Vec::with_capacity(2);
    let step = match (computational(from), computational(to)) {
        (Int, Long) => Some(I2L),
        (Int, Float) => Some(I2F),
        (Int, Double) => Some(I2D),
        (Long, Int) => Some(L2I),
        (Long, Float) => Some(L2F),
        (Long, Double) => Some(L2D),
        (Float, Int) => Some(F2I),
        (Float, Long) => Some(F2L),
        (Float, Double) => Some(F2D),
        (Double, Int) => Some(D2I),
        (Double, Long) => Some(D2L),
        (Double, Float) => Some(D2F),
        _ => None,
    };
    ops.extend(step);
    let narrow = match to {
        PrimitiveType::Byte => Some(I2B),
        PrimitiveType::Char => Some(I2C),
        PrimitiveType::Short => Some(I2S),
        _ => None,
    };
    // byte already fits short, and a value never needs narrowing to its own type.
    let already_fits = from == to || (from == PrimitiveType::Byte && to == PrimitiveType::Short);
    if !already_fits {
        ops.extend(narrow);
    }
    ops
}

fn array_opcode(elem: &Type, store: bool) -> u8 {
    let (base, byte, char, short) = if store {
        (IASTORE, BASTORE, CASTORE, SASTORE)
    } else {
        (IALOAD, BALOAD, CALOAD, SALOAD)
    };
    match elem.as_primitive() {
        Some(PrimitiveType::Boolean) | Some(PrimitiveType::Byte) => byte,
        Some(PrimitiveType::Char) => char,
        Some(PrimitiveType::Short) => short,
        Some(PrimitiveType::Long) => base + 1,
        Some(PrimitiveType::Float) => base + 2,
        Some(PrimitiveType::Double) => base + 3,
        Some(_) => base,
        None => base + 4,
    }
}

fn switch_padding(offset: u32) -> u32 {
    (4 - (offset + 1) % 4) % 4
}

fn member_ref(owner: &Type, name: &str, descriptor: &str) -> MemberRef {
    MemberRef::new(&class_entry_name(owner), name, descriptor)
}

impl FieldRef {
    pub fn pool_entry(&self) -> PoolEntry {
        PoolEntry::FieldRef(member_ref(&self.owner, &self.name, &descriptor(&self.ty, false)))
    }
}

impl MethodRef {
    pub fn descriptor(&self) -> String {
        method_descriptor(&self.ty.params, &self.ty.ret)
    }

    pub fn pool_entry(&self, mode: InvokeMode) -> PoolEntry {
        let member = member_ref(&self.owner, &self.name, &self.descriptor());
        match mode {
            InvokeMode::Interface => PoolEntry::InterfaceMethodRef(member),
            _ => PoolEntry::MethodRef(member),
        }
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn push_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn local_op(out: &mut Vec<u8>, compact_base: u8, generic_base: u8, slot: u16, kind: ValueKind) {
    let family = kind.family_index();
    match slot {
        0..=3 => out.push(compact_base + 4 * family + slot as u8),
        4..=255 => out.extend_from_slice(&[generic_base + family, slot as u8]),
        _ => {
            out.extend_from_slice(&[WIDE, generic_base + family]);
            push_u16(out, slot);
        }
    }
}

impl Instruction {
    /// Net change in operand stack depth, in slots.
    pub fn stack_diff(&self) -> i32 {
        match self {
            Instruction::Label(_) | Instruction::Nop | Instruction::Iinc { .. } => 0,
            Instruction::Load { kind, .. } => i32::from(kind.slot_size()),
            Instruction::Store { kind, .. } => -i32::from(kind.slot_size()),
            Instruction::LoadConst(c) => i32::from(c.kind().slot_size()),
            Instruction::Arith { op, kind } => {
                if op.is_shift() {
                    -1
                } else {
                    -i32::from(kind.slot_size())
                }
            }
            Instruction::Neg(_) => 0,
            Instruction::Conversion { from, to } => {
                i32::from(computational(*to).slot_size()) - i32::from(computational(*from).slot_size())
            }
            Instruction::Compare { kind, .. } => 1 - 2 * i32::from(kind.slot_size()),
            Instruction::Branch(branch) => match branch.kind {
                BranchKind::Goto => 0,
                BranchKind::IfCmp(..) => -2,
                BranchKind::If(_) | BranchKind::IfNull | BranchKind::IfNonNull => -1,
            },
            Instruction::Switch(_) => -1,
            Instruction::Dup { size } => i32::from(*size),
            Instruction::Pop { size } => -i32::from(*size),
            Instruction::New(_) => 1,
            Instruction::NewArray(_) | Instruction::ArrayLength => 0,
            Instruction::MultiNewArray { dims, .. } => 1 - i32::from(*dims),
            Instruction::ArrayLoad(elem) => i32::from(elem.slot_size()) - 2,
            Instruction::ArrayStore(elem) => -2 - i32::from(elem.slot_size()),
            Instruction::CheckCast(_) | Instruction::InstanceOf(_) => 0,
            Instruction::GetField { field, is_static } => {
                i32::from(field.ty.slot_size()) - if *is_static { 0 } else { 1 }
            }
            Instruction::PutField { field, is_static } => {
                -i32::from(field.ty.slot_size()) - if *is_static { 0 } else { 1 }
            }
            Instruction::Invoke { method, mode } => {
                let receiver = if *mode == InvokeMode::Static { 0 } else { 1 };
                i32::from(method.ty.ret.slot_size()) - i32::from(method.ty.arg_slots()) - receiver
            }
            Instruction::Return(kind) => -kind.map_or(0, |k| i32::from(k.slot_size())),
            Instruction::Throw | Instruction::MonitorEnter | Instruction::MonitorExit => -1,
        }
    }

    /// Pool entries the encoded form refers to.
    pub fn pool_needs(&self) -> Vec<PoolEntry> {
        match self {
            Instruction::LoadConst(c) => match const_form(c) {
                ConstForm::Pool { entry, .. } => vec![entry],
                _ => Vec::new(),
            },
            Instruction::New(ty) | Instruction::CheckCast(ty) | Instruction::InstanceOf(ty) => {
                vec![PoolEntry::class_for(ty)]
            }
            Instruction::NewArray(elem) if !elem.is_reference() => Vec::new(),
            Instruction::NewArray(elem) => vec![PoolEntry::class_for(elem)],
            Instruction::MultiNewArray { ty, .. } => vec![PoolEntry::class_for(ty)],
            Instruction::GetField { field, .. } | Instruction::PutField { field, .. } => vec![field.pool_entry()],
            Instruction::Invoke { method, mode } => vec![method.pool_entry(*mode)],
            _ => Vec::new(),
        }
    }

    /// Provisional byte size at `offset`. Branches are counted at their
    /// near form.
    pub fn size(&self, offset: u32, pool: &FrozenPool) -> Result<u32, EncodeError> {
        Ok(match self {
            Instruction::Label(_) => 0,
            Instruction::Load { slot, .. } | Instruction::Store { slot, .. } => match slot {
                0..=3 => 1,
                4..=255 => 2,
                _ => 4,
            },
            Instruction::Iinc { slot, delta } => {
                if *slot <= 255 && i8::try_from(*delta).is_ok() {
                    3
                } else {
                    6
                }
            }
            Instruction::LoadConst(c) => match const_form(c) {
                ConstForm::Opcode(_) => 1,
                ConstForm::Bipush(_) => 2,
                ConstForm::Sipush(_) => 3,
                ConstForm::Pool { wide: true, .. } => 3,
                ConstForm::Pool { entry, wide: false } => {
                    if pool.index_of(&entry)? < 255 {
                        2
                    } else {
                        3
                    }
                }
            },
            Instruction::Conversion { from, to } => conversion_opcodes(*from, *to).len() as u32,
            Instruction::Branch(_) => 3,
            Instruction::Switch(switch) => {
                let body = match switch.form {
                    SwitchForm::Table { low, high } => {
                        12 + 4 * (i64::from(high) - i64::from(low) + 1) as u32
                    }
                    SwitchForm::Lookup => 8 + 8 * switch.cases.len() as u32,
                };
                1 + switch_padding(offset) + body
            }
            Instruction::New(_)
            | Instruction::CheckCast(_)
            | Instruction::InstanceOf(_)
            | Instruction::GetField { .. }
            | Instruction::PutField { .. } => 3,
            Instruction::NewArray(elem) => {
                if elem.is_reference() {
                    3
                } else {
                    2
                }
            }
            Instruction::MultiNewArray { .. } => 4,
            Instruction::Invoke { mode, .. } => {
                if *mode == InvokeMode::Interface {
                    5
                } else {
                    3
                }
            }
            Instruction::Arith { .. }
            | Instruction::Neg(_)
            | Instruction::Compare { .. }
            | Instruction::Dup { .. }
            | Instruction::Pop { .. }
            | Instruction::ArrayLength
            | Instruction::ArrayLoad(_)
            | Instruction::ArrayStore(_)
            | Instruction::Return(_)
            | Instruction::Throw
            | Instruction::MonitorEnter
            | Instruction::MonitorExit
            | Instruction::Nop => 1,
        })
    }

    /// Append the encoded bytes of this instruction, located at `offset`.
    pub fn encode(&self, offset: u32, labels: &LabelTable, pool: &FrozenPool, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self {
            Instruction::Label(_) => {}
            Instruction::Load { slot, kind } => local_op(out, ILOAD_0, ILOAD, *slot, *kind),
            Instruction::Store { slot, kind } => local_op(out, ISTORE_0, ISTORE, *slot, *kind),
            Instruction::Iinc { slot, delta } => match (u8::try_from(*slot), i8::try_from(*delta)) {
                (Ok(slot), Ok(delta)) => out.extend_from_slice(&[IINC, slot, delta as u8]),
                _ => {
                    out.extend_from_slice(&[WIDE, IINC]);
                    push_u16(out, *slot);
                    out.extend_from_slice(&delta.to_be_bytes());
                }
            },
            Instruction::LoadConst(c) => match const_form(c) {
                ConstForm::Opcode(op) => out.push(op),
                ConstForm::Bipush(v) => out.extend_from_slice(&[BIPUSH, v as u8]),
                ConstForm::Sipush(v) => {
                    out.push(SIPUSH);
                    out.extend_from_slice(&v.to_be_bytes());
                }
                ConstForm::Pool { entry, wide } => {
                    let index = pool.index_of(&entry)?;
                    if wide {
                        out.push(LDC2_W);
                        push_u16(out, index);
                    } else if index < 255 {
                        out.extend_from_slice(&[LDC, index as u8]);
                    } else {
                        out.push(LDC_W);
                        push_u16(out, index);
                    }
                }
            },
            Instruction::Arith { op, kind } => {
                let base = match op {
                    ArithOp::Add => IADD,
                    ArithOp::Sub => ISUB,
                    ArithOp::Mul => IMUL,
                    ArithOp::Div => IDIV,
                    ArithOp::Rem => IREM,
                    ArithOp::Shl => ISHL,
                    ArithOp::Shr => ISHR,
                    ArithOp::Ushr => IUSHR,
                    ArithOp::And => IAND,
                    ArithOp::Or => IOR,
                    ArithOp::Xor => IXOR,
                };
                out.push(base + kind.family_index());
            }
            Instruction::Neg(kind) => out.push(INEG + kind.family_index()),
            Instruction::Conversion { from, to } => out.extend(conversion_opcodes(*from, *to)),
            Instruction::Compare { kind, nan_greater } => out.push(match (*kind, *nan_greater) {
                (ValueKind::Float, false) => FCMPL,
                (ValueKind::Float, true) => FCMPG,
                (ValueKind::Double, false) => DCMPL,
                (ValueKind::Double, true) => DCMPG,
                _ => LCMP,
            }),
            Instruction::Branch(branch) => {
                let target = labels.resolve(&branch.target)?;
                let delta = i64::from(target) - i64::from(offset);
                let near = i16::try_from(delta);
                let opcode = match branch.kind {
                    BranchKind::Goto => match near {
                        Ok(_) => GOTO,
                        Err(_) => {
                            out.push(GOTO_W);
                            push_i32(out, delta as i32);
                            return Ok(());
                        }
                    },
                    BranchKind::If(cond) => IFEQ + cond.opcode_offset(),
                    BranchKind::IfCmp(ValueKind::Reference, cond) => IF_ACMPEQ + cond.opcode_offset(),
                    BranchKind::IfCmp(_, cond) => IF_ICMPEQ + cond.opcode_offset(),
                    BranchKind::IfNull => IFNULL,
                    BranchKind::IfNonNull => IFNONNULL,
                };
                let near = near.map_err(|_| EncodeError::BranchOutOfRange {
                    target: branch.target.clone(),
                    offset: delta,
                })?;
                out.push(opcode);
                out.extend_from_slice(&near.to_be_bytes());
            }
            Instruction::Switch(switch) => {
                let relative = |label: &Label| -> Result<i32, EncodeError> {
                    Ok((i64::from(labels.resolve(label)?) - i64::from(offset)) as i32)
                };
                let default = relative(&switch.default)?;
                match switch.form {
                    SwitchForm::Table { low, high } => {
                        out.push(TABLESWITCH);
                        out.resize(out.len() + switch_padding(offset) as usize, 0);
                        push_i32(out, default);
                        push_i32(out, low);
                        push_i32(out, high);
                        for key in low..=high {
                            push_i32(out, relative(switch.target(key))?);
                        }
                    }
                    SwitchForm::Lookup => {
                        out.push(LOOKUPSWITCH);
                        out.resize(out.len() + switch_padding(offset) as usize, 0);
                        push_i32(out, default);
                        push_i32(out, switch.cases.len() as i32);
                        for (key, label) in &switch.cases {
                            push_i32(out, *key);
                            push_i32(out, relative(label)?);
                        }
                    }
                }
            }
            Instruction::Dup { size } => out.push(if *size == 2 { DUP2 } else { DUP }),
            Instruction::Pop { size } => out.push(if *size == 2 { POP2 } else { POP }),
            Instruction::New(ty) => {
                out.push(NEW);
                push_u16(out, pool.class_index(ty)?);
            }
            Instruction::NewArray(elem) => match elem.as_primitive().and_then(PrimitiveType::newarray_code) {
                Some(code) => out.extend_from_slice(&[NEWARRAY, code]),
                None => {
                    out.push(ANEWARRAY);
                    push_u16(out, pool.class_index(elem)?);
                }
            },
            Instruction::MultiNewArray { ty, dims } => {
                out.push(MULTIANEWARRAY);
                push_u16(out, pool.class_index(ty)?);
                out.push(*dims);
            }
            Instruction::ArrayLength => out.push(ARRAYLENGTH),
            Instruction::ArrayLoad(elem) => out.push(array_opcode(elem, false)),
            Instruction::ArrayStore(elem) => out.push(array_opcode(elem, true)),
            Instruction::CheckCast(ty) => {
                out.push(CHECKCAST);
                push_u16(out, pool.class_index(ty)?);
            }
            Instruction::InstanceOf(ty) => {
                out.push(INSTANCEOF);
                push_u16(out, pool.class_index(ty)?);
            }
            Instruction::GetField { field, is_static } => {
                out.push(if *is_static { GETSTATIC } else { GETFIELD });
                push_u16(out, pool.index_of(&field.pool_entry())?);
            }
            Instruction::PutField { field, is_static } => {
                out.push(if *is_static { PUTSTATIC } else { PUTFIELD });
                push_u16(out, pool.index_of(&field.pool_entry())?);
            }
            Instruction::Invoke { method, mode } => {
                let index = pool.index_of(&method.pool_entry(*mode))?;
                match mode {
                    InvokeMode::Static => out.push(INVOKESTATIC),
                    InvokeMode::Virtual => out.push(INVOKEVIRTUAL),
                    InvokeMode::Special => out.push(INVOKESPECIAL),
                    InvokeMode::Interface => out.push(INVOKEINTERFACE),
                }
                push_u16(out, index);
                if *mode == InvokeMode::Interface {
                    let slots = method.ty.arg_slots();
                    let count = u8::try_from(slots + 1).map_err(|_| EncodeError::TooManyArguments(slots))?;
                    out.extend_from_slice(&[count, 0]);
                }
            }
            Instruction::Return(kind) => out.push(match kind {
                Some(kind) => IRETURN + kind.family_index(),
                None => RETURN,
            }),
            Instruction::Throw => out.push(ATHROW),
            Instruction::MonitorEnter => out.push(MONITORENTER),
            Instruction::MonitorExit => out.push(MONITOREXIT),
            Instruction::Nop => out.push(NOP),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant_info::ConstantPool;
    use crate::descriptor::FunctionType;

    fn pool_for(instructions: &[Instruction]) -> FrozenPool {
        let mut pool = ConstantPool::new();
        for instr in instructions {
            for entry in instr.pool_needs() {
                pool.apply(entry).unwrap();
            }
        }
        pool.freeze()
    }

    fn bytes(instr: &Instruction) -> Vec<u8> {
        let pool = pool_for(std::slice::from_ref(instr));
        let mut out = Vec::new();
        instr.encode(0, &LabelTable::new(), &pool, &mut out).unwrap();
        assert_eq!(out.len() as u32, instr.size(0, &pool).unwrap());
        out
    }

    #[test]
    fn test_int_constant_boundaries() {
        assert_eq!(bytes(&Instruction::int(-1)), vec![0x02]);
        assert_eq!(bytes(&Instruction::int(5)), vec![0x08]);
        assert_eq!(bytes(&Instruction::int(6)), vec![BIPUSH, 6]);
        assert_eq!(bytes(&Instruction::int(-128)), vec![BIPUSH, 0x80]);
        assert_eq!(bytes(&Instruction::int(128)), vec![SIPUSH, 0, 128]);
        assert_eq!(bytes(&Instruction::int(32767)), vec![SIPUSH, 0x7f, 0xff]);
        assert_eq!(bytes(&Instruction::int(32768)), vec![LDC, 1]);
        assert_eq!(bytes(&Instruction::int(-32769)), vec![LDC, 1]);
    }

    #[test]
    fn test_floating_constants() {
        assert_eq!(bytes(&Instruction::LoadConst(Constant::Float(0.0))), vec![0x0b]);
        assert_eq!(bytes(&Instruction::LoadConst(Constant::Float(2.0))), vec![0x0d]);
        assert_eq!(bytes(&Instruction::LoadConst(Constant::Float(-0.0))), vec![LDC, 1]);
        assert_eq!(bytes(&Instruction::LoadConst(Constant::Double(1.0))), vec![0x0f]);
        assert_eq!(bytes(&Instruction::LoadConst(Constant::Double(2.0))), vec![LDC2_W, 0, 1]);
        assert_eq!(bytes(&Instruction::LoadConst(Constant::Long(1))), vec![0x0a]);
        assert_eq!(bytes(&Instruction::LoadConst(Constant::Long(2))), vec![LDC2_W, 0, 1]);
        assert_eq!(bytes(&Instruction::LoadConst(Constant::Null)), vec![ACONST_NULL]);
    }

    #[test]
    fn test_ldc_w_past_index_254() {
        let mut pool = ConstantPool::new();
        for i in 0..254 {
            pool.apply(PoolEntry::Integer(100_000 + i)).unwrap();
        }
        let late = Instruction::int(1_000_000);
        let index = pool.apply(PoolEntry::Integer(1_000_000)).unwrap();
        assert_eq!(index, 255);
        let pool = pool.freeze();
        let mut out = Vec::new();
        late.encode(0, &LabelTable::new(), &pool, &mut out).unwrap();
        assert_eq!(out, vec![LDC_W, 0, 255]);
        assert_eq!(late.size(0, &pool).unwrap(), 3);
    }

    #[test]
    fn test_local_forms() {
        assert_eq!(bytes(&Instruction::load(0, &Type::INT).unwrap()), vec![0x1a]);
        assert_eq!(bytes(&Instruction::load(3, &Type::string()).unwrap()), vec![0x2d]);
        assert_eq!(bytes(&Instruction::load(4, &Type::LONG).unwrap()), vec![0x16, 4]);
        assert_eq!(bytes(&Instruction::store(1, &Type::DOUBLE).unwrap()), vec![0x48]);
        assert_eq!(bytes(&Instruction::store(300, &Type::FLOAT).unwrap()), vec![WIDE, 0x38, 0x01, 0x2c]);
        assert_eq!(bytes(&Instruction::iinc(2, 1).unwrap()), vec![IINC, 2, 1]);
        assert_eq!(bytes(&Instruction::iinc(2, 200).unwrap()), vec![WIDE, IINC, 0, 2, 0, 200]);
    }

    #[test]
    fn test_conversion_chains() {
        let l2b = Instruction::conversion(&Type::LONG, &Type::BYTE).unwrap();
        assert_eq!(bytes(&l2b), vec![L2I, I2B]);
        assert_eq!(l2b.stack_diff(), -1);
        let i2d = Instruction::conversion(&Type::INT, &Type::DOUBLE).unwrap();
        assert_eq!(bytes(&i2d), vec![I2D]);
        assert_eq!(i2d.stack_diff(), 1);
        assert!(bytes(&Instruction::conversion(&Type::BYTE, &Type::SHORT).unwrap()).is_empty());
        assert_eq!(bytes(&Instruction::conversion(&Type::CHAR, &Type::SHORT).unwrap()), vec![I2S]);
    }

    #[test]
    fn test_invoke_interface_bytes() {
        let list = Type::class("java/util/List");
        let add = Instruction::invoke(
            &list,
            "add",
            &FunctionType::new(vec![Type::object()], Type::BOOLEAN),
            InvokeMode::Interface,
        );
        let encoded = bytes(&add);
        assert_eq!(encoded[0], INVOKEINTERFACE);
        assert_eq!(&encoded[3..], &[2, 0]);
        assert_eq!(add.stack_diff(), -1);
    }

    #[test]
    fn test_switch_padding_and_offsets() {
        let switch = Instruction::switch(
            Label::new("d"),
            vec![(0, Label::new("a")), (1, Label::new("b")), (2, Label::new("a"))],
        )
        .unwrap();
        let pool = pool_for(&[]);
        let mut labels = LabelTable::new();
        labels.bind(&Label::new("a"), 40).unwrap();
        labels.bind(&Label::new("b"), 44).unwrap();
        labels.bind(&Label::new("d"), 48).unwrap();

        let mut out = Vec::new();
        switch.encode(1, &labels, &pool, &mut out).unwrap();
        assert_eq!(out.len() as u32, switch.size(1, &pool).unwrap());
        // opcode at 1, two padding bytes so the default lands on offset 4
        assert_eq!(&out[..3], &[TABLESWITCH, 0, 0]);
        assert_eq!(&out[3..7], &47i32.to_be_bytes());
        assert_eq!(&out[7..11], &0i32.to_be_bytes());
        assert_eq!(&out[11..15], &2i32.to_be_bytes());
        assert_eq!(&out[15..19], &39i32.to_be_bytes());
        assert_eq!(&out[19..23], &43i32.to_be_bytes());
    }

    #[test]
    fn test_branch_range() {
        let pool = pool_for(&[]);
        let mut labels = LabelTable::new();
        labels.bind(&Label::new("far"), 40_000).unwrap();

        let mut out = Vec::new();
        let err = Instruction::if_zero(Cond::Eq, Label::new("far"))
            .encode(0, &labels, &pool, &mut out)
            .unwrap_err();
        assert!(matches!(err, EncodeError::BranchOutOfRange { offset: 40_000, .. }));

        let mut out = Vec::new();
        Instruction::goto(Label::new("far")).encode(0, &labels, &pool, &mut out).unwrap();
        assert_eq!(out[0], GOTO_W);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_unresolved_label() {
        let pool = pool_for(&[]);
        let mut out = Vec::new();
        let err = Instruction::goto(Label::new("nowhere"))
            .encode(0, &LabelTable::new(), &pool, &mut out)
            .unwrap_err();
        assert_eq!(err, EncodeError::UnresolvedLabel(Label::new("nowhere")));
    }

    #[test]
    fn test_array_opcodes() {
        assert_eq!(bytes(&Instruction::array_load(&Type::BOOLEAN).unwrap()), vec![BALOAD]);
        assert_eq!(bytes(&Instruction::array_store(&Type::LONG).unwrap()), vec![0x50]);
        assert_eq!(bytes(&Instruction::array_load(&Type::string()).unwrap()), vec![0x32]);
        assert_eq!(bytes(&Instruction::new_array(&Type::INT).unwrap()), vec![NEWARRAY, 10]);
        assert_eq!(Instruction::array_store(&Type::DOUBLE).unwrap().stack_diff(), -4);
    }

    #[test]
    fn test_field_stack_diffs() {
        let owner = Type::class("a/B");
        assert_eq!(Instruction::get_field(&owner, "x", &Type::LONG, false).unwrap().stack_diff(), 1);
        assert_eq!(Instruction::get_field(&owner, "x", &Type::LONG, true).unwrap().stack_diff(), 2);
        assert_eq!(Instruction::put_field(&owner, "x", &Type::INT, false).unwrap().stack_diff(), -2);
    }
}
