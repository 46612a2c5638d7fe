use rustc_hash::FxHashSet;

use log::debug;

use super::CompileError;
use crate::attribute_info::ExceptionEntry;
use crate::code_attribute::{EncodeError, Instruction, LabelTable, MethodCode};
use crate::constant_info::FrozenPool;

const MAX_CODE_LENGTH: u32 = 65535;

/// A method body laid out and encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct AssembledCode {
    pub code: Vec<u8>,
    pub max_stack: u16,
    pub max_locals: u16,
    pub exception_table: Vec<ExceptionEntry>,
    /// Byte offset of each instruction, plus the end offset.
    pub offsets: Vec<u32>,
}

/// `max_locals`: the declared minimum, or one past the highest slot touched.
pub fn max_locals(code: &MethodCode) -> u16 {
    code.instructions
        .iter()
        .filter_map(Instruction::local_access)
        .map(|(slot, size)| slot.saturating_add(size))
        .fold(code.min_locals, u16::max)
}

/// Compute max_stack by walking instructions top to bottom and tracking
/// stack depth. Control flow is not followed, so the result may be too
/// high but never too low. A handler entry starts with the thrown value
/// on the stack.
pub fn max_stack(code: &MethodCode) -> u16 {
    let handler_targets: FxHashSet<&str> = code.handlers.iter().map(|h| h.target.0.as_str()).collect();
    let mut depth: i32 = 0;
    let mut max_depth: i32 = 0;

    for instr in &code.instructions {
        if let Instruction::Label(label) = instr {
            if handler_targets.contains(label.0.as_str()) {
                depth += 1;
            }
        }
        depth += instr.stack_diff();
        max_depth = max_depth.max(depth);
        // Clamp to prevent underflow from unreachable code
        if depth < 0 {
            depth = 0;
        }
    }

    max_depth.clamp(0, i32::from(u16::MAX)) as u16
}

/// Lay out `code` against the frozen pool and encode it.
///
/// Pass 1 assigns every instruction an offset with branches at their near
/// size; pass 2 encodes at those offsets. An instruction that comes out
/// larger than its pass-1 size fails the method.
pub fn assemble(code: &MethodCode, pool: &FrozenPool) -> Result<AssembledCode, CompileError> {
    let instructions = &code.instructions;
    let at = |index: usize, offset: u32| move |source: EncodeError| CompileError::Encode { index, offset, source };

    // Pass 1: provisional layout
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut labels = LabelTable::new();
    let mut offset: u32 = 0;
    for (index, instr) in instructions.iter().enumerate() {
        offsets.push(offset);
        if let Instruction::Label(label) = instr {
            labels.bind(label, offset).map_err(at(index, offset))?;
        }
        offset += instr.size(offset, pool).map_err(at(index, offset))?;
        if offset > MAX_CODE_LENGTH {
            return Err(at(index, offsets[index])(EncodeError::CodeTooLong(offset)));
        }
    }
    offsets.push(offset);

    // Pass 2: final emission
    let mut bytes = Vec::with_capacity(offset as usize);
    for (index, instr) in instructions.iter().enumerate() {
        let start = offsets[index];
        let before = bytes.len();
        instr.encode(start, &labels, pool, &mut bytes).map_err(at(index, start))?;
        let actual = (bytes.len() - before) as u32;
        let estimate = offsets[index + 1] - start;
        if actual != estimate {
            let source = match instr {
                Instruction::Branch(branch) => EncodeError::BranchGrew {
                    target: branch.target.clone(),
                    estimate,
                    actual,
                },
                _ => EncodeError::SizeMismatch { estimate, actual },
            };
            return Err(at(index, start)(source));
        }
    }

    let exception_table = build_exception_table(code, &offsets, &labels, pool)?;
    let assembled = AssembledCode {
        code: bytes,
        max_stack: max_stack(code),
        max_locals: max_locals(code),
        exception_table,
        offsets,
    };
    debug!(
        "assembled {} bytes, max_stack={}, max_locals={}, {} handlers",
        assembled.code.len(),
        assembled.max_stack,
        assembled.max_locals,
        assembled.exception_table.len()
    );
    Ok(assembled)
}

fn build_exception_table(
    code: &MethodCode,
    offsets: &[u32],
    labels: &LabelTable,
    pool: &FrozenPool,
) -> Result<Vec<ExceptionEntry>, CompileError> {
    let mut entries = Vec::with_capacity(code.handlers.len());
    for handler in &code.handlers {
        let offset_of = |index: usize| {
            offsets
                .get(index)
                .copied()
                .ok_or_else(|| CompileError::unsupported(format!("handler index {} out of range", index)))
        };
        let start_pc = offset_of(handler.start)?;
        let end_pc = offset_of(handler.end)?;
        if start_pc == end_pc {
            debug!("dropping empty handler range at {} for {}", start_pc, handler.target);
            continue;
        }
        let handler_pc = labels.resolve(&handler.target).map_err(|source| CompileError::Encode {
            index: handler.start,
            offset: start_pc,
            source,
        })?;
        let catch_type = match &handler.catch_type {
            Some(ty) => pool.class_index(ty)?,
            None => 0,
        };
        entries.push(ExceptionEntry {
            start_pc: start_pc as u16,
            end_pc: end_pc as u16,
            handler_pc: handler_pc as u16,
            catch_type,
        });
    }
    Ok(entries)
}
