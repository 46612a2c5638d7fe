//! Local rewriting of instruction windows, run until nothing matches.
//!
//! Rules are tried in a fixed order at each position; the first match is
//! applied and scanning resumes after its replacement. No rule's output
//! matches the same rule again, so the loop terminates.

use log::trace;

use super::Optimizer;
use crate::code_attribute::{ArithOp, Branch, BranchKind, Cond, Constant, Handler, Instruction, MethodCode, ValueKind};

/// The default optimizer.
#[derive(Copy, Clone, Debug, Default)]
pub struct PeepholeOptimizer;

impl Optimizer for PeepholeOptimizer {
    fn optimize(&self, code: MethodCode) -> MethodCode {
        let mut instructions = code.instructions;
        let mut handlers = code.handlers;
        loop {
            let (next, next_handlers, rewrites) = rewrite_pass(instructions, handlers);
            instructions = next;
            handlers = next_handlers;
            if rewrites == 0 {
                break;
            }
        }
        MethodCode {
            instructions,
            handlers,
            min_locals: code.min_locals,
        }
    }
}

struct Rewrite {
    rule: &'static str,
    len: usize,
    replacement: Vec<Instruction>,
}

/// One left-to-right scan. Returns the rewritten sequence, the shifted
/// handlers and how many rewrites were applied.
pub fn rewrite_pass(mut instructions: Vec<Instruction>, mut handlers: Vec<Handler>) -> (Vec<Instruction>, Vec<Handler>, usize) {
    let mut rewrites = 0;
    let mut index = 0;
    while index < instructions.len() {
        let Some(rewrite) = match_rules(&instructions[index..]) else {
            index += 1;
            continue;
        };
        let end = index + rewrite.len;
        let straddles = handlers
            .iter()
            .any(|h| (h.start > index && h.start < end) || (h.end > index && h.end < end));
        if straddles {
            index += 1;
            continue;
        }
        trace!("peephole {} at {}", rewrite.rule, index);
        let added = rewrite.replacement.len();
        instructions.splice(index..end, rewrite.replacement);
        for handler in &mut handlers {
            if handler.start >= end {
                handler.start = handler.start - rewrite.len + added;
            }
            if handler.end >= end {
                handler.end = handler.end - rewrite.len + added;
            }
        }
        rewrites += 1;
        index += added;
    }
    (instructions, handlers, rewrites)
}

fn match_rules(window: &[Instruction]) -> Option<Rewrite> {
    drop_popped(window)
        .or_else(|| increment_in_place(window))
        .or_else(|| store_then_increment(window))
        .or_else(|| compare_with_null(window))
        .or_else(|| fold_negation(window))
        .or_else(|| duplicate_repeat(window))
}

fn int_delta(op: ArithOp, value: i32) -> Option<i16> {
    let delta = match op {
        ArithOp::Add => Some(value),
        ArithOp::Sub => value.checked_neg(),
        _ => None,
    }?;
    i16::try_from(delta).ok()
}

/// A pushed value that is immediately popped.
fn drop_popped(window: &[Instruction]) -> Option<Rewrite> {
    match window {
        [Instruction::Load { kind, .. }, Instruction::Pop { size }, ..] if kind.slot_size() == *size => {}
        [Instruction::LoadConst(c), Instruction::Pop { size }, ..] if c.kind().slot_size() == *size => {}
        _ => return None,
    }
    Some(Rewrite {
        rule: "drop-popped",
        len: 2,
        replacement: Vec::new(),
    })
}

/// `x = x ± c` on an int local.
fn increment_in_place(window: &[Instruction]) -> Option<Rewrite> {
    match window {
        [Instruction::Load {
            slot: load,
            kind: ValueKind::Int,
        }, Instruction::LoadConst(Constant::Int(value)), Instruction::Arith {
            op,
            kind: ValueKind::Int,
        }, Instruction::Store {
            slot: store,
            kind: ValueKind::Int,
        }, ..]
            if load == store =>
        {
            let delta = int_delta(*op, *value)?;
            Some(Rewrite {
                rule: "increment-in-place",
                len: 4,
                replacement: vec![Instruction::Iinc { slot: *store, delta }],
            })
        }
        _ => None,
    }
}

/// `x = <top> ± c`: store first, then increment the local.
fn store_then_increment(window: &[Instruction]) -> Option<Rewrite> {
    match window {
        [Instruction::LoadConst(Constant::Int(value)), Instruction::Arith {
            op,
            kind: ValueKind::Int,
        }, Instruction::Store {
            slot,
            kind: ValueKind::Int,
        }, ..] => {
            let delta = int_delta(*op, *value)?;
            Some(Rewrite {
                rule: "store-then-increment",
                len: 3,
                replacement: vec![
                    Instruction::Store {
                        slot: *slot,
                        kind: ValueKind::Int,
                    },
                    Instruction::Iinc { slot: *slot, delta },
                ],
            })
        }
        _ => None,
    }
}

/// Reference comparison against a `null` literal.
fn compare_with_null(window: &[Instruction]) -> Option<Rewrite> {
    match window {
        [Instruction::LoadConst(Constant::Null), Instruction::Branch(Branch {
            kind: BranchKind::IfCmp(ValueKind::Reference, cond),
            target,
        }), ..] => {
            let kind = match cond {
                Cond::Eq => BranchKind::IfNull,
                Cond::Ne => BranchKind::IfNonNull,
                _ => return None,
            };
            Some(Rewrite {
                rule: "compare-with-null",
                len: 2,
                replacement: vec![Instruction::Branch(Branch {
                    kind,
                    target: target.clone(),
                })],
            })
        }
        _ => None,
    }
}

/// Negated literal. The minimum int and long have no positive counterpart
/// and are left alone.
fn fold_negation(window: &[Instruction]) -> Option<Rewrite> {
    match window {
        [Instruction::LoadConst(c), Instruction::Neg(kind), ..] if c.kind() == *kind => Some(Rewrite {
            rule: "fold-negation",
            len: 2,
            replacement: vec![Instruction::LoadConst(c.negated()?)],
        }),
        _ => None,
    }
}

/// The same value pushed twice in a row. Only side-effect free reads that
/// take nothing from the stack qualify.
fn duplicate_repeat(window: &[Instruction]) -> Option<Rewrite> {
    let [first, second, ..] = window else {
        return None;
    };
    if first != second {
        return None;
    }
    let size = match first {
        Instruction::Load { kind, .. } => kind.slot_size(),
        Instruction::LoadConst(c) => c.kind().slot_size(),
        Instruction::GetField { field, is_static: true } => field.ty.slot_size(),
        _ => return None,
    };
    Some(Rewrite {
        rule: "duplicate-repeat",
        len: 2,
        replacement: vec![first.clone(), Instruction::Dup { size }],
    })
}
