//! Bytecode well-formedness checks
//!
//! Simulates the stack effect of every procedure: starting from the
//! declared input widths, every path through the block CFG must reach
//! `ret` with exactly the declared output widths, and every instruction
//! must find operands of the widths it expects. Run after code
//! generation; a failure here is a compiler bug, not a user error.

use super::{Instr, Pz, PzProc, PzSignature, Width};
use std::collections::VecDeque;
use thiserror::Error;

/// The fast word and the pointer word are the same machine word: tagged
/// constants are pointer-typed fake words, and generic fields hold
/// whatever fits a word. The checker treats the two as one class.
fn compatible(a: Width, b: Width) -> bool {
    let word = |w| matches!(w, Width::WFast | Width::WPtr);
    a == b || (word(a) && word(b))
}

fn all_compatible(a: &[Width], b: &[Width]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| compatible(*x, *y))
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("verify error: {message}")]
pub struct VerifyError {
    pub message: String,
}

impl VerifyError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Check every procedure of a program
pub fn verify_pz(pz: &Pz) -> Result<(), VerifyError> {
    if let Some(entry) = pz.entry {
        if entry.index() >= pz.procs.len() {
            return Err(VerifyError::new(format!(
                "entry {} out of range (procs={})",
                entry,
                pz.procs.len()
            )));
        }
    }
    for id in pz.proc_ids() {
        verify_proc(pz, pz.proc(id))?;
    }
    Ok(())
}

/// Check one procedure's stack discipline
pub fn verify_proc(pz: &Pz, proc: &PzProc) -> Result<(), VerifyError> {
    let blocks = match &proc.blocks {
        Some(blocks) => blocks,
        None => return Ok(()),
    };
    if blocks.is_empty() {
        return Err(VerifyError::new(format!("proc {} has no blocks", proc.name)));
    }

    // Worklist over blocks; each block's entry stack must be consistent
    // no matter which edge reaches it.
    let mut entry_stacks: Vec<Option<Vec<Width>>> = vec![None; blocks.len()];
    entry_stacks[0] = Some(proc.sig.before.clone());
    let mut work: VecDeque<usize> = VecDeque::new();
    work.push_back(0);
    let mut visited = vec![false; blocks.len()];

    while let Some(b) = work.pop_front() {
        if visited[b] {
            continue;
        }
        visited[b] = true;
        let mut stack = entry_stacks[b]
            .clone()
            .expect("worklist blocks have entry stacks");

        let block = &blocks[b];
        let last = block.instrs.len().checked_sub(1).ok_or_else(|| {
            VerifyError::new(format!("proc {}: block {} is empty", proc.name, b))
        })?;

        for (i, instr) in block.instrs.iter().enumerate() {
            if instr.is_terminator() && i != last {
                return Err(VerifyError::new(format!(
                    "proc {}: {} in the middle of block {}",
                    proc.name,
                    instr.mnemonic(),
                    b
                )));
            }
            step(pz, proc, b, instr, &mut stack, &mut entry_stacks, &mut work)?;
        }

        if !block.instrs[last].is_terminator() && !matches!(block.instrs[last], Instr::CJmp(_)) {
            return Err(VerifyError::new(format!(
                "proc {}: block {} does not end in a terminator",
                proc.name, b
            )));
        }
        if let Instr::CJmp(_) = block.instrs[last] {
            return Err(VerifyError::new(format!(
                "proc {}: block {} ends in cjmp with no fall-through",
                proc.name, b
            )));
        }
    }

    Ok(())
}

fn pop(proc: &PzProc, block: usize, stack: &mut Vec<Width>) -> Result<Width, VerifyError> {
    stack.pop().ok_or_else(|| {
        VerifyError::new(format!(
            "proc {}: stack underflow in block {}",
            proc.name, block
        ))
    })
}

fn pop_width(
    proc: &PzProc,
    block: usize,
    stack: &mut Vec<Width>,
    want: Width,
    what: &str,
) -> Result<(), VerifyError> {
    let got = pop(proc, block, stack)?;
    if !compatible(got, want) {
        return Err(VerifyError::new(format!(
            "proc {}: {} expects {} on the stack, found {} (block {})",
            proc.name, what, want, got, block
        )));
    }
    Ok(())
}

fn branch_to(
    proc: &PzProc,
    target: usize,
    stack: &[Width],
    entry_stacks: &mut [Option<Vec<Width>>],
    work: &mut VecDeque<usize>,
) -> Result<(), VerifyError> {
    if target >= entry_stacks.len() {
        return Err(VerifyError::new(format!(
            "proc {}: jump target {} out of range",
            proc.name, target
        )));
    }
    match &entry_stacks[target] {
        Some(existing) if !all_compatible(existing, stack) => Err(VerifyError::new(format!(
            "proc {}: block {} entered with inconsistent stacks ({:?} vs {:?})",
            proc.name, target, existing, stack
        ))),
        Some(_) => Ok(()),
        None => {
            entry_stacks[target] = Some(stack.to_vec());
            work.push_back(target);
            Ok(())
        }
    }
}

fn call_effect(
    proc: &PzProc,
    block: usize,
    stack: &mut Vec<Width>,
    sig: &PzSignature,
    what: &str,
) -> Result<(), VerifyError> {
    for want in sig.before.iter().rev() {
        pop_width(proc, block, stack, *want, what)?;
    }
    stack.extend(sig.after.iter().copied());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn step(
    pz: &Pz,
    proc: &PzProc,
    block: usize,
    instr: &Instr,
    stack: &mut Vec<Width>,
    entry_stacks: &mut [Option<Vec<Width>>],
    work: &mut VecDeque<usize>,
) -> Result<(), VerifyError> {
    match instr {
        Instr::LoadImmediate(w, _) => stack.push(*w),
        Instr::LoadData(id) => {
            if id.index() >= pz.datas.len() {
                return Err(VerifyError::new(format!(
                    "proc {}: {} out of range",
                    proc.name, id
                )));
            }
            stack.push(Width::WPtr);
        }
        Instr::Add(w)
        | Instr::Sub(w)
        | Instr::Mul(w)
        | Instr::Div(w)
        | Instr::Mod(w)
        | Instr::And(w)
        | Instr::Or(w)
        | Instr::Xor(w)
        | Instr::Lshift(w)
        | Instr::Rshift(w) => {
            pop_width(proc, block, stack, *w, instr.mnemonic())?;
            pop_width(proc, block, stack, *w, instr.mnemonic())?;
            stack.push(*w);
        }
        Instr::Lt(w) | Instr::Gt(w) | Instr::Eq(w) => {
            pop_width(proc, block, stack, *w, instr.mnemonic())?;
            pop_width(proc, block, stack, *w, instr.mnemonic())?;
            stack.push(Width::WFast);
        }
        Instr::Not(w) => {
            pop_width(proc, block, stack, *w, "not")?;
            stack.push(*w);
        }
        Instr::Drop => {
            pop(proc, block, stack)?;
        }
        Instr::Pick(n) => {
            let n = *n as usize;
            if n >= stack.len() {
                return Err(VerifyError::new(format!(
                    "proc {}: pick {} with stack depth {} (block {})",
                    proc.name,
                    n,
                    stack.len(),
                    block
                )));
            }
            stack.push(stack[stack.len() - 1 - n]);
        }
        Instr::Roll(n) => {
            let n = *n as usize;
            if n >= stack.len() {
                return Err(VerifyError::new(format!(
                    "proc {}: roll {} with stack depth {} (block {})",
                    proc.name,
                    n,
                    stack.len(),
                    block
                )));
            }
            let w = stack.remove(stack.len() - 1 - n);
            stack.push(w);
        }
        Instr::Call(target) => {
            let sig = pz.target_sig(*target).ok_or_else(|| {
                VerifyError::new(format!(
                    "proc {}: call to import with unknown signature",
                    proc.name
                ))
            })?;
            call_effect(proc, block, stack, &sig.clone(), "call")?;
        }
        Instr::TCall(target) => {
            let sig = pz
                .target_sig(*target)
                .ok_or_else(|| {
                    VerifyError::new(format!(
                        "proc {}: tcall to import with unknown signature",
                        proc.name
                    ))
                })?
                .clone();
            if !all_compatible(stack, &sig.before) {
                return Err(VerifyError::new(format!(
                    "proc {}: tcall with stack {:?}, callee expects {:?}",
                    proc.name, stack, sig.before
                )));
            }
            if !all_compatible(&sig.after, &proc.sig.after) {
                return Err(VerifyError::new(format!(
                    "proc {}: tcall to a procedure returning {:?}, but this one returns {:?}",
                    proc.name, sig.after, proc.sig.after
                )));
            }
        }
        Instr::CJmp(target) => {
            pop_width(proc, block, stack, Width::WFast, "cjmp")?;
            branch_to(proc, *target, stack, entry_stacks, work)?;
        }
        Instr::Jmp(target) => {
            branch_to(proc, *target, stack, entry_stacks, work)?;
        }
        Instr::Ret => {
            if !all_compatible(stack, &proc.sig.after) {
                return Err(VerifyError::new(format!(
                    "proc {}: ret with stack {:?}, declared outputs {:?}",
                    proc.name, stack, proc.sig.after
                )));
            }
        }
        Instr::Alloc(id) => {
            if id.index() >= pz.structs.len() {
                return Err(VerifyError::new(format!(
                    "proc {}: {} out of range",
                    proc.name, id
                )));
            }
            stack.push(Width::WPtr);
        }
        Instr::Store(sid, field) => {
            let s = pz.struct_(*sid);
            let want = *s.fields.get(*field as usize).ok_or_else(|| {
                VerifyError::new(format!(
                    "proc {}: store to field {} of {} (has {} fields)",
                    proc.name,
                    field,
                    sid,
                    s.fields.len()
                ))
            })?;
            pop_width(proc, block, stack, Width::WPtr, "store")?;
            pop_width(proc, block, stack, want, "store")?;
            stack.push(Width::WPtr);
        }
        Instr::Load(sid, field, w) => {
            let s = pz.struct_(*sid);
            let declared = *s.fields.get(*field as usize).ok_or_else(|| {
                VerifyError::new(format!(
                    "proc {}: load of field {} of {} (has {} fields)",
                    proc.name,
                    field,
                    sid,
                    s.fields.len()
                ))
            })?;
            if !compatible(declared, *w) {
                return Err(VerifyError::new(format!(
                    "proc {}: load of field {} of {} as {}, declared {}",
                    proc.name, field, sid, w, declared
                )));
            }
            pop_width(proc, block, stack, Width::WPtr, "load")?;
            stack.push(*w);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::QName;
    use crate::pz::PzBlock;

    fn proc_with(sig: PzSignature, instrs: Vec<Instr>) -> (Pz, PzProc) {
        let pz = Pz::new();
        let mut proc = PzProc::new(QName::single("t"), sig);
        proc.blocks = Some(vec![PzBlock { instrs }]);
        (pz, proc)
    }

    #[test]
    fn balanced_proc_verifies() {
        let (pz, proc) = proc_with(
            PzSignature::new(vec![], vec![Width::WFast]),
            vec![
                Instr::LoadImmediate(Width::WFast, 1),
                Instr::LoadImmediate(Width::WFast, 2),
                Instr::Add(Width::WFast),
                Instr::Ret,
            ],
        );
        verify_proc(&pz, &proc).unwrap();
    }

    #[test]
    fn leftover_stack_is_rejected() {
        let (pz, proc) = proc_with(
            PzSignature::new(vec![], vec![]),
            vec![Instr::LoadImmediate(Width::WFast, 1), Instr::Ret],
        );
        assert!(verify_proc(&pz, &proc).is_err());
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let (pz, proc) = proc_with(
            PzSignature::new(vec![], vec![Width::WFast]),
            vec![
                Instr::LoadImmediate(Width::WFast, 1),
                Instr::LoadImmediate(Width::W8, 2),
                Instr::Add(Width::WFast),
                Instr::Ret,
            ],
        );
        assert!(verify_proc(&pz, &proc).is_err());
    }

    #[test]
    fn underflow_is_rejected() {
        let (pz, proc) = proc_with(
            PzSignature::new(vec![], vec![]),
            vec![Instr::Drop, Instr::Ret],
        );
        assert!(verify_proc(&pz, &proc).is_err());
    }
}
