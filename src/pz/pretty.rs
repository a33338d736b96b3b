//! Textual bytecode writer
//!
//! Prints a [`Pz`] in the surface the assembler reads back. Structs and
//! data entries are named after their ids; reassembling the output gives
//! a structurally equal program modulo id renumbering.

use super::{CallTarget, Instr, Pz, PzData, PzProc};
use std::fmt::Write;

/// Render a whole program
pub fn print_pz(pz: &Pz) -> String {
    let mut out = String::new();

    for (i, s) in pz.structs.iter().enumerate() {
        let _ = write!(out, "struct struct_{} (", i);
        for w in &s.fields {
            let _ = write!(out, " {}", w);
        }
        out.push_str(" );\n");
    }
    if !pz.structs.is_empty() {
        out.push('\n');
    }

    for (i, d) in pz.datas.iter().enumerate() {
        match d {
            PzData::Array { width, values } => {
                let _ = write!(out, "data data_{} {} {{", i, width);
                for v in values {
                    let _ = write!(out, " {}", v);
                }
                out.push_str(" };\n");
            }
            PzData::Struct { struct_id, values } => {
                let _ = write!(out, "data data_{} {} {{", i, struct_id);
                for v in values {
                    let _ = write!(out, " {}", v);
                }
                out.push_str(" };\n");
            }
        }
    }
    if !pz.datas.is_empty() {
        out.push('\n');
    }

    for proc in &pz.procs {
        print_proc(pz, proc, &mut out);
        out.push('\n');
    }

    out
}

fn print_proc(pz: &Pz, proc: &PzProc, out: &mut String) {
    let _ = write!(out, "proc {} (", proc.name);
    for w in &proc.sig.before {
        let _ = write!(out, " {}", w);
    }
    out.push_str(" -");
    for w in &proc.sig.after {
        let _ = write!(out, " {}", w);
    }
    out.push_str(" )");

    let blocks = match &proc.blocks {
        Some(blocks) => blocks,
        None => {
            out.push_str(";\n");
            return;
        }
    };

    out.push_str(" {\n");
    if blocks.len() == 1 {
        for instr in &blocks[0].instrs {
            let _ = writeln!(out, "  {}", instr_text(pz, instr));
        }
    } else {
        for (b, block) in blocks.iter().enumerate() {
            let _ = writeln!(out, "  {} {{", b);
            for instr in &block.instrs {
                let _ = writeln!(out, "    {}", instr_text(pz, instr));
            }
            out.push_str("  }\n");
        }
    }
    out.push_str("};\n");
}

fn target_name(pz: &Pz, target: CallTarget) -> String {
    match target {
        CallTarget::Proc(id) => pz.proc(id).name.to_string(),
        CallTarget::Import(id) => pz.import(id).name.to_string(),
    }
}

/// Render one instruction
pub fn instr_text(pz: &Pz, instr: &Instr) -> String {
    match instr {
        Instr::LoadImmediate(w, n) => format!("load_immediate:{} {}", w, n),
        Instr::LoadData(id) => format!("load_data {}", id),
        Instr::Add(w)
        | Instr::Sub(w)
        | Instr::Mul(w)
        | Instr::Div(w)
        | Instr::Mod(w)
        | Instr::And(w)
        | Instr::Or(w)
        | Instr::Xor(w)
        | Instr::Not(w)
        | Instr::Lshift(w)
        | Instr::Rshift(w)
        | Instr::Lt(w)
        | Instr::Gt(w)
        | Instr::Eq(w) => format!("{}:{}", instr.mnemonic(), w),
        Instr::Drop => "drop".to_string(),
        Instr::Pick(n) => format!("pick {}", n),
        Instr::Roll(n) => format!("roll {}", n),
        Instr::Call(t) => format!("call {}", target_name(pz, *t)),
        Instr::TCall(t) => format!("tcall {}", target_name(pz, *t)),
        Instr::CJmp(b) => format!("cjmp {}", b),
        Instr::Jmp(b) => format!("jmp {}", b),
        Instr::Ret => "ret".to_string(),
        Instr::Alloc(id) => format!("alloc {}", id),
        Instr::Store(id, f) => format!("store {} {}", id, f),
        Instr::Load(id, f, w) => format!("load {} {} {}", id, f, w),
    }
}
