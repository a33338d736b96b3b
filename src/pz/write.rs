//! Binary bytecode writer
//!
//! Serializes a [`Pz`] to the on-disk `.pz` format: a magic/version
//! header followed by the struct, data, import and procedure sections.
//! Entities are written in id order so ids round-trip stably; data
//! arrays and struct widths are byte-exact.

use super::{CallTarget, Instr, Pz, PzData, PzSignature, Width};
use crate::core::QName;
use std::io::{self, Write};

/// File magic, big-endian: `P` `Z` `B` `C`
pub const MAGIC: u32 = 0x505A_4243;

/// Format version
pub const VERSION: u16 = 1;

fn width_byte(w: Width) -> u8 {
    match w {
        Width::W8 => 0,
        Width::W16 => 1,
        Width::W32 => 2,
        Width::W64 => 3,
        Width::WFast => 4,
        Width::WPtr => 5,
    }
}

fn write_name<W: Write>(writer: &mut W, name: &QName) -> io::Result<()> {
    let s = name.to_string();
    writer.write_all(&(s.len() as u32).to_le_bytes())?;
    writer.write_all(s.as_bytes())
}

fn write_sig<W: Write>(writer: &mut W, sig: &PzSignature) -> io::Result<()> {
    writer.write_all(&(sig.before.len() as u32).to_le_bytes())?;
    for w in &sig.before {
        writer.write_all(&[width_byte(*w)])?;
    }
    writer.write_all(&(sig.after.len() as u32).to_le_bytes())?;
    for w in &sig.after {
        writer.write_all(&[width_byte(*w)])?;
    }
    Ok(())
}

/// Write a whole program
pub fn write_pz<W: Write>(pz: &Pz, writer: &mut W) -> io::Result<()> {
    writer.write_all(&MAGIC.to_be_bytes())?;
    writer.write_all(&VERSION.to_le_bytes())?;
    match pz.entry {
        Some(id) => writer.write_all(&(id.0 + 1).to_le_bytes())?,
        None => writer.write_all(&0u32.to_le_bytes())?,
    }

    // struct section
    writer.write_all(&(pz.structs.len() as u32).to_le_bytes())?;
    for s in &pz.structs {
        writer.write_all(&(s.fields.len() as u32).to_le_bytes())?;
        for w in &s.fields {
            writer.write_all(&[width_byte(*w)])?;
        }
    }

    // data section
    writer.write_all(&(pz.datas.len() as u32).to_le_bytes())?;
    for d in &pz.datas {
        match d {
            PzData::Array { width, values } => {
                writer.write_all(&[0, width_byte(*width)])?;
                writer.write_all(&(values.len() as u32).to_le_bytes())?;
                for v in values {
                    write_data_value(writer, *width, *v)?;
                }
            }
            PzData::Struct { struct_id, values } => {
                writer.write_all(&[1])?;
                writer.write_all(&(struct_id.0).to_le_bytes())?;
                writer.write_all(&(values.len() as u32).to_le_bytes())?;
                for v in values {
                    writer.write_all(&v.to_le_bytes())?;
                }
            }
        }
    }

    // import section
    writer.write_all(&(pz.imports.len() as u32).to_le_bytes())?;
    for import in &pz.imports {
        write_name(writer, &import.name)?;
        match &import.sig {
            Some(sig) => {
                writer.write_all(&[1])?;
                write_sig(writer, sig)?;
            }
            None => writer.write_all(&[0])?,
        }
    }

    // procedure section
    writer.write_all(&(pz.procs.len() as u32).to_le_bytes())?;
    for proc in &pz.procs {
        write_name(writer, &proc.name)?;
        write_sig(writer, &proc.sig)?;
        match &proc.blocks {
            None => writer.write_all(&0u32.to_le_bytes())?,
            Some(blocks) => {
                writer.write_all(&(blocks.len() as u32).to_le_bytes())?;
                for block in blocks {
                    writer.write_all(&(block.instrs.len() as u32).to_le_bytes())?;
                    for instr in &block.instrs {
                        write_instr(writer, instr)?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn write_data_value<W: Write>(writer: &mut W, width: Width, v: u64) -> io::Result<()> {
    match width {
        Width::W8 => writer.write_all(&[v as u8]),
        Width::W16 => writer.write_all(&(v as u16).to_le_bytes()),
        Width::W32 => writer.write_all(&(v as u32).to_le_bytes()),
        Width::W64 | Width::WFast | Width::WPtr => writer.write_all(&v.to_le_bytes()),
    }
}

fn write_target<W: Write>(writer: &mut W, target: CallTarget) -> io::Result<()> {
    match target {
        CallTarget::Proc(id) => {
            writer.write_all(&[0])?;
            writer.write_all(&id.0.to_le_bytes())
        }
        CallTarget::Import(id) => {
            writer.write_all(&[1])?;
            writer.write_all(&id.0.to_le_bytes())
        }
    }
}

fn write_instr<W: Write>(writer: &mut W, instr: &Instr) -> io::Result<()> {
    match instr {
        Instr::LoadImmediate(w, n) => {
            writer.write_all(&[0x01, width_byte(*w)])?;
            writer.write_all(&n.to_le_bytes())
        }
        Instr::LoadData(id) => {
            writer.write_all(&[0x02])?;
            writer.write_all(&id.0.to_le_bytes())
        }
        Instr::Add(w) => writer.write_all(&[0x10, width_byte(*w)]),
        Instr::Sub(w) => writer.write_all(&[0x11, width_byte(*w)]),
        Instr::Mul(w) => writer.write_all(&[0x12, width_byte(*w)]),
        Instr::Div(w) => writer.write_all(&[0x13, width_byte(*w)]),
        Instr::Mod(w) => writer.write_all(&[0x14, width_byte(*w)]),
        Instr::And(w) => writer.write_all(&[0x15, width_byte(*w)]),
        Instr::Or(w) => writer.write_all(&[0x16, width_byte(*w)]),
        Instr::Xor(w) => writer.write_all(&[0x17, width_byte(*w)]),
        Instr::Not(w) => writer.write_all(&[0x18, width_byte(*w)]),
        Instr::Lshift(w) => writer.write_all(&[0x19, width_byte(*w)]),
        Instr::Rshift(w) => writer.write_all(&[0x1a, width_byte(*w)]),
        Instr::Lt(w) => writer.write_all(&[0x1b, width_byte(*w)]),
        Instr::Gt(w) => writer.write_all(&[0x1c, width_byte(*w)]),
        Instr::Eq(w) => writer.write_all(&[0x1d, width_byte(*w)]),
        Instr::Drop => writer.write_all(&[0x20]),
        Instr::Pick(n) => {
            writer.write_all(&[0x21])?;
            writer.write_all(&n.to_le_bytes())
        }
        Instr::Roll(n) => {
            writer.write_all(&[0x22])?;
            writer.write_all(&n.to_le_bytes())
        }
        Instr::Call(t) => {
            writer.write_all(&[0x30])?;
            write_target(writer, *t)
        }
        Instr::TCall(t) => {
            writer.write_all(&[0x31])?;
            write_target(writer, *t)
        }
        Instr::CJmp(b) => {
            writer.write_all(&[0x32])?;
            writer.write_all(&(*b as u32).to_le_bytes())
        }
        Instr::Jmp(b) => {
            writer.write_all(&[0x33])?;
            writer.write_all(&(*b as u32).to_le_bytes())
        }
        Instr::Ret => writer.write_all(&[0x34]),
        Instr::Alloc(id) => {
            writer.write_all(&[0x40])?;
            writer.write_all(&id.0.to_le_bytes())
        }
        Instr::Store(id, f) => {
            writer.write_all(&[0x41])?;
            writer.write_all(&id.0.to_le_bytes())?;
            writer.write_all(&f.to_le_bytes())
        }
        Instr::Load(id, f, w) => {
            writer.write_all(&[0x42])?;
            writer.write_all(&id.0.to_le_bytes())?;
            writer.write_all(&f.to_le_bytes())?;
            writer.write_all(&[width_byte(*w)])
        }
    }
}
