//! The PZ bytecode program model
//!
//! A [`Pz`] holds everything the code generator produces and the
//! serializer consumes: struct layouts, constant data, imported
//! procedures, and procedure bodies made of instruction blocks. Like the
//! core tables, ids are allocated by monotonic counters and never reused.

pub mod asm;
pub mod pretty;
pub mod verify;
pub mod write;

use crate::core::QName;
use std::fmt;

/// Number of low pointer bits reserved for the primary tag.
///
/// This is an ABI contract with the VM runtime; changing it requires a
/// coordinated change there.
pub const NUM_PTAG_BITS: u32 = 2;

/// Largest representable primary tag value
pub const MAX_PTAG: u64 = (1 << NUM_PTAG_BITS) - 1;

macro_rules! pz_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            pub fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

pz_id!(
    /// Id of a struct layout
    PzStructId,
    "struct_"
);
pz_id!(
    /// Id of a constant data entry
    PzDataId,
    "data_"
);
pz_id!(
    /// Id of a procedure
    PzProcId,
    "proc_"
);
pz_id!(
    /// Id of an imported procedure
    PzImportId,
    "import_"
);

/// An operand or field width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
    /// The fast machine word
    WFast,
    /// A pointer-sized word
    WPtr,
}

impl Width {
    /// The textual-surface spelling of the width
    pub fn name(&self) -> &'static str {
        match self {
            Width::W8 => "w8",
            Width::W16 => "w16",
            Width::W32 => "w32",
            Width::W64 => "w64",
            Width::WFast => "w",
            Width::WPtr => "ptr",
        }
    }

    /// Parse a textual-surface width name
    pub fn from_name(name: &str) -> Option<Width> {
        Some(match name {
            "w8" => Width::W8,
            "w16" => Width::W16,
            "w32" => Width::W32,
            "w64" => Width::W64,
            "w" => Width::WFast,
            "ptr" => Width::WPtr,
            _ => return None,
        })
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A struct layout: the widths of its fields in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PzStruct {
    pub fields: Vec<Width>,
}

impl PzStruct {
    pub fn new(fields: Vec<Width>) -> Self {
        Self { fields }
    }
}

/// A constant data entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PzData {
    /// An array of values of one width
    Array { width: Width, values: Vec<u64> },
    /// A struct of literal values, one per field
    Struct {
        struct_id: PzStructId,
        values: Vec<u64>,
    },
}

/// A procedure signature: stack widths consumed and produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PzSignature {
    pub before: Vec<Width>,
    pub after: Vec<Width>,
}

impl PzSignature {
    pub fn new(before: Vec<Width>, after: Vec<Width>) -> Self {
        Self { before, after }
    }
}

/// An imported procedure, resolved by name at link/run time.
///
/// The signature is known when the import comes from the code generator
/// and unknown when the assembler inferred the import from a call to an
/// undefined name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PzImport {
    pub name: QName,
    pub sig: Option<PzSignature>,
}

/// The target of a call instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    Proc(PzProcId),
    Import(PzImportId),
}

/// A stack-machine instruction.
///
/// Stack discipline: arguments are pushed left to right before a call;
/// a call consumes its arguments and leaves its results. `pick n` copies
/// the entry at distance `n` from the stack top (`pick 0` duplicates the
/// top); `roll n` moves the entry at distance `n` to the top (`roll 1`
/// swaps). `cjmp` pops a condition and branches to a block when it is
/// non-zero, falling through otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    LoadImmediate(Width, u64),
    /// Push a pointer to a constant data entry
    LoadData(PzDataId),
    Add(Width),
    Sub(Width),
    Mul(Width),
    Div(Width),
    Mod(Width),
    And(Width),
    Or(Width),
    Xor(Width),
    Not(Width),
    Lshift(Width),
    Rshift(Width),
    Lt(Width),
    Gt(Width),
    Eq(Width),
    Drop,
    Pick(u32),
    Roll(u32),
    Call(CallTarget),
    /// Tail call: replaces the current frame
    TCall(CallTarget),
    /// Pop a condition; branch to the block when non-zero
    CJmp(usize),
    Jmp(usize),
    Ret,
    /// Allocate a struct; pushes the pointer
    Alloc(PzStructId),
    /// Pop a pointer and a value below it; store the value into the
    /// field; push the pointer back
    Store(PzStructId, u32),
    /// Pop a struct pointer; push the value of the field
    Load(PzStructId, u32, Width),
}

impl Instr {
    /// The textual-surface mnemonic, without width or operands
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instr::LoadImmediate(..) => "load_immediate",
            Instr::LoadData(_) => "load_data",
            Instr::Add(_) => "add",
            Instr::Sub(_) => "sub",
            Instr::Mul(_) => "mul",
            Instr::Div(_) => "div",
            Instr::Mod(_) => "mod",
            Instr::And(_) => "and",
            Instr::Or(_) => "or",
            Instr::Xor(_) => "xor",
            Instr::Not(_) => "not",
            Instr::Lshift(_) => "lshift",
            Instr::Rshift(_) => "rshift",
            Instr::Lt(_) => "lt",
            Instr::Gt(_) => "gt",
            Instr::Eq(_) => "eq",
            Instr::Drop => "drop",
            Instr::Pick(_) => "pick",
            Instr::Roll(_) => "roll",
            Instr::Call(_) => "call",
            Instr::TCall(_) => "tcall",
            Instr::CJmp(_) => "cjmp",
            Instr::Jmp(_) => "jmp",
            Instr::Ret => "ret",
            Instr::Alloc(_) => "alloc",
            Instr::Store(..) => "store",
            Instr::Load(..) => "load",
        }
    }

    /// Does control never continue past this instruction?
    pub fn is_terminator(&self) -> bool {
        matches!(self, Instr::Jmp(_) | Instr::Ret | Instr::TCall(_))
    }
}

/// One basic block of a procedure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PzBlock {
    pub instrs: Vec<Instr>,
}

/// A procedure: signature plus an optional list of blocks.
///
/// Block indices are the jump targets of `jmp`/`cjmp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PzProc {
    pub name: QName,
    pub sig: PzSignature,
    pub blocks: Option<Vec<PzBlock>>,
}

impl PzProc {
    pub fn new(name: QName, sig: PzSignature) -> Self {
        Self {
            name,
            sig,
            blocks: None,
        }
    }
}

/// An in-memory bytecode program.
#[derive(Debug, Default)]
pub struct Pz {
    pub structs: Vec<PzStruct>,
    pub datas: Vec<PzData>,
    pub procs: Vec<PzProc>,
    pub imports: Vec<PzImport>,
    /// Entry procedure, when the module has one
    pub entry: Option<PzProcId>,
}

impl Pz {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_struct(&mut self, s: PzStruct) -> PzStructId {
        let id = PzStructId::new(self.structs.len() as u32);
        self.structs.push(s);
        id
    }

    pub fn add_data(&mut self, d: PzData) -> PzDataId {
        let id = PzDataId::new(self.datas.len() as u32);
        self.datas.push(d);
        id
    }

    pub fn add_proc(&mut self, p: PzProc) -> PzProcId {
        let id = PzProcId::new(self.procs.len() as u32);
        self.procs.push(p);
        id
    }

    pub fn add_import(&mut self, name: QName, sig: Option<PzSignature>) -> PzImportId {
        let id = PzImportId::new(self.imports.len() as u32);
        self.imports.push(PzImport { name, sig });
        id
    }

    pub fn struct_(&self, id: PzStructId) -> &PzStruct {
        &self.structs[id.index()]
    }

    pub fn data(&self, id: PzDataId) -> &PzData {
        &self.datas[id.index()]
    }

    pub fn proc(&self, id: PzProcId) -> &PzProc {
        &self.procs[id.index()]
    }

    pub fn proc_mut(&mut self, id: PzProcId) -> &mut PzProc {
        &mut self.procs[id.index()]
    }

    pub fn import(&self, id: PzImportId) -> &PzImport {
        &self.imports[id.index()]
    }

    pub fn proc_ids(&self) -> impl Iterator<Item = PzProcId> {
        (0..self.procs.len() as u32).map(PzProcId::new)
    }

    /// Find a procedure by its unqualified name
    pub fn find_proc(&self, name: &str) -> Option<PzProcId> {
        self.procs
            .iter()
            .position(|p| p.name.last() == name)
            .map(|i| PzProcId::new(i as u32))
    }

    /// The signature of a call target, when known
    pub fn target_sig(&self, target: CallTarget) -> Option<&PzSignature> {
        match target {
            CallTarget::Proc(id) => Some(&self.proc(id).sig),
            CallTarget::Import(id) => self.import(id).sig.as_ref(),
        }
    }
}
