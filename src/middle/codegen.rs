//! Lowering to stack bytecode
//!
//! Each core function becomes a procedure of one or more instruction
//! blocks. Arguments are pushed left to right before a call; a call
//! consumes its arguments and leaves its results. Local variables live
//! on the stack and are addressed by a compile-time slot map; `pick`
//! copies one to the top.
//!
//! Matches compile to a test chain in the entry block: the scrutinee is
//! copied once, each alternative compares against its constructor's
//! encoding and conditionally jumps to its own body block, and every
//! body jumps to a join block that holds the match's results. Tag
//! dispatch splits tagged pointers with the runtime's `break_tag`
//! helper.
//!
//! All failures here are compiler bugs: anything a user can get wrong
//! was rejected by arity or type inference.

use crate::builtins::{BuiltinImpl, Builtins};
use crate::core::{
    BuiltinType, Const, Core, CtorId, Expr, ExprKind, FuncId, Pattern, Type, Var,
};
use crate::middle::constdata::DataMap;
use crate::middle::tags::{CtorTagInfo, TagMap};
use crate::pz::{
    CallTarget, Instr, Pz, PzBlock, PzImportId, PzProc, PzProcId, PzSignature, PzStruct,
    PzStructId, Width,
};
use crate::util::report::InternalError;
use std::collections::HashMap;
use tracing::debug;

const PASS: &str = "codegen";

/// The runtime's tag helpers, allocated once per program and referenced
/// by imported id everywhere.
#[derive(Debug, Clone, Copy)]
struct Helpers {
    make_tag: PzImportId,
    shift_make_tag: PzImportId,
    break_tag: PzImportId,
    break_shift_tag: PzImportId,
    unshift_value: PzImportId,
    /// Layout holding a single secondary-tag word
    stag_struct: PzStructId,
}

struct Env {
    helpers: Helpers,
    /// Core functions that became procedures
    func_procs: HashMap<FuncId, PzProcId>,
    /// Core functions that became imports (runtime builtins and
    /// body-less user imports)
    func_imports: HashMap<FuncId, PzImportId>,
    /// Struct layout per pointer-carrying constructor
    ctor_structs: HashMap<CtorId, PzStructId>,
}

/// The stack width of a value of a core type. Type variables and every
/// heap type are pointer words.
fn type_width(ty: &Type) -> Width {
    match ty {
        Type::Builtin(BuiltinType::Int) => Width::WFast,
        Type::Builtin(BuiltinType::Codepoint) => Width::W32,
        Type::Builtin(BuiltinType::String) => Width::WPtr,
        Type::Ref(..) | Type::Var(_) => Width::WPtr,
    }
}

fn func_signature(core: &Core, id: FuncId) -> PzSignature {
    let sig = &core.func(id).sig;
    PzSignature::new(
        sig.inputs.iter().map(type_width).collect(),
        sig.outputs.iter().map(type_width).collect(),
    )
}

/// Lower every function with a body into `pz`.
pub fn run(
    core: &Core,
    builtins: &Builtins,
    tags: &TagMap,
    data: &DataMap,
    pz: &mut Pz,
) -> Result<(), InternalError> {
    let env = setup(core, builtins, tags, pz)?;

    for id in core.func_ids() {
        let Some(body) = &core.func(id).body else {
            continue;
        };
        let proc_id = env.func_procs.get(&id).copied().ok_or_else(|| {
            InternalError::new(PASS, format!("{} has a body but no procedure", core.func(id).name))
        })?;
        debug!("codegen: {}", core.func(id).name);
        let gen = ProcGen {
            core,
            builtins,
            tags,
            data,
            env: &env,
            pz,
            blocks: vec![PzBlock::default()],
            current: 0,
            depth: 0,
            terminated: false,
            vars: HashMap::new(),
        };
        let blocks = gen.generate(body)?;
        pz.proc_mut(proc_id).blocks = Some(blocks);
    }

    pz.entry = core.find_func("main").and_then(|id| env.func_procs.get(&id).copied());
    Ok(())
}

/// Allocate helper imports, constructor structs, and one procedure or
/// import id per core function, so every call site can be resolved
/// before any body is generated.
fn setup(
    core: &Core,
    builtins: &Builtins,
    tags: &TagMap,
    pz: &mut Pz,
) -> Result<Env, InternalError> {
    use crate::core::QName;

    let ptr = Width::WPtr;
    let w = Width::WFast;
    let helpers = Helpers {
        make_tag: pz.add_import(
            QName::builtin("make_tag"),
            Some(PzSignature::new(vec![ptr, w], vec![ptr])),
        ),
        shift_make_tag: pz.add_import(
            QName::builtin("shift_make_tag"),
            Some(PzSignature::new(vec![w, w], vec![w])),
        ),
        break_tag: pz.add_import(
            QName::builtin("break_tag"),
            Some(PzSignature::new(vec![ptr], vec![ptr, w])),
        ),
        break_shift_tag: pz.add_import(
            QName::builtin("break_shift_tag"),
            Some(PzSignature::new(vec![w], vec![w, w])),
        ),
        unshift_value: pz.add_import(
            QName::builtin("unshift_value"),
            Some(PzSignature::new(vec![w], vec![w])),
        ),
        stag_struct: pz.add_struct(PzStruct::new(vec![w])),
    };

    let mut ctor_structs = HashMap::new();
    for (ctor_id, info) in tags.iter() {
        if let CtorTagInfo::TaggedPointer { .. } = info {
            let fields = core
                .ctor(ctor_id)
                .fields
                .iter()
                .map(|f| type_width(&f.ty))
                .collect();
            ctor_structs.insert(ctor_id, pz.add_struct(PzStruct::new(fields)));
        }
    }

    let mut func_procs = HashMap::new();
    let mut func_imports = HashMap::new();
    for id in core.func_ids() {
        let func = core.func(id);
        match builtins.impl_of(id) {
            Some(BuiltinImpl::Inline(_)) => {}
            Some(BuiltinImpl::Runtime(name)) => {
                let import = pz.add_import(name.clone(), Some(func_signature(core, id)));
                func_imports.insert(id, import);
            }
            None => {
                if func.has_body() {
                    let proc = pz.add_proc(PzProc::new(
                        func.name.clone(),
                        func_signature(core, id),
                    ));
                    func_procs.insert(id, proc);
                } else {
                    let import =
                        pz.add_import(func.name.clone(), Some(func_signature(core, id)));
                    func_imports.insert(id, import);
                }
            }
        }
    }

    Ok(Env {
        helpers,
        func_procs,
        func_imports,
        ctor_structs,
    })
}

struct ProcGen<'a> {
    core: &'a Core,
    builtins: &'a Builtins,
    tags: &'a TagMap,
    data: &'a DataMap,
    env: &'a Env,
    pz: &'a Pz,
    blocks: Vec<PzBlock>,
    current: usize,
    /// Current stack depth in the current block
    depth: usize,
    /// The current block already ended in a terminator
    terminated: bool,
    /// Variable to stack-slot map (slots count from the stack bottom)
    vars: HashMap<Var, usize>,
}

impl<'a> ProcGen<'a> {
    fn generate(mut self, body: &crate::core::Body) -> Result<Vec<PzBlock>, InternalError> {
        self.depth = body.params.len();
        for (i, var) in body.params.iter().enumerate() {
            self.vars.insert(*var, i);
        }

        let results = self.arity_of(&body.expr)?;
        self.gen_expr(&body.expr, true)?;
        if !self.terminated {
            // consume the parameters still sitting under the results
            let junk = self.under(results)?;
            self.squash(results, junk)?;
            self.emit(Instr::Ret)?;
        }
        Ok(self.blocks)
    }

    fn arity_of(&self, expr: &Expr) -> Result<usize, InternalError> {
        expr.info.arity.ok_or_else(|| {
            InternalError::new(PASS, format!("missing arity at {}", expr.info.loc))
        })
    }

    fn bug(&self, detail: impl Into<String>) -> InternalError {
        InternalError::new(PASS, detail)
    }

    /// Stack entries below the top `keep`
    fn under(&self, keep: usize) -> Result<usize, InternalError> {
        self.depth
            .checked_sub(keep)
            .ok_or_else(|| self.bug(format!("depth {} below {} results", self.depth, keep)))
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn emit(&mut self, instr: Instr) -> Result<(), InternalError> {
        if self.terminated {
            // dead cleanup after a tail call; nothing to emit
            return Ok(());
        }
        let (pops, pushes) = self.stack_effect(&instr)?;
        if self.depth < pops {
            return Err(self.bug(format!(
                "stack underflow emitting {} at depth {}",
                instr.mnemonic(),
                self.depth
            )));
        }
        self.depth = self.depth - pops + pushes;
        if instr.is_terminator() {
            self.terminated = true;
        }
        self.blocks[self.current].instrs.push(instr);
        Ok(())
    }

    fn stack_effect(&self, instr: &Instr) -> Result<(usize, usize), InternalError> {
        Ok(match instr {
            Instr::LoadImmediate(..) | Instr::LoadData(_) | Instr::Alloc(_) | Instr::Pick(_) => {
                (0, 1)
            }
            Instr::Add(_)
            | Instr::Sub(_)
            | Instr::Mul(_)
            | Instr::Div(_)
            | Instr::Mod(_)
            | Instr::And(_)
            | Instr::Or(_)
            | Instr::Xor(_)
            | Instr::Lshift(_)
            | Instr::Rshift(_)
            | Instr::Lt(_)
            | Instr::Gt(_)
            | Instr::Eq(_) => (2, 1),
            Instr::Not(_) => (1, 1),
            Instr::Drop => (1, 0),
            Instr::Roll(_) | Instr::Jmp(_) | Instr::Ret => (0, 0),
            Instr::CJmp(_) => (1, 0),
            Instr::Store(..) => (2, 1),
            Instr::Load(..) => (1, 1),
            Instr::Call(target) | Instr::TCall(target) => {
                let sig = self
                    .pz
                    .target_sig(*target)
                    .ok_or_else(|| self.bug("call target without a signature"))?;
                (sig.before.len(), sig.after.len())
            }
        })
    }

    fn new_block(&mut self) -> usize {
        self.blocks.push(PzBlock::default());
        self.blocks.len() - 1
    }

    fn switch_to(&mut self, block: usize, depth: usize) {
        self.current = block;
        self.depth = depth;
        self.terminated = false;
    }

    /// Remove `junk` stack entries sitting under the top `keep` entries.
    fn squash(&mut self, keep: usize, junk: usize) -> Result<(), InternalError> {
        for _ in 0..junk {
            if keep > 0 {
                self.emit(Instr::Roll(keep as u32))?;
            }
            self.emit(Instr::Drop)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Generate an expression, leaving its results on the stack. `tail`
    /// is true when a call here would be the function's last work, so
    /// it may become `tcall`.
    fn gen_expr(&mut self, expr: &Expr, tail: bool) -> Result<(), InternalError> {
        match &expr.kind {
            ExprKind::Var(v) => {
                let distance = self.distance_to(*v)?;
                self.emit(Instr::Pick(distance))?;
            }
            ExprKind::Const(Const::Num(n)) => {
                self.emit(Instr::LoadImmediate(Width::WFast, *n as u64))?;
            }
            ExprKind::Const(Const::Str(s)) => {
                let id = self
                    .data
                    .get(s)
                    .copied()
                    .ok_or_else(|| self.bug(format!("string literal {:?} was not interned", s)))?;
                self.emit(Instr::LoadData(id))?;
            }
            ExprKind::Const(Const::Ctor(ctor_id)) => {
                self.gen_ctor_constant(*ctor_id)?;
            }
            ExprKind::Const(Const::Func(_)) => {
                return Err(self.bug(format!(
                    "function value reached code generation at {}",
                    expr.info.loc
                )));
            }
            ExprKind::Seq(exprs) => {
                let (last, init) = exprs
                    .split_last()
                    .ok_or_else(|| self.bug("empty sequence"))?;
                for e in init {
                    self.gen_expr(e, false)?;
                    let produced = self.arity_of(e)?;
                    for _ in 0..produced {
                        self.emit(Instr::Drop)?;
                    }
                }
                self.gen_expr(last, tail)?;
            }
            ExprKind::Tuple(exprs) => {
                for e in exprs {
                    self.gen_expr(e, false)?;
                }
            }
            ExprKind::Let(l) => {
                self.gen_expr(&l.rhs, false)?;
                let n = l.vars.len();
                let base = self.under(n)?;
                for (i, var) in l.vars.iter().enumerate() {
                    self.vars.insert(*var, base + i);
                }
                self.gen_expr(&l.body, tail)?;
                if !self.terminated {
                    let keep = self.arity_of(&l.body)?;
                    self.squash(keep, n)?;
                }
                for var in &l.vars {
                    self.vars.remove(var);
                }
            }
            ExprKind::Call(f, args) => {
                for a in args {
                    self.gen_expr(a, false)?;
                }
                self.gen_call(*f, args.len(), tail)?;
            }
            ExprKind::Construct(ctor_id, args) => {
                self.gen_construct(*ctor_id, args)?;
            }
            ExprKind::Match(scrut, cases) => {
                let arity = self.arity_of(expr)?;
                self.gen_match(*scrut, cases, arity)?;
            }
        }
        Ok(())
    }

    fn slot(&self, var: Var) -> Result<usize, InternalError> {
        self.vars
            .get(&var)
            .copied()
            .ok_or_else(|| self.bug(format!("variable {} has no stack slot", var)))
    }

    /// Distance of a variable's slot from the stack top
    fn distance_to(&self, var: Var) -> Result<u32, InternalError> {
        let slot = self.slot(var)?;
        self.depth
            .checked_sub(slot + 1)
            .map(|d| d as u32)
            .ok_or_else(|| {
                self.bug(format!(
                    "slot {} of {} above stack depth {}",
                    slot, var, self.depth
                ))
            })
    }

    fn tag_of(&self, ctor_id: CtorId) -> Result<CtorTagInfo, InternalError> {
        self.tags
            .get(ctor_id)
            .ok_or_else(|| self.bug(format!("constructor {} has no tag", ctor_id)))
    }

    /// The constant encoding of a nullary constructor
    fn gen_ctor_constant(&mut self, ctor_id: CtorId) -> Result<(), InternalError> {
        let info = self.tag_of(ctor_id)?;
        let word = info.constant_word().ok_or_else(|| {
            self.bug(format!(
                "constant use of pointer-tagged constructor {}",
                self.core.ctor(ctor_id).name
            ))
        })?;
        let width = match info {
            CtorTagInfo::ConstantNotag { .. } => Width::WFast,
            _ => Width::WPtr,
        };
        self.emit(Instr::LoadImmediate(width, word))
    }

    fn gen_call(&mut self, f: FuncId, num_args: usize, tail: bool) -> Result<(), InternalError> {
        let builtins = self.builtins;
        match builtins.impl_of(f) {
            Some(BuiltinImpl::Inline(instrs)) => {
                for i in instrs {
                    self.emit(i.clone())?;
                }
            }
            Some(BuiltinImpl::Runtime(_)) => {
                let import = self.env.func_imports.get(&f).copied().ok_or_else(|| {
                    self.bug(format!("runtime builtin {} has no import", self.core.func(f).name))
                })?;
                self.emit(Instr::Call(CallTarget::Import(import)))?;
            }
            None => {
                if let Some(&proc) = self.env.func_procs.get(&f) {
                    if tail {
                        // nothing may remain under the arguments when
                        // the frame is replaced
                        let junk = self.under(num_args)?;
                        self.squash(num_args, junk)?;
                        self.emit(Instr::TCall(CallTarget::Proc(proc)))?;
                    } else {
                        self.emit(Instr::Call(CallTarget::Proc(proc)))?;
                    }
                } else if let Some(&import) = self.env.func_imports.get(&f) {
                    self.emit(Instr::Call(CallTarget::Import(import)))?;
                } else {
                    return Err(self.bug(format!(
                        "call to {} which is neither proc nor import",
                        self.core.func(f).name
                    )));
                }
            }
        }
        Ok(())
    }

    fn gen_construct(&mut self, ctor_id: CtorId, args: &[Expr]) -> Result<(), InternalError> {
        let info = self.tag_of(ctor_id)?;
        match info {
            CtorTagInfo::ConstantNotag { .. } | CtorTagInfo::Constant { .. } => {
                if !args.is_empty() {
                    return Err(self.bug(format!(
                        "constant constructor {} constructed with arguments",
                        self.core.ctor(ctor_id).name
                    )));
                }
                self.gen_ctor_constant(ctor_id)
            }
            CtorTagInfo::TaggedPointer { ptag } => {
                for a in args {
                    self.gen_expr(a, false)?;
                }
                let struct_id = self.env.ctor_structs.get(&ctor_id).copied().ok_or_else(|| {
                    self.bug(format!(
                        "constructor {} has no struct layout",
                        self.core.ctor(ctor_id).name
                    ))
                })?;
                self.emit(Instr::Alloc(struct_id))?;
                for field in (0..args.len()).rev() {
                    self.emit(Instr::Store(struct_id, field as u32))?;
                }
                self.emit(Instr::LoadImmediate(Width::WFast, u64::from(ptag)))?;
                self.emit(Instr::Call(CallTarget::Import(self.env.helpers.make_tag)))
            }
        }
    }

    // ------------------------------------------------------------------
    // Match
    // ------------------------------------------------------------------

    fn gen_match(
        &mut self,
        scrut: Var,
        cases: &[crate::core::Case],
        arity: usize,
    ) -> Result<(), InternalError> {
        if cases.is_empty() {
            return Err(self.bug("match with no cases"));
        }
        let base = self.depth;

        // one copy of the scrutinee feeds the whole test chain
        let distance = self.distance_to(scrut)?;
        self.emit(Instr::Pick(distance))?;

        let body_blocks: Vec<usize> = cases.iter().map(|_| self.new_block()).collect();
        let join = self.new_block();

        // test chain: primary criteria compared in order; the final
        // alternative is the default, which the front end's
        // exhaustiveness guarantee makes safe
        let last = cases.len() - 1;
        for (i, case) in cases.iter().enumerate() {
            if i == last || self.irrefutable(&case.pattern) {
                self.emit(Instr::Jmp(body_blocks[i]))?;
                break;
            }
            self.gen_pattern_test(&case.pattern)?;
            self.emit(Instr::CJmp(body_blocks[i]))?;
        }

        for (i, case) in cases.iter().enumerate() {
            self.switch_to(body_blocks[i], base + 1);
            let bound = self.gen_pattern_binds(&case.pattern, base)?;
            self.gen_expr(&case.body, false)?;
            if !self.terminated {
                self.squash(arity, bound.junk)?;
                self.emit(Instr::Jmp(join))?;
            }
            for var in bound.vars {
                self.vars.remove(&var);
            }
        }

        self.switch_to(join, base + arity);
        Ok(())
    }

    fn irrefutable(&self, pattern: &Pattern) -> bool {
        matches!(pattern, Pattern::Bind(_) | Pattern::Wildcard)
    }

    /// Emit the comparison for one alternative. Expects the scrutinee
    /// copy on top, leaves it there plus the test result; the caller's
    /// `cjmp` consumes the result.
    fn gen_pattern_test(&mut self, pattern: &Pattern) -> Result<(), InternalError> {
        match pattern {
            Pattern::Num(n) => {
                self.emit(Instr::Pick(0))?;
                self.emit(Instr::LoadImmediate(Width::WFast, *n as u64))?;
                self.emit(Instr::Eq(Width::WFast))?;
            }
            Pattern::Ctor(ctor_id, _) => {
                let info = self.tag_of(*ctor_id)?;
                match info {
                    CtorTagInfo::ConstantNotag { word } => {
                        self.emit(Instr::Pick(0))?;
                        self.emit(Instr::LoadImmediate(Width::WFast, word))?;
                        self.emit(Instr::Eq(Width::WFast))?;
                    }
                    CtorTagInfo::Constant { .. } => {
                        let word = info
                            .constant_word()
                            .ok_or_else(|| self.bug("constant tag without encoding"))?;
                        self.emit(Instr::Pick(0))?;
                        self.emit(Instr::LoadImmediate(Width::WPtr, word))?;
                        self.emit(Instr::Eq(Width::WPtr))?;
                    }
                    CtorTagInfo::TaggedPointer { ptag } => {
                        // split off the primary tag and compare it
                        self.emit(Instr::Pick(0))?;
                        self.emit(Instr::Call(CallTarget::Import(self.env.helpers.break_tag)))?;
                        self.emit(Instr::Roll(1))?;
                        self.emit(Instr::Drop)?;
                        self.emit(Instr::LoadImmediate(Width::WFast, u64::from(ptag)))?;
                        self.emit(Instr::Eq(Width::WFast))?;
                    }
                }
            }
            Pattern::Bind(_) | Pattern::Wildcard => {
                return Err(self.bug("test emitted for an irrefutable pattern"));
            }
        }
        Ok(())
    }

    /// Per-case body prologue: consume or bind the scrutinee copy on
    /// top of the stack, binding pattern variables to slots.
    fn gen_pattern_binds(
        &mut self,
        pattern: &Pattern,
        base: usize,
    ) -> Result<CaseBindings, InternalError> {
        match pattern {
            Pattern::Num(_) | Pattern::Wildcard => {
                self.emit(Instr::Drop)?;
                Ok(CaseBindings::default())
            }
            Pattern::Bind(var) => {
                self.vars.insert(*var, base);
                Ok(CaseBindings {
                    junk: 1,
                    vars: vec![*var],
                })
            }
            Pattern::Ctor(ctor_id, binds) => {
                let info = self.tag_of(*ctor_id)?;
                match info {
                    CtorTagInfo::ConstantNotag { .. } | CtorTagInfo::Constant { .. } => {
                        self.emit(Instr::Drop)?;
                        Ok(CaseBindings::default())
                    }
                    CtorTagInfo::TaggedPointer { .. } => {
                        let struct_id =
                            self.env.ctor_structs.get(ctor_id).copied().ok_or_else(|| {
                                self.bug(format!(
                                    "constructor {} has no struct layout",
                                    self.core.ctor(*ctor_id).name
                                ))
                            })?;
                        let fields = self.core.ctor(*ctor_id).fields.clone();
                        if fields.len() != binds.len() {
                            return Err(self.bug(format!(
                                "pattern for {} binds {} of {} fields",
                                self.core.ctor(*ctor_id).name,
                                binds.len(),
                                fields.len()
                            )));
                        }
                        // untag, then load every field above the pointer
                        self.emit(Instr::Call(CallTarget::Import(self.env.helpers.break_tag)))?;
                        self.emit(Instr::Drop)?;
                        for (i, field) in fields.iter().enumerate() {
                            self.emit(Instr::Pick(i as u32))?;
                            self.emit(Instr::Load(
                                struct_id,
                                i as u32,
                                type_width(&field.ty),
                            ))?;
                        }
                        let mut vars = Vec::with_capacity(binds.len());
                        for (i, bind) in binds.iter().enumerate() {
                            self.vars.insert(*bind, base + 1 + i);
                            vars.push(*bind);
                        }
                        Ok(CaseBindings {
                            junk: 1 + fields.len(),
                            vars,
                        })
                    }
                }
            }
        }
    }
}

#[derive(Default)]
struct CaseBindings {
    /// Slots under the case results that must go before the join
    junk: usize,
    /// Pattern variables to unbind when the case ends
    vars: Vec<Var>,
}
