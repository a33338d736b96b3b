//! The builtin module
//!
//! A fixed set of operators, types and resources is installed into
//! every [`Core`] before compilation. Each builtin function is one of:
//!
//! - *inline*: a canned instruction sequence the code generator splices
//!   in place of the call;
//! - *core*: a real core body, compiled like user code
//!   (`bool_to_string` is one);
//! - *runtime*: a named import the runtime resolves.
//!
//! The operator table itself is immutable and constructed once; the
//! per-module ids live in the [`Builtins`] value the driver threads to
//! the passes that need them.

use crate::core::{
    Body, Case, Constructor, Core, CtorId, Expr, ExprKind, Field, FuncId, Function, Pattern, QName,
    Resource, ResourceId, Signature, Type, TypeDef, TypeId, Varmap,
};
use crate::pz::{Instr, Width};
use crate::util::loc::Loc;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// How a builtin function is implemented
#[derive(Debug, Clone)]
pub enum BuiltinImpl {
    /// Splice this instruction sequence at every call site
    Inline(Vec<Instr>),
    /// A named import resolved by the runtime
    Runtime(QName),
}

/// Ids of the installed builtin entities, plus the implementation table
/// the code generator consults.
#[derive(Debug)]
pub struct Builtins {
    pub bool_ty: TypeId,
    pub false_ctor: CtorId,
    pub true_ctor: CtorId,
    pub list_ty: TypeId,
    pub nil_ctor: CtorId,
    pub cons_ctor: CtorId,
    pub io: ResourceId,
    pub environment: ResourceId,
    pub time: ResourceId,
    impls: BTreeMap<FuncId, BuiltinImpl>,
    funcs: BTreeMap<&'static str, FuncId>,
}

impl Builtins {
    /// The implementation of a builtin function; `None` for functions
    /// with real core bodies (builtin or user)
    pub fn impl_of(&self, id: FuncId) -> Option<&BuiltinImpl> {
        self.impls.get(&id)
    }

    /// Look up a builtin function id by name
    pub fn func(&self, name: &str) -> Option<FuncId> {
        self.funcs.get(name).copied()
    }
}

#[derive(Clone, Copy)]
enum SigTy {
    Int,
    Str,
    Bool,
}

#[derive(Clone, Copy)]
enum Res {
    Io,
    Env,
    Time,
}

enum Impl {
    Inline(&'static [Instr]),
    Runtime,
    Core,
}

struct BuiltinSpec {
    name: &'static str,
    inputs: &'static [SigTy],
    outputs: &'static [SigTy],
    body: Impl,
    uses: &'static [Res],
    observes: &'static [Res],
}

const W: Width = Width::WFast;

/// The fixed operator and runtime-function table.
static BUILTIN_FUNCS: Lazy<Vec<BuiltinSpec>> = Lazy::new(|| {
    use Impl::{Core as CoreBody, Inline, Runtime};
    use SigTy::{Bool, Int, Str};

    fn op(
        name: &'static str,
        inputs: &'static [SigTy],
        outputs: &'static [SigTy],
        instrs: &'static [Instr],
    ) -> BuiltinSpec {
        BuiltinSpec {
            name,
            inputs,
            outputs,
            body: Inline(instrs),
            uses: &[],
            observes: &[],
        }
    }

    vec![
        // arithmetic
        op("add_int", &[Int, Int], &[Int], &[Instr::Add(W)]),
        op("sub_int", &[Int, Int], &[Int], &[Instr::Sub(W)]),
        op("mul_int", &[Int, Int], &[Int], &[Instr::Mul(W)]),
        op("div_int", &[Int, Int], &[Int], &[Instr::Div(W)]),
        op("mod_int", &[Int, Int], &[Int], &[Instr::Mod(W)]),
        // bitwise
        op("and_int", &[Int, Int], &[Int], &[Instr::And(W)]),
        op("or_int", &[Int, Int], &[Int], &[Instr::Or(W)]),
        op("xor_int", &[Int, Int], &[Int], &[Instr::Xor(W)]),
        op("comp_int", &[Int], &[Int], &[Instr::Not(W)]),
        op("lshift_int", &[Int, Int], &[Int], &[Instr::Lshift(W)]),
        op("rshift_int", &[Int, Int], &[Int], &[Instr::Rshift(W)]),
        // comparison; booleans are the strict-enum words 0 and 1
        op("lt_int", &[Int, Int], &[Bool], &[Instr::Lt(W)]),
        op("gt_int", &[Int, Int], &[Bool], &[Instr::Gt(W)]),
        op("eq_int", &[Int, Int], &[Bool], &[Instr::Eq(W)]),
        op(
            "neq_int",
            &[Int, Int],
            &[Bool],
            &[Instr::Eq(W), Instr::LoadImmediate(W, 0), Instr::Eq(W)],
        ),
        op(
            "lte_int",
            &[Int, Int],
            &[Bool],
            &[Instr::Gt(W), Instr::LoadImmediate(W, 0), Instr::Eq(W)],
        ),
        op(
            "gte_int",
            &[Int, Int],
            &[Bool],
            &[Instr::Lt(W), Instr::LoadImmediate(W, 0), Instr::Eq(W)],
        ),
        // boolean
        op("and_bool", &[Bool, Bool], &[Bool], &[Instr::And(W)]),
        op("or_bool", &[Bool, Bool], &[Bool], &[Instr::Or(W)]),
        op(
            "not_bool",
            &[Bool],
            &[Bool],
            &[Instr::LoadImmediate(W, 0), Instr::Eq(W)],
        ),
        // runtime functions
        BuiltinSpec {
            name: "print",
            inputs: &[Str],
            outputs: &[],
            body: Runtime,
            uses: &[Res::Io],
            observes: &[],
        },
        BuiltinSpec {
            name: "int_to_string",
            inputs: &[Int],
            outputs: &[Str],
            body: Runtime,
            uses: &[],
            observes: &[],
        },
        BuiltinSpec {
            name: "bool_to_string",
            inputs: &[Bool],
            outputs: &[Str],
            body: CoreBody,
            uses: &[],
            observes: &[],
        },
        BuiltinSpec {
            name: "concat_string",
            inputs: &[Str, Str],
            outputs: &[Str],
            body: Runtime,
            uses: &[],
            observes: &[],
        },
        BuiltinSpec {
            name: "setenv",
            inputs: &[Str, Str],
            outputs: &[],
            body: Runtime,
            uses: &[Res::Env],
            observes: &[],
        },
        BuiltinSpec {
            name: "gettimeofday",
            inputs: &[],
            outputs: &[Int, Int],
            body: Runtime,
            uses: &[],
            observes: &[Res::Time],
        },
        BuiltinSpec {
            name: "set_parameter",
            inputs: &[Str, Int],
            outputs: &[],
            body: Runtime,
            uses: &[Res::Env],
            observes: &[],
        },
        BuiltinSpec {
            name: "die",
            inputs: &[Str],
            outputs: &[],
            body: Runtime,
            uses: &[Res::Io],
            observes: &[],
        },
    ]
});

/// Install the builtin module into a fresh [`Core`].
pub fn install(core: &mut Core) -> Builtins {
    let loc = Loc::builtin();

    let io = core.add_resource(Resource::new(QName::builtin("IO")));
    let environment = core.add_resource(Resource::new(QName::builtin("Environment")));
    let time = core.add_resource(Resource::new(QName::builtin("Time")));

    // declaration order makes False equal 0 and True equal 1
    let bool_ty = core.add_type(TypeDef::new(QName::builtin("Bool"), vec![], loc.clone()));
    let false_ctor = core.add_ctor(
        bool_ty,
        Constructor::new(QName::builtin("False"), vec![], vec![]),
    );
    let true_ctor = core.add_ctor(
        bool_ty,
        Constructor::new(QName::builtin("True"), vec![], vec![]),
    );

    let list_ty = core.add_type(TypeDef::new(
        QName::builtin("List"),
        vec!["t".to_string()],
        loc.clone(),
    ));
    let nil_ctor = core.add_ctor(
        list_ty,
        Constructor::new(QName::builtin("Nil"), vec!["t".to_string()], vec![]),
    );
    let cons_ctor = core.add_ctor(
        list_ty,
        Constructor::new(
            QName::builtin("Cons"),
            vec!["t".to_string()],
            vec![
                Field::new("head", Type::var("t")),
                Field::new("tail", Type::Ref(list_ty, vec![Type::var("t")])),
            ],
        ),
    );

    let mut builtins = Builtins {
        bool_ty,
        false_ctor,
        true_ctor,
        list_ty,
        nil_ctor,
        cons_ctor,
        io,
        environment,
        time,
        impls: BTreeMap::new(),
        funcs: BTreeMap::new(),
    };

    let sig_ty = |t: &SigTy| match t {
        SigTy::Int => Type::int(),
        SigTy::Str => Type::string(),
        SigTy::Bool => Type::Ref(bool_ty, vec![]),
    };
    let res_id = |r: &Res| match r {
        Res::Io => io,
        Res::Env => environment,
        Res::Time => time,
    };

    for spec in BUILTIN_FUNCS.iter() {
        let sig = Signature::new(
            spec.inputs.iter().map(sig_ty).collect(),
            spec.outputs.iter().map(sig_ty).collect(),
        )
        .with_uses(spec.uses.iter().map(res_id).collect())
        .with_observes(spec.observes.iter().map(res_id).collect());
        let func = Function::new(QName::builtin(spec.name), sig, loc.clone());
        let id = core.add_func(func);
        builtins.funcs.insert(spec.name, id);
        match &spec.body {
            Impl::Inline(instrs) => {
                builtins.impls.insert(id, BuiltinImpl::Inline(instrs.to_vec()));
            }
            Impl::Runtime => {
                builtins
                    .impls
                    .insert(id, BuiltinImpl::Runtime(QName::builtin(spec.name)));
            }
            Impl::Core => {}
        }
    }

    let b2s = builtins.funcs["bool_to_string"];
    core.func_mut(b2s).body = Some(bool_to_string_body(&builtins));

    builtins
}

/// `bool_to_string(b) = match b { True -> "True"; False -> "False" }`
fn bool_to_string_body(builtins: &Builtins) -> Body {
    let loc = Loc::builtin();
    let mut varmap = Varmap::new();
    let b = varmap.alloc("b");
    let expr = Expr::new(
        ExprKind::Match(
            b,
            vec![
                Case::new(
                    Pattern::Ctor(builtins.true_ctor, vec![]),
                    Expr::new(ExprKind::Const(crate::core::Const::Str("True".into())), loc.clone()),
                ),
                Case::new(
                    Pattern::Ctor(builtins.false_ctor, vec![]),
                    Expr::new(
                        ExprKind::Const(crate::core::Const::Str("False".into())),
                        loc.clone(),
                    ),
                ),
            ],
        ),
        loc.clone(),
    );
    Body::new(varmap, vec![b], expr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn installs_the_fixed_table() {
        let mut core = Core::new(QName::single("m"));
        let builtins = install(&mut core);
        for name in ["add_int", "print", "bool_to_string", "gettimeofday", "die"] {
            assert!(builtins.func(name).is_some(), "missing builtin {}", name);
        }
        // False before True, Nil before Cons
        assert!(builtins.false_ctor < builtins.true_ctor);
        assert!(builtins.nil_ctor < builtins.cons_ctor);
    }

    #[test]
    fn bool_to_string_has_a_core_body() {
        let mut core = Core::new(QName::single("m"));
        let builtins = install(&mut core);
        let id = builtins.func("bool_to_string").unwrap();
        assert!(core.func(id).has_body());
        assert!(builtins.impl_of(id).is_none());
    }

    #[test]
    fn operators_are_inline() {
        let mut core = Core::new(QName::single("m"));
        let builtins = install(&mut core);
        let add = builtins.func("add_int").unwrap();
        assert!(matches!(
            builtins.impl_of(add),
            Some(BuiltinImpl::Inline(instrs)) if instrs == &[Instr::Add(Width::WFast)]
        ));
    }
}
