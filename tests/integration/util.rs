//! Builders for core IR test programs

#![allow(dead_code)]

use plasma::builtins::Builtins;
use plasma::core::{
    Body, Case, Const, Core, CtorId, Expr, ExprKind, FuncId, Function, Let, QName, Signature,
    Type, Var, Varmap,
};
use plasma::middle::{arity, typecheck};
use plasma::util::loc::Loc;
use plasma::util::report::ErrorCollector;
use std::collections::BTreeSet;

pub fn loc(line: u32) -> Loc {
    Loc::new("test.p", line)
}

pub fn num(n: i64) -> Expr {
    Expr::new(ExprKind::Const(Const::Num(n)), loc(1))
}

pub fn string(s: &str) -> Expr {
    Expr::new(ExprKind::Const(Const::Str(s.to_string())), loc(1))
}

pub fn var_ref(v: Var) -> Expr {
    Expr::new(ExprKind::Var(v), loc(1))
}

pub fn ctor_const(c: CtorId) -> Expr {
    Expr::new(ExprKind::Const(Const::Ctor(c)), loc(1))
}

pub fn call(f: FuncId, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Call(f, args), loc(1))
}

pub fn construct(c: CtorId, args: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Construct(c, args), loc(1))
}

pub fn seq(exprs: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Seq(exprs), loc(1))
}

pub fn tuple(exprs: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::Tuple(exprs), loc(1))
}

pub fn let_in(vars: Vec<Var>, rhs: Expr, body: Expr) -> Expr {
    Expr::new(
        ExprKind::Let(Let {
            vars,
            rhs: Box::new(rhs),
            body: Box::new(body),
        }),
        loc(1),
    )
}

pub fn match_on(scrut: Var, cases: Vec<Case>) -> Expr {
    Expr::new(ExprKind::Match(scrut, cases), loc(1))
}

pub fn bool_ty(builtins: &Builtins) -> Type {
    Type::Ref(builtins.bool_ty, vec![])
}

pub fn list_of(builtins: &Builtins, elem: Type) -> Type {
    Type::Ref(builtins.list_ty, vec![elem])
}

/// Declare a function without a body, so recursive bodies can refer to
/// its id.
pub fn declare(core: &mut Core, name: &str, inputs: Vec<Type>, outputs: Vec<Type>) -> FuncId {
    core.add_func(Function::new(
        QName::single(name),
        Signature::new(inputs, outputs),
        loc(1),
    ))
}

/// Attach a body; the closure receives the varmap and the parameter
/// variables.
pub fn set_body(
    core: &mut Core,
    id: FuncId,
    make: impl FnOnce(&mut Varmap, &[Var]) -> Expr,
) {
    let num_inputs = core.func(id).sig.inputs.len();
    let mut varmap = Varmap::new();
    let params: Vec<Var> = (0..num_inputs)
        .map(|i| varmap.alloc(format!("p{}", i)))
        .collect();
    let expr = make(&mut varmap, &params);
    core.set_body(id, Body::new(varmap, params, expr));
}

/// Declare and define in one step
pub fn define(
    core: &mut Core,
    name: &str,
    inputs: Vec<Type>,
    outputs: Vec<Type>,
    make: impl FnOnce(&mut Varmap, &[Var]) -> Expr,
) -> FuncId {
    let id = declare(core, name, inputs, outputs);
    set_body(core, id, make);
    id
}

/// Run arity and type inference, returning the diagnostics and the
/// failed set.
pub fn infer(core: &mut Core) -> (ErrorCollector, BTreeSet<FuncId>) {
    core.compute_sccs();
    let mut errors = ErrorCollector::new();
    let failed = arity::run(core, &mut errors);
    let failed = typecheck::run(core, failed, &mut errors).expect("no internal errors");
    (errors, failed)
}

/// Run arity inference only
pub fn infer_arity(core: &mut Core) -> (ErrorCollector, BTreeSet<FuncId>) {
    core.compute_sccs();
    let mut errors = ErrorCollector::new();
    let failed = arity::run(core, &mut errors);
    (errors, failed)
}
