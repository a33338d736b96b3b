//! Arity inference
//!
//! Plasma expressions are multiple-return: every sub-expression produces
//! zero or more values. This pass decides how many, writing the count
//! into each expression's [`CodeInfo`](crate::core::CodeInfo), because
//! every downstream pass needs it.
//!
//! The driver walks call-graph SCCs in dependency order, so a callee's
//! declared arity is always available when a caller is annotated. Only
//! singleton components are supported; inference over larger components
//! is a known limitation.

use crate::core::{Core, Expr, ExprKind, FuncId};
use crate::util::report::{DiagKind, ErrorCollector, Limitation};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

struct CalleeSig {
    name: String,
    num_inputs: usize,
    arity: usize,
}

/// Annotate every function body; returns the set of functions whose
/// annotation failed, so later passes can skip them.
pub fn run(core: &mut Core, errors: &mut ErrorCollector) -> BTreeSet<FuncId> {
    let sigs: HashMap<FuncId, CalleeSig> = core
        .func_ids()
        .map(|id| {
            let f = core.func(id);
            (
                id,
                CalleeSig {
                    name: f.name.to_string(),
                    num_inputs: f.sig.inputs.len(),
                    arity: f.sig.arity,
                },
            )
        })
        .collect();

    let mut failed = BTreeSet::new();
    let sccs: Vec<Vec<FuncId>> = core.sccs().to_vec();
    for scc in sccs {
        if scc.len() > 1 {
            let funcs: Vec<String> = scc.iter().map(|id| sigs[id].name.clone()).collect();
            let loc = core.func(scc[0]).loc.clone();
            errors.report_limitation(
                loc,
                Limitation::MutualRecursion {
                    funcs: funcs.join(", "),
                },
            );
            failed.extend(scc);
            continue;
        }

        let id = scc[0];
        let Some(mut body) = core.take_body(id) else {
            continue;
        };
        debug!("arity: {}", sigs[&id].name);

        let before = errors.len();
        let found = annotate(&sigs, &mut body.expr, errors);
        let declared = sigs[&id].arity;
        if found != declared {
            errors.report(
                body.expr.info.loc.clone(),
                DiagKind::ArityMismatchFunc {
                    func: sigs[&id].name.clone(),
                    expected: declared,
                    found,
                },
            );
        }
        core.set_body(id, body);
        if errors.len() > before {
            failed.insert(id);
        }
    }

    failed
}

/// Annotate one expression; returns its arity.
fn annotate(
    sigs: &HashMap<FuncId, CalleeSig>,
    expr: &mut Expr,
    errors: &mut ErrorCollector,
) -> usize {
    let arity = match &mut expr.kind {
        ExprKind::Seq(exprs) => {
            let mut last = 0;
            for e in exprs.iter_mut() {
                last = annotate(sigs, e, errors);
            }
            last
        }
        ExprKind::Let(l) => {
            let rhs = annotate(sigs, &mut l.rhs, errors);
            if rhs != l.vars.len() {
                errors.report(
                    l.rhs.info.loc.clone(),
                    DiagKind::ArityMismatch {
                        expected: l.vars.len(),
                        found: rhs,
                    },
                );
            }
            annotate(sigs, &mut l.body, errors)
        }
        ExprKind::Tuple(exprs) => {
            for e in exprs.iter_mut() {
                single(sigs, e, errors);
            }
            exprs.len()
        }
        ExprKind::Call(f, args) => {
            for a in args.iter_mut() {
                single(sigs, a, errors);
            }
            let sig = &sigs[f];
            if args.len() != sig.num_inputs {
                errors.report(
                    expr.info.loc.clone(),
                    DiagKind::ParameterNumber {
                        callee: sig.name.clone(),
                        expected: sig.num_inputs,
                        found: args.len(),
                    },
                );
            }
            sig.arity
        }
        ExprKind::Var(_) | ExprKind::Const(_) => 1,
        ExprKind::Construct(_, args) => {
            for a in args.iter_mut() {
                single(sigs, a, errors);
            }
            1
        }
        ExprKind::Match(_, cases) => {
            let mut agreed = None;
            for case in cases.iter_mut() {
                let found = annotate(sigs, &mut case.body, errors);
                match agreed {
                    None => agreed = Some(found),
                    Some(expected) if expected != found => {
                        errors.report(
                            case.body.info.loc.clone(),
                            DiagKind::ArityMismatchMatch { expected, found },
                        );
                    }
                    Some(_) => {}
                }
            }
            agreed.unwrap_or(0)
        }
    };
    expr.info.arity = Some(arity);
    arity
}

/// Annotate an expression that must produce exactly one value
fn single(sigs: &HashMap<FuncId, CalleeSig>, expr: &mut Expr, errors: &mut ErrorCollector) {
    let found = annotate(sigs, expr, errors);
    if found != 1 {
        errors.report(
            expr.info.loc.clone(),
            DiagKind::ArityMismatch { expected: 1, found },
        );
    }
}
