//! Arity inference over whole modules

use crate::util::*;
use plasma::core::{ExprKind, Type};
use plasma::util::report::DiagKind;
use plasma::new_module;

#[test]
fn annotations_cover_every_subexpression() {
    let (mut core, _builtins) = new_module("m");
    let f = define(
        &mut core,
        "f",
        vec![],
        vec![Type::int()],
        |varmap, _params| {
            let a = varmap.alloc("a");
            let b = varmap.alloc("b");
            let_in(vec![a, b], tuple(vec![num(1), num(2)]), var_ref(a))
        },
    );
    let (errors, failed) = infer_arity(&mut core);
    assert!(errors.is_empty(), "{}", errors.render());
    assert!(failed.is_empty());

    let body = core.func(f).body.as_ref().unwrap();
    assert_eq!(body.expr.arity(), Some(1));
    let ExprKind::Let(l) = &body.expr.kind else {
        panic!("expected let");
    };
    assert_eq!(l.rhs.arity(), Some(2));
    let ExprKind::Tuple(elems) = &l.rhs.kind else {
        panic!("expected tuple");
    };
    assert!(elems.iter().all(|e| e.arity() == Some(1)));
    assert_eq!(l.body.arity(), Some(1));
}

#[test]
fn call_arguments_must_be_single_valued() {
    let (mut core, builtins) = new_module("m");
    let add = builtins.func("add_int").unwrap();
    define(&mut core, "f", vec![], vec![Type::int()], |_, _| {
        call(add, vec![tuple(vec![num(1), num(2)]), num(3)])
    });
    let (errors, failed) = infer_arity(&mut core);
    assert!(errors
        .iter()
        .any(|d| d.kind == DiagKind::ArityMismatch { expected: 1, found: 2 }));
    assert_eq!(failed.len(), 1);
}

#[test]
fn parameter_count_is_checked() {
    let (mut core, builtins) = new_module("m");
    let add = builtins.func("add_int").unwrap();
    define(&mut core, "f", vec![], vec![Type::int()], |_, _| {
        call(add, vec![num(1)])
    });
    let (errors, _) = infer_arity(&mut core);
    assert!(errors.iter().any(|d| matches!(
        &d.kind,
        DiagKind::ParameterNumber {
            expected: 2,
            found: 1,
            ..
        }
    )));
}

#[test]
fn declared_function_arity_is_cross_checked() {
    let (mut core, _builtins) = new_module("m");
    define(&mut core, "f", vec![], vec![Type::int()], |_, _| {
        tuple(vec![num(1), num(2)])
    });
    let (errors, _) = infer_arity(&mut core);
    assert!(errors.iter().any(|d| matches!(
        &d.kind,
        DiagKind::ArityMismatchFunc {
            expected: 1,
            found: 2,
            ..
        }
    )));
}

#[test]
fn match_cases_must_agree() {
    let (mut core, builtins) = new_module("m");
    define(
        &mut core,
        "f",
        vec![bool_ty(&builtins)],
        vec![Type::int()],
        |_, params| {
            match_on(
                params[0],
                vec![
                    plasma::core::Case::new(
                        plasma::core::Pattern::Ctor(builtins.true_ctor, vec![]),
                        num(1),
                    ),
                    plasma::core::Case::new(
                        plasma::core::Pattern::Ctor(builtins.false_ctor, vec![]),
                        tuple(vec![num(1), num(2)]),
                    ),
                ],
            )
        },
    );
    let (errors, _) = infer_arity(&mut core);
    assert!(errors.iter().any(|d| matches!(
        &d.kind,
        DiagKind::ArityMismatchMatch {
            expected: 1,
            found: 2
        }
    )));
}

#[test]
fn mutual_recursion_is_a_named_limitation() {
    let (mut core, _builtins) = new_module("m");
    let f = declare(&mut core, "f", vec![], vec![Type::int()]);
    let g = declare(&mut core, "g", vec![], vec![Type::int()]);
    set_body(&mut core, f, |_, _| call(g, vec![]));
    set_body(&mut core, g, |_, _| call(f, vec![]));
    let (errors, failed) = infer_arity(&mut core);
    assert!(errors.render().contains("mutual recursion"));
    assert!(failed.contains(&f) && failed.contains(&g));
}

#[test]
fn reannotation_is_a_no_op() {
    let (mut core, builtins) = new_module("m");
    let add = builtins.func("add_int").unwrap();
    let f = define(&mut core, "f", vec![], vec![Type::int()], |varmap, _| {
        let a = varmap.alloc("a");
        let_in(
            vec![a],
            num(1),
            call(add, vec![var_ref(a), num(2)]),
        )
    });
    let (errors, _) = infer_arity(&mut core);
    assert!(errors.is_empty(), "{}", errors.render());
    let first = format!("{:?}", core.func(f).body);

    let (errors, _) = infer_arity(&mut core);
    assert!(errors.is_empty());
    let second = format!("{:?}", core.func(f).body);
    assert_eq!(first, second);
}
