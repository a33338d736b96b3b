//! Type inference over whole modules

use crate::util::*;
use plasma::core::{ExprKind, Type};
use plasma::util::report::DiagKind;
use plasma::new_module;

#[test]
fn identity_stays_abstract() {
    let (mut core, _builtins) = new_module("m");
    let id = define(
        &mut core,
        "id",
        vec![Type::var("t")],
        vec![Type::var("t")],
        |_, params| var_ref(params[0]),
    );
    let (errors, failed) = infer(&mut core);
    assert!(errors.is_empty(), "{}", errors.render());
    assert!(failed.is_empty());

    let body = core.func(id).body.as_ref().unwrap();
    assert_eq!(body.expr.info.types, Some(vec![Type::var("t")]));
}

#[test]
fn call_sites_instantiate_independently() {
    let (mut core, _builtins) = new_module("m");
    let id = define(
        &mut core,
        "id",
        vec![Type::var("t")],
        vec![Type::var("t")],
        |_, params| var_ref(params[0]),
    );
    let f = define(
        &mut core,
        "f",
        vec![],
        vec![Type::string()],
        |varmap, _| {
            let a = varmap.alloc("a");
            let_in(
                vec![a],
                call(id, vec![num(3)]),
                call(id, vec![string("hi")]),
            )
        },
    );
    let (errors, _) = infer(&mut core);
    assert!(errors.is_empty(), "{}", errors.render());

    // the first call unified t with Int at that site only
    let body = core.func(f).body.as_ref().unwrap();
    let ExprKind::Let(l) = &body.expr.kind else {
        panic!("expected let");
    };
    assert_eq!(l.rhs.info.types, Some(vec![Type::int()]));
    assert_eq!(l.body.info.types, Some(vec![Type::string()]));
}

#[test]
fn literals_have_builtin_types() {
    let (mut core, _builtins) = new_module("m");
    let f = define(&mut core, "f", vec![], vec![Type::string()], |_, _| {
        string("hello")
    });
    let (errors, _) = infer(&mut core);
    assert!(errors.is_empty(), "{}", errors.render());
    let body = core.func(f).body.as_ref().unwrap();
    assert_eq!(body.expr.info.types, Some(vec![Type::string()]));
}

#[test]
fn output_type_mismatches_are_reported() {
    let (mut core, _builtins) = new_module("m");
    define(&mut core, "f", vec![], vec![Type::int()], |_, _| {
        string("hello")
    });
    let (errors, failed) = infer(&mut core);
    assert!(errors
        .iter()
        .any(|d| matches!(&d.kind, DiagKind::TypeMismatch { .. })));
    assert_eq!(failed.len(), 1);
}

#[test]
fn infinite_types_fail_the_occurs_check() {
    let (mut core, builtins) = new_module("m");
    // x is a bare list, so Cons(x, x) forces e = List(e)
    define(&mut core, "f", vec![], vec![Type::int()], |varmap, _| {
        let x = varmap.alloc("x");
        let c = varmap.alloc("c");
        let_in(
            vec![x],
            ctor_const(builtins.nil_ctor),
            let_in(
                vec![c],
                construct(builtins.cons_ctor, vec![var_ref(x), var_ref(x)]),
                num(1),
            ),
        )
    });
    let (errors, _) = infer(&mut core);
    assert!(errors
        .iter()
        .any(|d| matches!(&d.kind, DiagKind::OccursCheck { .. })));
}

#[test]
fn construction_types_flow_through_matches() {
    let (mut core, builtins) = new_module("m");
    let f = define(
        &mut core,
        "head_or",
        vec![list_of(&builtins, Type::int()), Type::int()],
        vec![Type::int()],
        |varmap, params| {
            let h = varmap.alloc("h");
            let t = varmap.alloc("t");
            match_on(
                params[0],
                vec![
                    plasma::core::Case::new(
                        plasma::core::Pattern::Ctor(builtins.cons_ctor, vec![h, t]),
                        var_ref(h),
                    ),
                    plasma::core::Case::new(
                        plasma::core::Pattern::Ctor(builtins.nil_ctor, vec![]),
                        var_ref(params[1]),
                    ),
                ],
            )
        },
    );
    let (errors, _) = infer(&mut core);
    assert!(errors.is_empty(), "{}", errors.render());
    let body = core.func(f).body.as_ref().unwrap();
    // both case bodies resolved to Int
    assert_eq!(body.expr.info.types, Some(vec![Type::int()]));
}

#[test]
fn free_inner_variables_get_invented_names() {
    let (mut core, builtins) = new_module("m");
    // the element type of the discarded Nil is constrained by nothing
    let f = define(&mut core, "f", vec![], vec![Type::int()], |varmap, _| {
        let e = varmap.alloc("e");
        let_in(vec![e], ctor_const(builtins.nil_ctor), num(7))
    });
    let (errors, _) = infer(&mut core);
    assert!(errors.is_empty(), "{}", errors.render());
    let body = core.func(f).body.as_ref().unwrap();
    let ExprKind::Let(l) = &body.expr.kind else {
        panic!("expected let");
    };
    match &l.rhs.info.types {
        Some(types) => match &types[0] {
            Type::Ref(id, args) => {
                assert_eq!(*id, builtins.list_ty);
                assert!(matches!(&args[0], Type::Var(name) if name.starts_with('T')));
            }
            other => panic!("expected a list type, got {:?}", other),
        },
        None => panic!("missing types"),
    }
}

#[test]
fn failed_functions_do_not_block_others() {
    let (mut core, _builtins) = new_module("m");
    define(&mut core, "bad", vec![], vec![Type::int()], |_, _| {
        string("no")
    });
    let ok = define(&mut core, "good", vec![], vec![Type::int()], |_, _| num(1));
    let (errors, failed) = infer(&mut core);
    assert_eq!(errors.len(), 1);
    assert!(!failed.contains(&ok));
    let body = core.func(ok).body.as_ref().unwrap();
    assert_eq!(body.expr.info.types, Some(vec![Type::int()]));
}
