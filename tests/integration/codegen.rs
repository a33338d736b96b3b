//! Lowering to stack bytecode, end to end

use crate::util::*;
use plasma::core::{Case, Pattern, Type};
use plasma::pz::verify::verify_pz;
use plasma::pz::{CallTarget, Instr, Width};
use plasma::{compile, new_module};

#[test]
fn constant_arithmetic_reduces_to_a_flat_block() {
    let (mut core, builtins) = new_module("m");
    let add = builtins.func("add_int").unwrap();
    define(&mut core, "f", vec![], vec![Type::int()], |_, _| {
        call(add, vec![num(1), num(2)])
    });
    let pz = compile(&mut core, &builtins).expect("compiles");
    let proc = &pz.procs[pz
        .find_proc("f")
        .expect("f was generated")
        .index()];
    assert_eq!(proc.sig.before, vec![]);
    assert_eq!(proc.sig.after, vec![Width::WFast]);

    let blocks = proc.blocks.as_ref().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(
        blocks[0].instrs,
        vec![
            Instr::LoadImmediate(Width::WFast, 1),
            Instr::LoadImmediate(Width::WFast, 2),
            Instr::Add(Width::WFast),
            Instr::Ret,
        ]
    );
}

#[test]
fn true_is_a_raw_one() {
    let (mut core, builtins) = new_module("m");
    define(
        &mut core,
        "t",
        vec![],
        vec![bool_ty(&builtins)],
        |_, _| ctor_const(builtins.true_ctor),
    );
    let pz = compile(&mut core, &builtins).expect("compiles");
    let proc = &pz.procs[pz.find_proc("t").unwrap().index()];
    let blocks = proc.blocks.as_ref().unwrap();
    assert_eq!(
        blocks[0].instrs,
        vec![Instr::LoadImmediate(Width::WFast, 1), Instr::Ret]
    );
}

#[test]
fn bool_match_tests_the_encoding_then_loads_strings() {
    let (mut core, builtins) = new_module("m");
    define(
        &mut core,
        "choose",
        vec![bool_ty(&builtins)],
        vec![Type::string()],
        |_, params| {
            match_on(
                params[0],
                vec![
                    Case::new(Pattern::Ctor(builtins.true_ctor, vec![]), string("yes")),
                    Case::new(Pattern::Ctor(builtins.false_ctor, vec![]), string("no")),
                ],
            )
        },
    );
    let pz = compile(&mut core, &builtins).expect("compiles");
    verify_pz(&pz).expect("stack discipline holds");

    let proc = &pz.procs[pz.find_proc("choose").unwrap().index()];
    let blocks = proc.blocks.as_ref().unwrap();
    assert_eq!(blocks.len(), 4, "tests, two bodies, join");

    // the test chain compares against True's raw encoding
    assert!(blocks[0]
        .instrs
        .contains(&Instr::LoadImmediate(Width::WFast, 1)));
    assert!(blocks[0].instrs.contains(&Instr::Eq(Width::WFast)));
    assert!(blocks[0].instrs.contains(&Instr::CJmp(1)));

    // each body loads its own interned string
    let loaded: Vec<_> = [1usize, 2]
        .iter()
        .map(|b| {
            blocks[*b]
                .instrs
                .iter()
                .find_map(|i| match i {
                    Instr::LoadData(id) => Some(*id),
                    _ => None,
                })
                .expect("body loads a string")
        })
        .collect();
    assert_ne!(loaded[0], loaded[1]);

    // both bodies meet at the join, which returns
    assert_eq!(blocks[1].instrs.last(), Some(&Instr::Jmp(3)));
    assert_eq!(blocks[2].instrs.last(), Some(&Instr::Jmp(3)));
    assert_eq!(blocks[3].instrs.last(), Some(&Instr::Ret));
}

#[test]
fn list_program_passes_stack_verification() {
    let (mut core, builtins) = new_module("m");
    let add = builtins.func("add_int").unwrap();
    let length = declare(
        &mut core,
        "length",
        vec![list_of(&builtins, Type::int())],
        vec![Type::int()],
    );
    set_body(&mut core, length, |varmap, params| {
        let h = varmap.alloc("h");
        let t = varmap.alloc("t");
        match_on(
            params[0],
            vec![
                Case::new(
                    Pattern::Ctor(builtins.cons_ctor, vec![h, t]),
                    call(add, vec![num(1), call(length, vec![var_ref(t)])]),
                ),
                Case::new(Pattern::Ctor(builtins.nil_ctor, vec![]), num(0)),
            ],
        )
    });
    define(&mut core, "main", vec![], vec![Type::int()], |_, _| {
        call(
            length,
            vec![construct(
                builtins.cons_ctor,
                vec![
                    num(1),
                    construct(
                        builtins.cons_ctor,
                        vec![num(2), ctor_const(builtins.nil_ctor)],
                    ),
                ],
            )],
        )
    });

    let pz = compile(&mut core, &builtins).expect("compiles");
    verify_pz(&pz).expect("stack discipline holds");

    // the entry is main
    let main_id = pz.find_proc("main").unwrap();
    assert_eq!(pz.entry, Some(main_id));

    // construction allocates, stores both fields, then applies the tag
    let main_proc = &pz.procs[main_id.index()];
    let instrs = &main_proc.blocks.as_ref().unwrap()[0].instrs;
    assert!(instrs.iter().any(|i| matches!(i, Instr::Alloc(_))));
    assert!(instrs.iter().any(|i| matches!(i, Instr::Store(_, 0))));
    assert!(instrs.iter().any(|i| matches!(i, Instr::Store(_, 1))));
    let make_tag_calls = instrs
        .iter()
        .filter(|i| match i {
            Instr::Call(CallTarget::Import(id)) => {
                pz.import(*id).name.to_string() == "builtin.make_tag"
            }
            _ => false,
        })
        .count();
    assert_eq!(make_tag_calls, 2, "one per cons cell");

    // the saturating call to length is in tail position
    assert!(matches!(
        instrs.last(),
        Some(Instr::TCall(CallTarget::Proc(id))) if *id == pz.find_proc("length").unwrap()
    ));
}

#[test]
fn self_tail_calls_become_tcall() {
    let (mut core, builtins) = new_module("m");
    let f = declare(&mut core, "spin", vec![Type::int()], vec![Type::int()]);
    set_body(&mut core, f, |_, params| call(f, vec![var_ref(params[0])]));
    let pz = compile(&mut core, &builtins).expect("compiles");
    verify_pz(&pz).expect("stack discipline holds");

    let proc = &pz.procs[pz.find_proc("spin").unwrap().index()];
    let instrs = &proc.blocks.as_ref().unwrap()[0].instrs;
    assert!(matches!(instrs.last(), Some(Instr::TCall(_))));
    // the old argument was squashed before the frame is replaced
    assert!(instrs.contains(&Instr::Roll(1)));
}

#[test]
fn multi_return_calls_keep_both_results() {
    let (mut core, builtins) = new_module("m");
    let gettimeofday = builtins.func("gettimeofday").unwrap();
    define(
        &mut core,
        "now",
        vec![],
        vec![Type::int(), Type::int()],
        |_, _| call(gettimeofday, vec![]),
    );
    let pz = compile(&mut core, &builtins).expect("compiles");
    verify_pz(&pz).expect("stack discipline holds");
    let proc = &pz.procs[pz.find_proc("now").unwrap().index()];
    assert_eq!(proc.sig.after, vec![Width::WFast, Width::WFast]);
}

#[test]
fn bool_to_string_compiles_with_everything_else() {
    let (mut core, builtins) = new_module("m");
    let pz = compile(&mut core, &builtins).expect("compiles");
    verify_pz(&pz).expect("stack discipline holds");
    let proc = &pz.procs[pz.find_proc("bool_to_string").unwrap().index()];
    let blocks = proc.blocks.as_ref().unwrap();
    assert_eq!(blocks.len(), 4);
    // user types travel as pointer words, strings as pointers
    assert_eq!(proc.sig.before, vec![Width::WPtr]);
    assert_eq!(proc.sig.after, vec![Width::WPtr]);
}

#[test]
fn sequences_drop_unused_results() {
    let (mut core, builtins) = new_module("m");
    define(&mut core, "f", vec![], vec![Type::int()], |_, _| {
        seq(vec![num(10), num(20)])
    });
    let pz = compile(&mut core, &builtins).expect("compiles");
    verify_pz(&pz).expect("stack discipline holds");
    let proc = &pz.procs[pz.find_proc("f").unwrap().index()];
    assert_eq!(
        proc.blocks.as_ref().unwrap()[0].instrs,
        vec![
            Instr::LoadImmediate(Width::WFast, 10),
            Instr::Drop,
            Instr::LoadImmediate(Width::WFast, 20),
            Instr::Ret,
        ]
    );
}
