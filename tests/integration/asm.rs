//! The textual bytecode surface: assembler and pretty printer

use crate::util::*;
use plasma::core::{Case, Pattern, Type};
use plasma::pz::{asm, pretty, Instr, Width};
use plasma::{compile, new_module};

#[test]
fn the_documented_grammar_assembles() {
    let src = "\
// a procedure: proc NAME ( WIDTH* - WIDTH* ) { INSTR* };
proc fortytwo ( - w ) {
  load_immediate:w 40
  load_immediate:w 2
  add:w
  ret
};
";
    let pz = asm::assemble("fortytwo.pzt", src).unwrap();
    let proc = &pz.procs[pz.find_proc("fortytwo").unwrap().index()];
    assert_eq!(proc.sig.after, vec![Width::WFast]);
    assert_eq!(
        proc.blocks.as_ref().unwrap()[0].instrs,
        vec![
            Instr::LoadImmediate(Width::WFast, 40),
            Instr::LoadImmediate(Width::WFast, 2),
            Instr::Add(Width::WFast),
            Instr::Ret,
        ]
    );
}

#[test]
fn errors_print_filename_line_message() {
    let src = "proc broken ( - w ) {\n  load_immediate:w ret\n};\n";
    let err = asm::assemble("broken.pzt", src).unwrap_err();
    let rendered = err.to_string();
    assert!(
        rendered.starts_with("broken.pzt:2: "),
        "unexpected rendering: {}",
        rendered
    );
}

#[test]
fn multi_block_procs_roundtrip() {
    let src = "\
proc pingpong ( w - w ) {
  0 {
    pick 0
    cjmp 1
    jmp 2
  }
  1 {
    load_immediate:w 1
    roll 1
    drop
    ret
  }
  2 {
    load_immediate:w 0
    roll 1
    drop
    ret
  }
};
";
    let pz = asm::assemble("pingpong.pzt", src).unwrap();
    assert_eq!(pz.procs[0].blocks.as_ref().unwrap().len(), 3);
    let text = pretty::print_pz(&pz);
    let back = asm::assemble("pingpong2.pzt", &text).unwrap();
    assert_eq!(pretty::print_pz(&back), text);
}

#[test]
fn generated_programs_roundtrip_through_the_assembler() {
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
    define(&mut core, "main", vec![], vec![Type::string()], |_, _| {
        seq(vec![
            call(length, vec![ctor_const(builtins.nil_ctor)]),
            string("done"),
        ])
    });

    let pz = compile(&mut core, &builtins).expect("compiles");
    let text = pretty::print_pz(&pz);
    let back = asm::assemble("generated.pzt", &text)
        .unwrap_or_else(|e| panic!("reassembly failed: {}\n{}", e, text));
    assert_eq!(pretty::print_pz(&back), text);

    // structurally equal modulo id renumbering: same table sizes
    assert_eq!(back.structs, pz.structs);
    assert_eq!(back.datas, pz.datas);
    assert_eq!(back.procs.len(), pz.procs.len());
}

#[test]
fn calls_to_runtime_names_resolve_as_imports() {
    let src = "\
proc main ( - ) {
  load_immediate:w 1
  call builtin.bool_to_string
  call builtin.print
  ret
};
";
    let pz = asm::assemble("main.pzt", src).unwrap();
    let names: Vec<String> = pz.imports.iter().map(|i| i.name.to_string()).collect();
    assert_eq!(
        names,
        vec!["builtin.bool_to_string".to_string(), "builtin.print".to_string()]
    );
}
