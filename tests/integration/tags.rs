//! Constructor tag assignment

use crate::util::loc;
use plasma::core::{Constructor, Field, QName, Type, TypeDef};
use plasma::middle::tags::{self, CtorTagInfo};
use plasma::new_module;
use plasma::util::report::ErrorCollector;

#[test]
fn bool_is_a_strict_enum() {
    let (core, builtins) = new_module("m");
    let mut errors = ErrorCollector::new();
    let tags = tags::run(&core, &mut errors);
    assert!(errors.is_empty());
    assert_eq!(
        tags.get(builtins.false_ctor),
        Some(CtorTagInfo::ConstantNotag { word: 0 })
    );
    assert_eq!(
        tags.get(builtins.true_ctor),
        Some(CtorTagInfo::ConstantNotag { word: 1 })
    );
    // the literal True encodes as a raw 1
    assert_eq!(tags.get(builtins.true_ctor).unwrap().constant_word(), Some(1));
}

#[test]
fn nil_is_bit_identical_to_null() {
    let (core, builtins) = new_module("m");
    let mut errors = ErrorCollector::new();
    let tags = tags::run(&core, &mut errors);
    assert!(errors.is_empty());
    assert_eq!(
        tags.get(builtins.nil_ctor),
        Some(CtorTagInfo::Constant { ptag: 0, word_bits: 0 })
    );
    assert_eq!(tags.get(builtins.nil_ctor).unwrap().constant_word(), Some(0));
    assert_eq!(
        tags.get(builtins.cons_ctor),
        Some(CtorTagInfo::TaggedPointer { ptag: 1 })
    );
}

#[test]
fn tagged_pointers_use_a_contiguous_tag_prefix() {
    let (mut core, _builtins) = new_module("m");
    let ty = core.add_type(TypeDef::new(QName::single("Shape"), vec![], loc(1)));
    for name in ["Empty", "Origin"] {
        core.add_ctor(ty, Constructor::new(QName::single(name), vec![], vec![]));
    }
    let mut with_args = Vec::new();
    for name in ["Circle", "Square", "Line"] {
        with_args.push(core.add_ctor(
            ty,
            Constructor::new(
                QName::single(name),
                vec![],
                vec![Field::new("a", Type::int())],
            ),
        ));
    }
    let mut errors = ErrorCollector::new();
    let tags = tags::run(&core, &mut errors);
    assert!(errors.is_empty(), "{}", errors.render());

    // nullary constructors share ptag 0, indexed by word bits
    let defs = core.type_def(ty).ctors.clone();
    assert_eq!(
        tags.get(defs[0]),
        Some(CtorTagInfo::Constant { ptag: 0, word_bits: 0 })
    );
    assert_eq!(
        tags.get(defs[1]),
        Some(CtorTagInfo::Constant { ptag: 0, word_bits: 1 })
    );
    // pointer tags are the contiguous run 1..=3
    let ptags: Vec<u8> = with_args
        .iter()
        .map(|c| match tags.get(*c) {
            Some(CtorTagInfo::TaggedPointer { ptag }) => ptag,
            other => panic!("expected tagged pointer, got {:?}", other),
        })
        .collect();
    assert_eq!(ptags, vec![1, 2, 3]);
}

#[test]
fn assignment_is_total_for_wellformed_modules() {
    let (core, _builtins) = new_module("m");
    let mut errors = ErrorCollector::new();
    let tags = tags::run(&core, &mut errors);
    let num_ctors = core.type_ids().map(|t| core.type_def(t).ctors.len()).sum::<usize>();
    assert_eq!(tags.len(), num_ctors);
}

#[test]
fn five_tagged_constructors_hit_the_limitation() {
    let (mut core, _builtins) = new_module("m");
    let ty = core.add_type(TypeDef::new(QName::single("Wide"), vec![], loc(3)));
    for name in ["A", "B", "C", "D", "E"] {
        core.add_ctor(
            ty,
            Constructor::new(
                QName::single(name),
                vec![],
                vec![Field::new("x", Type::int())],
            ),
        );
    }
    let mut errors = ErrorCollector::new();
    tags::run(&core, &mut errors);
    let rendered = errors.render();
    assert!(rendered.contains("secondary tags not supported"), "{}", rendered);
    assert!(rendered.contains("Wide"));
    assert!(rendered.contains("test.p:3"));
}
