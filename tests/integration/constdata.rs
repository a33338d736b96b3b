//! Constant-data interning

use crate::util::*;
use plasma::core::Type;
use plasma::middle::constdata;
use plasma::new_module;
use plasma::pz::{Pz, PzData, Width};
use plasma::util::report::ErrorCollector;

#[test]
fn identical_literals_share_one_entry() {
    let (mut core, _builtins) = new_module("m");
    define(&mut core, "f", vec![], vec![Type::string()], |_, _| {
        string("hello")
    });
    define(&mut core, "g", vec![], vec![Type::string()], |_, _| {
        seq(vec![string("hello"), string("other")])
    });
    let mut pz = Pz::new();
    let mut errors = ErrorCollector::new();
    let map = constdata::run(&core, &mut pz, &mut errors);
    assert!(errors.is_empty());
    assert_eq!(map.len(), 2);
    assert_eq!(pz.datas.len(), 2);
}

#[test]
fn strings_are_nul_terminated_byte_arrays() {
    let (mut core, _builtins) = new_module("m");
    define(&mut core, "f", vec![], vec![Type::string()], |_, _| {
        string("hi")
    });
    let mut pz = Pz::new();
    let mut errors = ErrorCollector::new();
    let map = constdata::run(&core, &mut pz, &mut errors);
    let id = map["hi"];
    assert_eq!(
        pz.data(id),
        &PzData::Array {
            width: Width::W8,
            values: vec![0x68, 0x69, 0],
        }
    );
}

#[test]
fn interning_is_idempotent() {
    let (mut core, _builtins) = new_module("m");
    define(&mut core, "f", vec![], vec![Type::string()], |_, _| {
        seq(vec![string("a"), string("b")])
    });
    let mut errors = ErrorCollector::new();
    let mut pz1 = Pz::new();
    let map1 = constdata::run(&core, &mut pz1, &mut errors);
    let mut pz2 = Pz::new();
    let map2 = constdata::run(&core, &mut pz2, &mut errors);
    assert_eq!(map1, map2);
    assert_eq!(pz1.datas, pz2.datas);
}

#[test]
fn non_ascii_literals_hit_the_limitation() {
    let (mut core, _builtins) = new_module("m");
    define(&mut core, "f", vec![], vec![Type::string()], |_, _| {
        string("héllo")
    });
    let mut pz = Pz::new();
    let mut errors = ErrorCollector::new();
    constdata::run(&core, &mut pz, &mut errors);
    assert!(errors.render().contains("non-ASCII"));
}
