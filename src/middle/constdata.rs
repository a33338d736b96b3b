//! Constant data interning
//!
//! Walks every function body and interns each distinct string literal
//! once into the PZ data table, as a NUL-terminated byte array. Strings
//! are stored one byte per character, which restricts literals to ASCII;
//! wider encodings are a known limitation.

use crate::core::{Const, Core, Expr, ExprKind};
use crate::pz::{Pz, PzData, PzDataId, Width};
use crate::util::report::{ErrorCollector, Limitation};
use std::collections::BTreeMap;

/// The interning table: string literal to data id
pub type DataMap = BTreeMap<String, PzDataId>;

/// Intern every string literal of every function body.
pub fn run(core: &Core, pz: &mut Pz, errors: &mut ErrorCollector) -> DataMap {
    let mut map = DataMap::new();
    for id in core.func_ids() {
        if let Some(body) = &core.func(id).body {
            walk(&body.expr, pz, &mut map, errors);
        }
    }
    map
}

fn walk(expr: &Expr, pz: &mut Pz, map: &mut DataMap, errors: &mut ErrorCollector) {
    match &expr.kind {
        ExprKind::Const(Const::Str(s)) => {
            if map.contains_key(s) {
                return;
            }
            if !s.is_ascii() {
                errors.report_limitation(expr.info.loc.clone(), Limitation::NonAsciiString);
                return;
            }
            let mut values: Vec<u64> = s.bytes().map(u64::from).collect();
            values.push(0);
            let id = pz.add_data(PzData::Array {
                width: Width::W8,
                values,
            });
            map.insert(s.clone(), id);
        }
        ExprKind::Const(_) | ExprKind::Var(_) => {}
        ExprKind::Seq(exprs) | ExprKind::Tuple(exprs) => {
            for e in exprs {
                walk(e, pz, map, errors);
            }
        }
        ExprKind::Let(l) => {
            walk(&l.rhs, pz, map, errors);
            walk(&l.body, pz, map, errors);
        }
        ExprKind::Call(_, args) | ExprKind::Construct(_, args) => {
            for a in args {
                walk(a, pz, map, errors);
            }
        }
        ExprKind::Match(_, cases) => {
            for case in cases {
                walk(&case.body, pz, map, errors);
            }
        }
    }
}
