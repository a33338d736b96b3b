//! Core IR expressions
//!
//! Plasma expressions are multiple-return: an expression produces zero or
//! more values. The number of values (the arity) and the type of each
//! value are filled into [`CodeInfo`] by the analysis passes.

use super::ids::{CtorId, FuncId};
use super::types::Type;
use super::varmap::Var;
use crate::util::loc::Loc;

/// An expression with its source context and pass annotations
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub info: CodeInfo,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: Loc) -> Self {
        Self {
            kind,
            info: CodeInfo::new(loc),
        }
    }

    /// The arity annotation, if arity inference has run
    pub fn arity(&self) -> Option<usize> {
        self.info.arity
    }
}

/// The expression variants of the core IR
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A non-empty ordered list; the value is the value of the last
    /// element
    Seq(Vec<Expr>),
    /// Bind the results of `rhs` to `vars`, then evaluate `body`
    Let(Let),
    /// A tuple of single-valued sub-expressions
    Tuple(Vec<Expr>),
    /// A saturated call; each argument carries exactly one result
    Call(FuncId, Vec<Expr>),
    /// Reference to a program variable
    Var(Var),
    /// A literal constant
    Const(Const),
    /// Build a value of an algebraic type
    Construct(CtorId, Vec<Expr>),
    /// Case analysis on a variable
    Match(Var, Vec<Case>),
}

#[derive(Debug, Clone)]
pub struct Let {
    pub vars: Vec<Var>,
    pub rhs: Box<Expr>,
    pub body: Box<Expr>,
}

/// A literal constant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Const {
    Str(String),
    Num(i64),
    Func(FuncId),
    Ctor(CtorId),
}

/// One alternative of a match
#[derive(Debug, Clone)]
pub struct Case {
    pub pattern: Pattern,
    pub body: Expr,
}

impl Case {
    pub fn new(pattern: Pattern, body: Expr) -> Self {
        Self { pattern, body }
    }
}

/// A match pattern.
///
/// Constructor sub-patterns are plain variable binders, one per field;
/// the front end flattens nested patterns before building core IR. A
/// pattern binds every variable it introduces, and pattern variables are
/// disjoint from the outer scope.
#[derive(Debug, Clone)]
pub enum Pattern {
    Num(i64),
    Bind(Var),
    Wildcard,
    Ctor(CtorId, Vec<Var>),
}

/// Source context plus the annotations of the analysis passes.
#[derive(Debug, Clone)]
pub struct CodeInfo {
    pub loc: Loc,
    /// Number of values the expression produces; set by arity inference
    pub arity: Option<usize>,
    /// Type of each produced value; set by type inference
    pub types: Option<Vec<Type>>,
}

impl CodeInfo {
    pub fn new(loc: Loc) -> Self {
        Self {
            loc,
            arity: None,
            types: None,
        }
    }
}
