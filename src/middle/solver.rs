//! Type constraint solver
//!
//! A Herbrand-term unification engine over named solver variables,
//! implemented as a union-find with path compression. Constraints are
//! collected first and solved in one propagation run, so the walk that
//! posts them never has to care about ordering.
//!
//! After propagation, [`Problem::label`] invents concrete types for
//! variables left free: variables that do not appear in the function's
//! signature are labeled first, signature-facing variables last, so a
//! free inner variable can never force a signature.

use crate::core::{BuiltinType, Core, Type, TypeId};
use crate::util::loc::Loc;
use crate::util::report::{DiagKind, ErrorCollector};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A solver variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SolverVar(usize);

impl SolverVar {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for SolverVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// The named positions a solver variable can stand for.
///
/// Expression-result variables are keyed by the pre-order number of the
/// expression and the index of the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemVar {
    Input(usize),
    Output(usize),
    Expr { num: usize, result: usize },
}

/// A type term over solver variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Builtin(BuiltinType),
    UserType(TypeId, Vec<SolverVar>),
    /// Pinned to a declaration-scoped type variable
    Abstract(String),
}

#[derive(Debug, Clone)]
enum Binding {
    Free,
    Link(SolverVar),
    Bound(Term),
}

#[derive(Debug)]
enum Rhs {
    Term(Term),
    Alias(SolverVar),
}

#[derive(Debug)]
struct Constraint {
    var: SolverVar,
    rhs: Rhs,
    loc: Loc,
}

/// One function's inference problem
#[derive(Debug, Default)]
pub struct Problem {
    bindings: Vec<Binding>,
    named: HashMap<ProblemVar, SolverVar>,
    constraints: Vec<Constraint>,
}

impl Problem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an anonymous solver variable
    pub fn fresh(&mut self) -> SolverVar {
        let var = SolverVar(self.bindings.len());
        self.bindings.push(Binding::Free);
        var
    }

    /// The solver variable for a named position, interned on first use
    pub fn named_var(&mut self, pv: ProblemVar) -> SolverVar {
        if let Some(&v) = self.named.get(&pv) {
            return v;
        }
        let v = self.fresh();
        self.named.insert(pv, v);
        v
    }

    // ------------------------------------------------------------------
    // Constraint posting
    // ------------------------------------------------------------------

    /// `v` must resolve to a built-in type
    pub fn post_builtin(&mut self, v: SolverVar, b: BuiltinType, loc: Loc) {
        self.constraints.push(Constraint {
            var: v,
            rhs: Rhs::Term(Term::Builtin(b)),
            loc,
        });
    }

    /// `v` must resolve to `type_id(args…)`
    pub fn post_user_type(&mut self, v: SolverVar, type_id: TypeId, args: Vec<SolverVar>, loc: Loc) {
        self.constraints.push(Constraint {
            var: v,
            rhs: Rhs::Term(Term::UserType(type_id, args)),
            loc,
        });
    }

    /// `v` must remain abstract, pinned to the type variable `tvar`
    pub fn post_abstract(&mut self, v: SolverVar, tvar: impl Into<String>, loc: Loc) {
        self.constraints.push(Constraint {
            var: v,
            rhs: Rhs::Term(Term::Abstract(tvar.into())),
            loc,
        });
    }

    /// `v` and `w` are the same type
    pub fn post_alias(&mut self, v: SolverVar, w: SolverVar, loc: Loc) {
        self.constraints.push(Constraint {
            var: v,
            rhs: Rhs::Alias(w),
            loc,
        });
    }

    // ------------------------------------------------------------------
    // Union-find
    // ------------------------------------------------------------------

    fn find(&mut self, var: SolverVar) -> SolverVar {
        match &self.bindings[var.0] {
            Binding::Link(next) => {
                let next = *next;
                let root = self.find(next);
                self.bindings[var.0] = Binding::Link(root);
                root
            }
            _ => var,
        }
    }

    /// Follow links without compressing; usable from `&self`
    fn find_ref(&self, var: SolverVar) -> SolverVar {
        let mut v = var;
        while let Binding::Link(next) = &self.bindings[v.0] {
            v = *next;
        }
        v
    }

    /// Does `root` occur inside `term`?
    fn occurs(&self, root: SolverVar, term: &Term) -> bool {
        match term {
            Term::Builtin(_) | Term::Abstract(_) => false,
            Term::UserType(_, args) => args.iter().any(|a| {
                let r = self.find_ref(*a);
                if r == root {
                    return true;
                }
                match &self.bindings[r.0] {
                    Binding::Bound(t) => self.occurs(root, t),
                    _ => false,
                }
            }),
        }
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Run propagation over every posted constraint. Reports into
    /// `errors`; returns true when no constraint failed.
    pub fn solve(&mut self, core: &Core, errors: &mut ErrorCollector) -> bool {
        let before = errors.len();
        for c in std::mem::take(&mut self.constraints) {
            match c.rhs {
                Rhs::Alias(w) => self.unify_vars(c.var, w, &c.loc, core, errors),
                Rhs::Term(t) => self.unify_var_term(c.var, t, &c.loc, core, errors),
            }
        }
        errors.len() == before
    }

    fn unify_vars(
        &mut self,
        v: SolverVar,
        w: SolverVar,
        loc: &Loc,
        core: &Core,
        errors: &mut ErrorCollector,
    ) {
        let rv = self.find(v);
        let rw = self.find(w);
        if rv == rw {
            return;
        }
        match (self.bindings[rv.0].clone(), self.bindings[rw.0].clone()) {
            (Binding::Free, Binding::Free) => {
                self.bindings[rv.0] = Binding::Link(rw);
            }
            (Binding::Free, Binding::Bound(t)) => {
                if self.check_occurs(rv, &t, loc, core, errors) {
                    self.bindings[rv.0] = Binding::Link(rw);
                }
            }
            (Binding::Bound(t), Binding::Free) => {
                if self.check_occurs(rw, &t, loc, core, errors) {
                    self.bindings[rw.0] = Binding::Link(rv);
                }
            }
            (Binding::Bound(t1), Binding::Bound(t2)) => {
                self.bindings[rv.0] = Binding::Link(rw);
                self.unify_terms(t1, t2, loc, core, errors);
            }
            _ => unreachable!("find returned a link"),
        }
    }

    fn unify_var_term(
        &mut self,
        v: SolverVar,
        term: Term,
        loc: &Loc,
        core: &Core,
        errors: &mut ErrorCollector,
    ) {
        let rv = self.find(v);
        match self.bindings[rv.0].clone() {
            Binding::Free => {
                if self.check_occurs(rv, &term, loc, core, errors) {
                    self.bindings[rv.0] = Binding::Bound(term);
                }
            }
            Binding::Bound(existing) => self.unify_terms(existing, term, loc, core, errors),
            Binding::Link(_) => unreachable!("find returned a link"),
        }
    }

    fn unify_terms(
        &mut self,
        expected: Term,
        found: Term,
        loc: &Loc,
        core: &Core,
        errors: &mut ErrorCollector,
    ) {
        match (&expected, &found) {
            (Term::Builtin(a), Term::Builtin(b)) if a == b => {}
            (Term::Abstract(a), Term::Abstract(b)) if a == b => {}
            (Term::UserType(t1, args1), Term::UserType(t2, args2))
                if t1 == t2 && args1.len() == args2.len() =>
            {
                for (a, b) in args1.clone().into_iter().zip(args2.clone()) {
                    self.unify_vars(a, b, loc, core, errors);
                }
            }
            _ => {
                errors.report(
                    loc.clone(),
                    DiagKind::TypeMismatch {
                        expected: self.render_term(core, &expected),
                        found: self.render_term(core, &found),
                    },
                );
            }
        }
    }

    /// True when binding is safe; reports and returns false on an
    /// infinite type.
    fn check_occurs(
        &mut self,
        root: SolverVar,
        term: &Term,
        loc: &Loc,
        core: &Core,
        errors: &mut ErrorCollector,
    ) -> bool {
        if self.occurs(root, term) {
            errors.report(
                loc.clone(),
                DiagKind::OccursCheck {
                    var: root.to_string(),
                    ty: self.render_term(core, term),
                },
            );
            false
        } else {
            true
        }
    }

    // ------------------------------------------------------------------
    // Labeling
    // ------------------------------------------------------------------

    /// Invent types for remaining free variables. Variables reachable
    /// from the signature are labeled last. `invent` must yield type
    /// variable names unique to the enclosing function.
    pub fn label(&mut self, mut invent: impl FnMut() -> String) {
        let sig_reachable = self.signature_reachable();
        let n = self.bindings.len();
        for i in 0..n {
            let r = self.find(SolverVar(i));
            if !sig_reachable.contains(&r.0) {
                if let Binding::Free = self.bindings[r.0] {
                    self.bindings[r.0] = Binding::Bound(Term::Abstract(invent()));
                }
            }
        }
        for i in 0..n {
            let r = self.find(SolverVar(i));
            if let Binding::Free = self.bindings[r.0] {
                self.bindings[r.0] = Binding::Bound(Term::Abstract(invent()));
            }
        }
    }

    /// Classes reachable from the signature's named variables, through
    /// the argument positions of bound terms.
    fn signature_reachable(&mut self) -> HashSet<usize> {
        let mut reachable = HashSet::new();
        let mut work: Vec<SolverVar> = self
            .named
            .iter()
            .filter(|(pv, _)| matches!(pv, ProblemVar::Input(_) | ProblemVar::Output(_)))
            .map(|(_, v)| *v)
            .collect();
        while let Some(v) = work.pop() {
            let r = self.find(v);
            if !reachable.insert(r.0) {
                continue;
            }
            if let Binding::Bound(Term::UserType(_, args)) = self.bindings[r.0].clone() {
                work.extend(args);
            }
        }
        reachable
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// The resolved type of a solver variable. Free variables resolve to
    /// an anonymous type variable; after [`Problem::label`] none remain.
    pub fn resolve(&self, v: SolverVar) -> Type {
        let r = self.find_ref(v);
        match &self.bindings[r.0] {
            Binding::Free => Type::Var(format!("_{}", r)),
            Binding::Bound(Term::Builtin(b)) => Type::Builtin(*b),
            Binding::Bound(Term::Abstract(name)) => Type::Var(name.clone()),
            Binding::Bound(Term::UserType(id, args)) => {
                Type::Ref(*id, args.iter().map(|a| self.resolve(*a)).collect())
            }
            Binding::Link(_) => unreachable!("find_ref returned a link"),
        }
    }

    /// The resolved type of a named position, if it was ever mentioned
    pub fn resolve_named(&self, pv: ProblemVar) -> Option<Type> {
        self.named.get(&pv).map(|&v| self.resolve(v))
    }

    fn render_term(&self, core: &Core, term: &Term) -> String {
        match term {
            Term::Builtin(b) => b.name().to_string(),
            Term::Abstract(name) => name.clone(),
            Term::UserType(id, args) => {
                let ty = Type::Ref(*id, args.iter().map(|a| self.resolve(*a)).collect());
                core.type_name(&ty)
            }
        }
    }
}
