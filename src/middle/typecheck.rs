//! Type inference
//!
//! Builds one constraint [`Problem`] per function, walks the body
//! posting constraints, solves, labels leftover free variables, and
//! walks the body a second time to attach each expression's result
//! types to its [`CodeInfo`](crate::core::CodeInfo).
//!
//! Polymorphism works through per-call-site instantiation: every call
//! translates the callee's signature with a fresh type-variable map, so
//! the `t` in `id(x: t) -> t` unifies with `Int` at one call site
//! without forcing any other. The function's own signature, by
//! contrast, pins its type variables as abstract; a body cannot narrow
//! its own declaration.

use crate::core::{Const, Core, Expr, ExprKind, FuncId, Type, TypeId, Var};
use crate::middle::solver::{Problem, ProblemVar, SolverVar};
use crate::util::loc::Loc;
use crate::util::report::{ErrorCollector, InternalError, Limitation};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Infer result types for every function that passed arity inference.
/// Extends and returns the failed set.
pub fn run(
    core: &mut Core,
    mut failed: BTreeSet<FuncId>,
    errors: &mut ErrorCollector,
) -> Result<BTreeSet<FuncId>, InternalError> {
    let sccs: Vec<Vec<FuncId>> = core.sccs().to_vec();
    for scc in sccs {
        if scc.iter().any(|id| failed.contains(id)) {
            continue;
        }
        // components larger than one were already rejected by arity
        // inference, which runs first
        let id = scc[0];
        let Some(mut body) = core.take_body(id) else {
            continue;
        };
        debug!("typecheck: {}", core.func(id).name);

        let before = errors.len();
        let mut infer = Infer {
            core,
            problem: Problem::new(),
            var_map: HashMap::new(),
            counter: 0,
        };

        let outcome = infer.check_function(id, &body, errors);
        match outcome {
            Err(e) => {
                core.set_body(id, body);
                return Err(e);
            }
            Ok(()) => {}
        }

        let mut problem = infer.problem;
        let solved = problem.solve(core, errors) && errors.len() == before;
        if !solved {
            failed.insert(id);
            core.set_body(id, body);
            continue;
        }

        let mut next_invented = 0;
        problem.label(|| {
            let name = format!("T{}", next_invented);
            next_invented += 1;
            name
        });

        let mut counter = 0;
        annotate(&problem, &mut body.expr, &mut counter)?;
        core.set_body(id, body);
    }
    Ok(failed)
}

struct Infer<'a> {
    core: &'a Core,
    problem: Problem,
    var_map: HashMap<Var, SolverVar>,
    counter: usize,
}

impl<'a> Infer<'a> {
    fn check_function(
        &mut self,
        id: FuncId,
        body: &crate::core::Body,
        errors: &mut ErrorCollector,
    ) -> Result<(), InternalError> {
        let func = self.core.func(id);
        let loc = func.loc.clone();
        let inputs = func.sig.inputs.clone();
        let outputs = func.sig.outputs.clone();

        // the function's own type variables stay abstract
        let mut fn_tvs = HashMap::new();
        for (i, ty) in inputs.iter().enumerate() {
            let named = self.problem.named_var(ProblemVar::Input(i));
            let tv = self.translate(ty, &mut fn_tvs, true, &loc);
            self.problem.post_alias(named, tv, loc.clone());
        }
        for (i, ty) in outputs.iter().enumerate() {
            let named = self.problem.named_var(ProblemVar::Output(i));
            let tv = self.translate(ty, &mut fn_tvs, true, &loc);
            self.problem.post_alias(named, tv, loc.clone());
        }

        if body.params.len() != inputs.len() {
            return Err(InternalError::new(
                "typecheck",
                format!("{} has {} params for {} inputs", func.name, body.params.len(), inputs.len()),
            ));
        }
        for (i, var) in body.params.iter().enumerate() {
            let named = self.problem.named_var(ProblemVar::Input(i));
            self.var_map.insert(*var, named);
        }

        let result_vars = self.walk(&body.expr, errors)?;
        for (i, rv) in result_vars.iter().enumerate() {
            let named = self.problem.named_var(ProblemVar::Output(i));
            self.problem.post_alias(*rv, named, body.expr.info.loc.clone());
        }
        Ok(())
    }

    /// Translate a declared type into constraints, returning a solver
    /// variable carrying it. `pin` makes encountered type variables
    /// abstract (signature translation); a fresh map with `pin` off is
    /// the per-call-site instantiation.
    fn translate(
        &mut self,
        ty: &Type,
        tvs: &mut HashMap<String, SolverVar>,
        pin: bool,
        loc: &Loc,
    ) -> SolverVar {
        match ty {
            Type::Builtin(b) => {
                let v = self.problem.fresh();
                self.problem.post_builtin(v, *b, loc.clone());
                v
            }
            Type::Var(name) => {
                if let Some(&v) = tvs.get(name) {
                    return v;
                }
                let v = self.problem.fresh();
                if pin {
                    self.problem.post_abstract(v, name.clone(), loc.clone());
                }
                tvs.insert(name.clone(), v);
                v
            }
            Type::Ref(id, args) => {
                let arg_vars: Vec<SolverVar> = args
                    .iter()
                    .map(|a| self.translate(a, tvs, pin, loc))
                    .collect();
                let v = self.problem.fresh();
                self.problem.post_user_type(v, *id, arg_vars, loc.clone());
                v
            }
        }
    }

    /// Fresh solver variables for a type's parameters, in declaration
    /// order, entered into `tvs` under the parameter names.
    fn instantiate_params(
        &mut self,
        type_id: TypeId,
        tvs: &mut HashMap<String, SolverVar>,
    ) -> Vec<SolverVar> {
        let params = self.core.type_def(type_id).params.clone();
        params
            .iter()
            .map(|p| {
                let v = self.problem.fresh();
                tvs.insert(p.clone(), v);
                v
            })
            .collect()
    }

    /// Walk an expression, posting its constraints; returns the solver
    /// variables of its results. The traversal order here must match
    /// [`annotate`] exactly, because expressions are identified by their
    /// pre-order number.
    fn walk(
        &mut self,
        expr: &Expr,
        errors: &mut ErrorCollector,
    ) -> Result<Vec<SolverVar>, InternalError> {
        let num = self.counter;
        self.counter += 1;
        let loc = expr.info.loc.clone();
        let arity = expr.info.arity.ok_or_else(|| {
            InternalError::new("typecheck", format!("missing arity at {}", loc))
        })?;
        let rvs: Vec<SolverVar> = (0..arity)
            .map(|k| self.problem.named_var(ProblemVar::Expr { num, result: k }))
            .collect();

        match &expr.kind {
            ExprKind::Var(v) => {
                let sv = self.lookup(*v)?;
                self.problem.post_alias(rvs[0], sv, loc);
            }
            ExprKind::Const(Const::Str(_)) => {
                self.problem
                    .post_builtin(rvs[0], crate::core::BuiltinType::String, loc);
            }
            ExprKind::Const(Const::Num(_)) => {
                self.problem
                    .post_builtin(rvs[0], crate::core::BuiltinType::Int, loc);
            }
            ExprKind::Const(Const::Ctor(ctor_id)) => {
                let ctor = self.core.ctor(*ctor_id);
                if !ctor.is_nullary() {
                    return Err(InternalError::new(
                        "typecheck",
                        format!("constant use of constructor {} which has fields", ctor.name),
                    ));
                }
                let owner = self.core.ctor_owner(*ctor_id);
                let mut tvs = HashMap::new();
                let params = self.instantiate_params(owner, &mut tvs);
                self.problem.post_user_type(rvs[0], owner, params, loc);
            }
            ExprKind::Const(Const::Func(_)) => {
                errors.report_limitation(loc, Limitation::FunctionValue);
            }
            ExprKind::Seq(exprs) => {
                let mut last = Vec::new();
                for e in exprs {
                    last = self.walk(e, errors)?;
                }
                for (rv, lv) in rvs.iter().zip(last) {
                    self.problem.post_alias(*rv, lv, loc.clone());
                }
            }
            ExprKind::Tuple(exprs) => {
                for (rv, e) in rvs.iter().zip(exprs) {
                    let evs = self.walk(e, errors)?;
                    let ev = one(evs, &e.info.loc)?;
                    self.problem.post_alias(*rv, ev, loc.clone());
                }
            }
            ExprKind::Let(l) => {
                let rhs_vars = self.walk(&l.rhs, errors)?;
                for (var, rhs_var) in l.vars.iter().zip(rhs_vars) {
                    self.var_map.insert(*var, rhs_var);
                }
                let body_vars = self.walk(&l.body, errors)?;
                for (rv, bv) in rvs.iter().zip(body_vars) {
                    self.problem.post_alias(*rv, bv, loc.clone());
                }
            }
            ExprKind::Call(f, args) => {
                let mut arg_vars = Vec::with_capacity(args.len());
                for a in args {
                    let avs = self.walk(a, errors)?;
                    arg_vars.push(one(avs, &a.info.loc)?);
                }
                let inputs = self.core.func(*f).sig.inputs.clone();
                let outputs = self.core.func(*f).sig.outputs.clone();
                // one fresh map per call site: this is the polymorphism
                // mechanism
                let mut call_tvs = HashMap::new();
                for (formal, av) in inputs.iter().zip(arg_vars) {
                    let fv = self.translate(formal, &mut call_tvs, false, &loc);
                    self.problem.post_alias(fv, av, loc.clone());
                }
                for (rv, out) in rvs.iter().zip(outputs.iter()) {
                    let ov = self.translate(out, &mut call_tvs, false, &loc);
                    self.problem.post_alias(*rv, ov, loc.clone());
                }
            }
            ExprKind::Construct(ctor_id, args) => {
                let mut arg_vars = Vec::with_capacity(args.len());
                for a in args {
                    let avs = self.walk(a, errors)?;
                    arg_vars.push(one(avs, &a.info.loc)?);
                }
                let owner = self.core.ctor_owner(*ctor_id);
                let fields = self.core.ctor(*ctor_id).fields.clone();
                if fields.len() != arg_vars.len() {
                    return Err(InternalError::new(
                        "typecheck",
                        format!(
                            "construction of {} with {} arguments for {} fields",
                            self.core.ctor(*ctor_id).name,
                            arg_vars.len(),
                            fields.len()
                        ),
                    ));
                }
                let mut tvs = HashMap::new();
                let params = self.instantiate_params(owner, &mut tvs);
                for (field, av) in fields.iter().zip(arg_vars) {
                    let fv = self.translate(&field.ty, &mut tvs, false, &loc);
                    self.problem.post_alias(fv, av, loc.clone());
                }
                self.problem.post_user_type(rvs[0], owner, params, loc);
            }
            ExprKind::Match(scrut, cases) => {
                let sv = self.lookup(*scrut)?;
                for case in cases {
                    match &case.pattern {
                        crate::core::Pattern::Num(_) => {
                            self.problem.post_builtin(
                                sv,
                                crate::core::BuiltinType::Int,
                                loc.clone(),
                            );
                        }
                        crate::core::Pattern::Bind(v) => {
                            self.var_map.insert(*v, sv);
                        }
                        crate::core::Pattern::Wildcard => {}
                        crate::core::Pattern::Ctor(ctor_id, binds) => {
                            let owner = self.core.ctor_owner(*ctor_id);
                            let fields = self.core.ctor(*ctor_id).fields.clone();
                            if fields.len() != binds.len() {
                                return Err(InternalError::new(
                                    "typecheck",
                                    format!(
                                        "pattern for {} binds {} of {} fields",
                                        self.core.ctor(*ctor_id).name,
                                        binds.len(),
                                        fields.len()
                                    ),
                                ));
                            }
                            let mut tvs = HashMap::new();
                            let params = self.instantiate_params(owner, &mut tvs);
                            self.problem
                                .post_user_type(sv, owner, params, loc.clone());
                            for (field, bind) in fields.iter().zip(binds) {
                                let fv = self.translate(&field.ty, &mut tvs, false, &loc);
                                self.var_map.insert(*bind, fv);
                            }
                        }
                    }
                    let body_vars = self.walk(&case.body, errors)?;
                    for (rv, bv) in rvs.iter().zip(body_vars) {
                        self.problem.post_alias(*rv, bv, loc.clone());
                    }
                }
            }
        }

        Ok(rvs)
    }

    fn lookup(&self, var: Var) -> Result<SolverVar, InternalError> {
        self.var_map.get(&var).copied().ok_or_else(|| {
            InternalError::new("typecheck", format!("unbound variable {}", var))
        })
    }
}

fn one(vars: Vec<SolverVar>, loc: &Loc) -> Result<SolverVar, InternalError> {
    if vars.len() == 1 {
        Ok(vars[0])
    } else {
        Err(InternalError::new(
            "typecheck",
            format!("expected a single-value expression at {}", loc),
        ))
    }
}

/// Second walk: attach each expression's resolved result types. The
/// traversal order mirrors [`Infer::walk`].
fn annotate(problem: &Problem, expr: &mut Expr, counter: &mut usize) -> Result<(), InternalError> {
    let num = *counter;
    *counter += 1;
    let arity = expr.info.arity.unwrap_or(0);
    let mut types = Vec::with_capacity(arity);
    for k in 0..arity {
        let ty = problem
            .resolve_named(ProblemVar::Expr { num, result: k })
            .ok_or_else(|| {
                InternalError::new(
                    "typecheck",
                    format!("no solver variable for expression {} result {}", num, k),
                )
            })?;
        types.push(ty);
    }
    expr.info.types = Some(types);

    match &mut expr.kind {
        ExprKind::Seq(exprs) | ExprKind::Tuple(exprs) => {
            for e in exprs {
                annotate(problem, e, counter)?;
            }
        }
        ExprKind::Let(l) => {
            annotate(problem, &mut l.rhs, counter)?;
            annotate(problem, &mut l.body, counter)?;
        }
        ExprKind::Call(_, args) | ExprKind::Construct(_, args) => {
            for a in args {
                annotate(problem, a, counter)?;
            }
        }
        ExprKind::Match(_, cases) => {
            for case in cases {
                annotate(problem, &mut case.body, counter)?;
            }
        }
        ExprKind::Var(_) | ExprKind::Const(_) => {}
    }
    Ok(())
}
