//! Core intermediate representation
//!
//! The [`Core`] module is the data shared by every pass: id-indexed
//! tables of functions, types, constructors and resources, plus the
//! call-graph order the inference passes walk in. The front end creates
//! it empty, populates it incrementally, and each analysis pass threads
//! it through as an explicit parameter, adding entries or updating
//! function bodies but never removing ids.

pub mod expr;
pub mod function;
pub mod ids;
pub mod name;
pub mod types;
pub mod varmap;

pub use expr::{Case, CodeInfo, Const, Expr, ExprKind, Let, Pattern};
pub use function::{Body, Function, Signature};
pub use ids::{CtorId, FuncId, ResourceId, TypeId};
pub use name::QName;
pub use types::{BuiltinType, Constructor, Field, Type, TypeDef};
pub use varmap::{Var, Varmap};

use std::collections::HashMap;

/// A declared resource, such as `IO`
#[derive(Debug, Clone)]
pub struct Resource {
    pub name: QName,
}

impl Resource {
    pub fn new(name: QName) -> Self {
        Self { name }
    }
}

struct CtorEntry {
    def: Constructor,
    owner: TypeId,
}

/// A core module: the id-indexed definition tables.
pub struct Core {
    name: QName,
    funcs: Vec<Function>,
    types: Vec<TypeDef>,
    ctors: Vec<CtorEntry>,
    resources: Vec<Resource>,
    /// Call-graph strongly-connected components, in dependency order
    /// (callees before callers). Filled by [`Core::compute_sccs`].
    sccs: Vec<Vec<FuncId>>,
}

impl Core {
    /// Create an empty module
    pub fn new(name: QName) -> Self {
        Self {
            name,
            funcs: Vec::new(),
            types: Vec::new(),
            ctors: Vec::new(),
            resources: Vec::new(),
            sccs: Vec::new(),
        }
    }

    pub fn name(&self) -> &QName {
        &self.name
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a type; its constructors are added separately with
    /// [`Core::add_ctor`].
    pub fn add_type(&mut self, def: TypeDef) -> TypeId {
        let id = TypeId::new(self.types.len() as u32);
        self.types.push(def);
        id
    }

    /// Register a constructor as belonging to `owner`, appending it to
    /// the type's declaration-order constructor list.
    pub fn add_ctor(&mut self, owner: TypeId, def: Constructor) -> CtorId {
        let id = CtorId::new(self.ctors.len() as u32);
        self.ctors.push(CtorEntry { def, owner });
        self.types[owner.index()].ctors.push(id);
        id
    }

    pub fn add_func(&mut self, func: Function) -> FuncId {
        let id = FuncId::new(self.funcs.len() as u32);
        self.funcs.push(func);
        id
    }

    pub fn add_resource(&mut self, res: Resource) -> ResourceId {
        let id = ResourceId::new(self.resources.len() as u32);
        self.resources.push(res);
        id
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    pub fn func(&self, id: FuncId) -> &Function {
        &self.funcs[id.index()]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.funcs[id.index()]
    }

    pub fn type_def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    pub fn ctor(&self, id: CtorId) -> &Constructor {
        &self.ctors[id.index()].def
    }

    /// The type a constructor belongs to
    pub fn ctor_owner(&self, id: CtorId) -> TypeId {
        self.ctors[id.index()].owner
    }

    pub fn resource(&self, id: ResourceId) -> &Resource {
        &self.resources[id.index()]
    }

    pub fn func_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.funcs.len() as u32).map(FuncId::new)
    }

    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len() as u32).map(TypeId::new)
    }

    pub fn num_funcs(&self) -> usize {
        self.funcs.len()
    }

    /// Detach a function's body so a pass can rewrite it while still
    /// reading the rest of the module. Pair with [`Core::set_body`].
    pub fn take_body(&mut self, id: FuncId) -> Option<Body> {
        self.funcs[id.index()].body.take()
    }

    pub fn set_body(&mut self, id: FuncId, body: Body) {
        self.funcs[id.index()].body = Some(body);
    }

    // ------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------

    /// Render a type for diagnostics
    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Builtin(b) => b.name().to_string(),
            Type::Var(v) => v.clone(),
            Type::Ref(id, args) => {
                let name = self.type_def(*id).name.to_string();
                if args.is_empty() {
                    name
                } else {
                    let args: Vec<String> = args.iter().map(|a| self.type_name(a)).collect();
                    format!("{}({})", name, args.join(", "))
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Call graph
    // ------------------------------------------------------------------

    /// The strongly-connected components of the call graph, callees
    /// before callers. Empty until [`Core::compute_sccs`] has run.
    pub fn sccs(&self) -> &[Vec<FuncId>] {
        &self.sccs
    }

    /// Compute the call-graph SCCs in dependency order (Tarjan).
    ///
    /// Functions without bodies are leaves. The emission order of
    /// Tarjan's algorithm already guarantees that a component is
    /// produced only after every component it calls into.
    pub fn compute_sccs(&mut self) {
        let n = self.funcs.len();
        let mut callees: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, func) in self.funcs.iter().enumerate() {
            if let Some(body) = &func.body {
                collect_callees(&body.expr, &mut callees[i]);
            }
        }

        let mut state = Tarjan {
            callees: &callees,
            index: vec![usize::MAX; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next_index: 0,
            sccs: Vec::new(),
        };
        for v in 0..n {
            if state.index[v] == usize::MAX {
                state.visit(v);
            }
        }
        self.sccs = state.sccs;
    }
}

fn collect_callees(expr: &Expr, out: &mut Vec<usize>) {
    match &expr.kind {
        ExprKind::Seq(exprs) | ExprKind::Tuple(exprs) => {
            for e in exprs {
                collect_callees(e, out);
            }
        }
        ExprKind::Let(l) => {
            collect_callees(&l.rhs, out);
            collect_callees(&l.body, out);
        }
        ExprKind::Call(f, args) => {
            out.push(f.index());
            for a in args {
                collect_callees(a, out);
            }
        }
        ExprKind::Const(Const::Func(f)) => out.push(f.index()),
        ExprKind::Construct(_, args) => {
            for a in args {
                collect_callees(a, out);
            }
        }
        ExprKind::Match(_, cases) => {
            for case in cases {
                collect_callees(&case.body, out);
            }
        }
        ExprKind::Var(_) | ExprKind::Const(_) => {}
    }
}

struct Tarjan<'a> {
    callees: &'a [Vec<usize>],
    index: Vec<usize>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    sccs: Vec<Vec<FuncId>>,
}

impl Tarjan<'_> {
    // Iterative so that deep call chains cannot overflow the compiler's
    // own stack.
    fn visit(&mut self, root: usize) {
        enum Frame {
            Enter(usize),
            Resume(usize, usize),
        }
        let mut work = vec![Frame::Enter(root)];
        while let Some(frame) = work.pop() {
            match frame {
                Frame::Enter(v) => {
                    self.index[v] = self.next_index;
                    self.lowlink[v] = self.next_index;
                    self.next_index += 1;
                    self.stack.push(v);
                    self.on_stack[v] = true;
                    work.push(Frame::Resume(v, 0));
                }
                Frame::Resume(v, mut child) => {
                    let mut descended = false;
                    while child < self.callees[v].len() {
                        let w = self.callees[v][child];
                        child += 1;
                        if self.index[w] == usize::MAX {
                            work.push(Frame::Resume(v, child));
                            work.push(Frame::Enter(w));
                            descended = true;
                            break;
                        } else if self.on_stack[w] {
                            self.lowlink[v] = self.lowlink[v].min(self.index[w]);
                        }
                    }
                    if descended {
                        continue;
                    }
                    if self.lowlink[v] == self.index[v] {
                        let mut scc = Vec::new();
                        loop {
                            let w = self.stack.pop().expect("tarjan stack invariant");
                            self.on_stack[w] = false;
                            scc.push(FuncId::new(w as u32));
                            if w == v {
                                break;
                            }
                        }
                        scc.sort();
                        self.sccs.push(scc);
                    }
                    // propagate the lowlink into the parent frame
                    if let Some(Frame::Resume(p, _)) = work.last() {
                        let p = *p;
                        self.lowlink[p] = self.lowlink[p].min(self.lowlink[v]);
                    }
                }
            }
        }
    }
}

/// A convenience for driver code and tests: look up a function id by its
/// unqualified name.
impl Core {
    pub fn find_func(&self, name: &str) -> Option<FuncId> {
        self.funcs
            .iter()
            .position(|f| f.name.last() == name)
            .map(|i| FuncId::new(i as u32))
    }

    /// Build a map from unqualified function names to ids; later
    /// definitions win, matching lookup order in the front end.
    pub fn func_names(&self) -> HashMap<String, FuncId> {
        self.funcs
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.last().to_string(), FuncId::new(i as u32)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::loc::Loc;

    fn dummy_func(name: &str) -> Function {
        Function::new(
            QName::single(name),
            Signature::new(vec![], vec![Type::int()]),
            Loc::builtin(),
        )
    }

    fn call_body(vm: Varmap, callee: FuncId) -> Body {
        Body::new(
            vm,
            vec![],
            Expr::new(ExprKind::Call(callee, vec![]), Loc::builtin()),
        )
    }

    #[test]
    fn sccs_are_in_dependency_order() {
        let mut core = Core::new(QName::single("m"));
        let f = core.add_func(dummy_func("f"));
        let g = core.add_func(dummy_func("g"));
        // f calls g; g is a leaf
        core.func_mut(f).body = Some(call_body(Varmap::new(), g));
        core.func_mut(g).body = Some(Body::new(
            Varmap::new(),
            vec![],
            Expr::new(ExprKind::Const(Const::Num(1)), Loc::builtin()),
        ));
        core.compute_sccs();
        let order: Vec<_> = core.sccs().iter().flatten().copied().collect();
        assert_eq!(order, vec![g, f]);
    }

    #[test]
    fn mutual_recursion_forms_one_component() {
        let mut core = Core::new(QName::single("m"));
        let f = core.add_func(dummy_func("f"));
        let g = core.add_func(dummy_func("g"));
        core.func_mut(f).body = Some(call_body(Varmap::new(), g));
        core.func_mut(g).body = Some(call_body(Varmap::new(), f));
        core.compute_sccs();
        assert_eq!(core.sccs().len(), 1);
        assert_eq!(core.sccs()[0].len(), 2);
    }

    #[test]
    fn self_recursion_is_a_singleton() {
        let mut core = Core::new(QName::single("m"));
        let f = core.add_func(dummy_func("f"));
        core.func_mut(f).body = Some(call_body(Varmap::new(), f));
        core.compute_sccs();
        assert_eq!(core.sccs(), &[vec![f]]);
    }
}
