//! Function definitions

use super::expr::Expr;
use super::ids::ResourceId;
use super::name::QName;
use super::types::Type;
use super::varmap::{Var, Varmap};
use crate::util::loc::Loc;

/// A function signature.
#[derive(Debug, Clone)]
pub struct Signature {
    pub inputs: Vec<Type>,
    pub outputs: Vec<Type>,
    /// Resources the function may read and write
    pub uses: Vec<ResourceId>,
    /// Resources the function may only read
    pub observes: Vec<ResourceId>,
    /// Declared number of results
    pub arity: usize,
}

impl Signature {
    pub fn new(inputs: Vec<Type>, outputs: Vec<Type>) -> Self {
        let arity = outputs.len();
        Self {
            inputs,
            outputs,
            uses: Vec::new(),
            observes: Vec::new(),
            arity,
        }
    }

    pub fn with_uses(mut self, uses: Vec<ResourceId>) -> Self {
        self.uses = uses;
        self
    }

    pub fn with_observes(mut self, observes: Vec<ResourceId>) -> Self {
        self.observes = observes;
        self
    }
}

/// A function body: its variables, parameter bindings, and expression.
#[derive(Debug, Clone)]
pub struct Body {
    pub varmap: Varmap,
    pub params: Vec<Var>,
    pub expr: Expr,
}

impl Body {
    pub fn new(varmap: Varmap, params: Vec<Var>, expr: Expr) -> Self {
        Self {
            varmap,
            params,
            expr,
        }
    }
}

/// A function: signature plus an optional body.
///
/// Imported functions carry no body.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: QName,
    pub sig: Signature,
    pub body: Option<Body>,
    pub loc: Loc,
}

impl Function {
    pub fn new(name: QName, sig: Signature, loc: Loc) -> Self {
        Self {
            name,
            sig,
            body: None,
            loc,
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}
