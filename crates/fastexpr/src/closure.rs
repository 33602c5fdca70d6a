//! Closure layout: how captured values are packed, addressed and materialized.
//!
//! A closure has one slot per captured value, globally ordered as
//!
//! ```text
//! [ constants ... ][ captured params ... ][ nested lambdas ... ]
//! ```
//!
//! The analyzer appends into these lists; the emitter reads slot indices
//! back out of the same lists. Neither side may reorder, and all lookups are
//! by node identity (`Rc` pointer equality).
//!
//! Physically a closure is either an instance of one of the generated
//! fixed-arity classes (`N <= MAX_FIXED`, one field per slot in slot order)
//! or an instance of the array-slab class whose single field holds an
//! object array of length `N`.

use std::rc::Rc;

use crate::{
    callable::CompiledFn,
    expr::{ConstExpr, LambdaExpr, ParamExpr, Ty},
    registry::Registry,
    value::{ArrayObj, Instance, Value},
};

/// Largest slot count served by a fixed-arity closure class; larger closures
/// fall back to the array slab. A tuning knob, not a contract.
pub(crate) const MAX_FIXED: usize = 10;

/// Declaration index of the array-slab class's single object-array field.
pub(crate) const SLAB_ITEMS_FIELD: usize = 0;

/// Captured values of one lambda being compiled, in slot order.
///
/// Created on demand by the analyzer at the first node that needs to capture
/// anything, and materialized into a closure object before emission starts.
#[derive(Debug, Default)]
pub(crate) struct ClosureInfo {
    /// Constant nodes whose value cannot be encoded inline.
    pub constants: Vec<Rc<ConstExpr>>,

    /// Parameters referenced by the body but declared by an enclosing lambda.
    pub captured_params: Vec<Rc<ParamExpr>>,

    /// Nested lambdas, compiled during analysis.
    pub nested_lambdas: Vec<NestedLambda>,

    /// Physical layout, set by [`ClosureInfo::materialize`].
    layout: Option<ClosureLayout>,
}

/// A nested lambda compiled while analyzing its parent.
#[derive(Debug)]
pub(crate) struct NestedLambda {
    /// The callable produced by the recursive compile, already bound to its
    /// own closure when it has one.
    pub callable: Rc<CompiledFn>,

    /// The lambda node, for identity lookup during emission.
    pub source: Rc<LambdaExpr>,

    /// The inner lambda's closure bookkeeping. The emitter threads live
    /// outer values into the inner captured-param slots through this.
    pub closure: Option<Box<ClosureInfo>>,
}

#[derive(Debug)]
struct ClosureLayout {
    object: Value,
    is_array_slab: bool,
}

impl ClosureInfo {
    pub fn slot_count(&self) -> usize {
        self.constants.len() + self.captured_params.len() + self.nested_lambdas.len()
    }

    /// Records a non-inline constant. Idempotent per node identity.
    pub fn add_constant(&mut self, node: &Rc<ConstExpr>) {
        if !self.constants.iter().any(|c| Rc::ptr_eq(c, node)) {
            self.constants.push(node.clone());
        }
    }

    /// Records a free parameter. Idempotent per node identity, so a
    /// parameter reaching this closure through several nested lambdas still
    /// occupies one slot.
    pub fn capture_param(&mut self, param: &Rc<ParamExpr>) {
        if !self.captured_params.iter().any(|p| Rc::ptr_eq(p, param)) {
            self.captured_params.push(param.clone());
        }
    }

    pub fn add_nested(&mut self, nested: NestedLambda) {
        self.nested_lambdas.push(nested);
    }

    /// Slot index of a constant node, by identity.
    pub fn constant_slot(&self, node: &Rc<ConstExpr>) -> Option<usize> {
        self.constants.iter().position(|c| Rc::ptr_eq(c, node))
    }

    /// Slot index of a captured parameter, by identity.
    pub fn param_slot(&self, param: &Rc<ParamExpr>) -> Option<usize> {
        self.captured_params
            .iter()
            .position(|p| Rc::ptr_eq(p, param))
            .map(|i| self.constants.len() + i)
    }

    /// Slot index and record of a nested lambda, by identity, searching
    /// last-to-first.
    pub fn lambda_slot(&self, node: &Rc<LambdaExpr>) -> Option<(usize, &NestedLambda)> {
        let base = self.constants.len() + self.captured_params.len();
        self.nested_lambdas
            .iter()
            .enumerate()
            .rev()
            .find(|(_, n)| Rc::ptr_eq(&n.source, node))
            .map(|(i, n)| (base + i, n))
    }

    /// Static type of the value stored at `slot`: the constant's declared
    /// type, the parameter's declared type, or the nested callable's exact
    /// delegate type.
    pub fn slot_ty(&self, slot: usize) -> Ty {
        let c = self.constants.len();
        let p = self.captured_params.len();
        if slot < c {
            self.constants[slot].ty.clone()
        } else if slot < c + p {
            self.captured_params[slot - c].ty.clone()
        } else {
            self.nested_lambdas[slot - c - p].source.fn_ty()
        }
    }

    /// Builds the runtime closure object.
    ///
    /// Constant slots hold the constant's value, captured-param slots the
    /// zero value of the parameter's type (overwritten at runtime whenever a
    /// nested lambda is constructed), nested-lambda slots the compiled
    /// callable.
    pub fn materialize(&mut self, registry: &Registry) {
        let values: Vec<Value> = self
            .constants
            .iter()
            .map(|c| c.value.clone())
            .chain(self.captured_params.iter().map(|p| Value::zero(&p.ty)))
            .chain(
                self.nested_lambdas
                    .iter()
                    .map(|n| Value::Fn(n.callable.clone())),
            )
            .collect();

        let count = values.len();
        let layout = if count <= MAX_FIXED {
            let class = registry.closure_class(count);
            ClosureLayout {
                object: Value::Obj(Rc::new(Instance::new(class, values))),
                is_array_slab: false,
            }
        } else {
            let slab = Value::Array(Rc::new(ArrayObj::new(Ty::Object, values)));
            ClosureLayout {
                object: Value::Obj(Rc::new(Instance::new(registry.array_closure(), vec![slab]))),
                is_array_slab: true,
            }
        };
        self.layout = Some(layout);
    }

    /// The materialized closure object.
    ///
    /// # Panics
    ///
    /// Panics when called before [`ClosureInfo::materialize`].
    pub fn object(&self) -> &Value {
        &self.layout.as_ref().expect("closure not materialized").object
    }

    pub fn is_array_slab(&self) -> bool {
        self.layout.as_ref().expect("closure not materialized").is_array_slab
    }
}
