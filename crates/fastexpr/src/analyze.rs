//! Binding analysis: the pre-pass that decides what a compiled body captures.
//!
//! The analyzer walks the tree once, collecting non-inline constants, free
//! parameters and nested lambdas into a [`ClosureInfo`] in encounter order.
//! Nested lambdas are compiled through the full pipeline as they are found,
//! and any parameter they capture from beyond this body's own parameter list
//! is re-exported into this body's captures.
//!
//! The analyzer is the supportedness gatekeeper: with the narrow exceptions
//! listed in [`crate::compile::Unsupported`]'s emission-only variants, any
//! tree it accepts will emit.

use std::rc::Rc;

use crate::{
    closure::{ClosureInfo, NestedLambda},
    compile::{self, Unsupported},
    expr::{Expr, LambdaExpr, MemberBinding, ParamExpr},
    registry::Registry,
};

/// Walks one lambda body and produces its closure bookkeeping, or `None`
/// when the body captures nothing.
pub(crate) fn analyze(
    registry: &Registry,
    body: &Expr,
    params: &[Rc<ParamExpr>],
) -> Result<Option<ClosureInfo>, Unsupported> {
    let mut analyzer = Analyzer {
        registry,
        params,
        info: None,
    };
    analyzer.visit(body)?;
    Ok(analyzer.info)
}

struct Analyzer<'a> {
    registry: &'a Registry,
    /// The body's own parameter list; anything else is free.
    params: &'a [Rc<ParamExpr>],
    /// Created lazily at the first capture.
    info: Option<ClosureInfo>,
}

impl Analyzer<'_> {
    fn info(&mut self) -> &mut ClosureInfo {
        self.info.get_or_insert_with(ClosureInfo::default)
    }

    fn is_declared(&self, param: &Rc<ParamExpr>) -> bool {
        self.params.iter().any(|p| Rc::ptr_eq(p, param))
    }

    fn visit(&mut self, expr: &Expr) -> Result<(), Unsupported> {
        match expr {
            Expr::Constant(node) => {
                if !node.is_inline_encodable() {
                    self.info().add_constant(node);
                }
            }

            Expr::Parameter(param) => {
                if !self.is_declared(param) {
                    self.info().capture_param(param);
                }
            }

            Expr::Convert { operand, .. } => self.visit(operand)?,

            Expr::Call { receiver, args, .. } => {
                if let Some(receiver) = receiver {
                    self.visit(receiver)?;
                }
                for arg in args {
                    self.visit(arg)?;
                }
            }

            Expr::Member { object, .. } => {
                if let Some(object) = object {
                    self.visit(object)?;
                }
            }

            Expr::New(new) => {
                for arg in &new.args {
                    self.visit(arg)?;
                }
            }

            Expr::NewArrayInit { items, .. } => {
                for item in items {
                    self.visit(item)?;
                }
            }

            Expr::MemberInit { new, bindings } => {
                for arg in &new.args {
                    self.visit(arg)?;
                }
                for binding in bindings {
                    let MemberBinding::Assign { value, .. } = binding else {
                        return Err(Unsupported::MemberBinding);
                    };
                    self.visit(value)?;
                }
            }

            Expr::Lambda(lambda) => self.nested(lambda)?,

            Expr::Invoke { target, args } => {
                self.visit(target)?;
                for arg in args {
                    self.visit(arg)?;
                }
            }

            Expr::Compare { left, right, .. } | Expr::Binary { left, right, .. } => {
                self.visit(left)?;
                self.visit(right)?;
            }

            Expr::ArrayIndex { array, index } => {
                self.visit(array)?;
                self.visit(index)?;
            }

            Expr::Unary { operand, .. } => self.visit(operand)?,
        }
        Ok(())
    }

    /// Compiles a nested lambda through the full pipeline and records it.
    ///
    /// Inner captures that are not declared by this body are free variables
    /// of a still-further-outer scope and propagate into this body's
    /// captures, so the chain of closures can thread them inward.
    fn nested(&mut self, lambda: &Rc<LambdaExpr>) -> Result<(), Unsupported> {
        let (callable, inner) = compile::compile_nested(self.registry, lambda)?;
        if let Some(inner) = &inner {
            for param in &inner.captured_params {
                if !self.is_declared(param) {
                    self.info().capture_param(param);
                }
            }
        }
        self.info().add_nested(NestedLambda {
            callable,
            source: lambda.clone(),
            closure: inner.map(Box::new),
        });
        Ok(())
    }
}
