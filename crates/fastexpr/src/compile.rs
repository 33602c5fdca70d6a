//! The compile driver and the crate's public entry points.
//!
//! A compile runs binding analysis, materializes the closure object when the
//! body captures anything, emits bytecode into a fresh builder whose hidden
//! argument 0 is the closure, appends the return, and binds the finalized
//! code to the closure as a [`CompiledFn`].
//!
//! The only observable outcomes are a callable or `None`; callers fall back
//! to their general evaluator on `None`. The internal rejection reason is
//! logged at debug level and never surfaced.

use std::rc::Rc;

use log::debug;

use crate::{
    analyze,
    bytecode::{CodeBuilder, Opcode},
    callable::CompiledFn,
    closure::ClosureInfo,
    emit::Emitter,
    expr::{Expr, FnSig, LambdaExpr, ParamExpr, Ty},
    registry::Registry,
};

/// Internal reasons a tree is rejected. Collapsed to `None` at the public
/// surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Unsupported {
    /// Node kind outside the compiled subset.
    NodeKind,
    /// Member-init binding that is not a plain assignment.
    MemberBinding,
    PropertyWithoutGetter,
    PropertyWithoutSetter,
    /// Conversion whose target is the universal reference type.
    ConvertToObject,
    /// A captured parameter could not be located in any closure during
    /// emission.
    CapturedParamNotFound,
}

/// Compiles a lambda tree into an invocable callable.
///
/// Returns `None` when the tree uses anything outside the supported subset,
/// so the caller can fall back to a general evaluator. The compile mutates no
/// caller state either way.
pub fn compile(registry: &Registry, lambda: &Rc<LambdaExpr>) -> Option<Rc<CompiledFn>> {
    compile_body(registry, &lambda.body, &lambda.params, &lambda.ret)
}

/// Low-level form of [`compile`]: compiles a bare body against an explicit
/// parameter list and return type. This is the entry point the pipeline
/// itself recurses through for nested lambdas.
pub fn compile_body(
    registry: &Registry,
    body: &Expr,
    params: &[Rc<ParamExpr>],
    ret: &Ty,
) -> Option<Rc<CompiledFn>> {
    match try_compile(registry, body, params, ret) {
        Ok((callable, _)) => Some(callable),
        Err(reason) => {
            debug!("fast compile rejected: {reason}");
            None
        }
    }
}

/// Recursive entry used by the analyzer for nested lambdas: unlike the
/// public surface it keeps the rejection reason and the closure bookkeeping,
/// which the outer emission needs for capture threading.
pub(crate) fn compile_nested(
    registry: &Registry,
    lambda: &Rc<LambdaExpr>,
) -> Result<(Rc<CompiledFn>, Option<ClosureInfo>), Unsupported> {
    try_compile(registry, &lambda.body, &lambda.params, &lambda.ret)
}

fn try_compile(
    registry: &Registry,
    body: &Expr,
    params: &[Rc<ParamExpr>],
    ret: &Ty,
) -> Result<(Rc<CompiledFn>, Option<ClosureInfo>), Unsupported> {
    // Pass 1: discover captures and decide the closure layout.
    let mut info = analyze::analyze(registry, body, params)?;
    if let Some(info) = &mut info {
        info.materialize(registry);
    }

    // Pass 2: emit against the fixed layout.
    let mut builder = CodeBuilder::new();
    Emitter::new(&mut builder, registry, params, info.as_ref()).expr(body)?;
    builder.emit(Opcode::Ret);
    let code = builder.build();

    debug!(
        "compiled body: {} params, {} closure slots, {} bytes",
        params.len(),
        info.as_ref().map_or(0, ClosureInfo::slot_count),
        code.bytecode().len(),
    );

    let sig = Rc::new(FnSig {
        params: params.iter().map(|p| p.ty.clone()).collect(),
        ret: ret.clone(),
    });
    let closure = info.as_ref().map(|i| i.object().clone());
    Ok((Rc::new(CompiledFn::new(sig, code, closure)), info))
}
