//! The compiled callable: finalized code bound to its closure object.

use std::rc::Rc;

use crate::{
    bytecode::{vm, Code},
    expr::FnSig,
    registry::Registry,
    value::Value,
};

/// An invocable produced by the compiler.
///
/// When the compiled body captured anything, the callable owns the closure
/// object for its whole lifetime and passes it as the hidden argument 0 of
/// every invocation. Callables are cheap to share; nested-lambda values are
/// the same `Rc` handed out on every construction.
#[derive(Debug)]
pub struct CompiledFn {
    /// Declared signature, excluding the hidden closure argument.
    sig: Rc<FnSig>,

    code: Code,

    /// The bound closure object, if the body captured anything.
    closure: Option<Value>,
}

impl CompiledFn {
    pub(crate) fn new(sig: Rc<FnSig>, code: Code, closure: Option<Value>) -> Self {
        Self { sig, code, closure }
    }

    /// The declared signature (the hidden closure argument is not part of
    /// it).
    #[must_use]
    pub fn sig(&self) -> &FnSig {
        &self.sig
    }

    pub(crate) fn sig_rc(&self) -> Rc<FnSig> {
        self.sig.clone()
    }

    /// The bound closure object, when the compiled body captured anything.
    ///
    /// Emitted code reaches an inner lambda's closure through this accessor
    /// to thread captured values; hosts can use it to observe whether a
    /// compile allocated a closure at all.
    #[must_use]
    pub fn target(&self) -> Option<&Value> {
        self.closure.as_ref()
    }

    /// Invokes the callable.
    ///
    /// `args` must match the declared parameter count; the bound closure, if
    /// any, is prepended internally.
    pub fn invoke(
        &self,
        registry: &Registry,
        args: &[Value],
    ) -> Result<Value, vm::RuntimeError> {
        if args.len() != self.sig.params.len() {
            return Err(vm::RuntimeError::ArityMismatch {
                expected: self.sig.params.len(),
                given: args.len(),
            });
        }
        let full: Vec<Value> = match &self.closure {
            Some(closure) => std::iter::once(closure.clone())
                .chain(args.iter().cloned())
                .collect(),
            None => args.to_vec(),
        };
        vm::run(&self.code, registry, full)
    }
}
