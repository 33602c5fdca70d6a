//! Fast compiler from typed expression trees to bytecode-backed callables.
//!
//! The compiler runs two passes over an in-memory expression tree: a binding
//! analysis pass that collects the values the compiled code must capture
//! (non-inline constants, free variables, nested lambdas) into a closure, and
//! an emission pass that lowers the tree to bytecode addressing those captures
//! through the layout the analyzer fixed. The finalized bytecode is bound to
//! the materialized closure object and returned as an invocable [`CompiledFn`].
//!
//! Only a restricted subset of node kinds is supported; [`compile`] returns
//! `None` for anything outside it so callers can fall back to a general
//! evaluator.

mod analyze;
mod bytecode;
mod callable;
mod closure;
mod compile;
mod emit;
mod expr;
mod registry;
mod value;

pub use crate::{
    bytecode::vm::RuntimeError,
    callable::CompiledFn,
    compile::{compile, compile_body},
    expr::{
        BinOp, CmpOp, ConstExpr, Expr, FnSig, LambdaExpr, MemberBinding, MemberRef, NewExpr,
        ParamExpr, Ty, UnaryOp,
    },
    registry::{
        ClassBuilder, ClassId, ClassInfo, CtorBody, CtorId, CtorInfo, FieldInfo, MethodBody,
        MethodId, MethodInfo, NativeCtor, NativeFn, PropertyInfo, Registry, StaticField,
    },
    value::{ArrayObj, Instance, Value},
};
