//! Expression tree data model: the compiler's input.
//!
//! Trees are produced by a higher-level system and handed to [`crate::compile`]
//! already typed. Node identity matters for the compiler's slot bookkeeping:
//! parameter, constant and lambda nodes are reference-counted and compared by
//! pointer, so the same `Rc` must be used for every occurrence of the same
//! logical node.

use std::rc::Rc;

use crate::{
    registry::{ClassId, CtorId, MethodId},
    value::Value,
};

/// Static type of an expression or runtime value.
///
/// `Object` is the universal reference type: every non-null value is an
/// instance of it. `Class` covers user-registered reference types; enums are
/// value types addressed by their declaring class.
#[derive(Debug, Clone, PartialEq)]
pub enum Ty {
    /// No value. Only appears as the return type of property setters.
    Void,
    /// The universal reference type.
    Object,
    Bool,
    Int,
    Double,
    Str,
    /// A reflected type handle (the result of a `typeof`-style constant).
    TypeHandle,
    /// An enumeration declared by the given class.
    Enum(ClassId),
    /// A user-registered reference type.
    Class(ClassId),
    /// An array with the given element type.
    Array(Rc<Ty>),
    /// A delegate type with the given signature.
    Fn(Rc<FnSig>),
}

impl Ty {
    /// Returns true for types whose values are copied rather than referenced.
    ///
    /// Value types get boxed when stored into `Object`-typed locations and
    /// use the typed element-store path in array initializers.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Double | Self::Enum(_))
    }

    /// Convenience constructor for array types.
    #[must_use]
    pub fn array_of(elem: Ty) -> Self {
        Self::Array(Rc::new(elem))
    }

    /// Convenience constructor for delegate types.
    #[must_use]
    pub fn fn_of(params: Vec<Ty>, ret: Ty) -> Self {
        Self::Fn(Rc::new(FnSig { params, ret }))
    }
}

/// Signature of a delegate type or compiled callable.
#[derive(Debug, Clone, PartialEq)]
pub struct FnSig {
    pub params: Vec<Ty>,
    pub ret: Ty,
}

/// A parameter node. Compared by pointer identity, never by name.
#[derive(Debug)]
pub struct ParamExpr {
    /// Display name, kept for diagnostics only.
    pub name: String,
    pub ty: Ty,
}

impl ParamExpr {
    pub fn new(name: impl Into<String>, ty: Ty) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            ty,
        })
    }
}

/// A constant node: a runtime value with its declared static type.
#[derive(Debug)]
pub struct ConstExpr {
    pub value: Value,
    pub ty: Ty,
}

impl ConstExpr {
    /// Whether this constant can be materialized directly in the instruction
    /// stream instead of occupying a closure slot.
    ///
    /// Null is always encodable; otherwise the declared type must be one of
    /// the literal-friendly types. Delegate values always go through the
    /// closure so the callable object itself is captured.
    ///
    /// Both the analyzer and the emitter consult this single predicate; their
    /// agreement on it is what keeps closure slot indices aligned between the
    /// two passes.
    pub(crate) fn is_inline_encodable(&self) -> bool {
        if matches!(self.value, Value::Null) {
            return true;
        }
        if matches!(self.value, Value::Fn(_)) {
            return false;
        }
        matches!(
            self.ty,
            Ty::Int | Ty::Double | Ty::Bool | Ty::Str | Ty::TypeHandle | Ty::Enum(_)
        )
    }
}

/// A lambda node: parameters, a body expression and a return type.
///
/// Appears at the top level of a compile request and nested inside other
/// lambdas, where the whole compile pipeline recurses on it.
#[derive(Debug)]
pub struct LambdaExpr {
    pub params: Vec<Rc<ParamExpr>>,
    pub body: Expr,
    pub ret: Ty,
}

impl LambdaExpr {
    pub fn new(params: Vec<Rc<ParamExpr>>, body: Expr, ret: Ty) -> Rc<Self> {
        Rc::new(Self { params, body, ret })
    }

    /// The exact delegate type of a callable compiled from this lambda.
    #[must_use]
    pub fn fn_ty(&self) -> Ty {
        Ty::Fn(Rc::new(FnSig {
            params: self.params.iter().map(|p| p.ty.clone()).collect(),
            ret: self.ret.clone(),
        }))
    }
}

/// Reference to a class member used by member-access and member-init nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRef {
    /// Instance field, by declaration index within its class.
    Field { class: ClassId, field: usize },
    /// Static field, read without a receiver.
    StaticField { class: ClassId, field: usize },
    /// Property, accessed through its getter/setter accessor methods.
    Property { class: ClassId, prop: usize },
}

/// Constructor-call node, shared by `New` and `MemberInit`.
#[derive(Debug)]
pub struct NewExpr {
    pub ctor: CtorId,
    pub args: Vec<Expr>,
}

/// A member binding inside a `MemberInit` node.
///
/// Only plain assignments are compilable; the nested and collection forms
/// exist in the tree model but make the compile fall back.
#[derive(Debug)]
pub enum MemberBinding {
    Assign { member: MemberRef, value: Expr },
    /// Nested member-init binding (`Member = { ... }`).
    Nested {
        member: MemberRef,
        bindings: Vec<MemberBinding>,
    },
    /// Collection-init binding (`Member = { a, b, c }`).
    List { member: MemberRef, items: Vec<Expr> },
}

/// The six numeric comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Binary arithmetic operators the tree model can carry.
///
/// These are outside the compiled subset; encountering one makes the compile
/// fall back to the caller's general evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Unary operators other than conversions. Outside the compiled subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// An expression in the tree.
#[derive(Debug)]
pub enum Expr {
    Parameter(Rc<ParamExpr>),
    Constant(Rc<ConstExpr>),
    /// Checked reference conversion to `ty`.
    Convert { operand: Box<Expr>, ty: Ty },
    /// Reference-typed array element read.
    ArrayIndex { array: Box<Expr>, index: Box<Expr> },
    New(NewExpr),
    /// Array allocation with per-element initializers.
    NewArrayInit { elem: Ty, items: Vec<Expr> },
    /// Object construction followed by member assignments.
    MemberInit {
        new: NewExpr,
        bindings: Vec<MemberBinding>,
    },
    /// Method call; `receiver` is `None` for static methods.
    Call {
        receiver: Option<Box<Expr>>,
        method: MethodId,
        args: Vec<Expr>,
    },
    /// Field or property access; `object` is `None` for static members.
    Member {
        object: Option<Box<Expr>>,
        member: MemberRef,
    },
    /// A nested lambda appearing as a value.
    Lambda(Rc<LambdaExpr>),
    /// Invocation of a delegate-valued expression.
    Invoke {
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Arithmetic; carried by the tree model but not compiled.
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Negation/logical-not; carried by the tree model but not compiled.
    Unary { op: UnaryOp, operand: Box<Expr> },
}

impl Expr {
    /// Wraps a value as a constant node with the given declared type.
    pub fn constant(value: Value, ty: Ty) -> Self {
        Self::Constant(Rc::new(ConstExpr { value, ty }))
    }

    /// An `int`-typed integer constant.
    pub fn int(v: i64) -> Self {
        Self::constant(Value::Int(v), Ty::Int)
    }

    /// A reference to an existing parameter node.
    pub fn param(p: &Rc<ParamExpr>) -> Self {
        Self::Parameter(p.clone())
    }

    pub fn compare(op: CmpOp, left: Expr, right: Expr) -> Self {
        Self::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
