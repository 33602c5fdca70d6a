//! Stack interpreter for compiled code objects.
//!
//! This is the crate's stand-in for a JIT-backed dynamic-method facility:
//! [`run`] executes one code object against an argument vector and returns
//! the value left on the operand stack by `Ret`.
//!
//! Faults (`RuntimeError`) can only be produced by malformed input trees,
//! which are the caller's responsibility; well-typed trees compile to code
//! that never faults. Violations of internal invariants (stack underflow,
//! bad pool indices) panic instead.

use std::{cmp::Ordering, rc::Rc};

use thiserror::Error;

use super::{
    code::{Code, Member},
    op::Opcode,
};
use crate::{
    expr::Ty,
    registry::{CtorBody, MethodBody, MethodInfo, Registry},
    value::{ArrayObj, Instance, Value},
};

/// Invocation fault raised by executing a compiled callable against values
/// that contradict the tree's static types.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("null reference")]
    NullReference,

    #[error("invalid cast to {expected:?}")]
    InvalidCast { expected: Ty },

    #[error("expected {expected} arguments, got {given}")]
    ArityMismatch { expected: usize, given: usize },

    #[error("no method named '{name}' on receiver class")]
    MissingMethod { name: String },

    #[error("operand is not {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("array index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
}

/// Executes a code object. `args` already includes the bound closure at
/// index 0 when the callable carries one.
pub(crate) fn run(code: &Code, registry: &Registry, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Vm {
        code,
        registry,
        args,
        locals: vec![Value::Null; code.num_locals() as usize],
        stack: Vec::with_capacity(8),
        pc: 0,
    }
    .run()
}

struct Vm<'a> {
    code: &'a Code,
    registry: &'a Registry,
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
    pc: usize,
}

impl Vm<'_> {
    fn run(mut self) -> Result<Value, RuntimeError> {
        loop {
            let byte = self.fetch_u8();
            let op = Opcode::from_repr(byte).expect("invalid opcode byte");
            match op {
                Opcode::LoadArg0 => self.push_arg(0),
                Opcode::LoadArg1 => self.push_arg(1),
                Opcode::LoadArg2 => self.push_arg(2),
                Opcode::LoadArg3 => self.push_arg(3),
                Opcode::LoadArg => {
                    let i = self.fetch_u8();
                    self.push_arg(i as usize);
                }
                Opcode::LoadArgW => {
                    let i = self.fetch_u16();
                    self.push_arg(i as usize);
                }

                Opcode::LoadNull => self.push(Value::Null),
                Opcode::LoadTrue => self.push(Value::Bool(true)),
                Opcode::LoadFalse => self.push(Value::Bool(false)),
                Opcode::LoadIntM1 => self.push(Value::Int(-1)),
                Opcode::LoadInt0 => self.push(Value::Int(0)),
                Opcode::LoadInt1 => self.push(Value::Int(1)),
                Opcode::LoadInt2 => self.push(Value::Int(2)),
                Opcode::LoadInt3 => self.push(Value::Int(3)),
                Opcode::LoadInt4 => self.push(Value::Int(4)),
                Opcode::LoadInt5 => self.push(Value::Int(5)),
                Opcode::LoadInt6 => self.push(Value::Int(6)),
                Opcode::LoadInt7 => self.push(Value::Int(7)),
                Opcode::LoadInt8 => self.push(Value::Int(8)),
                Opcode::LoadSmallInt => {
                    let v = self.fetch_u8() as i8;
                    self.push(Value::Int(i64::from(v)));
                }
                Opcode::LoadConst => {
                    let idx = self.fetch_u16();
                    self.push(self.code.constant(idx).clone());
                }

                Opcode::LoadLoc => {
                    let i = self.fetch_u8();
                    self.push(self.locals[i as usize].clone());
                }
                Opcode::StoreLoc => {
                    let i = self.fetch_u8();
                    self.locals[i as usize] = self.pop();
                }

                Opcode::LoadField => {
                    let idx = self.fetch_u16();
                    let inst = self.pop_obj()?;
                    self.push(inst.field(idx as usize));
                }
                Opcode::StoreField => {
                    let idx = self.fetch_u16();
                    let value = self.pop();
                    let inst = self.pop_obj()?;
                    inst.set_field(idx as usize, value);
                }
                Opcode::LoadStaticField => {
                    let idx = self.fetch_u16();
                    let Member::StaticField { class, field } = self.code.member(idx) else {
                        panic!("LoadStaticField operand is not a static field member");
                    };
                    self.push(self.registry.class(class).static_field(field).value());
                }

                Opcode::NewObj => {
                    let idx = self.fetch_u16();
                    self.new_obj(idx)?;
                }
                Opcode::NewArray => {
                    let idx = self.fetch_u16();
                    let elem = self.code.ty(idx).clone();
                    let len = self.pop_int()?;
                    let len = usize::try_from(len)
                        .map_err(|_| RuntimeError::IndexOutOfRange { index: len, len: 0 })?;
                    self.push(Value::Array(Rc::new(ArrayObj::filled(elem, len))));
                }
                Opcode::LdelemRef => {
                    let index = self.pop_int()?;
                    let arr = self.pop_array()?;
                    let i = Self::check_bounds(index, arr.len())?;
                    self.push(arr.get(i));
                }
                Opcode::StelemRef => {
                    let value = self.pop();
                    let index = self.pop_int()?;
                    let arr = self.pop_array()?;
                    let i = Self::check_bounds(index, arr.len())?;
                    arr.set(i, value);
                }
                Opcode::Stelem => {
                    let idx = self.fetch_u16();
                    let value = self.pop();
                    let index = self.pop_int()?;
                    let arr = self.pop_array()?;
                    let ty = self.code.ty(idx);
                    if !value.is_instance_of(ty) {
                        return Err(RuntimeError::InvalidCast { expected: ty.clone() });
                    }
                    let i = Self::check_bounds(index, arr.len())?;
                    arr.set(i, value);
                }

                Opcode::CastClass => {
                    let idx = self.fetch_u16();
                    let value = self.pop();
                    let ty = self.code.ty(idx);
                    if matches!(value, Value::Null) && !ty.is_value_type() {
                        self.push(Value::Null);
                    } else if value.is_instance_of(ty) {
                        self.push(value);
                    } else {
                        return Err(RuntimeError::InvalidCast { expected: ty.clone() });
                    }
                }
                Opcode::Box => {
                    let idx = self.fetch_u16();
                    let value = self.pop();
                    let ty = self.code.ty(idx);
                    if !value.is_instance_of(ty) {
                        return Err(RuntimeError::InvalidCast { expected: ty.clone() });
                    }
                    self.push(value);
                }

                Opcode::Call => {
                    let idx = self.fetch_u16();
                    self.call_method(idx, false)?;
                }
                Opcode::CallVirt => {
                    let idx = self.fetch_u16();
                    self.call_method(idx, true)?;
                }
                Opcode::CallFn => {
                    let argc = self.fetch_u8() as usize;
                    let args = self.pop_n(argc);
                    let callee = self.pop();
                    let Value::Fn(f) = callee else {
                        return Err(RuntimeError::TypeMismatch { expected: "a callable" });
                    };
                    let result = f.invoke(self.registry, &args)?;
                    self.push(result);
                }
                Opcode::LoadFnTarget => {
                    let callee = self.pop();
                    let Value::Fn(f) = callee else {
                        return Err(RuntimeError::TypeMismatch { expected: "a callable" });
                    };
                    self.push(f.target().cloned().unwrap_or(Value::Null));
                }

                Opcode::Ceq => self.compare_eq(),
                Opcode::Clt => self.compare_ord(Ordering::is_lt)?,
                Opcode::Cgt => self.compare_ord(Ordering::is_gt)?,

                Opcode::Dup => {
                    let top = self.stack.last().expect("stack underflow on Dup").clone();
                    self.push(top);
                }
                Opcode::Ret => return Ok(self.pop()),
            }
        }
    }

    // ========================================================================
    // Instruction stream decoding
    // ========================================================================

    fn fetch_u8(&mut self) -> u8 {
        let byte = self.code.bytecode()[self.pc];
        self.pc += 1;
        byte
    }

    fn fetch_u16(&mut self) -> u16 {
        let bytes = [self.code.bytecode()[self.pc], self.code.bytecode()[self.pc + 1]];
        self.pc += 2;
        u16::from_le_bytes(bytes)
    }

    // ========================================================================
    // Stack helpers
    // ========================================================================

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    /// Pops the top `n` values, preserving push order.
    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len().checked_sub(n).expect("stack underflow");
        self.stack.split_off(at)
    }

    fn push_arg(&mut self, index: usize) {
        let value = self.args.get(index).expect("argument index out of range").clone();
        self.push(value);
    }

    fn pop_obj(&mut self) -> Result<Rc<Instance>, RuntimeError> {
        match self.pop() {
            Value::Obj(inst) => Ok(inst),
            Value::Null => Err(RuntimeError::NullReference),
            _ => Err(RuntimeError::TypeMismatch { expected: "an object" }),
        }
    }

    fn pop_array(&mut self) -> Result<Rc<ArrayObj>, RuntimeError> {
        match self.pop() {
            Value::Array(arr) => Ok(arr),
            Value::Null => Err(RuntimeError::NullReference),
            _ => Err(RuntimeError::TypeMismatch { expected: "an array" }),
        }
    }

    fn pop_int(&mut self) -> Result<i64, RuntimeError> {
        match self.pop() {
            Value::Int(v) => Ok(v),
            _ => Err(RuntimeError::TypeMismatch { expected: "an integer" }),
        }
    }

    fn check_bounds(index: i64, len: usize) -> Result<usize, RuntimeError> {
        usize::try_from(index)
            .ok()
            .filter(|i| *i < len)
            .ok_or(RuntimeError::IndexOutOfRange { index, len })
    }

    // ========================================================================
    // Calls and construction
    // ========================================================================

    /// Constructs an instance via the member-pool constructor at `idx`.
    fn new_obj(&mut self, idx: u16) -> Result<(), RuntimeError> {
        let Member::Ctor(ctor) = self.code.member(idx) else {
            panic!("NewObj operand is not a constructor member");
        };
        let info = self.registry.class(ctor.class).ctor(ctor.index);
        let args = self.pop_n(info.params.len());
        let value = match &info.body {
            CtorBody::FieldInit => {
                let class = self.registry.class(ctor.class);
                let mut fields: Vec<Value> =
                    class.fields().iter().map(|f| Value::zero(&f.ty)).collect();
                for (i, arg) in args.into_iter().enumerate() {
                    fields[i] = arg;
                }
                Value::Obj(Rc::new(Instance::new(ctor.class, fields)))
            }
            CtorBody::Native(f) => f(self.registry, ctor.class, args)?,
        };
        self.push(value);
        Ok(())
    }

    /// Calls the member-pool method at `idx`, re-dispatching on the
    /// receiver's runtime class when `virt` is set.
    fn call_method(&mut self, idx: u16, virt: bool) -> Result<(), RuntimeError> {
        let registry = self.registry;
        let Member::Method(method) = self.code.member(idx) else {
            panic!("call operand is not a method member");
        };
        let mut info: &MethodInfo = registry.class(method.class).method(method.index);
        let mut args = self.pop_n(info.params.len());
        let receiver = if info.is_static { None } else { Some(self.pop()) };

        if virt {
            match &receiver {
                Some(Value::Null) => return Err(RuntimeError::NullReference),
                Some(Value::Obj(inst)) if inst.class() != method.class => {
                    let class = registry.class(inst.class());
                    let index = class
                        .method_named(&info.name)
                        .ok_or_else(|| RuntimeError::MissingMethod {
                            name: info.name.clone(),
                        })?;
                    info = class.method(index);
                }
                _ => {}
            }
        }

        let result = match &info.body {
            MethodBody::Native(f) => {
                let mut full = Vec::with_capacity(args.len() + 1);
                if let Some(r) = receiver {
                    full.push(r);
                }
                full.append(&mut args);
                f(registry, &full)?
            }
            MethodBody::FieldGet(field) => {
                let inst = Self::expect_obj(receiver)?;
                inst.field(*field)
            }
            MethodBody::FieldSet(field) => {
                let inst = Self::expect_obj(receiver)?;
                inst.set_field(*field, args.pop().expect("setter takes one argument"));
                Value::Null
            }
        };
        if info.ret != Ty::Void {
            self.push(result);
        }
        Ok(())
    }

    fn expect_obj(receiver: Option<Value>) -> Result<Rc<Instance>, RuntimeError> {
        match receiver {
            Some(Value::Obj(inst)) => Ok(inst),
            Some(Value::Null) | None => Err(RuntimeError::NullReference),
            _ => Err(RuntimeError::TypeMismatch { expected: "an object" }),
        }
    }

    // ========================================================================
    // Comparisons
    // ========================================================================

    /// Equality comparison.
    fn compare_eq(&mut self) {
        let rhs = self.pop();
        let lhs = self.pop();
        self.push(Value::Bool(lhs.cmp_eq(&rhs)));
    }

    /// Ordering comparison with a predicate.
    fn compare_ord<F>(&mut self, check: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(Ordering) -> bool,
    {
        let rhs = self.pop();
        let lhs = self.pop();
        let ord = match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    expected: "numeric operands",
                })
            }
        };
        self.push(Value::Bool(ord.is_some_and(check)));
        Ok(())
    }
}
