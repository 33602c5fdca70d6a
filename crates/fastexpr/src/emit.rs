//! Emission: the second pass that lowers a tree to bytecode.
//!
//! The emitter walks the same tree the analyzer walked and appends
//! instructions to the [`CodeBuilder`] the driver handed it, leaving the
//! body's value on the operand stack. Captured values are addressed through
//! the closure layout the analyzer fixed; the two passes agree by sharing
//! the [`ClosureInfo`] lists and the inline-encoding predicate.
//!
//! When any closure exists the compiled callable receives it as a hidden
//! argument 0 and every declared parameter shifts up by one. The emitter
//! applies this shift uniformly.

use std::rc::Rc;

use crate::{
    bytecode::{CodeBuilder, Member, Opcode},
    closure::{ClosureInfo, SLAB_ITEMS_FIELD},
    compile::Unsupported,
    expr::{CmpOp, ConstExpr, Expr, LambdaExpr, MemberBinding, MemberRef, NewExpr, ParamExpr, Ty},
    registry::{MethodId, Registry},
    value::Value,
};

/// Maximum number of arguments in a delegate invocation.
///
/// This limit comes from the bytecode format: `CallFn` uses a u8 operand for
/// the argument count.
const MAX_CALL_ARGS: usize = 255;

/// Emits bytecode for one lambda body.
pub(crate) struct Emitter<'a> {
    /// The emitter target, owned by the driver.
    code: &'a mut CodeBuilder,

    registry: &'a Registry,

    /// The body's own parameters, in declared order.
    params: &'a [Rc<ParamExpr>],

    /// Closure bookkeeping produced by the analyzer, already materialized.
    closure: Option<&'a ClosureInfo>,
}

impl<'a> Emitter<'a> {
    pub fn new(
        code: &'a mut CodeBuilder,
        registry: &'a Registry,
        params: &'a [Rc<ParamExpr>],
        closure: Option<&'a ClosureInfo>,
    ) -> Self {
        Self {
            code,
            registry,
            params,
            closure,
        }
    }

    /// Index shift for declared parameters: the closure, when present,
    /// occupies argument 0.
    fn arg_shift(&self) -> usize {
        usize::from(self.closure.is_some())
    }

    // ========================================================================
    // Expression dispatch
    // ========================================================================

    /// Emits an expression, leaving its value on the stack.
    pub fn expr(&mut self, expr: &Expr) -> Result<(), Unsupported> {
        match expr {
            Expr::Parameter(param) => self.parameter(param),

            Expr::Constant(node) => self.constant(node),

            Expr::Convert { operand, ty } => self.convert(operand, ty),

            Expr::ArrayIndex { array, index } => {
                self.expr(array)?;
                self.expr(index)?;
                self.code.emit(Opcode::LdelemRef);
                Ok(())
            }

            Expr::New(new) => self.new_obj(new),

            Expr::NewArrayInit { elem, items } => self.new_array(elem, items),

            Expr::MemberInit { new, bindings } => self.member_init(new, bindings),

            Expr::Call {
                receiver,
                method,
                args,
            } => self.call(receiver.as_deref(), *method, args),

            Expr::Member { object, member } => self.member(object.as_deref(), member),

            Expr::Lambda(lambda) => self.nested_lambda(lambda),

            Expr::Invoke { target, args } => self.invoke(target, args),

            Expr::Compare { op, left, right } => self.compare(*op, left, right),

            // Arithmetic and the remaining unary forms are outside the
            // compiled subset.
            Expr::Binary { .. } | Expr::Unary { .. } => Err(Unsupported::NodeKind),
        }
    }

    // ========================================================================
    // Parameters and constants
    // ========================================================================

    /// Emits a parameter reference: a (shifted) argument load for declared
    /// parameters, a closure-slot load for captured ones.
    fn parameter(&mut self, param: &Rc<ParamExpr>) -> Result<(), Unsupported> {
        if let Some(k) = self.params.iter().position(|p| Rc::ptr_eq(p, param)) {
            self.code.emit_load_arg(k + self.arg_shift());
            return Ok(());
        }
        let closure = self.closure.ok_or(Unsupported::CapturedParamNotFound)?;
        let slot = closure
            .param_slot(param)
            .ok_or(Unsupported::CapturedParamNotFound)?;
        self.load_slot(closure, slot);
        Ok(())
    }

    /// Emits a constant: inline when its type permits, otherwise a load of
    /// the closure slot the analyzer assigned, boxing a value-typed value
    /// whose static type is `Object`.
    fn constant(&mut self, node: &Rc<ConstExpr>) -> Result<(), Unsupported> {
        if node.is_inline_encodable() {
            self.inline_constant(node);
            return Ok(());
        }
        let closure = self
            .closure
            .expect("non-inline constant without a closure; analysis disagreed");
        let slot = closure
            .constant_slot(node)
            .expect("constant not collected during analysis");
        self.load_slot(closure, slot);

        if matches!(node.ty, Ty::Object) {
            let runtime = node.value.runtime_ty();
            if runtime.is_value_type() {
                let ty = self.code.add_type(runtime);
                self.code.emit_u16(Opcode::Box, ty);
            }
        }
        Ok(())
    }

    /// Materializes an inline-encodable constant directly in the
    /// instruction stream.
    fn inline_constant(&mut self, node: &ConstExpr) {
        match &node.value {
            Value::Null => self.code.emit(Opcode::LoadNull),
            Value::Bool(true) => self.code.emit(Opcode::LoadTrue),
            Value::Bool(false) => self.code.emit(Opcode::LoadFalse),
            Value::Int(v) => self.code.emit_load_int(*v),
            value => self.code.emit_const(value.clone()),
        }
    }

    // ========================================================================
    // Closure slot addressing
    // ========================================================================

    /// Emits the load of closure slot `slot`.
    ///
    /// Fixed-arity closures load the field whose declaration index equals the
    /// slot. The array slab loads its item array, indexes it, and casts the
    /// element back to the slot's static type unless that type is `Object`.
    fn load_slot(&mut self, closure: &ClosureInfo, slot: usize) {
        self.code.emit(Opcode::LoadArg0);
        if closure.is_array_slab() {
            self.code
                .emit_u16(Opcode::LoadField, SLAB_ITEMS_FIELD as u16);
            self.code.emit_load_int(slot as i64);
            self.code.emit(Opcode::LdelemRef);
            let slot_ty = closure.slot_ty(slot);
            if slot_ty != Ty::Object {
                let ty = self.code.add_type(slot_ty);
                self.code.emit_u16(Opcode::CastClass, ty);
            }
        } else {
            let field = u16::try_from(slot).expect("closure slot exceeds u16 range");
            self.code.emit_u16(Opcode::LoadField, field);
        }
    }

    // ========================================================================
    // Conversions and comparisons
    // ========================================================================

    /// Emits a checked reference conversion. A conversion to the universal
    /// reference type is rejected: it would be a no-op with ambiguous
    /// semantics.
    fn convert(&mut self, operand: &Expr, ty: &Ty) -> Result<(), Unsupported> {
        if matches!(ty, Ty::Object) {
            return Err(Unsupported::ConvertToObject);
        }
        self.expr(operand)?;
        let target = self.code.add_type(ty.clone());
        self.code.emit_u16(Opcode::CastClass, target);
        Ok(())
    }

    fn compare(&mut self, op: CmpOp, left: &Expr, right: &Expr) -> Result<(), Unsupported> {
        self.expr(left)?;
        self.expr(right)?;
        match op {
            CmpOp::Eq => self.code.emit(Opcode::Ceq),
            CmpOp::Lt => self.code.emit(Opcode::Clt),
            CmpOp::Gt => self.code.emit(Opcode::Cgt),
            // Negated forms: compare, then compare the result with false.
            CmpOp::Ne => self.negate(Opcode::Ceq),
            CmpOp::Le => self.negate(Opcode::Cgt),
            CmpOp::Ge => self.negate(Opcode::Clt),
        }
        Ok(())
    }

    fn negate(&mut self, op: Opcode) {
        self.code.emit(op);
        self.code.emit(Opcode::LoadFalse);
        self.code.emit(Opcode::Ceq);
    }

    // ========================================================================
    // Construction
    // ========================================================================

    fn new_obj(&mut self, new: &NewExpr) -> Result<(), Unsupported> {
        for arg in &new.args {
            self.expr(arg)?;
        }
        let ctor = self.code.add_member(Member::Ctor(new.ctor));
        self.code.emit_u16(Opcode::NewObj, ctor);
        Ok(())
    }

    /// Emits an array initializer: allocate, store each element through a
    /// local, and leave the array on the stack. Value-typed elements use the
    /// typed store.
    fn new_array(&mut self, elem: &Ty, items: &[Expr]) -> Result<(), Unsupported> {
        let local = self.code.declare_local();
        self.code.emit_load_int(items.len() as i64);
        let elem_idx = self.code.add_type(elem.clone());
        self.code.emit_u16(Opcode::NewArray, elem_idx);
        self.code.emit_u8(Opcode::StoreLoc, local);
        for (i, item) in items.iter().enumerate() {
            self.code.emit_u8(Opcode::LoadLoc, local);
            self.code.emit_load_int(i as i64);
            self.expr(item)?;
            if elem.is_value_type() {
                self.code.emit_u16(Opcode::Stelem, elem_idx);
            } else {
                self.code.emit(Opcode::StelemRef);
            }
        }
        self.code.emit_u8(Opcode::LoadLoc, local);
        Ok(())
    }

    /// Emits object construction followed by member assignments, leaving the
    /// initialized object on the stack.
    fn member_init(
        &mut self,
        new: &NewExpr,
        bindings: &[MemberBinding],
    ) -> Result<(), Unsupported> {
        self.new_obj(new)?;
        let local = self.code.declare_local();
        self.code.emit_u8(Opcode::StoreLoc, local);
        for binding in bindings {
            let MemberBinding::Assign { member, value } = binding else {
                return Err(Unsupported::MemberBinding);
            };
            self.code.emit_u8(Opcode::LoadLoc, local);
            self.expr(value)?;
            match member {
                MemberRef::Field { field, .. } => {
                    let field = u16::try_from(*field).expect("field index exceeds u16 range");
                    self.code.emit_u16(Opcode::StoreField, field);
                }
                MemberRef::Property { class, prop } => {
                    let prop = self.registry.class(*class).prop(*prop);
                    let setter = prop.setter.ok_or(Unsupported::PropertyWithoutSetter)?;
                    self.call_accessor(MethodId {
                        class: *class,
                        index: setter,
                    });
                }
                MemberRef::StaticField { .. } => return Err(Unsupported::MemberBinding),
            }
        }
        self.code.emit_u8(Opcode::LoadLoc, local);
        Ok(())
    }

    // ========================================================================
    // Calls and member access
    // ========================================================================

    fn call(
        &mut self,
        receiver: Option<&Expr>,
        method: MethodId,
        args: &[Expr],
    ) -> Result<(), Unsupported> {
        if let Some(receiver) = receiver {
            self.expr(receiver)?;
        }
        for arg in args {
            self.expr(arg)?;
        }
        self.call_accessor(method);
        Ok(())
    }

    /// Emits `Call` or `CallVirt` for a method per its virtual flag.
    fn call_accessor(&mut self, method: MethodId) {
        let info = self.registry.class(method.class).method(method.index);
        let member = self.code.add_member(Member::Method(method));
        if info.is_virtual {
            self.code.emit_u16(Opcode::CallVirt, member);
        } else {
            self.code.emit_u16(Opcode::Call, member);
        }
    }

    fn member(&mut self, object: Option<&Expr>, member: &MemberRef) -> Result<(), Unsupported> {
        match member {
            MemberRef::StaticField { class, field } => {
                let member = self.code.add_member(Member::StaticField {
                    class: *class,
                    field: *field,
                });
                self.code.emit_u16(Opcode::LoadStaticField, member);
                Ok(())
            }
            MemberRef::Field { field, .. } => {
                let object = object.ok_or(Unsupported::NodeKind)?;
                self.expr(object)?;
                let field = u16::try_from(*field).expect("field index exceeds u16 range");
                self.code.emit_u16(Opcode::LoadField, field);
                Ok(())
            }
            MemberRef::Property { class, prop } => {
                if let Some(object) = object {
                    self.expr(object)?;
                }
                let prop = self.registry.class(*class).prop(*prop);
                let getter = prop.getter.ok_or(Unsupported::PropertyWithoutGetter)?;
                self.call_accessor(MethodId {
                    class: *class,
                    index: getter,
                });
                Ok(())
            }
        }
    }

    fn invoke(&mut self, target: &Expr, args: &[Expr]) -> Result<(), Unsupported> {
        if args.len() > MAX_CALL_ARGS {
            return Err(Unsupported::NodeKind);
        }
        self.expr(target)?;
        for arg in args {
            self.expr(arg)?;
        }
        self.code.emit_u8(Opcode::CallFn, args.len() as u8);
        Ok(())
    }

    // ========================================================================
    // Nested lambdas
    // ========================================================================

    /// Emits a nested lambda appearing as a value.
    ///
    /// Loads the compiled callable from its closure slot, then threads each
    /// live outer value the inner lambda captured into the inner closure:
    /// duplicate the callable, reach its bound closure through the target
    /// accessor, push the source value (a declared parameter or a slot of
    /// this closure) and store it into the inner slot. Runs on every
    /// construction of the nested-lambda value, so the inner closure always
    /// sees the values of the invocation that produced it.
    fn nested_lambda(&mut self, lambda: &Rc<LambdaExpr>) -> Result<(), Unsupported> {
        let closure = self.closure.ok_or(Unsupported::CapturedParamNotFound)?;
        let (slot, nested) = closure
            .lambda_slot(lambda)
            .expect("nested lambda not collected during analysis");
        self.load_slot(closure, slot);

        let Some(inner) = nested.closure.as_deref() else {
            return Ok(());
        };
        let inner_slab = inner.is_array_slab();
        let inner_const_count = inner.constants.len();
        for (i, param) in inner.captured_params.iter().enumerate() {
            let inner_slot = inner_const_count + i;
            self.code.emit(Opcode::Dup);
            self.code.emit(Opcode::LoadFnTarget);
            if inner_slab {
                self.code
                    .emit_u16(Opcode::LoadField, SLAB_ITEMS_FIELD as u16);
                self.code.emit_load_int(inner_slot as i64);
                self.captured_source(param)?;
                if param.ty.is_value_type() {
                    let ty = self.code.add_type(param.ty.clone());
                    self.code.emit_u16(Opcode::Box, ty);
                }
                self.code.emit(Opcode::StelemRef);
            } else {
                self.captured_source(param)?;
                let field = u16::try_from(inner_slot).expect("closure slot exceeds u16 range");
                self.code.emit_u16(Opcode::StoreField, field);
            }
        }
        Ok(())
    }

    /// Pushes the current value of a parameter the inner lambda captured:
    /// either a declared parameter of this body or a slot of this body's own
    /// closure.
    fn captured_source(&mut self, param: &Rc<ParamExpr>) -> Result<(), Unsupported> {
        if let Some(k) = self.params.iter().position(|p| Rc::ptr_eq(p, param)) {
            self.code.emit_load_arg(k + self.arg_shift());
            return Ok(());
        }
        let closure = self.closure.ok_or(Unsupported::CapturedParamNotFound)?;
        let slot = closure
            .param_slot(param)
            .ok_or(Unsupported::CapturedParamNotFound)?;
        self.load_slot(closure, slot);
        Ok(())
    }
}
