//! Runtime class metadata: the reflection surface the compiler consumes.
//!
//! Hosts register their classes once and hand the resulting [`Registry`] to
//! every compile and invoke call. A class carries its fields in declaration
//! order, properties with optional accessor methods, constructors, methods
//! with static/virtual flags, and static fields.
//!
//! The registry also owns the write-once table of closure classes: the ten
//! fixed-arity product classes used for small closures and the single
//! array-slab class used beyond that. These are registered by [`Registry::new`]
//! and never change afterwards.

use std::cell::RefCell;

use ahash::AHashMap;

use crate::{
    bytecode::vm::RuntimeError,
    closure::MAX_FIXED,
    expr::Ty,
    value::Value,
};

/// Index of a registered class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(u32);

impl ClassId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("class count exceeds u32 range"))
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A method addressed by its declaring class and declaration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodId {
    pub class: ClassId,
    pub index: usize,
}

/// A constructor addressed by its declaring class and declaration index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CtorId {
    pub class: ClassId,
    pub index: usize,
}

/// Host-implemented method body.
///
/// For instance methods the receiver is passed as `args[0]`.
pub type NativeFn = fn(&Registry, &[Value]) -> Result<Value, RuntimeError>;

/// Host-implemented constructor body, handed the declaring class and the
/// evaluated arguments.
pub type NativeCtor = fn(&Registry, ClassId, Vec<Value>) -> Result<Value, RuntimeError>;

/// How a method executes.
#[derive(Debug)]
pub enum MethodBody {
    Native(NativeFn),
    /// Field-backed getter: returns the receiver's field at this index.
    FieldGet(usize),
    /// Field-backed setter: stores the single argument into the receiver's
    /// field at this index.
    FieldSet(usize),
}

/// A method declaration.
#[derive(Debug)]
pub struct MethodInfo {
    pub name: String,
    pub is_static: bool,
    pub is_virtual: bool,
    /// Parameter types, excluding the receiver.
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub body: MethodBody,
}

/// An instance field declaration. Declaration order is the field index.
#[derive(Debug)]
pub struct FieldInfo {
    pub name: String,
    pub ty: Ty,
}

/// A static field with its current value.
#[derive(Debug)]
pub struct StaticField {
    pub name: String,
    pub ty: Ty,
    value: RefCell<Value>,
}

impl StaticField {
    #[must_use]
    pub fn value(&self) -> Value {
        self.value.borrow().clone()
    }

    pub fn set_value(&self, value: Value) {
        *self.value.borrow_mut() = value;
    }
}

/// A property: optional getter and setter, given as method indices within the
/// declaring class.
#[derive(Debug)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: Ty,
    pub getter: Option<usize>,
    pub setter: Option<usize>,
}

/// How a constructor executes.
#[derive(Debug)]
pub enum CtorBody {
    /// Zero-initialize all fields, then assign the arguments to the first
    /// `params.len()` fields in declaration order. Covers plain record-style
    /// classes and the generated closure classes.
    FieldInit,
    Native(NativeCtor),
}

/// A constructor declaration.
#[derive(Debug)]
pub struct CtorInfo {
    pub params: Vec<Ty>,
    pub body: CtorBody,
}

/// A registered class.
#[derive(Debug)]
pub struct ClassInfo {
    name: String,
    fields: Vec<FieldInfo>,
    statics: Vec<StaticField>,
    props: Vec<PropertyInfo>,
    methods: Vec<MethodInfo>,
    ctors: Vec<CtorInfo>,
    /// Method lookup for virtual dispatch on the receiver's runtime class.
    methods_by_name: AHashMap<String, usize>,
}

impl ClassInfo {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    #[must_use]
    pub fn field(&self, index: usize) -> &FieldInfo {
        &self.fields[index]
    }

    #[must_use]
    pub fn static_field(&self, index: usize) -> &StaticField {
        &self.statics[index]
    }

    #[must_use]
    pub fn prop(&self, index: usize) -> &PropertyInfo {
        &self.props[index]
    }

    #[must_use]
    pub fn method(&self, index: usize) -> &MethodInfo {
        &self.methods[index]
    }

    #[must_use]
    pub fn ctor(&self, index: usize) -> &CtorInfo {
        &self.ctors[index]
    }

    /// Looks up a method by name, for virtual dispatch.
    #[must_use]
    pub fn method_named(&self, name: &str) -> Option<usize> {
        self.methods_by_name.get(name).copied()
    }
}

/// Builder for registering a class.
///
/// Field, property, method and constructor indices are assigned in call
/// order; the returned ids from [`Registry::add_class`] combine with those
/// indices to form member references.
#[derive(Debug, Default)]
pub struct ClassBuilder {
    name: String,
    fields: Vec<FieldInfo>,
    statics: Vec<StaticField>,
    props: Vec<PropertyInfo>,
    methods: Vec<MethodInfo>,
    ctors: Vec<CtorInfo>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn field(mut self, name: impl Into<String>, ty: Ty) -> Self {
        self.fields.push(FieldInfo {
            name: name.into(),
            ty,
        });
        self
    }

    pub fn static_field(mut self, name: impl Into<String>, ty: Ty, value: Value) -> Self {
        self.statics.push(StaticField {
            name: name.into(),
            ty,
            value: RefCell::new(value),
        });
        self
    }

    /// Declares a field-backed read/write property: adds the backing field,
    /// non-virtual accessor methods and the property entry.
    pub fn auto_property(self, name: &str, ty: Ty) -> Self {
        self.property(name, ty, true, true)
    }

    /// Declares a field-backed read-only property (no setter).
    pub fn getter_property(self, name: &str, ty: Ty) -> Self {
        self.property(name, ty, true, false)
    }

    /// Declares a field-backed write-only property (no getter).
    pub fn setter_property(self, name: &str, ty: Ty) -> Self {
        self.property(name, ty, false, true)
    }

    fn property(mut self, name: &str, ty: Ty, with_getter: bool, with_setter: bool) -> Self {
        let field = self.fields.len();
        self.fields.push(FieldInfo {
            name: format!("<{name}>k__backing"),
            ty: ty.clone(),
        });
        let getter = with_getter.then(|| {
            self.methods.push(MethodInfo {
                name: format!("get_{name}"),
                is_static: false,
                is_virtual: false,
                params: Vec::new(),
                ret: ty.clone(),
                body: MethodBody::FieldGet(field),
            });
            self.methods.len() - 1
        });
        let setter = with_setter.then(|| {
            self.methods.push(MethodInfo {
                name: format!("set_{name}"),
                is_static: false,
                is_virtual: false,
                params: vec![ty.clone()],
                ret: Ty::Void,
                body: MethodBody::FieldSet(field),
            });
            self.methods.len() - 1
        });
        self.props.push(PropertyInfo {
            name: name.to_owned(),
            ty,
            getter,
            setter,
        });
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        is_static: bool,
        is_virtual: bool,
        params: Vec<Ty>,
        ret: Ty,
        body: NativeFn,
    ) -> Self {
        self.methods.push(MethodInfo {
            name: name.into(),
            is_static,
            is_virtual,
            params,
            ret,
            body: MethodBody::Native(body),
        });
        self
    }

    pub fn ctor(mut self, params: Vec<Ty>, body: CtorBody) -> Self {
        self.ctors.push(CtorInfo { params, body });
        self
    }

    fn build(self) -> ClassInfo {
        let methods_by_name = self
            .methods
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        ClassInfo {
            name: self.name,
            fields: self.fields,
            statics: self.statics,
            props: self.props,
            methods: self.methods,
            ctors: self.ctors,
            methods_by_name,
        }
    }
}

/// Owns all registered classes plus the generated closure classes.
#[derive(Debug)]
pub struct Registry {
    classes: Vec<ClassInfo>,
    /// Fixed-arity closure classes; index `n - 1` holds the arity-`n` class.
    closure_classes: Vec<ClassId>,
    /// The array-slab closure class with its single `items` field.
    array_closure: ClassId,
}

impl Registry {
    /// Creates a registry with the closure-class table pre-registered.
    ///
    /// The table is write-once: nothing mutates it after construction, so a
    /// registry can be shared freely by concurrent reads within one thread.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            classes: Vec::new(),
            closure_classes: Vec::new(),
            array_closure: ClassId(0),
        };
        for arity in 1..=MAX_FIXED {
            let mut builder = ClassBuilder::new(format!("Closure{arity}"));
            for i in 1..=arity {
                builder = builder.field(format!("v{i}"), Ty::Object);
            }
            let class = registry.add_class(builder.ctor(vec![Ty::Object; arity], CtorBody::FieldInit));
            registry.closure_classes.push(class);
        }
        registry.array_closure = registry.add_class(
            ClassBuilder::new("ArrayClosure")
                .field("items", Ty::array_of(Ty::Object))
                .ctor(vec![Ty::array_of(Ty::Object)], CtorBody::FieldInit),
        );
        registry
    }

    /// Registers a class and returns its id.
    pub fn add_class(&mut self, builder: ClassBuilder) -> ClassId {
        let id = ClassId::new(self.classes.len());
        self.classes.push(builder.build());
        id
    }

    /// Returns the class for an id.
    ///
    /// # Panics
    ///
    /// Panics on a foreign id; ids are only minted by [`Registry::add_class`].
    #[must_use]
    pub fn class(&self, id: ClassId) -> &ClassInfo {
        &self.classes[id.index()]
    }

    /// The fixed-arity closure class for `arity` slots (1..=MAX_FIXED).
    pub(crate) fn closure_class(&self, arity: usize) -> ClassId {
        self.closure_classes[arity - 1]
    }

    pub(crate) fn array_closure(&self) -> ClassId {
        self.array_closure
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
