//! Finalized code objects.
//!
//! A `Code` object is the output of emission and the input to the
//! interpreter: raw instruction bytes plus the pools that u16 operands index
//! into. There is no location or exception table; input trees carry no source
//! positions and the fast path surfaces no exceptions of its own.

use crate::{
    expr::Ty,
    registry::{ClassId, CtorId, MethodId},
    value::Value,
};

/// Compiled bytecode for one lambda body.
#[derive(Debug)]
pub(crate) struct Code {
    /// Raw instruction stream: one opcode byte followed by 0-2 operand bytes.
    bytecode: Vec<u8>,

    /// Values referenced by `LoadConst`.
    constants: Vec<Value>,

    /// Types referenced by cast, box, array and typed-store instructions.
    types: Vec<Ty>,

    /// Members referenced by call, construction and static-field
    /// instructions.
    members: Vec<Member>,

    /// Number of local slots to allocate per invocation.
    num_locals: u8,
}

/// A pooled member reference.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Member {
    Ctor(CtorId),
    Method(MethodId),
    StaticField { class: ClassId, field: usize },
}

impl Code {
    pub(crate) fn new(
        bytecode: Vec<u8>,
        constants: Vec<Value>,
        types: Vec<Ty>,
        members: Vec<Member>,
        num_locals: u8,
    ) -> Self {
        Self {
            bytecode,
            constants,
            types,
            members,
            num_locals,
        }
    }

    #[must_use]
    pub(crate) fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Returns the pooled constant at `index`.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range index; operands are emitted by the compiler
    /// and always valid.
    #[must_use]
    pub(crate) fn constant(&self, index: u16) -> &Value {
        &self.constants[index as usize]
    }

    #[must_use]
    pub(crate) fn ty(&self, index: u16) -> &Ty {
        &self.types[index as usize]
    }

    #[must_use]
    pub(crate) fn member(&self, index: u16) -> Member {
        self.members[index as usize]
    }

    #[must_use]
    pub(crate) fn num_locals(&self) -> u8 {
        self.num_locals
    }
}
