//! Builder for emitting bytecode during compilation.
//!
//! `CodeBuilder` is the emitter target: an instruction-stream sink with
//! helpers that pick the densest encoding for argument loads and integer
//! literals, and that intern constants, types and member references into the
//! pools a finalized [`Code`] object carries.

use super::{
    code::{Code, Member},
    op::Opcode,
};
use crate::{expr::Ty, value::Value};

/// Builder for emitting bytecode during compilation.
///
/// # Usage
///
/// ```ignore
/// let mut builder = CodeBuilder::new();
/// builder.emit_load_arg(0);
/// builder.emit_load_int(42);
/// builder.emit(Opcode::Ceq);
/// builder.emit(Opcode::Ret);
/// let code = builder.build();
/// ```
#[derive(Debug, Default)]
pub(crate) struct CodeBuilder {
    /// The bytecode being built.
    bytecode: Vec<u8>,

    /// Constants collected during emission.
    constants: Vec<Value>,

    /// Types referenced by emitted instructions.
    types: Vec<Ty>,

    /// Member references (constructors, methods, static fields).
    members: Vec<Member>,

    /// Number of local slots declared so far.
    num_locals: u8,
}

impl CodeBuilder {
    /// Creates a new empty CodeBuilder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits a no-operand instruction.
    pub fn emit(&mut self, op: Opcode) {
        self.bytecode.push(op as u8);
    }

    /// Emits an instruction with a u8 operand.
    pub fn emit_u8(&mut self, op: Opcode, operand: u8) {
        self.bytecode.push(op as u8);
        self.bytecode.push(operand);
    }

    /// Emits an instruction with an i8 operand.
    pub fn emit_i8(&mut self, op: Opcode, operand: i8) {
        self.bytecode.push(op as u8);
        self.bytecode.push(operand as u8);
    }

    /// Emits an instruction with a u16 operand (little-endian).
    pub fn emit_u16(&mut self, op: Opcode, operand: u16) {
        self.bytecode.push(op as u8);
        self.bytecode.extend_from_slice(&operand.to_le_bytes());
    }

    /// Emits an argument load, using specialized opcodes for indices 0-3.
    ///
    /// Indices 0-3 use zero-operand opcodes (`LoadArg0`, etc.).
    /// Indices 4-255 use `LoadArg` with a u8 operand.
    /// Indices 256+ use `LoadArgW` with a u16 operand.
    pub fn emit_load_arg(&mut self, index: usize) {
        match index {
            0 => self.emit(Opcode::LoadArg0),
            1 => self.emit(Opcode::LoadArg1),
            2 => self.emit(Opcode::LoadArg2),
            3 => self.emit(Opcode::LoadArg3),
            i if i <= 255 => self.emit_u8(Opcode::LoadArg, i as u8),
            i => self.emit_u16(
                Opcode::LoadArgW,
                u16::try_from(i).expect("argument index exceeds u16 range"),
            ),
        }
    }

    /// Emits an integer literal, using dense opcodes for -1..=8, the i8 short
    /// form when it fits, and the constant pool otherwise.
    pub fn emit_load_int(&mut self, value: i64) {
        match value {
            -1 => self.emit(Opcode::LoadIntM1),
            0 => self.emit(Opcode::LoadInt0),
            1 => self.emit(Opcode::LoadInt1),
            2 => self.emit(Opcode::LoadInt2),
            3 => self.emit(Opcode::LoadInt3),
            4 => self.emit(Opcode::LoadInt4),
            5 => self.emit(Opcode::LoadInt5),
            6 => self.emit(Opcode::LoadInt6),
            7 => self.emit(Opcode::LoadInt7),
            8 => self.emit(Opcode::LoadInt8),
            v => {
                if let Ok(small) = i8::try_from(v) {
                    self.emit_i8(Opcode::LoadSmallInt, small);
                } else {
                    self.emit_const(Value::Int(v));
                }
            }
        }
    }

    /// Adds a constant to the pool and emits a `LoadConst` for it.
    pub fn emit_const(&mut self, value: Value) {
        let idx = self.add_const(value);
        self.emit_u16(Opcode::LoadConst, idx);
    }

    /// Adds a constant to the pool, returning its index.
    ///
    /// # Panics
    ///
    /// Panics if the constant pool exceeds 65535 entries. This is a
    /// compile-time limit rather than silent truncation.
    #[must_use]
    pub fn add_const(&mut self, value: Value) -> u16 {
        let idx = self.constants.len();
        self.constants.push(value);
        u16::try_from(idx).expect("constant pool exceeds u16 range (65535)")
    }

    /// Adds a type to the pool, returning its index.
    #[must_use]
    pub fn add_type(&mut self, ty: Ty) -> u16 {
        let idx = self.types.len();
        self.types.push(ty);
        u16::try_from(idx).expect("type pool exceeds u16 range (65535)")
    }

    /// Adds a member reference to the pool, returning its index.
    #[must_use]
    pub fn add_member(&mut self, member: Member) -> u16 {
        let idx = self.members.len();
        self.members.push(member);
        u16::try_from(idx).expect("member pool exceeds u16 range (65535)")
    }

    /// Declares a fresh local slot and returns its index.
    ///
    /// # Panics
    ///
    /// Panics past 255 locals; array and member-init initializers use one
    /// local each, so real trees never get close.
    #[must_use]
    pub fn declare_local(&mut self) -> u8 {
        let idx = self.num_locals;
        self.num_locals = self
            .num_locals
            .checked_add(1)
            .expect("local count exceeds u8 range (255)");
        idx
    }

    /// Builds the final Code object.
    #[must_use]
    pub fn build(self) -> Code {
        Code::new(
            self.bytecode,
            self.constants,
            self.types,
            self.members,
            self.num_locals,
        )
    }
}
