//! Bytecode: instruction set, code objects, the emitter target and the
//! interpreter that stands in for a JIT-backed dynamic-method facility.

pub(crate) mod builder;
pub(crate) mod code;
pub(crate) mod op;
pub(crate) mod vm;

pub(crate) use builder::CodeBuilder;
pub(crate) use code::{Code, Member};
pub(crate) use op::Opcode;
