//! The instruction set.
//!
//! Opcodes are one byte, followed by 0-2 bytes of operand. `u16` operands are
//! little-endian indices into the code object's constant, type or member
//! pools. Argument loads and small integer literals have dense zero-operand
//! forms for the hot cases.

use strum::FromRepr;

/// A bytecode instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Opcode {
    // Argument loads. Dense forms cover indices 0-3; `LoadArg` takes a u8
    // operand, `LoadArgW` a u16.
    LoadArg0,
    LoadArg1,
    LoadArg2,
    LoadArg3,
    LoadArg,
    LoadArgW,

    // Literals.
    LoadNull,
    LoadTrue,
    LoadFalse,
    /// Dense integer literals -1..=8.
    LoadIntM1,
    LoadInt0,
    LoadInt1,
    LoadInt2,
    LoadInt3,
    LoadInt4,
    LoadInt5,
    LoadInt6,
    LoadInt7,
    LoadInt8,
    /// Integer literal with an i8 operand.
    LoadSmallInt,
    /// Pooled constant (wide integers, doubles, strings, enum values,
    /// type handles); u16 operand indexes the constant pool.
    LoadConst,

    // Locals; u8 operand.
    LoadLoc,
    StoreLoc,

    // Fields. `LoadField`/`StoreField` take the field's declaration index
    // within the receiver's class; `LoadStaticField` indexes the member pool.
    LoadField,
    StoreField,
    LoadStaticField,

    // Objects and arrays.
    /// Construct an instance; u16 member-pool operand names the constructor.
    NewObj,
    /// Allocate a zero-filled array; u16 type-pool operand is the element
    /// type, length popped from the stack.
    NewArray,
    /// Reference element load: pops index, array.
    LdelemRef,
    /// Reference element store: pops value, index, array.
    StelemRef,
    /// Typed element store for value-typed elements; u16 type-pool operand.
    Stelem,

    // Type tests.
    /// Checked cast; u16 type-pool operand. Null passes for reference types.
    CastClass,
    /// Box a value type into an object location; u16 type-pool operand.
    /// Representationally a no-op, but validates the operand's runtime type.
    Box,

    // Calls.
    /// Direct call; u16 member-pool operand.
    Call,
    /// Virtual call: re-dispatches on the receiver's runtime class and
    /// null-checks the receiver; u16 member-pool operand.
    CallVirt,
    /// Invoke a delegate value; u8 operand is the argument count.
    CallFn,
    /// Pops a callable and pushes its bound closure object (null if unbound).
    LoadFnTarget,

    // Comparisons; push a bool.
    Ceq,
    Clt,
    Cgt,

    Dup,
    Ret,
}
