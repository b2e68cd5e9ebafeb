//! The interpreter's error taxonomy.
//!
//! Almost every fallible operation in this crate returns `Result<T, GameError>`. The source
//! lineage this crate is grounded on used bare `Result<T, String>` throughout; here each failure
//! mode carries the structured context (address, opcode, variable number) needed to build a
//! crash report without re-parsing a formatted string.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("story file truncated: expected at least {expected} bytes, got {actual}")]
    ImageTruncated { expected: usize, actual: usize },

    #[error("unsupported Z-Machine version: {0}")]
    UnsupportedVersion(u8),

    #[error("memory access out of bounds: address {addr:#06x} (image size {size:#06x})")]
    OutOfBounds { addr: u32, size: usize },

    #[error("stack underflow: {context}")]
    StackUnderflow { context: String },

    #[error("stack overflow: {context} exceeded limit of {limit}")]
    StackOverflow { context: String, limit: usize },

    #[error("unknown opcode {opcode:#04x} at PC {pc:#06x}")]
    UnknownOpcode { opcode: u8, pc: u32 },

    #[error("put_prop on object {obj} property {prop}: declared size {size} is not 1 or 2")]
    PropertyBadSize { obj: u16, prop: u8, size: usize },

    #[error("variable number {0:#04x} is not a valid global (must be 0x10..=0xff)")]
    AddressOutOfRange(u8),

    #[error("malformed story image: {0}")]
    MalformedImage(String),

    #[error("invalid object number {obj} (max {max} for this version)")]
    InvalidObject { obj: u16, max: u16 },
}

impl GameError {
    /// True for errors that should terminate the run with a crash report. The only
    /// non-fatal variant is handled locally by the arithmetic opcodes (divide by zero
    /// returns 0 and never constructs a `GameError`).
    pub fn is_fatal(&self) -> bool {
        true
    }
}

pub type Result<T> = std::result::Result<T, GameError>;
