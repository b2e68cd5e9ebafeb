//! A Z-Machine (Infocom/Inform virtual machine) interpreter core, versions 1-5, 7, 8.
//!
//! The crate is split into a pure, host-agnostic core (memory, object tree, text, dictionary,
//! VM state, instruction decode/dispatch, Quetzal save format) and a narrow host boundary
//! ([`io_channel::IoChannel`] for synchronous output, [`interpreter::ExecutionState`] for the
//! handful of opcodes that must suspend on the host). [`driver`] and [`main`] wire that core up
//! to a real terminal and filesystem; embedders can use the core directly with their own host.

pub mod bitops;
pub mod dictionary;
pub mod driver;
pub mod error;
pub mod header;
pub mod instruction;
pub mod interpreter;
pub mod io_channel;
pub mod memory;
pub mod object;
pub mod opcode_tables;
pub mod quetzal;
pub mod stack;
pub mod text;
pub mod vm;
pub mod zrand;

pub use error::{GameError, Result};
pub use interpreter::{ExecutionState, Interpreter};
pub use memory::Memory;
pub use vm::{InterpreterConfig, Vm};
