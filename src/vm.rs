//! The virtual machine's mutable execution state: memory, both stacks, the PC, and the PRNG.
//!
//! Grounded on the source lineage's `vm.rs`, stripped of its per-variable debug tracing (writes
//! to "variable 2", "variable 216", etc. left over from a specific corruption hunt) and
//! restructured so variable 0's "pop on read / push on write" semantics, and the separate
//! "stack-pointer indirect" peek/replace semantics for `inc`/`dec`/`load`/`store`/`pull`, are two
//! distinct call paths instead of one `read_variable` the caller has to special-case.

use crate::error::{GameError, Result};
use crate::memory::Memory;
use crate::stack::{CallFrame, CallStack, EvalStack, MAX_LOCALS_PER_FRAME};
use crate::zrand::ZRand;
use log::debug;

pub struct InterpreterConfig {
    pub rng_seed: Option<u64>,
    pub max_eval_stack: usize,
    pub max_call_depth: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            rng_seed: None,
            max_eval_stack: 1024,
            max_call_depth: 1024,
        }
    }
}

pub struct Vm {
    pub memory: Memory,
    pub pc: u32,
    pub eval_stack: EvalStack,
    pub call_stack: CallStack,
    pub rng: ZRand,
}

impl Vm {
    pub fn new(memory: Memory, config: &InterpreterConfig) -> Vm {
        let pc = memory.header.initial_pc as u32;
        let mut call_stack = CallStack::new(config.max_call_depth);
        // The outermost "main" context has no return address and no locals; it exists purely
        // so local-variable opcodes never see an empty call stack before the first `call`.
        call_stack
            .push(CallFrame {
                return_pc: 0,
                return_store: None,
                num_locals: 0,
                locals: [0; MAX_LOCALS_PER_FRAME],
                num_args: 0,
                marker_index: 0,
            })
            .expect("fresh call stack always has room for the main frame");
        Vm {
            memory,
            pc,
            eval_stack: EvalStack::new(config.max_eval_stack),
            call_stack,
            rng: ZRand::from_config_seed(config.rng_seed),
        }
    }

    pub fn version(&self) -> u8 {
        self.memory.header.version
    }

    /// Unpack a packed routine/string address per §3 "Packed addresses".
    pub fn unpack_routine_addr(&self, packed: u16) -> u32 {
        match self.version() {
            1..=3 => packed as u32 * 2,
            4 | 5 => packed as u32 * 4,
            7 => packed as u32 * 4 + self.memory.header.routines_offset as u32 * 8,
            8 => packed as u32 * 8,
            _ => packed as u32 * 4,
        }
    }

    pub fn unpack_string_addr(&self, packed: u16) -> u32 {
        match self.version() {
            1..=3 => packed as u32 * 2,
            4 | 5 => packed as u32 * 4,
            7 => packed as u32 * 4 + self.memory.header.strings_offset as u32 * 8,
            8 => packed as u32 * 8,
            _ => packed as u32 * 4,
        }
    }

    fn local_index(&self, var: u8) -> usize {
        (var - 1) as usize
    }

    fn read_local(&self, var: u8) -> Result<u16> {
        let frame = self.call_stack.top()?;
        let index = self.local_index(var);
        if index >= frame.num_locals as usize {
            return Err(GameError::StackUnderflow {
                context: format!(
                    "local variable {var:#04x} read but routine only declares {} locals",
                    frame.num_locals
                ),
            });
        }
        Ok(frame.locals[index])
    }

    fn write_local(&mut self, var: u8, value: u16) -> Result<()> {
        let frame = self.call_stack.top_mut()?;
        let index = self.local_index(var);
        if index >= frame.num_locals as usize {
            return Err(GameError::StackUnderflow {
                context: format!(
                    "local variable {var:#04x} write but routine only declares {} locals",
                    frame.num_locals
                ),
            });
        }
        frame.locals[index] = value;
        Ok(())
    }

    /// Resolve a variable number to a *value*, following the normal operand rule: variable 0
    /// pops the evaluation stack.
    pub fn read_variable_for_operand(&mut self, var: u8) -> Result<u16> {
        match var {
            0x00 => self.eval_stack.pop_word(),
            0x01..=0x0F => self.read_local(var),
            _ => self.memory.global(var),
        }
    }

    /// Store a *result* value into a variable number, following the normal rule: variable 0
    /// pushes onto the evaluation stack.
    pub fn write_variable(&mut self, var: u8, value: u16) -> Result<()> {
        match var {
            0x00 => self.eval_stack.push_word(value),
            0x01..=0x0F => self.write_local(var, value),
            _ => self.memory.set_global(var, value),
        }
    }

    /// Read a variable *in place*, for the "stack-pointer indirect" opcodes (`inc`, `dec`,
    /// `load`, `inc_chk`, `dec_chk`) whose operand names a variable to inspect without
    /// consuming it: variable 0 peeks the stack top instead of popping it.
    pub fn read_variable_indirect(&self, var: u8) -> Result<u16> {
        match var {
            0x00 => self.eval_stack.peek_word(),
            0x01..=0x0F => self.read_local(var),
            _ => self.memory.global(var),
        }
    }

    /// Write a variable *in place*, for `inc`/`dec`/`store`/`pull`: variable 0 replaces the
    /// stack's top word instead of pushing a new one.
    pub fn write_variable_indirect(&mut self, var: u8, value: u16) -> Result<()> {
        match var {
            0x00 => self.eval_stack.replace_top_word(value),
            0x01..=0x0F => self.write_local(var, value),
            _ => self.memory.set_global(var, value),
        }
    }

    /// Push a new call frame, consuming `args` into locals and zero-filling/defaulting the rest
    /// from the routine header's initial values (§4 "Routine calls").
    pub fn call_routine(
        &mut self,
        routine_addr: u32,
        args: &[u16],
        return_pc: u32,
        return_store: Option<u8>,
    ) -> Result<()> {
        let num_locals = self.memory.load_byte(routine_addr)?;
        if num_locals as usize > MAX_LOCALS_PER_FRAME {
            return Err(GameError::MalformedImage(format!(
                "routine at {routine_addr:#06x} declares {num_locals} locals (max 15)"
            )));
        }
        let mut locals = [0u16; MAX_LOCALS_PER_FRAME];
        let version = self.version();
        for i in 0..num_locals as usize {
            let default = if version <= 4 {
                self.memory.load_word(routine_addr + 1 + i as u32 * 2)?
            } else {
                0
            };
            locals[i] = args.get(i).copied().unwrap_or(default);
        }
        let marker_index = self.eval_stack.depth();
        self.eval_stack.push_frame_marker()?;
        self.call_stack.push(CallFrame {
            return_pc,
            return_store,
            num_locals,
            locals,
            num_args: args.len().min(num_locals as usize) as u8,
            marker_index,
        })?;
        self.pc = if version <= 4 {
            routine_addr + 1 + num_locals as u32 * 2
        } else {
            routine_addr + 1
        };
        debug!(
            "call_routine: entering {routine_addr:#06x} with {} locals, {} args",
            num_locals,
            args.len()
        );
        Ok(())
    }

    /// Pop the current call frame and return to its caller, storing `value` if requested.
    /// Returns `false` when this was the outermost "main" frame (i.e. the game wants to return
    /// from its own top level, which should be treated as `quit`).
    pub fn return_from_routine(&mut self, value: u16) -> Result<bool> {
        let frame = self.call_stack.pop()?;
        self.eval_stack.unwind_to_marker(frame.marker_index);
        if self.call_stack.is_empty() {
            return Ok(false);
        }
        self.pc = frame.return_pc;
        if let Some(store_var) = frame.return_store {
            self.write_variable(store_var, value)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm_fixture() -> Vm {
        let mut bytes = vec![0u8; 1024];
        bytes[0] = 3;
        bytes[0x06] = 0x01;
        bytes[0x07] = 0x00; // initial PC 0x0100
        bytes[0x0C] = 0x00;
        bytes[0x0D] = 0x40; // globals at 0x40
        let memory = Memory::new(bytes).unwrap();
        Vm::new(memory, &InterpreterConfig::default())
    }

    #[test]
    fn variable_zero_read_pops_write_pushes() {
        let mut vm = vm_fixture();
        vm.write_variable(0x00, 77).unwrap();
        assert_eq!(vm.read_variable_for_operand(0x00).unwrap(), 77);
        assert_eq!(vm.eval_stack.depth(), 0);
    }

    #[test]
    fn stack_pointer_indirect_does_not_change_depth() {
        let mut vm = vm_fixture();
        vm.eval_stack.push_word(10).unwrap();
        vm.write_variable_indirect(0x00, 11).unwrap();
        assert_eq!(vm.read_variable_indirect(0x00).unwrap(), 11);
        assert_eq!(vm.eval_stack.depth(), 1);
    }

    #[test]
    fn globals_round_trip_through_memory() {
        let mut vm = vm_fixture();
        vm.write_variable(0x10, 0xBEEF).unwrap();
        assert_eq!(vm.read_variable_for_operand(0x10).unwrap(), 0xBEEF);
    }

    #[test]
    fn call_and_return_restore_caller_pc_and_stack() {
        let mut vm = vm_fixture();
        // Routine at 0x0200: 1 local, default 0.
        vm.memory.store_byte(0x0200, 1).unwrap();
        vm.memory.store_word(0x0201, 0).unwrap();
        vm.eval_stack.push_word(999).unwrap();
        vm.call_routine(0x0200, &[42], 0x0150, Some(0x10)).unwrap();
        assert_eq!(vm.read_variable_for_operand(0x01).unwrap(), 42);
        let kept_going = vm.return_from_routine(7).unwrap();
        assert!(kept_going);
        assert_eq!(vm.pc, 0x0150);
        assert_eq!(vm.memory.global(0x10).unwrap(), 7);
        assert_eq!(vm.eval_stack.depth(), 1); // the pre-call push(999) survives
    }

    #[test]
    fn returning_from_outermost_frame_reports_stop() {
        let mut vm = vm_fixture();
        assert!(!vm.return_from_routine(0).unwrap());
    }

    #[test]
    fn unpack_addresses_scale_with_version() {
        let mut bytes = vec![0u8; 64];
        bytes[0] = 5;
        let memory = Memory::new(bytes).unwrap();
        let vm = Vm::new(memory, &InterpreterConfig::default());
        assert_eq!(vm.unpack_routine_addr(0x1000), 0x4000);
    }
}
