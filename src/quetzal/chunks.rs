//! Individual Quetzal chunk payloads: `IFhd` (save identity), `UMem`/`CMem` (dynamic memory),
//! `Stks` (call stack + evaluation stack).
//!
//! Grounded on the source lineage's `quetzal/chunks.rs`, rewired against this crate's
//! `Vm`/`Memory`/`CallStack`/`EvalStack` types. The `Stks` frame layout (return PC, a flags byte
//! packing local count / has-result-var / argument count, an optional store-variable byte, an
//! eval-stack word count, then locals and stack words) follows the source lineage's encoding
//! rather than re-deriving one from the standard, since both sides of save/restore only need to
//! agree with each other.

use crate::error::{GameError, Result};
use crate::stack::CallFrame;
use crate::vm::Vm;

/// The interface-header chunk. Beyond the standard's identity fields (release/serial/checksum),
/// `resume_pc`/`resume_store` record where execution should continue on a *successful restore*:
/// the address right after the `save` opcode that produced this buffer, and which variable (if
/// any — v1-3's branch-based `save` writes none) should receive the "restored" result value `2`.
/// A real restore never returns control to the `restore` opcode's own continuation; it resumes
/// the `save` call that originally ran.
pub struct IFhdChunk {
    pub release: u16,
    pub serial: [u8; 6],
    pub checksum: u16,
    pub resume_pc: u32,
    pub resume_store: Option<u8>,
}

const NO_STORE: u8 = 0xFF;

impl IFhdChunk {
    pub fn from_vm(vm: &Vm, resume_pc: u32, resume_store: Option<u8>) -> Result<IFhdChunk> {
        let release = vm.memory.load_word(0x02)?;
        let mut serial = [0u8; 6];
        serial.copy_from_slice(vm.memory.slice(0x12, 6)?);
        Ok(IFhdChunk {
            release,
            serial,
            checksum: vm.memory.header.checksum,
            resume_pc,
            resume_store,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(14);
        bytes.extend_from_slice(&self.release.to_be_bytes());
        bytes.extend_from_slice(&self.serial);
        bytes.extend_from_slice(&self.checksum.to_be_bytes());
        let pc_bytes = self.resume_pc.to_be_bytes();
        bytes.extend_from_slice(&pc_bytes[1..4]);
        bytes.push(self.resume_store.unwrap_or(NO_STORE));
        bytes
    }

    pub fn from_bytes(data: &[u8]) -> Result<IFhdChunk> {
        if data.len() < 14 {
            return Err(GameError::MalformedImage("IFhd chunk too short".into()));
        }
        let release = u16::from_be_bytes([data[0], data[1]]);
        let mut serial = [0u8; 6];
        serial.copy_from_slice(&data[2..8]);
        let checksum = u16::from_be_bytes([data[8], data[9]]);
        let resume_pc = ((data[10] as u32) << 16) | ((data[11] as u32) << 8) | data[12] as u32;
        let resume_store = if data[13] == NO_STORE {
            None
        } else {
            Some(data[13])
        };
        Ok(IFhdChunk {
            release,
            serial,
            checksum,
            resume_pc,
            resume_store,
        })
    }
}

pub struct UMemChunk {
    pub memory: Vec<u8>,
}

impl UMemChunk {
    pub fn from_vm(vm: &Vm) -> UMemChunk {
        let dynamic_size = vm.memory.static_mem_base();
        UMemChunk {
            memory: vm.memory.as_bytes()[..dynamic_size].to_vec(),
        }
    }
}

/// One serialized call frame inside a `Stks` chunk.
struct FrameRecord<'a> {
    frame: &'a CallFrame,
    stack_words: Vec<u16>,
}

pub struct StksChunk {
    pub data: Vec<u8>,
}

impl StksChunk {
    pub fn from_vm(vm: &Vm) -> Result<StksChunk> {
        let frames = vm.call_stack.frames();
        let mut records = Vec::with_capacity(frames.len());
        for (i, frame) in frames.iter().enumerate() {
            // The outermost "main" frame never had a frame marker pushed for it (it exists
            // before the first `call`), so its stack range starts at 0 with no sentinel to skip.
            let start = if i == 0 { 0 } else { frame.marker_index + 1 };
            let end = frames
                .get(i + 1)
                .map(|next| next.marker_index)
                .unwrap_or_else(|| vm.eval_stack.depth());
            let stack_words = vm.eval_stack.words_in_range(start, end)?;
            records.push(FrameRecord {
                frame,
                stack_words,
            });
        }

        let mut data = Vec::new();
        for record in &records {
            let frame = record.frame;
            let pc_bytes = frame.return_pc.to_be_bytes();
            data.extend_from_slice(&pc_bytes[1..4]);

            let mut flags = frame.num_locals & 0x0F;
            if frame.return_store.is_some() {
                flags |= 0x10;
            }
            flags |= (frame.num_args & 0x07) << 5;
            data.push(flags);

            if let Some(store_var) = frame.return_store {
                data.push(store_var);
            }

            data.extend_from_slice(&(record.stack_words.len() as u16).to_be_bytes());
            for local in &frame.locals[..frame.num_locals as usize] {
                data.extend_from_slice(&local.to_be_bytes());
            }
            for word in &record.stack_words {
                data.extend_from_slice(&word.to_be_bytes());
            }
        }
        Ok(StksChunk { data })
    }

    pub fn restore_to_vm(&self, vm: &mut Vm) -> Result<()> {
        vm.call_stack.clear();
        vm.eval_stack.clear();

        let data = &self.data;
        let mut offset = 0;
        let mut frame_index = 0;
        while offset < data.len() {
            if offset + 4 > data.len() {
                return Err(GameError::MalformedImage(
                    "Stks chunk truncated before a frame header".into(),
                ));
            }
            let return_pc = ((data[offset] as u32) << 16)
                | ((data[offset + 1] as u32) << 8)
                | data[offset + 2] as u32;
            let flags = data[offset + 3];
            offset += 4;

            let num_locals = flags & 0x0F;
            let has_store = flags & 0x10 != 0;
            let num_args = (flags >> 5) & 0x07;

            let return_store = if has_store {
                if offset >= data.len() {
                    return Err(GameError::MalformedImage(
                        "Stks chunk truncated before a store variable".into(),
                    ));
                }
                let v = data[offset];
                offset += 1;
                Some(v)
            } else {
                None
            };

            if offset + 2 > data.len() {
                return Err(GameError::MalformedImage(
                    "Stks chunk truncated before an eval-stack word count".into(),
                ));
            }
            let stack_count = u16::from_be_bytes([data[offset], data[offset + 1]]) as usize;
            offset += 2;

            let mut locals = [0u16; crate::stack::MAX_LOCALS_PER_FRAME];
            for local in locals.iter_mut().take(num_locals as usize) {
                if offset + 2 > data.len() {
                    return Err(GameError::MalformedImage(
                        "Stks chunk truncated inside a locals block".into(),
                    ));
                }
                *local = u16::from_be_bytes([data[offset], data[offset + 1]]);
                offset += 2;
            }

            if frame_index > 0 {
                vm.eval_stack.push_frame_marker()?;
            }
            let marker_index = if vm.eval_stack.depth() > 0 {
                vm.eval_stack.depth() - 1
            } else {
                0
            };

            for _ in 0..stack_count {
                if offset + 2 > data.len() {
                    return Err(GameError::MalformedImage(
                        "Stks chunk truncated inside a stack-values block".into(),
                    ));
                }
                vm.eval_stack
                    .push_word(u16::from_be_bytes([data[offset], data[offset + 1]]))?;
                offset += 2;
            }

            vm.call_stack.push(CallFrame {
                return_pc,
                return_store,
                num_locals,
                locals,
                num_args,
                marker_index,
            })?;
            frame_index += 1;
        }
        Ok(())
    }
}

/// `IntD` chunk: optional interpreter-specific data. Carried for completeness; this interpreter
/// writes one with no payload beyond its four-character id.
pub struct IntDChunk {
    pub interpreter_id: [u8; 4],
    pub data: Vec<u8>,
}

impl Default for IntDChunk {
    fn default() -> Self {
        IntDChunk {
            interpreter_id: *b"ZWRT",
            data: Vec::new(),
        }
    }
}

impl IntDChunk {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.data.len());
        bytes.extend_from_slice(&self.interpreter_id);
        bytes.extend_from_slice(&self.data);
        bytes
    }
}
