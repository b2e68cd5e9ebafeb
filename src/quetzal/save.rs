//! Building a Quetzal save buffer from a running [`Vm`].
//!
//! Grounded on the source lineage's `quetzal/save.rs` (an `interpreter::quetzal` submodule in
//! that codebase); here it returns an owned `Vec<u8>` rather than writing a file, since the host
//! owns the storage medium and only exchanges opaque bytes with the core.

use crate::error::Result;
use crate::quetzal::chunks::{IFhdChunk, IntDChunk, StksChunk};
use crate::quetzal::compressed_memory::compress_memory;
use crate::quetzal::iff::IffFile;
use crate::vm::Vm;
use log::info;

/// Serialize `vm`'s current state into a Quetzal (`IFZS`) buffer. Dynamic memory is always
/// stored compressed (`CMem`); the uncompressed `UMem` path exists in [`UMemChunk`] for restoring
/// older save files but this interpreter never writes one.
///
/// `resume_pc`/`resume_store` describe where a later, successful `restore` should continue: the
/// address after the `save` opcode that's calling this, and the variable (if any) that should
/// receive the "restored" result value `2`.
pub fn create_save_bytes(vm: &Vm, resume_pc: u32, resume_store: Option<u8>) -> Result<Vec<u8>> {
    let mut iff = IffFile::new(*b"IFZS");

    let ifhd = IFhdChunk::from_vm(vm, resume_pc, resume_store)?;
    iff.add_chunk(*b"IFhd", ifhd.to_bytes());

    let dynamic_size = vm.memory.static_mem_base();
    let current = &vm.memory.as_bytes()[..dynamic_size];
    let original = &vm.memory.original_bytes()[..dynamic_size];
    let cmem_data = compress_memory(current, original);
    iff.add_chunk(*b"CMem", cmem_data);

    let stks = StksChunk::from_vm(vm)?;
    iff.add_chunk(*b"Stks", stks.data);

    iff.add_chunk(*b"IntD", IntDChunk::default().to_bytes());

    let bytes = iff.to_bytes();
    info!("created save buffer: {} bytes", bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use crate::vm::InterpreterConfig;

    fn vm_fixture() -> Vm {
        let mut bytes = vec![0u8; 256];
        bytes[0] = 3;
        bytes[0x0C] = 0x00;
        bytes[0x0D] = 0x40;
        let memory = Memory::new(bytes).unwrap();
        Vm::new(memory, &InterpreterConfig::default())
    }

    #[test]
    fn produces_a_well_formed_iff_buffer() {
        let vm = vm_fixture();
        let bytes = create_save_bytes(&vm, 0x0200, Some(0x10)).unwrap();
        assert_eq!(&bytes[0..4], b"FORM");
        assert_eq!(&bytes[8..12], b"IFZS");
    }
}
