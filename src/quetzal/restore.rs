//! Applying a Quetzal save buffer to a running [`Vm`].
//!
//! Grounded on the source lineage's `quetzal/restore.rs`; file I/O and the interactive filename
//! prompt are dropped since the host, not the core, owns storage (it hands back the bytes it
//! previously got from a `save` request).

use crate::error::{GameError, Result};
use crate::quetzal::chunks::{IFhdChunk, StksChunk};
use crate::quetzal::compressed_memory::decompress_memory;
use crate::quetzal::iff::IffFile;
use crate::vm::Vm;
use log::{debug, info, warn};

/// What the caller (the `restore` opcode handler) should do once the buffer has been applied:
/// jump to `resume_pc` and, if `resume_store` names a variable, write `2` there before resuming
/// (the "this is a restored game" signal `save`'s caller checks for).
pub struct RestorePoint {
    pub resume_pc: u32,
    pub resume_store: Option<u8>,
}

/// Apply a previously-created save buffer to `vm`. A release mismatch against the currently
/// loaded story file is reported as [`GameError::MalformedImage`].
pub fn restore_from_bytes(vm: &mut Vm, bytes: &[u8]) -> Result<RestorePoint> {
    let iff = IffFile::from_bytes(bytes)?;
    if &iff.form_type != b"IFZS" {
        return Err(GameError::MalformedImage(format!(
            "save buffer has form type {:?}, expected IFZS",
            String::from_utf8_lossy(&iff.form_type)
        )));
    }

    let ifhd_chunk = iff
        .find_chunk(b"IFhd")
        .ok_or_else(|| GameError::MalformedImage("save buffer missing IFhd chunk".into()))?;
    let ifhd = IFhdChunk::from_bytes(&ifhd_chunk.data)?;

    let current_release = vm.memory.load_word(0x02)?;
    if ifhd.release != current_release {
        return Err(GameError::MalformedImage(format!(
            "save is for release {}, loaded story is release {current_release}",
            ifhd.release
        )));
    }
    let current_serial = vm.memory.slice(0x12, 6)?;
    if ifhd.serial.as_slice() != current_serial {
        warn!("save file serial number does not match the loaded story file");
    }

    let dynamic_size = vm.memory.static_mem_base();
    if let Some(cmem) = iff.find_chunk(b"CMem") {
        debug!("restoring dynamic memory from CMem chunk");
        let original = &vm.memory.original_bytes()[..dynamic_size];
        let restored = decompress_memory(&cmem.data, original)?;
        for (i, byte) in restored.into_iter().enumerate() {
            vm.memory.set_byte_mut(i as u32, byte)?;
        }
    } else if let Some(umem) = iff.find_chunk(b"UMem") {
        debug!("restoring dynamic memory from UMem chunk");
        if umem.data.len() != dynamic_size {
            return Err(GameError::MalformedImage(format!(
                "UMem chunk is {} bytes, dynamic memory is {dynamic_size}",
                umem.data.len()
            )));
        }
        for (i, &byte) in umem.data.iter().enumerate() {
            vm.memory.set_byte_mut(i as u32, byte)?;
        }
    } else {
        return Err(GameError::MalformedImage(
            "save buffer has neither a CMem nor a UMem chunk".into(),
        ));
    }

    let stks_chunk = iff
        .find_chunk(b"Stks")
        .ok_or_else(|| GameError::MalformedImage("save buffer missing Stks chunk".into()))?;
    let stks = StksChunk {
        data: stks_chunk.data.clone(),
    };
    stks.restore_to_vm(vm)?;

    info!(
        "restored save (release {}, {} call frames)",
        ifhd.release,
        vm.call_stack.depth()
    );
    Ok(RestorePoint {
        resume_pc: ifhd.resume_pc,
        resume_store: ifhd.resume_store,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Memory;
    use crate::quetzal::save::create_save_bytes;
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
    fn save_then_restore_preserves_globals_and_stack() {
        let mut vm = vm_fixture();
        vm.memory.set_global(0x10, 0xBEEF).unwrap();
        vm.eval_stack.push_word(123).unwrap();

        let saved = create_save_bytes(&vm, 0x0300, Some(0x10)).unwrap();

        let mut fresh = vm_fixture();
        let point = restore_from_bytes(&mut fresh, &saved).unwrap();
        assert_eq!(fresh.memory.global(0x10).unwrap(), 0xBEEF);
        assert_eq!(fresh.eval_stack.pop_word().unwrap(), 123);
        assert_eq!(point.resume_pc, 0x0300);
        assert_eq!(point.resume_store, Some(0x10));
    }

    #[test]
    fn rejects_buffer_from_a_different_release() {
        let vm = vm_fixture();
        let saved = create_save_bytes(&vm, 0x0300, Some(0x10)).unwrap();

        let mut other = vm_fixture();
        other.memory.set_byte_mut(0x02, 0x01).unwrap();
        other.memory.set_byte_mut(0x03, 0x02).unwrap();
        assert!(restore_from_bytes(&mut other, &saved).is_err());
    }
}
