//! Instruction decoding: turning a byte at some PC into a fully classified [`Instruction`].
//!
//! Grounded on the source lineage's `instruction.rs`, stripped of its per-address debug tracing
//! (the `addr == 0x06f91` style instrumentation left over from a specific disassembly bug hunt)
//! in favour of plain `trace!`/`debug!` calls gated by log level.

use crate::error::{GameError, Result};
use crate::opcode_tables;
use crate::text;
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    LargeConstant,
    SmallConstant,
    Variable,
    Omitted,
}

impl OperandType {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0b00 => OperandType::LargeConstant,
            0b01 => OperandType::SmallConstant,
            0b10 => OperandType::Variable,
            _ => OperandType::Omitted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionForm {
    Long,
    Short,
    Extended,
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandCount {
    OP0,
    OP1,
    OP2,
    VAR,
}

/// A decoded branch descriptor (standard §4.7). `offset` 0 and 1 are the special "return false"
/// / "return true" forms; anything else is added to `pc_after_branch_bytes - 2` to get the jump
/// target.
#[derive(Debug, Clone, Copy)]
pub struct BranchInfo {
    pub on_true: bool,
    pub offset: i16,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub addr: u32,
    pub opcode: u8,
    pub ext_opcode: Option<u8>,
    pub form: InstructionForm,
    pub operand_count: OperandCount,
    pub operand_types: Vec<OperandType>,
    pub operands: Vec<u16>,
    pub store_var: Option<u8>,
    pub branch: Option<BranchInfo>,
    pub text: Option<String>,
    pub size: usize,
}

impl Instruction {
    pub fn decode(memory: &[u8], addr: usize, version: u8) -> Result<Instruction> {
        if addr >= memory.len() {
            return Err(GameError::OutOfBounds {
                addr: addr as u32,
                size: memory.len(),
            });
        }

        let mut offset = addr;
        let opcode_byte = memory[offset];
        offset += 1;

        let form = if opcode_byte == 0xBE && version >= 5 {
            InstructionForm::Extended
        } else {
            match opcode_byte >> 6 {
                0b11 => InstructionForm::Variable,
                0b10 => InstructionForm::Short,
                _ => InstructionForm::Long,
            }
        };

        let (opcode, ext_opcode, operand_count) = match form {
            InstructionForm::Long => {
                let opcode = opcode_byte & 0x1F;
                if opcode == 0x00 {
                    return Err(GameError::UnknownOpcode {
                        opcode: opcode_byte,
                        pc: addr as u32,
                    });
                }
                (opcode, None, OperandCount::OP2)
            }
            InstructionForm::Short => {
                let op_count = if (opcode_byte >> 4) & 0x03 == 0x03 {
                    OperandCount::OP0
                } else {
                    OperandCount::OP1
                };
                (opcode_byte & 0x0F, None, op_count)
            }
            InstructionForm::Variable => {
                let op_count = if opcode_byte & 0x20 == 0 {
                    OperandCount::OP2
                } else {
                    OperandCount::VAR
                };
                (opcode_byte & 0x1F, None, op_count)
            }
            InstructionForm::Extended => {
                if offset >= memory.len() {
                    return Err(GameError::OutOfBounds {
                        addr: offset as u32,
                        size: memory.len(),
                    });
                }
                let ext_op = memory[offset];
                offset += 1;
                (opcode_byte, Some(ext_op), OperandCount::VAR)
            }
        };

        let mut operand_types = Vec::new();
        match form {
            InstructionForm::Long => {
                let type1 = if opcode_byte & 0x40 != 0 {
                    OperandType::Variable
                } else {
                    OperandType::SmallConstant
                };
                let type2 = if opcode_byte & 0x20 != 0 {
                    OperandType::Variable
                } else {
                    OperandType::SmallConstant
                };
                operand_types.push(type1);
                operand_types.push(type2);
            }
            InstructionForm::Short => {
                if operand_count != OperandCount::OP0 {
                    let op_type = OperandType::from_bits((opcode_byte >> 4) & 0x03);
                    if op_type != OperandType::Omitted {
                        operand_types.push(op_type);
                    }
                }
            }
            InstructionForm::Variable | InstructionForm::Extended => {
                if offset >= memory.len() {
                    return Err(GameError::OutOfBounds {
                        addr: offset as u32,
                        size: memory.len(),
                    });
                }
                let mut type_bytes = vec![memory[offset]];
                offset += 1;
                if operand_count == OperandCount::VAR && matches!(opcode, 0x0C | 0x1A) {
                    // call_vs2 / call_vn2 (VAR:12/26) take a second type byte for args 5-8.
                    if offset >= memory.len() {
                        return Err(GameError::OutOfBounds {
                            addr: offset as u32,
                            size: memory.len(),
                        });
                    }
                    type_bytes.push(memory[offset]);
                    offset += 1;
                }
                for type_byte in type_bytes {
                    for i in 0..4 {
                        let op_type = OperandType::from_bits(type_byte >> (6 - i * 2));
                        if op_type == OperandType::Omitted {
                            break;
                        }
                        operand_types.push(op_type);
                    }
                }
            }
        }

        let expected_count = opcode_tables::get_expected_operand_count(
            opcode,
            ext_opcode,
            form,
            operand_count,
            version,
        );
        let operand_limit = expected_count
            .map(|c| operand_types.len().min(c))
            .unwrap_or(operand_types.len());

        let mut operands = Vec::new();
        for (i, op_type) in operand_types.iter().enumerate() {
            if i >= operand_limit {
                break;
            }
            match op_type {
                OperandType::LargeConstant => {
                    if offset + 1 >= memory.len() {
                        return Err(GameError::OutOfBounds {
                            addr: offset as u32,
                            size: memory.len(),
                        });
                    }
                    let value = ((memory[offset] as u16) << 8) | memory[offset + 1] as u16;
                    operands.push(value);
                    offset += 2;
                }
                OperandType::SmallConstant | OperandType::Variable => {
                    if offset >= memory.len() {
                        return Err(GameError::OutOfBounds {
                            addr: offset as u32,
                            size: memory.len(),
                        });
                    }
                    operands.push(memory[offset] as u16);
                    offset += 1;
                }
                OperandType::Omitted => break,
            }
        }

        let store_var = if opcode_tables::stores_result(opcode, ext_opcode, form, operand_count, version)
        {
            if offset >= memory.len() {
                return Err(GameError::OutOfBounds {
                    addr: offset as u32,
                    size: memory.len(),
                });
            }
            let var = memory[offset];
            offset += 1;
            Some(var)
        } else {
            None
        };

        let branch = if opcode_tables::has_branch(opcode, ext_opcode, form, operand_count, version)
        {
            if offset >= memory.len() {
                return Err(GameError::OutOfBounds {
                    addr: offset as u32,
                    size: memory.len(),
                });
            }
            let first_byte = memory[offset];
            offset += 1;
            let on_true = (first_byte & 0x80) != 0;
            let offset_val = if first_byte & 0x40 != 0 {
                (first_byte & 0x3F) as i16
            } else {
                if offset >= memory.len() {
                    return Err(GameError::OutOfBounds {
                        addr: offset as u32,
                        size: memory.len(),
                    });
                }
                let second_byte = memory[offset];
                offset += 1;
                let val = (((first_byte & 0x3F) as i16) << 8) | second_byte as i16;
                if val & 0x2000 != 0 {
                    val | (0xC000u16 as i16)
                } else {
                    val
                }
            };
            Some(BranchInfo {
                on_true,
                offset: offset_val,
            })
        } else {
            None
        };

        let text = if opcode_tables::has_text(opcode, ext_opcode, form, operand_count, version) {
            let abbrev_addr = if memory.len() >= 0x1A {
                ((memory[0x18] as usize) << 8) | memory[0x19] as usize
            } else {
                0
            };
            let (string, len) = text::decode_string(memory, offset, version, abbrev_addr)?;
            offset += len;
            Some(string)
        } else {
            None
        };

        let size = offset - addr;
        let mut actual_operand_types = operand_types;
        actual_operand_types.truncate(operands.len());

        trace!(
            "decoded {} at {addr:#06x}: operands={operands:?} store={store_var:?} branch={:?}",
            opcode_tables::get_instruction_name(opcode, ext_opcode, form, operand_count, version),
            branch.as_ref().map(|b| (b.on_true, b.offset)),
        );

        Ok(Instruction {
            addr: addr as u32,
            opcode,
            ext_opcode,
            form,
            operand_count,
            operand_types: actual_operand_types,
            operands,
            store_var,
            branch,
            text,
            size,
        })
    }

    pub fn name(&self, version: u8) -> &'static str {
        opcode_tables::get_instruction_name(
            self.opcode,
            self.ext_opcode,
            self.form,
            self.operand_count,
            version,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_stub() -> Vec<u8> {
        let mut m = vec![0u8; 0x40];
        m[0] = 3;
        m
    }

    #[test]
    fn decodes_long_form_two_operand_add() {
        let mut memory = header_stub();
        // add (long, opcode 0x14): both operands small constants -> opcode byte 0x54.
        memory.extend_from_slice(&[0x54, 0x05, 0x03, 0x10]); // add 5 3 -> store var 0x10
        let instr = Instruction::decode(&memory, 0x40, 3).unwrap();
        assert_eq!(instr.name(3), "add");
        assert_eq!(instr.operands, vec![5, 3]);
        assert_eq!(instr.store_var, Some(0x10));
        assert_eq!(instr.size, 4);
    }

    #[test]
    fn decodes_short_form_jz_with_branch() {
        let mut memory = header_stub();
        // jz (short, 1OP, opcode 0x00) with a variable operand, then a 1-byte branch "on true".
        memory.extend_from_slice(&[0x90, 0x05, 0xC1]); // 1001 0000 -> variable operand type
        let instr = Instruction::decode(&memory, 0x40, 3).unwrap();
        assert_eq!(instr.name(3), "jz");
        let branch = instr.branch.unwrap();
        assert!(branch.on_true);
        assert_eq!(branch.offset, 0x01);
        assert_eq!(instr.size, 3);
    }

    #[test]
    fn decodes_variable_form_call_with_two_byte_types() {
        let mut memory = header_stub();
        // call (VAR, opcode 0x00) with one large-constant operand (routine address) -> type
        // byte 0b00_11_11_11, large constant operand, then store var.
        memory.extend_from_slice(&[0xE0, 0x3F, 0x12, 0x34, 0x02]);
        let instr = Instruction::decode(&memory, 0x40, 3).unwrap();
        assert_eq!(instr.name(3), "call");
        assert_eq!(instr.operands, vec![0x1234]);
        assert_eq!(instr.store_var, Some(0x02));
    }

    #[test]
    fn long_form_opcode_zero_is_rejected() {
        let mut memory = header_stub();
        memory.push(0x00);
        assert!(Instruction::decode(&memory, 0x40, 3).is_err());
    }

    #[test]
    fn decodes_short_form_pop_without_store_byte_in_v3() {
        let mut memory = header_stub();
        // pop (short 0OP, opcode 0x09) -> 0xB9, immediately followed by quit (0xBA). In V1-4
        // `pop` stores nothing, so decode must not swallow the following opcode byte as a
        // store-variable.
        memory.extend_from_slice(&[0xB9, 0xBA]);
        let instr = Instruction::decode(&memory, 0x40, 3).unwrap();
        assert_eq!(instr.name(3), "pop");
        assert_eq!(instr.store_var, None);
        assert_eq!(instr.size, 1);

        let next = Instruction::decode(&memory, 0x40 + instr.size as usize, 3).unwrap();
        assert_eq!(next.name(3), "quit");
    }

    #[test]
    fn decodes_short_form_catch_with_store_byte_in_v5() {
        let mut memory = vec![0u8; 0x40];
        memory[0] = 5;
        // catch (short 0OP, opcode 0x09) -> 0xB9, V5+ stores its result.
        memory.extend_from_slice(&[0xB9, 0x05]);
        let instr = Instruction::decode(&memory, 0x40, 5).unwrap();
        assert_eq!(instr.store_var, Some(0x05));
        assert_eq!(instr.size, 2);
    }

    #[test]
    fn negative_branch_offset_sign_extends() {
        let mut memory = header_stub();
        // jz with a 2-byte branch, negative offset.
        memory.extend_from_slice(&[0x90, 0x05, 0x3F, 0xFF]); // first_byte bit6=0 -> 14-bit signed
        let instr = Instruction::decode(&memory, 0x40, 3).unwrap();
        let branch = instr.branch.unwrap();
        assert!(branch.offset < 0);
    }
}
