//! Static classification tables the decoder consults: opcode names, which opcodes store a
//! result, which branch, which carry inline text, and how many operands a VAR-form opcode
//! actually expects.
//!
//! Grounded directly on the source lineage's `opcode_tables.rs`; trimmed of V6-only entries
//! (`draw_picture`, `move_window`, menu/mouse opcodes) since V6 is out of scope here, and of the
//! per-address debug tracing the original interleaved into the lookup functions.

use crate::instruction::{InstructionForm, OperandCount};

pub fn get_instruction_name(
    opcode: u8,
    ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    _version: u8,
) -> &'static str {
    match form {
        InstructionForm::Extended => get_extended_opcode_name(ext_opcode.unwrap_or(0)),
        InstructionForm::Variable => get_variable_opcode_name(opcode, operand_count),
        InstructionForm::Short => match operand_count {
            OperandCount::OP0 => get_0op_opcode_name(opcode),
            OperandCount::OP1 => get_1op_opcode_name(opcode),
            _ => "unknown",
        },
        InstructionForm::Long => get_2op_opcode_name(opcode),
    }
}

fn get_2op_opcode_name(opcode: u8) -> &'static str {
    match opcode {
        0x01 => "je",
        0x02 => "jl",
        0x03 => "jg",
        0x04 => "dec_chk",
        0x05 => "inc_chk",
        0x06 => "jin",
        0x07 => "test",
        0x08 => "or",
        0x09 => "and",
        0x0A => "test_attr",
        0x0B => "set_attr",
        0x0C => "clear_attr",
        0x0D => "store",
        0x0E => "insert_obj",
        0x0F => "loadw",
        0x10 => "loadb",
        0x11 => "get_prop",
        0x12 => "get_prop_addr",
        0x13 => "get_next_prop",
        0x14 => "add",
        0x15 => "sub",
        0x16 => "mul",
        0x17 => "div",
        0x18 => "mod",
        0x19 => "call_2s",
        0x1A => "call_2n",
        0x1B => "set_colour",
        0x1C => "throw",
        _ => "unknown_2op",
    }
}

fn get_1op_opcode_name(opcode: u8) -> &'static str {
    match opcode {
        0x00 => "jz",
        0x01 => "get_sibling",
        0x02 => "get_child",
        0x03 => "get_parent",
        0x04 => "get_prop_len",
        0x05 => "inc",
        0x06 => "dec",
        0x07 => "print_addr",
        0x08 => "call_1s",
        0x09 => "remove_obj",
        0x0A => "print_obj",
        0x0B => "ret",
        0x0C => "jump",
        0x0D => "print_paddr",
        0x0E => "load",
        0x0F => "not", // V1-4, call_1n in V5+
        _ => "unknown_1op",
    }
}

fn get_0op_opcode_name(opcode: u8) -> &'static str {
    match opcode {
        0x00 => "rtrue",
        0x01 => "rfalse",
        0x02 => "print",
        0x03 => "print_ret",
        0x04 => "nop",
        0x05 => "save",
        0x06 => "restore",
        0x07 => "restart",
        0x08 => "ret_popped",
        0x09 => "pop", // V1-4, catch in V5+
        0x0A => "quit",
        0x0B => "new_line",
        0x0C => "show_status", // V3 only
        0x0D => "verify",
        0x0E => "extended", // V5+
        0x0F => "piracy",
        _ => "unknown_0op",
    }
}

fn get_variable_opcode_name(opcode: u8, operand_count: OperandCount) -> &'static str {
    if opcode >= 0x20 {
        return get_2op_opcode_name(opcode - 0x20);
    }
    if operand_count == OperandCount::OP2 {
        return get_2op_opcode_name(opcode);
    }
    match opcode {
        0x00 => "call", // call_vs in V4+
        0x01 => "storew",
        0x02 => "storeb",
        0x03 => "put_prop",
        0x04 => "sread", // V1-4, aread in V5+
        0x05 => "print_char",
        0x06 => "print_num",
        0x07 => "random",
        0x08 => "push",
        0x09 => "pull",
        0x0A => "split_window",    // V3+
        0x0B => "set_window",      // V3+
        0x0C => "call_vs2",        // V4+
        0x0D => "erase_window",    // V4+
        0x0E => "erase_line",      // V4+
        0x0F => "set_cursor",      // V4+
        0x10 => "get_cursor",      // V4+
        0x11 => "set_text_style",  // V4+
        0x12 => "buffer_mode",     // V4+
        0x13 => "output_stream",   // V3+
        0x14 => "input_stream",    // V3+
        0x15 => "sound_effect",    // V3+
        0x16 => "read_char",       // V4+
        0x17 => "scan_table",      // V4+
        0x18 => "not",             // V5+
        0x19 => "call_vn",         // V5+
        0x1A => "call_vn2",        // V5+
        0x1B => "tokenise",        // V5+
        0x1C => "encode_text",     // V5+
        0x1D => "copy_table",      // V5+
        0x1E => "print_table",     // V5+
        0x1F => "check_arg_count", // V5+
        _ => "unknown_var",
    }
}

fn get_extended_opcode_name(ext_opcode: u8) -> &'static str {
    match ext_opcode {
        0x00 => "save",
        0x01 => "restore",
        0x02 => "log_shift",
        0x03 => "art_shift",
        0x04 => "set_font",
        0x09 => "save_undo",
        0x0A => "restore_undo",
        0x0B => "print_unicode",
        0x0C => "check_unicode",
        _ => "unknown_ext",
    }
}

pub fn stores_result(
    opcode: u8,
    ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    version: u8,
) -> bool {
    match form {
        InstructionForm::Extended => matches!(ext_opcode, Some(0x00..=0x04) | Some(0x09..=0x0C)),
        InstructionForm::Variable => {
            if opcode >= 0x20 {
                stores_result_2op(opcode - 0x20)
            } else if operand_count == OperandCount::OP2 {
                stores_result_2op(opcode)
            } else {
                matches!(opcode, 0x00 | 0x07 | 0x08 | 0x16 | 0x17)
            }
        }
        InstructionForm::Short => match operand_count {
            // `save`/`restore` branch in V1-3 but store a result in V4 (V5+ uses the extended
            // form instead); `0x09` is `pop` (no result) through V4 and only becomes `catch`
            // (stores a result) in V5+.
            OperandCount::OP0 => {
                (opcode == 0x09 && version >= 5) || (version == 4 && matches!(opcode, 0x05 | 0x06))
            }
            OperandCount::OP1 => matches!(opcode, 0x01..=0x04 | 0x08 | 0x0E | 0x0F),
            _ => false,
        },
        InstructionForm::Long => stores_result_2op(opcode),
    }
}

fn stores_result_2op(opcode: u8) -> bool {
    matches!(opcode, 0x08..=0x09 | 0x0F..=0x19)
}

pub fn has_branch(
    opcode: u8,
    _ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    version: u8,
) -> bool {
    match form {
        InstructionForm::Extended => false,
        InstructionForm::Variable => {
            if opcode >= 0x20 {
                has_branch_2op(opcode - 0x20)
            } else if operand_count == OperandCount::OP2 {
                has_branch_2op(opcode)
            } else {
                false
            }
        }
        InstructionForm::Short => match operand_count {
            OperandCount::OP0 => match opcode {
                0x05 | 0x06 => version <= 3, // save/restore: store-form from V4 on
                0x0D | 0x0F => true,
                _ => false,
            },
            OperandCount::OP1 => matches!(opcode, 0x00..=0x02),
            _ => false,
        },
        InstructionForm::Long => has_branch_2op(opcode),
    }
}

fn has_branch_2op(opcode: u8) -> bool {
    matches!(opcode, 0x01..=0x07 | 0x0A)
}

pub fn has_text(
    opcode: u8,
    _ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    _version: u8,
) -> bool {
    matches!(form, InstructionForm::Short)
        && operand_count == OperandCount::OP0
        && matches!(opcode, 0x02 | 0x03)
}

/// For VAR-form opcodes whose effective operand count is fixed regardless of how many operand
/// type slots precede the `0b11` terminator. Returns `None` when the instruction legitimately
/// takes however many operands its type byte(s) specify (`call`, `sread`/`aread`).
pub fn get_expected_operand_count(
    opcode: u8,
    _ext_opcode: Option<u8>,
    form: InstructionForm,
    operand_count: OperandCount,
    version: u8,
) -> Option<usize> {
    if form != InstructionForm::Variable {
        return None;
    }
    if opcode >= 0x20 {
        return Some(2);
    }
    if operand_count == OperandCount::OP2 {
        return Some(2);
    }
    match opcode {
        0x00 => None,    // call(_vs)
        0x01 => Some(3), // storew
        0x02 => Some(3), // storeb
        0x03 => Some(3), // put_prop
        0x04 => None,    // sread/aread
        0x05 => Some(1), // print_char
        0x06 => Some(1), // print_num
        0x07 => Some(1), // random
        0x08 => Some(1), // push
        0x09 => {
            if version <= 5 {
                Some(1) // pull
            } else {
                None
            }
        }
        0x0A => Some(1), // split_window
        0x0B => Some(1), // set_window
        _ => None,
    }
}
