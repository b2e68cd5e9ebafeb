//! Named offsets into the 64-byte story-file header, and the parsed `Header` struct.
//!
//! Grounded on the source lineage's `header.rs`, extended with the flag-bit constants and the
//! v5+ alphabet-table/routines/strings fields the distilled version omitted.

use std::fmt;

pub mod offset {
    pub const VERSION: usize = 0x00;
    pub const FLAGS1: usize = 0x01;
    pub const HIGH_MEM_BASE: usize = 0x04;
    pub const INITIAL_PC: usize = 0x06;
    pub const DICTIONARY: usize = 0x08;
    pub const OBJECT_TABLE: usize = 0x0A;
    pub const GLOBAL_VARIABLES: usize = 0x0C;
    pub const STATIC_MEM_BASE: usize = 0x0E;
    pub const FLAGS2: usize = 0x10;
    pub const SERIAL: usize = 0x12; // 6 bytes
    pub const ABBREVIATIONS: usize = 0x18;
    pub const FILE_LENGTH: usize = 0x1A;
    pub const CHECKSUM: usize = 0x1C;
    pub const INTERPRETER_NUMBER: usize = 0x1E;
    pub const INTERPRETER_VERSION: usize = 0x1F;
    pub const SCREEN_HEIGHT_LINES: usize = 0x20;
    pub const SCREEN_WIDTH_CHARS: usize = 0x21;
    pub const SCREEN_WIDTH_UNITS: usize = 0x22;
    pub const SCREEN_HEIGHT_UNITS: usize = 0x24;
    pub const ROUTINES_OFFSET: usize = 0x28;
    pub const STRINGS_OFFSET: usize = 0x2A;
    pub const STANDARD_REVISION: usize = 0x32;
    pub const ALPHABET_TABLE: usize = 0x34;
}

/// Flags 1 bits that are shared across all versions (bit numbering is LSB-first here, matching
/// how the standard documents Flags 1: bit 0 is the low bit of the byte).
pub mod flags1 {
    pub const STATUS_LINE_TYPE: u8 = 1 << 1; // v3 only: 0=score/turns, 1=hours:mins
    pub const STORY_SPLIT_FILE: u8 = 1 << 2; // v3 only
    pub const STATUS_LINE_UNAVAILABLE: u8 = 1 << 4; // v3 only, interpreter sets
    pub const SCREEN_SPLIT_AVAILABLE: u8 = 1 << 5; // v3 only, interpreter sets
    pub const VARIABLE_PITCH_DEFAULT: u8 = 1 << 6; // v3 only, interpreter sets

    pub const COLORS_AVAILABLE: u8 = 1 << 0; // v5+
    pub const PICTURES_AVAILABLE: u8 = 1 << 1; // v5+
    pub const BOLD_AVAILABLE: u8 = 1 << 2; // v5+, interpreter sets
    pub const ITALIC_AVAILABLE: u8 = 1 << 3; // v5+, interpreter sets
    pub const FIXED_SPACE_AVAILABLE: u8 = 1 << 4; // v5+, interpreter sets
    pub const SOUND_AVAILABLE: u8 = 1 << 5; // v5+
    pub const TIMED_INPUT_AVAILABLE: u8 = 1 << 7; // v5+, interpreter sets
}

pub mod flags2 {
    pub const TRANSCRIPTING: u16 = 1 << 0;
    pub const FORCE_FIXED_PITCH: u16 = 1 << 1;
    pub const REQUEST_REDRAW: u16 = 1 << 2;
    pub const USE_PICTURES: u16 = 1 << 3;
    pub const USE_UNDO: u16 = 1 << 4;
    pub const USE_MOUSE: u16 = 1 << 5;
    pub const USE_COLOUR: u16 = 1 << 6;
    pub const USE_SOUND: u16 = 1 << 7;
    pub const USE_MENUS: u16 = 1 << 8;
}

/// The parsed story-file header. Only the fields the core consumes are materialized here; the
/// remaining header bytes stay live in `Memory` and are read/written directly by opcodes that
/// need them (e.g. the screen-dimension fields the interpreter writes back at load time).
#[derive(Debug, Clone)]
pub struct Header {
    pub version: u8,
    pub high_mem_base: u16,
    pub initial_pc: u16,
    pub dictionary_addr: u16,
    pub object_table_addr: u16,
    pub global_variables_addr: u16,
    pub static_mem_base: u16,
    pub abbreviations_addr: u16,
    pub file_length_words: u16,
    pub checksum: u16,
    pub serial: String,
    pub routines_offset: u16,
    pub strings_offset: u16,
    pub alphabet_table_addr: u16,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Header, crate::error::GameError> {
        if bytes.len() < 64 {
            return Err(crate::error::GameError::ImageTruncated {
                expected: 64,
                actual: bytes.len(),
            });
        }
        let word = |off: usize| -> u16 { ((bytes[off] as u16) << 8) | bytes[off + 1] as u16 };
        let version = bytes[offset::VERSION];
        let serial: String = bytes[offset::SERIAL..offset::SERIAL + 6]
            .iter()
            .map(|&b| b as char)
            .collect();
        Ok(Header {
            version,
            high_mem_base: word(offset::HIGH_MEM_BASE),
            initial_pc: word(offset::INITIAL_PC),
            dictionary_addr: word(offset::DICTIONARY),
            object_table_addr: word(offset::OBJECT_TABLE),
            global_variables_addr: word(offset::GLOBAL_VARIABLES),
            static_mem_base: word(offset::STATIC_MEM_BASE),
            abbreviations_addr: word(offset::ABBREVIATIONS),
            file_length_words: word(offset::FILE_LENGTH),
            checksum: word(offset::CHECKSUM),
            serial,
            routines_offset: word(offset::ROUTINES_OFFSET),
            strings_offset: word(offset::STRINGS_OFFSET),
            alphabet_table_addr: if version >= 5 {
                word(offset::ALPHABET_TABLE)
            } else {
                0
            },
        })
    }

    /// The multiplier that turns the header's file-length word into a byte count.
    pub fn file_length_multiplier(version: u8) -> usize {
        match version {
            1..=3 => 2,
            4 | 5 => 4,
            6 | 7 | 8 => 8,
            _ => 1,
        }
    }

    pub fn file_length_bytes(&self) -> usize {
        self.file_length_words as usize * Self::file_length_multiplier(self.version)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Z-code version:      {}\nSerial:              {}\nStart PC:            {:#06x}\nDictionary:          {:#06x}\nObject table:        {:#06x}\nGlobal variables:    {:#06x}\nStatic memory base:  {:#06x}\nAbbreviations:       {:#06x}\nChecksum:            {:#06x}",
            self.version,
            self.serial,
            self.initial_pc,
            self.dictionary_addr,
            self.object_table_addr,
            self.global_variables_addr,
            self.static_mem_base,
            self.abbreviations_addr,
            self.checksum,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_header(version: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[offset::VERSION] = version;
        bytes[offset::INITIAL_PC] = 0x01;
        bytes[offset::INITIAL_PC + 1] = 0x00;
        bytes
    }

    #[test]
    fn parses_version_and_pc() {
        let bytes = minimal_header(3);
        let h = Header::parse(&bytes).unwrap();
        assert_eq!(h.version, 3);
        assert_eq!(h.initial_pc, 0x0100);
    }

    #[test]
    fn truncated_image_is_rejected() {
        let bytes = vec![0u8; 10];
        assert!(Header::parse(&bytes).is_err());
    }

    #[test]
    fn file_length_multiplier_matches_version() {
        assert_eq!(Header::file_length_multiplier(3), 2);
        assert_eq!(Header::file_length_multiplier(5), 4);
        assert_eq!(Header::file_length_multiplier(8), 8);
    }
}
