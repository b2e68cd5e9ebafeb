//! ZSCII text codec: packed Z-string decoding, abbreviation expansion, the 10-bit ZSCII escape,
//! the Unicode translation table, and the reverse encoder used by `tokenise`/the dictionary.
//!
//! Grounded on the source lineage's `text.rs` and `util.rs` (the latter's `read_zchars_from_word`
//! uses the `bitreader` crate to peel the three 5-bit Z-characters plus terminator bit out of a
//! packed word; that usage is preserved here).

use crate::error::{GameError, Result};
use bitreader::BitReader;
use log::trace;

const MAX_ABBREV_DEPTH: u8 = 1;
const MAX_STRING_ZCHARS: usize = 4096;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Alphabet {
    A0,
    A1,
    A2,
}

impl Alphabet {
    fn next(self) -> Alphabet {
        match self {
            Alphabet::A0 => Alphabet::A1,
            Alphabet::A1 => Alphabet::A2,
            Alphabet::A2 => Alphabet::A0,
        }
    }
    fn prev(self) -> Alphabet {
        match self {
            Alphabet::A0 => Alphabet::A2,
            Alphabet::A1 => Alphabet::A0,
            Alphabet::A2 => Alphabet::A1,
        }
    }
    fn table(self, version: u8) -> &'static [u8; 26] {
        match self {
            Alphabet::A0 => b"abcdefghijklmnopqrstuvwxyz",
            Alphabet::A1 => b"ABCDEFGHIJKLMNOPQRSTUVWXYZ",
            Alphabet::A2 if version == 1 => b"  0123456789.,!?_#'\"/<-:()",
            Alphabet::A2 => b" \n0123456789.,!?_#'\"/\\-:()",
        }
    }
}

/// The 69-entry default Unicode translation table for ZSCII codes 155..223.
pub const UNICODE_TRANSLATION_TABLE: [char; 69] = [
    'ä', 'ö', 'ü', 'Ä', 'Ö', 'Ü', 'ß', '»', '«', 'ë', 'ï', 'ÿ', 'Ë', 'Ï', 'á', 'é', 'í', 'ó', 'ú',
    'ý', 'Á', 'É', 'Í', 'Ó', 'Ú', 'Ý', 'à', 'è', 'ì', 'ò', 'ù', 'À', 'È', 'Ì', 'Ò', 'Ù', 'â', 'ê',
    'î', 'ô', 'û', 'Â', 'Ê', 'Î', 'Ô', 'Û', 'å', 'Å', 'ø', 'Ø', 'ã', 'ñ', 'õ', 'Ã', 'Ñ', 'Õ', 'æ',
    'Æ', 'ç', 'Ç', 'þ', 'ð', 'Þ', 'Ð', '£', 'œ', 'Œ', '¡', '¿',
];

/// Map one ZSCII output code to a displayable `char`, per §4.3: 9, 11, 13, 32..126 map
/// directly; 155..223 go through the Unicode table; anything else is dropped.
pub fn zscii_to_char(code: u16) -> Option<char> {
    match code {
        9 | 11 => Some(' '),
        13 => Some('\n'),
        32..=126 => Some(code as u8 as char),
        155..=223 => Some(UNICODE_TRANSLATION_TABLE[(code - 155) as usize]),
        _ => None,
    }
}

/// Reverse of [`zscii_to_char`], used by the encoder.
fn char_to_zscii(c: char) -> Option<u16> {
    if c == '\n' {
        return Some(13);
    }
    if (' '..='~').contains(&c) {
        return Some(c as u16);
    }
    UNICODE_TRANSLATION_TABLE
        .iter()
        .position(|&u| u == c)
        .map(|i| i as u16 + 155)
}

/// Unpack one word into its three 5-bit Z-characters plus the "last word" terminator bit.
fn read_zchars_from_word(word: u16) -> ([u8; 3], bool) {
    let bytes = word.to_be_bytes();
    let mut br = BitReader::new(&bytes);
    let last = br.read_u8(1).unwrap() == 1;
    let chars = [
        br.read_u8(5).unwrap(),
        br.read_u8(5).unwrap(),
        br.read_u8(5).unwrap(),
    ];
    (chars, last)
}

/// Decode a Z-string starting at byte address `addr`. Returns the decoded text and the number
/// of bytes consumed (always a multiple of 2, covering every word up to and including the
/// terminator word). Never recurses past one level of abbreviation expansion.
pub fn decode_string(
    memory: &[u8],
    addr: usize,
    version: u8,
    abbrev_table_addr: usize,
) -> Result<(String, usize)> {
    decode_string_inner(memory, addr, version, abbrev_table_addr, 0)
}

fn decode_string_inner(
    memory: &[u8],
    addr: usize,
    version: u8,
    abbrev_table_addr: usize,
    depth: u8,
) -> Result<(String, usize)> {
    let mut zchars = Vec::new();
    let mut offset = addr;
    loop {
        if offset + 1 >= memory.len() {
            return Err(GameError::MalformedImage(format!(
                "Z-string at {addr:#06x} runs past end of memory without a terminator word"
            )));
        }
        let word = ((memory[offset] as u16) << 8) | memory[offset + 1] as u16;
        offset += 2;
        let (chars, last) = read_zchars_from_word(word);
        zchars.extend_from_slice(&chars);
        if last || zchars.len() >= MAX_STRING_ZCHARS {
            break;
        }
    }
    let bytes_consumed = offset - addr;
    let text = decode_zchars(&zchars, memory, version, abbrev_table_addr, depth)?;
    Ok((text, bytes_consumed))
}

fn decode_zchars(
    zchars: &[u8],
    memory: &[u8],
    version: u8,
    abbrev_table_addr: usize,
    depth: u8,
) -> Result<String> {
    let mut out = String::new();
    let mut locked = Alphabet::A0;
    let mut current: Option<Alphabet> = None; // Some = one-shot override for the next char only
    let mut pending_abbrev: Option<u8> = None;
    // 10-bit ZSCII escape: None = inactive, Some(None) = awaiting the high 5 bits,
    // Some(Some(high)) = awaiting the low 5 bits.
    let mut pending_escape: Option<Option<u8>> = None;

    let mut i = 0;
    while i < zchars.len() {
        let zc = zchars[i];
        i += 1;

        if let Some(stage) = pending_escape.take() {
            match stage {
                None => {
                    pending_escape = Some(Some(zc));
                }
                Some(high) => {
                    let code = ((high as u16) << 5) | zc as u16;
                    if let Some(c) = zscii_to_char(code) {
                        out.push(c);
                    }
                }
            }
            continue;
        }
        if let Some(table_idx) = pending_abbrev.take() {
            if depth >= MAX_ABBREV_DEPTH {
                return Err(GameError::MalformedImage(
                    "abbreviation expansion recursed".into(),
                ));
            }
            let abbrev_num = 32u16 * table_idx as u16 + zc as u16;
            let entry_addr = abbrev_table_addr + 2 * abbrev_num as usize;
            if entry_addr + 1 >= memory.len() {
                trace!("abbreviation {abbrev_num} out of range, skipping");
                continue;
            }
            let word_addr =
                ((memory[entry_addr] as u16) << 8) | memory[entry_addr + 1] as u16;
            let byte_addr = word_addr as usize * 2;
            let (expansion, _) =
                decode_string_inner(memory, byte_addr, version, abbrev_table_addr, depth + 1)?;
            out.push_str(&expansion);
            current = None;
            continue;
        }

        let active = current.take().unwrap_or(locked);

        match zc {
            0 => out.push(' '),
            1 if version == 1 => out.push('\n'),
            1 if version == 2 => pending_abbrev = Some(0),
            1..=3 if version >= 3 => pending_abbrev = Some(zc - 1),
            2 if version <= 2 => {
                current = Some(locked.next());
                continue;
            }
            3 if version <= 2 => {
                current = Some(locked.prev());
                continue;
            }
            4 if version <= 2 => {
                locked = locked.next();
                continue;
            }
            5 if version <= 2 => {
                locked = locked.prev();
                continue;
            }
            4 if version >= 3 => {
                current = Some(Alphabet::A1);
                continue;
            }
            5 if version >= 3 => {
                current = Some(Alphabet::A2);
                continue;
            }
            6..=31 => {
                if version >= 3 && active == Alphabet::A2 && zc == 6 {
                    pending_escape = Some(None);
                    continue;
                }
                let ch = active.table(version)[(zc - 6) as usize];
                out.push(ch as char);
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Truncate/pad `word`'s characters to `limit` Z-characters for encoding, using the rules
/// `tokenise` and the dictionary encoder share: reverse-alphabet lookup, one-shot shifts for
/// alphabets A1/A2, padded with Z-character 5.
pub fn encode_zchars(word: &str, limit: usize) -> Vec<u8> {
    let mut zchars = Vec::with_capacity(limit);
    for c in word.chars() {
        if zchars.len() >= limit {
            break;
        }
        push_encoded_char(&mut zchars, c, limit);
    }
    zchars.truncate(limit);
    while zchars.len() < limit {
        zchars.push(5);
    }
    zchars
}

fn push_encoded_char(zchars: &mut Vec<u8>, c: char, limit: usize) {
    if c == ' ' {
        zchars.push(0);
        return;
    }
    if c.is_ascii_uppercase() {
        if let Some(pos) = Alphabet::A1.table(3).iter().position(|&a| a as char == c) {
            if zchars.len() + 1 < limit {
                zchars.push(4);
                zchars.push(pos as u8 + 6);
            }
            return;
        }
    }
    let lower = c.to_ascii_lowercase();
    if let Some(pos) = Alphabet::A0.table(3).iter().position(|&a| a as char == lower) {
        zchars.push(pos as u8 + 6);
        return;
    }
    if let Some(pos) = Alphabet::A2.table(3).iter().position(|&a| a as char == c) {
        if zchars.len() + 1 < limit {
            zchars.push(5);
            zchars.push(pos as u8 + 6);
        }
        return;
    }
    // Characters outside the three alphabets fall back to the 10-bit ZSCII escape (A2, zchar 6).
    if let Some(code) = char_to_zscii(c) {
        if zchars.len() + 2 < limit {
            zchars.push(5);
            zchars.push(6);
            zchars.push((code >> 5) as u8 & 0x1F);
            zchars.push(code as u8 & 0x1F);
        }
    }
}

/// Pack an encoded Z-character list into big-endian words, setting the terminator bit on the
/// final word.
pub fn pack_zchars(zchars: &[u8]) -> Vec<u16> {
    let mut words = Vec::new();
    for chunk in zchars.chunks(3) {
        let a = chunk[0] as u16;
        let b = *chunk.get(1).unwrap_or(&5) as u16;
        let c = *chunk.get(2).unwrap_or(&5) as u16;
        words.push((a << 10) | (b << 5) | c);
    }
    if let Some(last) = words.last_mut() {
        *last |= 0x8000;
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_string(memory: &mut Vec<u8>, addr: usize, zchars: &[u8]) {
        let words = pack_zchars(zchars);
        for (i, w) in words.iter().enumerate() {
            let a = addr + i * 2;
            if memory.len() < a + 2 {
                memory.resize(a + 2, 0);
            }
            memory[a] = (w >> 8) as u8;
            memory[a + 1] = (w & 0xFF) as u8;
        }
    }

    #[test]
    fn decode_simple_lowercase_word() {
        let mut memory = vec![0u8; 64];
        let zchars = encode_zchars("hello", 6);
        write_string(&mut memory, 0x20, &zchars);
        let (text, consumed) = decode_string(&memory, 0x20, 3, 0x18).unwrap();
        assert_eq!(text.trim_end(), "hello");
        assert_eq!(consumed, 4); // two words = 4 bytes for 6 zchars
    }

    #[test]
    fn encode_then_decode_round_trip_pads_with_zchar_5() {
        let encoded = encode_zchars("cat", 6);
        assert_eq!(encoded, vec![6 + 2, 6 + 0, 6 + 19, 5, 5, 5]);
    }

    #[test]
    fn abbreviation_expansion() {
        // Build an image where abbreviation table entry 5 (table 0) points at the word "hi".
        let mut memory = vec![0u8; 128];
        let abbrev_table = 0x10;
        let target_word_addr = 0x40usize;
        let target_word = (target_word_addr / 2) as u16;
        memory[abbrev_table + 2 * 5] = (target_word >> 8) as u8;
        memory[abbrev_table + 2 * 5 + 1] = (target_word & 0xFF) as u8;
        let hi_chars = encode_zchars("hi", 6);
        write_string(&mut memory, target_word_addr, &hi_chars);

        // Z-chars [1, 5] at the string site: abbreviation escape for table 0, entry 5.
        write_string(&mut memory, 0x60, &[1, 5, 5]);
        let (text, _) = decode_string(&memory, 0x60, 3, abbrev_table).unwrap();
        assert_eq!(text.trim_end(), "hi");
    }

    #[test]
    fn zscii_unicode_table_round_trips_known_codes() {
        assert_eq!(zscii_to_char(155), Some('ä'));
        assert_eq!(char_to_zscii('ä'), Some(155));
        assert_eq!(zscii_to_char(223), Some('¿'));
    }

    #[test]
    fn v1_and_v2plus_a2_tables_differ_in_exactly_two_cells() {
        let v1 = Alphabet::A2.table(1);
        let v3 = Alphabet::A2.table(3);
        let diff = v1.iter().zip(v3.iter()).filter(|(a, b)| a != b).count();
        assert_eq!(diff, 2);
    }
}
