//! Dictionary lookup and input tokenization (version-aware).
//!
//! Grounded on the source lineage's `dictionary.rs`, which hand-rolled a z-character packer
//! duplicating the text codec's encoder; here dictionary words are encoded through
//! [`crate::text::encode_zchars`] / [`crate::text::pack_zchars`] instead; `parse_text`'s
//! whitespace-only split is replaced with the separator-aware tokenizer the standard requires
//! for v3+ punctuation-sensitive parsers.

use crate::error::Result;
use crate::memory::Memory;
use crate::text;
use log::debug;

/// Number of Z-characters encoded per dictionary entry: 6 for v1-3 (2 words), 9 for v4+ (3 words).
fn entry_zchar_count(version: u8) -> usize {
    if version <= 3 {
        6
    } else {
        9
    }
}

struct DictHeader {
    separators: Vec<u8>,
    entry_length: u8,
    entry_count: i16,
    entries_addr: u32,
}

fn read_header(memory: &Memory, version: u8) -> Result<DictHeader> {
    let dict_addr = memory.header.dictionary_addr as u32;
    let sep_count = memory.load_byte(dict_addr)?;
    let mut separators = Vec::with_capacity(sep_count as usize);
    for i in 0..sep_count as u32 {
        separators.push(memory.load_byte(dict_addr + 1 + i)?);
    }
    let entry_start = dict_addr + 1 + sep_count as u32;
    let entry_length = memory.load_byte(entry_start)?;
    let entry_count = memory.load_word(entry_start + 1)? as i16;
    let _ = version;
    Ok(DictHeader {
        separators,
        entry_length,
        entry_count,
        entries_addr: entry_start + 3,
    })
}

/// Encode `word` the way a dictionary entry stores it, returning the packed words (2 for v1-3,
/// 3 for v4+).
fn encode_for_lookup(word: &str, version: u8) -> Vec<u16> {
    let zchars = text::encode_zchars(word, entry_zchar_count(version));
    text::pack_zchars(&zchars)
}

fn read_entry_words(memory: &Memory, addr: u32, count: usize) -> Result<Vec<u16>> {
    let mut words = Vec::with_capacity(count);
    for i in 0..count {
        words.push(memory.load_word(addr + i as u32 * 2)?);
    }
    Ok(words)
}

/// Binary-search the dictionary for `word`, returning its byte address or 0 if absent. The
/// dictionary may have a negative `entry_count`, meaning entries are unsorted (standard §13.4);
/// those fall back to a linear scan.
pub fn lookup(memory: &Memory, version: u8, word: &str) -> Result<u16> {
    let header = read_header(memory, version)?;
    let search = encode_for_lookup(word, version);
    let word_count = search.len();

    if header.entry_count < 0 {
        let count = (-header.entry_count) as u32;
        for i in 0..count {
            let addr = header.entries_addr + i * header.entry_length as u32;
            let entry = read_entry_words(memory, addr, word_count)?;
            if entry == search {
                return Ok(addr as u16);
            }
        }
        debug!("dictionary linear scan: '{word}' not found");
        return Ok(0);
    }

    let count = header.entry_count as i32;
    let mut low = 0i32;
    let mut high = count - 1;
    while low <= high {
        let mid = (low + high) / 2;
        let addr = header.entries_addr + mid as u32 * header.entry_length as u32;
        let entry = read_entry_words(memory, addr, word_count)?;
        match entry.cmp(&search) {
            std::cmp::Ordering::Less => low = mid + 1,
            std::cmp::Ordering::Greater => high = mid - 1,
            std::cmp::Ordering::Equal => {
                debug!("dictionary lookup: '{word}' found at {addr:#06x}");
                return Ok(addr as u16);
            }
        }
    }
    debug!("dictionary lookup: '{word}' not found");
    Ok(0)
}

/// One token produced by [`tokenize`]: the slice of the input text plus its byte offset.
pub struct Token<'a> {
    pub text: &'a str,
    pub start: usize,
}

/// Split `input` (already lowercased by the caller, per the `read` opcode's v1-4 behaviour) into
/// words and separators, each a token in its own right: "the cat, sat" tokenizes as
/// `["the", "cat", ",", "sat"]` because separators are never merged into an adjoining word.
pub fn tokenize<'a>(input: &'a str, separators: &[u8]) -> Vec<Token<'a>> {
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    let mut word_start: Option<usize> = None;
    let flush = |tokens: &mut Vec<Token<'a>>, word_start: &mut Option<usize>, end: usize| {
        if let Some(start) = word_start.take() {
            tokens.push(Token {
                text: &input[start..end],
                start,
            });
        }
    };
    while i < bytes.len() {
        let b = bytes[i];
        if b == b' ' {
            flush(&mut tokens, &mut word_start, i);
        } else if separators.contains(&b) {
            flush(&mut tokens, &mut word_start, i);
            tokens.push(Token {
                text: &input[i..i + 1],
                start: i,
            });
        } else if word_start.is_none() {
            word_start = Some(i);
        }
        i += 1;
    }
    flush(&mut tokens, &mut word_start, bytes.len());
    tokens
}

/// Tokenize the text buffer's contents and write the resulting parse table, per standard §13:
/// byte 0 holds the token count, then 4 bytes per token (dictionary address word, token length,
/// text-buffer offset). `unknown_words_flag` true (v5+ with flags bit set) skips dictionary
/// entries for unrecognized words instead of writing 0, leaving that slot for the caller to fill.
pub fn parse(
    memory: &mut Memory,
    version: u8,
    text_buffer: u32,
    parse_buffer: u32,
    skip_unknown: bool,
) -> Result<()> {
    let header = read_header(memory, version)?;
    // v1-4 text buffers hold only a max-length byte at offset 0; text starts at offset 1 and is
    // zero-terminated. v5+ buffers reserve a second header byte at offset 1 for the actual count
    // typed, so text starts at offset 2.
    let text_offset_base: u32 = if version <= 4 { 1 } else { 2 };
    let text_start = text_buffer + text_offset_base;
    let mut text = String::new();
    if version <= 4 {
        let mut i = 0u32;
        loop {
            let b = memory.load_byte(text_start + i)?;
            if b == 0 {
                break;
            }
            text.push(b as char);
            i += 1;
        }
    } else {
        let text_len = memory.load_byte(text_buffer + 1)? as usize;
        for i in 0..text_len as u32 {
            text.push(memory.load_byte(text_start + i)? as char);
        }
    }
    let lowered = text.to_ascii_lowercase();

    let tokens = tokenize(&lowered, &header.separators);
    let max_tokens = memory.load_byte(parse_buffer)? as usize;
    let token_count = tokens.len().min(max_tokens);
    memory.store_byte(parse_buffer + 1, token_count as u8)?;

    for (i, token) in tokens.iter().take(token_count).enumerate() {
        let addr = lookup(memory, version, token.text)?;
        let entry_offset = parse_buffer + 2 + (i * 4) as u32;
        if addr != 0 || !skip_unknown {
            memory.store_word(entry_offset, addr)?;
        }
        memory.store_byte(entry_offset + 2, token.text.len() as u8)?;
        memory.store_byte(entry_offset + 3, (token.start as u32 + text_offset_base) as u8)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v3_image_with_dictionary() -> Memory {
        let mut bytes = vec![0u8; 1024];
        bytes[0] = 3;
        bytes[0x08] = 0x00;
        bytes[0x09] = 0x40; // dictionary at 0x40
        let mut memory = Memory::new(bytes).unwrap();

        let dict_addr: u32 = 0x40;
        memory.store_byte(dict_addr, 3).unwrap(); // 3 separators
        memory.store_byte(dict_addr + 1, b',').unwrap();
        memory.store_byte(dict_addr + 2, b'.').unwrap();
        memory.store_byte(dict_addr + 3, b'"').unwrap();
        let entry_start = dict_addr + 1 + 3;
        memory.store_byte(entry_start, 7).unwrap(); // entry length: 4 bytes data + 3 extra
        let words = ["cat", "dog", "sat"];
        memory.store_word(entry_start + 1, words.len() as u16).unwrap();
        let entries_addr = entry_start + 3;
        let mut encoded: Vec<(String, Vec<u16>)> = words
            .iter()
            .map(|w| (w.to_string(), encode_for_lookup(w, 3)))
            .collect();
        encoded.sort_by(|a, b| a.1.cmp(&b.1));
        for (i, (_, packed)) in encoded.iter().enumerate() {
            let addr = entries_addr + i as u32 * 7;
            memory.store_word(addr, packed[0]).unwrap();
            memory.store_word(addr + 2, packed[1]).unwrap();
        }
        memory
    }

    #[test]
    fn lookup_finds_known_word() {
        let memory = v3_image_with_dictionary();
        let addr = lookup(&memory, 3, "cat").unwrap();
        assert_ne!(addr, 0);
    }

    #[test]
    fn lookup_missing_word_returns_zero() {
        let memory = v3_image_with_dictionary();
        assert_eq!(lookup(&memory, 3, "elephant").unwrap(), 0);
    }

    #[test]
    fn tokenize_splits_on_separators_as_atomic_tokens() {
        let tokens = tokenize("cat, sat.", &[b',', b'.']);
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["cat", ",", "sat", "."]);
    }

    #[test]
    fn tokenize_collapses_runs_of_spaces() {
        let tokens = tokenize("cat   sat", &[]);
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["cat", "sat"]);
    }

    #[test]
    fn parse_writes_token_count_and_dictionary_entries() {
        let mut memory = v3_image_with_dictionary();
        let text_buffer: u32 = 0x200;
        let parse_buffer: u32 = 0x300;
        let input = b"cat sat";
        memory.store_byte(text_buffer, 64).unwrap();
        for (i, &b) in input.iter().enumerate() {
            memory.store_byte(text_buffer + 1 + i as u32, b).unwrap();
        }
        memory.store_byte(text_buffer + 1 + input.len() as u32, 0).unwrap(); // terminator
        memory.store_byte(parse_buffer, 8).unwrap(); // max tokens
        parse(&mut memory, 3, text_buffer, parse_buffer, false).unwrap();
        assert_eq!(memory.load_byte(parse_buffer + 1).unwrap(), 2);
        let first_addr = memory.load_word(parse_buffer + 2).unwrap();
        assert_ne!(first_addr, 0);
        assert_eq!(memory.load_byte(parse_buffer + 2 + 2).unwrap(), 3); // "cat" length
        assert_eq!(memory.load_byte(parse_buffer + 2 + 3).unwrap(), 1); // offset into buffer
    }

    #[test]
    fn parse_leaves_unknown_word_slot_untouched_when_skipping() {
        let mut memory = v3_image_with_dictionary();
        let text_buffer: u32 = 0x200;
        let parse_buffer: u32 = 0x300;
        let input = b"zzz";
        memory.store_byte(text_buffer, 64).unwrap();
        for (i, &b) in input.iter().enumerate() {
            memory.store_byte(text_buffer + 1 + i as u32, b).unwrap();
        }
        memory.store_byte(text_buffer + 1 + input.len() as u32, 0).unwrap();
        memory.store_byte(parse_buffer, 8).unwrap();
        memory.store_word(parse_buffer + 2, 0xBEEF).unwrap();
        parse(&mut memory, 3, text_buffer, parse_buffer, true).unwrap();
        assert_eq!(memory.load_word(parse_buffer + 2).unwrap(), 0xBEEF);
    }
}
