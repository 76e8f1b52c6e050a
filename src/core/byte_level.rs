//! Bijection between raw bytes and printable Unicode characters.
//!
//! Text regexes cannot run over arbitrary byte sequences: control bytes and
//! invalid UTF-8 break the engine. The classic workaround maps every byte
//! value to a unique printable character (printable ASCII and most of
//! Latin-1 map to themselves, the rest start at U+0100), runs the text
//! machinery, and maps back. The split pipeline uses this to offer its
//! regex stage over `u8` alphabets.

use rustc_hash::FxHashMap;
use std::sync::LazyLock;

static BYTE_TO_CHAR: LazyLock<[char; 256]> = LazyLock::new(|| {
    let mut mapping = ['\0'; 256];

    let mut direct: Vec<u8> = Vec::new();
    direct.extend(33u8..=126);
    direct.extend(161u8..=172);
    direct.extend(174u8..=255);

    for &b in &direct {
        mapping[b as usize] = b as char;
    }

    // Everything else gets a codepoint from U+0100 upwards.
    let mut next = 256u32;
    for b in 0u8..=255 {
        if !direct.contains(&b) {
            mapping[b as usize] = char::from_u32(next).expect("codepoint below surrogates");
            next += 1;
        }
    }

    mapping
});

static CHAR_TO_BYTE: LazyLock<FxHashMap<char, u8>> = LazyLock::new(|| {
    BYTE_TO_CHAR
        .iter()
        .enumerate()
        .map(|(byte, &ch)| (ch, byte as u8))
        .collect()
});

/// The printable character standing in for `byte`.
#[inline]
pub fn byte_to_char(byte: u8) -> char {
    BYTE_TO_CHAR[byte as usize]
}

/// Render a byte slice as its printable stand-in string.
#[inline]
pub fn byte_to_char_str(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| byte_to_char(b)).collect()
}

/// The byte a stand-in character represents, if it is one.
#[inline]
pub fn char_to_byte(ch: char) -> Option<u8> {
    CHAR_TO_BYTE.get(&ch).copied()
}

/// Map a stand-in string back to bytes. Characters outside the mapping are
/// dropped.
#[inline]
pub fn chars_to_bytes(text: &str) -> Vec<u8> {
    text.chars().filter_map(char_to_byte).collect()
}
