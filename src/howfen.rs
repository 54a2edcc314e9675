//! HOWFEN DOS menu disk reader, ported byte-for-byte from `lshowfen.c`'s
//! `howfen_read`: a flat 20-entry directory recognized by a fixed
//! signature at sector 1 offset `0x58`. Extraction is explicitly
//! unsupported; this module only produces a listing.

use crate::atr::AtrImage;
use crate::error::{Result, SfsError};
use crate::reader::{ListMode, ListOptions};

const SIGNATURE_OFFSET: usize = 0x58;
const SIGNATURE: [u8; 12] = [
    0x80, 0x28, 0x2f, 0x37, 0x26, 0x25, 0x2e, 0x00, 0x24, 0x2f, 0x33, 0x00,
];
const VERSION_OFFSET: usize = 0x64;
const VERSION_LEN: usize = 5;
const VERSION_SCREEN_CODE_MARKER: u8 = 0x36;
const DIR_OFFSET: usize = 0x8A;
const DIR_ENTRY_LEN: usize = 0x20;
const DIR_ENTRY_COUNT: usize = 20;
const NAME_OFFSET: usize = 2;
const NAME_LEN: usize = 25;
const LEN_OFFSET: usize = 0x1B;
const MIN_SECTOR_COUNT: u16 = 10;

#[derive(Debug, Clone)]
pub struct HowfenEntry {
    pub name: String,
    pub atari_name: String,
    pub sector_count: u32,
}

impl HowfenEntry {
    pub fn byte_len(&self, sec_size: u16) -> u32 {
        self.sector_count * sec_size as u32
    }
}

/// Recognize a HOWFEN menu disk: the 12-byte signature at sector 1
/// offset `0x58` must match exactly.
pub fn is_howfen(image: &AtrImage) -> bool {
    if image.sec_count < MIN_SECTOR_COUNT {
        return false;
    }
    let sector1 = image.sector(1);
    if sector1.len() < SIGNATURE_OFFSET + SIGNATURE.len() {
        return false;
    }
    sector1[SIGNATURE_OFFSET..SIGNATURE_OFFSET + SIGNATURE.len()] == SIGNATURE
}

/// Decode the 5-byte version field at sector 1 offset `0x64`. Screen
/// codes are translated to ASCII only when the first byte is `0x36`
/// (the screen-code marker); otherwise no version string is present.
pub fn decode_version(sector1: &[u8]) -> Option<String> {
    let raw = &sector1[VERSION_OFFSET..VERSION_OFFSET + VERSION_LEN];
    if raw[0] != VERSION_SCREEN_CODE_MARKER {
        return None;
    }
    let chars: String = raw.iter().map(|&b| ((b & 0x3F) + 0x20) as char).collect();
    Some(chars)
}

/// Translate one HOWFEN filename byte using the two-step table from
/// `lshowfen.c`'s `get_name`: an inverse-video bit swap, then a
/// high-bit strip restricted to the screen-code ranges that carry it,
/// replicated exactly rather than paraphrased.
fn translate_name_byte(raw: u8, lower_case: bool) -> u8 {
    let mut c = raw;
    if c & 0x40 == 0 {
        c += 0x20;
    } else if c & 0x60 == 0x40 {
        c -= 0x40;
    }
    if (0xB0..=0xB9).contains(&c) || (0xC1..=0xDA).contains(&c) || (0xE1..=0xFA).contains(&c) {
        c &= 0x7F;
    }
    if (b'A'..=b'Z').contains(&c) && lower_case {
        c = c - b'A' + b'a';
    }
    if c < b' ' || c == b'/' || c == b'.' || c == b'?' || c == b'\\' || c == 96 || c > b'z' {
        c = b'_';
    }
    c
}

/// Decode a HOWFEN entry's 25-byte name field (`get_name` in
/// `lshowfen.c`). The original fills two buffers, `name` and `aname`,
/// with the same translated bytes and then truncates both at `last`,
/// the index one past the final non-space character — so the UNIX-style
/// and Atari-style forms it returns are the same trimmed string, not two
/// different renderings.
pub fn decode_name(raw: &[u8], lower_case: bool) -> (String, String) {
    let translated: Vec<u8> = raw.iter().map(|&b| translate_name_byte(b, lower_case)).collect();
    let full = String::from_utf8_lossy(&translated).into_owned();
    let trimmed = full.trim_end().to_string();
    (trimmed.clone(), trimmed)
}

/// Decode the 4-byte decimal length field at a directory entry's offset
/// `0x1B`: each byte encodes a screen-code digit in `0x10..0x1A`.
pub fn decode_len(raw: &[u8]) -> u32 {
    let mut len = 0u32;
    for &b in raw {
        if b > 0x0F && b < 0x1A {
            len = len * 10 + (b - 0x10) as u32;
        }
    }
    len
}

/// List the fixed 20-entry flat directory. The directory spans sector-1
/// offsets `0x8A` through roughly `0x309`, deliberately crossing several
/// physical sectors (`lshowfen.c`'s `howfen_read` reads `sec1 + 0x8A +
/// i*0x20` out of one contiguous buffer), so this reads from the flat
/// byte view rather than the single-sector slice `sector(1)` returns.
/// Entries whose marker byte does not match `0x21 + index` are logged as
/// invalid and skipped; an image too small to hold the whole directory
/// simply yields fewer entries rather than panicking.
pub fn list_entries(image: &AtrImage, opts: &ListOptions) -> Vec<HowfenEntry> {
    let data = image.bytes_from(1);
    let mut entries = Vec::new();
    for i in 0..DIR_ENTRY_COUNT {
        let base = DIR_OFFSET + i * DIR_ENTRY_LEN;
        if base + DIR_ENTRY_LEN > data.len() {
            log::warn!("image too small to hold HOWFEN entry at pos {}", (b'A' + i as u8) as char);
            break;
        }
        let marker = data[base];
        if marker != 0x21 + i as u8 {
            log::warn!("invalid entry at pos {}", (b'A' + i as u8) as char);
            continue;
        }
        let sector_count = decode_len(&data[base + LEN_OFFSET..base + LEN_OFFSET + 4]);
        let (name, atari_name) = decode_name(
            &data[base + NAME_OFFSET..base + NAME_OFFSET + NAME_LEN],
            opts.lower_case,
        );
        if name.is_empty() {
            continue;
        }
        entries.push(HowfenEntry {
            name,
            atari_name,
            sector_count,
        });
    }
    entries
}

/// Print a listing in either UNIX or Atari style, reusing `reader::list`'s
/// `ListMode` so both readers share one mode abstraction. Extraction is
/// not implemented; an `Extract` mode is rejected with an error instead
/// of silently falling back to a listing.
pub fn howfen_list(image: &AtrImage, atr_name: &str, mode: ListMode, opts: &ListOptions) -> Result<()> {
    if !is_howfen(image) {
        return Err(SfsError::NotHowfen);
    }
    let atari_list = match mode {
        ListMode::Atari => true,
        ListMode::Unix => false,
        ListMode::Extract(_) => return Err(SfsError::ExtractionUnsupported),
    };

    let sector1 = image.sector(1);
    let version = decode_version(sector1).unwrap_or_default();

    if atari_list {
        println!(
            "ATR image: {}\nImage size: {} sectors of {} bytes\nVolume: HOWFEN DOS {}",
            atr_name, image.sec_count, image.sec_size, version
        );
    } else {
        println!(
            "{}: {} sectors of {} bytes, HOWFEN DOS {}.",
            atr_name, image.sec_count, image.sec_size, version
        );
    }

    for entry in list_entries(image, opts) {
        if atari_list {
            println!("{:<12} {:7}", entry.atari_name, entry.byte_len(image.sec_size));
        } else {
            println!("{:8}\t\t/{}", entry.byte_len(image.sec_size), entry.name);
        }
    }
    Ok(())
}
