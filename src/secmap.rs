//! Sector map writer/reader.
//!
//! A sector map is a chain of sector-sized blocks: a 4-byte header
//! `(next_map, prev_map)` as little-endian 16-bit words, followed by
//! `(sec_size-4)/2` little-endian 16-bit slots holding data-sector
//! numbers. A zero slot is a hole; the chain ends when `next_map == 0`.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::atr::AtrImage;
use crate::bitmap::Bitmap;
use crate::error::Result;

pub fn slots_per_map(sec_size: u16) -> usize {
    (sec_size as usize - 4) / 2
}

/// Number of data sectors a `payload_len`-byte file/directory needs.
pub fn data_sectors_needed(payload_len: usize, sec_size: u16) -> usize {
    (payload_len + sec_size as usize - 1) / sec_size as usize
}

/// Number of map sectors needed to hold `data_needed` data-sector slots.
pub fn map_sectors_needed(data_needed: usize, sec_size: u16) -> usize {
    if data_needed == 0 {
        1
    } else {
        let slots = slots_per_map(sec_size);
        (data_needed + slots - 1) / slots
    }
}

/// The sector numbers a completed chain ended up occupying, so callers
/// that need to patch a self-referential field (a directory's header
/// entry pointing back at its own map) can do so without re-deriving
/// allocation order.
pub struct WrittenChain {
    pub first_map: u16,
    pub map_sectors: Vec<u16>,
    pub data_sectors: Vec<u16>,
}

/// Allocate and write a sector map chain holding `payload`. Zero-length
/// payloads still get exactly one map sector with no populated slots,
/// matching the reference builder.
pub fn write_chain(image: &mut AtrImage, bitmap: &mut Bitmap, payload: &[u8]) -> Result<WrittenChain> {
    let sec_size = image.sec_size as usize;
    let slots = slots_per_map(sec_size);

    let data_needed = data_sectors_needed(payload.len(), image.sec_size);
    let map_needed = map_sectors_needed(data_needed, image.sec_size);

    // Allocate all map sectors first, then all data sectors (§4.2).
    let mut map_sectors = Vec::with_capacity(map_needed);
    for _ in 0..map_needed {
        map_sectors.push(bitmap.alloc()?);
    }
    let mut data_sectors = Vec::with_capacity(data_needed);
    for _ in 0..data_needed {
        data_sectors.push(bitmap.alloc()?);
    }

    for (i, &map_sec) in map_sectors.iter().enumerate() {
        let next = map_sectors.get(i + 1).copied().unwrap_or(0);
        let prev = if i > 0 { map_sectors[i - 1] } else { 0 };

        let mut header = &mut image.sector_mut(map_sec)[..4];
        header.write_u16::<LittleEndian>(next)?;
        header.write_u16::<LittleEndian>(prev)?;

        for slot in 0..slots {
            let idx = i * slots + slot;
            let sec_num = data_sectors.get(idx).copied().unwrap_or(0);
            let mut dst = &mut image.sector_mut(map_sec)[4 + slot * 2..4 + slot * 2 + 2];
            dst.write_u16::<LittleEndian>(sec_num)?;
        }
    }

    for (i, &data_sec) in data_sectors.iter().enumerate() {
        let start = i * sec_size;
        let end = (start + sec_size).min(payload.len());
        let chunk = &payload[start..end];
        let dst = image.sector_mut(data_sec);
        dst[..chunk.len()].copy_from_slice(chunk);
        for b in &mut dst[chunk.len()..] {
            *b = 0;
        }
    }

    Ok(WrittenChain {
        first_map: map_sectors[0],
        map_sectors,
        data_sectors,
    })
}

/// Read up to `size` bytes from the map chain starting at `map`. Zero
/// slots produce `sec_size` zero bytes (sparse holes); an out-of-range
/// sector number stops the read early (the caller may log a warning).
pub fn read_chain(image: &AtrImage, mut map: u16, size: usize) -> Vec<u8> {
    let sec_size = image.sec_size as usize;
    let mut out = Vec::with_capacity(size);

    'chain: while out.len() < size && map != 0 {
        if map < 2 || map > image.sec_count {
            break;
        }
        let header = image.sector(map);
        let next = u16::from_le_bytes([header[0], header[1]]);
        let slots = slots_per_map(sec_size);

        for slot in 0..slots {
            if out.len() >= size {
                break 'chain;
            }
            let remaining = size - out.len();
            let take = remaining.min(sec_size);

            let off = 4 + slot * 2;
            let sec = u16::from_le_bytes([header[off], header[off + 1]]);

            if sec == 0 {
                out.extend(std::iter::repeat(0u8).take(take));
            } else if sec < 2 || sec > image.sec_count {
                break 'chain;
            } else {
                let data = image.sector(sec);
                out.extend_from_slice(&data[..take]);
            }
        }

        map = next;
    }

    out
}
