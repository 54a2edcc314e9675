//! ATR container I/O: the 16-byte header plus the "first three sectors
//! are always 128 bytes" payload convention.

use std::fs;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, SfsError};

const ATR_MAGIC: [u8; 2] = [0x96, 0x02];
const ATR_HEADER_LEN: usize = 16;
const SMALL_SECTOR_LEN: usize = 128;

/// A loaded or in-progress ATR payload, presented as a uniform array of
/// `sec_count` sectors of `sec_size` bytes each. Sector `n` (1-indexed)
/// lives at byte offset `sec_size * (n - 1)`; for `sec_size != 128` the
/// tail of sectors 1..=3 beyond their 128-byte boot prefix is padding,
/// never serialized back to the physical file.
#[derive(Debug, Clone)]
pub struct AtrImage {
    pub sec_size: u16,
    pub sec_count: u16,
    data: Vec<u8>,
}

impl AtrImage {
    /// Create a new, zeroed virtual sector array for the given geometry.
    pub fn new(sec_size: u16, sec_count: u16) -> Self {
        let data = vec![0u8; sec_size as usize * sec_count as usize];
        Self {
            sec_size,
            sec_count,
            data,
        }
    }

    #[inline]
    fn offset(&self, n: u16) -> usize {
        self.sec_size as usize * (n as usize - 1)
    }

    /// Immutable view of sector `n` (1-indexed, `n` in `[1, sec_count]`).
    pub fn sector(&self, n: u16) -> &[u8] {
        let start = self.offset(n);
        &self.data[start..start + self.sec_size as usize]
    }

    /// Mutable view of sector `n`.
    pub fn sector_mut(&mut self, n: u16) -> &mut [u8] {
        let start = self.offset(n);
        let len = self.sec_size as usize;
        &mut self.data[start..start + len]
    }

    /// Flat byte view starting at the base of sector `n` and running to
    /// the end of the virtual sector array. Unlike `sector`/`sector_mut`,
    /// this deliberately spans multiple physical sectors for
    /// collaborators (HOWFEN) whose on-disk structures are laid out
    /// relative to a single contiguous buffer rather than per-sector.
    pub fn bytes_from(&self, n: u16) -> &[u8] {
        let start = self.offset(n);
        &self.data[start..]
    }

    /// Mutable counterpart of `bytes_from`, for tests that hand-craft a
    /// structure spanning multiple physical sectors.
    pub fn bytes_from_mut(&mut self, n: u16) -> &mut [u8] {
        let start = self.offset(n);
        &mut self.data[start..]
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Payload size in bytes once serialized to an ATR file, accounting
    /// for the small-first-three-sectors convention.
    pub fn payload_len(&self) -> u32 {
        payload_len(self.sec_size, self.sec_count)
    }

    /// Write this image out as an ATR file.
    pub fn write(&self, path: &Path) -> Result<()> {
        let size = self.payload_len();
        let mut buf = Vec::with_capacity(ATR_HEADER_LEN + size as usize);

        buf.extend_from_slice(&ATR_MAGIC);
        buf.write_u8((size >> 4) as u8)?;
        buf.write_u8((size >> 12) as u8)?;
        buf.write_u16::<LittleEndian>(self.sec_size)?;
        buf.write_u8((size >> 20) as u8)?;
        buf.extend_from_slice(&[0u8; 9]);
        assert_eq!(buf.len(), ATR_HEADER_LEN);

        for n in 1..=self.sec_count {
            let sector = self.sector(n);
            if n <= 3 {
                buf.extend_from_slice(&sector[..SMALL_SECTOR_LEN]);
            } else {
                buf.extend_from_slice(sector);
            }
        }

        fs::write(path, buf)?;
        Ok(())
    }

    /// Load an ATR file, materializing the uniform virtual sector array.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path)?;
        if raw.len() < ATR_HEADER_LEN {
            return Err(SfsError::BadSuperblock("truncated ATR header".into()));
        }
        let mut header = &raw[..ATR_HEADER_LEN];
        let magic = [header.read_u8()?, header.read_u8()?];
        if magic != ATR_MAGIC {
            return Err(SfsError::BadSuperblock("bad ATR magic".into()));
        }
        let size_lo = header.read_u8()? as u32;
        let size_mid = header.read_u8()? as u32;
        let sec_size = {
            let mut h = &raw[4..6];
            h.read_u16::<LittleEndian>()?
        };
        let size_hi = raw[6] as u32;
        let size = size_lo | (size_mid << 8) | (size_hi << 16);
        let size_bytes = size * 16;

        let sec_size = if sec_size == 0 { 128 } else { sec_size };
        let sec_count = sector_count_for_payload(sec_size, size_bytes);

        let mut image = AtrImage::new(sec_size, sec_count);
        let mut pos = ATR_HEADER_LEN;
        for n in 1..=sec_count {
            let take = if n <= 3 {
                SMALL_SECTOR_LEN
            } else {
                sec_size as usize
            };
            if pos + take > raw.len() {
                return Err(SfsError::BadSuperblock("truncated ATR payload".into()));
            }
            image.sector_mut(n)[..take].copy_from_slice(&raw[pos..pos + take]);
            pos += take;
        }

        Ok(image)
    }
}

/// `size = (nsec > 3) ? ssec*(nsec-3) + 128*3 : 128*nsec` in bytes.
pub fn payload_len(sec_size: u16, sec_count: u16) -> u32 {
    if sec_count > 3 {
        sec_size as u32 * (sec_count as u32 - 3) + (SMALL_SECTOR_LEN as u32) * 3
    } else {
        SMALL_SECTOR_LEN as u32 * sec_count as u32
    }
}

/// Inverse of `payload_len`: recover `sec_count` given `sec_size` and the
/// decoded payload byte length from the ATR header.
fn sector_count_for_payload(sec_size: u16, size_bytes: u32) -> u16 {
    let small_total = (SMALL_SECTOR_LEN as u32) * 3;
    if size_bytes <= small_total {
        (size_bytes / SMALL_SECTOR_LEN as u32) as u16
    } else {
        (3 + (size_bytes - small_total) / sec_size as u32) as u16
    }
}
