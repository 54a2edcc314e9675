//! SFS builder: orchestrates allocation and emission, writes the
//! superblock, and supports both a fixed size table and an exact-size
//! search over candidate geometries.

use std::path::Path;

use crate::atr::AtrImage;
use crate::bitmap::Bitmap;
use crate::dirent::{self, DirEntry, ENTRY_LEN, FLAG_DIR, FLAG_INUSE};
use crate::error::{Result, SfsError};
use crate::flist::{FileList, NodeContents};
use crate::secmap;

/// Sector 1 always holds the boot prefix and the superblock.
pub const SUPERBLOCK_SECTOR: u16 = 1;

const OFF_SIGNATURE: usize = 7;
const OFF_ROOT_MAP: usize = 9;
const OFF_SEC_COUNT: usize = 11;
const OFF_FREE_COUNT: usize = 13;
const OFF_BOOT_ADDR: usize = 18;
const OFF_BITMAP_SECT: usize = 16;
const OFF_VOLUME_NAME: usize = 22;
const OFF_SEC_SIZE: usize = 31;
const SIGNATURE: u8 = 0x80;

/// The size table `mkatr` walks when the caller does not request an
/// exact-size search, reconstructed from the original's `disksizes.h`
/// which wasn't available to port directly.
const SIZE_TABLE: [(u16, u16); 4] = [
    (128, 720),   // standard Atari single-density disk
    (256, 720),   // double density
    (256, 1440),  // double-sided double density
    (256, 65535), // maximal image
];

/// A built volume: the raw sector array plus its geometry and residual
/// free-sector count.
#[derive(Debug, Clone)]
pub struct Volume {
    image: AtrImage,
    free_sectors: u16,
}

impl Volume {
    pub fn data(&self) -> &[u8] {
        self.image.data()
    }

    pub fn sector_size(&self) -> u16 {
        self.image.sec_size
    }

    pub fn sector_count(&self) -> u16 {
        self.image.sec_count
    }

    pub fn free_sectors(&self) -> u16 {
        self.free_sectors
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        self.image.write(path)
    }

    #[cfg(test)]
    fn image(&self) -> &AtrImage {
        &self.image
    }
}

/// Build a volume at an exact geometry: validate it, lay out the
/// bitmap and boot prefix, emit the directory tree, then finalize the
/// bitmap and superblock.
pub fn build(sec_size: u16, sec_count: u16, boot_addr: u16, flist: &FileList) -> Result<Volume> {
    if sec_count < 6 {
        return Err(SfsError::OutOfSpace);
    }
    if sec_size != 128 && sec_size != 256 {
        return Err(SfsError::OutOfSpace);
    }

    let mut image = AtrImage::new(sec_size, sec_count);
    let mut bitmap = Bitmap::init(sec_count);
    // Sector 0 is used by Bitmap::init; reserve(2) claims sector 1 for
    // the superblock. Sectors for the bitmap itself come next, via alloc().
    bitmap.reserve(2)?;

    let boot_node = flist.boot_node();

    let bitmap_count = Bitmap::sectors_needed(sec_count, sec_size);
    let mut bitmap_sect = None;
    for _ in 0..bitmap_count {
        let s = bitmap.alloc()?;
        bitmap_sect.get_or_insert(s);
    }
    let bitmap_sect = bitmap_sect.ok_or(SfsError::OutOfSpace)?;

    let (root_map, _root_size) = write_directory(&mut image, &mut bitmap, flist, FileList::ROOT)?;

    if let Some(boot_idx) = boot_node {
        let data = match &flist.nodes[boot_idx].contents {
            NodeContents::File { data } => data,
            NodeContents::Dir { .. } => unreachable!("boot node must be a file"),
        };
        write_boot_sectors(&mut image, data);
    }

    let mut bitmap_bytes = vec![0u8; bitmap_count as usize * sec_size as usize];
    bitmap.serialize(&mut bitmap_bytes);
    for i in 0..bitmap_count {
        let sector = bitmap_sect + i;
        let start = i as usize * sec_size as usize;
        let end = start + sec_size as usize;
        image.sector_mut(sector).copy_from_slice(&bitmap_bytes[start..end]);
    }

    let free_sectors = bitmap.free_count();
    finalize_superblock(
        &mut image,
        root_map,
        sec_count,
        free_sectors,
        bitmap_sect,
        sec_size,
        boot_addr,
        flist.nodes[FileList::ROOT].sfs_name,
    );

    Ok(Volume {
        image,
        free_sectors,
    })
}

/// Try the fixed size table in ascending order, skipping any candidate
/// whose raw byte capacity is below `min_size`, and return the first
/// geometry for which `build` succeeds.
pub fn build_best_fit(boot_addr: u16, min_size: usize, flist: &FileList) -> Result<Volume> {
    for &(sec_size, sec_count) in SIZE_TABLE.iter() {
        if (sec_size as usize) * (sec_count as usize) < min_size {
            continue;
        }
        if let Ok(volume) = build(sec_size, sec_count, boot_addr, flist) {
            return Ok(volume);
        }
    }
    Err(SfsError::GeometryExhausted)
}

/// Search for the smallest geometry that still fits `min_size`: probe
/// the largest candidate sector count, then shrink one sector at a time
/// while `build` keeps succeeding. `min_size` is treated as a hard lower
/// bound on the returned geometry's byte capacity — the shrink loop
/// never returns a geometry under that floor, unlike the original's
/// free-count-based early exit, which could overshoot past it.
pub fn build_exact_size(boot_addr: u16, min_size: usize, flist: &FileList) -> Result<Volume> {
    for &sec_size in &[128u16, 256u16] {
        if (sec_size as usize) * 65535 < min_size {
            continue;
        }
        let probe = match build(sec_size, 65535, boot_addr, flist) {
            Ok(v) => v,
            Err(_) => continue,
        };

        let mut nsec = 65535u16.saturating_sub(probe.free_sectors).max(6);
        let mut best = probe;

        while nsec > 6 {
            let candidate = nsec - 1;
            let capacity = sec_size as usize * candidate as usize;
            if capacity < min_size {
                break;
            }
            match build(sec_size, candidate, boot_addr, flist) {
                Ok(v) => {
                    best = v;
                    nsec = candidate;
                }
                Err(_) => break,
            }
        }

        return Ok(best);
    }
    Err(SfsError::GeometryExhausted)
}

/// Copy the boot file's leading 384 bytes (zero-padded) across sectors
/// 1-3's 128-byte boot prefix. The boot file also keeps its own ordinary
/// sector map entry in the directory tree: its content is therefore
/// present twice on disk. `finalize_superblock` runs after this and,
/// like every other superblock field, its boot-address field wins over
/// whatever boot-file byte happened to land at the same offset.
fn write_boot_sectors(image: &mut AtrImage, data: &[u8]) {
    let take = data.len().min(384);
    let mut pos = 0usize;
    for sec in 1..=3u16 {
        if pos >= take {
            break;
        }
        let chunk_len = (take - pos).min(128);
        image.sector_mut(sec)[..chunk_len].copy_from_slice(&data[pos..pos + chunk_len]);
        pos += chunk_len;
    }
}

/// Recursively emit one directory's map chain and all of its
/// descendants. Returns `(first_map_sector, total_size)`. Children
/// recurse before the current directory's own chain is written, so
/// every child entry's `map`/`size` fields are known up front.
fn write_directory(
    image: &mut AtrImage,
    bitmap: &mut Bitmap,
    flist: &FileList,
    dir_idx: usize,
) -> Result<(u16, u32)> {
    let node = &flist.nodes[dir_idx];
    let children = match &node.contents {
        NodeContents::Dir { children } => children.clone(),
        NodeContents::File { .. } => unreachable!("directory node must hold children"),
    };

    let mut seen: Vec<[u8; 11]> = Vec::with_capacity(children.len());
    for &c in &children {
        let name = flist.nodes[c].sfs_name;
        if seen.iter().any(|&n| n == name) {
            return Err(SfsError::DuplicateName(flist.nodes[c].host_path.clone()));
        }
        seen.push(name);
    }

    let mut child_entries = Vec::with_capacity(children.len());
    for &c in &children {
        let child = &flist.nodes[c];
        let (map, size) = if child.is_dir {
            write_directory(image, bitmap, flist, c)?
        } else {
            let data = match &child.contents {
                NodeContents::File { data } => data,
                NodeContents::Dir { .. } => unreachable!("file node must hold data"),
            };
            let chain = secmap::write_chain(image, bitmap, data)?;
            (chain.first_map, data.len() as u32)
        };

        let (date, time) = dirent::encode_datetime(child.mtime);
        let flags = FLAG_INUSE | if child.is_dir { FLAG_DIR } else { 0 } | child.attrs;
        child_entries.push(DirEntry {
            flags,
            map,
            size,
            name: child.sfs_name,
            date,
            time,
        });
    }

    let entry_count = 1 + child_entries.len();
    let total_size = (ENTRY_LEN * entry_count) as u32;

    let (date, time) = dirent::encode_datetime(node.mtime);
    let header = DirEntry {
        flags: FLAG_INUSE | FLAG_DIR,
        map: 0, // patched below once the chain's own sectors are known
        size: total_size,
        name: node.sfs_name,
        date,
        time,
    };

    let mut payload = Vec::with_capacity(ENTRY_LEN * entry_count);
    payload.extend_from_slice(&header.to_bytes());
    for entry in &child_entries {
        payload.extend_from_slice(&entry.to_bytes());
    }

    let chain = secmap::write_chain(image, bitmap, &payload)?;
    let first_data_sector = chain.data_sectors[0];
    image.sector_mut(first_data_sector)[1..3].copy_from_slice(&chain.first_map.to_le_bytes());

    Ok((chain.first_map, total_size))
}

fn finalize_superblock(
    image: &mut AtrImage,
    root_map: u16,
    sec_count: u16,
    free_sectors: u16,
    bitmap_sect: u16,
    sec_size: u16,
    boot_addr: u16,
    volume_name: [u8; 11],
) {
    let sector = image.sector_mut(SUPERBLOCK_SECTOR);
    sector[OFF_SIGNATURE] = SIGNATURE;
    sector[OFF_ROOT_MAP..OFF_ROOT_MAP + 2].copy_from_slice(&root_map.to_le_bytes());
    sector[OFF_SEC_COUNT..OFF_SEC_COUNT + 2].copy_from_slice(&sec_count.to_le_bytes());
    sector[OFF_FREE_COUNT..OFF_FREE_COUNT + 2].copy_from_slice(&free_sectors.to_le_bytes());
    sector[OFF_BITMAP_SECT..OFF_BITMAP_SECT + 2].copy_from_slice(&bitmap_sect.to_le_bytes());
    sector[OFF_BOOT_ADDR..OFF_BOOT_ADDR + 2].copy_from_slice(&boot_addr.to_le_bytes());
    sector[OFF_VOLUME_NAME..OFF_VOLUME_NAME + 8].copy_from_slice(&volume_name[..8]);
    // 0 means 256 on disk; write the literal byte for 128-byte images
    // too, so a reader never has to guess what an absent value means.
    sector[OFF_SEC_SIZE] = if sec_size == 256 { 0 } else { sec_size as u8 };
}
