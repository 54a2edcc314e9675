//! SFS reader: walks the superblock, root map and directory records
//! that the builder produces, streaming file bytes via the shared
//! sector-map chain walker.

use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::atr::AtrImage;
use crate::dirent::{DirEntry, ENTRY_LEN};
use crate::error::{Result, SfsError};
use crate::secmap;

/// Cap on a single directory's decoded byte stream: the format's
/// 2848-entry maximum (`65536 / 23`).
const MAX_DIR_BYTES: usize = 65536;

#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub lower_case: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum ListMode<'a> {
    Unix,
    Atari,
    Extract(&'a Path),
}

/// Parsed superblock fields.
#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub root_map: u16,
    pub sector_count: u16,
    pub free_sectors: u16,
    pub bitmap_sect: u16,
    pub sector_size: u16,
    /// Boot loader entry page, as passed to `builder::build`. Present
    /// regardless of whether the volume actually carries a boot file.
    pub boot_addr: u16,
    pub volume_name: [u8; 8],
}

const OFF_SIGNATURE: usize = 7;
const OFF_ROOT_MAP: usize = 9;
const OFF_SEC_COUNT: usize = 11;
const OFF_FREE_COUNT: usize = 13;
const OFF_BOOT_ADDR: usize = 18;
const OFF_BITMAP_SECT: usize = 16;
const OFF_VOLUME_NAME: usize = 22;
const OFF_SEC_SIZE: usize = 31;
const SIGNATURE: u8 = 0x80;

/// A single decoded directory entry, with its decoded names attached
/// (grounded on `lsatr.c`'s `get_name`).
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub raw: DirEntry,
    pub unix_name: String,
    pub atari_name: String,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.raw.is_dir()
    }

    pub fn size(&self) -> u32 {
        self.raw.size
    }
}

/// Convert an 11-byte SFS name into a UNIX-style dotted name and an
/// Atari-style display name, exactly mirroring `lsatr.c`'s `get_name`:
/// invalid bytes become `_`, spaces are dropped, the first `.` is
/// inserted once the extension bytes (index > 7) begin.
pub fn decode_name(name: &[u8; 11], lower_case: bool) -> (String, String) {
    let mut unix_name = String::new();
    let mut atari = [b' '; 12];
    let mut dot_inserted = false;

    for (i, &raw) in name.iter().enumerate() {
        let mut c = raw;
        if (b'A'..=b'Z').contains(&c) && lower_case {
            c = c - b'A' + b'a';
        }
        if c < b' ' || c == b'/' || c == b'.' || c == b'?' || c == b'\\' || c == 96 || c > b'z' {
            c = b'_';
        } else if c == b' ' {
            continue;
        }
        if i > 7 && !dot_inserted {
            dot_inserted = true;
            unix_name.push('.');
        }
        unix_name.push(c as char);
        atari[i + dot_inserted as usize] = c;
    }

    let atari_name = String::from_utf8_lossy(&atari).trim_end().to_string();
    (unix_name, atari_name)
}

/// Parse and validate sector 1's superblock.
pub fn read_superblock(image: &AtrImage) -> Result<Superblock> {
    if image.sec_count < 6 {
        return Err(SfsError::BadSuperblock("image has too few sectors".into()));
    }

    let sector1 = image.sector(1);
    let signature = sector1[OFF_SIGNATURE];
    if signature != SIGNATURE {
        return Err(SfsError::NotSparta);
    }

    let root_map = u16::from_le_bytes([sector1[OFF_ROOT_MAP], sector1[OFF_ROOT_MAP + 1]]);
    let sector_count = u16::from_le_bytes([sector1[OFF_SEC_COUNT], sector1[OFF_SEC_COUNT + 1]]);
    let free_sectors = u16::from_le_bytes([sector1[OFF_FREE_COUNT], sector1[OFF_FREE_COUNT + 1]]);
    let bitmap_sect = u16::from_le_bytes([sector1[OFF_BITMAP_SECT], sector1[OFF_BITMAP_SECT + 1]]);
    let sector_size_byte = sector1[OFF_SEC_SIZE];
    let sector_size = if sector_size_byte == 0 { 256 } else { sector_size_byte as u16 };

    if sector_size != image.sec_size {
        return Err(SfsError::BadSuperblock(format!(
            "mismatch sector sizes ({} != {})",
            sector_size, image.sec_size
        )));
    }
    if sector_count < image.sec_count {
        log::warn!("ATR image is bigger than file system");
    }
    if sector_count > image.sec_count {
        log::warn!("ATR image is smaller than file system");
    }
    if root_map < 2 || root_map > image.sec_count {
        return Err(SfsError::BadSuperblock("root dir map outside disk".into()));
    }
    if bitmap_sect < 2 || bitmap_sect > image.sec_count {
        return Err(SfsError::BadSuperblock("bitmap outside disk".into()));
    }

    let boot_addr = u16::from_le_bytes([sector1[OFF_BOOT_ADDR], sector1[OFF_BOOT_ADDR + 1]]);

    let mut volume_name = [0u8; 8];
    volume_name.copy_from_slice(&sector1[OFF_VOLUME_NAME..OFF_VOLUME_NAME + 8]);

    Ok(Superblock {
        root_map,
        sector_count,
        free_sectors,
        bitmap_sect,
        sector_size,
        boot_addr,
        volume_name,
    })
}

/// Read the 23-byte directory entries under `map`, skipping the header
/// entry, unused slots, erased slots, and the terminator.
pub fn read_dir(image: &AtrImage, map: u16, opts: &ListOptions) -> Result<Vec<FileEntry>> {
    let raw = secmap::read_chain(image, map, MAX_DIR_BYTES);
    if raw.len() < ENTRY_LEN {
        return Ok(Vec::new());
    }
    if raw.len() == MAX_DIR_BYTES {
        log::warn!("directory too big, truncated at {} bytes", MAX_DIR_BYTES);
    }

    let mut entries = Vec::new();
    let mut i = ENTRY_LEN; // skip the self-describing header entry
    while i + ENTRY_LEN <= raw.len() {
        let entry = DirEntry::from_bytes(&raw[i..i + ENTRY_LEN]);
        i += ENTRY_LEN;
        if entry.is_terminator() {
            break;
        }
        if !entry.is_inuse() || entry.is_erased() {
            continue;
        }
        let (unix_name, atari_name) = decode_name(&entry.name, opts.lower_case);
        if unix_name.is_empty() {
            log::warn!("invalid file name, skipping entry");
            continue;
        }
        entries.push(FileEntry {
            raw: entry,
            unix_name,
            atari_name,
        });
    }
    Ok(entries)
}

/// Stream a file's full content.
pub fn read_file(image: &AtrImage, entry: &FileEntry) -> Vec<u8> {
    let data = secmap::read_chain(image, entry.raw.map, entry.raw.size as usize);
    if data.len() != entry.raw.size as usize {
        log::warn!("{}: short file on disk", entry.unix_name);
    }
    data
}

/// UNIX-style recursive listing: `size, date, path` per line.
pub fn list_unix(image: &AtrImage, map: u16, prefix: &str, opts: &ListOptions) -> Result<()> {
    for entry in read_dir(image, map, opts)? {
        let path = format!("{}/{}", prefix, entry.unix_name);
        let [day, mon, year] = entry.raw.date;
        let [hh, mm, ss] = entry.raw.time;
        if entry.is_dir() {
            println!(
                "{:8}\t{:02}-{:02}-{:02} {:02}:{:02}:{:02}\t{}/",
                0, day, mon, year, hh, mm, ss, path
            );
            list_unix(image, entry.raw.map, &path, opts)?;
        } else {
            let data = read_file(image, &entry);
            println!(
                "{:8}\t{:02}-{:02}-{:02} {:02}:{:02}:{:02}\t{}",
                data.len(),
                day,
                mon,
                year,
                hh,
                mm,
                ss,
                path
            );
        }
    }
    Ok(())
}

/// Atari-style per-directory listing: header, flat entries, then a
/// second pass recursing into subdirectories (matches `lsatr.c`'s
/// two-pass `read_dir`).
pub fn list_atari(image: &AtrImage, map: u16, name: &str, opts: &ListOptions) -> Result<()> {
    println!("Directory of {}\n", if name.is_empty() { "/" } else { name });

    let entries = read_dir(image, map, opts)?;
    for entry in &entries {
        let [day, mon, year] = entry.raw.date;
        let [hh, mm] = [entry.raw.time[0], entry.raw.time[1]];
        if entry.is_dir() {
            println!(
                "{:<12}  <DIR>  {:02}-{:02}-{:02} {:02}:{:02}",
                entry.atari_name, day, mon, year, hh, mm
            );
        } else {
            println!(
                "{:<12} {:7} {:02}-{:02}-{:02} {:02}:{:02}",
                entry.atari_name, entry.raw.size, day, mon, year, hh, mm
            );
        }
    }
    println!();

    for entry in &entries {
        if entry.is_dir() {
            let new_name = format!("{}/{}", name, entry.unix_name);
            list_atari(image, entry.raw.map, &new_name, opts)?;
        }
    }
    Ok(())
}

/// Extract the whole tree under `map` into `dest`. Directories are
/// created (pre-existing is fine); files refuse to overwrite; mtime is
/// set from the 3-byte date/time pair.
pub fn extract(image: &AtrImage, map: u16, dest: &Path, opts: &ListOptions) -> Result<()> {
    fs::create_dir_all(dest)?;
    for entry in read_dir(image, map, opts)? {
        let target = dest.join(&entry.unix_name);
        if entry.is_dir() {
            extract(image, entry.raw.map, &target, opts)?;
        } else {
            let data = read_file(image, &entry);
            write_new(&target, &data)?;
            set_mtime(&target, &entry.raw)?;
        }
    }
    Ok(())
}

/// Create `path` and write `data`, refusing to clobber an existing file:
/// extraction must never silently overwrite something already there.
fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;
    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut f) => {
            f.write_all(data)?;
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(SfsError::AlreadyExists(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

fn set_mtime(path: &Path, entry: &DirEntry) -> Result<()> {
    let [day, month, year] = entry.date;
    let [hour, minute, second] = entry.time;
    let full_year = if year < 80 { 2000 + year as i32 } else { 1900 + year as i32 };

    let naive = chrono::NaiveDate::from_ymd_opt(full_year, month.max(1) as u32, day.max(1) as u32)
        .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
        .unwrap_or_else(|| chrono::NaiveDate::from_ymd(1970, 1, 1).and_hms(0, 0, 0));

    let unix_time = naive.and_utc().timestamp();
    let ft = FileTime::from_unix_time(unix_time, 0);
    filetime::set_file_mtime(path, ft)?;
    Ok(())
}

/// Load an ATR image from disk.
pub fn load_atr(path: &Path) -> Result<AtrImage> {
    AtrImage::load(path)
}

/// The `name: Error, ...`-style convenience entry point: parse the
/// superblock, then dispatch to the requested listing/extraction mode.
pub fn list(image: &AtrImage, mode: ListMode, opts: &ListOptions) -> Result<()> {
    let sb = read_superblock(image)?;
    match mode {
        ListMode::Unix => list_unix(image, sb.root_map, "", opts),
        ListMode::Atari => list_atari(image, sb.root_map, "", opts),
        ListMode::Extract(dest) => extract(image, sb.root_map, dest, opts),
    }
}
