//! `mkatr`: build an ATR image holding a SpartaDOS file system from a
//! set of host files and directories.
//!
//! Flag interleaving with positional file arguments (the original
//! `mkatr.c` lets `-b` appear between any two file names on the command
//! line) is out of scope for this port; `--boot` instead names the boot
//! file explicitly, and `+h`/`+p`/`+a` attribute markers are read back
//! out of the positional file list itself.

use std::path::PathBuf;

use chrono::Local;
use structopt::StructOpt;

use spartafs::dirent::{FLAG_ARCHIVED, FLAG_HIDDEN, FLAG_PROTECTED};
use spartafs::{builder, flist::FileList};

#[derive(Debug, StructOpt)]
#[structopt(name = "mkatr", about = "Create an ATR image with a SpartaDOS file system")]
struct Opt {
    /// File to embed as the boot loader, in addition to its normal
    /// directory entry.
    #[structopt(short, long)]
    boot: Option<PathBuf>,

    /// Search for the smallest exact geometry instead of the fixed size
    /// table.
    #[structopt(short = "x", long)]
    exact_size: bool,

    /// Boot loader entry page (3-240).
    #[structopt(short = "B", long, default_value = "7")]
    boot_addr: u16,

    /// Minimum image size in bytes.
    #[structopt(short = "s", long, default_value = "0")]
    min_size: usize,

    /// Output ATR file.
    out: PathBuf,

    /// Input files and directories. Prefix the next entry with `+h`,
    /// `+p` or `+a` to mark it hidden, protected or archived.
    files: Vec<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    if !(3..=240).contains(&opt.boot_addr) {
        anyhow::bail!("boot address must be between 3 and 240");
    }

    let mut flist = FileList::new(Local::now().naive_local());

    if let Some(boot) = &opt.boot {
        flist.add_path(
            boot.to_str().ok_or_else(|| anyhow::anyhow!("boot path is not valid UTF-8"))?,
            true,
            0,
        )?;
    }

    let mut pending_attrs = 0u8;
    for token in &opt.files {
        match token.as_str() {
            "+h" => pending_attrs |= FLAG_HIDDEN,
            "+p" => pending_attrs |= FLAG_PROTECTED,
            "+a" => pending_attrs |= FLAG_ARCHIVED,
            path => {
                flist.add_path(path, false, pending_attrs)?;
                pending_attrs = 0;
            }
        }
    }

    let volume = if opt.exact_size {
        builder::build_exact_size(opt.boot_addr, opt.min_size, &flist)?
    } else {
        builder::build_best_fit(opt.boot_addr, opt.min_size, &flist)?
    };

    volume.write(&opt.out)?;
    log::info!(
        "wrote {}: {} sectors of {} bytes, {} free",
        opt.out.display(),
        volume.sector_count(),
        volume.sector_size(),
        volume.free_sectors()
    );

    Ok(())
}
