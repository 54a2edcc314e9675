//! `lshowfen`: recognize and list a HOWFEN DOS menu disk. Extraction is
//! not offered: HOWFEN's flat directory carries no sector-map chains
//! this crate knows how to walk.

use std::path::PathBuf;

use structopt::StructOpt;

use spartafs::howfen;
use spartafs::reader::{self, ListMode, ListOptions};

#[derive(Debug, StructOpt)]
#[structopt(name = "lshowfen", about = "List a HOWFEN DOS menu disk")]
struct Opt {
    /// Print the listing in Atari format instead of UNIX.
    #[structopt(short, long)]
    atari: bool,

    /// Fold names to lower case.
    #[structopt(short, long)]
    lower_case: bool,

    /// ATR image to read.
    image: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let image = reader::load_atr(&opt.image)?;
    let opts = ListOptions {
        lower_case: opt.lower_case,
    };

    let mode = if opt.atari { ListMode::Atari } else { ListMode::Unix };
    howfen::howfen_list(&image, &opt.image.display().to_string(), mode, &opts)?;
    Ok(())
}
