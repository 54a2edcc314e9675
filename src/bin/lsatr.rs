//! `lsatr`: list or extract the contents of an ATR image holding a
//! SpartaDOS file system.

use std::path::PathBuf;

use structopt::StructOpt;

use spartafs::reader::{self, ListMode, ListOptions};

#[derive(Debug, StructOpt)]
#[structopt(name = "lsatr", about = "List or extract a SpartaDOS ATR image")]
struct Opt {
    /// Print the listing in Atari (DIR-style) format instead of UNIX.
    #[structopt(short, long, conflicts_with = "extract")]
    atari: bool,

    /// Fold names to lower case.
    #[structopt(short, long)]
    lower_case: bool,

    /// Extract the whole tree into the current directory.
    #[structopt(short = "x", long, conflicts_with = "atari")]
    extract: bool,

    /// Extract the whole tree into the given directory instead.
    #[structopt(short = "X", long, conflicts_with = "atari", parse(from_os_str))]
    extract_to: Option<PathBuf>,

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

    let cwd = PathBuf::from(".");
    let mode = if let Some(dest) = &opt.extract_to {
        ListMode::Extract(dest.as_path())
    } else if opt.extract {
        ListMode::Extract(cwd.as_path())
    } else if opt.atari {
        ListMode::Atari
    } else {
        ListMode::Unix
    };

    reader::list(&image, mode, &opts)?;
    Ok(())
}
