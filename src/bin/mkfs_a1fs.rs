//! `mkfs.a1fs`: initializes an image file with an empty a1fs. Argument
//! parsing and image-path handling live only here; this binary is the
//! thin CLI shell around [`a1fs::format::format`].

use a1fs::context::Mount;
use a1fs::time::SystemClock;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// Initialize an a1fs image file.
#[derive(Parser, Debug)]
#[command(name = "mkfs.a1fs", version)]
struct Args {
    /// Force formatting even if the image already holds an a1fs.
    #[arg(short = 'f')]
    force: bool,

    /// Zero-fill the image before formatting.
    #[arg(short = 'z')]
    zero: bool,

    /// Number of inodes to provision. Must be greater than zero.
    #[arg(short = 'i', value_name = "N")]
    inodes: u32,

    /// Path to the image file to format.
    image: PathBuf,
}

fn run(args: Args) -> Result<()> {
    if args.inodes == 0 {
        bail!("-i N must be greater than zero");
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&args.image)
        .with_context(|| format!("failed to open {}", args.image.display()))?;

    if args.zero {
        let len = file.metadata()?.len();
        file.set_len(0)?;
        file.set_len(len)?;
    }

    let mut mount = Mount::from_file(file)
        .with_context(|| format!("failed to map {}", args.image.display()))?;

    if !args.force && mount.is_a1fs() {
        bail!(
            "{} already holds an a1fs image; pass -f to reformat",
            args.image.display()
        );
    }

    a1fs::format::format(&mut mount, args.inodes, &SystemClock)
        .with_context(|| "failed to format image")?;
    mount.flush().context("failed to flush formatted image")?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if let Err(err) = run(args) {
        eprintln!("mkfs.a1fs: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}
