//! `boxrun digest` command - Print the expected digest of an image archive.

use std::path::PathBuf;

use boxrun_runtime::digest_of_decompressed_tar;
use clap::Args;

#[derive(Args, Debug)]
pub struct DigestArgs {
    /// Image archive (tar.gz)
    pub image: PathBuf,
}

pub fn execute(args: DigestArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let digest = digest_of_decompressed_tar(&args.image)?;
    println!("{digest}");
    Ok(0)
}
