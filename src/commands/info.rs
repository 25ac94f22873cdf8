use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use bagslice_storage::{FileStore, MetadataProvider};

use crate::output::format_info;

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Bag directory to describe
    #[arg(value_name = "BAG")]
    pub bag: PathBuf,
}

pub fn run(args: InfoArgs) -> Result<()> {
    let store = FileStore::new();
    let channels = store
        .list_channels(&args.bag)
        .with_context(|| format!("Failed to read channels of {}", args.bag.display()))?;
    let bounds = store
        .time_bounds(&args.bag)
        .with_context(|| format!("Failed to read time bounds of {}", args.bag.display()))?;

    print!("{}", format_info(&args.bag, &channels, bounds));
    Ok(())
}
