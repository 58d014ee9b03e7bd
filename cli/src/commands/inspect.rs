use std::path::Path;

use anyhow::{bail, Result};
use parceldrift::{layer, RunConfig};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::InspectArgs) -> Result<()> {
    let data_root = args.data_root.as_deref().unwrap_or(Path::new(RunConfig::DEFAULT_DATA_ROOT));
    let year_dir = data_root.join("SICAR").join(args.year.to_string());

    let folders = layer::inventory(&year_dir, args.latest)?;
    if folders.is_empty() {
        bail!("no state subdirectories in {}", year_dir.display());
    }

    let mut missing = 0;
    for folder in &folders {
        match folder.families.as_slice() {
            [] => {
                missing += 1;
                println!("MISSING  {}", folder.dir.display());
            }
            [family] => println!("ok       {}", family.display()),
            [first, rest @ ..] => {
                println!("ok       {} (+{} more, only the first is loaded)", first.display(), rest.len());
            }
        }
    }

    if missing > 0 {
        bail!("{missing} of {} folders in {} have no complete shapefile (.shp/.shx/.dbf)", folders.len(), year_dir.display());
    }
    log::info!("{} folders in {} are complete", folders.len(), year_dir.display());
    Ok(())
}
