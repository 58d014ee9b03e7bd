use std::path::PathBuf;

/// Parcel change detection CLI (argument schema only)
#[derive(clap::Parser, Debug)]
#[command(name = "parceldrift", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Compare two survey years against the reference areas and write the outputs
    Run(RunArgs),

    /// Check which folders of a year directory hold a complete shapefile
    Inspect(InspectArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// First survey year (order does not matter)
    pub year1: String,

    /// Second survey year
    pub year2: String,

    /// Year of the latest snapshot, stored as one subdirectory per state
    pub latest: String,

    /// Data root holding SICAR/{year} and PRODES/, defaults to "./data"
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub data_root: Option<PathBuf>,

    /// Reference polygon file, defaults to "{data_root}/PRODES/prodes_amazonia_nb.gpkg"
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub reference: Option<PathBuf>,

    /// Identifier field of the reference file, defaults to "uuid"
    #[arg(long)]
    pub reference_id_field: Option<String>,

    /// Directory receiving timestamped run outputs, defaults to "./outputs"
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub outputs: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// Year to inspect
    pub year: u32,

    /// Expect one subdirectory per state
    #[arg(long)]
    pub latest: bool,

    /// Data root holding SICAR/{year}, defaults to "./data"
    #[arg(long, value_hint = clap::ValueHint::DirPath)]
    pub data_root: Option<PathBuf>,
}
