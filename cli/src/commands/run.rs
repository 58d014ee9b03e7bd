use std::path::Path;

use anyhow::Result;
use parceldrift::{RunConfig, SurveyYears};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::RunArgs) -> Result<()> {
    let years = SurveyYears::parse(&args.year1, &args.year2, &args.latest)?;
    let data_root = args.data_root.as_deref().unwrap_or(Path::new(RunConfig::DEFAULT_DATA_ROOT));

    let mut config = RunConfig::new(years, data_root);
    if let Some(reference) = &args.reference {
        config = config.with_reference(reference.clone());
    }
    if let Some(field) = &args.reference_id_field {
        config = config.with_reference_id_field(field.as_str());
    }
    if let Some(outputs) = &args.outputs {
        config = config.with_outputs_root(outputs.clone());
    }

    let summary = parceldrift::run(&config)?;
    log::info!("{summary}");
    println!("{}", summary.output_dir.display());

    Ok(())
}
