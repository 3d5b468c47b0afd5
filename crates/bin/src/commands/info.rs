//! Engine state info command - shows record counts from a persisted state.

use concord::backend::{Backend, InMemory};

use crate::cli::InfoArgs;
use crate::output::OutputFormat;

/// Run the info command
pub async fn run(args: &InfoArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let backend = InMemory::load_from_file(&args.state)?;
    let counts = backend.counts().await?;

    match format {
        OutputFormat::Human => {
            println!("State file:       {}", args.state.display());
            println!("Elements:         {}", counts.elements);
            println!("Edits:            {}", counts.edits);
            println!("Open conflicts:   {}", counts.open_conflicts);
            println!("Resolutions:      {}", counts.resolutions);
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "state": args.state.display().to_string(),
                "elements": counts.elements,
                "edits": counts.edits,
                "open_conflicts": counts.open_conflicts,
                "resolutions": counts.resolutions,
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    Ok(())
}
