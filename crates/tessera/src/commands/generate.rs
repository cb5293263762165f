//! Generate command - prints fresh session identifiers.

use anyhow::{Result, bail};
use clap::Args;
use tessera_session::generate_identifier;

use super::Context;

/// Arguments for the generate-id command.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Number of identifiers to print
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,
}

/// Run the generate-id command.
pub fn run(args: GenerateArgs, ctx: &Context) -> Result<()> {
    if args.count == 0 {
        bail!("--count must be at least 1");
    }

    let ids: Vec<String> = (0..args.count).map(|_| generate_identifier()).collect();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&ids)?);
    } else {
        for id in ids {
            println!("{id}");
        }
    }
    Ok(())
}
