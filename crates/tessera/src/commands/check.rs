//! Check command - loads configuration and reports the active backend.

use std::time::Duration;

use anyhow::{Result, bail};
use clap::Args;
use console::{Style, style};
use serde::Serialize;
use serde_json::json;
use tessera_session::{Manager, MemoryCarrier};

use super::Context;
use crate::setup;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Write, read back and destroy a throwaway session on the active backend
    #[arg(long)]
    pub probe: bool,
}

/// Check result for JSON output.
#[derive(Debug, Serialize)]
struct CheckOutput {
    requested_backend: String,
    active_backend: String,
    fallback: bool,
    cookie_name: String,
    idle_secs: u64,
    registered: Vec<String>,
    probe: Option<bool>,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let config = setup::load(ctx)?;
    let backends = setup::backends(&config)?;
    let manager_config = setup::manager_config(config.session.as_ref());

    let manager = Manager::new(&backends, manager_config).await?;

    let probe_ok = if args.probe {
        Some(probe(&manager).await?)
    } else {
        None
    };

    let output = CheckOutput {
        requested_backend: manager.config().backend.clone(),
        active_backend: manager.backend_name().to_string(),
        fallback: manager.is_fallback(),
        cookie_name: manager.config().cookie_name.clone(),
        idle_secs: manager.config().idle.as_secs(),
        registered: backends.names(),
        probe: probe_ok,
    };

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_human(&output, ctx.verbose);
    }

    if probe_ok == Some(false) {
        bail!("probe session did not read back what was written");
    }
    Ok(())
}

/// Round-trip a value through a fresh session, then destroy it.
async fn probe(manager: &Manager) -> Result<bool> {
    let mut request = MemoryCarrier::new();
    let session = manager.start_session(&mut request);
    let expected = json!({"probe": true, "n": 42});
    session.set("probe", expected.clone()).await?;

    let mut request = request.follow_up();
    let session = manager.start_session(&mut request);
    let ok = session.get("probe").await? == Some(expected);

    let mut request = request.follow_up();
    manager.destroy_session(&mut request).await;
    Ok(ok)
}

fn print_human(output: &CheckOutput, verbose: bool) {
    let green = Style::new().green();
    let yellow = Style::new().yellow();
    let red = Style::new().red();
    let dim = Style::new().dim();

    println!();
    println!("{}", style("Tessera Session Check").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();

    let active = if output.fallback {
        yellow.apply_to(format!(
            "● {} (fallback from {})",
            output.active_backend, output.requested_backend
        ))
    } else {
        green.apply_to(format!("● {}", output.active_backend))
    };
    println!("  {} {}", dim.apply_to("Backend:"), active);
    println!("  {} {}", dim.apply_to("Cookie:"), output.cookie_name);
    println!(
        "  {} {}",
        dim.apply_to("Idle:"),
        humanize(Duration::from_secs(output.idle_secs))
    );

    match output.probe {
        Some(true) => println!("  {} {}", dim.apply_to("Probe:"), green.apply_to("ok")),
        Some(false) => println!("  {} {}", dim.apply_to("Probe:"), red.apply_to("mismatch")),
        None => {}
    }

    if verbose {
        println!(
            "  {} {}",
            dim.apply_to("Registered:"),
            output.registered.join(", ")
        );
    }
    println!();
}

fn humanize(d: Duration) -> String {
    let secs = d.as_secs();
    if secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
