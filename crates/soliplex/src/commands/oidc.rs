//! list-oidc command.

use anyhow::Result;
use console::Style;

use super::{Context, print_heading};

/// Run the list-oidc command.
pub fn run(ctx: &Context) -> Result<()> {
    let installation = ctx.installation()?;
    let systems = installation.oidc_auth_system_configs()?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(systems.as_ref())?);
        return Ok(());
    }

    let dim = Style::new().dim();
    print_heading("Configured OIDC auth systems");
    if systems.is_empty() {
        println!("{}", dim.apply_to("No auth systems configured (authentication disabled)"));
    }
    for system in systems.iter() {
        println!("- {}: {}", system.id, system.title);
        println!("    {} {}", dim.apply_to("server:"), system.server_url);
    }
    Ok(())
}
