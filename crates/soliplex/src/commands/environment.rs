//! list-environment command - shows declared environment values.

use anyhow::Result;
use console::Style;

use super::{Context, print_heading};

/// Run the list-environment command.
pub fn run(ctx: &Context) -> Result<()> {
    let installation = ctx.installation()?;
    let declared = installation.declared_environment();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(declared)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    print_heading("Configured environment variables");
    for entry in declared {
        match &entry.value {
            Some(value) => println!("- {}: {}", entry.name, value),
            None => println!("- {}: {}", entry.name, dim.apply_to("(from .env or process)")),
        }
    }
    Ok(())
}
