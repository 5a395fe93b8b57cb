//! list-secrets command.

use anyhow::Result;
use console::Style;
use serde::Serialize;

use super::{Context, print_heading};

#[derive(Debug, Serialize)]
struct SecretOutput {
    secret_name: String,
    sources: Vec<SourceOutput>,
}

#[derive(Debug, Serialize)]
struct SourceOutput {
    kind: &'static str,
    description: String,
}

/// Run the list-secrets command.
pub fn run(ctx: &Context) -> Result<()> {
    let installation = ctx.installation()?;

    if ctx.json_output {
        let output: Vec<SecretOutput> = installation
            .secrets
            .iter()
            .map(|secret| SecretOutput {
                secret_name: secret.secret_name.clone(),
                sources: secret
                    .sources()
                    .iter()
                    .map(|source| SourceOutput {
                        kind: source.kind(),
                        description: source.describe(),
                    })
                    .collect(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    print_heading("Configured secrets");
    for secret in &installation.secrets {
        println!("- {}", secret.secret_name);
        for source in secret.sources() {
            println!("    {}", dim.apply_to(source.describe()));
        }
    }
    Ok(())
}
