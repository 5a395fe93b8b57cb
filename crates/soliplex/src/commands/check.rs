//! check-config command - verifies secrets and environment resolve.

use anyhow::{Result, bail};
use console::Style;
use serde::Serialize;
use soliplex_config::{ConfigError, SecretError};

use super::{Context, print_heading};

#[derive(Debug, Serialize)]
struct CheckOutput {
    missing_secrets: Vec<String>,
    missing_environment: Vec<String>,
}

/// Run the check-config command.
pub fn run(ctx: &Context) -> Result<()> {
    let mut installation = ctx.installation()?;

    let mut failure_details = Vec::new();
    let missing_secrets = match installation.resolve_secrets() {
        Ok(()) => Vec::new(),
        Err(ConfigError::Secret(SecretError::SecretsNotFound {
            secret_names,
            failures,
        })) => {
            failure_details.extend(failures.iter().map(ToString::to_string));
            secret_names
        }
        Err(e) => return Err(e.into()),
    };

    let missing_environment = match installation.resolve_environment() {
        Ok(()) => Vec::new(),
        Err(ConfigError::MissingEnvVars { names }) => names,
        Err(e) => return Err(e.into()),
    };

    if ctx.json_output {
        let output = CheckOutput {
            missing_secrets: missing_secrets.clone(),
            missing_environment: missing_environment.clone(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let green = Style::new().green();

        if missing_secrets.is_empty() {
            println!("Secrets: {}", green.apply_to("OK"));
        } else {
            print_heading("Missing secrets");
            for name in &missing_secrets {
                println!("- {}", name);
            }
            if ctx.verbose {
                let dim = Style::new().dim();
                for detail in &failure_details {
                    println!("  {}", dim.apply_to(detail));
                }
            }
        }

        if missing_environment.is_empty() {
            println!("Environment variables: {}", green.apply_to("OK"));
        } else {
            print_heading("Missing environment variables");
            for name in &missing_environment {
                println!("- {}", name);
            }
        }
    }

    if !missing_secrets.is_empty() || !missing_environment.is_empty() {
        bail!(
            "configuration incomplete: {} missing secret(s), {} missing environment variable(s)",
            missing_secrets.len(),
            missing_environment.len()
        );
    }
    Ok(())
}
