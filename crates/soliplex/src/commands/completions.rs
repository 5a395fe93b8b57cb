//! list-completions command.

use anyhow::Result;
use console::Style;
use serde::Serialize;

use super::{Context, print_heading};

#[derive(Debug, Serialize)]
struct CompletionOutput {
    id: String,
    name: String,
    agent_id: String,
    model_name: Option<String>,
    tools: Vec<String>,
    config_path: String,
}

/// Run the list-completions command.
pub fn run(ctx: &Context) -> Result<()> {
    let installation = ctx.installation()?;
    let completions = installation.completion_configs()?;

    if ctx.json_output {
        let output: Vec<CompletionOutput> = completions
            .values()
            .map(|completion| CompletionOutput {
                id: completion.id.clone(),
                name: completion.name.clone(),
                agent_id: completion.agent.id.clone(),
                model_name: completion.agent.model_name.clone(),
                tools: completion.tools.keys().cloned().collect(),
                config_path: completion.config_path.display().to_string(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    print_heading("Configured completions");
    if completions.is_empty() {
        println!("{}", dim.apply_to("No completions found"));
    }
    for completion in completions.values() {
        println!("- {}: {}", completion.id, completion.name);
        if ctx.verbose {
            println!("    {} {}", dim.apply_to("path:"), completion.config_path.display());
        }
    }
    Ok(())
}
