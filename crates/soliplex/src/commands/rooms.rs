//! list-rooms command.

use anyhow::Result;
use console::Style;
use serde::Serialize;

use super::{Context, print_heading};

#[derive(Debug, Serialize)]
struct RoomOutput {
    id: String,
    name: String,
    description: String,
    agent_id: String,
    model_name: Option<String>,
    tools: Vec<String>,
    mcp_client_toolsets: Vec<String>,
    quizzes: Vec<String>,
    config_path: String,
}

/// Run the list-rooms command.
pub fn run(ctx: &Context) -> Result<()> {
    let installation = ctx.installation()?;

    let mut rooms: Vec<_> = installation.room_configs()?.into_values().collect();
    rooms.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));

    if ctx.json_output {
        let output: Vec<RoomOutput> = rooms
            .iter()
            .map(|room| RoomOutput {
                id: room.id.clone(),
                name: room.name.clone(),
                description: room.description.clone(),
                agent_id: room.agent.id.clone(),
                model_name: room.agent.model_name.clone(),
                tools: room.tools.keys().cloned().collect(),
                mcp_client_toolsets: room.mcp_client_toolsets.keys().cloned().collect(),
                quizzes: room.quizzes.iter().map(|q| q.id.clone()).collect(),
                config_path: room.config_path.display().to_string(),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    print_heading("Configured rooms");
    if rooms.is_empty() {
        println!("{}", dim.apply_to("No rooms found"));
    }
    for room in &rooms {
        println!("- {}: {}", room.id, room.name);
        if !room.tools.is_empty() {
            let tools: Vec<&str> = room.tools.keys().map(String::as_str).collect();
            println!("    {} {}", dim.apply_to("tools:"), tools.join(", "));
        }
        if !room.quizzes.is_empty() {
            let quizzes: Vec<&str> = room.quizzes.iter().map(|q| q.id.as_str()).collect();
            println!("    {} {}", dim.apply_to("quizzes:"), quizzes.join(", "));
        }
        if ctx.verbose {
            println!("    {} {}", dim.apply_to("path:"), room.config_path.display());
        }
    }
    Ok(())
}
