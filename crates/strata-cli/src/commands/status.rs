use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use strata::MemorySystem;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp};

#[derive(Parser)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, system: &MemorySystem, format: OutputFormat) -> CliResult<()> {
        let status = system.get_system_status().await;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&status)?);
            }
            OutputFormat::Table => {
                let metrics = &status.metrics;
                println!("Strata Status");
                println!("=============\n");

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Tier", "Nodes", "Capacity"]);

                table.add_row([
                    "Veridical",
                    &metrics.veridical_nodes.to_string(),
                    &system.veridical().capacity().to_string(),
                ]);
                table.add_row([
                    "Semantic",
                    &metrics.semantic_nodes.to_string(),
                    &system.semantic().capacity().to_string(),
                ]);
                table.add_row([
                    "Episodic",
                    &metrics.episodic_nodes.to_string(),
                    &system.episodic().capacity().to_string(),
                ]);
                table.add_row([
                    "Fusion",
                    &metrics.fusion_nodes.to_string(),
                    &system.fusion().capacity().to_string(),
                ]);

                println!("{table}\n");

                println!(
                    "Total: {} of {} nodes (load {:.1}%, efficiency {:.1}%)",
                    metrics.total_nodes,
                    metrics.total_capacity,
                    metrics.load_factor * 100.0,
                    metrics.memory_efficiency * 100.0
                );
                println!(
                    "Health: {}",
                    if status.is_healthy { "healthy" } else { "needs attention" }
                );
                match &status.last_consolidation_at {
                    Some(at) => println!(
                        "Last consolidation: {} ({} runs)",
                        format_timestamp(at),
                        status.consolidation_count
                    ),
                    None => println!("Last consolidation: never"),
                }
                if let Some(error) = &status.last_error {
                    println!("Last error: {error}");
                }

                if !status.recommended_actions.is_empty() {
                    println!("\nRecommended actions:");
                    for action in &status.recommended_actions {
                        println!("  - {action}");
                    }
                }
            }
        }

        Ok(())
    }
}
