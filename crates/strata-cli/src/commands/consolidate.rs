use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use strata::MemorySystem;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct ConsolidateCommand {
    #[clap(long, short, help = "Only consolidate if the system says it is due")]
    pub if_due: bool,
}

impl ConsolidateCommand {
    pub async fn execute(&self, system: &MemorySystem, format: OutputFormat) -> CliResult<()> {
        if self.if_due && !system.should_consolidate().await {
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::json!({ "status": "not_due" }));
                }
                OutputFormat::Table => println!("Consolidation is not due."),
            }
            return Ok(());
        }

        let Some(summary) = system.run_consolidation().await? else {
            return Err("A consolidation pass is already running".into());
        };

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
            OutputFormat::Table => {
                println!("Consolidation Results");
                println!("=====================\n");

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Tier", "Refreshed", "Promoted", "Candidates", "Recovered"]);

                for report in &summary.reports {
                    table.add_row([
                        report.tier.to_string(),
                        report.refreshed.to_string(),
                        report.promoted.to_string(),
                        report.promotion_candidates.len().to_string(),
                        report.recovered.to_string(),
                    ]);
                }

                println!("{table}\n");
                println!(
                    "Created {} fusions in {:.1}ms; load is now {:.1}%",
                    summary.fusions_created.len(),
                    summary.duration.as_secs_f64() * 1000.0,
                    summary.metrics.load_factor * 100.0
                );
            }
        }

        Ok(())
    }
}
