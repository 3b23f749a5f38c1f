use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use strata::{MemorySystem, TierWeights};

use crate::error::CliResult;
use crate::output::{OutputFormat, truncate_string};

#[derive(Parser)]
pub struct SearchCommand {
    #[clap(help = "Search query text")]
    pub query: String,

    #[clap(long, short, help = "Maximum results across all tiers")]
    pub limit: Option<usize>,

    #[clap(
        long,
        short,
        help = "Tier weights as veridical,semantic,episodic,fusion (e.g. 0.2,0.4,0.3,0.1)"
    )]
    pub weights: Option<String>,
}

impl SearchCommand {
    pub async fn execute(&self, system: &MemorySystem, format: OutputFormat) -> CliResult<()> {
        let weights = self.weights.as_deref().map(parse_weights).transpose()?;
        let result = system.search(&self.query, weights, self.limit).await;
        let hits = result.merged();

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "query": &result.query,
                    "weights": result.weights,
                    "processing_time_ms": result.processing_time.as_secs_f64() * 1000.0,
                    "results": hits,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if hits.is_empty() {
                    println!("No results for {:?}.", self.query);
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Tier", "ID", "Content", "Score", "Weighted"]);

                for hit in &hits {
                    table.add_row([
                        hit.node.tier().to_string(),
                        truncate_string(&hit.node.id().to_string(), 8),
                        truncate_string(&hit.content, 50),
                        format!("{:.3}", hit.score),
                        format!("{:.3}", hit.weighted_score),
                    ]);
                }

                println!("{table}");
                println!(
                    "\n{} results in {:.1}ms",
                    hits.len(),
                    result.processing_time.as_secs_f64() * 1000.0
                );
            }
        }

        Ok(())
    }
}

fn parse_weights(s: &str) -> CliResult<TierWeights> {
    let values = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| format!("Invalid weight {part:?}: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    match values.as_slice() {
        [veridical, semantic, episodic, fusion] => Ok(TierWeights {
            veridical: *veridical,
            semantic: *semantic,
            episodic: *episodic,
            fusion: *fusion,
        }),
        _ => Err(format!("Expected 4 comma-separated weights, got {}", values.len()).into()),
    }
}
