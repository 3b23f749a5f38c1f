use clap::{Parser, Subcommand};
use strata::MemorySystem;
use strata::memory::{FusionKind, NodeRef, ValidationStatus};
use uuid::Uuid;

use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct FuseCommand {
    #[clap(subcommand)]
    pub command: FuseSubcommand,
}

#[derive(Subcommand)]
pub enum FuseSubcommand {
    #[clap(about = "Fuse two or more existing nodes")]
    Create(CreateArgs),

    #[clap(about = "Scan veridical and semantic nodes for pairs worth fusing")]
    Discover,

    #[clap(about = "Record a validation outcome on a fusion")]
    Validate(ValidateArgs),
}

#[derive(Parser)]
pub struct CreateArgs {
    #[clap(help = "Fusion content text")]
    pub content: String,

    #[clap(
        long = "source",
        short,
        required = true,
        help = "Source node reference (tier:uuid), repeat for each source"
    )]
    pub sources: Vec<String>,

    #[clap(
        long,
        short,
        default_value = "cross-layer",
        help = "Fusion kind (cross-layer, within-layer, temporal, causal, analogical, conceptual)"
    )]
    pub kind: String,
}

#[derive(Parser)]
pub struct ValidateArgs {
    #[clap(help = "Fusion node ID (UUID format)")]
    pub id: String,

    #[clap(help = "Validation status (validated, rejected, uncertain)")]
    pub status: String,
}

impl FuseCommand {
    pub async fn execute(&self, system: &MemorySystem, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            FuseSubcommand::Create(args) => Self::create(system, args, format).await,
            FuseSubcommand::Discover => Self::discover(system, format).await,
            FuseSubcommand::Validate(args) => Self::validate(system, args, format).await,
        }
    }

    async fn create(
        system: &MemorySystem,
        args: &CreateArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let sources = args
            .sources
            .iter()
            .map(|s| s.parse::<NodeRef>())
            .collect::<Result<Vec<_>, _>>()?;
        let kind = parse_fusion_kind(&args.kind)?;

        let id = system.create_fusion(sources, kind, &args.content).await?;
        let node_ref = NodeRef::Fusion(id);

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "status": "created",
                    "node": node_ref.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Created {node_ref}");
            }
        }

        Ok(())
    }

    async fn discover(system: &MemorySystem, format: OutputFormat) -> CliResult<()> {
        let created = system.identify_fusion_opportunities().await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "created": created.iter().map(|id| NodeRef::Fusion(*id).to_string()).collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if created.is_empty() {
                    println!("No new fusion opportunities found.");
                } else {
                    for id in &created {
                        println!("Created {}", NodeRef::Fusion(*id));
                    }
                    println!("\nTotal: {} fusions", created.len());
                }
            }
        }

        Ok(())
    }

    async fn validate(
        system: &MemorySystem,
        args: &ValidateArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let id = Uuid::parse_str(&args.id).map_err(|e| format!("Invalid UUID format: {e}"))?;
        let status = parse_validation_status(&args.status)?;
        system.validate_fusion(id, status).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "status": "validated",
                    "id": id.to_string(),
                    "validation": format!("{status:?}"),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Marked fusion:{id} as {status:?}");
            }
        }

        Ok(())
    }
}

pub fn parse_fusion_kind(kind: &str) -> CliResult<FusionKind> {
    match kind {
        "cross-layer" => Ok(FusionKind::CrossLayer),
        "within-layer" => Ok(FusionKind::WithinLayer),
        "temporal" => Ok(FusionKind::Temporal),
        "causal" => Ok(FusionKind::Causal),
        "analogical" => Ok(FusionKind::Analogical),
        "conceptual" => Ok(FusionKind::Conceptual),
        k => Err(format!(
            "Unknown fusion kind: {k}. Use cross-layer, within-layer, temporal, causal, analogical, or conceptual."
        )
        .into()),
    }
}

pub fn parse_validation_status(status: &str) -> CliResult<ValidationStatus> {
    match status {
        "validated" => Ok(ValidationStatus::Validated),
        "rejected" => Ok(ValidationStatus::Rejected),
        "uncertain" => Ok(ValidationStatus::Uncertain),
        s => Err(format!("Unknown validation status: {s}. Use validated, rejected, or uncertain.").into()),
    }
}
