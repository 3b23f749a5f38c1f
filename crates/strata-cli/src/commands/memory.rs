use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use strata::MemorySystem;
use strata::memory::{
    ConceptKind, EpisodeKind, EpisodicNode, FactKind, MemoryNode, NodeRef, SemanticNode,
    StoredNode, TierKind, VerificationStatus, VeridicalNode,
};
use uuid::Uuid;

use crate::error::CliResult;
use crate::output::{OutputFormat, format_timestamp, truncate_string};

#[derive(Parser)]
pub struct MemoryCommand {
    #[clap(subcommand)]
    pub command: MemorySubcommand,
}

#[derive(Subcommand)]
pub enum MemorySubcommand {
    #[clap(about = "List nodes")]
    List(ListArgs),

    #[clap(about = "Show node details")]
    Show(ShowArgs),

    #[clap(about = "Add a node to a tier")]
    Add(AddArgs),

    #[clap(about = "Remove a node")]
    Remove(RemoveArgs),

    #[clap(about = "Record a verification outcome on a veridical node")]
    Verify(VerifyArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    #[clap(
        long,
        short,
        default_value = "20",
        help = "Maximum number of nodes to display"
    )]
    pub limit: usize,

    #[clap(
        long,
        short,
        help = "Filter by tier (veridical, semantic, episodic, fusion)"
    )]
    pub tier: Option<String>,
}

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(help = "Node reference (tier:uuid)")]
    pub node: String,
}

#[derive(Parser)]
pub struct AddArgs {
    #[clap(help = "Node content text")]
    pub text: String,

    #[clap(
        long,
        short,
        default_value = "veridical",
        help = "Tier to add to (veridical, semantic, episodic)"
    )]
    pub tier: String,

    #[clap(long, short, help = "Fact, concept or episode kind for the tier")]
    pub kind: Option<String>,

    #[clap(long, short, help = "Importance between 0.0 and 1.0")]
    pub importance: Option<f32>,

    #[clap(long = "participant", help = "Episode participant (repeatable)")]
    pub participants: Vec<String>,

    #[clap(long, help = "Episode location")]
    pub location: Option<String>,
}

#[derive(Parser)]
pub struct RemoveArgs {
    #[clap(help = "Node reference to remove (tier:uuid)")]
    pub node: String,
}

#[derive(Parser)]
pub struct VerifyArgs {
    #[clap(help = "Veridical node ID (UUID format)")]
    pub id: String,

    #[clap(help = "Verification status (verified, conflicted, deprecated, unverified)")]
    pub status: String,
}

impl MemoryCommand {
    pub async fn execute(&self, system: &MemorySystem, format: OutputFormat) -> CliResult<()> {
        match &self.command {
            MemorySubcommand::List(args) => Self::list(system, args, format).await,
            MemorySubcommand::Show(args) => Self::show(system, args, format).await,
            MemorySubcommand::Add(args) => Self::add(system, args, format).await,
            MemorySubcommand::Remove(args) => Self::remove(system, args, format).await,
            MemorySubcommand::Verify(args) => Self::verify(system, args, format).await,
        }
    }

    async fn list(system: &MemorySystem, args: &ListArgs, format: OutputFormat) -> CliResult<()> {
        let tiers: Vec<TierKind> = match args.tier.as_deref() {
            Some(tier) => vec![tier.parse()?],
            None => vec![
                TierKind::Veridical,
                TierKind::Semantic,
                TierKind::Episodic,
                TierKind::Fusion,
            ],
        };

        let mut nodes = Vec::new();
        for tier in tiers {
            nodes.extend(tier_nodes(system, tier).await);
        }
        nodes.sort_by(|a, b| b.core().created_at.cmp(&a.core().created_at));
        nodes.truncate(args.limit);

        match format {
            OutputFormat::Json => {
                let output: Vec<_> = nodes
                    .iter()
                    .map(|n| {
                        let core = n.core();
                        serde_json::json!({
                            "id": core.id.to_string(),
                            "tier": n.tier().as_str(),
                            "content": &core.content,
                            "importance": core.importance,
                            "strength": core.strength,
                            "access_count": core.access_count,
                            "created_at": core.created_at.to_rfc3339(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                if nodes.is_empty() {
                    println!("No nodes found.");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header([
                        "ID",
                        "Tier",
                        "Content",
                        "Importance",
                        "Strength",
                        "Accesses",
                        "Created",
                    ]);

                for node in &nodes {
                    let core = node.core();
                    table.add_row([
                        truncate_string(&core.id.to_string(), 8),
                        node.tier().to_string(),
                        truncate_string(&core.content, 50),
                        format!("{:.2}", core.importance),
                        format!("{:.2}", core.strength),
                        core.access_count.to_string(),
                        format_timestamp(&core.created_at),
                    ]);
                }

                println!("{table}");
                println!("\nTotal: {} nodes", nodes.len());
            }
        }

        Ok(())
    }

    async fn show(system: &MemorySystem, args: &ShowArgs, format: OutputFormat) -> CliResult<()> {
        let node_ref: NodeRef = args.node.parse()?;
        let node = system
            .get(node_ref)
            .await
            .ok_or_else(|| format!("Node not found: {node_ref}"))?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&node)?);
            }
            OutputFormat::Table => {
                let core = node.core();
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Field", "Value"]);

                table.add_row(["ID", &core.id.to_string()]);
                table.add_row(["Tier", node.tier().as_str()]);
                table.add_row(["Content", &core.content]);
                table.add_row(["Importance", &format!("{:.3}", core.importance)]);
                table.add_row(["Strength", &format!("{:.3}", core.strength)]);
                table.add_row(["Access Count", &core.access_count.to_string()]);
                table.add_row([
                    "Consolidation Score",
                    &format!("{:.3}", core.consolidation_score),
                ]);
                table.add_row(["Connections", &core.connections.len().to_string()]);
                table.add_row(["Created", &format_timestamp(&core.created_at)]);
                table.add_row(["Last Accessed", &format_timestamp(&core.last_accessed)]);

                for (field, value) in tier_fields(&node) {
                    table.add_row([field, &value]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }

    async fn add(system: &MemorySystem, args: &AddArgs, format: OutputFormat) -> CliResult<()> {
        let tier: TierKind = args.tier.parse()?;
        let kind = args.kind.as_deref();

        let id = match tier {
            TierKind::Veridical => {
                let mut node = VeridicalNode::new(&args.text, parse_fact_kind(kind)?);
                if let Some(importance) = args.importance {
                    node = node.with_importance(importance);
                }
                system.add_veridical(node).await?
            }
            TierKind::Semantic => {
                let mut node = SemanticNode::new(&args.text, parse_concept_kind(kind)?);
                if let Some(importance) = args.importance {
                    node = node.with_importance(importance);
                }
                system.add_semantic(node).await?
            }
            TierKind::Episodic => {
                let mut node = EpisodicNode::new(&args.text, parse_episode_kind(kind)?)
                    .with_participants(args.participants.iter().cloned());
                if let Some(importance) = args.importance {
                    node = node.with_importance(importance);
                }
                if let Some(location) = &args.location {
                    node = node.with_location(location);
                }
                system.add_episodic(node).await?
            }
            TierKind::Fusion => {
                return Err("Fusion nodes are created with the fuse command".into());
            }
        };
        let node_ref = NodeRef::new(tier, id);

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "status": "added",
                    "node": node_ref.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Added {node_ref}");
            }
        }

        Ok(())
    }

    async fn remove(
        system: &MemorySystem,
        args: &RemoveArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let node_ref: NodeRef = args.node.parse()?;
        system.remove(node_ref).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "status": "removed",
                    "node": node_ref.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Removed {node_ref}");
            }
        }

        Ok(())
    }

    async fn verify(
        system: &MemorySystem,
        args: &VerifyArgs,
        format: OutputFormat,
    ) -> CliResult<()> {
        let id = Uuid::parse_str(&args.id).map_err(|e| format!("Invalid UUID format: {e}"))?;
        let status = parse_verification_status(&args.status)?;
        system.verify(id, status).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "status": "verified",
                    "id": id.to_string(),
                    "verification": format!("{status:?}"),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Marked veridical:{id} as {status:?}");
            }
        }

        Ok(())
    }
}

async fn tier_nodes(system: &MemorySystem, tier: TierKind) -> Vec<StoredNode> {
    match tier {
        TierKind::Veridical => stored(system.veridical().nodes().await),
        TierKind::Semantic => stored(system.semantic().nodes().await),
        TierKind::Episodic => stored(system.episodic().nodes().await),
        TierKind::Fusion => stored(system.fusion().nodes().await),
    }
}

fn stored<N: MemoryNode>(nodes: Vec<N>) -> Vec<StoredNode> {
    nodes.into_iter().map(MemoryNode::into_stored).collect()
}

fn tier_fields(node: &StoredNode) -> Vec<(&'static str, String)> {
    match node {
        StoredNode::Veridical(n) => vec![
            ("Fact Kind", format!("{:?}", n.fact_kind)),
            ("Verification", format!("{:?}", n.verification)),
            ("Immediacy", format!("{:.3}", n.immediacy)),
        ],
        StoredNode::Semantic(n) => vec![
            ("Concept Kind", format!("{:?}", n.concept_kind)),
            ("Abstraction Level", n.abstraction_level.to_string()),
            ("Confidence", format!("{:.3}", n.confidence)),
            ("Evidence", n.evidence_node_ids.len().to_string()),
            ("Contradictions", n.contradiction_node_ids.len().to_string()),
        ],
        StoredNode::Episodic(n) => vec![
            ("Episode Kind", format!("{:?}", n.episode_kind)),
            (
                "Participants",
                n.participants.iter().cloned().collect::<Vec<_>>().join(", "),
            ),
            ("Location", n.location.clone().unwrap_or_else(|| "-".to_string())),
            ("Vividness", format!("{:.3}", n.vividness)),
            ("Emotional Valence", format!("{:.2}", n.emotional_valence)),
        ],
        StoredNode::Fusion(n) => vec![
            ("Fusion Kind", format!("{:?}", n.fusion_kind)),
            (
                "Sources",
                n.source_nodes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            ("Coherence", format!("{:.3}", n.coherence)),
            ("Novelty", format!("{:.3}", n.novelty)),
            ("Validation", format!("{:?}", n.validation)),
        ],
    }
}

pub fn parse_fact_kind(kind: Option<&str>) -> CliResult<FactKind> {
    match kind {
        None | Some("statement") => Ok(FactKind::Statement),
        Some("observation") => Ok(FactKind::Observation),
        Some("measurement") => Ok(FactKind::Measurement),
        Some("event") => Ok(FactKind::Event),
        Some("condition") => Ok(FactKind::Condition),
        Some(k) => Err(format!(
            "Unknown fact kind: {k}. Use statement, observation, measurement, event, or condition."
        )
        .into()),
    }
}

pub fn parse_concept_kind(kind: Option<&str>) -> CliResult<ConceptKind> {
    match kind {
        None | Some("entity") => Ok(ConceptKind::Entity),
        Some("relationship") => Ok(ConceptKind::Relationship),
        Some("category") => Ok(ConceptKind::Category),
        Some("attribute") => Ok(ConceptKind::Attribute),
        Some("process") => Ok(ConceptKind::Process),
        Some("rule") => Ok(ConceptKind::Rule),
        Some("principle") => Ok(ConceptKind::Principle),
        Some(k) => Err(format!(
            "Unknown concept kind: {k}. Use entity, relationship, category, attribute, process, rule, or principle."
        )
        .into()),
    }
}

pub fn parse_episode_kind(kind: Option<&str>) -> CliResult<EpisodeKind> {
    match kind {
        None | Some("event") => Ok(EpisodeKind::Event),
        Some("interaction") => Ok(EpisodeKind::Interaction),
        Some("experience") => Ok(EpisodeKind::Experience),
        Some("conversation") => Ok(EpisodeKind::Conversation),
        Some("observation") => Ok(EpisodeKind::Observation),
        Some("decision") => Ok(EpisodeKind::Decision),
        Some(k) => Err(format!(
            "Unknown episode kind: {k}. Use event, interaction, experience, conversation, observation, or decision."
        )
        .into()),
    }
}

pub fn parse_verification_status(status: &str) -> CliResult<VerificationStatus> {
    match status {
        "verified" => Ok(VerificationStatus::Verified),
        "conflicted" => Ok(VerificationStatus::Conflicted),
        "deprecated" => Ok(VerificationStatus::Deprecated),
        "unverified" => Ok(VerificationStatus::Unverified),
        s => Err(format!(
            "Unknown verification status: {s}. Use verified, conflicted, deprecated, or unverified."
        )
        .into()),
    }
}
