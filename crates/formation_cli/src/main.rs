//! Formation CLI
//!
//! 스냅샷 저장소 위에서 포메이션 생성/배정/최적화/분석

#[cfg(feature = "cli")]
use anyhow::{Context, Result};
#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use formation_core::{
    AssignOptions, CancelToken, EntityId, FileSnapshotStore, Formation, FormationId, FormationTemplate,
    MoveRequest, ParticipantId, Position, SnapshotStore,
};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "formation_cli")]
#[command(about = "Edit tactical formations stored as snapshots", long_about = None)]
struct Cli {
    /// Snapshot directory
    #[arg(long, global = true, default_value = "formations")]
    store: PathBuf,

    /// Editor config (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Author recorded in history
    #[arg(long, global = true, default_value = "cli")]
    author: String,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Create an empty formation from a template
    New {
        /// Template code (e.g., "4-3-3")
        #[arg(long, default_value = "4-4-2")]
        template: String,

        #[arg(long)]
        name: String,
    },

    /// Fill the slots from the roster
    Assign {
        #[arg(long)]
        id: String,

        /// Roster CSV file
        #[arg(long)]
        roster: PathBuf,

        /// Leave already-filled slots alone
        #[arg(long, default_value = "false")]
        keep_existing: bool,
    },

    /// Move one entity
    Move {
        #[arg(long)]
        id: String,

        #[arg(long)]
        roster: PathBuf,

        #[arg(long)]
        entity: u32,

        #[arg(long)]
        x: f32,

        #[arg(long)]
        y: f32,

        /// Snap to the nearest free template anchor
        #[arg(long, default_value = "false")]
        snap: bool,
    },

    /// Search for a better layout and commit it
    Optimize {
        #[arg(long)]
        id: String,

        #[arg(long)]
        roster: PathBuf,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        iterations: Option<u32>,

        /// Report only, do not commit
        #[arg(long, default_value = "false")]
        dry_run: bool,
    },

    /// Print tactical metrics as JSON
    Analyze {
        #[arg(long)]
        id: String,

        #[arg(long)]
        roster: PathBuf,
    },

    /// Print the chemistry between two entities
    Chemistry {
        #[arg(long)]
        id: String,

        #[arg(long)]
        roster: PathBuf,

        #[arg(long)]
        a: u32,

        #[arg(long)]
        b: u32,
    },

    /// Print the formation record (or its JSON schema)
    Snapshot {
        #[arg(long)]
        id: Option<String>,

        #[arg(long, default_value = "false")]
        schema: bool,
    },
}

#[cfg(feature = "cli")]
fn parse_id(id: &str) -> Result<FormationId> {
    Ok(id.parse::<FormationId>()?)
}

#[cfg(feature = "cli")]
fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = formation_cli::load_config(cli.config.as_deref())?;
    let author = ParticipantId::new(cli.author.clone());

    match cli.command {
        Commands::New { template, name } => {
            let template = FormationTemplate::from_code(&template)
                .with_context(|| format!("Unknown template '{}'", template))?;
            let formation = Formation::from_template(name, template);
            FileSnapshotStore::new(&cli.store).save(&formation)?;
            println!("✅ Created {} ({})", formation.id, template.code());
        }

        Commands::Assign { id, roster, keep_existing } => {
            let mut editor = formation_cli::open_editor(&cli.store, parse_id(&id)?, &roster, config)?;
            let outcome = editor.auto_assign(&AssignOptions { keep_existing }, None, &author)?;
            println!("✅ Assigned {} slots (revision {})", outcome.result.plan.assignments.len(), editor.revision());
            println!("   Total score: {:.3}", outcome.result.plan.total_score);
            if !outcome.result.benched.is_empty() {
                println!("   Benched:     {:?}", outcome.result.benched);
            }
        }

        Commands::Move { id, roster, entity, x, y, snap } => {
            let mut editor = formation_cli::open_editor(&cli.store, parse_id(&id)?, &roster, config)?;
            let target = Position::new(x, y);
            let request =
                if snap { MoveRequest::snap(EntityId(entity), target) } else { MoveRequest::free(EntityId(entity), target) };
            let outcome = editor.propose_move(&request, &author)?;
            println!("{}", serde_json::to_string_pretty(&outcome.result)?);
        }

        Commands::Optimize { id, roster, seed, iterations, dry_run } => {
            if let Some(seed) = seed {
                config.optimizer.seed = seed;
            }
            if let Some(iterations) = iterations {
                config.optimizer.max_iterations = iterations;
            }
            let mut editor = formation_cli::open_editor(&cli.store, parse_id(&id)?, &roster, config)?;
            println!("🔨 Optimizing...");
            let result = editor.optimize(&CancelToken::new())?;
            println!("   Score:      {:.4} → {:.4}", result.start_score, result.best_score);
            println!("   Iterations: {}", result.iterations);
            println!("   Status:     {:?}{}", result.status, if result.partial { " (partial)" } else { "" });
            if dry_run {
                return Ok(());
            }
            match editor.commit_optimization(&result, &author)? {
                Some(_) => println!("✅ Committed at revision {}", editor.revision()),
                None => println!("No improvement, nothing committed"),
            }
        }

        Commands::Analyze { id, roster } => {
            let editor = formation_cli::open_editor(&cli.store, parse_id(&id)?, &roster, config)?;
            println!("{}", serde_json::to_string_pretty(&editor.analyze())?);
        }

        Commands::Chemistry { id, roster, a, b } => {
            let editor = formation_cli::open_editor(&cli.store, parse_id(&id)?, &roster, config)?;
            let edge = editor.chemistry_between(EntityId(a), EntityId(b))?;
            println!("{}", serde_json::to_string_pretty(&edge)?);
        }

        Commands::Snapshot { id, schema } => {
            if schema {
                println!("{}", formation_core::api::formation_record_schema());
                return Ok(());
            }
            let id = id.context("--id is required unless --schema is given")?;
            let formation = FileSnapshotStore::new(&cli.store).load(parse_id(&id)?)?;
            println!("{}", serde_json::to_string_pretty(&formation.to_record())?);
        }
    }

    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("formation_cli is not available. Enable the 'cli' feature to use it.");
    std::process::exit(1);
}
