use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use serde::Serialize;

use section_memory::config::AppConfig;
use section_memory::detect_sections;
use section_memory::domain::entities::edit::EditOperation;
use section_memory::domain::entities::section::SectionDraft;
use section_memory::domain::fingerprint::grid_fingerprint;
use section_memory::infra::import::loader::FileGridSource;
use section_memory::infra::sqlite::repo::SqliteRepo;
use section_memory::usecase::ports::collaborators::{GridSource, ReplaySynthesizer};
use section_memory::usecase::ports::repo::RuleRepository;
use section_memory::usecase::services::confirm_service::{ConfirmRequest, ConfirmService};
use section_memory::usecase::services::edit_service::{EditRequest, EditService};
use section_memory::usecase::services::history_service::HistoryService;
use section_memory::usecase::services::learning_service::LearningService;
use section_memory::usecase::services::preview_service::PreviewService;
use section_memory::usecase::services::session_service::SessionSectionsService;

#[derive(Parser, Debug)]
#[command(name = "section-memory", version, about = "Detect and remember spreadsheet sections")]
struct Cli {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect sections without touching the rule memory
    Detect {
        file: String,
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Open a session with the best available sections
    Preview {
        file: String,
        #[arg(long)]
        sheet: Option<String>,
        #[arg(long)]
        user: Option<String>,
    },
    /// Apply one structured edit, e.g. '{"op":"rename_section","id":"S1","label":"Parts"}'
    Edit {
        session: String,
        operation: String,
        #[arg(long)]
        confidence: Option<f64>,
    },
    /// Finalize a session and learn from it
    Confirm {
        session: String,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        sheet: Option<String>,
        /// JSON array of sections; the session preview when omitted
        #[arg(long)]
        sections: Option<String>,
    },
    /// Inspect or maintain a session's sections
    Sections {
        session: String,
        #[command(subcommand)]
        action: Option<SectionsAction>,
    },
    /// Show or reset a user's history
    History {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        reset: bool,
    },
    /// Delete idle sessions
    Sweep {
        #[arg(long)]
        ttl_hours: Option<u64>,
    },
}

#[derive(Subcommand, Debug)]
enum SectionsAction {
    /// Replace all sections with a JSON array
    Replace { sections: String },
    /// Append one JSON section
    Add { section: String },
    /// Remove the section at a 0-based index
    Delete { index: usize },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    debug!("using database {}", config.db_path.display());

    run(cli.command, &config)
}

fn run(command: Command, config: &AppConfig) -> Result<()> {
    let grids: Arc<dyn GridSource> = Arc::new(FileGridSource);

    if let Command::Detect { file, sheet } = &command {
        let grid = grids.load_grid(file, sheet.as_deref())?;
        return print_json(&serde_json::json!({
            "fingerprint": grid_fingerprint(&grid, sheet.as_deref()),
            "nrows": grid.nrows(),
            "sections": detect_sections(&grid),
        }));
    }

    let repo = Arc::new(SqliteRepo::new(config.db_path.clone()));
    repo.init()?;

    let learning = Arc::new(LearningService::new(
        repo.clone(),
        config.promotion_policy(),
        config.default_user.as_str(),
    ));
    let history = Arc::new(HistoryService::new(repo.clone()));

    match command {
        Command::Detect { .. } => Ok(()),
        Command::Preview { file, sheet, user } => {
            let service = PreviewService::new(grids, repo, learning);
            let user = user.unwrap_or_else(|| config.default_user.clone());
            print_json(&service.preview(&user, &file, sheet.as_deref())?)
        }
        Command::Edit {
            session,
            operation,
            confidence,
        } => {
            let operation: EditOperation =
                serde_json::from_str(&operation).context("failed to parse edit operation")?;
            let service = EditService::new(repo, learning, history, config.default_confidence);
            print_json(&service.apply(
                &session,
                EditRequest {
                    operation,
                    confidence,
                },
            )?)
        }
        Command::Confirm {
            session,
            user,
            sheet,
            sections,
        } => {
            let sections = sections
                .map(|raw| parse_drafts(&raw))
                .transpose()?;
            let service = ConfirmService::new(
                grids,
                repo,
                learning,
                history,
                Arc::new(ReplaySynthesizer),
            );
            print_json(&service.confirm(ConfirmRequest {
                session_id: session,
                user_id: user,
                sheet_name: sheet,
                sections,
            })?)
        }
        Command::Sections { session, action } => {
            let service = SessionSectionsService::new(repo);
            let sections = match action {
                None => service.working_sections(&session)?,
                Some(SectionsAction::Replace { sections }) => {
                    service.replace_sections(&session, &parse_drafts(&sections)?)?
                }
                Some(SectionsAction::Add { section }) => {
                    let draft: SectionDraft =
                        serde_json::from_str(&section).context("failed to parse section")?;
                    service.add_section(&session, draft)?
                }
                Some(SectionsAction::Delete { index }) => service.delete_section(&session, index)?,
            };
            print_json(&sections)
        }
        Command::History { user, reset } => {
            let user = user.unwrap_or_else(|| config.default_user.clone());
            if reset {
                history.reset(&user)?;
            }
            print_json(&history.history(&user)?)
        }
        Command::Sweep { ttl_hours } => {
            let service = SessionSectionsService::new(repo);
            let removed = service.sweep_expired(ttl_hours.unwrap_or(config.session_ttl_hours))?;
            print_json(&serde_json::json!({ "removed": removed }))
        }
    }
}

fn parse_drafts(raw: &str) -> Result<Vec<SectionDraft>> {
    serde_json::from_str(raw).context("failed to parse sections")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{text}");
    Ok(())
}
