mod cmd;
mod output;
mod prompt;
mod root;

use clap::{Parser, Subcommand};
use cmd::list::ListSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "caravel",
    about = "Promote catalog releases between environments via pull requests",
    version,
    propagate_version = true
)]
struct Cli {
    /// Catalog root (default: auto-detect from environments/ or .git/)
    #[arg(long, global = true, env = "CARAVEL_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Promote releases from a source environment to a target environment
    Promote {
        /// Releases to promote: exact names or glob patterns like 'shop-*'
        /// (omit to choose interactively)
        releases: Vec<String>,

        /// Source environment
        #[arg(long)]
        from: Option<String>,

        /// Target environment
        #[arg(long)]
        to: Option<String>,

        /// Promote every promotable release
        #[arg(long)]
        all: bool,

        /// Release names to exclude
        #[arg(long, value_delimiter = ',')]
        omit: Vec<String>,

        /// Allow promoting pre-release versions
        #[arg(long)]
        keep_prerelease: bool,

        /// Label the pull request for auto-merge
        #[arg(long)]
        auto_merge: bool,

        /// Open the pull request as a draft
        #[arg(long)]
        draft: bool,

        /// Skip the confirmation prompt
        #[arg(long)]
        no_prompt: bool,

        /// Show diffs and stop without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// List environments, projects, or releases
    List {
        #[command(subcommand)]
        subcommand: ListSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Promote {
            releases,
            from,
            to,
            all,
            omit,
            keep_prerelease,
            auto_merge,
            draft,
            no_prompt,
            dry_run,
        } => cmd::promote::run(
            &root,
            caravel_core::promote::PromoteOptions {
                from,
                to,
                releases,
                all,
                omit,
                keep_prerelease,
                auto_merge,
                draft,
                no_prompt,
                dry_run,
            },
            cli.json,
        ),
        Commands::List { subcommand } => cmd::list::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
