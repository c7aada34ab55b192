use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "motionrx-cli", version, about = "motionrx CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exercise catalog management
    Exercise {
        #[command(subcommand)]
        action: commands::exercise::ExerciseAction,
    },
    /// Patient management
    Patient {
        #[command(subcommand)]
        action: commands::patient::PatientAction,
    },
    /// Prescription management
    Prescription {
        #[command(subcommand)]
        action: commands::prescription::PrescriptionAction,
    },
    /// Submit or preview exercise attempts
    Attempt {
        #[command(subcommand)]
        action: commands::attempt::AttemptAction,
    },
    /// Progress and adherence queries
    Progress {
        #[command(subcommand)]
        action: commands::progress::ProgressAction,
    },
    /// Build the coaching request for a recorded attempt
    Coach(commands::coach::CoachArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Generate shell completions
    Completions {
        shell: clap_complete::Shell,
    },
}

/// `MOTIONRX_LOG` wins over the configured filter. Logs go to stderr so
/// stdout stays machine-readable JSON.
fn init_logging() {
    let filter = std::env::var("MOTIONRX_LOG")
        .ok()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| {
            let configured = motionrx_core::Config::load_or_default().logging.filter;
            EnvFilter::try_new(configured).unwrap_or_else(|_| EnvFilter::new("warn"))
        });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Exercise { action } => commands::exercise::run(action),
        Commands::Patient { action } => commands::patient::run(action),
        Commands::Prescription { action } => commands::prescription::run(action),
        Commands::Attempt { action } => commands::attempt::run(action),
        Commands::Progress { action } => commands::progress::run(action),
        Commands::Coach(args) => commands::coach::run(args),
        Commands::Config { action } => commands::config::run(action),
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "motionrx-cli",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
