use std::path::PathBuf;

use anyhow::Context;
use clap::{Args as ClapArgs, CommandFactory, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mmt_train::config::{init_default_config, TrainSettings};
use mmt_train::engine::Engine;
use mmt_train::pipeline::{BuildMode, EngineBuilder, Step};

const LOG_ENV_VAR: &str = "MMT_TRAIN_LOG";

#[derive(Parser, Debug)]
#[command(name = "mmt-train")]
#[command(about = "Train machine-translation engines from bilingual corpora", long_about = None)]
struct Args {
    /// Generate the default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file to (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Config file path (default: search for mmt-train.toml upwards)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a new engine, or resume an interrupted training
    Create(CreateArgs),
    /// List the trained engines
    List,
}

#[derive(ClapArgs, Debug)]
struct CreateArgs {
    /// Source language code (e.g. en)
    source_lang: String,

    /// Target language code (e.g. it)
    target_lang: String,

    /// Directories holding the training corpora (`<name>.<lang>` files)
    #[arg(required = true, value_name = "ROOT")]
    roots: Vec<PathBuf>,

    /// Engine name (default: "default")
    #[arg(short = 'e', long = "engine")]
    engine: Option<String>,

    /// Keep temporary training files after a successful training
    #[arg(short, long)]
    debug: bool,

    /// Run only these training steps
    #[arg(long, num_args = 1.., value_name = "STEP")]
    steps: Option<Vec<String>>,

    /// Do not extract dev and test sets out of the training corpora
    #[arg(long)]
    no_split: bool,

    /// Resume the last interrupted training of this engine
    #[arg(long)]
    resume: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let Some(command) = args.command else {
        let mut cmd = Args::command();
        cmd.print_help().context("print help")?;
        let steps: Vec<&str> = Step::selectable_steps().map(Step::name).collect();
        eprintln!(
            "\n\nUSAGE:\n  mmt-train create en it ./corpora [-e NAME]\n\nSTEPS:\n  {}\n\nTIPS:\n  - Default config search: mmt-train.toml (upwards), or set MMT_TRAIN_CONFIG.\n  - Set {LOG_ENV_VAR}=debug for diagnostics.\n",
            steps.join(", ")
        );
        return Ok(());
    };

    let settings = TrainSettings::discover(args.config).context("load config")?;
    tracing::debug!(config = %settings.config_path.display(), "settings resolved");

    match command {
        Command::List => {
            for name in Engine::list(&settings)? {
                let engine = Engine::load(&settings, &name)?;
                println!(
                    "{}\t{} > {}",
                    engine.name(),
                    engine.source_lang(),
                    engine.target_lang()
                );
            }
        }
        Command::Create(create) => {
            let engine = Engine::new(
                &settings,
                create.engine.as_deref(),
                &create.source_lang,
                &create.target_lang,
                None,
            );
            let builder = EngineBuilder::new(engine, create.roots, create.steps.as_deref())?
                .with_settings(&settings)
                .debug(create.debug);
            let builder = if create.no_split {
                builder.split_trainingset(false)
            } else {
                builder
            };

            let mode = if create.resume {
                BuildMode::Resume
            } else {
                BuildMode::Fresh
            };
            builder.run(mode)?;
        }
    }
    Ok(())
}
