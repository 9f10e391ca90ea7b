//! split-tests CLI - Balanced CI test sharding.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use split_tests::config::{self, Config, DiscoveryConfig, JavaDiscoveryConfig};
use split_tests::discovery::{DynDiscoverer, GenericDiscoverer, JavaDiscoverer};
use split_tests::duration::{Aggregation, NewTestTime};
use split_tests::history::{DynHistoryReader, JunitFormat, JunitReader, NoHistory};
use split_tests::orchestrator::{Orchestrator, Plan};
use split_tests::report::{self, OutputFormat};

const DEFAULT_CONFIG: &str = "split-tests.toml";

#[derive(Parser)]
#[command(name = "split-tests")]
#[command(about = "Splits a test suite into shards of equal run time", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path [default: split-tests.toml, if present]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Project directory to discover tests and reports in
    #[arg(short, long, global = true)]
    working_directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the tests of one shard
    Split {
        /// Index of the shard to print, starting at 0
        #[arg(short = 'i', long)]
        split_index: usize,

        /// Number of shards
        #[arg(short = 't', long)]
        split_total: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Log the shard count beyond which the slowest shard stops getting faster
        #[arg(short = 'c', long)]
        calculate_optimal_total_split: bool,

        /// Maximum shard counts to try when calculating the optimal split
        #[arg(short = 'm', long, default_value_t = 50)]
        max_optimal_total_split_calculations: usize,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Write every shard to a file and print a summary
    Plan {
        /// Number of shards
        #[arg(short = 't', long)]
        split_total: Option<usize>,

        /// Output format for the shard files
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Directory for shard-NN.txt files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Also write the plan as JSON to this path
        #[arg(long)]
        json: Option<PathBuf>,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Discover tests without splitting them
    Collect {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = CollectFormat::Text)]
        format: CollectFormat,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Validate configuration file
    Validate,

    /// Initialize a new configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Overrides for where tests and timings come from.
#[derive(Args, Debug, Default)]
struct SourceArgs {
    /// Glob selecting Java test sources (switches to Java discovery)
    #[arg(short = 'g', long)]
    glob: Option<String>,

    /// Glob for test sources to leave out
    #[arg(short = 'e', long)]
    exclude_glob: Option<String>,

    /// Glob selecting JUnit XML reports with past timings
    #[arg(short = 'j', long)]
    junit_glob: Option<String>,

    /// Whether timings come from <testsuite> or <testcase> elements
    #[arg(long, value_enum)]
    junit_format: Option<JunitFormat>,

    /// Estimate for tests without recorded timings
    #[arg(short = 'n', long, value_enum)]
    new_test_time: Option<NewTestTime>,

    /// How several timings of the same test are combined
    #[arg(long, value_enum)]
    aggregation: Option<Aggregation>,

    /// Maximum files read concurrently
    #[arg(long)]
    max_parallel: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CollectFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout carries shard output
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli
        .config
        .as_deref()
        .map(config::expand_path)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config_required = cli.config.is_some();

    match cli.command {
        Commands::Split {
            split_index,
            split_total,
            format,
            calculate_optimal_total_split,
            max_optimal_total_split_calculations,
            sources,
        } => {
            let workspace =
                Workspace::load(&config_path, config_required, cli.working_directory, &sources)?;
            let total = workspace.split_total(split_total)?;
            if split_index >= total {
                bail!(
                    "--split-index ({}) must be lower than --split-total ({})",
                    split_index,
                    total
                );
            }
            let format = format.unwrap_or(workspace.config.split.format);

            let plan = workspace.plan(total).await?;
            if calculate_optimal_total_split && split_index == 0 {
                workspace.check_optimal_total(&plan, total, max_optimal_total_split_calculations);
            }

            let group = plan
                .result
                .group(split_index)
                .with_context(|| format!("Shard {} was not planned", split_index))?;
            info!(
                "Shard #{:02} has {} tests, estimated {}",
                split_index,
                group.len(),
                report::format_time(group.total())
            );
            let line: Vec<String> = group
                .tests()
                .iter()
                .map(|test| format.render(test.as_str()))
                .collect();
            println!("{}", line.join(" "));
            Ok(())
        }
        Commands::Plan {
            split_total,
            format,
            output_dir,
            json,
            sources,
        } => {
            let workspace =
                Workspace::load(&config_path, config_required, cli.working_directory, &sources)?;
            let total = workspace.split_total(split_total)?;
            let format = format.unwrap_or(workspace.config.split.format);

            let plan = workspace.plan(total).await?;
            let summary = plan.report();

            let output_dir = output_dir.unwrap_or_else(|| workspace.config.report.output_dir.clone());
            report::write_shard_files(&output_dir, &summary, format)?;
            if let Some(json) = json.or_else(|| workspace.config.report.json.clone()) {
                report::write_json(&json, &summary)?;
            }

            report::print_summary(&summary)?;
            Ok(())
        }
        Commands::Collect { format, sources } => {
            let workspace =
                Workspace::load(&config_path, config_required, cli.working_directory, &sources)?;
            collect_tests(&workspace, format).await
        }
        Commands::Validate => validate_config(&config_path),
        Commands::Init { force } => init_config(&config_path, force),
    }
}

/// Loaded configuration plus the directory it applies to.
struct Workspace {
    config: Config,
    root: PathBuf,
}

impl Workspace {
    fn load(
        config_path: &Path,
        required: bool,
        working_directory: Option<PathBuf>,
        sources: &SourceArgs,
    ) -> Result<Self> {
        let mut config = config::load_or_default(config_path, required)?;
        apply_overrides(&mut config, sources);
        config.validate()?;

        let root = working_directory
            .as_deref()
            .map(config::expand_path)
            .unwrap_or_else(|| PathBuf::from("."));
        if !root.is_dir() {
            bail!("Working directory {} does not exist", root.display());
        }
        info!("Working directory is {}", root.display());

        Ok(Self { config, root })
    }

    fn split_total(&self, flag: Option<usize>) -> Result<usize> {
        flag.or(self.config.split.total)
            .context("--split-total is required (or set split.total in the config file)")
    }

    fn discoverer(&self) -> DynDiscoverer {
        match &self.config.discovery {
            DiscoveryConfig::Java(java) => Box::new(
                JavaDiscoverer::new(&self.root, java.clone())
                    .with_max_parallel(self.config.split.max_parallel),
            ),
            DiscoveryConfig::Generic(generic) => {
                let mut generic = generic.clone();
                generic.working_dir = Some(match generic.working_dir {
                    Some(dir) if dir.is_relative() => self.root.join(dir),
                    Some(dir) => dir,
                    None => self.root.clone(),
                });
                Box::new(GenericDiscoverer::new(generic))
            }
        }
    }

    fn history(&self) -> DynHistoryReader {
        match &self.config.history.junit_glob {
            Some(glob) => Box::new(
                JunitReader::new(&self.root, glob.clone())
                    .with_format(self.config.history.format)
                    .with_max_parallel(self.config.split.max_parallel),
            ),
            None => Box::new(NoHistory),
        }
    }

    async fn plan(&self, total: usize) -> Result<Plan> {
        let orchestrator = Orchestrator::new(
            self.discoverer(),
            self.history(),
            self.config.split.model_options(),
        );
        Ok(orchestrator.run(total).await?)
    }

    fn check_optimal_total(&self, plan: &Plan, total: usize, max_calculations: usize) {
        if self.config.history.junit_glob.is_none() {
            warn!("The optimal split can only be calculated with --junit-glob");
            return;
        }
        match plan.optimal_group_count(max_calculations) {
            Some(optimal) if optimal != total => warn!(
                "The split total is {}, but the optimal split total is {}",
                total, optimal
            ),
            Some(_) => info!("The split total is optimal"),
            None => {}
        }
    }
}

fn apply_overrides(config: &mut Config, sources: &SourceArgs) {
    if let Some(glob) = &sources.glob {
        let exclude_glob = match &config.discovery {
            DiscoveryConfig::Java(java) => java.exclude_glob.clone(),
            DiscoveryConfig::Generic(_) => None,
        };
        config.discovery = DiscoveryConfig::Java(JavaDiscoveryConfig {
            glob: glob.clone(),
            exclude_glob,
        });
    }
    if let Some(exclude) = &sources.exclude_glob {
        match &mut config.discovery {
            DiscoveryConfig::Java(java) => java.exclude_glob = Some(exclude.clone()),
            DiscoveryConfig::Generic(_) => {
                warn!("--exclude-glob has no effect with generic discovery")
            }
        }
    }
    if let Some(junit_glob) = &sources.junit_glob {
        config.history.junit_glob = Some(junit_glob.clone());
    }
    if let Some(format) = sources.junit_format {
        config.history.format = format;
    }
    if let Some(new_test_time) = sources.new_test_time {
        config.split.new_test_time = new_test_time;
    }
    if let Some(aggregation) = sources.aggregation {
        config.split.aggregation = aggregation;
    }
    if let Some(max_parallel) = sources.max_parallel {
        config.split.max_parallel = max_parallel;
    }
}

async fn collect_tests(workspace: &Workspace, format: CollectFormat) -> Result<()> {
    let orchestrator = Orchestrator::new(
        workspace.discoverer(),
        NoHistory,
        workspace.config.split.model_options(),
    );
    let catalog = orchestrator.collect().await?;

    match format {
        CollectFormat::Json => {
            let tests: Vec<_> = catalog.iter().collect();
            println!("{}", serde_json::to_string_pretty(&tests)?);
        }
        CollectFormat::Text => {
            info!("Discovered {} tests", catalog.len());
            for test in catalog.iter() {
                println!("{}", test);
            }
        }
    }

    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    let config = config::load_config(config_path)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    println!("Configuration is valid!");
    println!();
    println!("Settings:");
    match config.split.total {
        Some(total) => println!("  Split total: {}", total),
        None => println!("  Split total: (from --split-total)"),
    }
    println!("  Format: {:?}", config.split.format);
    println!("  New test time: {:?}", config.split.new_test_time);
    println!("  Aggregation: {:?}", config.split.aggregation);
    println!("  Max parallel: {}", config.split.max_parallel);

    match &config.discovery {
        DiscoveryConfig::Java(java) => {
            println!("  Discovery: java ({})", java.glob);
            if let Some(exclude) = &java.exclude_glob {
                println!("  Exclude: {}", exclude);
            }
        }
        DiscoveryConfig::Generic(generic) => {
            println!("  Discovery: generic ({})", generic.discover_command)
        }
    }
    match &config.history.junit_glob {
        Some(glob) => println!("  History: {} ({:?})", glob, config.history.format),
        None => println!("  History: none"),
    }
    println!("  Output dir: {}", config.report.output_dir.display());

    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists. Remove it first, edit it manually or pass --force.",
            path.display()
        );
    }

    std::fs::write(path, config::STARTER_CONFIG)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    println!();
    println!("Edit the configuration as needed, then run:");
    println!("  split-tests split --split-index 0 --split-total 4");

    Ok(())
}
