use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ringcast_node::config;
use ringcast_node::logging::init_logging;
use ringcast_node::logging::LogLevel;
use ringcast_node::simulation;
use ringcast_node::util::build_version;
use ringcast_node::util::expand_home;

#[derive(Parser, Debug)]
#[command(about, version, author)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, default_value_t = LogLevel::Info, value_enum, env)]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    #[command(about = "Writes a configuration file with default values.")]
    Init(InitCommand),
    #[command(about = "Simulates a ring of in-memory nodes and prints a JSON report.")]
    Run(RunCommand),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(
        long,
        short = 'c',
        env,
        default_value = config::DEFAULT_CONFIG_PATH,
        help = "Config file location"
    )]
    pub config: String,
}

#[derive(Args, Debug)]
struct InitCommand {
    #[arg(
        long,
        alias = "config",
        default_value = config::DEFAULT_CONFIG_PATH,
        help = "The location of config file"
    )]
    pub location: String,

    #[arg(long, help = "Overwrite an existing config file")]
    pub force: bool,
}

#[derive(Args, Debug)]
struct RunCommand {
    #[arg(
        long,
        help = "Seed of the simulation. If not provided, use simulation.seed in config file"
    )]
    pub seed: Option<u64>,

    #[arg(
        long,
        short = 'n',
        help = "Number of nodes. If not provided, use simulation.nodes in config file"
    )]
    pub nodes: Option<usize>,

    #[arg(
        long,
        help = "Probability of dropping a message. If not provided, use network.drop_rate in config file"
    )]
    pub drop_rate: Option<f64>,

    #[command(flatten)]
    config_args: ConfigArgs,
}

fn load_config(args: &RunCommand) -> anyhow::Result<config::Config> {
    let path = args.config_args.config.as_str();
    let mut c = if expand_home(path)?.exists() {
        config::Config::read_fs(path)?
    } else {
        tracing::warn!("{} not found, running with default config", path);
        config::Config::default()
    };
    if let Some(seed) = args.seed {
        c.simulation.seed = seed;
    }
    if let Some(nodes) = args.nodes {
        c.simulation.nodes = nodes;
    }
    if let Some(drop_rate) = args.drop_rate {
        c.network.drop_rate = drop_rate;
    }
    Ok(c)
}

async fn simulation_run(args: RunCommand) -> anyhow::Result<()> {
    let c = load_config(&args)?;
    tracing::info!(
        "ringcast {}: {} nodes, seed {}",
        build_version(),
        c.simulation.nodes,
        c.simulation.seed
    );
    let report = simulation::run(c).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_complete() {
        anyhow::bail!(
            "incomplete run: {}/{} broadcast, {}/{} directed, {} duplicates, {} wrong fingers",
            report.broadcast_deliveries,
            report.expected_broadcast_deliveries,
            report.directed_deliveries,
            report.directed,
            report.duplicates,
            report.finger_mismatches
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Command::Run(args) => simulation_run(args).await,
        Command::Init(args) => {
            if !args.force && expand_home(args.location.as_str())?.exists() {
                anyhow::bail!("{} exists, use --force to overwrite it", args.location);
            }
            let p = config::Config::default().write_fs(args.location.as_str())?;
            println!("Your config file has saved to: {}", p);
            Ok(())
        }
    }
}
