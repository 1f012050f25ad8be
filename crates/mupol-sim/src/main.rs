use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mupol::dispatch::simulate_dispatch;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use crate::{
    generator::generate,
    settings::{Settings, set},
};

mod generator;
mod settings;

/// Dispatches a random problem among competing freighters, simulating all computing parties and
/// the dealer in a single process.
///
/// Values missing from the command line are taken from the `--config` file, or from the built-in
/// defaults shown below.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// A JSON file with a "dispatch" and a "problem" section, overridden by explicit flags.
    #[arg(long)]
    config: Option<PathBuf>,
    /// The number of computing parties [default: 3].
    #[arg(long)]
    parties: Option<usize>,
    /// The number of freighters, assigned to the parties round robin [default: 3].
    #[arg(long)]
    num_freighters: Option<u32>,
    /// The minimum number of trucks of a freighter [default: 1].
    #[arg(long)]
    min_num_trucks: Option<u32>,
    /// The maximum number of trucks of a freighter [default: 2].
    #[arg(long)]
    max_num_trucks: Option<u32>,
    /// The loading capacity of every truck [default: 10].
    #[arg(long)]
    truck_capacity: Option<u32>,
    /// The number of orders [default: 5].
    #[arg(long)]
    num_orders: Option<usize>,
    /// The minimum volume of an order [default: 1].
    #[arg(long)]
    min_order_volume: Option<u32>,
    /// The maximum volume of an order [default: 5].
    #[arg(long)]
    max_order_volume: Option<u32>,
    /// The number of nodes of the map [default: 9].
    #[arg(long)]
    num_nodes: Option<u32>,
    /// The seed of the problem generator [default: 0].
    #[arg(long)]
    random_seed: Option<u64>,
    /// The node id marking a truck without destination [default: 4095].
    #[arg(long)]
    dummy_node: Option<u32>,
    /// The freighter id marking an unassigned order [default: 4095].
    #[arg(long)]
    dummy_freighter_id: Option<u32>,
    /// The bit length of the secret-shared values [default: 12].
    #[arg(long)]
    bit_length: Option<u32>,
    /// The number of rounds after which the run is aborted [default: 1000].
    #[arg(long)]
    max_rounds: Option<usize>,
    /// Print the outcome of every party as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };
        let problem = &mut settings.problem;
        set(&mut problem.parties, self.parties);
        set(&mut problem.num_freighters, self.num_freighters);
        set(&mut problem.min_num_trucks, self.min_num_trucks);
        set(&mut problem.max_num_trucks, self.max_num_trucks);
        set(&mut problem.truck_capacity, self.truck_capacity);
        set(&mut problem.num_orders, self.num_orders);
        set(&mut problem.min_order_volume, self.min_order_volume);
        set(&mut problem.max_order_volume, self.max_order_volume);
        set(&mut problem.num_nodes, self.num_nodes);
        set(&mut problem.seed, self.random_seed);
        let dispatch = &mut settings.dispatch;
        set(&mut dispatch.dummy_node, self.dummy_node);
        set(&mut dispatch.dummy_freighter_id, self.dummy_freighter_id);
        set(&mut dispatch.bit_length, self.bit_length);
        set(&mut dispatch.max_rounds, self.max_rounds);
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing().context("tracing initialization")?;

    let cli = Cli::parse();
    let Settings {
        dispatch: config,
        problem: options,
    } = cli.settings()?;
    let problem = generate(&options).context("problem generation")?;
    info!(
        "Generated {} orders for {} trucks of {} freighters",
        problem.orders.len(),
        problem.trucks.len(),
        problem.freighters.len()
    );

    let outcomes = simulate_dispatch(&problem, &config, options.parties)
        .await
        .context("dispatch")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }
    for outcome in &outcomes {
        println!("Party {} (after {} rounds):", outcome.party, outcome.rounds);
        for order in &outcome.orders {
            match order.details {
                Some(d) => println!(
                    "  order {}: freighter {}, {} -> {}, volume {}",
                    order.order, order.freighter, d.origin, d.destination, d.volume
                ),
                None => println!("  order {}: freighter {}", order.order, order.freighter),
            }
        }
        for drive in &outcome.empty_drives {
            match drive.route {
                Some(r) => println!(
                    "  empty drive: freighter {}, {} -> {}",
                    drive.freighter, r.from, r.to
                ),
                None => println!("  empty drive: freighter {}", drive.freighter),
            }
        }
    }
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_env_var("MUPOL_LOG")
        .with_default_directive("mupol=info".parse()?)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
