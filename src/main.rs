use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use prettytable::{Table, row};

use blockdb::{
    BPlusKey, Database, DatabaseResult, DatabaseStats, DeleteResult, QueryResult, StorageConfig,
    fitted_order, load_tsv,
};

#[derive(Debug, Parser)]
#[clap(author, version, about = "Block storage engine with a B+ tree index", long_about = None)]
struct Args {
    #[clap(long, default_value = "data.tsv", help = "Tab-separated ratings file")]
    data: PathBuf,
    #[clap(long, help = "JSON storage configuration")]
    config: Option<PathBuf>,
    #[clap(long, help = "Simulated disk size in bytes")]
    disk_size: Option<usize>,
    #[clap(long, help = "Block size in bytes")]
    block_size: Option<usize>,
    #[clap(long, help = "B+ tree order (max keys per node)")]
    order: Option<usize>,
    #[clap(long, help = "Seed for the disk cache simulation")]
    seed: Option<u64>,
    #[clap(long, default_value_t = 500, help = "numVotes value for the equality lookup")]
    key: BPlusKey,
    #[clap(long, default_value_t = 30000, help = "Lower bound of the range lookup")]
    low: BPlusKey,
    #[clap(long, default_value_t = 40000, help = "Upper bound of the range lookup")]
    high: BPlusKey,
    #[clap(long, default_value_t = 1000, help = "numVotes value to delete")]
    delete_key: BPlusKey,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn build_config(args: &Args) -> DatabaseResult<StorageConfig> {
    let mut config = match &args.config {
        Some(path) => StorageConfig::from_json_file(path)?,
        None => StorageConfig::default(),
    };

    if let Some(disk_size) = args.disk_size {
        config.disk_size = disk_size;
    }
    if let Some(block_size) = args.block_size {
        config.block_size = block_size;
        config.tree_order = fitted_order(block_size);
    }
    if let Some(order) = args.order {
        config.tree_order = order;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    config.validate()?;
    Ok(config)
}

fn run(args: &Args) -> DatabaseResult<()> {
    let config = build_config(args)?;
    let records = load_tsv(&args.data)?;

    let mut db = Database::new(&config)?;
    let summary = db.load_available(records.iter().cloned())?;
    if summary.skipped > 0 {
        eprintln!(
            "warning: disk full, {} of {} records not stored",
            summary.skipped,
            records.len()
        );
    }

    println!("Experiment 1: storage");
    print_storage(&db.stats(), &config);

    println!("\nExperiment 2: B+ tree");
    print_tree(&db.stats());

    println!("\nExperiment 3: numVotes = {}", args.key);
    let by_index = db.retrieve_by_index(args.key)?;
    let by_scan = db.retrieve_by_linear_scan(args.key)?;
    print_queries(&by_index, &by_scan);

    println!("\nExperiment 4: {} <= numVotes <= {}", args.low, args.high);
    let by_index = db.retrieve_range_by_index(args.low, args.high)?;
    let by_scan = db.retrieve_range_by_linear_scan(args.low, args.high)?;
    print_queries(&by_index, &by_scan);

    println!("\nExperiment 5: delete numVotes = {}", args.delete_key);
    let by_index = db.delete_by_index(args.delete_key)?;
    print_tree(&db.stats());

    let mut scan_db = Database::new(&config)?;
    scan_db.load_available(records)?;
    let by_scan = scan_db.delete_by_linear_scan(args.delete_key)?;
    print_deletes(&by_index, &by_scan);

    Ok(())
}

fn millis(duration: Duration) -> String {
    format!("{:.3}", duration.as_secs_f64() * 1000.0)
}

fn print_storage(stats: &DatabaseStats, config: &StorageConfig) {
    let mut table = Table::new();
    table.add_row(row!["Disk size (bytes)", stats.disk_size]);
    table.add_row(row!["Blocks available", stats.max_blocks]);
    table.add_row(row!["Blocks free", stats.free_blocks]);
    table.add_row(row!["Block size (bytes)", config.block_size]);
    table.add_row(row!["Record size (bytes)", stats.record_size]);
    table.add_row(row!["Records stored", stats.num_records]);
    table.add_row(row!["Records per block", stats.records_per_block]);
    table.add_row(row!["Blocks used", stats.blocks_used]);
    table.printstd();
}

fn print_tree(stats: &DatabaseStats) {
    let root_keys: Vec<String> = stats.root_keys.iter().map(|k| k.to_string()).collect();

    let mut table = Table::new();
    table.add_row(row!["Order (n)", stats.tree_order]);
    table.add_row(row!["Nodes", stats.tree_nodes]);
    table.add_row(row!["Levels", stats.tree_height]);
    table.add_row(row!["Root keys", root_keys.join(", ")]);
    table.printstd();
}

fn average(result: &QueryResult) -> String {
    result
        .average_rating()
        .map(|avg| format!("{:.3}", avg))
        .unwrap_or_else(|| "-".to_string())
}

fn print_queries(by_index: &QueryResult, by_scan: &QueryResult) {
    let mut table = Table::new();
    table.set_titles(row![
        "Method",
        "Index nodes",
        "Data blocks",
        "Records",
        "Avg rating",
        "Access time (ms)"
    ]);
    for (name, result) in [("B+ tree", by_index), ("Linear scan", by_scan)] {
        table.add_row(row![
            name,
            result.stats.index_nodes_visited,
            result.stats.data_blocks_accessed,
            result.records.len(),
            average(result),
            millis(result.stats.access_time)
        ]);
    }
    table.printstd();
}

fn print_deletes(by_index: &DeleteResult, by_scan: &DeleteResult) {
    let mut table = Table::new();
    table.set_titles(row![
        "Method",
        "Index nodes",
        "Data blocks",
        "Removed",
        "Access time (ms)"
    ]);
    for (name, result) in [("B+ tree", by_index), ("Linear scan", by_scan)] {
        table.add_row(row![
            name,
            result.stats.index_nodes_visited,
            result.stats.data_blocks_accessed,
            result.removed,
            millis(result.stats.access_time)
        ]);
    }
    table.printstd();
}
