//! smap CLI - Adaptive Batch-SOM Semantic Map Trainer
//!
//! Command-line interface for training semantic maps from sparse corpora.

use clap::{Parser, Subcommand};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use log::{error, warn};
use smap::{
    derived_update_exponent, Codebook, GlobalTopology, LocalTopology, Neighborhood, Result,
    SemanticMap, SmapError, SparseCorpus, TrainConfig, Trainer,
};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Parser)]
#[command(name = "smap")]
#[command(author = "Smap Contributors")]
#[command(version)]
#[command(about = "Adaptive batch-SOM semantic map trainer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (per-epoch neighborhood snapshots, debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a semantic map from a sparse corpus file
    Create {
        /// Input corpus file (framed binary sparse matrix)
        corpus: PathBuf,

        /// Map width in cells
        width: u16,

        /// Map height in cells
        height: u16,

        /// Base directory for run outputs
        #[arg(long)]
        directory: PathBuf,

        /// Name of this run; outputs land in <directory>/<name>/
        #[arg(long)]
        name: String,

        /// Reuse the codebook of an earlier run as initialization
        #[arg(long)]
        prior_name: Option<String>,

        /// Initial neighborhood radius (default: (width + height) / 2)
        #[arg(long)]
        initial_radius: Option<u16>,

        /// Radius shrink exponent in (0, 1]
        /// (default: reaches a minimum radius of 1.5 at the final epoch)
        #[arg(long)]
        update_exponent: Option<f32>,

        /// Number of training epochs (at least 2)
        #[arg(long, default_value = "2")]
        epochs: u32,

        /// Global topology: 0 = torus, 1 = moebius, 2 = tube, 4 = plane
        #[arg(long, default_value = "0")]
        global_topology: u8,

        /// Local topology: 4 = circular, 6 = hexagonal, 8 = rectangular
        #[arg(long, default_value = "4")]
        local_topology: u8,

        /// Ignore vocabulary indices at or above this value while training
        #[arg(long, default_value = "0")]
        train_vocab_cutoff: u32,

        /// Reassign dead cells to the worst-matching snippets every nth epoch
        #[arg(long, default_value = "0")]
        dead_cell_update_strides: u32,

        /// Do not keep radii above the topographic discontinuity lower bound
        #[arg(long)]
        non_adaptive: bool,

        /// Random seed for codebook initialization (default: the clock)
        #[arg(long)]
        seed: Option<u64>,

        /// Initialize the codebook from a single random stream, independent
        /// of the worker count
        #[arg(long)]
        single_stream_init: bool,
    },
}

fn main() {
    if let Err(e) = smap::io::ensure_little_endian() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let result = match cli.command {
        Commands::Create {
            corpus,
            width,
            height,
            directory,
            name,
            prior_name,
            initial_radius,
            update_exponent,
            epochs,
            global_topology,
            local_topology,
            train_vocab_cutoff,
            dead_cell_update_strides,
            non_adaptive,
            seed,
            single_stream_init,
        } => create_semantic_map(CreateArgs {
            corpus,
            width,
            height,
            directory,
            name,
            prior_name,
            initial_radius,
            update_exponent,
            epochs,
            global_topology,
            local_topology,
            train_vocab_cutoff,
            dead_cell_update_strides,
            non_adaptive,
            seed,
            single_stream_init,
            verbose: cli.verbose,
        }),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(2);
    }
}

struct CreateArgs {
    corpus: PathBuf,
    width: u16,
    height: u16,
    directory: PathBuf,
    name: String,
    prior_name: Option<String>,
    initial_radius: Option<u16>,
    update_exponent: Option<f32>,
    epochs: u32,
    global_topology: u8,
    local_topology: u8,
    train_vocab_cutoff: u32,
    dead_cell_update_strides: u32,
    non_adaptive: bool,
    seed: Option<u64>,
    single_stream_init: bool,
    verbose: bool,
}

fn create_semantic_map(args: CreateArgs) -> Result<()> {
    let start_time = Instant::now();

    let global_topology = GlobalTopology::from_code(args.global_topology).ok_or_else(|| {
        SmapError::Validation(format!(
            "unknown global topology code {}",
            args.global_topology
        ))
    })?;
    let local_topology = LocalTopology::from_code(args.local_topology).ok_or_else(|| {
        SmapError::Validation(format!(
            "unknown local topology code {}",
            args.local_topology
        ))
    })?;

    let initial_radius = args
        .initial_radius
        .unwrap_or((args.width + args.height) / 2);
    let update_exponent = args
        .update_exponent
        .unwrap_or_else(|| derived_update_exponent(initial_radius, args.epochs));

    let config = TrainConfig {
        width: args.width,
        height: args.height,
        num_epochs: args.epochs,
        initial_radius,
        update_exponent,
        global_topology,
        local_topology,
        train_vocab_cutoff: args.train_vocab_cutoff,
        dead_cell_update_strides: args.dead_cell_update_strides,
        respect_lower_bound: !args.non_adaptive,
        seed: args.seed,
        per_worker_seed_offset: !args.single_stream_init,
        verbose: args.verbose,
    };
    config.validate()?;

    let run_dir = args.directory.join(&args.name);
    fs::create_dir_all(&run_dir)?;

    println!("Creating a semantic map '{}' with", args.name);
    println!("Dimensions:            {} x {}", config.width, config.height);
    println!("Initial update radius: {}", config.initial_radius);
    println!("Update exponent:       {}", config.update_exponent);
    println!("Respect lower bound:   {}", config.respect_lower_bound);
    println!("Local topology:        {}", config.local_topology.describe());
    println!("Global topology:       {}", config.global_topology.describe());
    println!("Training vocab cutoff: {}", config.train_vocab_cutoff);
    println!("Number of epochs:      {}", config.num_epochs);
    println!("Dead cell updates:     {}", config.dead_cell_update_strides);
    println!();

    // Load corpus
    let spinner_style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style);
    pb.set_message("Loading corpus...");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let mut corpus = SparseCorpus::load(&args.corpus)?;
    let min_word_index = corpus.min_word_index_to_avoid_empty_row();

    pb.finish_and_clear();
    println!("Number of snippets:     {}", corpus.num_rows());
    println!("Vocabulary size:        {}", corpus.num_cols());
    println!("Longest leading zeros:  {}", min_word_index);
    println!("Total number of tokens: {}", corpus.num_non_zero());

    if config.train_vocab_cutoff > 0 && min_word_index > config.train_vocab_cutoff {
        warn!("some training snippets are empty under the vocabulary cutoff");
    }
    if config.train_vocab_cutoff > corpus.num_cols() {
        return Err(SmapError::Validation(
            "the vocabulary size is smaller than the training vocabulary cutoff".to_string(),
        ));
    }

    corpus.init_sum_of_squares();

    // Codebook: warm start from a prior run, or random initialization
    let mut codebook = match &args.prior_name {
        Some(prior_name) => {
            let prior_path = args.directory.join(prior_name).join("codebook.bin");
            println!("Loading prior codebook from {}", prior_path.display());
            let codebook = Codebook::load(&prior_path, global_topology, local_topology)?;
            if codebook.input_dim() != corpus.num_cols() {
                return Err(SmapError::Validation(format!(
                    "prior codebook dimension {} does not match vocabulary size {}",
                    codebook.input_dim(),
                    corpus.num_cols()
                )));
            }
            codebook
        }
        None => {
            let mut codebook = Codebook::new(
                config.height,
                config.width,
                corpus.num_cols(),
                global_topology,
                local_topology,
            )?;
            let seed = config.seed.unwrap_or_else(unix_time);
            codebook.init(seed, config.per_worker_seed_offset);
            codebook
        }
    };

    let mut neighborhood = Neighborhood::new(
        config.height,
        config.width,
        global_topology,
        local_topology,
        config.update_exponent,
        config.initial_radius,
    )?;

    // Train with a per-epoch progress bar
    println!();
    println!("Training adaptive self-organizing map...");
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let pb = ProgressBar::new(config.num_epochs as u64);
    pb.set_style(bar_style);

    let convergence_log = File::create(run_dir.join("convergence.tsv"))?;
    let mut convergence_log = BufWriter::new(convergence_log);

    let mut trainer = Trainer::new(&config);
    if config.verbose {
        trainer = trainer.with_snapshot_dir(run_dir.clone());
    }
    trainer.train(
        &mut codebook,
        &mut neighborhood,
        &corpus,
        &mut convergence_log,
        |epoch, metrics| {
            pb.set_position(epoch as u64);
            if let Some(quantization) = metrics.quantization_errors.last() {
                pb.set_message(format!("quantization error {:.6}", quantization));
            }
        },
    )?;
    convergence_log.flush()?;
    pb.finish_and_clear();

    neighborhood.save(run_dir.join("neighbourhood.bin"))?;
    codebook.save(run_dir.join("codebook.bin"))?;

    let semantic_map = SemanticMap::build(&corpus, &codebook, config.train_vocab_cutoff)?;
    semantic_map.save_best_matching_units(run_dir.join("bmus.bin"))?;
    if semantic_map.counts().is_some() {
        semantic_map.save_counts(run_dir.join("counts.bin"))?;
    } else {
        error!("count build overflowed; counts.bin not written");
    }

    write_readme(&run_dir, &args.name, &config, &corpus, min_word_index, start_time)?;

    let elapsed = start_time.elapsed();
    println!();
    println!(
        "Creating the semantic map took {}",
        HumanDuration(elapsed)
    );
    println!("   Output: {}", run_dir.display());

    Ok(())
}

/// Writes the run summary next to the binary artifacts.
fn write_readme(
    run_dir: &std::path::Path,
    name: &str,
    config: &TrainConfig,
    corpus: &SparseCorpus,
    min_word_index: u32,
    start_time: Instant,
) -> Result<()> {
    let file = File::create(run_dir.join("README.md"))?;
    let mut readme = BufWriter::new(file);

    writeln!(readme, "# Semantic Map {}", name)?;
    writeln!(readme)?;
    writeln!(readme, "smap version:          {}", smap::VERSION)?;
    writeln!(readme)?;
    writeln!(readme, "## Hyperparameters")?;
    writeln!(readme, "Dimensions:            {} x {}", config.width, config.height)?;
    writeln!(readme, "Initial update radius: {}", config.initial_radius)?;
    writeln!(readme, "Update exponent:       {}", config.update_exponent)?;
    writeln!(readme, "Respect lower bound:   {}", config.respect_lower_bound)?;
    writeln!(readme, "Local topology:        {}", config.local_topology.describe())?;
    writeln!(readme, "Global topology:       {}", config.global_topology.describe())?;
    writeln!(readme, "Training vocab cutoff: {}", config.train_vocab_cutoff)?;
    writeln!(readme, "Number of epochs:      {}", config.num_epochs)?;
    writeln!(readme, "Dead cell updates:     {}", config.dead_cell_update_strides)?;
    writeln!(readme)?;
    writeln!(readme, "## Dataset")?;
    writeln!(readme, "Number of snippets:     {}", corpus.num_rows())?;
    writeln!(readme, "Vocabulary size:        {}", corpus.num_cols())?;
    writeln!(readme, "Longest leading zeros:  {}", min_word_index)?;
    writeln!(readme, "Total number of tokens: {}", corpus.num_non_zero())?;
    writeln!(readme)?;
    writeln!(readme, "## Machine")?;
    writeln!(readme, "Max. parallel threads: {}", rayon::current_num_threads())?;
    writeln!(readme)?;
    writeln!(readme, "## Timing")?;
    writeln!(readme, "Creation took: {}", HumanDuration(start_time.elapsed()))?;

    Ok(())
}

/// Seconds since the Unix epoch, used to seed unseeded runs.
fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
