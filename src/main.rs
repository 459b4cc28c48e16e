use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use divaift_ift::config::IftConfig;
use divaift_ift::hook::IFT_RULE_PLACEHOLDER;
use divaift_ift::sinks::write_harness_commands;
use divaift_ift::{
    run_passes, IgnoreList, Instrumenter, KeepQueueSignals, LivenessAnnotator, Pass,
    RegisterClassifier, RuleHook, SinkDesignations, SinkLocator, SinkQuery, SummaryMode,
    SummaryReducer,
};
use divaift_netlist::Design;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// DivaIFT - taint-tracking instrumentation for hardware netlists
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (divaift.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Netlist in, netlist out
#[derive(Args)]
struct NetlistArgs {
    /// Input netlist (JSON)
    input: PathBuf,

    /// Output netlist; defaults to rewriting the input
    #[arg(short = 'w', long)]
    write: Option<PathBuf>,
}

#[derive(Args, Default)]
struct InstrumentArgs {
    /// Number of taint channels
    #[arg(long)]
    taint_num: Option<u32>,

    /// Comma separated signal names that are never instrumented
    #[arg(long)]
    ignore_ports: Option<String>,

    /// Sink designation file
    #[arg(long)]
    vec_anno: Option<PathBuf>,
}

#[derive(Args, Default)]
struct SummaryArgs {
    /// Accumulate sink nodes separately
    #[arg(long)]
    split_sinks: bool,

    /// Only count memory arrays
    #[arg(long)]
    array_only: bool,
}

#[derive(Args, Default)]
struct SinkArgs {
    /// Hierarchy root
    #[arg(long)]
    top: Option<String>,

    /// Harness command file; defaults to stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add shadow taint logic to every module
    Pift {
        #[command(flatten)]
        netlist: NetlistArgs,
        #[command(flatten)]
        instrument: InstrumentArgs,
    },

    /// Classify registers as control or data
    Ctrlreg {
        #[command(flatten)]
        netlist: NetlistArgs,
    },

    /// Propagate storage-array liveness annotations
    AnnoSram {
        #[command(flatten)]
        netlist: NetlistArgs,
    },

    /// Keep the pointer and flag signals of generated queues
    KeepQueue {
        #[command(flatten)]
        netlist: NetlistArgs,
    },

    /// Tag instances with an IFT rule parameter
    Thook {
        #[command(flatten)]
        netlist: NetlistArgs,

        /// Rule text
        #[arg(long, default_value = IFT_RULE_PLACEHOLDER)]
        rule: String,
    },

    /// Roll taint activity up into taint_sum ports
    Tsum {
        #[command(flatten)]
        netlist: NetlistArgs,
        #[command(flatten)]
        summary: SummaryArgs,
    },

    /// Fold seeded register fingerprints into coverage hashes
    Tcov {
        #[command(flatten)]
        netlist: NetlistArgs,

        /// Fingerprint seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Emit harness commands for sink-flagged modules
    Tsink {
        /// Input netlist (JSON)
        input: PathBuf,
        #[command(flatten)]
        sinks: SinkArgs,
    },

    /// List handshake modules backed by storage arrays
    FindSinks {
        /// Input netlist (JSON)
        input: PathBuf,

        /// Hierarchy root
        #[arg(long)]
        top: Option<String>,

        /// Handshake port suffix (repeatable)
        #[arg(long = "suffix")]
        suffixes: Vec<String>,
    },

    /// keep-queue, pift, ctrlreg, anno-sram, then tsum with split sinks and
    /// tsink, or tcov when seeded
    Flow {
        #[command(flatten)]
        netlist: NetlistArgs,
        #[command(flatten)]
        instrument: InstrumentArgs,
        #[command(flatten)]
        summary: SummaryArgs,
        #[command(flatten)]
        sinks: SinkArgs,

        /// Use the coverage hash instead of the sum
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = match &cli.config {
        Some(path) => IftConfig::load(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => IftConfig::default(),
    };

    match cli.command {
        Commands::Pift {
            netlist,
            instrument,
        } => {
            let pass = build_instrumenter(&config, &instrument)?;
            run_on_netlist(&netlist, vec![Box::new(pass)])?;
        }

        Commands::Ctrlreg { netlist } => {
            run_on_netlist(&netlist, vec![Box::new(RegisterClassifier::new())])?;
        }

        Commands::AnnoSram { netlist } => {
            run_on_netlist(&netlist, vec![Box::new(LivenessAnnotator::new())])?;
        }

        Commands::KeepQueue { netlist } => {
            run_on_netlist(&netlist, vec![Box::new(KeepQueueSignals::new())])?;
        }

        Commands::Thook { netlist, rule } => {
            run_on_netlist(&netlist, vec![Box::new(RuleHook::new(rule))])?;
        }

        Commands::Tsum { netlist, summary } => {
            let mode = summary_mode(&config, &summary, None);
            run_on_netlist(&netlist, vec![Box::new(SummaryReducer::new(mode))])?;
        }

        Commands::Tcov { netlist, seed } => {
            let seed = seed.or(config.summary.seed).unwrap_or(0);
            let mode = SummaryMode::Hash { seed };
            run_on_netlist(&netlist, vec![Box::new(SummaryReducer::new(mode))])?;
        }

        Commands::Tsink { input, sinks } => {
            let mut design = load_design(&input)?;
            let mut locator = sink_locator(&config, SinkQuery::Flagged, &sinks);
            report(&locator.run(&mut design)?);
            emit_harness_commands(&config, &sinks, locator.paths())?;
        }

        Commands::FindSinks {
            input,
            top,
            suffixes,
        } => {
            let mut design = load_design(&input)?;
            let mut locator = SinkLocator::from_config(SinkQuery::Handshake, &config.sinks);
            if let Some(top) = top {
                locator = locator.with_top(top);
            }
            if !suffixes.is_empty() {
                locator = locator.with_handshake_suffixes(suffixes);
            }
            report(&locator.run(&mut design)?);
            for path in locator.paths() {
                println!("{}", path);
            }
        }

        Commands::Flow {
            netlist,
            instrument,
            summary,
            sinks,
            seed,
        } => {
            // Harness commands point at taint_sink_sum, which only the split
            // sum reducer builds
            let mode = match summary_mode(&config, &summary, seed) {
                SummaryMode::Sum { array_only, .. } => SummaryMode::Sum {
                    split_sinks: true,
                    array_only,
                },
                SummaryMode::Hash { .. } if sinks.output.is_some() => {
                    anyhow::bail!("--output needs the taint sum; drop --seed to emit harness commands")
                }
                hash => hash,
            };

            let mut design = load_design(&netlist.input)?;
            let mut passes: Vec<Box<dyn Pass>> = vec![
                Box::new(KeepQueueSignals::new()),
                Box::new(build_instrumenter(&config, &instrument)?),
                Box::new(RegisterClassifier::new()),
                Box::new(LivenessAnnotator::new()),
                Box::new(SummaryReducer::new(mode)),
            ];
            for result in run_passes(&mut design, &mut passes)? {
                report(&result);
            }

            if let SummaryMode::Sum { .. } = mode {
                let mut locator = sink_locator(&config, SinkQuery::Flagged, &sinks);
                report(&locator.run(&mut design)?);
                emit_harness_commands(&config, &sinks, locator.paths())?;
            } else {
                info!("Coverage hash mode, no harness commands emitted");
            }

            save_design(&design, netlist.write.as_deref().unwrap_or(&netlist.input))?;
        }
    }

    Ok(())
}

fn load_design(path: &Path) -> Result<Design> {
    info!("Loading netlist from {:?}", path);
    Design::load(path).with_context(|| format!("Failed to read netlist {}", path.display()))
}

fn save_design(design: &Design, path: &Path) -> Result<()> {
    design
        .save(path)
        .with_context(|| format!("Failed to write netlist {}", path.display()))?;
    info!("Wrote netlist to {:?}", path);
    Ok(())
}

fn report(result: &divaift_ift::PassResult) {
    println!("{}", result);
}

/// Load, run `passes` in order, save
fn run_on_netlist(args: &NetlistArgs, mut passes: Vec<Box<dyn Pass>>) -> Result<()> {
    let mut design = load_design(&args.input)?;
    let results = run_passes(&mut design, &mut passes)
        .with_context(|| format!("Pass failed on {}", args.input.display()))?;
    for result in &results {
        report(result);
    }
    save_design(&design, args.write.as_deref().unwrap_or(&args.input))
}

fn build_instrumenter(config: &IftConfig, args: &InstrumentArgs) -> Result<Instrumenter> {
    let taint_num = args.taint_num.unwrap_or_else(|| config.taint_num());
    if taint_num == 0 {
        anyhow::bail!("--taint-num must be at least 1");
    }

    let ignore = match &args.ignore_ports {
        Some(list) => IgnoreList::parse(list),
        None => IgnoreList::new(config.instrument.ignore_ports.iter().cloned()),
    };

    let sinks = match args.vec_anno.as_ref().or(config.instrument.vec_anno.as_ref()) {
        Some(path) => {
            let sinks = SinkDesignations::load(path)
                .with_context(|| format!("Failed to read sink designations {}", path.display()))?;
            info!("{} sink registers designated", sinks.len());
            sinks
        }
        None => SinkDesignations::new(),
    };

    Ok(Instrumenter::new(taint_num)
        .with_ignore(ignore)
        .with_sinks(sinks))
}

fn summary_mode(config: &IftConfig, args: &SummaryArgs, seed: Option<u64>) -> SummaryMode {
    match seed.or(config.summary.seed) {
        Some(seed) => SummaryMode::Hash { seed },
        None => SummaryMode::Sum {
            split_sinks: args.split_sinks || config.summary.split_sinks.unwrap_or(false),
            array_only: args.array_only || config.summary.array_only.unwrap_or(false),
        },
    }
}

fn sink_locator(config: &IftConfig, query: SinkQuery, args: &SinkArgs) -> SinkLocator {
    let locator = SinkLocator::from_config(query, &config.sinks);
    match &args.top {
        Some(top) => locator.with_top(top.clone()),
        None => locator,
    }
}

fn emit_harness_commands(config: &IftConfig, args: &SinkArgs, paths: &[String]) -> Result<()> {
    let prefix = config.sinks.harness_prefix();
    match &args.output {
        Some(path) => {
            let mut file = fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_harness_commands(&mut file, prefix, paths)?;
            info!("{} harness commands written to {:?}", paths.len(), path);
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            write_harness_commands(&mut out, prefix, paths)?;
            out.flush()?;
        }
    }
    Ok(())
}
