//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use crate::adapters::csv_leg_adapter::CsvLegAdapter;
use crate::adapters::csv_ledger_report::CsvLedgerReport;
use crate::adapters::ini_config_adapter::IniConfigAdapter;
use crate::adapters::json_summary_report::JsonSummaryReport;
use crate::domain::analysis::{AnalysisConfig, AnalysisResult, Aggregates};
use crate::domain::config_validation::{build_analysis_config, validate_analysis_config};
use crate::domain::error::AuditError;
use crate::domain::instrument::InstrumentTable;
use crate::domain::leg::{ExecutionLeg, OrderLeg};
use crate::domain::pattern::PatternRule;
use crate::job::{AnalysisJob, JobStatus};
use crate::ports::leg_port::{LegPort, load_all};
use crate::ports::report_port::ReportPort;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(name = "tradeaudit", about = "Post-hoc audit of broker trade exports")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Reconcile and analyze one or more accounts
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        /// Orders CSV, one per account (repeatable)
        #[arg(long, required = true)]
        orders: Vec<PathBuf>,
        /// Executions CSV, paired with --orders by position
        #[arg(long, required = true)]
        executions: Vec<PathBuf>,
        /// Write the enriched ledger as CSV
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// Write the summary, patterns and data quality as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Print the instrument class of each symbol
    Classify {
        #[arg(required = true)]
        symbols: Vec<String>,
        /// Config whose [instruments] section extends the lookup table
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate an analysis configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Analyze {
            config,
            orders,
            executions,
            ledger,
            json,
        } => run_analyze(&config, &orders, &executions, ledger.as_deref(), json.as_deref()),
        Command::Classify { symbols, config } => run_classify(&symbols, config.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: &AuditError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<IniConfigAdapter, ExitCode> {
    IniConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn run_analyze(
    config_path: &Path,
    orders: &[PathBuf],
    executions: &[PathBuf],
    ledger_path: Option<&Path>,
    json_path: Option<&Path>,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = match build_analysis_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    // Stage 2: Load legs from every account
    if orders.len() != executions.len() {
        eprintln!(
            "error: {} orders file(s) but {} executions file(s)",
            orders.len(),
            executions.len()
        );
        return ExitCode::from(2);
    }
    let pairs: Vec<(PathBuf, PathBuf)> = orders.iter().cloned().zip(executions.iter().cloned()).collect();
    let sources = CsvLegAdapter::for_accounts(&pairs);
    let ports: Vec<&dyn LegPort> = sources.iter().map(|s| s as &dyn LegPort).collect();
    let (order_legs, execution_legs) = match load_all(&ports) {
        Ok(legs) => legs,
        Err(e) => return fail(&e),
    };
    eprintln!(
        "Loaded {} order(s) and {} execution(s) from {} account(s)",
        order_legs.len(),
        execution_legs.len(),
        sources.len()
    );

    // Stage 3: Run the analysis in the background
    let result = match run_job(order_legs, execution_legs, config.clone()) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    // Stage 4: Apply the view filter
    let aggregates = if config.view.is_empty() {
        result.aggregates.clone()
    } else {
        eprintln!("Applying view filter");
        result.view(&config.view)
    };

    // Stage 5: Console summary
    print_summary(&result, &aggregates, &config);

    // Stage 6: Reports
    let reports: [(Option<&Path>, &dyn ReportPort); 2] =
        [(ledger_path, &CsvLedgerReport), (json_path, &JsonSummaryReport)];
    for (path, report) in reports {
        let Some(path) = path else { continue };
        let output = path.display().to_string();
        if let Err(e) = report.write(&result, &aggregates, &output) {
            return fail(&e);
        }
        eprintln!("Report written to: {output}");
    }

    ExitCode::SUCCESS
}

fn run_job(
    orders: Vec<OrderLeg>,
    executions: Vec<ExecutionLeg>,
    config: AnalysisConfig,
) -> Result<AnalysisResult, AuditError> {
    let handle = AnalysisJob::submit(orders, executions, config);
    let mut last = JobStatus::Queued;
    while !handle.is_finished() {
        let status = handle.status();
        if status != last {
            if let JobStatus::Running { percent, stage } = &status {
                eprintln!("  [{percent:>3}%] {stage}");
            }
            last = status;
        }
        thread::sleep(POLL_INTERVAL);
    }
    handle.wait()
}

fn print_summary(result: &AnalysisResult, aggregates: &Aggregates, config: &AnalysisConfig) {
    let s = &aggregates.summary;
    eprintln!("\n=== Summary ===");
    eprintln!("Operations:       {}", s.operations);
    eprintln!("Trades:           {} ({} won, {} lost, {} neutral)", s.trades, s.wins, s.losses, s.neutrals);
    eprintln!("Win Rate:         {:.1}%", s.win_rate);
    eprintln!("Initial Balance:  {:.2}", s.initial_balance);
    eprintln!("Final Balance:    {:.2}", s.final_balance);
    eprintln!("Linear Profit:    {:.2}", s.linear_profit);
    eprintln!("Compounded:       {:.2} ({:+.2}%)", s.compounded_profit, s.return_pct);
    eprintln!("Total Pips:       {:.1} (avg {:.1})", s.total_pips, s.average_pips);
    eprintln!(
        "Max Drawdown:     -{:.1}% ({:.2})",
        s.max_drawdown_pct, s.max_drawdown_amount
    );
    eprintln!(
        "Streaks:          {} wins / {} losses",
        s.max_consecutive_wins, s.max_consecutive_losses
    );

    if !aggregates.by_symbol.is_empty() {
        eprintln!("\n=== Per-Symbol Summary ===");
        for (symbol, b) in &aggregates.by_symbol {
            let sign = if b.total_profit >= 0.0 { "+" } else { "" };
            eprintln!(
                "  {}:  {} trades, {}{:.2}, {:.1} pips",
                symbol, b.trades, sign, b.total_profit, b.total_pips
            );
        }
    }

    eprintln!("\n=== Sessions ===");
    for stats in &aggregates.sessions.global {
        eprintln!(
            "  {:<9} {} opened, {:.1}% win rate, {:.2} closed profit",
            stats.session.as_str(),
            stats.openings,
            stats.win_rate,
            stats.closing_profit
        );
    }

    let patterns = &result.patterns;
    eprintln!(
        "\n=== Patterns ({} trades, {} permutations, seed {}) ===",
        patterns.population, patterns.permutations, patterns.seed
    );
    print_rules("Take profit", &patterns.take_profit, patterns.baseline_take_profit);
    print_rules("Stop loss", &patterns.stop_loss, patterns.baseline_stop_loss);
    if patterns.population < config.patterns.min_observations {
        eprintln!("  too few trades to test patterns");
    }

    let q = &result.quality;
    eprintln!("\n=== Data Quality ===");
    eprintln!(
        "Matches:          {} accumulated, {} one-to-one, {} nearest",
        q.accumulated_matches, q.one_to_one_matches, q.nearest_matches
    );
    eprintln!("Unmatched:        {} closing leg(s)", q.unmatched_closings);
    eprintln!("Approximated:     {} pip value(s)", q.approximated_pips);
    eprintln!("No timestamp:     {} leg(s)", q.missing_timestamps);
    eprintln!(
        "Dropped:          {} orphan execution(s), {} unexecuted order(s), {} duplicate(s)",
        q.orphan_executions, q.unexecuted_orders, q.duplicates
    );
}

fn print_rules(label: &str, rules: &[PatternRule], baseline: f64) {
    eprintln!("{label} (baseline {:.1}%):", baseline * 100.0);
    if rules.is_empty() {
        eprintln!("  none");
    }
    for rule in rules {
        eprintln!(
            "  {}  conf {:.1}%  lift {:.2}  n={}  p={:.3}  q={:.3}",
            rule.describe(),
            rule.confidence * 100.0,
            rule.lift,
            rule.count,
            rule.p_value,
            rule.q_value
        );
    }
}

fn run_classify(symbols: &[String], config_path: Option<&Path>) -> ExitCode {
    let table = match config_path {
        Some(path) => {
            let adapter = match load_config(path) {
                Ok(a) => a,
                Err(code) => return code,
            };
            match build_analysis_config(&adapter) {
                Ok(c) => c.instruments,
                Err(e) => return fail(&e),
            }
        }
        None => InstrumentTable::standard(),
    };

    for symbol in symbols {
        println!("{}\t{}", symbol.to_uppercase(), table.classify(symbol));
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_analysis_config(&adapter) {
        return fail(&e);
    }
    let config = match build_analysis_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    eprintln!("\nInitial balance:   {:.2}", config.initial_balance);
    match config.instrument_filter {
        Some(filter) => eprintln!("Instrument filter: {filter:?}"),
        None => eprintln!("Instrument filter: none"),
    }
    if !config.view.is_empty() {
        eprintln!(
            "View filter:       symbols {:?}, from {:?}, to {:?}",
            config.view.symbols, config.view.date_from, config.view.date_to
        );
    }
    let p = &config.patterns;
    eprintln!(
        "Patterns:          support >= {}, confidence >= {}, {} permutations, top {}, seed {}",
        p.min_support, p.min_confidence, p.permutations, p.top_k, p.seed
    );
    eprintln!(
        "Instrument table:  v{}{}",
        config.instruments.version,
        if config.instruments.customized { " (customized)" } else { "" }
    );

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}
