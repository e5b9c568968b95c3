//! CLI integration tests with real INI and CSV files on disk.
//!
//! Tests cover:
//! - Config validation through the `validate` command
//! - Symbol classification
//! - Full `analyze` runs writing ledger and summary reports
//! - Exit codes for each error class

mod common;

use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tempfile::TempDir;
use tradeaudit::adapters::ini_config_adapter::IniConfigAdapter;
use tradeaudit::cli::{self, Cli};
use tradeaudit::domain::config_validation::build_analysis_config;
use tradeaudit::domain::instrument::InstrumentFilter;

const VALID_INI: &str = r#"
[analysis]
initial_balance = 10000        ; required
instrument_filter = others

[patterns]
min_support = 0.05
permutations = 250
seed = 7

[instruments]
index_keywords = DAX40
"#;

const ORDERS: &str = "\
order_id,symbol,side,direction,volume,take_profit,stop_loss,opened_at,comment
1,XAUUSD,buy,in,0.10,,,2024-01-02 09:00:00,
2,XAUUSD,sell,out,0.05,,,2024-01-02 10:00:00,
3,XAUUSD,sell,out,0.05,,,2024-01-02 11:30:00,
4,EURUSD,sell,in,1.00,,,2024-01-02 14:00:00,sl 1.1050
5,EURUSD,buy,out,1.00,,,2024-01-02 16:00:00,
6,DAX40,buy,in,1.00,,,2024-01-03 08:15:00,
7,DAX40,sell,out,1.00,,,2024-01-03 09:45:00,
";

const EXECUTIONS: &str = "\
order_id,price,executed_at,profit
1,2000.00,2024-01-02 09:00:01,0
2,2010.00,2024-01-02 10:00:01,50
3,2005.00,2024-01-02 11:30:01,25
4,1.10000,2024-01-02 14:00:01,0
5,1.09950,2024-01-02 16:00:01,50
6,16800.0,2024-01-03 08:15:01,0
7,16790.0,2024-01-03 09:45:01,-10
";

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

fn run(args: &[&str]) -> ExitCode {
    let mut argv = vec!["tradeaudit"];
    argv.extend_from_slice(args);
    cli::run(Cli::parse_from(argv))
}

// ExitCode doesn't implement PartialEq, so compare the debug rendering.
fn assert_exit(code: ExitCode, expected: u8) {
    assert_eq!(
        format!("{code:?}"),
        format!("{:?}", ExitCode::from(expected)),
        "unexpected exit code"
    );
}

struct Fixture {
    dir: TempDir,
    config: PathBuf,
    orders: PathBuf,
    executions: PathBuf,
}

impl Fixture {
    fn new(ini: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let config = write(dir.path(), "config.ini", ini);
        let orders = write(dir.path(), "account.csv", ORDERS);
        let executions = write(dir.path(), "account_exec.csv", EXECUTIONS);
        Self {
            dir,
            config,
            orders,
            executions,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn analyze(&self, extra: &[&str]) -> ExitCode {
        let mut args = vec![
            "analyze",
            "-c",
            self.config.to_str().unwrap(),
            "--orders",
            self.orders.to_str().unwrap(),
            "--executions",
            self.executions.to_str().unwrap(),
        ];
        args.extend_from_slice(extra);
        run(&args)
    }
}

mod config_loading {
    use super::*;

    #[test]
    fn ini_file_builds_typed_config() {
        let fx = Fixture::new(VALID_INI);
        let adapter = IniConfigAdapter::from_file(&fx.config).unwrap();
        let config = build_analysis_config(&adapter).unwrap();

        assert_eq!(config.initial_balance, 10_000.0);
        assert_eq!(config.instrument_filter, Some(InstrumentFilter::NonCurrencyPairs));
        assert_eq!(config.patterns.permutations, 250);
        assert_eq!(config.patterns.seed, 7);
        assert!(config.instruments.customized);
    }

    #[test]
    fn validate_accepts_valid_config() {
        let fx = Fixture::new(VALID_INI);
        assert_exit(run(&["validate", "-c", fx.config.to_str().unwrap()]), 0);
    }

    #[test]
    fn validate_rejects_missing_balance() {
        let fx = Fixture::new("[analysis]\ninstrument_filter = others\n");
        assert_exit(run(&["validate", "-c", fx.config.to_str().unwrap()]), 2);
    }

    #[test]
    fn validate_rejects_zero_balance() {
        let fx = Fixture::new("[analysis]\ninitial_balance = 0\n");
        assert_exit(run(&["validate", "-c", fx.config.to_str().unwrap()]), 2);
    }

    #[test]
    fn validate_rejects_few_permutations() {
        let fx = Fixture::new("[analysis]\ninitial_balance = 100\n[patterns]\npermutations = 50\n");
        assert_exit(run(&["validate", "-c", fx.config.to_str().unwrap()]), 2);
    }

    #[test]
    fn validate_rejects_non_numeric_permutations() {
        let fx = Fixture::new("[analysis]\ninitial_balance = 100\n[patterns]\npermutations = lots\n");
        assert_exit(run(&["validate", "-c", fx.config.to_str().unwrap()]), 2);
    }

    #[test]
    fn missing_config_file() {
        assert_exit(run(&["validate", "-c", "/nonexistent/path/config.ini"]), 2);
    }
}

mod classify {
    use super::*;

    #[test]
    fn classify_without_config() {
        assert_exit(run(&["classify", "EURUSD", "XAUUSD", "AAPL"]), 0);
    }

    #[test]
    fn classify_with_overrides() {
        let fx = Fixture::new(VALID_INI);
        assert_exit(
            run(&["classify", "DAX40", "-c", fx.config.to_str().unwrap()]),
            0,
        );
    }
}

mod analyze {
    use super::*;

    #[test]
    fn writes_ledger_and_summary() {
        let fx = Fixture::new(VALID_INI);
        let ledger = fx.path("out/ledger.csv");
        let json = fx.path("out/summary.json");
        let code = fx.analyze(&[
            "--ledger",
            ledger.to_str().unwrap(),
            "--json",
            json.to_str().unwrap(),
        ]);
        assert_exit(code, 0);

        // The EURUSD legs are filtered out before reconciliation.
        let mut rdr = csv::Reader::from_path(&ledger).unwrap();
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| &r[0] == "account"));

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(doc["aggregates"]["summary"]["trades"], 2);
        assert_eq!(doc["aggregates"]["summary"]["partial_exits"], 1);
        assert_eq!(doc["sources"]["account"]["excluded"], 2);
        assert_eq!(doc["patterns"]["permutations"], 250);
    }

    #[test]
    fn view_filter_restricts_summary() {
        let ini = VALID_INI.replace("instrument_filter = others", "symbols = dax40");
        let fx = Fixture::new(&ini);
        let json = fx.path("summary.json");
        assert_exit(fx.analyze(&["--json", json.to_str().unwrap()]), 0);

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(doc["aggregates"]["summary"]["trades"], 1);
        assert_eq!(doc["aggregates"]["summary"]["losses"], 1);
        // Legs themselves are untouched by the view.
        assert_eq!(doc["sources"]["account"]["legs"], 7);
    }

    #[test]
    fn mismatched_file_counts() {
        let fx = Fixture::new(VALID_INI);
        let code = run(&[
            "analyze",
            "-c",
            fx.config.to_str().unwrap(),
            "--orders",
            fx.orders.to_str().unwrap(),
            "--orders",
            fx.orders.to_str().unwrap(),
            "--executions",
            fx.executions.to_str().unwrap(),
        ]);
        assert_exit(code, 2);
    }

    #[test]
    fn same_file_names_in_different_directories_stay_separate() {
        let fx = Fixture::new(VALID_INI);
        let mut args = vec![
            "analyze".to_string(),
            "-c".to_string(),
            fx.config.display().to_string(),
        ];
        for account in ["a", "b"] {
            let dir = fx.path(account);
            fs::create_dir(&dir).unwrap();
            let orders = write(&dir, "orders.csv", ORDERS);
            let executions = write(&dir, "executions.csv", EXECUTIONS);
            args.extend([
                "--orders".to_string(),
                orders.display().to_string(),
                "--executions".to_string(),
                executions.display().to_string(),
            ]);
        }
        let json = fx.path("summary.json");
        args.extend(["--json".to_string(), json.display().to_string()]);

        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        assert_exit(run(&argv), 0);

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        let sources = doc["sources"].as_object().unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources.values().all(|s| s["duplicates"] == 0));
        assert_eq!(doc["aggregates"]["summary"]["trades"], 4);
    }

    #[test]
    fn same_orders_file_twice_is_rejected() {
        let fx = Fixture::new(VALID_INI);
        let code = run(&[
            "analyze",
            "-c",
            fx.config.to_str().unwrap(),
            "--orders",
            fx.orders.to_str().unwrap(),
            "--executions",
            fx.executions.to_str().unwrap(),
            "--orders",
            fx.orders.to_str().unwrap(),
            "--executions",
            fx.executions.to_str().unwrap(),
        ]);
        assert_exit(code, 3);
    }

    #[test]
    fn unreadable_orders_file() {
        let fx = Fixture::new(VALID_INI);
        let code = run(&[
            "analyze",
            "-c",
            fx.config.to_str().unwrap(),
            "--orders",
            "/nonexistent/orders.csv",
            "--executions",
            fx.executions.to_str().unwrap(),
        ]);
        assert_exit(code, 3);
    }

    #[test]
    fn missing_profit_is_insufficient_data() {
        let fx = Fixture::new(VALID_INI);
        fs::write(
            &fx.executions,
            "order_id,price,executed_at,profit\n1,2000.00,2024-01-02 09:00:01,\n",
        )
        .unwrap();
        assert_exit(fx.analyze(&[]), 5);
    }
}
