//! Es Fixture CLI: Binary crate entry-point
//! =======================================
//!
//! Starts a throwaway Elasticsearch exactly the way the test fixtures would,
//! prints where it listens and keeps it up until Ctrl-C. Handy for poking at
//! a fixture by hand or for checking that a local install is usable.
//!
//! ## Typical usage
//! ```text
//! # Start with defaults (random free port, /usr/share/elasticsearch)
//! $ es-fixture-cli
//!
//! # Another install, fixed port
//! $ es-fixture-cli --elasticsearch-executable /opt/es-6.8/bin/elasticsearch --elasticsearch-port 9250
//!
//! # What would be run?
//! $ es-fixture-cli version
//! $ es-fixture-cli command
//! ```
//!
//! Every `--elasticsearch-*` flag can also come from its `ELASTICSEARCH_*`
//! variable or a TOML file (`--config`, else `$ES_FIXTURE_CONFIG`).

// cargo run --bin es-fixture-cli -- --elasticsearch-port 9250

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use es_fixture::*;

#[derive(Debug, Parser)]
#[command(name = "es-fixture-cli", version)]
struct Cli {
    #[command(flatten)]
    options: FixtureOptions,

    /// TOML file with fixture options
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Fixture name, used for the scratch directory
    #[arg(long, default_value = "es_fixture_cli")]
    name: String,

    /// Also write rotated log files here
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// No log output
    #[arg(long, short = 'q')]
    quiet: bool,

    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Print the server version and the command line dialect it gets
    Version,

    /// Print the command line a fixture would run, without running it
    Command,
}

fn main() -> FixtureResult<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::new().logger_name("es_fixture_cli");
    if cli.quiet {
        logging = logging.logging_enabled(false);
    }
    if let Some(dir) = &cli.log_dir {
        logging = logging.log_dir(dir);
    }
    logging.init_global()?;

    let factory = ElasticsearchProc::builder()
        .name(cli.name)
        .options(cli.options)
        .maybe_config_file(cli.config)
        .build();

    match cli.cmd {
        Some(Cmd::Version) => {
            let mut fixture = factory.prepare()?;
            let version = fixture.executor_mut().version()?;
            let dialect = select_dialect(version)?;
            println!("Elasticsearch {version}");
            println!("transport port setting: {}", dialect.transport_port_key);
            return Ok(());
        }

        Some(Cmd::Command) => {
            let mut fixture = factory.prepare()?;
            println!("{}", fixture.executor_mut().command_line()?.join(" "));
            return Ok(());
        }

        None => { /* fall through to normal launch path */ }
    }

    let mut fixture = factory.start()?;

    println!("✅ Elasticsearch running: {}", fixture.url());
    if let Some(pid) = fixture.executor().pid() {
        println!("   pid {pid}, data in {}", fixture.scratch().root().display());
    }
    println!("Press Ctrl-C to stop.");

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| FixtureError::InvalidConfig {
        field: "signal handler",
        reason: format!("Failed to set Ctrl-C handler: {e}"),
    })?;

    // Wake up now and then so a server that dies on its own ends the wait.
    loop {
        match rx.recv_timeout(std::time::Duration::from_secs(1)) {
            Ok(()) | Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                if let Err(e) = fixture.executor_mut().check_alive() {
                    eprintln!("❌ {e}");
                    fixture.teardown()?;
                    return Err(e);
                }
            }
        }
    }

    fixture.teardown()?;
    println!("🔻 Elasticsearch stopped");
    Ok(())
}
