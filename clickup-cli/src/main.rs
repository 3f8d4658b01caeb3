use anyhow::{anyhow, bail, Context as _, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clickup_core::constants::{ENV_ACCESS_TOKEN, ENV_DEBUG, ENV_END_DATE, ENV_START_DATE};
use clickup_core::context::parse_date;
use clickup_core::{ApiClient, Context, Pipeline, Resource, SqliteSink};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    let db_path = Arg::new("db_path")
        .value_name("DB_PATH")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("SQLite database file, created when missing");

    Command::new("clickup-to-sqlite")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Save data from ClickUp to a SQLite database")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("fetch")
                .about("Fetch teams, spaces, folders, lists, tasks and time entries")
                .arg(db_path.clone())
                .arg(
                    Arg::new("auth_token")
                        .long("auth-token")
                        .visible_alias("access-token")
                        .value_name("TOKEN")
                        .env(ENV_ACCESS_TOKEN)
                        .hide_env_values(true)
                        .help("ClickUp personal or OAuth access token"),
                )
                .arg(
                    Arg::new("start_date")
                        .long("start-date")
                        .value_name("YYYY-MM-DD")
                        .env(ENV_START_DATE)
                        .help("Only tasks updated and time entries started after this date"),
                )
                .arg(
                    Arg::new("end_date")
                        .long("end-date")
                        .value_name("YYYY-MM-DD")
                        .env(ENV_END_DATE)
                        .help("Only tasks updated and time entries started before this date"),
                )
                .arg(
                    Arg::new("archived")
                        .long("archived")
                        .action(ArgAction::SetTrue)
                        .help("Also fetch archived spaces, folders, lists and tasks"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_name("FILE")
                        .value_parser(value_parser!(PathBuf))
                        .help("YAML configuration file"),
                ),
        )
        .subcommand(
            Command::new("stats")
                .about("Show the number of rows in every table")
                .arg(db_path),
        )
}

#[tokio::main]
async fn main() {
    // Initialize tracing, RUST_LOG wins over CLICKUP_DEBUG
    let debug = std::env::var(ENV_DEBUG)
        .ok()
        .and_then(|v| v.trim().parse::<i32>().ok())
        .unwrap_or(0);
    let default_level = if debug > 0 { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(err) => {
            let _ = err.print();
            std::process::exit(usage_exit_code(&err));
        }
    };

    let result = match matches.subcommand() {
        Some(("fetch", args)) => fetch(args).await,
        Some(("stats", args)) => stats(args).await,
        _ => Ok(()),
    };

    if let Err(err) = result {
        error!("✗ {}", err);
        std::process::exit(1);
    }
}

/// Help and version requests succeed, every other usage error exits 1.
fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        1
    } else {
        0
    }
}

/// Defaults, then the config file, then the environment, then flags.
fn fetch_context(args: &ArgMatches) -> Result<Context> {
    let config = args.get_one::<PathBuf>("config");
    let mut ctx = Context::from_file_and_env(config.map(PathBuf::as_path))?;

    if let Some(token) = args.get_one::<String>("auth_token") {
        ctx.access_token = token.clone();
    }
    if let Some(start) = args.get_one::<String>("start_date") {
        ctx.start_date =
            Some(parse_date(start).map_err(|err| anyhow!("bad start date {}: {}", start, err))?);
    }
    if let Some(end) = args.get_one::<String>("end_date") {
        ctx.end_date = Some(parse_date(end).map_err(|err| anyhow!("bad end date {}: {}", end, err))?);
    }
    if args.get_flag("archived") {
        ctx.archived = true;
    }

    ctx.validate()?;
    Ok(ctx)
}

async fn fetch(args: &ArgMatches) -> Result<()> {
    let ctx = fetch_context(args)?;
    let db_path = args
        .get_one::<PathBuf>("db_path")
        .context("DB_PATH is required")?;

    if ctx.ctx_out {
        info!("Context: {:?}", ctx);
    }

    info!("ClickUp to SQLite: {}", db_path.display());
    if let Some(start) = ctx.start_date {
        info!("From: {}", start.format("%Y-%m-%d"));
    }
    if let Some(end) = ctx.end_date {
        info!("To: {}", end.format("%Y-%m-%d"));
    }

    // Token problems should fail before the database file is created
    let client = ApiClient::new(&ctx)?;
    let sink = SqliteSink::open(db_path).await?;

    let result = Pipeline::new(&client, &sink, &ctx).run().await;
    sink.close().await;
    let summary = result?;

    info!("ClickUp fetch completed in {:?}", summary.elapsed);
    info!("Statistics:");
    for resource in Resource::ALL {
        info!("  {}: {}", resource, summary.rows(resource));
    }
    if summary.skipped > 0 {
        info!("  Skipped parents (not found): {}", summary.skipped);
    }

    Ok(())
}

async fn stats(args: &ArgMatches) -> Result<()> {
    let db_path = args
        .get_one::<PathBuf>("db_path")
        .context("DB_PATH is required")?;
    if !db_path.exists() {
        bail!("database {} does not exist", db_path.display());
    }

    let sink = SqliteSink::open_read_only(db_path).await?;
    for table in sink.tables().await? {
        let count = sink.count(&table).await?;
        println!("{}\t{}", table, count);
    }
    sink.close().await;
    Ok(())
}
