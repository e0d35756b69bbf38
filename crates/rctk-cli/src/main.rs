//! 🚀 rctk — the front door, the bouncer, the maitre d' of the cloud toolkit.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate parses the arguments, sets up logging, loads config,
//! and then lets the library do the heavy lifting. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::{Table, presets::UTF8_FULL};
use rctk::batch::BatchReport;
use rctk::commands::observer::{DEFAULT_IDENTIFIER, FUNCTION_THRESHOLD, InstallArgs, ROLE_THRESHOLD};
use rctk::commands::{self, Context};
use rctk::pagination::PaginationSummary;
use rctk::provisioning::{ProvisioningResult, TeardownReport};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// ☁️ Operator tooling for AWS accounts: exports, batch edits, and the observer.
#[derive(Debug, Parser)]
#[command(name = "rctk", version, about)]
struct Cli {
    /// how chatty the logs are (RUST_LOG wins when set)
    #[arg(long, value_enum, default_value_t = Verbosity::Normal, global = true)]
    verbosity: Verbosity,

    /// AWS profile to use
    #[arg(long, global = true)]
    profile: Option<String>,

    /// AWS region to use
    #[arg(long, global = true)]
    region: Option<String>,

    /// a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Verbosity {
    /// errors only, no progress
    Silent,
    Normal,
    Debug,
    Trace,
}

impl Verbosity {
    fn filter(self) -> &'static str {
        match self {
            Verbosity::Silent => "error",
            Verbosity::Normal => "info",
            Verbosity::Debug => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// DynamoDB tables
    #[command(subcommand)]
    Dynamo(DynamoCommand),
    /// CloudWatch log groups
    #[command(subcommand)]
    Cloudwatch(CloudwatchCommand),
    /// Lambda functions
    #[command(subcommand)]
    Lambda(LambdaCommand),
    /// the observer stack
    #[command(subcommand)]
    Observer(ObserverCommand),
    /// the deployment lifecycle database
    #[command(subcommand)]
    Postgres(PostgresCommand),
}

#[derive(Debug, Subcommand)]
enum DynamoCommand {
    /// export a whole table as NDJSON
    Export { table: String, file: PathBuf },
    /// apply one JSON patch to many items
    ModifyBatch {
        /// an existing table's name
        table: String,
        /// the hash key attribute name
        key: String,
        /// a JSON array of key values (or of objects holding them)
        source: PathBuf,
        /// a JSON object to set on every item
        patch: PathBuf,
        /// path to the key inside each source object (ex. item.id)
        #[arg(long)]
        map_source_attribute: Option<String>,
        /// keep going after a failed update
        #[arg(long)]
        continue_on_error: bool,
    },
}

#[derive(Debug, Subcommand)]
enum CloudwatchCommand {
    /// export every stream of a log group
    Export { group: String, file: PathBuf },
}

#[derive(Debug, Subcommand)]
enum LambdaCommand {
    /// invoke many functions with one event
    InvokeBatch {
        /// a JSON array of function ARNs (or of objects holding them)
        source: PathBuf,
        /// a JSON file with the event
        event: PathBuf,
        /// path to the ARN inside each source object (ex. payload.lambda.arn)
        #[arg(long)]
        map_source_attribute: Option<String>,
        /// stop on the first failed invocation
        #[arg(long)]
        stop_on_error: bool,
        /// only check that the invocations would be allowed
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Args)]
struct Identifier {
    /// observer identifier (multiple instances per account)
    #[arg(long = "identifier", visible_alias = "id", default_value = DEFAULT_IDENTIFIER)]
    value: String,
}

#[derive(Debug, Subcommand)]
enum ObserverCommand {
    /// create (or with --force, update) the role, function and rule
    Install {
        /// web hook the observer reports to
        hook: String,
        #[command(flatten)]
        identifier: Identifier,
        /// do not run the bundle build command
        #[arg(long)]
        skip_build: bool,
        /// update resources that already exist
        #[arg(long)]
        force: bool,
        /// bundle to deploy instead of <observer_dir>/code.zip
        #[arg(long)]
        bundle: Option<PathBuf>,
        /// role policy instead of <observer_dir>/role.json
        #[arg(long)]
        role_policy: Option<PathBuf>,
    },
    /// remove the rule, function and role
    Uninstall {
        #[command(flatten)]
        identifier: Identifier,
    },
    /// run a scan now and print the result
    Invoke {
        #[command(flatten)]
        identifier: Identifier,
        /// let the observer post to its web hook
        #[arg(long)]
        publish: bool,
    },
    /// export the observer's logs
    Logs {
        #[command(flatten)]
        identifier: Identifier,
        /// write here instead of stdout
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// count functions and roles against the account thresholds
    Usage,
}

#[derive(Debug, Subcommand)]
enum PostgresCommand {
    /// export one deployment's state and commands as JSON
    #[command(alias = "exp-dep")]
    ExportDeployment {
        deployment: String,
        file: PathBuf,
        /// Aurora cluster ARN
        #[arg(long)]
        cluster_arn: String,
        /// Secrets Manager ARN with the cluster credentials
        #[arg(long)]
        secret_arn: String,
    },
}

fn table(header: [&str; 2], rows: Vec<[String; 2]>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header.to_vec());
    for row in rows {
        table.add_row(row.to_vec());
    }
    table
}

fn print_export(summary: PaginationSummary) {
    println!(
        "{}",
        table(
            ["pages", "items"],
            vec![[summary.pages.to_string(), summary.items.to_string()]]
        )
    );
}

fn print_batch(report: &BatchReport) {
    let mut rows = vec![
        ["succeeded".to_string(), report.succeeded.to_string()],
        ["failed".to_string(), report.failed.to_string()],
    ];
    rows.extend(report.failures.iter().map(|(item, err)| [item.clone(), err.clone()]));
    println!("{}", table(["item", "result"], rows));
}

fn print_install(results: [(&str, &ProvisioningResult); 3]) {
    let rows = results
        .into_iter()
        .map(|(kind, result)| {
            let state = if result.existed { "updated" } else { "created" };
            [format!("{kind} ({state})"), result.resource_arn.clone()]
        })
        .collect();
    println!("{}", table(["resource", "arn"], rows));
}

fn print_teardown(report: &TeardownReport) {
    let mut rows: Vec<[String; 2]> = Vec::new();
    rows.extend(report.removed.iter().map(|label| [label.clone(), "removed".to_string()]));
    rows.extend(report.absent.iter().map(|label| [label.clone(), "not found".to_string()]));
    rows.extend(report.failed.iter().map(|(label, err)| [label.clone(), format!("failed: {err}")]));
    println!("{}", table(["resource", "outcome"], rows));
}

/// 🎯 Route the parsed command to its handler and print whatever it reports.
async fn run(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Dynamo(DynamoCommand::Export { table, file }) => {
            print_export(commands::dynamo::export(ctx, &table, file).await?);
        }
        Command::Dynamo(DynamoCommand::ModifyBatch {
            table,
            key,
            source,
            patch,
            map_source_attribute,
            continue_on_error,
        }) => {
            let args = commands::dynamo::ModifyBatchArgs {
                table,
                key,
                source,
                patch,
                map_source_attribute,
                continue_on_error,
            };
            print_batch(&commands::dynamo::modify_batch(ctx, args).await?);
        }
        Command::Cloudwatch(CloudwatchCommand::Export { group, file }) => {
            let (streams, events) = commands::cloudwatch::export(ctx, &group, file).await?;
            info!("📜 {streams} streams exported");
            print_export(events);
        }
        Command::Lambda(LambdaCommand::InvokeBatch {
            source,
            event,
            map_source_attribute,
            stop_on_error,
            dry_run,
        }) => {
            let args = commands::lambda::InvokeBatchArgs {
                source,
                event,
                map_source_attribute,
                stop_on_error,
                dry_run,
            };
            print_batch(&commands::lambda::invoke_batch(ctx, args).await?);
        }
        Command::Observer(ObserverCommand::Install {
            hook,
            identifier,
            skip_build,
            force,
            bundle,
            role_policy,
        }) => {
            let args = InstallArgs {
                web_hook: hook,
                identifier: identifier.value,
                skip_build,
                force,
                bundle,
                role_policy,
            };
            let installed = commands::observer::install(ctx, args).await?;
            print_install([
                ("role", &installed.role),
                ("function", &installed.function),
                ("rule", &installed.rule),
            ]);
        }
        Command::Observer(ObserverCommand::Uninstall { identifier }) => {
            let report = commands::observer::uninstall(ctx, &identifier.value).await;
            print_teardown(&report);
            if !report.is_clean() {
                warn!("⚠️ some resources could not be removed, run uninstall again to retry them");
            }
        }
        Command::Observer(ObserverCommand::Invoke { identifier, publish }) => {
            let answer = commands::observer::invoke(ctx, &identifier.value, publish).await?;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::Observer(ObserverCommand::Logs { identifier, file }) => {
            let to_stdout = file.is_none();
            let (streams, events) = commands::observer::logs(ctx, &identifier.value, file).await?;
            // the log lines themselves went to stdout, keep it clean
            if !to_stdout {
                info!("📜 {streams} streams exported");
                print_export(events);
            }
        }
        Command::Observer(ObserverCommand::Usage) => {
            let usage = commands::observer::usage(ctx).await?;
            println!(
                "{}",
                table(
                    ["resource", "count / threshold"],
                    vec![
                        ["functions".to_string(), format!("{} / {FUNCTION_THRESHOLD}", usage.functions)],
                        ["roles".to_string(), format!("{} / {ROLE_THRESHOLD}", usage.roles)],
                    ]
                )
            );
        }
        Command::Postgres(PostgresCommand::ExportDeployment {
            deployment,
            file,
            cluster_arn,
            secret_arn,
        }) => {
            let args = commands::postgres::ExportDeploymentArgs {
                deployment,
                file,
                cluster_arn,
                secret_arn,
            };
            commands::postgres::export_deployment(ctx, args).await?;
        }
    }
    Ok(())
}

/// 🚀 main() — where it all begins. The genesis. The big bang.
///
/// 🔧 Steps:
/// 1. Parse args (clap does the yelling if they're wrong)
/// 2. Init tracing (so we can see what goes wrong, and when)
/// 3. Load config (the moment of truth)
/// 4. Run the thing (send it and pray 🙏)
/// 5. Handle errors (cry)
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 📡 RUST_LOG beats --verbosity. Logs go to stderr so stdout can be piped.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.verbosity.filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let show_progress = cli.verbosity != Verbosity::Silent;
    let result = async move {
        let app_config = rctk::app_config::load_config(cli.config.as_deref())
            .context("💀 In rctk, main, we couldn't load the configuration. Check the file and the RCTK_* variables.")?
            .with_overrides(cli.profile, cli.region);
        let ctx = Context::connect(app_config, show_progress).await;
        run(cli.command, &ctx).await
    }
    .await;

    // 💀 Error handling: the part where we find out what went wrong
    // and print it in a way that's helpful at 3am
    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion, one layer at a time
        let mut smells_like_credentials = false;
        let mut smells_like_throttling = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("ExpiredToken")
                || cause_str.contains("UnrecognizedClientException")
                || cause_str.contains("InvalidClientTokenId")
                || cause_str.contains("credentials")
                || cause_str.contains("AccessDenied")
            {
                smells_like_credentials = true;
            }
            if cause_str.contains("Throttl")
                || cause_str.contains("Rate exceeded")
                || cause_str.contains("TooManyRequests")
            {
                smells_like_throttling = true;
            }
        }

        if smells_like_credentials {
            error!(
                "🔧 hint: this looks like a credentials problem. Check --profile / --region, \
                 AWS_PROFILE, or refresh your session. Tokens expire, it's not personal. ☕"
            );
        }
        if smells_like_throttling {
            error!(
                "🔧 hint: the account is throttling us. Raise RCTK_RETRY__MAX_ATTEMPTS, \
                 lower runtime.batch_concurrency, or just wait a minute."
            );
        }

        // 🗑️ Exit with prejudice.
        std::process::exit(1);
    }

    Ok(())
}
