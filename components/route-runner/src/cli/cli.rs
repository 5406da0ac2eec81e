// Local crates
use crate::cli::flags::parse_route_flags;
use crate::helpers::load_config::Settings;
use crate::instrumentation;
use crate::runtime::runtime::{self, RouteSource};

// External crates
use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ves-route",
    long_about = "ves-route assembles reader -> controller -> writer routes from YAML/JSON configuration or command-line flags and runs them.",
    about = "Route configuration resolver and runner",
    version,
    arg_required_else_help = true,
    term_width = 100,
    after_help = "\
    EXAMPLES:
        ves-route run --config ./routes.yaml
        ves-route run --from @ves/dir-reader --from.args.dir ./pages --to @ves/stdout-writer
        ves-route validate -c ./routes.yaml"
)]
struct Cli {
    /// Application settings file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve routes and run them
    Run(RouteArgs),

    /// Resolve routes without running them
    Validate(RouteArgs),
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// Load routes from a YAML or JSON file
    #[arg(short, long, value_name = "FILE", conflicts_with = "route")]
    config: Option<PathBuf>,

    /// Route options: --from <module>, --from.module, --from.export,
    /// --from.args.<path>, the same for --to, --controller,
    /// --controller.module, --controller.export and --variables.<path>
    #[arg(
        value_name = "ROUTE OPTIONS",
        trailing_var_arg = true,
        allow_hyphen_values = true,
        num_args = 0..
    )]
    route: Vec<String>,
}

impl RouteArgs {
    /// `None` when neither a file nor route options were given.
    fn source(&self) -> Result<Option<RouteSource>> {
        if let Some(config) = &self.config {
            return Ok(Some(RouteSource::File(config.clone())));
        }
        if self.route.is_empty() {
            return Ok(None);
        }
        Ok(Some(RouteSource::Flags(parse_route_flags(&self.route)?)))
    }
}

/// Parses command-line arguments. `None` when the help page was printed
/// because nothing was given.
fn parse_cli<I, T>(args: I) -> std::result::Result<Option<Cli>, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(e) if e.kind() == ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            e.print()?;
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Entry function for CLI
pub async fn run() -> Result<()> {
    let Some(cli) = parse_cli(std::env::args_os()).unwrap_or_else(|e| e.exit()) else {
        return Ok(());
    };

    let settings = Settings::load(cli.settings.as_deref())?;
    let _guard = instrumentation::tracing::init_tracing(&settings.logging)?;
    instrumentation::tracing::init_panic_handler();

    match cli.command {
        Commands::Run(args) => match args.source()? {
            Some(source) => run_routes(&settings, source).await?,
            None => show_help("run")?,
        },
        Commands::Validate(args) => match args.source()? {
            Some(source) => validate_routes(&settings, source).await?,
            None => show_help("validate")?,
        },
    }

    Ok(())
}

//
// ------------------------ Command Implementations ------------------------------
//

async fn run_routes(settings: &Settings, source: RouteSource) -> Result<()> {
    let summary = runtime::run_route_runner(settings, source).await?;
    if summary.cancelled {
        eprintln!(
            "Run cancelled after {} route(s), {} record(s) written",
            summary.routes, summary.records_written
        );
    }
    Ok(())
}

async fn validate_routes(settings: &Settings, source: RouteSource) -> Result<()> {
    let count = runtime::validate_routes(settings, source).await?;
    println!("Configuration valid: {count} route(s) resolved");
    Ok(())
}

fn show_help(subcommand: &str) -> Result<()> {
    let mut command = Cli::command();
    command.build();
    match command.find_subcommand_mut(subcommand) {
        Some(sub) => sub.print_help()?,
        None => command.print_help()?,
    }
    Ok(())
}
