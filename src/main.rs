use clap::Parser;
use finvault::cli::{Cli, Commands, Context};

/// Environment variable holding the log filter (e.g. `debug`, `finvault=trace`).
const LOG_ENV: &str = "FINVAULT_LOG";

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let result = Context::from_cli(&cli).and_then(|ctx| run(&cli, &ctx));

    if let Err(e) = result {
        finvault::cli::output::error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(cli: &Cli, ctx: &Context) -> finvault::errors::Result<()> {
    use finvault::cli::commands;

    match cli.command {
        Commands::Init => commands::init::execute(ctx),
        Commands::Add {
            ref kind,
            ref secrets,
            ref fields,
        } => commands::add::execute(ctx, kind, secrets, fields),
        Commands::List { ref kind } => commands::list::execute(ctx, kind.as_deref()),
        Commands::Show { ref id } => commands::show::execute(ctx, id),
        Commands::Edit {
            ref id,
            ref secrets,
            ref fields,
        } => commands::edit::execute(ctx, id, secrets, fields),
        Commands::Delete { ref id, force } => commands::delete::execute(ctx, id, force),
        Commands::ChangePassword => commands::change_password::execute(ctx),
        #[cfg(feature = "audit-log")]
        Commands::Audit {
            last,
            ref since,
            all_users,
        } => commands::audit_cmd::execute(ctx, last, since.as_deref(), all_users),
        #[cfg(not(feature = "audit-log"))]
        Commands::Audit { .. } => Err(finvault::errors::FinVaultError::CommandFailed(
            "this build has no audit log (rebuild with the `audit-log` feature)".into(),
        )),
    }
}
