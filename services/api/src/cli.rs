use crate::demo::{run_demo, run_policy_report, DemoArgs, PolicyArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use grievance_core::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Grievance Case Integrity",
    about = "Run and demonstrate the grievance case lifecycle engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Inspect lifecycle policies
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
    /// Walk a scripted grievance from intake to closure and print what the engine recorded
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum PolicyCommand {
    /// Validate a policy file (or the standard policy) and print its graph and SLA table
    Show(PolicyArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Policy {
            command: PolicyCommand::Show(args),
        } => run_policy_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
