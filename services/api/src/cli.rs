use crate::demo::{run_demo, DemoArgs};
use crate::infra::load_matrix;
use crate::server;
use admission_workflow::error::AppError;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Admission Workflow Engine",
    about = "Run and inspect the admission application workflow from the command line",
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
    /// Inspect or validate an authority matrix
    Matrix {
        #[command(subcommand)]
        command: MatrixCommand,
    },
    /// Walk a sample application through intake, approval, hold and cancellation
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum MatrixCommand {
    /// Print the matrix as JSON (built-in table unless a path is given)
    Show(MatrixArgs),
    /// Validate a matrix file and report its size
    Check(MatrixCheckArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured authority matrix file
    #[arg(long)]
    pub(crate) matrix: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct MatrixArgs {
    /// Authority matrix JSON file
    #[arg(long)]
    path: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct MatrixCheckArgs {
    /// Authority matrix JSON file
    path: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Matrix {
            command: MatrixCommand::Show(args),
        } => {
            let matrix = load_matrix(args.path.as_deref())?;
            println!("{}", matrix.to_json_pretty()?);
            Ok(())
        }
        Command::Matrix {
            command: MatrixCommand::Check(args),
        } => {
            let matrix = load_matrix(Some(args.path.as_path()))?;
            println!(
                "{}: {} entries across {} stages",
                args.path.display(),
                matrix.len(),
                admission_workflow::workflows::admission::Stage::ordered()
                    .into_iter()
                    .filter(|stage| !matrix.vocabulary(*stage).is_empty())
                    .count()
            );
            Ok(())
        }
        Command::Demo(args) => run_demo(args),
    }
}
