use clap::Parser;
use tollgate::cli::{
    handle_config_init, handle_plans_validate, Cli, Commands, ConfigCommands, PlansCommands,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => tollgate::cli::serve::run_serve(args).await,
        Commands::Plans(cmd) => match cmd {
            PlansCommands::Validate(args) => {
                let output = handle_plans_validate(&args)?;
                println!("{}", output);
                Ok(())
            }
        },
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Init(args) => handle_config_init(&args),
        },
    }
}
