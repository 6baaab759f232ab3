use clap::Parser;
use leurre::configuration::config::Config;
use leurre::controller::controller_handler::Controller;
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "leurre")]
#[command(version = "0.1.0")]
#[command(about = "A low-interaction FTP, SSH and HTTP honeypot")]
struct Args {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(env = "LEURRE_CONFIG")]
    config_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
██╗     ███████╗██╗   ██╗██████╗ ██████╗ ███████╗
██║     ██╔════╝██║   ██║██╔══██╗██╔══██╗██╔════╝
██║     █████╗  ██║   ██║██████╔╝██████╔╝█████╗
██║     ██╔══╝  ██║   ██║██╔══██╗██╔══██╗██╔══╝
███████╗███████╗╚██████╔╝██║  ██║██║  ██║███████╗
╚══════╝╚══════╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝
=================================================
        FTP / SSH / HTTP honeypot v0.1.0
=================================================
"
    );

    let args = Args::parse();

    let config = match args.config_file {
        Some(path) => {
            info!("Importing configuration from {}", path.display());
            match Config::from_file(&path) {
                Ok(config) => config,
                Err(e) => {
                    error!("Unable to import configuration from file: {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            info!("No configuration file given, using defaults");
            Config::default()
        }
    };

    let mut controller = match Controller::new(config) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    info!("Spawning the controller");
    let code = match controller.run().await {
        Ok(code) => code,
        Err(e) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            1
        }
    };
    std::process::exit(code);
}
