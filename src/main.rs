use std::{
    error::Error,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Local;
use clap::{command, Parser, Subcommand};
use group_alarm::{
    command::{parse_command, Command as Line},
    communication::{ConsoleOutput, Output},
    config::Config,
    AlarmSystem,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// config file to use instead of the platform default
    #[clap(long)]
    config: Option<PathBuf>,
    /// display thread poll interval, overrides the config file
    #[clap(long)]
    tick_ms: Option<u64>,
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// write a default config file
    Init {
        #[clap(long, short)]
        force: bool,
    },
}

const WELCOME: [&str; 8] = [
    "Alarm System Initialized. Enter commands in the following formats:",
    "  Start_Alarm(ID): Group(Group_ID) Interval Time Message",
    "  Change_Alarm(ID): Group(Group_ID) Time Message",
    "  Cancel_Alarm(ID)",
    "  Suspend_Alarm(ID)",
    "  Reactivate_Alarm(ID)",
    "  View_Alarms",
    "  quit or exit to terminate the program",
];

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger, the alarm system still works without a log file
    if let Err(e) = simple_file_logger::init_logger!("group_alarm") {
        eprintln!("couldn't initialize logger: {e:?}");
    }

    let args = Args::parse();
    let present = args
        .config
        .as_deref()
        .map_or_else(Config::is_config_present, Path::exists);
    let path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };

    if let Some(Command::Init { force }) = args.command {
        if force || !present {
            Config::new().save(&path)?;
            println!("wrote default config to {}", path.display());
        } else {
            println!("{} already exists, use --force to overwrite", path.display());
        }
        return Ok(());
    }

    let mut config = Config::load_or_default(&path)?;
    if let Some(tick_ms) = args.tick_ms {
        config.display_tick_ms = tick_ms;
    }
    log::set_max_level(config.level_filter());
    log::info!("starting with {config:?}");

    let output: Arc<dyn Output> = Arc::new(ConsoleOutput::new());
    let system = AlarmSystem::start(&config, Arc::clone(&output))?;
    for line in WELCOME {
        output.emit(line);
    }

    for line in io::stdin().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_command(&line, Local::now()) {
            Ok(Line::Quit) => break,
            Ok(Line::Request(request)) => {
                system.submit(request);
            }
            Err(e) => {
                log::debug!("rejected {line:?}: {e}");
                output.emit(&format!("Error: {e}"));
            }
        }
    }

    output.emit("Exiting alarm system...");
    Ok(())
}
