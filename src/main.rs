use anyhow::Result;
use std::path::PathBuf;

use scorelens::config::Config;
use scorelens::db::{ImageFilter, ListQuery};
use scorelens::{logging, Gallery};

struct CliArgs {
    command: Command,
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
}

enum Command {
    Stats,
    RebuildCache,
    Keywords,
    Folders,
    Top,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut command = None;
    let mut config_path = None;
    let mut db_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("scorelens {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--db" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --db requires a path argument");
                    std::process::exit(1);
                }
            }
            "stats" => command = Some(Command::Stats),
            "rebuild-cache" => command = Some(Command::RebuildCache),
            "keywords" => command = Some(Command::Keywords),
            "folders" => command = Some(Command::Folders),
            "top" => command = Some(Command::Top),
            other => {
                eprintln!("Unknown argument: {}", other);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let command = command.unwrap_or_else(|| {
        print_help();
        std::process::exit(1);
    });

    CliArgs {
        command,
        config_path,
        db_path,
    }
}

fn print_help() {
    println!("scorelens - gallery database tool for AI-scored photo libraries");
    println!();
    println!("Usage: scorelens [OPTIONS] COMMAND");
    println!();
    println!("Commands:");
    println!("  stats          Show image, stack and folder counts");
    println!("  rebuild-cache  Rebuild the per-stack aggregate cache");
    println!("  keywords       List all distinct keywords");
    println!("  folders        List scored folders");
    println!("  top            Show the best-scored page of stacks");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>  Use an alternate config file");
    println!("      --db <PATH>      Use an alternate database file");
    println!("  -h, --help           Show this help");
    println!("  -V, --version        Show version");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    logging::init(None)?;

    let mut config = match args.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(db_path) = args.db_path {
        config.db_path = db_path;
    }

    let gallery = Gallery::open(&config);
    let filter = ImageFilter::default();

    match args.command {
        Command::Stats => {
            let images = gallery.get_image_count(&filter).await?;
            let stacks = gallery.get_stack_count(&filter).await?;
            let folders = gallery.get_folders().await;
            println!("images:  {}", images);
            println!("stacks:  {}", stacks);
            println!("folders: {}", folders.len());
        }
        Command::RebuildCache => {
            let cached = gallery.rebuild_stack_cache().await?;
            println!("Cached {} stacks", cached);
        }
        Command::Keywords => {
            for keyword in gallery.get_keywords().await {
                println!("{}", keyword);
            }
        }
        Command::Folders => {
            for folder in gallery.get_folders().await {
                let marker = if folder.is_fully_scored { " " } else { "*" };
                println!("{} {}", marker, folder.path);
            }
        }
        Command::Top => {
            let query = ListQuery {
                limit: config.gallery.page_size,
                ..Default::default()
            };
            for item in gallery.get_stacks(&query).await {
                let kind = if item.stack_id < 0 {
                    "image".to_string()
                } else {
                    format!("stack of {}", item.image_count)
                };
                println!(
                    "{:<10} {:>5.3}  {}",
                    kind,
                    item.score_general.unwrap_or(0.0),
                    item.file_name
                );
            }
        }
    }

    Ok(())
}
