//! Standalone setup checker for the sticker converter bot.
//!
//! Verifies the file layout, native tools, environment and scratch
//! directory before the bot is started or deployed.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use sticker_converter_bot::config::{BotSettings, ConfigError, TelegramConfig};

/// Files expected in the project root.
const REQUIRED_FILES: [&str; 3] = ["Cargo.toml", "Dockerfile", ".env.example"];

/// Sticker bot setup checker.
#[derive(Parser, Debug)]
#[command(name = "check_setup")]
#[command(about = "Checks that the sticker converter bot is ready to run")]
#[command(version)]
struct Args {
    /// Path to the .env file for environment variables.
    #[arg(long, default_value = ".env")]
    env_file: String,

    /// Project root containing Cargo.toml and the Dockerfile.
    #[arg(long, default_value = ".")]
    root: String,

    /// Skip the file structure check (e.g. inside the runtime image).
    #[arg(long)]
    skip_files: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    println!("🚀 Telegram Sticker Bot Setup Test\n");

    let mut all_passed = true;

    if !args.skip_files {
        all_passed &= check_file_structure(Path::new(&args.root));
    }

    // Load before reading any settings so .env values apply to every check
    let env_loaded = dotenvy::from_filename(&args.env_file).is_ok();
    let settings = BotSettings::from_env_with_defaults();

    all_passed &= check_environment(&args.env_file, env_loaded);
    all_passed &= check_tools(&settings);
    all_passed &= check_scratch_dir(&settings);

    println!("\n{}", "=".repeat(50));

    if all_passed {
        println!("🎉 All tests passed! Your bot is ready to run.");
        println!("\nTo start the bot:");
        println!("  cargo run --release --bin sticker_bot");
        println!("\nOr with Docker:");
        println!("  docker build -t telegram-sticker-bot .");
        println!(
            "  docker run -d --name sticker-bot -e BOT_TOKEN=your_token \
             -e TG_API_ID=your_api_id -e TG_API_HASH=your_api_hash telegram-sticker-bot"
        );
        ExitCode::SUCCESS
    } else {
        println!("❌ Some tests failed. Please fix the issues above.");
        ExitCode::FAILURE
    }
}

fn check_file_structure(root: &Path) -> bool {
    println!("🔍 Testing file structure...");

    let mut all_exist = true;
    for file in REQUIRED_FILES {
        if root.join(file).exists() {
            println!("✅ {file}");
        } else {
            println!("❌ {file} missing");
            all_exist = false;
        }
    }

    all_exist
}

fn check_environment(env_file: &str, env_loaded: bool) -> bool {
    println!("\n🔍 Testing environment...");

    if env_loaded {
        println!("✅ {env_file} file found");
    } else {
        println!("⚠️  {env_file} not found, using process environment only");
    }

    match TelegramConfig::from_env() {
        Ok(config) => {
            println!("✅ BOT_TOKEN configured");
            println!("✅ TG_API_ID / TG_API_HASH configured (api id {})", config.api_id);
            true
        }
        Err(ConfigError::PlaceholderToken) => {
            println!("❌ BOT_TOKEN not configured properly");
            println!("   Please set your bot token in {env_file}");
            false
        }
        Err(e) => {
            println!("❌ {e}");
            println!("   Please copy .env.example to {env_file} and fill it in");
            false
        }
    }
}

fn check_tools(settings: &BotSettings) -> bool {
    println!("\n🔍 Testing native tools...");

    let mut all_found = true;
    for tool in [&settings.ffmpeg_path, &settings.ffprobe_path] {
        match which::which(tool) {
            Ok(path) => println!("✅ {tool} ({})", path.display()),
            Err(_) => {
                println!("❌ {tool} not found");
                all_found = false;
            }
        }
    }

    all_found
}

fn check_scratch_dir(settings: &BotSettings) -> bool {
    println!("\n🔍 Testing scratch directory...");

    let dir = match settings.ensure_temp_dir() {
        Ok(dir) => dir,
        Err(e) => {
            println!("❌ {e}");
            return false;
        }
    };

    let probe = dir.join(".write_test");
    let writable = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);

    if writable {
        println!("✅ {} is writable", dir.display());
    } else {
        println!("❌ {} is not writable", dir.display());
    }
    writable
}
