//! Config validation CLI tool
//!
//! Validates a studyhalld configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use studyhall_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a studyhalld configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match studyhall_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", studyhall_config::CURRENT_CONFIG_VERSION);
            println!("  Socket: {}", settings.service.socket_path.display());
            println!("  Data dir: {}", settings.service.data_dir.display());
            println!(
                "  Session defaults: {} min study, {} min break",
                settings.session.study_minutes, settings.session.break_minutes
            );
            println!(
                "  Timers: scan every {}s, study tick {}s, break tick {}s, {} settle attempts",
                settings.timers.late_join_scan.as_secs(),
                settings.timers.study_tick.as_secs(),
                settings.timers.break_tick.as_secs(),
                settings.timers.settle_attempts
            );
            println!("  Leaderboard capacity: {}", settings.leaderboard.capacity);

            println!();
            println!("Organizations ({}):", settings.organizations.len());
            for org in &settings.organizations {
                println!("  - {}", org);
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                studyhall_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                studyhall_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                studyhall_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                studyhall_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        studyhall_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
