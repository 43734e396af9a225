use ad_insertion::config::{SessionConfig, ViolationPolicy};
use ad_insertion::protocol::VideoAd;
use ad_insertion::rendition::MediaRendition;
use ad_insertion::report::{ReportRecorder, Transcript};
use ad_insertion::rodio_bridge::RodioBridge;
use ad_insertion::runtime::spawn_session_runtime;
use ad_insertion::scripted::ScriptedAdSession;
use ad_insertion::timer::SystemClock;
use ad_insertion::video_item::VideoItem;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "adsession", about = "Ad insertion session player")]
struct Cli {
    /// Session config file (defaults to the per-user config dir)
    #[arg(long = "config-file", global = true)]
    config_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a content file with mid-roll ads
    Play {
        /// Content file
        content: PathBuf,
        /// Ad file, optionally tagged with a bitrate: FILE[@KBPS]
        #[arg(long = "ad")]
        ads: Vec<String>,
        /// Mid-roll position in seconds (repeatable)
        #[arg(long = "midroll")]
        midrolls: Vec<f64>,
        /// Seconds an ad may take to start before it is failed
        #[arg(long, default_value_t = 8.0)]
        timeout: f64,
        /// Abort on illegal operations (overrides config)
        #[arg(long)]
        strict: bool,
        /// Write the report transcript as JSON when the session ends
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
    /// Session configuration
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Show current configuration
    Show,
    /// Set the illegal-operation policy
    Policy {
        /// strict or lenient
        policy: String,
    },
    /// Set the progress sampling interval
    Interval {
        /// Interval in milliseconds
        ms: u64,
    },
}

/// Parse `FILE[@KBPS]`. A missing or unparsable bitrate counts as 0.
fn parse_ad_arg(arg: &str) -> MediaRendition {
    match arg.rsplit_once('@') {
        Some((path, kbps)) if !path.is_empty() => match kbps.parse::<u32>() {
            Ok(kbps) => MediaRendition::new(path, kbps),
            Err(_) => MediaRendition::new(arg, 0),
        },
        _ => MediaRendition::new(arg, 0),
    }
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config_file.or_else(SessionConfig::default_path) {
        Some(p) => p,
        None => {
            eprintln!("Error: no config directory on this platform; pass --config-file");
            std::process::exit(1);
        }
    };
    let mut config = SessionConfig::load(&config_path);

    match cli.command {
        Commands::Play {
            content,
            ads,
            midrolls,
            timeout,
            strict,
            transcript,
        } => {
            if !content.exists() {
                eprintln!("Error: file '{}' not found", content.display());
                std::process::exit(1);
            }
            if !timeout.is_finite() || timeout <= 0.0 {
                eprintln!("Error: --timeout must be a positive number of seconds");
                std::process::exit(1);
            }
            if strict {
                config.illegal_operation_policy = ViolationPolicy::Strict;
            }

            let ads: Vec<Arc<VideoAd>> = ads
                .iter()
                .enumerate()
                .map(|(i, arg)| Arc::new(VideoAd::new(format!("ad-{}", i + 1), vec![parse_ad_arg(arg)])))
                .collect();

            let mut item = VideoItem::new(content.to_string_lossy());
            item.midroll_positions = midrolls;

            println!(
                "Playing '{}' ({} ad(s), {} mid-roll(s), policy: {})...",
                content.display(),
                ads.len(),
                item.midroll_positions.len(),
                config.illegal_operation_policy
            );

            let recorded = Transcript::default();
            let session_transcript = recorded.clone();
            let ad_timeout = Duration::from_secs_f64(timeout);

            let runtime = spawn_session_runtime(
                config,
                item,
                SystemClock::new(),
                |_| RodioBridge::new(),
                move |_, settings, handle| {
                    ReportRecorder::tee(ScriptedAdSession::start(settings, ads, ad_timeout, handle))
                        .with_transcript(session_transcript)
                },
                Some(Box::new(|ad: &VideoAd| match &ad.click_through_url {
                    Some(url) => println!("Click-through: {}", url),
                    None => println!("Click-through on ad {}", ad.id),
                })),
            );
            let runtime = match runtime {
                Ok(r) => r,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };

            let outcome = runtime.join();

            if let Some(path) = transcript {
                match recorded.save_json(&path) {
                    Ok(()) => println!("Transcript written to {}", path.display()),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }

            match outcome {
                Ok(phase) => println!("Session finished ({}).", phase),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigCmd::Show => {
                println!("Config file:          {}", config_path.display());
                println!("Illegal operations:   {}", config.illegal_operation_policy);
                println!("Progress interval:    {} ms", config.progress_interval_ms);
                println!("Bridge poll interval: {} ms", config.bridge_poll_interval_ms);
            }
            ConfigCmd::Policy { policy } => {
                match ViolationPolicy::from_str_loose(&policy) {
                    Ok(p) => config.illegal_operation_policy = p,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        std::process::exit(1);
                    }
                }
                if let Err(e) = config.save(&config_path) {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
                println!("Illegal-operation policy set to {}", config.illegal_operation_policy);
            }
            ConfigCmd::Interval { ms } => {
                config.progress_interval_ms = ms;
                if let Err(e) = config.save(&config_path) {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
                println!("Progress interval set to {} ms", ms);
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ad_arg_with_bitrate() {
        let r = parse_ad_arg("spots/car.mp3@1200");
        assert_eq!(r.url, "spots/car.mp3");
        assert_eq!(r.bitrate, 1200);
    }

    #[test]
    fn ad_arg_without_bitrate() {
        let r = parse_ad_arg("spots/car.mp3");
        assert_eq!(r.url, "spots/car.mp3");
        assert_eq!(r.bitrate, 0);
    }

    #[test]
    fn ad_arg_with_at_in_path_keeps_whole_path() {
        let r = parse_ad_arg("spots/x@home/car.mp3");
        assert_eq!(r.url, "spots/x@home/car.mp3");
        assert_eq!(r.bitrate, 0);
    }

    #[test]
    fn cli_parses_repeated_ads_and_midrolls() {
        let cli = Cli::parse_from([
            "adsession", "play", "show.mp3", "--ad", "a.mp3@300", "--ad", "b.mp3", "--midroll",
            "30", "--midroll", "90", "--strict",
        ]);
        match cli.command {
            Commands::Play { ads, midrolls, strict, timeout, .. } => {
                assert_eq!(ads, vec!["a.mp3@300", "b.mp3"]);
                assert_eq!(midrolls, vec![30.0, 90.0]);
                assert!(strict);
                assert_eq!(timeout, 8.0);
            }
            _ => panic!("expected play"),
        }
    }
}
