mod cli;

use reelplay::{config, export, playback, player::Player};
use reelplay_container::{BufferedMixer, PlaybackContext, SystemTimeSource, TimeSource};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelplay=debug,reelplay_container=debug,reelplay_codec=trace".to_string()
        } else {
            "reelplay=info,reelplay_container=warn,reelplay_codec=warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Info { file, json } => info_file(&file, cli.config.as_deref(), json),
        Commands::Play { file, no_audio } => play_file(&file, cli.config.as_deref(), no_audio),
        Commands::Extract {
            file,
            output,
            stride,
        } => extract_file(&file, cli.config.as_deref(), output.as_deref(), stride),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelplay {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_input(file: &Path) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("Input file does not exist: {:?}", file);
    }
    Ok(())
}

fn info_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    check_input(file)?;
    let config = config::load_config_or_default(config_path)?;
    let player = Player::open(file, &config, PlaybackContext::headless())?;
    let info = player
        .info()
        .ok_or_else(|| anyhow::anyhow!("Container has no video track"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Format: {}", player.format());
    println!("Size: {}x{}", info.width, info.height);
    println!("Frames: {} ({} keyframes)", info.frame_count, info.keyframes);
    println!("Frame rate: {:.3} fps", info.frame_rate.as_f64());
    let secs = info.duration_ms / 1000;
    println!(
        "Duration: {:02}:{:02}.{:03}",
        secs / 60,
        secs % 60,
        info.duration_ms % 1000
    );
    if info.reversible {
        println!("Reverse playback: supported");
    }

    println!("\nAudio Tracks: {}", info.audio_tracks.len());
    for track in &info.audio_tracks {
        print!(
            "  [{}] {} Hz, {}ch, {} bit",
            track.index, track.sample_rate, track.channels, track.bits
        );
        if track.compressed {
            print!(" [DPCM]");
        }
        println!();
    }

    Ok(())
}

fn play_file(file: &Path, config_path: Option<&Path>, no_audio: bool) -> Result<()> {
    check_input(file)?;
    let mut config = config::load_config_or_default(config_path)?;
    if no_audio {
        config.playback.audio = false;
    }

    let mixer = Arc::new(BufferedMixer::new());
    let time: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());
    let context = PlaybackContext::new(mixer.clone(), time.clone());
    let mut player = Player::open(file, &config, context)?;

    tracing::info!("Playing {:?} ({})", file, player.format());
    let stats = playback::run(&mut player, mixer, time, |player| {
        tracing::debug!(frame = player.current_frame(), time_ms = player.time_ms(), "frame");
    })?;

    println!(
        "Played {} frames in {} ms ({} palette changes, {} audio bytes)",
        stats.frames, stats.media_time_ms, stats.palette_changes, stats.audio_bytes
    );
    Ok(())
}

fn extract_file(
    file: &Path,
    config_path: Option<&Path>,
    output: Option<&Path>,
    stride: Option<u32>,
) -> Result<()> {
    check_input(file)?;
    let mut config = config::load_config_or_default(config_path)?;
    if let Some(stride) = stride {
        if stride == 0 {
            anyhow::bail!("--stride cannot be 0");
        }
        config.export.frame_stride = stride;
    }
    let out_dir = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.export.output_dir.clone());

    let mixer = Arc::new(BufferedMixer::new());
    let context = PlaybackContext::new(mixer.clone(), Arc::new(SystemTimeSource::new()));
    let mut player = Player::open(file, &config, context)?;

    let summary = export::extract(&mut player, &mixer, &config.export, &out_dir)?;
    println!(
        "Decoded {} frames, wrote {} frames and {} audio tracks to {}",
        summary.frames_decoded,
        summary.frames.len(),
        summary.audio.len(),
        out_dir.display()
    );
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            config::Config::default()
        }
    };

    println!("  Audio: {}", config.playback.audio);
    if let Some(end) = config.playback.end_time_ms {
        println!("  End time: {} ms", end);
    }
    println!("  Start: {} ms", config.playback.start_ms);
    println!("  Max tree nodes: {}", config.decode.max_tree_nodes);
    println!("  Max part size: {} bytes", config.decode.max_part_size);
    println!("  Output dir: {}", config.export.output_dir.display());
    println!("  Frame stride: {}", config.export.frame_stride);
    println!("  Write audio: {}", config.export.write_audio);

    Ok(())
}
