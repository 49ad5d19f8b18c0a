use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dimg_core::config::AppConfig;
use dimg_core::image_pipeline::{BitDepth, Converter, LoaderSet};
use dimg_core::logger;

use tracing::{error, info};

/// Decode an image (RAW, JPEG, PNG, TIFF, ...), post-process it and write it out.
#[derive(Parser, Debug)]
#[command(name = "dimg-convert", version)]
struct Args {
    /// Input image.
    input: PathBuf,

    /// Output image; the format follows the extension.
    output: Option<PathBuf>,

    /// TOML file with [decoding] and [encoding] sections.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Exposure compensation in EV for RAW input.
    #[arg(long)]
    exposure: Option<f64>,

    /// Fit the result inside WIDTHxHEIGHT, keeping the aspect ratio.
    #[arg(long, value_parser = parse_size)]
    resize: Option<(u32, u32)>,

    /// Write 8 bits per channel.
    #[arg(long, conflicts_with = "sixteen_bit")]
    eight_bit: bool,

    /// Decode RAW input and write 16 bits per channel.
    #[arg(long)]
    sixteen_bit: bool,

    /// Print image metadata and exit.
    #[arg(long)]
    info: bool,

    /// Debug logging, unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {:?}", value))?;
    let parse = |s: &str| s.trim().parse::<u32>().map_err(|e| format!("{:?}: {}", s, e));
    let (w, h) = (parse(w)?, parse(h)?);
    if w == 0 || h == 0 {
        return Err("dimensions must be positive".to_string());
    }
    Ok((w, h))
}

fn run(args: Args) -> Result<()> {
    let app_config = match &args.config {
        Some(path) => AppConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => AppConfig::default(),
    };

    if args.info {
        let info = LoaderSet::standard()
            .identify(&args.input)
            .with_context(|| format!("identifying {}", args.input.display()))?;
        println!(
            "{}: {} {}x{} {}-bit {}{}",
            args.input.display(),
            info.format.name(),
            info.width,
            info.height,
            info.bits_per_channel,
            info.color_model,
            if info.has_alpha { " with alpha" } else { "" }
        );
        return Ok(());
    }

    let Some(output) = args.output.as_deref() else {
        bail!("an output path is required unless --info is given");
    };

    let mut config = app_config.conversion_config();
    if let Some(exposure) = args.exposure {
        config.decode.raw.exposure_comp = exposure;
    }
    if args.sixteen_bit {
        config.decode.raw.sixteen_bits_image = true;
        config.output_depth = Some(BitDepth::Sixteen);
    }
    if args.eight_bit {
        config.decode.raw.sixteen_bits_image = false;
        config.output_depth = Some(BitDepth::Eight);
    }
    config.resize = args.resize.or(config.resize);

    let converter = Converter::new(config);
    info!(
        raw = %converter.config().decode.raw.summary(),
        compression = ?converter.config().encode.tiff_compression,
        resize = ?converter.config().resize,
        "Converter initialized"
    );

    let timings = converter
        .convert_file(&args.input, output, None)
        .with_context(|| format!("converting {} to {}", args.input.display(), output.display()))?;
    info!(total_ms = timings.total_duration().as_secs_f64() * 1000.0, "Conversion successful");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.verbose);

    info!("Starting dimg-convert...");
    if let Err(e) = run(args) {
        error!("Conversion failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
