use std::sync::Arc;

use accumulator::{
    Accumulation, FormatDescription, PixelBuffer, PixelFormat, Renderer, RendererConfig,
    RenderingContext,
};
use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::cli::Args;
use crate::frames::{load_frame, probe_size, save_bgra_png, snapshot_path};

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let config = resolve_config(&args)?;
    let size = match args.size {
        Some(size) => size,
        None => {
            let first = args
                .inputs
                .first()
                .ok_or_else(|| anyhow!("no input images given"))?;
            probe_size(first)?
        }
    };
    let description = FormatDescription::new(size.0, size.1, PixelFormat::Bgra8);

    let context = RenderingContext::new(&config).context("failed to initialise GPU renderer")?;
    let profile = context.adapter_profile();
    tracing::info!(
        adapter = %profile.name,
        backend = ?profile.backend,
        software = profile.is_software(),
        "using GPU adapter"
    );
    let context = Arc::new(context);
    let mut renderer = Renderer::with_context(Arc::clone(&context), config);
    renderer
        .prepare_with_default_retention(&description)
        .with_context(|| format!("failed to prepare renderer for {description}"))?;

    let mut skipped = 0usize;
    for path in &args.inputs {
        let frame = load_frame(path, size)?;
        let buffer = PixelBuffer::from_bgra(&context, frame.width, frame.height, &frame.bgra)
            .with_context(|| format!("failed to upload {}", path.display()))?;
        match renderer
            .accumulate(&buffer)
            .with_context(|| format!("failed to accumulate {}", path.display()))?
        {
            Accumulation::Added(frame_count) => {
                tracing::debug!(path = %path.display(), frame_count, "accumulated frame");
                if args
                    .snapshot_every
                    .is_some_and(|every| frame_count % every == 0)
                {
                    let snapshot = snapshot_path(&args.output, frame_count);
                    write_average(&mut renderer, &context, &snapshot)?;
                    tracing::info!(path = %snapshot.display(), frame_count, "wrote snapshot");
                }
            }
            Accumulation::Skipped => {
                skipped += 1;
                tracing::warn!(path = %path.display(), "frame skipped");
            }
        }
    }

    if renderer.frame_count() == 0 {
        return Err(anyhow!("no frames could be accumulated"));
    }
    write_average(&mut renderer, &context, &args.output)?;
    tracing::info!(
        path = %args.output.display(),
        frames = renderer.frame_count(),
        skipped,
        size = %description,
        "wrote averaged image"
    );
    renderer.teardown();
    Ok(())
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(args: &Args) -> Result<RendererConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => {
            let config = RendererConfig::load(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded renderer configuration");
            config
        }
        None => RendererConfig::default(),
    };
    if let Some(power) = args.power {
        config.power = power;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(dir) = args.shader_dir.as_ref() {
        config.shader_dir = Some(dir.clone());
    }
    if let Some(retain) = args.retain {
        config.retained_buffer_count = retain;
    }
    config.validate().context("invalid renderer configuration")?;
    Ok(config)
}

/// Renders the current average, reads it back, and writes it to `path`.
fn write_average(
    renderer: &mut Renderer,
    context: &RenderingContext,
    path: &std::path::Path,
) -> Result<()> {
    let output = renderer
        .copy_rendered_pixel_buffer()
        .context("failed to render averaged frame")?
        .ok_or_else(|| anyhow!("output pool exhausted; no buffer available"))?;
    let pixels = output
        .read_pixels(context)
        .context("failed to read back averaged frame")?;
    save_bgra_png(path, output.width(), output.height(), pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use accumulator::{GpuBackend, GpuPowerPreference};
    use clap::Parser;

    #[test]
    fn cli_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renderer.toml");
        std::fs::write(&path, "power = \"low\"\nretained_buffer_count = 2\n").unwrap();

        let args = Args::try_parse_from([
            "stackshot",
            "frame.png",
            "--config",
            path.to_str().unwrap(),
            "--retain",
            "5",
            "--backend",
            "gl",
        ])
        .unwrap();
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.power, GpuPowerPreference::Low);
        assert_eq!(config.backend, GpuBackend::Gl);
        assert_eq!(config.retained_buffer_count, 5);
    }

    #[test]
    fn zero_retention_is_rejected() {
        let args = Args::try_parse_from(["stackshot", "frame.png", "--retain", "0"]).unwrap();
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn huge_retention_is_rejected() {
        let args = Args::try_parse_from([
            "stackshot",
            "frame.png",
            "--retain",
            "18446744073709551615",
        ])
        .unwrap();
        let err = resolve_config(&args).unwrap_err();
        assert!(format!("{err:#}").contains("at most"));
    }
}
