use std::path::PathBuf;

use accumulator::{GpuBackend, GpuPowerPreference};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "stackshot",
    author,
    version,
    about = "Average a stack of still frames on the GPU into one long-exposure image"
)]
pub struct Args {
    /// Source images, accumulated in the order given.
    #[arg(value_name = "IMAGE", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Where to write the averaged PNG.
    #[arg(short, long, value_name = "PATH", default_value = "stackshot.png")]
    pub output: PathBuf,

    /// Renderer configuration TOML; CLI flags override its values.
    #[arg(long, value_name = "PATH", env = "STACKSHOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Frame size (e.g. `1280x720`). Defaults to the first image's size;
    /// images of another size are resized to fit.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Also write the running average every N frames next to the output.
    #[arg(long, value_name = "N", value_parser = parse_interval)]
    pub snapshot_every: Option<u64>,

    /// Maximum number of output frames held at once.
    #[arg(long, value_name = "COUNT")]
    pub retain: Option<usize>,

    /// Adapter power preference: `low` or `high`.
    #[arg(long, value_name = "MODE", value_parser = parse_power)]
    pub power: Option<GpuPowerPreference>,

    /// Graphics API: `auto`, `vulkan`, `metal`, `dx12`, or `gl`.
    #[arg(long, value_name = "API", value_parser = parse_backend)]
    pub backend: Option<GpuBackend>,

    /// Directory with `accumulate.vert` / `accumulate.frag` overrides.
    #[arg(long, value_name = "DIR")]
    pub shader_dir: Option<PathBuf>,
}

pub fn parse() -> Args {
    Args::parse()
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let trimmed = value.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{trimmed}'; expected WIDTHxHEIGHT"))?;
    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| format!("invalid width in '{trimmed}'"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| format!("invalid height in '{trimmed}'"))?;
    if width == 0 || height == 0 {
        return Err("size must be non-zero in both dimensions".to_string());
    }
    Ok((width, height))
}

pub fn parse_interval(value: &str) -> Result<u64, String> {
    let interval: u64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid frame interval '{}'", value.trim()))?;
    if interval == 0 {
        return Err("snapshot interval must be at least 1".to_string());
    }
    Ok(interval)
}

pub fn parse_power(value: &str) -> Result<GpuPowerPreference, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("power preference must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "low" | "low-power" | "integrated" => Ok(GpuPowerPreference::Low),
        "high" | "high-performance" | "discrete" => Ok(GpuPowerPreference::High),
        other => Err(format!(
            "unknown power preference '{other}'; expected low or high"
        )),
    }
}

pub fn parse_backend(value: &str) -> Result<GpuBackend, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("backend must not be empty".to_string());
    }

    let normalized = trimmed.to_ascii_lowercase();
    match normalized.as_str() {
        "auto" | "default" => Ok(GpuBackend::Auto),
        "vulkan" | "vk" => Ok(GpuBackend::Vulkan),
        "metal" | "mtl" => Ok(GpuBackend::Metal),
        "dx12" | "d3d12" => Ok(GpuBackend::Dx12),
        "gl" | "gles" | "opengl" => Ok(GpuBackend::Gl),
        other => Err(format!(
            "unknown backend '{other}'; expected auto, vulkan, metal, dx12, or gl"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!(parse_size("1280x720").unwrap(), (1280, 720));
        assert_eq!(parse_size(" 64 X 32 ").unwrap(), (64, 32));
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("widexhigh").is_err());
    }

    #[test]
    fn snapshot_interval_must_be_positive() {
        assert_eq!(parse_interval("5").unwrap(), 5);
        assert!(parse_interval("0").is_err());
        assert!(parse_interval("-1").is_err());
    }

    #[test]
    fn parses_power_aliases() {
        assert_eq!(parse_power("LOW").unwrap(), GpuPowerPreference::Low);
        assert_eq!(parse_power("discrete").unwrap(), GpuPowerPreference::High);
        assert!(parse_power("").is_err());
        assert!(parse_power("turbo").is_err());
    }

    #[test]
    fn parses_backends() {
        assert_eq!(parse_backend("vk").unwrap(), GpuBackend::Vulkan);
        assert_eq!(parse_backend("OpenGL").unwrap(), GpuBackend::Gl);
        assert_eq!(parse_backend("auto").unwrap(), GpuBackend::Auto);
        assert!(parse_backend("glide").is_err());
    }

    #[test]
    fn requires_at_least_one_input() {
        assert!(Args::try_parse_from(["stackshot"]).is_err());
        let args = Args::try_parse_from(["stackshot", "a.png", "b.png", "--retain", "2"]).unwrap();
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.retain, Some(2));
        assert_eq!(args.output, PathBuf::from("stackshot.png"));
    }
}
