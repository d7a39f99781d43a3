use std::ffi::OsStr;
use std::path::Path;
use std::process::{Command, Output};

use image::{Rgba, RgbaImage};
use tempfile::TempDir;

fn write_solid(path: &Path, width: u32, height: u32, color: [u8; 4]) {
    RgbaImage::from_pixel(width, height, Rgba(color))
        .save(path)
        .unwrap();
}

fn run_stackshot(args: &[&OsStr]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stackshot"))
        .env_remove("STACKSHOT_CONFIG")
        .env("RUST_LOG", "warn")
        .args(args)
        .output()
        .expect("failed to run stackshot")
}

fn gpu_unavailable(output: &Output) -> bool {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("failed to initialise GPU renderer") {
        eprintln!("Skipping stackshot GPU test: {stderr}");
        return true;
    }
    false
}

#[test]
fn averages_two_frames_into_png() {
    let root = TempDir::new().unwrap();
    let first = root.path().join("first.png");
    let second = root.path().join("second.png");
    let output_path = root.path().join("out/average.png");
    write_solid(&first, 8, 6, [200, 0, 40, 255]);
    write_solid(&second, 8, 6, [0, 100, 40, 255]);

    let output = run_stackshot(&[
        first.as_os_str(),
        second.as_os_str(),
        OsStr::new("--output"),
        output_path.as_os_str(),
    ]);
    if gpu_unavailable(&output) {
        return;
    }
    assert!(
        output.status.success(),
        "stackshot failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let averaged = image::open(&output_path).unwrap().to_rgba8();
    assert_eq!(averaged.dimensions(), (8, 6));
    let pixel = averaged.get_pixel(3, 2).0;
    let expected = [100u8, 50, 40, 255];
    for (actual, expected) in pixel.iter().zip(expected.iter()) {
        assert!(
            actual.abs_diff(*expected) <= 2,
            "pixel {pixel:?} differs from {expected:?}"
        );
    }
}

#[test]
fn resizes_to_requested_size_and_writes_snapshots() {
    let root = TempDir::new().unwrap();
    let frames: Vec<_> = (0..3)
        .map(|index| {
            let path = root.path().join(format!("frame{index}.png"));
            write_solid(&path, 5 + index, 5, [60, 60, 60, 255]);
            path
        })
        .collect();
    let output_path = root.path().join("stack.png");

    let mut args: Vec<&OsStr> = frames.iter().map(|path| path.as_os_str()).collect();
    args.extend([
        OsStr::new("--size"),
        OsStr::new("4x4"),
        OsStr::new("--snapshot-every"),
        OsStr::new("2"),
        OsStr::new("--retain"),
        OsStr::new("1"),
        OsStr::new("-o"),
        output_path.as_os_str(),
    ]);
    let output = run_stackshot(&args);
    if gpu_unavailable(&output) {
        return;
    }
    assert!(
        output.status.success(),
        "stackshot failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let snapshot = image::open(root.path().join("stack-0002.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(snapshot.dimensions(), (4, 4));
    let final_image = image::open(&output_path).unwrap().to_rgba8();
    assert_eq!(final_image.dimensions(), (4, 4));
    assert!(final_image.get_pixel(0, 0).0[0].abs_diff(60) <= 2);
}

#[test]
fn rejects_malformed_size() {
    let root = TempDir::new().unwrap();
    let frame = root.path().join("frame.png");
    write_solid(&frame, 2, 2, [0, 0, 0, 255]);

    let output = run_stackshot(&[frame.as_os_str(), OsStr::new("--size"), OsStr::new("big")]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid size"));
}

#[test]
fn missing_input_is_reported() {
    let root = TempDir::new().unwrap();
    let missing = root.path().join("missing.png");

    let output = run_stackshot(&[missing.as_os_str()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to open image"));
}
