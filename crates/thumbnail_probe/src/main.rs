use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thumbnails::{
    AtlasSurface, CpuAtlasSurface, DirectorySource, ThumbnailCache, ThumbnailCacheConfig,
    UpdateReport, WgpuAtlasSurface, save_thumbnail,
};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Stream a directory of thumbnails into an atlas and report how long it takes"
)]
struct Arguments {
    /// Directory holding `<key>.<extension>` thumbnails.
    #[arg(long, short = 'd', value_parser)]
    dir: PathBuf,
    /// Render thumbnails into `dir` from every image in this directory first.
    #[arg(long, value_parser)]
    generate_from: Option<PathBuf>,
    /// JSON cache config. Missing fields keep their defaults.
    #[arg(long, short = 'c', value_parser)]
    config: Option<PathBuf>,
    /// Frames to wait for every thumbnail before giving up.
    #[arg(long, default_value_t = 600)]
    frames: u32,
    /// Keep the atlas in host memory instead of a GPU texture.
    #[arg(long)]
    cpu: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let arguments = Arguments::parse();
    let config = load_config(arguments.config.as_deref())?;

    if let Some(source_dir) = &arguments.generate_from {
        let written = generate_thumbnails(source_dir, &arguments.dir, &config)?;
        info!("wrote {written} thumbnails into {}", arguments.dir.display());
    }

    let mut keys = collect_keys(&arguments.dir, &config.file_extension)?;
    if keys.is_empty() {
        bail!(
            "no .{} thumbnails in {}",
            config.file_extension,
            arguments.dir.display()
        );
    }
    let max_slots = config.atlas.max_slots as usize;
    if keys.len() > max_slots {
        warn!(
            "{} thumbnails found, loading the first {max_slots} that fit the atlas",
            keys.len()
        );
        keys.truncate(max_slots);
    }

    let atlas_size = config.atlas.atlas_size;
    let dir = arguments.dir.as_path();
    let summary = if arguments.cpu {
        run_frames(&config, dir, &keys, CpuAtlasSurface::new(atlas_size), arguments.frames)?
    } else if let Some((device, queue)) = create_device_queue() {
        let surface = WgpuAtlasSurface::new(&device, &queue, atlas_size)
            .context("create atlas texture")?;
        run_frames(&config, dir, &keys, surface, arguments.frames)?
    } else {
        warn!("no wgpu adapter available, using a host memory atlas");
        run_frames(&config, dir, &keys, CpuAtlasSurface::new(atlas_size), arguments.frames)?
    };

    info!(
        "{} thumbnails ready after {} frames ({:?}), {} uploads, {} stale",
        summary.ready,
        summary.frames,
        summary.elapsed,
        summary.totals.uploaded,
        summary.totals.discarded_stale
    );
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ThumbnailCacheConfig> {
    let Some(path) = path else {
        return Ok(ThumbnailCacheConfig::default());
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    ThumbnailCacheConfig::from_json_str(&json)
        .with_context(|| format!("parse config {}", path.display()))
}

fn collect_keys(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("list {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
            keys.push(stem.to_owned());
        }
    }
    keys.sort();
    Ok(keys)
}

fn generate_thumbnails(
    source_dir: &Path,
    output: &Path,
    config: &ThumbnailCacheConfig,
) -> Result<usize> {
    let mut written = 0;
    for entry in
        fs::read_dir(source_dir).with_context(|| format!("list {}", source_dir.display()))?
    {
        let path = entry?.path();
        let Some(key) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if !path.is_file() || image::ImageFormat::from_path(&path).is_err() {
            continue;
        }
        let rgba = match image::open(&path) {
            Ok(decoded) => decoded.to_rgba8(),
            Err(error) => {
                warn!("skipping {}: {error}", path.display());
                continue;
            }
        };
        save_thumbnail(output, &key, &rgba, config)
            .with_context(|| format!("write thumbnail for {}", path.display()))?;
        written += 1;
    }
    Ok(written)
}

/// Outcome of a run where every key became ready.
#[derive(Debug)]
struct RunSummary {
    ready: usize,
    frames: u32,
    elapsed: Duration,
    totals: UpdateReport,
}

/// Requests every key each frame and pumps `update` until all are ready or
/// `frame_budget` runs out.
fn run_frames<S: AtlasSurface>(
    config: &ThumbnailCacheConfig,
    dir: &Path,
    keys: &[String],
    surface: S,
    frame_budget: u32,
) -> Result<RunSummary> {
    let source = DirectorySource::new(dir, config.file_extension.as_str());
    let mut cache = ThumbnailCache::<String, S>::new(config, source, surface)
        .context("build thumbnail cache")?;

    let started = Instant::now();
    let mut totals = UpdateReport::default();
    let mut ready = 0;
    for frame in 0..frame_budget {
        ready = keys
            .iter()
            .filter(|&key| cache.get_thumbnail(key).ready)
            .count();
        if ready == keys.len() {
            return Ok(RunSummary {
                ready,
                frames: frame,
                elapsed: started.elapsed(),
                totals,
            });
        }

        let report = cache.update().context("upload thumbnails")?;
        totals.uploaded += report.uploaded;
        totals.discarded_stale += report.discarded_stale;
        thread::sleep(FRAME_INTERVAL);
    }

    bail!(
        "only {ready} of {} thumbnails ready after {frame_budget} frames",
        keys.len()
    )
}

fn create_device_queue() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;
        let limits = adapter.limits();
        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("thumbnail probe"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use thumbnails::AtlasConfig;

    fn small_config() -> ThumbnailCacheConfig {
        ThumbnailCacheConfig {
            atlas: AtlasConfig {
                atlas_size: 64,
                slot_width: 16,
                slot_height: 12,
                padding: 2,
                max_slots: 4,
            },
            decode_workers: 2,
            file_extension: "png".to_owned(),
        }
    }

    #[test]
    fn collect_keys_skips_other_extensions_and_directories() {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(dir.path().join("b.png"), b"").expect("write b.png");
        fs::write(dir.path().join("a.png"), b"").expect("write a.png");
        fs::write(dir.path().join("c.jpg"), b"").expect("write c.jpg");
        fs::write(dir.path().join("d.png.partial"), b"").expect("write partial");
        fs::create_dir(dir.path().join("e.png")).expect("create e.png dir");

        let keys = collect_keys(dir.path(), "png").expect("collect keys");
        assert_eq!(keys, vec!["a".to_owned(), "b".to_owned()]);
    }

    #[test]
    fn generated_thumbnails_all_become_ready() {
        let _ = env_logger::builder().is_test(true).try_init();
        let sources = tempfile::tempdir().expect("create source dir");
        let output = tempfile::tempdir().expect("create output dir");
        let colors = [
            ("red", [255, 0, 0, 255]),
            ("green", [0, 255, 0, 255]),
            ("blue", [0, 0, 255, 255]),
        ];
        for (name, color) in colors {
            RgbaImage::from_pixel(40, 30, Rgba(color))
                .save(sources.path().join(format!("{name}.png")))
                .expect("write source image");
        }
        fs::write(sources.path().join("notes.txt"), b"not an image").expect("write notes");

        let config = small_config();
        let written =
            generate_thumbnails(sources.path(), output.path(), &config).expect("generate");
        assert_eq!(written, 3);

        let keys = collect_keys(output.path(), "png").expect("collect keys");
        assert_eq!(keys, vec!["blue", "green", "red"]);

        let summary = run_frames(&config, output.path(), &keys, CpuAtlasSurface::new(64), 600)
            .expect("every thumbnail becomes ready");
        assert_eq!(summary.ready, 3);
        assert_eq!(summary.totals.uploaded, 3);
        assert_eq!(summary.totals.discarded_stale, 0);
    }

    #[test]
    fn missing_thumbnail_exhausts_frame_budget() {
        let output = tempfile::tempdir().expect("create output dir");
        let keys = vec!["absent".to_owned()];
        let surface = CpuAtlasSurface::new(64);
        let error = run_frames(&small_config(), output.path(), &keys, surface, 3)
            .expect_err("nothing to load");
        assert!(error.to_string().contains("only 0 of 1"), "{error}");
    }
}
