use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::{error, info, warn};
use room_reconstruction::config::AppConfig;
use room_reconstruction::data_loader::{list_images, load_images};
use room_reconstruction::features::PyramidExtractor;
use room_reconstruction::io::{FloorplanReport, RoomSource, object_from_json, object_to_json, write_report};
use room_reconstruction::reconstruction::{Reconstruction, Reconstructor};
use room_reconstruction::room::{RoomDimensions, RoomEstimator, Wall, Window};
use room_reconstruction::visualization::{log_camera, log_keypoints, log_matches, log_point_cloud};

#[derive(Parser)]
#[command(version, about, author)]
struct RoomCli {
    /// image paths, at least 2; only the first two are reconstructed
    #[arg(long, num_args = 1..)]
    images: Vec<PathBuf>,

    /// folder with *.png / *.jpg images, used when --images is empty
    #[arg(long)]
    image_dir: Option<PathBuf>,

    /// floorplan report path
    #[arg(short, long, default_value = "floorplan.json")]
    output: PathBuf,

    /// manual room width in meters, skips reconstruction together with --length
    #[arg(long)]
    width: Option<f64>,

    /// manual room length in meters
    #[arg(long)]
    length: Option<f64>,

    /// manual ceiling height in meters
    #[arg(long, default_value_t = 2.7)]
    height: f64,

    /// manual window "wall:position:sill:width:height", wall in left/right/top/bottom
    #[arg(long, value_parser = parse_window)]
    window: Vec<Window>,

    /// json config, missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// write the effective config to this path and exit
    #[arg(long)]
    dump_config: Option<PathBuf>,

    /// save a rerun recording
    #[arg(long)]
    rerun: Option<PathBuf>,

    /// fail instead of falling back to a default room
    #[arg(long, default_value_t = false)]
    strict: bool,
}

fn parse_window(s: &str) -> Result<Window, String> {
    let parts: Vec<_> = s.split(':').collect();
    let [wall, rest @ ..] = parts.as_slice() else {
        return Err("empty window".to_string());
    };
    let wall = match wall.to_lowercase().as_str() {
        "left" => Wall::Left,
        "right" => Wall::Right,
        "top" => Wall::Top,
        "bottom" => Wall::Bottom,
        other => return Err(format!("unknown wall {:?}", other)),
    };
    let values = rest
        .iter()
        .map(|v| v.parse::<f64>().map_err(|e| format!("{:?}: {}", v, e)))
        .collect::<Result<Vec<_>, _>>()?;
    let [position_along_wall, sill_height, width, height] = values.as_slice() else {
        return Err("expected wall:position:sill:width:height".to_string());
    };
    Ok(Window {
        wall,
        position_along_wall: *position_along_wall,
        sill_height: *sill_height,
        width: *width,
        height: *height,
    })
}

fn reconstruct_room(
    cli: &RoomCli,
    config: &AppConfig,
    recording: Option<&rerun::RecordingStream>,
) -> room_reconstruction::Result<(Reconstruction, RoomDimensions, Vec<Window>)> {
    let paths = if cli.images.is_empty() {
        cli.image_dir.as_deref().map(list_images).unwrap_or_default()
    } else {
        cli.images.clone()
    };
    info!("loading {} images", paths.len());
    let images = load_images(&paths, recording)?;

    let reconstructor = Reconstructor::new(
        PyramidExtractor::new(config.extractor.clone()),
        config.reconstruction.clone(),
    );
    let now = Instant::now();
    let reconstruction = reconstructor.reconstruct(&images)?;
    info!(
        "reconstruction took {:.3} sec",
        now.elapsed().as_secs_f64()
    );

    if let Some(recording) = recording {
        for (i, features) in reconstruction.features.iter().enumerate() {
            log_keypoints(recording, &format!("img{}", i), features);
        }
        if let [f1, f2, ..] = reconstruction.features.as_slice() {
            log_matches(recording, ("img0", "img1"), f1, f2, &reconstruction.matches);
        }
        let img_w_h = (images[0].width(), images[0].height());
        for (i, cam) in reconstruction.cameras.iter().enumerate() {
            log_camera(recording, &format!("world/cam{}", i), cam, img_w_h);
        }
        log_point_cloud(
            recording,
            "world/points",
            &reconstruction.points,
            config.reconstruction.max_depth,
        );
    }

    let estimator = RoomEstimator::new(config.room.clone());
    let dims = estimator.estimate_dimensions(&reconstruction.points)?;
    let windows = estimator.detect_windows(&reconstruction.points)?;
    Ok((reconstruction, dims, windows))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = RoomCli::parse();

    let config: AppConfig = match &cli.config {
        Some(path) => object_from_json(path)?,
        None => AppConfig::default(),
    };
    if let Some(path) = &cli.dump_config {
        object_to_json(path, &config)?;
        info!("config written to {:?}", path);
        return Ok(());
    }

    let report = if let (Some(width), Some(length)) = (cli.width, cli.length) {
        info!("using manual room {} x {} x {}", width, length, cli.height);
        FloorplanReport::new(
            RoomSource::Manual,
            RoomDimensions::manual(width, length, cli.height),
            cli.window.clone(),
            None,
        )
    } else {
        let recording = match &cli.rerun {
            Some(path) => Some(rerun::RecordingStreamBuilder::new("room_reconstruction").save(path)?),
            None => None,
        };
        match reconstruct_room(&cli, &config, recording.as_ref()) {
            Ok((reconstruction, dims, windows)) => {
                info!(
                    "room {:.2} x {:.2} x {:.2} m, area {:.2} m2, {} windows",
                    dims.width,
                    dims.length,
                    dims.height,
                    dims.area,
                    windows.len()
                );
                FloorplanReport::new(
                    RoomSource::Reconstructed,
                    dims,
                    windows,
                    Some(reconstruction.stats),
                )
            }
            Err(e) if cli.strict => return Err(e.into()),
            Err(e) => {
                error!("reconstruction failed ({:?}): {}", e.kind(), e);
                warn!("falling back to a default room");
                FloorplanReport::new(
                    RoomSource::Fallback,
                    RoomDimensions::fallback(),
                    Vec::new(),
                    None,
                )
            }
        }
    };
    write_report(&cli.output, &report)?;
    Ok(())
}
