// ============================================================================
// Wardrobe page: camera controls, garment picker, AR preview snapshots
// ============================================================================
// Commands read from stdin:
//   start | stop | switch        Camera controls
//   select ID | clear            Garment picker
//   list                         Show the wardrobe
//   snap [PATH]                  Save the current preview as an image
//   status | help | quit
// ============================================================================

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tryon_core::{CameraSession, FacingMode, GarmentCatalog, StillImageDevices};

const DEFAULT_SNAPSHOT: &str = "wardrobe-preview.png";

pub struct Args {
    pub catalog: GarmentCatalog,
    pub source: PathBuf,
    pub garment: Option<String>,
    pub facing: FacingMode,
    pub snapshot: Option<PathBuf>,
}

pub async fn run(args: Args) -> Result<()> {
    let devices = StillImageDevices::open(&args.source)?;
    let mut camera = CameraSession::new(Arc::new(devices), Arc::new(args.catalog))
        .with_facing_mode(args.facing);

    if let Some(id) = &args.garment {
        select(&mut camera, id);
    }
    start(&mut camera).await;

    if let Some(path) = args.snapshot {
        let result = snap(&camera, &path).await;
        camera.stop();
        return result;
    }

    println!("Virtual Wardrobe. Type 'help' for commands.");
    print_garments(&camera);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt(&camera);
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (None, _) => {}
            (Some("start"), _) => start(&mut camera).await,
            (Some("stop"), _) => {
                camera.stop();
                println!("Camera stopped.");
            }
            (Some("switch"), _) => {
                if let Err(e) = camera.switch_facing().await {
                    warn!("Switching camera failed: {}", e);
                }
                println!("Using {} camera.", camera.facing_mode().as_str());
            }
            (Some("select"), Some(id)) => select(&mut camera, id),
            (Some("select"), None) => println!("Usage: select ID"),
            (Some("clear"), _) => {
                camera.clear_selection();
                println!("Garment cleared.");
            }
            (Some("list"), _) => print_garments(&camera),
            (Some("snap"), path) => {
                let path = Path::new(path.unwrap_or(DEFAULT_SNAPSHOT));
                if let Err(e) = snap(&camera, path).await {
                    println!("{}", e);
                }
            }
            (Some("status"), _) => print_status(&camera),
            (Some("help"), _) => print_help(),
            (Some("quit" | "exit"), _) => break,
            (Some(other), _) => println!("Unknown command '{}'. Type 'help'.", other),
        }
    }

    camera.stop();
    Ok(())
}

async fn start(camera: &mut CameraSession) {
    match camera.start().await {
        Ok(()) => println!("Camera on ({}).", camera.facing_mode().as_str()),
        Err(_) => {
            println!("Camera Access Required");
            if let Some(message) = camera.error() {
                println!("  {}", message);
            }
        }
    }
}

fn select(camera: &mut CameraSession, id: &str) {
    match camera.select_garment(id) {
        Ok(garment) => println!("Trying on: {}", garment.name),
        Err(e) => println!("{}. Type 'list' to see the wardrobe.", e),
    }
}

async fn snap(camera: &CameraSession, path: &Path) -> Result<()> {
    // Give the render loop a moment to publish its first frame
    if camera.is_rendering() {
        let mut canvas = camera.subscribe_canvas();
        let first = tokio::time::timeout(Duration::from_secs(1), canvas.wait_for(Option::is_some));
        if first.await.is_err() {
            warn!("No rendered frame yet, saving the raw camera frame");
        }
    }

    let frame = camera
        .snapshot()
        .ok_or_else(|| anyhow!("Camera is off; start it before taking a snapshot"))?;
    frame
        .save(path)
        .map_err(|e| anyhow!("Failed to save {}: {}", path.display(), e))?;
    println!("Saved preview to {}", path.display());
    Ok(())
}

fn print_prompt(camera: &CameraSession) {
    let garment = camera
        .selected()
        .map(|g| g.id)
        .unwrap_or_else(|| "-".to_string());
    let state = if camera.is_active() { "on" } else { "off" };
    eprint!("[camera {} | {}] > ", state, garment);
}

fn print_status(camera: &CameraSession) {
    println!("Camera:   {}", if camera.is_active() { "on" } else { "off" });
    println!("Facing:   {}", camera.facing_mode().as_str());
    println!("Tracks:   {} live", camera.live_track_count());
    println!("Overlay:  {}", if camera.is_rendering() { "rendering" } else { "idle" });
    match camera.selected() {
        Some(g) => println!("Garment:  {} ({})", g.name, g.overlay_color),
        None => println!("Garment:  none"),
    }
    if let Some(error) = camera.error() {
        println!("Error:    {}", error);
    }
}

fn print_garments(camera: &CameraSession) {
    let selected = camera.selected().map(|g| g.id);
    for garment in camera.catalog().list() {
        let marker = if selected.as_deref() == Some(garment.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(" {} {:<14} {}", marker, garment.id, garment.name);
    }
}

fn print_help() {
    println!("  start            Turn the camera on");
    println!("  stop             Turn the camera off");
    println!("  switch           Switch between front and back camera");
    println!("  select ID        Try on a garment");
    println!("  clear            Remove the garment overlay");
    println!("  list             Show the wardrobe");
    println!("  snap [PATH]      Save the current preview ({})", DEFAULT_SNAPSHOT);
    println!("  status           Show camera state");
    println!("  quit             Leave the wardrobe");
}
