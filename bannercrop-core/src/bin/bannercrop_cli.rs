//! Bannercrop CLI - Crop Geometry from the Command Line
//!
//! Commands: presets, check-upload, init-box, to-natural
//! Outputs JSON to stdout
//! Returns non-zero on validation failure

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use bannercrop_core::{
    validation::CropInput, CropGeometry, Dimensions, EditorConfig, PresetKey, PresetRegistry,
    StageBox, UploadFile, UploadValidator, Validator,
};

#[derive(Parser)]
#[command(name = "bannercrop-cli")]
#[command(about = "Bannercrop CLI - per-preset crop geometry for banner media")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to an editor config JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List presets in display order
    Presets,

    /// Check a file against the upload policy and read its dimensions
    CheckUpload {
        /// File to check
        path: PathBuf,

        /// MIME type; guessed from the extension when omitted
        #[arg(short, long)]
        mime: Option<String>,
    },

    /// Compute the default crop box for an image
    InitBox {
        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        #[arg(short, long, default_value = "wide1920")]
        preset: String,
    },

    /// Convert a stage box (left,top,width,height) to natural pixels
    ToNatural {
        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        #[arg(long = "box", value_delimiter = ',', num_args = 4)]
        stage_box: Vec<f64>,
    },
}

fn guess_mime(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "ogg" | "ogv" => "video/ogg",
        _ => "application/octet-stream",
    }
    .to_string()
}

fn fail(message: impl std::fmt::Display) -> ExitCode {
    let output = serde_json::json!({ "success": false, "error": message.to_string() });
    println!("{}", output);
    ExitCode::FAILURE
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render output: {}", e),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    let config = match &cli.config {
        Some(path) => match EditorConfig::load(path) {
            Ok(c) => c,
            Err(e) => return fail(e),
        },
        None => EditorConfig::default(),
    };

    match cli.command {
        Commands::Presets => {
            let registry = PresetRegistry::new();
            let presets: Vec<_> = registry.list()
                .iter()
                .map(|p| serde_json::json!({
                    "key": p.key,
                    "label": p.label,
                    "stageWidth": p.stage_width,
                    "targetRatio": config.target_ratio,
                }))
                .collect();

            print_json(&serde_json::Value::Array(presets));
            ExitCode::SUCCESS
        }

        Commands::CheckUpload { path, mime } => {
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => return fail(format!("Failed to read {}: {}", path.display(), e)),
            };
            let mime = mime.unwrap_or_else(|| guess_mime(&path));
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let file = UploadFile::new(filename, mime, bytes);
            let validator = UploadValidator::new(config.max_upload_bytes);

            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => return fail(e),
            };

            match runtime.block_on(validator.read_natural_dimensions(&file)) {
                Ok(dims) => {
                    print_json(&serde_json::json!({
                        "success": true,
                        "mimeType": file.mime_type,
                        "size": file.size(),
                        "checksum": file.checksum(),
                        "natural": dims,
                    }));
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    println!("{}", serde_json::json!({ "success": false, "error": e.to_string() }));
                    ExitCode::from(2)  // Upload policy or decode failure
                }
            }
        }

        Commands::InitBox { width, height, preset } => {
            let preset: PresetKey = match preset.parse() {
                Ok(p) => p,
                Err(e) => return fail(e),
            };
            let geometry = match CropGeometry::new(
                Dimensions::new(width, height),
                config.stage_width,
                config.stage_height,
                config.target_ratio,
                config.min_box_size,
            ) {
                Ok(g) => g,
                Err(e) => return fail(e),
            };

            let crop = geometry.to_natural_rect();
            let validation = Validator::new().validate(
                &CropInput {
                    preset,
                    natural: geometry.natural(),
                    rect: crop.natural,
                    ratio: geometry.current_ratio(),
                },
                &config,
            );

            print_json(&serde_json::json!({
                "success": true,
                "preset": preset,
                "display": geometry.display(),
                "stageBox": geometry.current(),
                "crop": crop,
                "validation": validation,
            }));
            ExitCode::SUCCESS
        }

        Commands::ToNatural { width, height, stage_box } => {
            let &[left, top, box_width, box_height] = stage_box.as_slice() else {
                return fail("--box needs left,top,width,height");
            };
            let mut geometry = match CropGeometry::new(
                Dimensions::new(width, height),
                config.stage_width,
                config.stage_height,
                config.target_ratio,
                config.min_box_size,
            ) {
                Ok(g) => g,
                Err(e) => return fail(e),
            };
            geometry.set_box(StageBox { left, top, width: box_width, height: box_height });

            print_json(&serde_json::json!({
                "success": true,
                "stageBox": geometry.current(),
                "crop": geometry.to_natural_rect(),
                "deviation": geometry.ratio_deviation(config.target_ratio),
            }));
            ExitCode::SUCCESS
        }
    }
}
