//! SeqSynth CLI: create timelines and render their image targets.
//!
//! Usage:
//!   seqsynth init <NAME>          Write a sample timeline
//!   seqsynth validate <PATH>      Validate a timeline file
//!   seqsynth targets              List the render targets
//!   seqsynth render <PATH>        Render the selected targets

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use seqsynth_render_engine::TargetKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "seqsynth",
    about = "Sequential multi-target rendering of camera timelines",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a sample timeline file
    Init {
        /// Timeline name
        name: String,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Frame rate
        #[arg(long, default_value = "30")]
        fps: u32,

        /// Number of camera cut sections
        #[arg(long, default_value = "2")]
        cameras: usize,

        /// Frames per camera cut
        #[arg(long, default_value = "120")]
        frames_per_cut: u64,
    },

    /// Validate a timeline file
    Validate {
        /// Path to the timeline JSON file
        path: PathBuf,
    },

    /// List render targets and their output directories
    Targets,

    /// Render the selected targets of a timeline
    Render {
        /// Path to the timeline JSON file
        path: PathBuf,

        /// Output directory (defaults to the configured output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Targets to render: color, depth, normal, semantic
        #[arg(
            long,
            value_delimiter = ',',
            default_value = "color,depth,normal,semantic"
        )]
        targets: Vec<TargetKind>,

        /// Depth range of the depth target (meters)
        #[arg(long)]
        depth_range: Option<f64>,

        /// Pause between scene preparation and job submission (ms)
        #[arg(long)]
        grace_delay_ms: Option<u64>,

        /// Directory pipeline configuration assets are resolved against
        #[arg(long)]
        config_root: Option<PathBuf>,

        /// Print the run outcome as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let app_config = seqsynth_common::config::AppConfig::load();
    seqsynth_common::logging::init_logging(&seqsynth_common::logging::logging_for_verbosity(
        &app_config.logging,
        cli.verbose,
    ));

    match cli.command {
        Commands::Init {
            name,
            output,
            fps,
            cameras,
            frames_per_cut,
        } => commands::init::run(name, output, fps, cameras, frames_per_cut),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Targets => commands::targets::run(),
        Commands::Render {
            path,
            output,
            targets,
            depth_range,
            grace_delay_ms,
            config_root,
            json,
        } => {
            let args = commands::render::RenderArgs {
                path,
                output,
                targets,
                depth_range,
                grace_delay_ms,
                config_root,
                json,
            };
            commands::render::run(args, app_config).await
        }
    }
}
