//! Render the selected targets of a timeline.
//!
//! Jobs go to the manifest executor, which writes one `job.json` per
//! target directory instead of rendering frames.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use seqsynth_common::config::AppConfig;
use seqsynth_render_engine::manifest::ManifestExecutor;
use seqsynth_render_engine::{
    HostServices, JsonConfigLoader, RendererConfig, SequenceRenderer, TargetKind, TargetSelection,
};
use seqsynth_sequence_model::{LoadedTimeline, TextureStyleManager};

pub struct RenderArgs {
    pub path: PathBuf,
    pub output: Option<PathBuf>,
    pub targets: Vec<TargetKind>,
    pub depth_range: Option<f64>,
    pub grace_delay_ms: Option<u64>,
    pub config_root: Option<PathBuf>,
    pub json: bool,
}

pub async fn run(args: RenderArgs, app_config: AppConfig) -> anyhow::Result<()> {
    let loaded = LoadedTimeline::load(&args.path)
        .map_err(|e| anyhow::anyhow!("Failed to load timeline: {e}"))?;
    let output = args.output.unwrap_or_else(|| app_config.output_dir.join(&loaded.timeline.name));

    let mut config = RendererConfig::from(&app_config.renderer);
    if let Some(range) = args.depth_range {
        config.target_params.depth_range_meters = range;
    }
    if let Some(ms) = args.grace_delay_ms {
        config.grace_delay = Duration::from_millis(ms);
    }

    let config_root = args
        .config_root
        .or_else(|| app_config.renderer.config_root.clone())
        .unwrap_or_else(|| args.path.parent().map(PathBuf::from).unwrap_or_default());

    let selection: TargetSelection = args.targets.iter().copied().collect();

    println!("Rendering timeline at: {}", args.path.display());
    println!("  Output: {}", output.display());
    println!(
        "  Targets: {}",
        args.targets
            .iter()
            .map(|t| t.display_name())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Grace delay: {}ms", config.grace_delay.as_millis());

    let view = TextureStyleManager::for_timeline(&loaded.timeline).into_shared();
    let timeline = loaded.timeline.into_shared();

    let host = HostServices::new(
        Arc::new(ManifestExecutor::new()),
        Arc::new(JsonConfigLoader::new(config_root)),
    );
    let renderer = SequenceRenderer::new(host, view, config);
    renderer.notifier().on_finished(|outcome| {
        tracing::debug!(
            run_id = outcome.run_id,
            success = outcome.success,
            "Run finished"
        );
    });

    let outcome = renderer
        .render(&Arc::downgrade(&timeline), &selection, &output)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    for target in &outcome.completed_targets {
        println!("  Rendered: {}", output.join(target).display());
    }
    match outcome.error {
        None => {
            println!("\nRendering complete: {}", output.display());
            Ok(())
        }
        Some(error) => Err(anyhow::anyhow!("Rendering failed: {error}")),
    }
}
