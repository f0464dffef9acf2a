//! Create a sample SeqSynth timeline.

use std::path::PathBuf;

use seqsynth_sequence_model::{LoadedTimeline, Timeline};

pub fn run(
    name: String,
    output: PathBuf,
    fps: u32,
    cameras: usize,
    frames_per_cut: u64,
) -> anyhow::Result<()> {
    if cameras == 0 {
        anyhow::bail!("A timeline needs at least one camera cut");
    }

    let path = output.join(format!("{name}.json"));
    println!("Creating timeline '{}' at {}", name, path.display());

    let timeline = Timeline::sample(&name, fps, cameras, frames_per_cut);
    let loaded = LoadedTimeline::create(&path, timeline)
        .map_err(|e| anyhow::anyhow!("Failed to create timeline: {e}"))?;

    println!("Timeline created successfully:");
    println!("  File: {}", loaded.path.display());
    println!("  FPS: {fps}");
    println!("  Camera cuts: {cameras} x {frames_per_cut} frames");
    println!(
        "  Duration: {:.2}s ({} frames)",
        loaded.timeline.duration_secs(),
        loaded.timeline.frame_count()
    );

    Ok(())
}
