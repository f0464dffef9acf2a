//! Validate a SeqSynth timeline file.

use std::path::PathBuf;

use seqsynth_sequence_model::LoadedTimeline;

pub fn run(path: PathBuf) -> anyhow::Result<()> {
    println!("Validating timeline at: {}", path.display());

    let loaded =
        LoadedTimeline::load(&path).map_err(|e| anyhow::anyhow!("Failed to load timeline: {e}"))?;
    let timeline = &loaded.timeline;

    println!("  Name: {}", timeline.name);
    println!("  Version: {}", timeline.version);
    println!("  FPS: {}", timeline.frame_rate);
    println!("  Frames: {}", timeline.frame_count());
    println!("  Camera cuts: {}", timeline.camera_cuts.len());
    for cut in &timeline.camera_cuts {
        println!(
            "    {} [{}..{})",
            cut.camera.name, cut.start_frame, cut.end_frame
        );
    }
    println!("  Semantic classes: {}", timeline.semantic_classes.len());

    let issues = timeline.validate();
    if issues.is_empty() {
        println!("\nTimeline is valid.");
    } else {
        println!("\nValidation issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        println!(
            "\n{} issue(s) found. Rendering may fail.",
            issues.len()
        );
    }

    Ok(())
}
