//! List the render targets.

use seqsynth_common::paths::post_process_material_path;
use seqsynth_render_engine::TargetKind;

pub fn run() -> anyhow::Result<()> {
    println!("Render targets (in render order):");
    for kind in TargetKind::ALL {
        let material = match kind {
            TargetKind::Color => "-".to_string(),
            other => post_process_material_path(other.display_name()),
        };
        println!(
            "  {:<9} -> <output>/{:<14} material: {}",
            kind.short_name(),
            kind.display_name(),
            material
        );
    }
    Ok(())
}
