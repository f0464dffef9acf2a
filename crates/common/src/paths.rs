//! Asset path helpers.
//!
//! Asset references are slash-separated names rooted at the plugin
//! content directory (`/SeqSynth`), independent of the host platform's
//! path separator. Config loaders map them to files on disk.

/// Name the plugin's content is mounted under.
pub const PLUGIN_NAME: &str = "SeqSynth";

/// Asset name of the default pipeline configuration, relative to the
/// content root.
pub const DEFAULT_PIPELINE_CONFIG_ASSET: &str = "SeqSynth/DefaultPipelineConfig";

const POST_PROCESS_MATERIALS_DIR: &str = "PostProcessMaterials";

/// Plugin content directory.
pub fn plugin_content_dir() -> String {
    format!("/{PLUGIN_NAME}")
}

/// Reference path of the default pipeline configuration.
pub fn default_pipeline_config_path() -> String {
    format!("/{DEFAULT_PIPELINE_CONFIG_ASSET}")
}

/// Directory containing post-process materials for render targets.
pub fn post_process_materials_dir() -> String {
    combine(&plugin_content_dir(), POST_PROCESS_MATERIALS_DIR)
}

/// Clean name of the post-process material for a target (`M_PP<Target>`).
pub fn post_process_material_name(target_name: &str) -> String {
    format!("M_PP{target_name}")
}

/// Reference path of the post-process material for a target.
pub fn post_process_material_path(target_name: &str) -> String {
    combine(
        &post_process_materials_dir(),
        &post_process_material_name(target_name),
    )
}

/// Strip the leading slash of an asset reference so it can be joined
/// onto a filesystem root.
pub fn relative_asset_path(reference: &str) -> &str {
    reference.trim_start_matches('/')
}

fn combine(base: &str, leaf: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        leaf.trim_start_matches('/')
    )
}
