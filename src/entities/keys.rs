//! Attribute key constants for Attrs access.
//!
//! Usage: `shape.attrs().get_str(A_FILE_PATH)`

// === Identity ===
/// Human-readable node name
pub const A_NAME: &str = "name";

// === Stage source (recomposition inputs) ===
/// Root layer asset path
pub const A_FILE_PATH: &str = "file_path";
/// Comma-separated prim paths pruned from the composed stage
pub const A_EXCLUDE_PRIM_PATHS: &str = "exclude_prim_paths";

// === Prim selection ===
/// Prim the proxy represents (empty = default prim, then pseudo-root)
pub const A_PRIM_PATH: &str = "prim_path";
/// Evaluation time
pub const A_TIME: &str = "time";

// === Draw flags (output only) ===
/// Subdivision/refinement level for drawing
pub const A_COMPLEXITY: &str = "complexity";
/// Include render-purpose geometry
pub const A_DRAW_RENDER_PURPOSE: &str = "draw_render_purpose";
/// Include proxy-purpose geometry
pub const A_DRAW_PROXY_PURPOSE: &str = "draw_proxy_purpose";
/// Include guide-purpose geometry
pub const A_DRAW_GUIDE_PURPOSE: &str = "draw_guide_purpose";
