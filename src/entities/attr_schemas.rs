//! Static attribute schemas for node types.
//!
//! Each schema defines attribute metadata (DAG, display, keyable, etc.)
//! Used by Attrs::set() to decide whether a change dirties dependents.

use super::attrs::{AttrDef, AttrSchema, AttrType, FLAG_DAG, FLAG_DISPLAY, FLAG_KEYABLE, FLAG_STORABLE};
use super::keys::*;

// Shorthand flag combos
const DISP: u8 = FLAG_DISPLAY | FLAG_STORABLE;
const DAG_DISP: u8 = FLAG_DAG | FLAG_DISPLAY | FLAG_STORABLE;
const DAG_DISP_KEY: u8 = FLAG_DAG | FLAG_DISPLAY | FLAG_KEYABLE | FLAG_STORABLE;

// ============================================================================
// ProxyShape Schema
// ============================================================================

const PROXY_DEFS: &[AttrDef] = &[
    // Identity
    AttrDef::new(A_NAME, AttrType::String, DISP),

    // Stage source
    AttrDef::new(A_FILE_PATH, AttrType::String, DAG_DISP),
    AttrDef::new(A_EXCLUDE_PRIM_PATHS, AttrType::String, DAG_DISP),

    // Prim selection
    AttrDef::new(A_PRIM_PATH, AttrType::String, DAG_DISP),
    AttrDef::new(A_TIME, AttrType::Double, DAG_DISP_KEY),

    // Draw flags
    AttrDef::new(A_COMPLEXITY, AttrType::Int, DAG_DISP_KEY),
    AttrDef::new(A_DRAW_RENDER_PURPOSE, AttrType::Bool, DAG_DISP_KEY),
    AttrDef::new(A_DRAW_PROXY_PURPOSE, AttrType::Bool, DAG_DISP_KEY),
    AttrDef::new(A_DRAW_GUIDE_PURPOSE, AttrType::Bool, DAG_DISP_KEY),
];

pub static PROXY_SCHEMA: AttrSchema = AttrSchema::new("ProxyShape", PROXY_DEFS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_plug_input_is_dag() {
        for key in [A_FILE_PATH, A_EXCLUDE_PRIM_PATHS, A_PRIM_PATH, A_TIME, A_COMPLEXITY] {
            assert!(PROXY_SCHEMA.get(key).unwrap().is_dag(), "{key}");
        }
        assert!(!PROXY_SCHEMA.get(A_NAME).unwrap().is_dag());
    }
}
