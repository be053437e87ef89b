//! Render mode switches.

use serde::{Deserialize, Serialize};

/// The viewer's render switches. Several can be set at once; the stylization
/// pass resolves them by fixed priority (see [`RenderSettings::mode`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Dithered black/white halftone output.
    pub one_bit: bool,
    /// Cast a secondary ray toward the light and darken occluded samples.
    pub shadow: bool,
    /// Contour shading: blend toward the cavity tint at creases.
    pub edges: bool,
    /// Triangle-boundary overlay.
    pub wireframe: bool,
    /// Lambertian shading for material-resolved (textured/vertex-colored)
    /// samples; without it those samples render flat.
    pub shading: bool,
    /// Resolve texture colors while sampling.
    pub textured: bool,
    /// Resolve vertex colors while sampling.
    pub vertexcolors: bool,
}

/// The mutually exclusive stylization modes, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleMode {
    OneBit,
    Wireframe,
    Edges,
    Shaded,
}

impl RenderSettings {
    /// Resolve the switch combination to one stylization mode.
    pub fn mode(&self) -> StyleMode {
        if self.one_bit {
            StyleMode::OneBit
        } else if self.wireframe {
            StyleMode::Wireframe
        } else if self.edges {
            StyleMode::Edges
        } else {
            StyleMode::Shaded
        }
    }

    /// True if sampling should resolve material colors into the G-buffer.
    pub fn wants_material(&self) -> bool {
        self.textured || self.vertexcolors
    }
}
