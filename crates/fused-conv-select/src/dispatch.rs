//! Launch geometry for a validated request.
//!
//! Dimensions are always ordered `[x, y, feature * batch]`. The local size
//! is the tile shape; the global size rounds each output extent up to a
//! whole number of tiles. Partial tiles are never trimmed from the grid,
//! they are reported to the kernel through `LEFTOVERS_*`/`MASK_LAST_*`.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{SelectorError, SelectorResult};
use crate::params::FusedConvEltwiseParams;
use crate::tuning::{ShapeClass, TunedConfig, TuningTable};
use crate::variants::{TileCandidates, VariantId};

pub const MAX_WORK_GROUP_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileShape {
    pub x: usize,
    pub y: usize,
    pub f: usize,
}

impl TileShape {
    pub const fn new(x: usize, y: usize, f: usize) -> Self {
        Self { x, y, f }
    }

    pub fn volume(&self) -> usize {
        self.x * self.y * self.f
    }
}

impl From<TunedConfig> for TileShape {
    fn from(config: TunedConfig) -> Self {
        Self::new(config.tile_x, config.tile_y, config.tile_f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DispatchData {
    pub gws: [usize; 3],
    pub lws: [usize; 3],
    pub tile: TileShape,
    /// Extent covered along each dimension, before rounding to `lws`.
    pub extent: [usize; 3],
    /// Output feature count, before alignment to the feature tile.
    pub output_features: usize,
    /// Tuned config that replaced the heuristic, if any.
    pub tune_index: Option<usize>,
}

impl DispatchData {
    /// Elements in the last, partial tile along `[x, y, f]`; zero when the
    /// tile divides the extent.
    pub fn leftovers(&self) -> [usize; 3] {
        [
            self.extent[0] % self.tile.x,
            self.extent[1] % self.tile.y,
            self.output_features % self.tile.f,
        ]
    }

    pub fn has_partial_tile(&self) -> [bool; 3] {
        self.leftovers().map(|left| left != 0)
    }

    pub fn aligned_output_features(&self) -> usize {
        align_up(self.output_features, self.tile.f)
    }

    pub fn work_groups(&self) -> [usize; 3] {
        [
            self.gws[0] / self.lws[0],
            self.gws[1] / self.lws[1],
            self.gws[2] / self.lws[2],
        ]
    }
}

pub fn ceil_div(value: usize, divisor: usize) -> usize {
    if value == 0 {
        0
    } else {
        value.div_ceil(divisor).max(1)
    }
}

/// Smallest multiple of `multiple` that is `>= value`.
pub fn align_up(value: usize, multiple: usize) -> usize {
    ceil_div(value, multiple) * multiple
}

/// Computes launch geometry for `variant`.
///
/// `tune_index` selects an entry of the tuning table for the request's shape
/// class; negative, absent or out-of-range indices use the heuristic tile.
/// Callers must have validated the request.
pub fn plan(
    variant: VariantId,
    params: &FusedConvEltwiseParams,
    tuning: &TuningTable,
    tune_index: Option<i64>,
) -> SelectorResult<DispatchData> {
    let hooks = variant.hooks();
    let spatial = params.expected_output_spatial().ok_or_else(|| {
        SelectorError::malformed("convolution output extent cannot be computed")
    })?;
    let (out_x, out_y) = (spatial.x, spatial.y);
    let out_f = params.output.feature;
    let batch = params.output.batch;
    if out_x == 0 || out_y == 0 || out_f == 0 || batch == 0 {
        return Err(SelectorError::malformed(format!(
            "empty output extent {batch}x{out_f}x{out_y}x{out_x}"
        )));
    }

    let class = ShapeClass::of(&params.output);
    let tuned = tune_index.and_then(|index| {
        let config = usize::try_from(index)
            .ok()
            .and_then(|slot| tuning.lookup(variant, class, slot).map(|c| (slot, c)));
        if config.is_none() {
            debug!(
                variant = %variant,
                index,
                available = tuning.len(variant, class),
                "tune index out of range, using heuristic tile"
            );
        }
        config
    });

    let (tile, tune_index) = match tuned {
        Some((slot, config)) => (TileShape::from(config), Some(slot)),
        None => (
            heuristic_tile(&hooks.tiles, hooks.feature_slice, out_x, out_y, out_f),
            None,
        ),
    };

    let extent = [out_x, out_y, align_up(out_f, tile.f) * batch];
    let lws = [tile.x, tile.y, tile.f];
    let gws = [
        align_up(extent[0], lws[0]),
        align_up(extent[1], lws[1]),
        align_up(extent[2], lws[2]),
    ];
    trace!(variant = %variant, ?gws, ?lws, ?tune_index, "dispatch planned");
    Ok(DispatchData {
        gws,
        lws,
        tile,
        extent,
        output_features: out_f,
        tune_index,
    })
}

/// Largest candidate whose padding waste stays within a quarter of the
/// extent; falls back to the smallest candidate.
fn pick_spatial(candidates: &[usize], extent: usize) -> usize {
    candidates
        .iter()
        .copied()
        .find(|&tile| (align_up(extent, tile) - extent) * 4 <= extent)
        .or_else(|| candidates.iter().copied().min())
        .unwrap_or(1)
}

/// Largest candidate dividing the slice-aligned feature count.
fn pick_feature(candidates: &[usize], feature_slice: usize, out_f: usize) -> usize {
    let aligned = align_up(out_f, feature_slice);
    candidates
        .iter()
        .copied()
        .find(|&tile| aligned % tile == 0)
        .or_else(|| candidates.iter().copied().min())
        .unwrap_or(feature_slice)
}

fn next_smaller(candidates: &[usize], current: usize) -> Option<usize> {
    candidates.iter().copied().find(|&tile| tile < current)
}

pub(crate) fn heuristic_tile(
    candidates: &TileCandidates,
    feature_slice: usize,
    out_x: usize,
    out_y: usize,
    out_f: usize,
) -> TileShape {
    let mut tile = TileShape::new(
        pick_spatial(candidates.x, out_x),
        pick_spatial(candidates.y, out_y),
        pick_feature(candidates.f, feature_slice, out_f),
    );
    while tile.volume() > MAX_WORK_GROUP_SIZE {
        if let Some(y) = next_smaller(candidates.y, tile.y) {
            tile.y = y;
        } else if let Some(f) = next_smaller(candidates.f, tile.f) {
            tile.f = f;
        } else if let Some(x) = next_smaller(candidates.x, tile.x) {
            tile.x = x;
        } else {
            break;
        }
    }
    tile
}

#[cfg(test)]
mod tests {
    use super::*;

    const FSV4: TileCandidates = TileCandidates {
        x: &[8, 4, 2, 1],
        y: &[4, 2, 1],
        f: &[16, 8, 4],
    };

    #[test]
    fn heuristic_caps_work_group_volume() {
        let tile = heuristic_tile(&FSV4, 4, 8, 8, 32);
        assert_eq!(tile, TileShape::new(8, 2, 16));
        assert!(tile.volume() <= MAX_WORK_GROUP_SIZE);
    }

    #[test]
    fn feature_tile_divides_aligned_features() {
        assert_eq!(pick_feature(FSV4.f, 4, 4), 4);
        assert_eq!(pick_feature(FSV4.f, 4, 24), 8);
        assert_eq!(pick_feature(FSV4.f, 4, 30), 16);
    }

    #[test]
    fn spatial_tile_limits_padding_waste() {
        assert_eq!(pick_spatial(FSV4.x, 7), 8);
        assert_eq!(pick_spatial(FSV4.x, 5), 2);
        assert_eq!(pick_spatial(FSV4.x, 1), 1);
        assert_eq!(pick_spatial(FSV4.y, 3), 1);
        assert_eq!(pick_spatial(FSV4.y, 16), 4);
    }

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(7, 4), 8);
        assert_eq!(align_up(8, 4), 8);
        assert_eq!(align_up(0, 4), 0);
    }
}
