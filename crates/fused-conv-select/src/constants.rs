use tracing::trace;

use crate::dispatch::DispatchData;
use crate::error::SelectorResult;
use crate::fused_ops::all_fused_op_constants;
use crate::jit::{tensor_constants, weights_constants, JitConstants};
use crate::params::FusedConvEltwiseParams;
use crate::variants::VariantId;

/// Builds the full constant set specializing `variant`'s template.
///
/// Order: tensor blocks, convolution, dispatch, variant extras, fused-op
/// blocks, fused-op aggregates. Any name collision is an error.
pub fn build_constants(
    variant: VariantId,
    params: &FusedConvEltwiseParams,
    dispatch: &DispatchData,
) -> SelectorResult<JitConstants> {
    let hooks = variant.hooks();
    let mut jit = JitConstants::new();

    jit.merge(tensor_constants("INPUT0", &params.input)?)?;
    jit.merge(weights_constants("FILTER", &params.weights)?)?;
    if let Some(bias) = &params.bias {
        jit.merge(tensor_constants("BIAS", bias)?)?;
    }
    jit.merge(tensor_constants("OUTPUT", &params.output)?)?;

    let conv = &params.conv;
    jit.define("STRIDE_SIZE_Y", conv.stride.y)?;
    jit.define("STRIDE_SIZE_X", conv.stride.x)?;
    jit.define("PADDING_SIZE_Y", conv.padding.y)?;
    jit.define("PADDING_SIZE_X", conv.padding.x)?;
    jit.define("DILATION_SIZE_Y", conv.dilation.y)?;
    jit.define("DILATION_SIZE_X", conv.dilation.x)?;
    jit.define("FILTER_GROUPS_NUM", conv.groups)?;
    jit.define("BIAS_TERM", params.bias.is_some())?;
    jit.define("NEED_PADDED_INPUT", hooks.key.flags.need_padded_input)?;

    let tile = dispatch.tile;
    let [left_x, left_y, left_f] = dispatch.leftovers();
    jit.define("TILE_X", tile.x)?;
    jit.define("TILE_Y", tile.y)?;
    jit.define("TILE_F", tile.f)?;
    jit.define("FSV", hooks.feature_slice)?;
    jit.define("ALIGNED_OUTPUT_FEATURE_NUM", dispatch.aligned_output_features())?;
    jit.define("LEFTOVERS_X", left_x)?;
    jit.define("LEFTOVERS_Y", left_y)?;
    jit.define("LEFTOVERS_F", left_f)?;
    jit.define("MASK_LAST_X", left_x != 0)?;
    jit.define("MASK_LAST_Y", left_y != 0)?;
    jit.define("MASK_LAST_F", left_f != 0)?;

    jit.merge((hooks.extra_jit)(params, dispatch)?)?;
    jit.merge(all_fused_op_constants(variant, params)?)?;

    trace!(variant = %variant, constants = jit.len(), "jit constants built");
    Ok(jit)
}
