use serde::Serialize;

use crate::params::FusedOpKind;
use crate::tensor::{DType, DataLayout};

/// Static description of what a kernel variant can execute.
///
/// Built from `'static` slices so every variant can hold its key in a
/// `const`; the answer never depends on a request instance.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapabilityKey {
    pub input_dtypes: &'static [DType],
    pub output_dtypes: &'static [DType],
    pub weights_dtypes: &'static [DType],
    pub bias_dtypes: &'static [DType],
    pub input_layouts: &'static [DataLayout],
    pub output_layouts: &'static [DataLayout],
    pub fused_ops: &'static [FusedOpKind],
    pub flags: CapabilityFlags,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityFlags {
    pub bias: bool,
    pub dilation: bool,
    pub grouped: bool,
    pub batching: bool,
    pub tensor_offset: bool,
    /// Input buffers must carry the padding the filter window reads.
    pub need_padded_input: bool,
}

impl CapabilityKey {
    /// Whether an input of `dtype` in `layout` can be combined with a fused
    /// op of `kind`.
    pub fn supports(&self, dtype: DType, layout: DataLayout, kind: FusedOpKind) -> bool {
        self.supports_input(dtype, layout) && self.supports_fused_op(kind)
    }

    pub fn supports_input(&self, dtype: DType, layout: DataLayout) -> bool {
        self.input_dtypes.contains(&dtype) && self.input_layouts.contains(&layout)
    }

    pub fn supports_output(&self, dtype: DType, layout: DataLayout) -> bool {
        self.output_dtypes.contains(&dtype) && self.output_layouts.contains(&layout)
    }

    pub fn supports_weights(&self, dtype: DType) -> bool {
        self.weights_dtypes.contains(&dtype)
    }

    pub fn supports_bias(&self, dtype: DType) -> bool {
        self.flags.bias && self.bias_dtypes.contains(&dtype)
    }

    pub fn supports_fused_op(&self, kind: FusedOpKind) -> bool {
        self.fused_ops.contains(&kind)
    }
}
