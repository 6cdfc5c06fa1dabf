//! The selection request: convolution tensors, convolution parameters and
//! the ordered list of fused post-operations.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::tensor::{DType, TensorDesc, WeightsDesc};

/// A `(y, x)` pair used for stride, padding and dilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spatial {
    pub y: usize,
    pub x: usize,
}

impl Spatial {
    pub const fn new(y: usize, x: usize) -> Self {
        Self { y, x }
    }

    pub const fn splat(v: usize) -> Self {
        Self { y: v, x: v }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConvParams {
    pub stride: Spatial,
    /// Implicit zero padding applied on both sides of each spatial axis.
    pub padding: Spatial,
    pub dilation: Spatial,
    pub groups: usize,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            stride: Spatial::splat(1),
            padding: Spatial::splat(0),
            dilation: Spatial::splat(1),
            groups: 1,
        }
    }
}

impl ConvParams {
    /// Output extent along one spatial axis, or `None` when the dilated
    /// filter does not fit in the padded input or the stride is zero.
    pub fn output_extent(
        input: usize,
        filter: usize,
        stride: usize,
        padding: usize,
        dilation: usize,
    ) -> Option<usize> {
        if stride == 0 || dilation == 0 || filter == 0 {
            return None;
        }
        let window = (filter - 1).checked_mul(dilation)? + 1;
        let padded = input.checked_add(padding.checked_mul(2)?)?;
        let span = padded.checked_sub(window)?;
        Some(span / stride + 1)
    }

    /// Output `(y, x)` for the given input and filter spatial extents.
    pub fn output_spatial(&self, input: Spatial, filter: Spatial) -> Option<Spatial> {
        let y = Self::output_extent(
            input.y,
            filter.y,
            self.stride.y,
            self.padding.y,
            self.dilation.y,
        )?;
        let x = Self::output_extent(
            input.x,
            filter.x,
            self.stride.x,
            self.padding.x,
            self.dilation.x,
        )?;
        Some(Spatial::new(y, x))
    }

    pub fn is_dilated(&self) -> bool {
        self.dilation.y > 1 || self.dilation.x > 1
    }
}

/// Fused-op kinds, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FusedOpKind {
    Eltwise,
    Quantize,
    Scale,
    Activation,
}

impl FusedOpKind {
    pub fn jit_tag(self) -> &'static str {
        match self {
            FusedOpKind::Eltwise => "ELTWISE",
            FusedOpKind::Quantize => "QUANTIZE",
            FusedOpKind::Scale => "SCALE",
            FusedOpKind::Activation => "ACTIVATION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EltwiseMode {
    Sum,
    Sub,
    Prod,
    Max,
    Min,
}

impl EltwiseMode {
    pub fn jit_tag(self) -> &'static str {
        match self {
            EltwiseMode::Sum => "ELTWISE_MODE_SUM",
            EltwiseMode::Sub => "ELTWISE_MODE_SUB",
            EltwiseMode::Prod => "ELTWISE_MODE_PROD",
            EltwiseMode::Max => "ELTWISE_MODE_MAX",
            EltwiseMode::Min => "ELTWISE_MODE_MIN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationFunc {
    Relu,
    /// `x > 0 ? x : m * x`.
    ReluNegativeSlope,
    /// Clamp to `[m, n]`.
    Clamp,
    Sigmoid,
    Tanh,
    Abs,
    /// `m * x + n`.
    Linear,
    /// `x > 0 ? x : m * (exp(x) - 1)`.
    Elu,
}

impl ActivationFunc {
    pub fn jit_tag(self) -> &'static str {
        match self {
            ActivationFunc::Relu => "ACTIVATION_FUNC_RELU",
            ActivationFunc::ReluNegativeSlope => "ACTIVATION_FUNC_RELU_NEGATIVE_SLOPE",
            ActivationFunc::Clamp => "ACTIVATION_FUNC_CLAMP",
            ActivationFunc::Sigmoid => "ACTIVATION_FUNC_SIGMOID",
            ActivationFunc::Tanh => "ACTIVATION_FUNC_TANH",
            ActivationFunc::Abs => "ACTIVATION_FUNC_ABS",
            ActivationFunc::Linear => "ACTIVATION_FUNC_LINEAR",
            ActivationFunc::Elu => "ACTIVATION_FUNC_ELU",
        }
    }
}

/// A post-operation executed inside the convolution kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FusedOp {
    Eltwise {
        mode: EltwiseMode,
        operand: TensorDesc,
    },
    Quantize {
        in_lo: f32,
        in_hi: f32,
        out_lo: f32,
        out_hi: f32,
        levels: u32,
        out_dtype: DType,
    },
    Scale {
        scale: TensorDesc,
        #[serde(default)]
        shift: Option<TensorDesc>,
    },
    Activation {
        func: ActivationFunc,
        #[serde(default)]
        m: f32,
        #[serde(default)]
        n: f32,
    },
}

impl FusedOp {
    pub fn relu() -> Self {
        FusedOp::Activation {
            func: ActivationFunc::Relu,
            m: 0.0,
            n: 0.0,
        }
    }

    pub fn kind(&self) -> FusedOpKind {
        match self {
            FusedOp::Eltwise { .. } => FusedOpKind::Eltwise,
            FusedOp::Quantize { .. } => FusedOpKind::Quantize,
            FusedOp::Scale { .. } => FusedOpKind::Scale,
            FusedOp::Activation { .. } => FusedOpKind::Activation,
        }
    }

    /// `(in_scale, out_scale)` of a quantize op: input range to level index,
    /// then level index to output range. `None` for other ops, and when
    /// either scale is zero or not finite.
    pub fn quantize_scales(&self) -> Option<(f32, f32)> {
        let FusedOp::Quantize {
            in_lo,
            in_hi,
            out_lo,
            out_hi,
            levels,
            ..
        } = self
        else {
            return None;
        };
        let steps = levels.saturating_sub(1).max(1) as f32;
        let in_scale = steps / (in_hi - in_lo);
        let out_scale = (out_hi - out_lo) / steps;
        let usable = |scale: f32| scale.is_finite() && scale != 0.0;
        (usable(in_scale) && usable(out_scale)).then_some((in_scale, out_scale))
    }

    /// Secondary tensors read by the op, in kernel-argument slot order.
    pub fn operands(&self) -> SmallVec<[&TensorDesc; 2]> {
        let mut out = SmallVec::new();
        match self {
            FusedOp::Eltwise { operand, .. } => out.push(operand),
            FusedOp::Scale { scale, shift } => {
                out.push(scale);
                if let Some(shift) = shift {
                    out.push(shift);
                }
            }
            FusedOp::Quantize { .. } | FusedOp::Activation { .. } => {}
        }
        out
    }
}

/// Selection request for the fused convolution + elementwise operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedConvEltwiseParams {
    pub input: TensorDesc,
    pub weights: WeightsDesc,
    #[serde(default)]
    pub bias: Option<TensorDesc>,
    pub output: TensorDesc,
    #[serde(default)]
    pub conv: ConvParams,
    #[serde(default)]
    pub fused_ops: Vec<FusedOp>,
    /// Salts the generated entry point so two layers never share a symbol.
    #[serde(default)]
    pub layer_id: Option<String>,
}

impl FusedConvEltwiseParams {
    pub fn new(
        input: TensorDesc,
        weights: WeightsDesc,
        output: TensorDesc,
        conv: ConvParams,
    ) -> Self {
        Self {
            input,
            weights,
            bias: None,
            output,
            conv,
            fused_ops: Vec::new(),
            layer_id: None,
        }
    }

    pub fn with_bias(mut self, bias: TensorDesc) -> Self {
        self.bias = Some(bias);
        self
    }

    pub fn with_fused_op(mut self, op: FusedOp) -> Self {
        self.fused_ops.push(op);
        self
    }

    pub fn with_layer_id(mut self, layer_id: impl Into<String>) -> Self {
        self.layer_id = Some(layer_id.into());
        self
    }

    pub fn fused_op_kinds(&self) -> impl Iterator<Item = FusedOpKind> + '_ {
        self.fused_ops.iter().map(FusedOp::kind)
    }

    /// Output `(y, x)` implied by input, filter and convolution parameters.
    pub fn expected_output_spatial(&self) -> Option<Spatial> {
        self.conv.output_spatial(
            Spatial::new(self.input.y, self.input.x),
            Spatial::new(self.weights.y, self.weights.x),
        )
    }
}
