//! Tensor descriptors as seen by kernel selection.
//!
//! Activations are always described in logical `(b, f, y, x)` order; the
//! [`DataLayout`] decides how those dims map to memory. Pitches are derived
//! on demand from layout and padded extents and are never stored, so a
//! descriptor cannot disagree with itself.

use serde::{Deserialize, Serialize};

/// Element types a fused convolution kernel can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    F16,
    Si8,
    Ui8,
    Si32,
}

impl DType {
    /// Scalar type name used by the kernel template.
    pub fn kernel_type(self) -> &'static str {
        match self {
            DType::F32 => "float",
            DType::F16 => "half",
            DType::Si8 => "char",
            DType::Ui8 => "uchar",
            DType::Si32 => "int",
        }
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Si8 | DType::Ui8 => 1,
            DType::F16 => 2,
            DType::F32 | DType::Si32 => 4,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F16)
    }

    pub fn is_quantized(self) -> bool {
        matches!(self, DType::Si8 | DType::Ui8)
    }
}

/// Memory arrangement of an activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataLayout {
    Bfyx,
    Byxf,
    /// Batch, feature slices of 4, y, x, then the 4 features of the slice.
    BFsYxFsv4,
}

impl DataLayout {
    /// Number of features packed together along the innermost axis.
    pub fn feature_slice(self) -> usize {
        match self {
            DataLayout::Bfyx | DataLayout::Byxf => 1,
            DataLayout::BFsYxFsv4 => 4,
        }
    }

    /// Tag emitted as `<PREFIX>_LAYOUT_<TAG>` for the kernel template.
    pub fn jit_tag(self) -> &'static str {
        match self {
            DataLayout::Bfyx => "BFYX",
            DataLayout::Byxf => "BYXF",
            DataLayout::BFsYxFsv4 => "B_FS_YX_FSV4",
        }
    }
}

/// Memory arrangement of a weights tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeightsLayout {
    Oiyx,
    /// Output-feature blocks of 16, input-feature blocks of 4, y, x, then
    /// the 16x4 block with input features innermost.
    OsIsYxOsv16Isv4,
}

impl WeightsLayout {
    /// `(output feature block, input feature block)`.
    pub fn block(self) -> (usize, usize) {
        match self {
            WeightsLayout::Oiyx => (1, 1),
            WeightsLayout::OsIsYxOsv16Isv4 => (16, 4),
        }
    }

    pub fn jit_tag(self) -> &'static str {
        match self {
            WeightsLayout::Oiyx => "OIYX",
            WeightsLayout::OsIsYxOsv16Isv4 => "OS_IS_YX_OSV16_ISV4",
        }
    }
}

/// Padding on the spatial axes, in elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpatialPadding {
    #[serde(default)]
    pub y_before: usize,
    #[serde(default)]
    pub y_after: usize,
    #[serde(default)]
    pub x_before: usize,
    #[serde(default)]
    pub x_after: usize,
}

impl SpatialPadding {
    pub fn uniform(y: usize, x: usize) -> Self {
        Self {
            y_before: y,
            y_after: y,
            x_before: x,
            x_after: x,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Element strides of an activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pitches {
    pub x: usize,
    pub y: usize,
    /// Step between neighbouring features inside one slice.
    pub feature: usize,
    /// Step between feature slices; equal to `feature` for plain layouts.
    pub feature_slice: usize,
    pub batch: usize,
}

/// Shape, element type and layout of an activation tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDesc {
    pub batch: usize,
    pub feature: usize,
    pub y: usize,
    pub x: usize,
    pub dtype: DType,
    pub layout: DataLayout,
    #[serde(default)]
    pub padding: SpatialPadding,
    /// Element offset of the buffer start, before padding.
    #[serde(default)]
    pub offset: usize,
}

impl TensorDesc {
    pub fn new(dims: [usize; 4], dtype: DType, layout: DataLayout) -> Self {
        let [batch, feature, y, x] = dims;
        Self {
            batch,
            feature,
            y,
            x,
            dtype,
            layout,
            padding: SpatialPadding::default(),
            offset: 0,
        }
    }

    pub fn with_padding(mut self, padding: SpatialPadding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn dims(&self) -> [usize; 4] {
        [self.batch, self.feature, self.y, self.x]
    }

    /// Logical element count; `None` on overflow.
    pub fn element_count(&self) -> Option<usize> {
        self.dims()
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    pub fn padded_x(&self) -> Option<usize> {
        self.padding
            .x_before
            .checked_add(self.x)?
            .checked_add(self.padding.x_after)
    }

    pub fn padded_y(&self) -> Option<usize> {
        self.padding
            .y_before
            .checked_add(self.y)?
            .checked_add(self.padding.y_after)
    }

    /// Number of feature slices, counting a partially filled last slice.
    pub fn feature_slices(&self) -> usize {
        self.feature.div_ceil(self.layout.feature_slice())
    }

    /// Strides in elements, or `None` when one of them overflows.
    pub fn pitches(&self) -> Option<Pitches> {
        let px = self.padded_x()?;
        let py = self.padded_y()?;
        let pitches = match self.layout {
            DataLayout::Bfyx => {
                let feature = px.checked_mul(py)?;
                Pitches {
                    x: 1,
                    y: px,
                    feature,
                    feature_slice: feature,
                    batch: feature.checked_mul(self.feature)?,
                }
            }
            DataLayout::Byxf => {
                let y = self.feature.checked_mul(px)?;
                Pitches {
                    x: self.feature,
                    y,
                    feature: 1,
                    feature_slice: 1,
                    batch: y.checked_mul(py)?,
                }
            }
            DataLayout::BFsYxFsv4 => {
                let fsv = self.layout.feature_slice();
                let y = fsv.checked_mul(px)?;
                let slice = y.checked_mul(py)?;
                Pitches {
                    x: fsv,
                    y,
                    feature: 1,
                    feature_slice: slice,
                    batch: slice.checked_mul(self.feature_slices())?,
                }
            }
        };
        Some(pitches)
    }

    /// Offset of logical element `(0, 0, 0, 0)` once padding is skipped.
    pub fn first_element_offset(&self) -> Option<usize> {
        let pitches = self.pitches()?;
        self.padding
            .y_before
            .checked_mul(pitches.y)?
            .checked_add(self.padding.x_before.checked_mul(pitches.x)?)?
            .checked_add(self.offset)
    }

    /// Buffer length in elements, including padding and offset. `None` when
    /// the buffer cannot be indexed with a signed 64-bit offset.
    pub fn physical_len(&self) -> Option<usize> {
        self.pitches()?
            .batch
            .checked_mul(self.batch)?
            .checked_add(self.offset)
            .filter(|&len| fits_i64(len))
    }

    /// Same `b/y/x` extents; features are compared by the caller.
    pub fn same_spatial_and_batch(&self, other: &TensorDesc) -> bool {
        self.batch == other.batch && self.y == other.y && self.x == other.x
    }
}

/// Element strides of a weights tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightsPitches {
    pub x: usize,
    pub y: usize,
    pub ifm: usize,
    pub ofm: usize,
    pub ifm_block: usize,
    pub ofm_block: usize,
}

/// Convolution filter, `(ofm, ifm, y, x)` with `ifm` counted per group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightsDesc {
    pub ofm: usize,
    pub ifm: usize,
    pub y: usize,
    pub x: usize,
    pub dtype: DType,
    pub layout: WeightsLayout,
}

impl WeightsDesc {
    pub fn new(dims: [usize; 4], dtype: DType, layout: WeightsLayout) -> Self {
        let [ofm, ifm, y, x] = dims;
        Self {
            ofm,
            ifm,
            y,
            x,
            dtype,
            layout,
        }
    }

    /// Strides in elements, or `None` when one of them overflows.
    pub fn pitches(&self) -> Option<WeightsPitches> {
        let spatial = self.x.checked_mul(self.y)?;
        let pitches = match self.layout {
            WeightsLayout::Oiyx => {
                let ofm = spatial.checked_mul(self.ifm)?;
                WeightsPitches {
                    x: 1,
                    y: self.x,
                    ifm: spatial,
                    ofm,
                    ifm_block: spatial,
                    ofm_block: ofm,
                }
            }
            WeightsLayout::OsIsYxOsv16Isv4 => {
                let (osv, isv) = self.layout.block();
                let block = osv * isv;
                let ifm_block = block.checked_mul(spatial)?;
                WeightsPitches {
                    x: block,
                    y: block.checked_mul(self.x)?,
                    ifm: 1,
                    ofm: isv,
                    ifm_block,
                    ofm_block: ifm_block.checked_mul(self.ifm.div_ceil(isv))?,
                }
            }
        };
        Some(pitches)
    }

    /// Buffer length in elements with blocked dims rounded up to whole
    /// blocks. `None` when the buffer cannot be indexed with a signed 64-bit
    /// offset.
    pub fn physical_len(&self) -> Option<usize> {
        let (osv, _) = self.layout.block();
        self.pitches()?
            .ofm_block
            .checked_mul(self.ofm.div_ceil(osv))
            .filter(|&len| fits_i64(len))
    }
}

fn fits_i64(len: usize) -> bool {
    i64::try_from(len).is_ok()
}
