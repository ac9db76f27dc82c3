//! Spatial padding and output-extent arithmetic shared by every windowed operation.
//!
//! Pooling and convolution both resolve their padding through [`calc_padding`] and derive their
//! output extents through [`spatial_output_size`], so the two kinds can never disagree on
//! geometry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PaddingMode {
    /// Pads so that `output = ceil(input / stride)`, with any odd remainder on the trailing side.
    Same,
    /// No implicit padding.
    #[default]
    Valid,
}

/// Rounding applied when the window does not tile the padded input exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OutputShapeRounding {
    #[default]
    Floor,
    Ceiling,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaddingError {
    #[error("{name} must be > 0")]
    ZeroParameter { name: &'static str },
    #[error("dilated window ({window}) exceeds padded input ({padded})")]
    WindowExceedsInput { window: usize, padded: usize },
    #[error("spatial arithmetic overflowed")]
    Overflow,
}

fn nonzero(value: usize, name: &'static str) -> Result<usize, PaddingError> {
    if value == 0 {
        return Err(PaddingError::ZeroParameter { name });
    }
    Ok(value)
}

/// Effective extent of a window once dilation spreads its taps apart.
pub fn dilated_filter_size(filter: usize, dilation: usize) -> Result<usize, PaddingError> {
    let filter = nonzero(filter, "filter size")?;
    let dilation = nonzero(dilation, "dilation")?;
    (filter - 1)
        .checked_mul(dilation)
        .and_then(|v| v.checked_add(1))
        .ok_or(PaddingError::Overflow)
}

/// Returns `(front, back)` padding for one spatial axis.
///
/// `Valid` always yields `(0, 0)`. For `Same`, the total padding is
/// `max(0, (ceil(input / stride) - 1) * stride + dilated - input)`, split with the smaller half
/// in front.
pub fn calc_padding(
    input: usize,
    filter: usize,
    stride: usize,
    dilation: usize,
    mode: PaddingMode,
) -> Result<(usize, usize), PaddingError> {
    match mode {
        PaddingMode::Valid => Ok((0, 0)),
        PaddingMode::Same => {
            let stride = nonzero(stride, "stride")?;
            let dilated = dilated_filter_size(filter, dilation)?;
            let output = input.div_ceil(stride);
            let needed = output
                .saturating_sub(1)
                .checked_mul(stride)
                .and_then(|v| v.checked_add(dilated))
                .ok_or(PaddingError::Overflow)?;
            let total = needed.saturating_sub(input);
            let front = total / 2;
            Ok((front, total - front))
        }
    }
}

/// Number of window positions along one axis after explicit padding.
pub fn spatial_output_size(
    input: usize,
    filter: usize,
    stride: usize,
    dilation: usize,
    pad_front: usize,
    pad_back: usize,
    rounding: OutputShapeRounding,
) -> Result<usize, PaddingError> {
    let stride = nonzero(stride, "stride")?;
    let window = dilated_filter_size(filter, dilation)?;
    let padded = input
        .checked_add(pad_front)
        .and_then(|v| v.checked_add(pad_back))
        .ok_or(PaddingError::Overflow)?;
    if padded < window {
        return Err(PaddingError::WindowExceedsInput { window, padded });
    }
    let span = padded - window;
    let steps = match rounding {
        OutputShapeRounding::Floor => span / stride,
        OutputShapeRounding::Ceiling => span.div_ceil(stride),
    };
    Ok(steps + 1)
}

/// Concrete per-edge padding of a 2-D window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExplicitPadding {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

/// Padding attached to a spatial descriptor: either fixed up front or computed from the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Padding2d {
    Explicit(ExplicitPadding),
    Implicit(PaddingMode),
}

impl Default for Padding2d {
    fn default() -> Self {
        Padding2d::Implicit(PaddingMode::Valid)
    }
}

/// Window geometry of a 2-D spatial operation along both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window2d {
    pub filter_h: usize,
    pub filter_w: usize,
    pub stride_y: usize,
    pub stride_x: usize,
    pub dilation_y: usize,
    pub dilation_x: usize,
}

impl Window2d {
    /// Resolves `padding` against an input of `in_h` x `in_w`.
    pub fn resolve_padding(
        &self,
        padding: Padding2d,
        in_h: usize,
        in_w: usize,
    ) -> Result<ExplicitPadding, PaddingError> {
        match padding {
            Padding2d::Explicit(explicit) => Ok(explicit),
            Padding2d::Implicit(mode) => {
                let (top, bottom) =
                    calc_padding(in_h, self.filter_h, self.stride_y, self.dilation_y, mode)?;
                let (left, right) =
                    calc_padding(in_w, self.filter_w, self.stride_x, self.dilation_x, mode)?;
                Ok(ExplicitPadding {
                    left,
                    right,
                    top,
                    bottom,
                })
            }
        }
    }

    /// Output `(height, width)` for the given input extent and resolved padding.
    pub fn output_size(
        &self,
        in_h: usize,
        in_w: usize,
        pad: &ExplicitPadding,
        rounding: OutputShapeRounding,
    ) -> Result<(usize, usize), PaddingError> {
        let out_h = spatial_output_size(
            in_h,
            self.filter_h,
            self.stride_y,
            self.dilation_y,
            pad.top,
            pad.bottom,
            rounding,
        )?;
        let out_w = spatial_output_size(
            in_w,
            self.filter_w,
            self.stride_x,
            self.dilation_x,
            pad.left,
            pad.right,
            rounding,
        )?;
        Ok((out_h, out_w))
    }
}
