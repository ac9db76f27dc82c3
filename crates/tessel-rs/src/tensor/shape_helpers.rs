//! Shared shape helpers used by shape inference and backend kernels.

use super::{DataLayout, DimSymbol, Dimension, Shape, TensorInfo};

/// Returns static dimensions or maps the first dynamic dimension to caller-defined error type.
pub fn static_dims_or_error<E, F>(shape: &Shape, mut on_dynamic: F) -> Result<Vec<usize>, E>
where
    F: FnMut(&DimSymbol) -> E,
{
    let mut dims = Vec::with_capacity(shape.rank());
    for dim in shape.dims() {
        match dim {
            Dimension::Static(value) => dims.push(*value),
            Dimension::Dynamic(symbol) => return Err(on_dynamic(symbol)),
        }
    }
    Ok(dims)
}

/// Computes `product(dims)` with overflow checking.
pub fn checked_element_count_or_error<E, F>(dims: &[usize], mut on_overflow: F) -> Result<usize, E>
where
    F: FnMut() -> E,
{
    let mut count = 1usize;
    for dim in dims {
        count = count.checked_mul(*dim).ok_or_else(&mut on_overflow)?;
    }
    Ok(count)
}

/// Batch, channel and spatial extents of a rank-4 activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialDims {
    pub batch: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub layout: DataLayout,
}

impl SpatialDims {
    /// Linear element offset of `(n, c, h, w)` in this layout.
    #[inline]
    pub fn index(&self, n: usize, c: usize, h: usize, w: usize) -> usize {
        match self.layout {
            DataLayout::Nhwc => ((n * self.height + h) * self.width + w) * self.channels + c,
            DataLayout::Nchw => ((n * self.channels + c) * self.height + h) * self.width + w,
        }
    }

    pub fn element_count(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    /// Rebuilds a static shape with the given spatial and channel extents in this layout.
    pub fn to_shape(&self) -> Shape {
        match self.layout {
            DataLayout::Nhwc => {
                Shape::from_static(&[self.batch, self.height, self.width, self.channels])
            }
            DataLayout::Nchw => {
                Shape::from_static(&[self.batch, self.channels, self.height, self.width])
            }
        }
    }
}

/// Splits a rank-4 descriptor into [`SpatialDims`] using its data layout.
pub fn spatial_dims_or_error<E, F>(info: &TensorInfo, mut on_error: F) -> Result<SpatialDims, E>
where
    F: FnMut(String) -> E,
{
    let dims = static_dims_or_error(info.shape(), |symbol| {
        on_error(format!("dimension ?{} is not static", symbol.as_str()))
    })?;
    if dims.len() != 4 {
        return Err(on_error(format!(
            "expected a rank-4 tensor, got rank {} ({})",
            dims.len(),
            info.shape()
        )));
    }
    let layout = info.layout();
    Ok(SpatialDims {
        batch: dims[0],
        channels: dims[layout.channels_index()],
        height: dims[layout.height_index()],
        width: dims[layout.width_index()],
        layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::DType;

    #[test]
    fn dynamic_dimension_maps_to_caller_error() {
        let shape = Shape::new(vec![
            Dimension::Static(2),
            Dimension::Dynamic(DimSymbol::new("seq")),
        ]);
        let err = static_dims_or_error(&shape, |symbol| symbol.as_str().to_string()).unwrap_err();
        assert_eq!(err, "seq");
    }

    #[test]
    fn element_count_reports_overflow() {
        assert_eq!(checked_element_count_or_error(&[2, 3, 4], || "overflow"), Ok(24));
        assert_eq!(
            checked_element_count_or_error(&[usize::MAX, 2], || "overflow"),
            Err("overflow")
        );
    }

    #[test]
    fn spatial_dims_follow_layout() {
        let nhwc = TensorInfo::new([1, 4, 5, 3], DType::Float32).unwrap();
        let dims = spatial_dims_or_error(&nhwc, |reason| reason).unwrap();
        assert_eq!((dims.height, dims.width, dims.channels), (4, 5, 3));
        assert_eq!(dims.index(0, 2, 1, 0), 17);
        assert_eq!(dims.to_shape(), Shape::from_static(&[1, 4, 5, 3]));

        let nchw = nhwc.with_layout(DataLayout::Nchw);
        let dims = spatial_dims_or_error(&nchw, |reason| reason).unwrap();
        assert_eq!((dims.channels, dims.height, dims.width), (4, 5, 3));
        assert_eq!(dims.index(0, 1, 2, 1), 22);
    }

    #[test]
    fn non_rank4_is_rejected() {
        let info = TensorInfo::new([4, 4], DType::Float32).unwrap();
        assert!(spatial_dims_or_error(&info, |reason| reason).is_err());
    }
}
