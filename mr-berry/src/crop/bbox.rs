//! 前景包围盒提取.

use ndarray::ArrayView3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Idx3d;

/// 轴对齐三维包围盒.
///
/// `min` 为闭下界, `max` 为开上界 (Rust 区间惯例), 且构造保证
/// 每个轴上 `min < max`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBox {
    /// 各轴下界 (含).
    pub min: Idx3d,

    /// 各轴上界 (不含).
    pub max: Idx3d,
}

impl BoundingBox {
    /// 求包住掩码中所有 "非 `outside`" 体素的最小包围盒.
    ///
    /// 若掩码全部等于 `outside` (不存在任何前景体素), 返回 `None`;
    /// 调用方必须显式处理该情形, 而不是继续裁剪.
    pub fn from_mask(mask: ArrayView3<'_, bool>, outside: bool) -> Option<Self> {
        let mut min = (usize::MAX, usize::MAX, usize::MAX);
        let mut max = (0usize, 0usize, 0usize);
        let mut found = false;

        for ((z, h, w), &v) in mask.indexed_iter() {
            if v == outside {
                continue;
            }
            found = true;
            min = (min.0.min(z), min.1.min(h), min.2.min(w));
            max = (max.0.max(z), max.1.max(h), max.2.max(w));
        }

        found.then(|| Self {
            min,
            max: (max.0 + 1, max.1 + 1, max.2 + 1),
        })
    }

    /// 覆盖整个 `shape` 体积的包围盒.
    ///
    /// `shape` 的每个分量必须非零, 否则程序 panic.
    pub fn full(shape: Idx3d) -> Self {
        assert!(shape.0 > 0 && shape.1 > 0 && shape.2 > 0, "形状分量必须非零");
        Self {
            min: (0, 0, 0),
            max: shape,
        }
    }

    /// 包围盒自身的形状 (各轴长度).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (
            self.max.0 - self.min.0,
            self.max.1 - self.min.1,
            self.max.2 - self.min.2,
        )
    }

    /// 该包围盒是否恰好覆盖整个 `shape` 体积.
    #[inline]
    pub fn covers(&self, shape: Idx3d) -> bool {
        self.min == (0, 0, 0) && self.max == shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_bbox_of_centered_cube() {
        let mut mask = Array3::from_elem((10, 10, 10), false);
        for z in 3..7 {
            for h in 3..7 {
                for w in 3..7 {
                    mask[(z, h, w)] = true;
                }
            }
        }

        let bb = BoundingBox::from_mask(mask.view(), false).unwrap();
        assert_eq!(bb.min, (3, 3, 3));
        assert_eq!(bb.max, (7, 7, 7));
        assert_eq!(bb.shape(), (4, 4, 4));
        assert!(!bb.covers((10, 10, 10)));
    }

    #[test]
    fn test_bbox_empty_mask_is_none() {
        let mask = Array3::from_elem((5, 5, 5), false);
        assert_eq!(BoundingBox::from_mask(mask.view(), false), None);
    }

    #[test]
    fn test_bbox_full_mask_covers_volume() {
        let mask = Array3::from_elem((4, 5, 6), true);
        let bb = BoundingBox::from_mask(mask.view(), false).unwrap();
        assert_eq!(bb, BoundingBox::full((4, 5, 6)));
        assert!(bb.covers((4, 5, 6)));
    }

    #[test]
    fn test_bbox_single_voxel() {
        let mut mask = Array3::from_elem((5, 5, 5), false);
        mask[(2, 3, 4)] = true;

        let bb = BoundingBox::from_mask(mask.view(), false).unwrap();
        assert_eq!(bb.min, (2, 3, 4));
        assert_eq!(bb.max, (3, 4, 5));
        assert_eq!(bb.shape(), (1, 1, 1));
    }

    #[test]
    fn test_bbox_inverted_outside_marker() {
        // outside = true 时, 包围盒包住所有 false 体素.
        let mut mask = Array3::from_elem((5, 5, 5), true);
        mask[(1, 1, 1)] = false;
        mask[(3, 2, 1)] = false;

        let bb = BoundingBox::from_mask(mask.view(), true).unwrap();
        assert_eq!(bb.min, (1, 1, 1));
        assert_eq!(bb.max, (4, 3, 2));
    }
}
