//! 非零掩码构建与三维孔洞填充.

use std::collections::VecDeque;

use ndarray::{Array3, ArrayView3, Zip};

use crate::Idx3d;

/// 对扫描做阈值二值化: 强度严格大于 `thresh` 的体素为前景.
///
/// 输出形状与输入完全一致.
#[inline]
pub fn nonzero_mask(scan: ArrayView3<'_, f32>, thresh: f32) -> Array3<bool> {
    scan.mapv(|v| v > thresh)
}

/// 获取 `pos` 前后上下左右六个点中不越界的坐标.
fn diamond_neighbours((z, h, w): Idx3d, shape: Idx3d) -> Vec<Idx3d> {
    [
        (z.wrapping_sub(1), h, w),
        (z.saturating_add(1), h, w),
        (z, h.wrapping_sub(1), w),
        (z, h.saturating_add(1), w),
        (z, h, w.wrapping_sub(1)),
        (z, h, w.saturating_add(1)),
    ]
    .into_iter()
    .filter(|&(z0, h0, w0)| z0 < shape.0 && h0 < shape.1 && w0 < shape.2)
    .collect()
}

/// `pos` 是否位于体积的六个表面矩形上.
#[inline]
fn on_surface((z, h, w): Idx3d, (sz, sh, sw): Idx3d) -> bool {
    z == 0 || h == 0 || w == 0 || z == sz - 1 || h == sh - 1 || w == sw - 1
}

/// 就地填充掩码的内部孔洞.
///
/// 从体积边界上的背景体素出发做 6-连通洪泛; 洪泛触及不到的背景体素
/// 即被前景完全包裹的孔洞 (脑内低强度腔隙被聚类误判的典型产物),
/// 将其回填为前景. 全前景或全背景的掩码保持不变.
pub fn fill_holes(mask: &mut Array3<bool>) {
    let shape = mask.dim();
    let mut outside = Array3::<bool>::from_elem(shape, false);
    let mut queue = VecDeque::new();

    for (pos, &fg) in mask.indexed_iter() {
        if !fg && on_surface(pos, shape) {
            outside[pos] = true;
            queue.push_back(pos);
        }
    }

    while let Some(pos) = queue.pop_front() {
        for neigh in diamond_neighbours(pos, shape) {
            if !mask[neigh] && !outside[neigh] {
                outside[neigh] = true;
                queue.push_back(neigh);
            }
        }
    }

    // 既非前景也未被外部触及 -> 内部孔洞.
    Zip::from(mask.view_mut())
        .and(&outside)
        .for_each(|fg, &out| {
            if !*fg && !out {
                *fg = true;
            }
        });
}

/// 二值化并填充孔洞, 返回最终的非零掩码.
pub fn nonzero_mask_filled(scan: ArrayView3<'_, f32>, thresh: f32) -> Array3<bool> {
    let mut mask = nonzero_mask(scan, thresh);
    fill_holes(&mut mask);
    mask
}
