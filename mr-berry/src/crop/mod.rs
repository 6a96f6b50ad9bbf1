//! 非零区域裁剪流水线.
//!
//! 流程: 阈值 ([`threshold`]) -> 掩码与孔洞填充 ([`mask`]) ->
//! 包围盒 ([`bbox`]) -> 纯索引裁剪. 不做任何重采样或插值.

use ndarray::{s, Array3, ArrayView3};

use crate::{MrData3d, MrLabel, MrScan, NiftiMeta};

pub mod bbox;
pub mod mask;
pub mod threshold;

pub use bbox::BoundingBox;
pub use threshold::{MiniBatchKMeans, Percentile, ThresholdStrategy};

/// 裁剪错误.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropError {
    /// 掩码不存在任何前景体素, 无法取包围盒.
    EmptyForeground,
}

/// 按 `bb` 对三维体积做纯索引切片, 返回 `[min, max)` 范围的副本.
///
/// 输入必须恰好是 3 维 (由 `ArrayView3` 类型保证); 4 维体积须先
/// 挤压或拆分通道维. 若包围盒越界, 则程序 panic.
pub fn crop_to_bbox<T: Clone>(data: ArrayView3<'_, T>, bb: &BoundingBox) -> Array3<T> {
    data.slice(s![
        bb.min.0..bb.max.0,
        bb.min.1..bb.max.1,
        bb.min.2..bb.max.2
    ])
    .to_owned()
}

/// 裁剪流水线的产物: 裁剪后的扫描与标注, 以及所用的包围盒.
///
/// 两个体积由同一包围盒裁出, 空间形状保证一致;
/// 各自的 header (含仿射变换) 原样继承自源文件.
#[derive(Debug, Clone)]
pub struct CroppedPair {
    /// 裁剪后的扫描.
    pub scan: MrScan,

    /// 裁剪后的标注.
    pub label: MrLabel,

    /// 裁剪所用的包围盒 (相对原体积的索引).
    pub bbox: BoundingBox,
}

/// 对 (扫描, 标注) 文件对执行完整的非零区域裁剪.
///
/// 用 `strategy` 计算前景阈值, 构建掩码并填充孔洞, 取前景包围盒,
/// 再以同一包围盒裁剪扫描与标注.
///
/// # 错误
///
/// 若掩码全为背景 (阈值之上无任何体素), 返回
/// [`CropError::EmptyForeground`].
pub fn crop_to_nonzero<S: ThresholdStrategy>(
    data: &MrData3d,
    strategy: &S,
) -> Result<CroppedPair, CropError> {
    let scan_view = data.scan.data();
    let thresh = strategy.threshold(scan_view.into_dyn());

    let nonzero = mask::nonzero_mask_filled(scan_view, thresh);
    let bb = BoundingBox::from_mask(nonzero.view(), false).ok_or(CropError::EmptyForeground)?;

    let scan = crop_to_bbox(data.scan.data(), &bb);
    let label = crop_to_bbox(data.label.data(), &bb);

    Ok(CroppedPair {
        scan: MrScan::from_parts(data.scan.header(), scan),
        label: MrLabel::from_parts(data.label.header(), label),
        bbox: bb,
    })
}
