#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 ADNI 格式脑部 MRI 扫描 (及其分割标注) 文件的结构化信息和非零区域裁剪算法.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 该 crate 目前主要负责处理 ADNI 数据, 没有对其它源的数据进行直接适配
//!   (但如果新数据按照 "扫描目录 + 同名标注目录" 的模式进行组织, 也可以工作).
//! 2. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误. As what Rust promises.
//!
//! # 功能总览
//!
//! ### 基于 1 维 mini-batch k-means 的前景阈值 ✅
//!
//! 把体素强度聚成 4 簇, 取最低簇的上确界作为前景/背景分离阈值.
//! 另提供确定性的百分位阈值作为可复现实验的后备方案.
//!
//! 实现位于 `mr-berry/src/crop/threshold.rs`.
//!
//! ### 非零掩码构建与三维孔洞填充 ✅
//!
//! 阈值二值化后, 从体积边界对背景做 6-连通洪泛, 将完全被前景包裹的
//! 内部背景体素回填为前景, 以消除脑脊液等低强度腔隙造成的空洞.
//!
//! 实现位于 `mr-berry/src/crop/mask.rs`.
//!
//! ### 包围盒提取与纯索引裁剪 ✅
//!
//! 计算掩码前景的最小轴对齐包围盒 (上界为开区间),
//! 并以同一包围盒对扫描与标注做纯索引切片, 不做任何重采样.
//!
//! 实现位于 `mr-berry/src/crop/bbox.rs` 与 `mr-berry/src/crop`.
//!
//! ### 批量裁剪执行器 ✅
//!
//! 以文件对为粒度执行 "加载 -> 校验 -> 裁剪 -> 保存" 状态机,
//! 读取失败跳过, 数据缺陷移入隔离目录, 任何单对失败都不会中断整体批次.
//!
//! 实现位于 `mr-berry/src/runner.rs`.
//!
//! ### 数据集文件对发现 ✅
//!
//! 按文件名主干 (去掉 `.nii` / `.nii.gz` 后缀) 在扫描目录与标注目录之间配对,
//! 并提供迭代器风格的加载器.
//!
//! 实现位于 `mr-berry/src/dataset`.

/// 三维索引, 同时也可一定程度上用作非负整数向量.
///
/// 轴序约定为 `(z, H, W)`, 与 [`MrScan`] 的数据布局一致.
pub type Idx3d = (usize, usize, usize);

/// 3D MRI nii 文件基础数据结构.
mod data;

pub use data::{MrData3d, MrLabel, MrScan, NiftiMeta};

pub mod consts;

pub mod crop;

pub mod dataset;

pub mod runner;

pub mod prelude;
