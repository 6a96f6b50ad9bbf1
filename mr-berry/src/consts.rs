//! 通用常量.

/// k-means 聚类的簇个数. 最低簇视作背景/空气.
pub const KMEANS_CLUSTERS: usize = 4;

/// mini-batch k-means 每轮随机采样的观测个数.
///
/// 批越大, 训练越昂贵, 但也越不容易因采样方差触发簇重分配.
pub const KMEANS_BATCH: usize = 1000;

/// mini-batch k-means 的迭代轮数上限.
pub const KMEANS_MAX_ITER: usize = 100;

/// 确定性后备阈值所用的百分位数.
pub const FOREGROUND_PERCENTILE: f64 = 70.0;

/// 未压缩 nifti 文件后缀.
pub const NII_EXT: &str = "nii";

/// gzip 压缩 nifti 文件后缀.
pub const NII_GZ_EXT: &str = "nii.gz";
