//! 前景阈值算法.
//!
//! 默认采用 1 维 mini-batch k-means (k = 4): 把体素强度聚成 4 簇,
//! 最低簇视作背景/空气, 其上确界即前景/背景分离阈值.
//! 由于每轮只随机采样一小批观测, 同一输入多次运行的阈值数值接近
//! 但不保证逐位一致; 需要可复现结果时换用 [`Percentile`].

use itertools::Itertools;
use ndarray::ArrayViewD;
use num::Float;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::consts::{FOREGROUND_PERCENTILE, KMEANS_BATCH, KMEANS_CLUSTERS, KMEANS_MAX_ITER};

/// 从体素强度分布中计算单个前景/背景分离阈值的策略.
///
/// 输入必须是 3 维或 4 维体积, 否则视为调用方的编程错误, 程序 panic.
pub trait ThresholdStrategy {
    /// 计算阈值. 严格大于该值的体素被视为前景.
    fn threshold(&self, volume: ArrayViewD<'_, f32>) -> f32;
}

/// 校验体积维数并将其展平成 1 维强度序列.
fn flatten_checked(volume: ArrayViewD<'_, f32>) -> Vec<f32> {
    assert!(
        volume.ndim() == 3 || volume.ndim() == 4,
        "体积必须是 3 维或 4 维, 实际为 {} 维",
        volume.ndim()
    );
    assert_ne!(volume.len(), 0, "体积不能为空");
    volume.iter().copied().collect()
}

/// 1 维 mini-batch k-means 阈值策略.
#[derive(Debug, Clone)]
pub struct MiniBatchKMeans {
    clusters: usize,
    batch_size: usize,
    max_iter: usize,
    seed: Option<u64>,
}

impl Default for MiniBatchKMeans {
    #[inline]
    fn default() -> Self {
        Self {
            clusters: KMEANS_CLUSTERS,
            batch_size: KMEANS_BATCH,
            max_iter: KMEANS_MAX_ITER,
            seed: None,
        }
    }
}

impl MiniBatchKMeans {
    /// 以默认参数 (k = 4, batch 1000) 创建策略. 采样不指定种子.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 以固定随机种子创建策略, 用于可复现的实验与测试.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        }
    }

    /// 返回训练后的 `self.clusters` 个簇心, 升序排列.
    ///
    /// 簇心初始化取随机样本的等分位点, 避免全部落入占绝对多数的背景强度.
    fn fit(&self, flat: &[f32], rng: &mut StdRng) -> Vec<f32> {
        let k = self.clusters;
        let init_pool = (self.batch_size.max(k)).min(flat.len());
        let mut sample: Vec<f32> = (0..init_pool)
            .map(|_| flat[rng.gen_range(0..flat.len())])
            .collect();
        sample.sort_by_key(|v| OrderedFloat(*v));

        let mut centers: Vec<f32> = (0..k)
            .map(|i| sample[(2 * i + 1) * (init_pool - 1) / (2 * k)])
            .collect();
        let mut counts = vec![0u64; k];

        for _ in 0..self.max_iter {
            for _ in 0..self.batch_size {
                let x = flat[rng.gen_range(0..flat.len())];
                let c = nearest(&centers, x);
                counts[c] += 1;

                // 每簇学习率随其累计观测数衰减 (Sculley 的 mini-batch 更新).
                let eta = 1.0 / counts[c] as f32;
                centers[c] += eta * (x - centers[c]);
            }
        }
        centers.sort_by(f32::total_cmp);
        centers
    }
}

/// `x` 最近簇心的下标.
#[inline]
fn nearest(centers: &[f32], x: f32) -> usize {
    centers
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| OrderedFloat((x - **c).abs()))
        .map(|(i, _)| i)
        .unwrap()
}

impl ThresholdStrategy for MiniBatchKMeans {
    fn threshold(&self, volume: ArrayViewD<'_, f32>) -> f32 {
        let flat = flatten_checked(volume);
        let mut rng = self.rng();
        let centers = self.fit(&flat, &mut rng);

        // 全量指派一遍, 求每个簇的最大强度.
        let mut maxima = vec![f32::NEG_INFINITY; centers.len()];
        for &x in &flat {
            let c = nearest(&centers, x);
            maxima[c] = maxima[c].max(x);
        }

        // 空簇不参与; 升序后取最小值, 即最低簇的上确界.
        maxima
            .into_iter()
            .filter(|m| m.is_finite())
            .sorted_by(f32::total_cmp)
            .next()
            .expect("至少存在一个非空簇")
    }
}

/// 确定性的百分位阈值策略, 作为 k-means 的后备方案.
///
/// 效果与 k-means 接近, 但 k-means 在部分图像上明显更好;
/// 该策略的价值在于结果完全可复现.
#[derive(Debug, Clone, Copy)]
pub struct Percentile {
    q: f64,
}

impl Default for Percentile {
    #[inline]
    fn default() -> Self {
        Self {
            q: FOREGROUND_PERCENTILE,
        }
    }
}

impl Percentile {
    /// 以第 `q` 百分位 (`0 <= q <= 100`) 创建策略.
    pub fn new(q: f64) -> Self {
        assert!((0.0..=100.0).contains(&q), "百分位数必须在 [0, 100] 内");
        Self { q }
    }
}

/// 对 `sorted` (升序) 求第 `q` 百分位, 相邻样本间线性插值.
fn percentile_of_sorted<T: Float>(sorted: &[T], q: f64) -> T {
    debug_assert!(!sorted.is_empty());
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = T::from(rank - lo as f64).unwrap();
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

impl ThresholdStrategy for Percentile {
    fn threshold(&self, volume: ArrayViewD<'_, f32>) -> f32 {
        let mut flat = flatten_checked(volume);
        flat.sort_by(f32::total_cmp);
        percentile_of_sorted(&flat, self.q)
    }
}
