//! 批量裁剪执行器.
//!
//! 以 (扫描, 标注) 文件对为粒度执行 "加载 -> 校验 -> 裁剪 -> 保存"
//! 状态机. 每个文件对独立运行到终态 ([`CropOutcome`]), 任何单对的
//! 失败都不会中断整体批次:
//!
//! - 底层读取失败 (瞬时): 跳过该对, 不移动任何文件;
//! - 数据缺陷 (NaN/无穷体素, 或前景为空): 把原始扫描与标注一并移入
//!   隔离目录, 留待人工检查;
//! - 维数等契约违背: 编程错误, 该任务直接 panic.
//!
//! 执行器自身不读取任何环境变量; 目录布局由调用方以 [`CropDirs`]
//! 显式注入, 便于用临时目录做隔离测试.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::consts::{NII_EXT, NII_GZ_EXT};
use crate::crop::{self, CropError, MiniBatchKMeans, ThresholdStrategy};
use crate::dataset::MriPair;
use crate::MrData3d;

/// 批处理的四个固定输出目录.
///
/// 该结构完全透明, 用户可以直接组装各字段.
#[derive(Debug, Clone)]
pub struct CropDirs {
    /// 裁剪后扫描的输出目录 (未压缩 `.nii`).
    pub cropped_img: PathBuf,

    /// 裁剪后标注的输出目录 (压缩 `.nii.gz`).
    pub cropped_label: PathBuf,

    /// 数据缺陷扫描的隔离目录.
    pub strange_img: PathBuf,

    /// 数据缺陷标注的隔离目录.
    pub strange_label: PathBuf,
}

impl CropDirs {
    /// 在 `root` 下按默认名称组装四个目录.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            cropped_img: root.join("cropped_img"),
            cropped_label: root.join("cropped_label"),
            strange_img: root.join("strange_img"),
            strange_label: root.join("strange_label"),
        }
    }

    /// 创建全部四个目录 (连同缺失的父目录).
    ///
    /// 必须在任何处理 (尤其是 worker 池启动) 之前完成,
    /// 以免目录创建在池内竞争.
    pub fn ensure(&self) -> io::Result<()> {
        for dir in [
            &self.cropped_img,
            &self.cropped_label,
            &self.strange_img,
            &self.strange_label,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// 将 `src` 移动到目录 `dst_dir` 下, 保持原文件名. 返回目标路径.
///
/// 优先使用原子重命名; 跨文件系统时退化为复制 + 删除.
/// 若 `src` 已不存在而目标已存在, 视为此前已移动完成, 直接返回成功
/// (重复调用幂等).
pub fn relocate(src: &Path, dst_dir: &Path) -> io::Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "源路径没有文件名"))?;
    let dst = dst_dir.join(name);

    if !src.exists() && dst.exists() {
        return Ok(dst);
    }
    match fs::rename(src, &dst) {
        Ok(()) => Ok(dst),
        Err(_) => {
            fs::copy(src, &dst)?;
            fs::remove_file(src)?;
            Ok(dst)
        }
    }
}

/// 隔离原因.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFlaw {
    /// 扫描包含 NaN 或无穷体素.
    NonFinite,

    /// 掩码不存在任何前景体素.
    EmptyForeground,
}

/// 单个文件对的终态.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutcome {
    /// 裁剪成功, 扫描与标注均已写入输出目录.
    Saved,

    /// 读取或写入瞬时失败, 该对被跳过, 不移动任何文件.
    Skipped,

    /// 数据本身存在缺陷, 原始文件对已被移入隔离目录.
    Quarantined(DataFlaw),
}

/// 一次批处理的汇总计数.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// 成功保存的文件对个数.
    pub saved: usize,

    /// 跳过的文件对个数.
    pub skipped: usize,

    /// 被隔离的文件对个数.
    pub quarantined: usize,
}

impl RunSummary {
    /// 处理过的文件对总数.
    #[inline]
    pub fn total(&self) -> usize {
        self.saved + self.skipped + self.quarantined
    }
}

impl FromIterator<CropOutcome> for RunSummary {
    fn from_iter<T: IntoIterator<Item = CropOutcome>>(iter: T) -> Self {
        let mut ans = Self::default();
        for outcome in iter {
            match outcome {
                CropOutcome::Saved => ans.saved += 1,
                CropOutcome::Skipped => ans.skipped += 1,
                CropOutcome::Quarantined(_) => ans.quarantined += 1,
            }
        }
        ans
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} saved, {} skipped, {} quarantined ({} total)",
            self.saved,
            self.skipped,
            self.quarantined,
            self.total()
        )
    }
}

/// 控制台时间戳.
#[inline]
fn now() -> impl fmt::Display {
    Local::now().format("%a %b %e %H:%M:%S %Y")
}

/// 批量裁剪执行器.
///
/// 对每个文件对的处理互相独立, 不共享可变状态; `&self` 可以被多个
/// worker 线程同时使用 (策略须为 `Sync`), 完成顺序没有保证.
#[derive(Debug)]
pub struct BatchRunner<S = MiniBatchKMeans> {
    dirs: CropDirs,
    strategy: S,
}

impl BatchRunner<MiniBatchKMeans> {
    /// 以默认的 mini-batch k-means 阈值策略创建执行器.
    ///
    /// 四个输出目录在此处 (任何处理之前) 一次性创建.
    pub fn new(dirs: CropDirs) -> io::Result<Self> {
        Self::with_strategy(dirs, MiniBatchKMeans::new())
    }
}

impl<S: ThresholdStrategy> BatchRunner<S> {
    /// 以指定阈值策略创建执行器. 语义同 [`BatchRunner::new`].
    pub fn with_strategy(dirs: CropDirs, strategy: S) -> io::Result<Self> {
        dirs.ensure()?;
        Ok(Self { dirs, strategy })
    }

    /// 输出目录布局.
    #[inline]
    pub fn dirs(&self) -> &CropDirs {
        &self.dirs
    }

    /// 处理单个文件对, 运行至终态并返回.
    pub fn process(&self, pair: &MriPair) -> CropOutcome {
        println!("{}: Start processing {} ...", now(), pair.stem());

        let data = match MrData3d::open(pair.img_path(), pair.label_path()) {
            Ok(data) => data,
            Err(err) => {
                println!("{}: Read error on {}, skip file: {err}", now(), pair.stem());
                return CropOutcome::Skipped;
            }
        };

        #[cfg(feature = "rayon")]
        let finite = data.scan.par_is_finite();
        #[cfg(not(feature = "rayon"))]
        let finite = data.scan.is_finite();

        if !finite {
            println!(
                "{}: NaN or infinite data in {}, move pair to strange folders",
                now(),
                pair.stem()
            );
            self.quarantine(pair);
            return CropOutcome::Quarantined(DataFlaw::NonFinite);
        }

        match crop::crop_to_nonzero(&data, &self.strategy) {
            Ok(cropped) => {
                let img_out = self
                    .dirs
                    .cropped_img
                    .join(format!("{}.{NII_EXT}", pair.stem()));
                let label_out = self
                    .dirs
                    .cropped_label
                    .join(format!("{}.{NII_GZ_EXT}", pair.stem()));

                if let Err(err) = cropped
                    .scan
                    .save(&img_out)
                    .and_then(|()| cropped.label.save(&label_out))
                {
                    println!("{}: Save error on {}, skip file: {err}", now(), pair.stem());
                    return CropOutcome::Skipped;
                }
                println!("{}: Successfully save file {}!", now(), pair.stem());
                CropOutcome::Saved
            }
            Err(CropError::EmptyForeground) => {
                println!(
                    "{}: Empty foreground in {}, move pair to strange folders",
                    now(),
                    pair.stem()
                );
                self.quarantine(pair);
                CropOutcome::Quarantined(DataFlaw::EmptyForeground)
            }
        }
    }

    /// 顺序处理所有文件对并汇总终态.
    ///
    /// 并行场景下请直接在 worker 池内对每个文件对调用
    /// [`BatchRunner::process`], 再以 [`RunSummary`] 聚合.
    pub fn run<'a, I: IntoIterator<Item = &'a MriPair>>(&self, pairs: I) -> RunSummary {
        pairs.into_iter().map(|pair| self.process(pair)).collect()
    }

    /// 把文件对的扫描与标注分别移入两个隔离目录.
    ///
    /// 移动失败只打印警告, 不再改变该对的终态; 残留文件留待人工处理.
    fn quarantine(&self, pair: &MriPair) {
        for (src, dst_dir) in [
            (pair.img_path(), &self.dirs.strange_img),
            (pair.label_path(), &self.dirs.strange_label),
        ] {
            if let Err(err) = relocate(src, dst_dir) {
                println!(
                    "{}: Failed to move {} to {}: {err}",
                    now(),
                    src.display(),
                    dst_dir.display()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::Percentile;
    use crate::{MrLabel, MrScan};
    use ndarray::Array3;

    /// (10, 10, 10) 体积, 中心放一个强度 100 的立方体, 背景为 0.
    fn cube_volume() -> Array3<f32> {
        let mut data = Array3::zeros((10, 10, 10));
        for z in 3..7 {
            for h in 3..7 {
                for w in 3..7 {
                    data[(z, h, w)] = 100.0;
                }
            }
        }
        data
    }

    /// 在 `dir` 下写一对 (扫描, 标注) 输入文件并返回文件对.
    fn write_pair(dir: &Path, stem: &str, scan: Array3<f32>) -> MriPair {
        let img = dir.join(format!("{stem}.nii"));
        let label = dir.join(format!("{stem}.nii.gz"));
        MrScan::fake(scan).save(&img).unwrap();
        MrLabel::fake(Array3::zeros((10, 10, 10))).save(&label).unwrap();
        MriPair::new(stem, img, label)
    }

    fn test_runner(root: &Path) -> BatchRunner<Percentile> {
        BatchRunner::with_strategy(CropDirs::under(root), Percentile::default()).unwrap()
    }

    #[test]
    fn test_dirs_created_before_processing() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path());
        assert!(runner.dirs().cropped_img.is_dir());
        assert!(runner.dirs().cropped_label.is_dir());
        assert!(runner.dirs().strange_img.is_dir());
        assert!(runner.dirs().strange_label.is_dir());
    }

    #[test]
    fn test_saved_pair_lands_in_output_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path());
        let pair = write_pair(dir.path(), "subj_01", cube_volume());

        assert_eq!(runner.process(&pair), CropOutcome::Saved);
        assert!(runner.dirs().cropped_img.join("subj_01.nii").is_file());
        assert!(runner.dirs().cropped_label.join("subj_01.nii.gz").is_file());
        // 输入文件原地不动.
        assert!(pair.img_path().is_file());
        assert!(pair.label_path().is_file());
    }

    #[test]
    fn test_nan_pair_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path());

        let mut scan = cube_volume();
        scan[(5, 5, 5)] = f32::NAN;
        let pair = write_pair(dir.path(), "subj_nan", scan);

        let outcome = runner.process(&pair);
        assert_eq!(outcome, CropOutcome::Quarantined(DataFlaw::NonFinite));

        // 原始文件被物理移动 (而非复制) 到隔离目录.
        assert!(!pair.img_path().exists());
        assert!(!pair.label_path().exists());
        assert!(runner.dirs().strange_img.join("subj_nan.nii").is_file());
        assert!(runner.dirs().strange_label.join("subj_nan.nii.gz").is_file());

        // 没有任何裁剪输出.
        assert!(!runner.dirs().cropped_img.join("subj_nan.nii").exists());
        assert!(!runner.dirs().cropped_label.join("subj_nan.nii.gz").exists());
    }

    #[test]
    fn test_empty_foreground_is_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path());
        let pair = write_pair(dir.path(), "subj_flat", Array3::zeros((10, 10, 10)));

        let outcome = runner.process(&pair);
        assert_eq!(outcome, CropOutcome::Quarantined(DataFlaw::EmptyForeground));
        assert!(runner.dirs().strange_img.join("subj_flat.nii").is_file());
    }

    #[test]
    fn test_unreadable_pair_is_skipped_and_batch_continues() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path());

        // 一对损坏文件 + 一对正常文件.
        let bad_img = dir.path().join("subj_bad.nii");
        let bad_label = dir.path().join("subj_bad.nii.gz");
        fs::write(&bad_img, b"not a nifti file").unwrap();
        fs::write(&bad_label, b"not a nifti file").unwrap();
        let bad = MriPair::new("subj_bad", bad_img.clone(), bad_label.clone());
        let good = write_pair(dir.path(), "subj_good", cube_volume());

        let summary = runner.run([&bad, &good]);
        assert_eq!(
            summary,
            RunSummary {
                saved: 1,
                skipped: 1,
                quarantined: 0
            }
        );
        assert_eq!(summary.total(), 2);

        // 跳过的文件原地不动, 也不进隔离目录.
        assert!(bad_img.is_file());
        assert!(bad_label.is_file());
        assert!(!runner.dirs().strange_img.join("subj_bad.nii").exists());

        // 成功的那对产出了恰好一组输出.
        assert!(runner.dirs().cropped_img.join("subj_good.nii").is_file());
        assert!(runner.dirs().cropped_label.join("subj_good.nii.gz").is_file());
    }

    #[test]
    fn test_cropped_output_shape() {
        let dir = tempfile::tempdir().unwrap();
        let runner = test_runner(dir.path());
        let pair = write_pair(dir.path(), "subj_01", cube_volume());
        runner.process(&pair);

        let cropped = MrScan::open(runner.dirs().cropped_img.join("subj_01.nii")).unwrap();
        assert_eq!(crate::NiftiMeta::shape(&cropped), (4, 4, 4));
    }

    #[test]
    fn test_parallel_processing_with_worker_pool() {
        use std::sync::mpsc::channel;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(test_runner(dir.path()));

        // 三对输入: 正常 / 含 NaN / 损坏.
        let good = write_pair(dir.path(), "p_good", cube_volume());
        let mut nan_scan = cube_volume();
        nan_scan[(0, 0, 0)] = f32::NAN;
        let nan = write_pair(dir.path(), "p_nan", nan_scan);
        let bad_img = dir.path().join("p_bad.nii");
        let bad_label = dir.path().join("p_bad.nii.gz");
        fs::write(&bad_img, b"garbage").unwrap();
        fs::write(&bad_label, b"garbage").unwrap();
        let bad = MriPair::new("p_bad", bad_img, bad_label);

        let pool = threadpool::ThreadPool::new(num_cpus::get().max(2));
        let (tx, rx) = channel();
        for pair in [good, nan, bad] {
            let runner = Arc::clone(&runner);
            let tx = tx.clone();
            pool.execute(move || {
                tx.send(runner.process(&pair)).unwrap();
            });
        }
        drop(tx);

        let summary: RunSummary = rx.iter().collect();
        assert_eq!(
            summary,
            RunSummary {
                saved: 1,
                skipped: 1,
                quarantined: 1
            }
        );
        assert!(runner.dirs().cropped_img.join("p_good.nii").is_file());
        assert!(runner.dirs().strange_img.join("p_nan.nii").is_file());
    }

    #[test]
    fn test_relocate_moves_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.nii");
        let dst_dir = dir.path().join("strange");
        fs::create_dir(&dst_dir).unwrap();
        fs::write(&src, b"payload").unwrap();

        let dst = relocate(&src, &dst_dir).unwrap();
        assert_eq!(dst, dst_dir.join("a.nii"));
        assert!(!src.exists());
        assert!(dst.is_file());

        // 再次调用: 源已消失, 目标已存在, 仍视为成功.
        let again = relocate(&src, &dst_dir).unwrap();
        assert_eq!(again, dst);
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }

    #[test]
    fn test_summary_from_outcomes() {
        let summary: RunSummary = [
            CropOutcome::Saved,
            CropOutcome::Skipped,
            CropOutcome::Quarantined(DataFlaw::NonFinite),
            CropOutcome::Saved,
            CropOutcome::Quarantined(DataFlaw::EmptyForeground),
        ]
        .into_iter()
        .collect();

        assert_eq!(summary.saved, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.quarantined, 2);
        assert_eq!(summary.to_string(), "2 saved, 1 skipped, 2 quarantined (5 total)");
    }
}
