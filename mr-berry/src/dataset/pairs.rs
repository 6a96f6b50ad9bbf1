//! MRI 扫描/标注文件对的发现与加载.
//!
//! 扫描与标注分别位于两个目录 (允许嵌套子目录), 以文件名主干
//! (去掉 `.nii` / `.nii.gz` 后缀) 一一配对.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::consts::{NII_EXT, NII_GZ_EXT};
use crate::MrData3d;

/// 一对 (扫描, 标注) 文件路径, 以共同的文件名主干标识.
///
/// 文件对在批处理开始时被发现, 由执行器一次性消费, 从不修改.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MriPair {
    stem: String,
    img: PathBuf,
    label: PathBuf,
}

impl MriPair {
    /// 直接从三元组组装文件对. 一致性由调用方保证.
    pub fn new(stem: impl Into<String>, img: PathBuf, label: PathBuf) -> Self {
        Self {
            stem: stem.into(),
            img,
            label,
        }
    }

    /// 文件名主干.
    #[inline]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// 扫描文件路径.
    #[inline]
    pub fn img_path(&self) -> &Path {
        &self.img
    }

    /// 标注文件路径.
    #[inline]
    pub fn label_path(&self) -> &Path {
        &self.label
    }
}

/// 求 nifti 文件的文件名主干: 去掉 `.nii` 或 `.nii.gz` 后缀.
///
/// 非 nifti 文件返回 `None`.
pub fn nifti_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(&format!(".{NII_GZ_EXT}"))
        .or_else(|| name.strip_suffix(&format!(".{NII_EXT}")))
        .map(str::to_owned)
}

/// 递归收集 `dir` 下所有 nifti 文件, 以主干为键.
///
/// 同一主干出现多次时保留字典序较早发现的那个.
fn collect_nifti(dir: &Path, ans: &mut BTreeMap<String, PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_nifti(&path, ans);
        } else if let Some(stem) = nifti_stem(&path) {
            ans.entry(stem).or_insert(path);
        }
    }
}

/// 发现 `img_dir` 与 `label_dir` 下主干相同的所有文件对, 按主干升序返回.
///
/// 只在一侧出现的文件被静默忽略 (数据集目录中常混有无标注的原始扫描).
///
/// # 注意
///
/// `img_dir` 和 `label_dir` 必须是目录, 否则程序 panic.
pub fn discover_pairs(img_dir: impl AsRef<Path>, label_dir: impl AsRef<Path>) -> Vec<MriPair> {
    let (img_dir, label_dir) = (img_dir.as_ref(), label_dir.as_ref());
    assert!(img_dir.is_dir(), "扫描目录不存在: {}", img_dir.display());
    assert!(label_dir.is_dir(), "标注目录不存在: {}", label_dir.display());

    let mut imgs = BTreeMap::new();
    collect_nifti(img_dir, &mut imgs);
    let mut labels = BTreeMap::new();
    collect_nifti(label_dir, &mut labels);

    imgs.into_iter()
        .filter_map(|(stem, img)| {
            let label = labels.get(&stem)?.clone();
            Some(MriPair { stem, img, label })
        })
        .collect()
}

/// 3D MRI 数据集 (扫描 + 标注) 加载器.
///
/// 提供迭代器风格的数据集获取模式.
#[derive(Debug)]
pub struct PairLoader {
    pairs_rev: Vec<MriPair>,
}

/// 从已发现的文件对创建数据加载器. 加载器按原顺序逐对打开文件.
pub fn pair_loader<I: IntoIterator<Item = MriPair>>(pairs: I) -> PairLoader {
    let mut pairs_rev: Vec<MriPair> = pairs.into_iter().collect();
    pairs_rev.reverse();
    PairLoader { pairs_rev }
}

impl Iterator for PairLoader {
    type Item = (MriPair, nifti::Result<MrData3d>);

    fn next(&mut self) -> Option<Self::Item> {
        let pair = self.pairs_rev.pop()?;
        let data = MrData3d::open(pair.img_path(), pair.label_path());
        Some((pair, data))
    }
}

impl ExactSizeIterator for PairLoader {
    #[inline]
    fn len(&self) -> usize {
        self.pairs_rev.len()
    }
}
