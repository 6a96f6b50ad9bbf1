//! 运行环境识别与数据目录布局.
//!
//! 裁剪核心从不读取环境变量; 本模块负责把环境信息解析成显式的
//! [`DataLayout`], 再由调用方注入 [`mr_berry::runner::BatchRunner`].

use std::env;
use std::path::{Path, PathBuf};

use mr_berry::dataset::home_dataset_dir;
use mr_berry::runner::CropDirs;

/// 计算环境.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeEnv {
    /// 高资源计算集群 (SLURM 作业).
    Cluster,

    /// 本地开发机.
    Local,
}

impl ComputeEnv {
    /// 依据 SLURM 环境变量识别当前计算环境.
    ///
    /// `SLURM_TMPDIR` (作业内) 或 `SLURM_ACCOUNT` (作业外)
    /// 任一存在即视为集群环境.
    pub fn detect() -> Self {
        if env::var_os("SLURM_TMPDIR").is_some() || env::var_os("SLURM_ACCOUNT").is_some() {
            Self::Cluster
        } else {
            Self::Local
        }
    }

    /// 训练阶段使用的 3D patch 边长.
    ///
    /// 该参数属于下游训练流程, 裁剪核心并不消费它.
    #[inline]
    pub fn patch_size(self) -> u32 {
        match self {
            Self::Cluster => 128,
            Self::Local => 64,
        }
    }
}

/// 数据目录布局: 输入目录与四个输出目录.
#[derive(Debug, Clone)]
pub struct DataLayout {
    /// 数据根目录.
    pub data_root: PathBuf,

    /// 待裁剪扫描所在目录.
    pub img_dir: PathBuf,

    /// 待裁剪标注所在目录.
    pub label_dir: PathBuf,

    /// 裁剪输出与隔离目录.
    pub crop_dirs: CropDirs,
}

impl DataLayout {
    /// 解析给定环境下的目录布局.
    ///
    /// - 集群: 根为 `$SLURM_TMPDIR/work` (数据已由作业脚本解包到节点本地盘);
    /// - 本地: 根为 `$MRI_DATA_ROOT`, 缺省时退回 `$HOME/dataset`.
    ///
    /// 无法确定根目录时程序 panic (属于部署配置错误).
    pub fn resolve(env: ComputeEnv) -> Self {
        let data_root = match env {
            ComputeEnv::Cluster => {
                let tmp = env::var_os("SLURM_TMPDIR").expect("集群环境缺少 $SLURM_TMPDIR");
                PathBuf::from(tmp).join("work")
            }
            ComputeEnv::Local => env::var_os("MRI_DATA_ROOT")
                .map(PathBuf::from)
                .or_else(home_dataset_dir)
                .expect("无法确定数据根目录"),
        };
        Self::under(data_root)
    }

    /// 在 `data_root` 下按固定名称组装布局:
    /// 输入在 `img` / `label`, 输出在 `cropped_*` / `strange_*`.
    pub fn under(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        Self {
            img_dir: data_root.join("img"),
            label_dir: data_root.join("label"),
            crop_dirs: CropDirs::under(&data_root),
            data_root,
        }
    }

    /// 数据根目录.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.data_root
    }
}
