//! 🧠欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::data::{MrData3d, MrLabel, MrScan, NiftiMeta};

pub use crate::crop::{
    crop_to_bbox, crop_to_nonzero, BoundingBox, CropError, CroppedPair, MiniBatchKMeans,
    Percentile, ThresholdStrategy,
};

pub use crate::runner::{BatchRunner, CropDirs, CropOutcome, DataFlaw, RunSummary};

pub use crate::dataset::{self, discover_pairs, home_dataset_dir_with, MriPair};

pub use crate::consts::{KMEANS_BATCH, KMEANS_CLUSTERS, NII_EXT, NII_GZ_EXT};
