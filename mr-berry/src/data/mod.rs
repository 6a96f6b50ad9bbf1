use std::path::Path;

use flate2::Compression;
use ndarray::{Array3, ArrayD, ArrayView, ArrayViewMut, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::Idx3d;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 去掉末尾的单例 (大小为 1 的) 维度, 直到数据不超过 3 维.
///
/// ADNI 数据中的标注文件常以 4 维形式存储, 其第 4 维是大小为 1
/// 的通道维. 若末尾维度大小不为 1, 说明这是真正的多通道体积,
/// 本库的单通道路径无法处理, 程序 panic.
fn squeeze_trailing<T>(mut data: ArrayD<T>) -> ArrayD<T> {
    while data.ndim() > 3 {
        let last = data.ndim() - 1;
        assert_eq!(
            data.shape()[last],
            1,
            "第 {} 维大小为 {}, 多通道体积请先在外部拆分",
            last,
            data.shape()[last]
        );
        data = data.index_axis_move(Axis(last), 0);
    }
    data
}

/// 将 (W, H, z) 格式的动态维度数组转换成 (z, H, W) 的三维数组.
/// 以后均按照该模式访问.
fn to_zhw<T: Clone>(data: ArrayD<T>) -> Array3<T> {
    assert_eq!(data.ndim(), 3, "体积数据必须是 3 维, 实际为 {} 维", data.ndim());

    // [W, H, z] -> [z, H, W].
    // hint: 原第一维向下增长, 原第二维向右增长.
    let data = data.permuted_axes([2, 1, 0].as_slice());
    let shape = (data.shape()[0], data.shape()[1], data.shape()[2]);

    // The nature of nifti data field layout.
    debug_assert!(data.is_standard_layout());

    // 该操作不会生成 `Err`, 可直接 unwrap.
    Array3::<T>::from_shape_vec(shape, data.into_raw_vec()).unwrap()
}

/// 3D MRI nii 文件 header 的共用属性和部分通用操作.
///
/// header 仅携带仿射变换与体素分辨率等元信息;
/// 形状信息以数据本身为准 (裁剪后 header 不再反映真实维数).
pub trait NiftiMeta {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    fn shape(&self) -> Idx3d;

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.pix_dim();
        z == h && z == w
    }
}

/// nii 格式 3D MRI 扫描, 包括 header 和体素强度. 强度值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct MrScan {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiMeta for MrScan {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl MrScan {
    /// 打开 nii 文件格式的 3D MRI 扫描. `path` 为 nii (或 nii.gz) 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    ///
    /// 末尾的单例通道维会被挤压掉; 真正的多通道文件会使程序 panic.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        let data = squeeze_trailing(obj.into_volume().into_ndarray::<f32>()?);
        Ok(Self {
            header,
            data: to_zhw(data),
        })
    }

    /// 由给定的 header 和 (z, H, W) 格式数据直接组装实体.
    ///
    /// header 的维数字段无需与数据一致 (保存时会按数据重建),
    /// 但仿射变换等元信息会原样保留.
    pub fn from_parts(header: &NiftiHeader, data: Array3<f32>) -> Self {
        Self {
            header: Box::new(header.clone()),
            data,
        }
    }

    /// 根据裸数据直接创建 `MrScan` 实体. header 使用默认值
    /// (单位体素分辨率, 无仿射信息).
    ///
    /// # 注意
    ///
    /// 该方法创建的实体不携带真实元信息, 你应仅将其用于实验目的.
    pub fn fake(data: Array3<f32>) -> Self {
        Self {
            header: Box::<NiftiHeader>::default(),
            data,
        }
    }

    /// 判断所有体素强度是否均为有限值 (非 NaN 且非无穷).
    ///
    /// 进入裁剪流水线的扫描必须满足该性质, 否则将被整对隔离.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// 将扫描保存到 `path`. 文件按 nifti 惯用标准以 (W, H, z)
    /// 轴序写出; 当路径以 `.gz` 结尾时自动使用 gzip 压缩.
    ///
    /// 源文件的 header (含仿射变换) 被用作参考, 原样写入输出.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // (z, H, W) -> (W, H, z).
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&data)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }
}

/// nii 格式 3D MRI 分割标注, 包括 header 和真值标签. 标签值以 `u8` 保存.
#[derive(Debug, Clone)]
pub struct MrLabel {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl NiftiMeta for MrLabel {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl MrLabel {
    /// 打开 nii 文件格式的 3D MRI 标注. `path` 为 nii (或 nii.gz) 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    ///
    /// 末尾的单例通道维会被挤压掉; 真正的多通道文件会使程序 panic.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        let data = squeeze_trailing(obj.into_volume().into_ndarray::<u8>()?);
        Ok(Self {
            header,
            data: to_zhw(data),
        })
    }

    /// 由给定的 header 和 (z, H, W) 格式数据直接组装实体.
    /// 语义同 [`MrScan::from_parts`].
    pub fn from_parts(header: &NiftiHeader, data: Array3<u8>) -> Self {
        Self {
            header: Box::new(header.clone()),
            data,
        }
    }

    /// 根据裸标签数据直接创建 `MrLabel` 实体. header 使用默认值.
    ///
    /// # 注意
    ///
    /// 该方法创建的实体不携带真实元信息, 你应仅将其用于实验目的.
    pub fn fake(data: Array3<u8>) -> Self {
        Self {
            header: Box::<NiftiHeader>::default(),
            data,
        }
    }

    /// 将标注保存到 `path`. 当路径以 `.gz` 结尾时自动使用 gzip 压缩
    /// (标签取值基数很低, 压缩收益大).
    ///
    /// 源文件的 header (含仿射变换) 被用作参考, 原样写入输出.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // (z, H, W) -> (W, H, z).
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .compression_level(Compression::default())
            .write_nifti(&data)
    }

    /// 获取 3D 标注中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl MrScan {
    /// 借助 `rayon`, 并行地判断所有体素强度是否均为有限值.
    ///
    /// 与 [`MrScan::is_finite`] 语义一致, 适用于大体积扫描.
    pub fn par_is_finite(&self) -> bool {
        self.data
            .axis_iter(Axis(0))
            .into_par_iter()
            .all(|sli| sli.iter().all(|v| v.is_finite()))
    }
}

/// nii 格式的 3D MRI 扫描与对应的分割标注.
///
/// 该结构完全透明, 仅包含两个公开的 `scan` 和 `label` 子结构,
/// 用户可以直接使用它们来实现相关上层功能.
///
/// # 注意
///
/// 两个子结构的数据一致性由用户保证, 否则程序行为未定义.
#[derive(Debug, Clone)]
pub struct MrData3d {
    /// 3D MRI 扫描.
    pub scan: MrScan,

    /// 3D MRI 分割标注.
    pub label: MrLabel,
}

impl MrData3d {
    /// 分别打开 nii 文件格式的 3D MRI 扫描和对应标注. 如果任一文件打开失败,
    /// 则返回 `Err`. 若两个文件挤压通道维后的空间形状不一致, 则程序 `panic`.
    pub fn open(scan_path: impl AsRef<Path>, label_path: impl AsRef<Path>) -> nifti::Result<Self> {
        let scan = MrScan::open(scan_path.as_ref())?;
        let label = MrLabel::open(label_path.as_ref())?;
        assert_eq!(scan.shape(), label.shape(), "MRI 扫描和标注形状不一致");
        Ok(Self { scan, label })
    }

    /// 获取扫描与标注共同的空间形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.scan.shape()
    }
}
