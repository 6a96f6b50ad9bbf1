//! 预处理流水线依赖的通用组件: 运行环境识别与数据目录布局.

pub mod layout;

pub use layout::{ComputeEnv, DataLayout};

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}
