//! 批量非零区域裁剪入口.
//!
//! 对数据集目录下的每个 (扫描, 标注) 文件对独立执行裁剪流水线.
//! 文件对之间没有任何共享可变状态, 以 worker 池并行, 完成顺序不保证.

use std::fmt;
use std::sync::mpsc::channel;
use std::sync::Arc;

use chrono::Local;
use threadpool::ThreadPool;

use mr_berry::prelude::*;
use utils::{ComputeEnv, DataLayout};

/// 控制台时间戳.
#[inline]
fn now() -> impl fmt::Display {
    Local::now().format("%a %b %e %H:%M:%S %Y")
}

fn main() {
    let env = ComputeEnv::detect();
    let layout = DataLayout::resolve(env);

    println!("{}: starting ...", now());
    println!(
        "Compute env: {env:?}, data root: {}, patch size: {}",
        layout.root().display(),
        env.patch_size()
    );

    let pairs = discover_pairs(&layout.img_dir, &layout.label_dir);
    println!("Found {} (scan, label) pairs", pairs.len());

    // 四个输出目录在 worker 池启动前创建完毕, 避免把目录创建
    // 竞争带进池内.
    let runner =
        Arc::new(BatchRunner::new(layout.crop_dirs.clone()).expect("Creating output folders error"));

    let pool = ThreadPool::new(utils::cpus());
    let (tx, rx) = channel();
    for pair in pairs {
        let runner = Arc::clone(&runner);
        let tx = tx.clone();
        pool.execute(move || {
            let outcome = runner.process(&pair);
            tx.send(outcome).expect("Result channel closed");
        });
    }
    drop(tx);

    let summary: RunSummary = rx.iter().collect();
    println!("{}: ending ...", now());
    println!("Totally get {} imgs: {summary}", summary.total());
}
