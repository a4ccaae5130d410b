//! CLI 模块负责解析命令行参数并分发到各子命令处理逻辑。

mod runner;

pub mod args;
pub mod chain;
pub mod context;
pub mod quote;
pub mod transfer;
pub mod utils;

pub use runner::run;
