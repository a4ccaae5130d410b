use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::gas::{TxKind, Urgency};
use crate::transfer::SlippageSpec;

#[derive(Parser, Debug)]
#[command(name = "meridian", version, about = "跨链转账编排与实时报价")]
pub struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径（默认查找 meridian.toml 或 config/meridian.toml）"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 请求一次报价并展示费用估算
    Quote(QuoteCmd),
    /// 从标准输入逐行读取金额，实时报价
    Watch(WatchCmd),
    /// 为指定链与交易类型生成 gas 计划
    Gas(GasCmd),
    /// 查询金库 TVL（带缓存与退避重试）
    Tvl(TvlCmd),
    /// 存入金库；指定来源代币时先兑换 / 跨链
    Deposit(DepositCmd),
    /// 从金库取出
    Withdraw(WithdrawCmd),
    /// 初始化配置模版文件
    Init(InitCmd),
}

#[derive(Args, Debug, Clone)]
pub struct RouteArgs {
    #[arg(long, value_name = "CHAIN_ID", help = "来源链 id")]
    pub from_chain: u64,
    #[arg(long, value_name = "SYMBOL", help = "来源代币符号或地址")]
    pub from_token: String,
    #[arg(long, value_name = "CHAIN_ID", help = "目标链 id，缺省与来源链相同")]
    pub to_chain: Option<u64>,
    #[arg(long, value_name = "SYMBOL", help = "目标代币；缺省表示跨链桥接同一资产")]
    pub to_token: Option<String>,
    #[arg(long, default_value = "auto", help = "滑点：auto 或基点数")]
    pub slippage: SlippageSpec,
}

#[derive(Args, Debug)]
pub struct QuoteCmd {
    #[command(flatten)]
    pub route: RouteArgs,
    #[arg(long, help = "转账金额（十进制）")]
    pub amount: String,
}

#[derive(Args, Debug)]
pub struct WatchCmd {
    #[command(flatten)]
    pub route: RouteArgs,
}

#[derive(Args, Debug)]
pub struct GasCmd {
    #[arg(long, value_name = "CHAIN_ID")]
    pub chain: u64,
    #[arg(long, default_value = "deposit", help = "approval / deposit / withdrawal / swap / allowance_reset")]
    pub kind: TxKind,
    #[arg(long, default_value = "medium", help = "low / medium / high / very_high")]
    pub urgency: Urgency,
    #[arg(long, help = "覆盖默认 gas limit")]
    pub gas_limit: Option<u64>,
}

#[derive(Args, Debug)]
pub struct TvlCmd {
    #[arg(long = "vault", value_name = "ID", help = "金库 id，可重复；缺省为全部")]
    pub vaults: Vec<String>,
}

#[derive(Args, Debug)]
pub struct DepositCmd {
    #[arg(long, value_name = "ID")]
    pub vault: String,
    #[arg(long, help = "金额（以来源代币计）")]
    pub amount: String,
    #[arg(long, value_name = "CHAIN_ID", requires = "from_token", help = "来源链；与金库不同链时先跨链")]
    pub from_chain: Option<u64>,
    #[arg(long, value_name = "SYMBOL", requires = "from_chain", help = "来源代币")]
    pub from_token: Option<String>,
    #[arg(long, default_value = "auto")]
    pub slippage: SlippageSpec,
}

#[derive(Args, Debug)]
pub struct WithdrawCmd {
    #[arg(long, value_name = "ID")]
    pub vault: String,
    #[arg(long)]
    pub amount: String,
}

#[derive(Args, Debug)]
pub struct InitCmd {
    #[arg(long, value_name = "DIR", help = "可选输出目录（默认当前目录）")]
    pub output: Option<PathBuf>,
    #[arg(long, help = "若文件存在则覆盖")]
    pub force: bool,
}
