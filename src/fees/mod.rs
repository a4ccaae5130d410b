//! 费用与估值：从已采纳的报价推导总费用、协议费、中继费与 USD 估值。

pub mod price;
pub mod valuation;

pub use price::{PriceApiClient, PriceError, PriceService, fill_missing_prices};
pub use valuation::{FeeBreakdown, FeeDenomination};
