//! ERC-20 / ERC-4626 调用数据编码。

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{SolCall, sol};

use super::RpcError;

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    interface IERC4626 {
        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
        function withdraw(uint256 assets, address receiver, address owner) external returns (uint256 shares);
    }
}

pub fn balance_of(owner: Address) -> Bytes {
    IERC20::balanceOfCall { owner }.abi_encode().into()
}

pub fn allowance(owner: Address, spender: Address) -> Bytes {
    IERC20::allowanceCall { owner, spender }.abi_encode().into()
}

pub fn approve(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

pub fn vault_deposit(assets: U256, receiver: Address) -> Bytes {
    IERC4626::depositCall { assets, receiver }.abi_encode().into()
}

pub fn vault_withdraw(assets: U256, receiver: Address, owner: Address) -> Bytes {
    IERC4626::withdrawCall {
        assets,
        receiver,
        owner,
    }
    .abi_encode()
    .into()
}

/// 读取返回数据中的首个 `uint256` 字。
pub fn decode_uint(data: &[u8]) -> Result<U256, RpcError> {
    if data.len() < 32 {
        return Err(RpcError::Schema(format!(
            "uint256 返回值长度不足: {} 字节",
            data.len()
        )));
    }
    Ok(U256::from_be_slice(&data[..32]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_match_standard_abi() {
        let owner = Address::repeat_byte(0x11);
        let spender = Address::repeat_byte(0x22);
        assert_eq!(&balance_of(owner)[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(&allowance(owner, spender)[..4], &[0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(&approve(spender, U256::from(1u8))[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(&vault_deposit(U256::from(1u8), owner)[..4], &[0x6e, 0x55, 0x3f, 0x65]);
        assert_eq!(
            &vault_withdraw(U256::from(1u8), owner, owner)[..4],
            &[0xb4, 0x60, 0xaf, 0x94]
        );
    }

    #[test]
    fn approve_encodes_exact_amount() {
        let spender = Address::repeat_byte(0x22);
        let data = approve(spender, U256::from(100u64));
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(decode_uint(&data[36..]).expect("amount"), U256::from(100u64));
    }

    #[test]
    fn short_return_data_is_rejected() {
        assert!(decode_uint(&[0u8; 4]).is_err());
    }
}
