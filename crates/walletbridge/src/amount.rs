use alloy::primitives::U256;
use std::fmt;
use walletbridge_error::{Result, SessionError};

/// 10^18 wei per ether
const WEI_PER_ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Number of fractional digits in an ether amount
const ETHER_DECIMALS: usize = 18;

/// An amount of the chain's native currency, held in wei.
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct NativeAmount {
    /// The number of wei (U256) in the amount
    pub wei: U256,
}

impl NativeAmount {
    /// Creates a new NativeAmount from the wei amount (U256)
    pub fn from_wei(wei: U256) -> Self {
        Self { wei }
    }

    /// Creates a new NativeAmount from the wei amount (u128)
    pub fn from_wei_u128(wei: u128) -> Self {
        Self {
            wei: U256::from(wei),
        }
    }

    /// Parses a JSON-RPC hex quantity such as `"0x5af3107a4000"`.
    ///
    /// The `0x` prefix is required and at least one digit must follow it.
    pub fn from_hex_quantity(quantity: &str) -> Result<Self> {
        let digits = quantity
            .strip_prefix("0x")
            .filter(|d| !d.is_empty())
            .ok_or_else(|| SessionError::Malformed(format!("not a hex quantity: {quantity:?}")))?;
        let wei = U256::from_str_radix(digits, 16)
            .map_err(|e| SessionError::Malformed(format!("bad quantity {quantity:?}: {e}")))?;
        Ok(Self { wei })
    }

    /// Returns the number of wei in the amount
    pub fn wei(&self) -> U256 {
        self.wei
    }

    /// Formats the amount in ether without dropping any digit.
    ///
    /// Trailing fractional zeros are trimmed but one fractional digit is
    /// always kept: `1.0`, `0.0001`, `2.000000000000000001`.
    pub fn to_ether_string(&self) -> String {
        let whole = self.wei / WEI_PER_ETHER;
        let fraction = (self.wei % WEI_PER_ETHER).to_string();
        let padded = format!("{fraction:0>width$}", width = ETHER_DECIMALS);
        let trimmed = padded.trim_end_matches('0');
        if trimmed.is_empty() {
            format!("{whole}.0")
        } else {
            format!("{whole}.{trimmed}")
        }
    }
}

impl fmt::Display for NativeAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ether_string())
    }
}
