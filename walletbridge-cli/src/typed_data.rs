//! The "Ether Mail" EIP-712 sample payload.

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};

/// Converts a wallet-reported hex chain id (`"0x89"`) to its decimal value.
pub fn chain_id_to_decimal(chain_id: &str) -> Result<u64> {
    let digits = chain_id
        .strip_prefix("0x")
        .or_else(|| chain_id.strip_prefix("0X"))
        .unwrap_or(chain_id);
    if digits.is_empty() {
        bail!("empty chain id");
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid chain id {chain_id:?}"))
}

/// Builds the Ether Mail typed data for `chain_id` (hex, as the wallet reports it).
pub fn ether_mail(chain_id: &str) -> Result<Value> {
    let chain_id = chain_id_to_decimal(chain_id)?;
    Ok(json!({
        "domain": {
            "chainId": chain_id,
            "name": "Ether Mail",
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC",
            "version": "1"
        },
        "message": {
            "contents": "Hello, Bob!",
            "attachedMoneyInEth": 4.2,
            "from": {
                "name": "Cow",
                "wallets": [
                    "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826",
                    "0xDeaDbeefdEAdbeefdEadbEEFdeadbeEFdEaDbeeF"
                ]
            },
            "to": [{
                "name": "Bob",
                "wallets": [
                    "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB",
                    "0xB0BdaBea57B0BDABeA57b0bdABEA57b0BDabEa57",
                    "0xB0B0b0b0b0b0B000000000000000000000000000"
                ]
            }]
        },
        "primaryType": "Mail",
        "types": {
            "EIP712Domain": [
                { "name": "name", "type": "string" },
                { "name": "version", "type": "string" },
                { "name": "chainId", "type": "uint256" },
                { "name": "verifyingContract", "type": "address" }
            ],
            "Group": [
                { "name": "name", "type": "string" },
                { "name": "members", "type": "Person[]" }
            ],
            "Mail": [
                { "name": "from", "type": "Person" },
                { "name": "to", "type": "Person[]" },
                { "name": "contents", "type": "string" }
            ],
            "Person": [
                { "name": "name", "type": "string" },
                { "name": "wallets", "type": "address[]" }
            ]
        }
    }))
}
