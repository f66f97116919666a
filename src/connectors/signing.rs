use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt::Write;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

fn hmac_sha256(secret: &str, message: &str) -> Vec<u8> {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC can take key of any size"));
    mac.update(message.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Lowercase hex HMAC-SHA256, as Binance and Bybit expect.
pub fn sign_hex(secret: &str, message: &str) -> String {
    hmac_sha256(secret, message)
        .iter()
        .fold(String::with_capacity(64), |mut out, byte| {
            let _ = write!(out, "{:02x}", byte);
            out
        })
}

/// Base64 HMAC-SHA256, as KuCoin expects for both signature and passphrase.
pub fn sign_base64(secret: &str, message: &str) -> String {
    general_purpose::STANDARD.encode(hmac_sha256(secret, message))
}

pub fn timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binance_reference_signature() {
        let secret = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";

        assert_eq!(
            sign_hex(secret, query),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_base64_signature_shape() {
        let signature = sign_base64("secret", "1700000000000GET/api/v1/accounts");
        // 32 byte digest -> 44 base64 chars with padding
        assert_eq!(signature.len(), 44);
        assert!(signature.ends_with('='));
    }
}
