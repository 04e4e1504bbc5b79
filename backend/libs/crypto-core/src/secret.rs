//! Signing secret strength checks
//!
//! HMAC signing secrets are rejected at startup when they are too short,
//! have low byte entropy, or contain obvious runs.

const MIN_SECRET_LENGTH: usize = 32; // 256 bits minimum
const RECOMMENDED_SECRET_LENGTH: usize = 64;
const MIN_ENTROPY_BITS_PER_BYTE: f64 = 3.5;
const STRONG_ENTROPY_BITS_PER_BYTE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStrength {
    /// Must not be used
    Weak,
    /// Usable, startup logs a warning
    Acceptable,
    Strong,
}

pub fn assess_secret(secret: &str) -> SecretStrength {
    let bytes = secret.as_bytes();

    if bytes.len() < MIN_SECRET_LENGTH {
        return SecretStrength::Weak;
    }

    let entropy = shannon_entropy(bytes);
    if entropy < MIN_ENTROPY_BITS_PER_BYTE || has_obvious_patterns(bytes) {
        return SecretStrength::Weak;
    }

    if bytes.len() >= RECOMMENDED_SECRET_LENGTH && entropy >= STRONG_ENTROPY_BITS_PER_BYTE {
        SecretStrength::Strong
    } else {
        SecretStrength::Acceptable
    }
}

/// Bits per byte, 0-8
fn shannon_entropy(data: &[u8]) -> f64 {
    let mut freq = [0u32; 256];
    for &byte in data {
        freq[byte as usize] += 1;
    }

    let len = data.len() as f64;
    freq.iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = f64::from(count) / len;
            -p * p.log2()
        })
        .sum()
}

/// Four or more repeated or ascending bytes in a row ("aaaa", "1234")
fn has_obvious_patterns(data: &[u8]) -> bool {
    let mut same_run = 1;
    let mut seq_run = 1;

    for window in data.windows(2) {
        same_run = if window[0] == window[1] { same_run + 1 } else { 1 };
        seq_run = if i16::from(window[1]) - i16::from(window[0]) == 1 {
            seq_run + 1
        } else {
            1
        };

        if same_run >= 4 || seq_run >= 4 {
            return true;
        }
    }

    false
}
