//! T-of-N secret sharing over GF(2^8).
//!
//! A secret of `n` bytes splits into shares of `n + 1` bytes: one
//! polynomial evaluation per secret byte, followed by the share's
//! x-coordinate. X-coordinates are drawn from 1..=255 uniformly without
//! replacement, which caps `parts` at 255.
//!
//! [`combine`] performs Lagrange interpolation at x = 0. It cannot tell
//! whether it was given enough shares: a below-threshold or mismatched
//! set reconstructs uniformly random bytes, which the caller detects
//! when the result fails to authenticate the keychain snapshot.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::ShamirError;

/// Smallest permitted parts/threshold.
pub const MIN_SHARES: usize = 2;

/// Largest permitted parts/threshold (nonzero single-byte x-coordinates).
pub const MAX_SHARES: usize = 255;

/// Split `secret` into `parts` shares, any `threshold` of which
/// reconstruct it.
///
/// # Errors
///
/// Returns [`ShamirError::InvalidArgument`] when `parts` or `threshold`
/// fall outside `2..=255`, `threshold > parts`, or the secret is empty.
pub fn split(secret: &[u8], parts: usize, threshold: usize) -> Result<Vec<Vec<u8>>, ShamirError> {
    if !(MIN_SHARES..=MAX_SHARES).contains(&parts) {
        return Err(ShamirError::InvalidArgument {
            reason: format!("parts must be between {MIN_SHARES} and {MAX_SHARES}, got {parts}"),
        });
    }
    if !(MIN_SHARES..=MAX_SHARES).contains(&threshold) {
        return Err(ShamirError::InvalidArgument {
            reason: format!(
                "threshold must be between {MIN_SHARES} and {MAX_SHARES}, got {threshold}"
            ),
        });
    }
    if threshold > parts {
        return Err(ShamirError::InvalidArgument {
            reason: format!("threshold {threshold} cannot exceed parts {parts}"),
        });
    }
    if secret.is_empty() {
        return Err(ShamirError::InvalidArgument {
            reason: "secret cannot be empty".to_owned(),
        });
    }

    // One distinct nonzero x-coordinate per share.
    let mut x_coordinates: Vec<u8> = (1..=u8::MAX).collect();
    x_coordinates.shuffle(&mut OsRng);
    x_coordinates.truncate(parts);

    let mut shares: Vec<Vec<u8>> = x_coordinates
        .iter()
        .map(|&x| {
            let mut share = Vec::with_capacity(secret.len() + 1);
            share.resize(secret.len(), 0);
            share.push(x);
            share
        })
        .collect();

    // A fresh random polynomial per secret byte, intercept = the byte.
    let mut coefficients = Zeroizing::new(vec![0u8; threshold]);
    for (byte_index, &secret_byte) in secret.iter().enumerate() {
        coefficients[0] = secret_byte;
        OsRng.fill_bytes(&mut coefficients[1..]);

        for (share_index, &x) in x_coordinates.iter().enumerate() {
            shares[share_index][byte_index] = evaluate(&coefficients, x);
        }
    }

    Ok(shares)
}

/// Reconstruct a secret from `shares`.
///
/// # Errors
///
/// Returns [`ShamirError::InvalidShares`] when fewer than two shares are
/// given, share lengths differ or are too short, or two shares carry the
/// same x-coordinate.
pub fn combine(shares: &[Vec<u8>]) -> Result<Zeroizing<Vec<u8>>, ShamirError> {
    if shares.len() < MIN_SHARES {
        return Err(ShamirError::InvalidShares {
            reason: format!("at least {MIN_SHARES} shares are required, got {}", shares.len()),
        });
    }

    let share_len = shares[0].len();
    if share_len < 2 {
        return Err(ShamirError::InvalidShares {
            reason: "shares must be at least 2 bytes".to_owned(),
        });
    }
    if shares.iter().any(|s| s.len() != share_len) {
        return Err(ShamirError::InvalidShares {
            reason: "all shares must be the same length".to_owned(),
        });
    }

    let mut seen = [false; 256];
    for share in shares {
        let x = share[share_len - 1];
        if seen[usize::from(x)] {
            return Err(ShamirError::InvalidShares {
                reason: "duplicate share detected".to_owned(),
            });
        }
        seen[usize::from(x)] = true;
    }

    let secret_len = share_len - 1;
    let mut secret = Zeroizing::new(vec![0u8; secret_len]);

    let x_samples: Vec<u8> = shares.iter().map(|s| s[share_len - 1]).collect();
    for byte_index in 0..secret_len {
        let y_samples: Vec<u8> = shares.iter().map(|s| s[byte_index]).collect();
        secret[byte_index] = interpolate_at_zero(&x_samples, &y_samples);
    }

    Ok(secret)
}

/// Evaluate the polynomial with the given coefficients at `x` (Horner).
fn evaluate(coefficients: &[u8], x: u8) -> u8 {
    let mut result = 0u8;
    for &coefficient in coefficients.iter().rev() {
        result = gf_add(gf_mult(result, x), coefficient);
    }
    result
}

/// Lagrange interpolation of the sample points at x = 0.
fn interpolate_at_zero(x_samples: &[u8], y_samples: &[u8]) -> u8 {
    let mut result = 0u8;
    for (j, &x_j) in x_samples.iter().enumerate() {
        let mut basis = 1u8;
        for (m, &x_m) in x_samples.iter().enumerate() {
            if m == j {
                continue;
            }
            basis = gf_mult(basis, gf_div(x_m, gf_add(x_m, x_j)));
        }
        result = gf_add(result, gf_mult(basis, y_samples[j]));
    }
    result
}

/// Addition in GF(2^8) is xor.
fn gf_add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// Carry-less multiplication modulo the AES polynomial 0x11b.
fn gf_mult(a: u8, b: u8) -> u8 {
    let mut a = u16::from(a);
    let mut b = u16::from(b);
    let mut product = 0u16;

    for _ in 0..8 {
        if b & 1 != 0 {
            product ^= a;
        }
        a <<= 1;
        if a & 0x100 != 0 {
            a ^= 0x11b;
        }
        b >>= 1;
    }

    product as u8
}

/// Division via the multiplicative inverse (b^254). b must be nonzero,
/// which combine's duplicate-x check guarantees.
fn gf_div(a: u8, b: u8) -> u8 {
    debug_assert!(b != 0, "division by zero in GF(2^8)");

    // b^254 = b^-1 by Fermat's little theorem in GF(2^8).
    let mut inverse = 1u8;
    let mut base = b;
    let mut exponent = 254u8;
    while exponent > 0 {
        if exponent & 1 != 0 {
            inverse = gf_mult(inverse, base);
        }
        base = gf_mult(base, base);
        exponent >>= 1;
    }

    gf_mult(a, inverse)
}
