// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WireGuard key material and strict argument validation.
//!
//! Keys are generated in-process on Curve25519 so that the security
//! sensitive step never depends on a subprocess. Every value that is later
//! handed to the `wg` tool passes through [`validate_public_key`] or
//! [`validate_ipv4`] first.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use base64ct::{Base64, Encoding};
use ring::rand::{SecureRandom, SystemRandom};
use x25519_dalek::{PublicKey, StaticSecret};

/// Raw length of a Curve25519 key.
pub const KEY_LEN: usize = 32;

/// A freshly generated WireGuard key pair, both halves base64 encoded.
#[derive(Clone)]
pub struct WgKeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl fmt::Debug for WgKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WgKeyPair")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("system random source unavailable")]
pub struct KeyGenerationError;

/// Generate a WireGuard key pair.
///
/// The private scalar is clamped per RFC 7748 before the public key is
/// derived, matching what `wg genkey` emits.
pub fn generate_keypair() -> Result<WgKeyPair, KeyGenerationError> {
    let mut private_key_bytes = [0u8; KEY_LEN];
    SystemRandom::new()
        .fill(&mut private_key_bytes)
        .map_err(|_| KeyGenerationError)?;

    clamp(&mut private_key_bytes);

    let secret = StaticSecret::from(private_key_bytes);
    let public = PublicKey::from(&secret);

    Ok(WgKeyPair {
        private_key: Base64::encode_string(&private_key_bytes),
        public_key: Base64::encode_string(public.as_bytes()),
    })
}

fn clamp(scalar: &mut [u8; KEY_LEN]) {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
}

/// A public key is valid iff it is standard base64 of exactly 32 bytes.
pub fn validate_public_key(key: &str) -> bool {
    matches!(Base64::decode_vec(key), Ok(bytes) if bytes.len() == KEY_LEN)
}

/// Strict dotted-quad check: four decimal octets of one to three digits,
/// each in `0..=255`, nothing else.
pub fn validate_ipv4(address: &str) -> bool {
    let parts: Vec<&str> = address.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|part| {
            !part.is_empty()
                && part.len() <= 3
                && part.bytes().all(|b| b.is_ascii_digit())
                && part.parse::<u16>().is_ok_and(|n| n <= 255)
        })
}

/// Parse an address that already passed [`validate_ipv4`].
pub fn parse_ipv4(address: &str) -> Option<Ipv4Addr> {
    if !validate_ipv4(address) {
        return None;
    }
    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(address.split('.')) {
        *slot = part.parse().ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

/// The concentrator's /24 peer subnet.
///
/// Host `.1` belongs to the concentrator; peers are drawn from `.2..=.254`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: [u8; 3],
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubnetError {
    #[error("invalid subnet address: {0}")]
    InvalidAddress(String),
    #[error("unsupported prefix length /{0}, only /24 is supported")]
    UnsupportedPrefix(String),
}

impl Subnet {
    pub const FIRST_HOST: u8 = 2;
    pub const LAST_HOST: u8 = 254;

    pub fn host(&self, host: u8) -> Ipv4Addr {
        let [a, b, c] = self.network;
        Ipv4Addr::new(a, b, c, host)
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        address.octets()[..3] == self.network
    }
}

impl FromStr for Subnet {
    type Err = SubnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, prefix) = match s.split_once('/') {
            Some((base, prefix)) => (base, prefix),
            None => (s, "24"),
        };
        if prefix != "24" {
            return Err(SubnetError::UnsupportedPrefix(prefix.to_string()));
        }
        let address =
            parse_ipv4(base).ok_or_else(|| SubnetError::InvalidAddress(base.to_string()))?;
        let [a, b, c, _] = address.octets();
        Ok(Self { network: [a, b, c] })
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.network;
        write!(f, "{a}.{b}.{c}.0/24")
    }
}
