// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Unguessable identifiers from the system CSPRNG.

use anyhow::anyhow;
use ring::rand::{SecureRandom, SystemRandom};

/// Fill `N` bytes from the system random source.
pub fn random_bytes<const N: usize>() -> anyhow::Result<[u8; N]> {
    let mut buf = [0u8; N];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| anyhow!("system random source unavailable"))?;
    Ok(buf)
}

/// 32 random bytes, hex encoded. Used for session ids and OAuth state.
pub fn random_token() -> anyhow::Result<String> {
    Ok(hex::encode(random_bytes::<32>()?))
}

/// Short id for correlating logs with a response.
pub fn correlation_id() -> String {
    random_bytes::<8>()
        .map(hex::encode)
        .unwrap_or_else(|_| "0000000000000000".to_string())
}
