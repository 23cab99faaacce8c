// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX shm object names for ring segments. Ring names are derived from a
// stream name plus a role suffix, which can overflow the macOS name limit, so
// long names are folded into a prefix plus a stable hash.

/// FNV-1a 64-bit hash.
pub fn fnv1a_64(data: &[u8]) -> u64 {
    data.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

/// Longest POSIX shm name accepted by the platform, leading '/' included.
/// Zero means no practical limit.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0;

/// Map a ring name to a valid POSIX shm object name.
///
/// Adds the leading '/' when missing. When the result exceeds
/// [`SHM_NAME_MAX`] it becomes `/<prefix>_<16 hex digits>`.
pub fn make_shm_name(name: &str) -> String {
    let full = if name.starts_with('/') { name.to_owned() } else { format!("/{name}") };
    shorten(full, SHM_NAME_MAX)
}

fn shorten(full: String, limit: usize) -> String {
    if limit == 0 || full.len() <= limit {
        return full;
    }
    let hash = format!("{:016x}", fnv1a_64(full.as_bytes()));
    // '/' + prefix + '_' + hash
    let keep = limit.saturating_sub(2 + hash.len());
    let body = &full[1..];
    let mut cut = keep.min(body.len());
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("/{}_{hash}", &body[..cut])
}
