// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use sha2::{Digest, Sha256};

use crate::normalize::collapse;

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Fingerprint of a normalized item.
///
/// Hashes `title + "\n" + url`; when both are empty, hashes the normalized
/// body instead so link-less, title-less items still dedup on content.
pub fn content_hash(normalized_title: &str, normalized_url: &str, normalized_body: &str) -> String {
    if normalized_title.is_empty() && normalized_url.is_empty() {
        sha256_hex(normalized_body)
    } else {
        sha256_hex(&format!("{normalized_title}\n{normalized_url}"))
    }
}

/// Fingerprint of free chat text under the same normalization as titles.
pub fn message_fingerprint(text: &str) -> String {
    sha256_hex(&collapse(text))
}
