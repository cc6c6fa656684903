// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Feed item deduplication.
//!
//! Items are identified by a SHA-256 fingerprint of their normalized title
//! and URL, never by GUID: the same story re-published under a new GUID, or
//! with fresh tracking parameters, is still a duplicate.

pub mod fingerprint;
pub mod index;
pub mod normalize;

pub use fingerprint::{content_hash, message_fingerprint};
pub use index::DedupIndex;
pub use normalize::{normalize_body, normalize_title, normalize_url};
