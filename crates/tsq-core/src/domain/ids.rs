//! Domain identifiers.
//!
//! # JobId
//! JobId は不透明な文字列 ID です。生成は `IdGenerator`（ULID ベース）が担当し、
//! 外部（CLI・HTTP など）から受け取った文字列もそのまま JobId として扱えます。
//!
//! ## ULID を使う理由
//! - **時刻でソート可能**: timestamp が先頭にあるため、生成順序でソートできる
//! - **調整不要**: ロックやカウンタなしで一意な ID を生成できる
//! - **UUID互換**: 128-bit で UUID と同じサイズ

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use ulid::Ulid;

/// Identifier of a Job (submit/status/result unit).
///
/// 中身の形式には依存しない（永続化された古い UUID 文字列もそのまま扱える）。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<Ulid> for JobId {
    fn from(ulid: Ulid) -> Self {
        Self(ulid.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for JobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
