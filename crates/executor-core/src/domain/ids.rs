//! Domain identifiers (strongly-typed IDs).
//!
//! Task と Worker の ID は外部（producer / transport）から渡される不透明な文字列です。
//! 生成が必要な場合は ULID を使います（`IdGenerator` 参照）。
//!
//! ## Phantom Type パターン
//! `Id<T>` で共通実装を一つにまとめ、`T` はコンパイル時だけ使うマーカー型です。
//! TaskId と WorkerId は同じ文字列表現でも混同できません。

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// 生成 ID のプレフィックス（"task-", "worker-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic opaque identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    value: String,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// Wrap a caller-supplied identifier.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            _marker: PhantomData,
        }
    }

    /// Build an identifier from a ULID, rendered as `<prefix><ulid>`.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self::new(format!("{}{}", T::prefix(), ulid))
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T: IdMarker> From<&str> for Id<T> {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<String> for Id<T> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Worker のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Worker {}

impl IdMarker for Worker {
    fn prefix() -> &'static str {
        "worker-"
    }
}

/// Identifier of a task routed by the engine.
pub type TaskId = Id<Task>;

/// Identifier of one worker connection.
pub type WorkerId = Id<Worker>;

/// Name of an executor type (one step of a task's pipeline).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageName(String);

impl StageName {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Borrow<str> for StageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_supplied_ids_keep_their_value() {
        let task = TaskId::new("t1");
        let worker = WorkerId::from("w1");

        assert_eq!(task.as_str(), "t1");
        assert_eq!(worker.to_string(), "w1");
        // let _: TaskId = worker; // <- does not compile
    }

    #[test]
    fn generated_ids_carry_prefix() {
        let task = TaskId::from_ulid(Ulid::new());
        let worker = WorkerId::from_ulid(Ulid::new());

        assert!(task.as_str().starts_with("task-"));
        assert!(worker.as_str().starts_with("worker-"));
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let task = TaskId::new("t42");
        let s = serde_json::to_string(&task).unwrap();
        assert_eq!(s, "\"t42\"");

        let back: TaskId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn stage_names_compare_by_value() {
        assert_eq!(StageName::from("JobPath"), StageName::new("JobPath"));
        assert_ne!(StageName::from("JobPath"), StageName::new("JobSanity"));
    }
}
