//! Value types shared by the assigner, stores and callers.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SlotError;

/// Physical index of a slot in its pool, in `[0, capacity)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SlotIndex(u32);

impl SlotIndex {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical client identifier requesting a slot. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Result<Self, SlotError> {
        let id = id.into();
        if id.is_empty() {
            return Err(SlotError::EmptyOwner);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OwnerId {
    type Error = SlotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for OwnerId {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for OwnerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the recency-ordered pool: a physical slot and its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub slot: SlotIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerId>,
}

impl Binding {
    pub fn unassigned(slot: SlotIndex) -> Self {
        Self { slot, owner: None }
    }

    pub fn owned(slot: SlotIndex, owner: OwnerId) -> Self {
        Self {
            slot,
            owner: Some(owner),
        }
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner.as_ref().is_some_and(|o| o.as_str() == owner)
    }
}
