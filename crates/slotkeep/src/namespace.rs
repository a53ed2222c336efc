//! Namespace selection and the persisted key layout.
//!
//! Store names and key strings are a compatibility contract with existing
//! persisted data. Do not change them.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Owner identifiers with this prefix belong to [`Namespace::WebApk`].
pub const WEBAPK_ID_PREFIX: &str = "webapk:";

/// Independent partition of slots, each with its own pool and persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Webapp,
    WebApk,
}

struct KeyLayout {
    store: &'static str,
    count: &'static str,
    slot_prefix: &'static str,
    owner_prefix: &'static str,
}

const WEBAPP_KEYS: KeyLayout = KeyLayout {
    store: "com.google.android.apps.chrome.webapps",
    count: "ActivityAssigner.numSavedEntries",
    slot_prefix: "ActivityAssigner.activityIndex",
    owner_prefix: "ActivityAssigner.webappId",
};

const WEBAPK_KEYS: KeyLayout = KeyLayout {
    store: "com.google.android.apps.chrome.webapps.webapk",
    count: "ActivityAssigner.numSavedEntries.webapk",
    slot_prefix: "ActivityAssigner.activityIndex.webapk",
    owner_prefix: "ActivityAssigner.webappId.webapk",
};

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Webapp, Namespace::WebApk];

    /// Pick the namespace for an owner identifier from its prefix alone.
    pub fn for_owner(owner: &str) -> Self {
        if owner.starts_with(WEBAPK_ID_PREFIX) {
            Namespace::WebApk
        } else {
            Namespace::Webapp
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Webapp => "webapp",
            Namespace::WebApk => "webapk",
        }
    }

    fn keys(&self) -> &'static KeyLayout {
        match self {
            Namespace::Webapp => &WEBAPP_KEYS,
            Namespace::WebApk => &WEBAPK_KEYS,
        }
    }

    /// Name of the store partition holding this namespace's keys.
    pub fn store_name(&self) -> &'static str {
        self.keys().store
    }

    pub fn count_key(&self) -> &'static str {
        self.keys().count
    }

    /// Key of the physical slot index stored at list position `position`.
    pub fn slot_key(&self, position: usize) -> String {
        format!("{}{}", self.keys().slot_prefix, position)
    }

    /// Key of the owner identifier stored at list position `position`.
    pub fn owner_key(&self, position: usize) -> String {
        format!("{}{}", self.keys().owner_prefix, position)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webapp" => Ok(Namespace::Webapp),
            "webapk" => Ok(Namespace::WebApk),
            other => Err(format!(
                "unknown namespace '{other}', expected 'webapp' or 'webapk'"
            )),
        }
    }
}
