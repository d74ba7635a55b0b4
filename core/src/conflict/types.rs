use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

/// Identifier of one conflict, rendered as `conflict_<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConflictId(u64);

impl ConflictId {
    pub(crate) fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn seq(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conflict_{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // exact token only: no sign, padding or surrounding whitespace
        s.strip_prefix("conflict_")
            .filter(|n| n.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|n| n.parse::<u64>().ok().filter(|seq| seq.to_string() == n))
            .map(ConflictId)
            .ok_or_else(|| format!("malformed conflict id: {s}"))
    }
}

impl Serialize for ConflictId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Which side wins a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Local,
    Remote,
}

/// What a UI may answer to a conflict.
///
/// Only these three are accepted; anything else (e.g. a "merge both") is
/// rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Local,
    Remote,
    Cancel,
}

impl Resolution {
    pub(crate) fn terminal_state(self) -> ConflictState {
        match self {
            Resolution::Local => ConflictState::ResolvedLocal,
            Resolution::Remote => ConflictState::ResolvedRemote,
            Resolution::Cancel => ConflictState::Cancelled,
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "local" => Ok(Resolution::Local),
            "remote" => Ok(Resolution::Remote),
            "cancel" => Ok(Resolution::Cancel),
            other => Err(format!(
                "invalid resolution '{other}', expected local, remote or cancel"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictState {
    Pending,
    ResolvedLocal,
    ResolvedRemote,
    Cancelled,
    TimedOut,
}

impl ConflictState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ConflictState::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRequest {
    pub id: ConflictId,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub state: ConflictState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

impl ConflictRequest {
    pub(crate) fn pending(id: ConflictId, payload: serde_json::Value) -> Self {
        Self {
            id,
            payload,
            created_at: Utc::now(),
            state: ConflictState::Pending,
            settled_at: None,
        }
    }

    /// Moves a pending request into `state`. Terminal requests are left as is.
    pub(crate) fn settle(&mut self, state: ConflictState) -> bool {
        if self.state.is_terminal() || !state.is_terminal() {
            return false;
        }
        self.state = state;
        self.settled_at = Some(Utc::now());
        true
    }
}
