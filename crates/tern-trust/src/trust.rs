use serde::{Deserialize, Serialize};

/// What one identity thinks of another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Trust {
    /// Value assigned directly by the truster.
    pub explicit: Option<i32>,
    /// Value propagated through the graph.
    pub implicit: Option<i32>,
    /// Hop count to the trustee, `None` if unreachable.
    pub distance: Option<u32>,
}

impl Trust {
    /// No trust information at all.
    pub const NONE: Trust = Trust {
        explicit: None,
        implicit: None,
        distance: None,
    };

    pub fn new(explicit: Option<i32>, implicit: Option<i32>, distance: Option<u32>) -> Self {
        Self {
            explicit,
            implicit,
            distance,
        }
    }

    /// Whether every component is absent.
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// The truster explicitly assigned a negative value.
    pub fn is_explicitly_untrusted(&self) -> bool {
        self.explicit.is_some_and(|v| v < 0)
    }

    /// Negative explicit value, or negative implicit value when no explicit
    /// value exists.
    pub fn is_untrusted(&self) -> bool {
        match self.explicit {
            Some(explicit) => explicit < 0,
            None => self.implicit.is_some_and(|v| v < 0),
        }
    }

    /// A trust path to the trustee is known.
    pub fn has_path(&self) -> bool {
        self.distance.is_some()
    }
}

/// Explicit values written by `trust` and `distrust`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustValues {
    pub positive: i32,
    pub negative: i32,
}

impl Default for TrustValues {
    fn default() -> Self {
        Self {
            positive: 75,
            negative: -25,
        }
    }
}
