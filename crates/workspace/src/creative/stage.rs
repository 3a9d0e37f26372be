use std::fmt;

use lewis_backend::StageName;
use serde::{Deserialize, Serialize};

/// A step of the creative video workflow.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Drafting,
    Scripting,
    Visualizing,
    Rendering,
    Done,
}

/// The only order stages may be visited in.
pub const STAGE_ORDER: [Stage; 5] = [
    Stage::Drafting,
    Stage::Scripting,
    Stage::Visualizing,
    Stage::Rendering,
    Stage::Done,
];

impl Stage {
    /// Position in [`STAGE_ORDER`].
    pub const fn index(self) -> usize {
        match self {
            Self::Drafting => 0,
            Self::Scripting => 1,
            Self::Visualizing => 2,
            Self::Rendering => 3,
            Self::Done => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        STAGE_ORDER.get(index).copied()
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// True when `target` is exactly one step ahead.
    pub fn precedes(self, target: Stage) -> bool {
        target.index() == self.index() + 1
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drafting => "drafting",
            Self::Scripting => "scripting",
            Self::Visualizing => "visualizing",
            Self::Rendering => "rendering",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl From<StageName> for Stage {
    fn from(value: StageName) -> Self {
        match value {
            StageName::Drafting => Self::Drafting,
            StageName::Scripting => Self::Scripting,
            StageName::Visualizing => Self::Visualizing,
            StageName::Rendering => Self::Rendering,
            StageName::Done => Self::Done,
        }
    }
}

impl From<Stage> for StageName {
    fn from(value: Stage) -> Self {
        match value {
            Stage::Drafting => Self::Drafting,
            Stage::Scripting => Self::Scripting,
            Stage::Visualizing => Self::Visualizing,
            Stage::Rendering => Self::Rendering,
            Stage::Done => Self::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_agrees_with_order_table() {
        for (position, stage) in STAGE_ORDER.iter().enumerate() {
            assert_eq!(stage.index(), position);
            assert_eq!(Stage::from_index(position), Some(*stage));
        }
        assert_eq!(Stage::from_index(STAGE_ORDER.len()), None);
    }

    #[test]
    fn only_done_is_terminal() {
        assert_eq!(Stage::Drafting.next(), Some(Stage::Scripting));
        assert_eq!(Stage::Rendering.next(), Some(Stage::Done));
        assert!(Stage::Done.is_terminal());
        assert!(!Stage::Rendering.is_terminal());
    }

    #[test]
    fn precedes_rejects_skips_and_regressions() {
        assert!(Stage::Scripting.precedes(Stage::Visualizing));
        assert!(!Stage::Scripting.precedes(Stage::Rendering));
        assert!(!Stage::Scripting.precedes(Stage::Drafting));
        assert!(!Stage::Scripting.precedes(Stage::Scripting));
    }

    #[test]
    fn wire_names_round_trip() {
        for stage in STAGE_ORDER {
            assert_eq!(Stage::from(StageName::from(stage)), stage);
            assert_eq!(
                serde_json::to_value(stage).unwrap(),
                serde_json::Value::from(stage.as_str())
            );
        }
    }
}
