use serde::{Deserialize, Serialize};

/// Pipeline stage.
///
/// Preview and Analyse are driven automatically; Manual is the terminal,
/// user-driven state. Nothing transitions back into Preview, Analyse only
/// follows Preview, and Manual can be entered from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Preview,
    Analyse,
    Manual,
}

impl Stage {
    pub fn is_automated(self) -> bool {
        matches!(self, Stage::Preview | Stage::Analyse)
    }

    pub fn can_advance_to(self, next: Stage) -> bool {
        match (self, next) {
            (_, Stage::Manual) => true,
            (Stage::Preview, Stage::Analyse) => true,
            (current, next) => current == next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(Stage::Preview.can_advance_to(Stage::Analyse));
        assert!(Stage::Preview.can_advance_to(Stage::Manual));
        assert!(Stage::Analyse.can_advance_to(Stage::Manual));
        assert!(Stage::Manual.can_advance_to(Stage::Manual));

        assert!(!Stage::Analyse.can_advance_to(Stage::Preview));
        assert!(!Stage::Manual.can_advance_to(Stage::Preview));
        assert!(!Stage::Manual.can_advance_to(Stage::Analyse));
    }

    #[test]
    fn test_is_automated() {
        assert!(Stage::Preview.is_automated());
        assert!(Stage::Analyse.is_automated());
        assert!(!Stage::Manual.is_automated());
    }
}
