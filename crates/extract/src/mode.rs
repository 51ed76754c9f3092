use serde::{Deserialize, Serialize};

/// Extraction mode requested by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    #[default]
    Basic,
    Summary,
    Content,
    Full,
}

/// Job lifecycle phase. Declaration order is the only allowed direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Initializing,
    Content,
    Basic,
    Summary,
    Analyzing,
    Extracting,
    Complete,
    Error,
}

const CAPABILITY_PHASES: [Phase; 4] = [Phase::Basic, Phase::Summary, Phase::Analyzing, Phase::Extracting];

impl ExtractionMode {
    /// The capability phases this mode runs, in order. `basic` always runs.
    pub fn phases(self) -> &'static [Phase] {
        let terminal = self.terminal_phase();
        let len = CAPABILITY_PHASES
            .iter()
            .position(|p| *p == terminal)
            .map_or(1, |i| i + 1);
        &CAPABILITY_PHASES[..len]
    }

    /// The phase after which results are persisted.
    pub fn terminal_phase(self) -> Phase {
        match self {
            ExtractionMode::Basic => Phase::Basic,
            ExtractionMode::Summary => Phase::Summary,
            ExtractionMode::Content => Phase::Analyzing,
            ExtractionMode::Full => Phase::Extracting,
        }
    }
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }

    pub fn can_advance_to(self, next: Phase) -> bool {
        !self.is_terminal() && next >= self
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::Content => "content",
            Phase::Basic => "basic",
            Phase::Summary => "summary",
            Phase::Analyzing => "analyzing",
            Phase::Extracting => "extracting",
            Phase::Complete => "complete",
            Phase::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
