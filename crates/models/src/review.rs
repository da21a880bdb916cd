use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "review_reason")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    LowConfidence,
    ConflictDetected,
    ValidationFailed,
    ManualEscalation,
    DuplicateSuspected,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "review_resolution")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewResolution {
    Approved,
    Corrected,
    Rejected,
    Escalated,
    Spam,
}

impl ReviewResolution {
    /// `was_correct` derivation for calibration capture. `None` means the
    /// resolution carries no usable label and is not captured.
    pub fn was_correct(&self) -> Option<bool> {
        match self {
            ReviewResolution::Approved => Some(true),
            ReviewResolution::Corrected => Some(false),
            ReviewResolution::Rejected
            | ReviewResolution::Escalated
            | ReviewResolution::Spam => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "correction_type")]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CorrectionType {
    Amount,
    ClientName,
    CreditorName,
    Match,
    Multiple,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn was_correct_derivation() {
        assert_eq!(ReviewResolution::Approved.was_correct(), Some(true));
        assert_eq!(ReviewResolution::Corrected.was_correct(), Some(false));
        assert_eq!(ReviewResolution::Rejected.was_correct(), None);
        assert_eq!(ReviewResolution::Escalated.was_correct(), None);
        assert_eq!(ReviewResolution::Spam.was_correct(), None);
    }
}
