mod checkpoints;
mod errors;
mod extraction;
mod id;
mod inbound;
mod matching;
mod prompts;
mod review;
mod routing;
mod status;
mod text_json;

pub use checkpoints::{
    Agent1Checkpoint, Agent2Checkpoint, Agent3Checkpoint, AgentCheckpoints, CheckpointStatus,
    FieldConflict, Intent, AGENT1_KEY, AGENT2_KEY, AGENT3_KEY,
};
pub use errors::{classify_sqlx, is_unique_violation, ErrorKind, ProcessingError};
pub use extraction::{
    ConsolidatedResult, Confidence, ExtractionMethod, ExtractionResult, SourceKind,
};
pub use id::{Id, IdGenerator, ParseIdError};
pub use inbound::{AttachmentDescriptor, InboundEmail};
pub use matching::{MatchOutcome, MatchStatus};
pub use prompts::PromptTaskType;
pub use review::{ReviewReason, ReviewResolution, CorrectionType};
pub use routing::{ConfidenceDimension, ConfidenceReport, RouteAction, RouteThresholds};
pub use status::{JobStatus, OutboxStatus, ReconciliationStatus};
pub use text_json::TextJson;
