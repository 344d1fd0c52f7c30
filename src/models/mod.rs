pub mod activity;
pub mod lead;
pub mod pipeline;
pub mod settings;

pub use activity::{ActivityType, LeadActivity};
pub use lead::{Lead, LeadFilter, LeadPatch, LeadSource, LeadStatus, NewLead, Priority};
pub use pipeline::{NewStage, Pipeline, PipelineStage, StageColor};
pub use settings::{LeadSettings, LossReason, SettingsPatch};
