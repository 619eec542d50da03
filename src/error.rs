//! Error taxonomy shared by the compiler, canvas, renderer, playback and task
//! tracker.

use crate::render_engine::RenderReport;

#[derive(Debug, Clone)]
pub enum ShowError {
    /// ActionModel or catalog lookup referenced an unknown fixture
    FixtureNotFound(String),
    /// Unknown action type, unknown/missing parameter, wrong parameter type
    InvalidAction {
        fixture_id: String,
        action_type: String,
        reason: String,
    },
    /// Parameter value outside its declared range
    ParameterOutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },
    /// Same (fixture_id, action_type, start_time) already in the sheet
    DuplicateAction {
        fixture_id: String,
        action_type: String,
        start_time: f64,
    },
    ActionNotFound {
        fixture_id: String,
        action_type: String,
        start_time: f64,
    },
    /// Paint outside `[0, duration]` of the canvas
    OutOfBounds { start: f64, end: f64, duration: f64 },
    /// Render committed, but some actions were skipped
    RenderPartialFailure(Box<RenderReport>),
    TransportFailure(String),
    TaskFailure { task_id: String, message: String },
    TaskNotFound(String),
    InvalidCommand(String),
    Io(String),
    Serialization(String),
}

impl ShowError {
    /// Stable identifier for control-surface responses.
    pub fn kind(&self) -> &'static str {
        match self {
            ShowError::FixtureNotFound(_) => "FixtureNotFound",
            ShowError::InvalidAction { .. } => "InvalidAction",
            ShowError::ParameterOutOfRange { .. } => "ParameterOutOfRange",
            ShowError::DuplicateAction { .. } => "DuplicateAction",
            ShowError::ActionNotFound { .. } => "ActionNotFound",
            ShowError::OutOfBounds { .. } => "OutOfBounds",
            ShowError::RenderPartialFailure(_) => "RenderPartialFailure",
            ShowError::TransportFailure(_) => "TransportFailure",
            ShowError::TaskFailure { .. } => "TaskFailure",
            ShowError::TaskNotFound(_) => "TaskNotFound",
            ShowError::InvalidCommand(_) => "InvalidCommand",
            ShowError::Io(_) => "Io",
            ShowError::Serialization(_) => "Serialization",
        }
    }

    pub(crate) fn invalid_action(
        fixture_id: &str,
        action_type: &str,
        reason: impl Into<String>,
    ) -> Self {
        ShowError::InvalidAction {
            fixture_id: fixture_id.to_string(),
            action_type: action_type.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ShowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShowError::FixtureNotFound(id) => write!(f, "Fixture '{}' not found", id),
            ShowError::InvalidAction {
                fixture_id,
                action_type,
                reason,
            } => write!(
                f,
                "Invalid action '{}' on fixture '{}': {}",
                action_type, fixture_id, reason
            ),
            ShowError::ParameterOutOfRange {
                name,
                value,
                min,
                max,
            } => write!(
                f,
                "Parameter '{}' = {} is outside [{}, {}]",
                name, value, min, max
            ),
            ShowError::DuplicateAction {
                fixture_id,
                action_type,
                start_time,
            } => write!(
                f,
                "Action '{}' on fixture '{}' at {:.3}s already exists",
                action_type, fixture_id, start_time
            ),
            ShowError::ActionNotFound {
                fixture_id,
                action_type,
                start_time,
            } => write!(
                f,
                "No action '{}' on fixture '{}' at {:.3}s",
                action_type, fixture_id, start_time
            ),
            ShowError::OutOfBounds {
                start,
                end,
                duration,
            } => write!(
                f,
                "Paint window [{:.3}, {:.3}] lies outside canvas [0, {:.3}]",
                start, end, duration
            ),
            ShowError::RenderPartialFailure(report) => write!(
                f,
                "Render committed {} action(s), {} failed",
                report.rendered,
                report.failures.len()
            ),
            ShowError::TransportFailure(msg) => write!(f, "Frame transport failed: {}", msg),
            ShowError::TaskFailure { task_id, message } => {
                write!(f, "Task {} failed: {}", task_id, message)
            }
            ShowError::TaskNotFound(id) => write!(f, "Task {} not found", id),
            ShowError::InvalidCommand(msg) => write!(f, "Invalid command: {}", msg),
            ShowError::Io(msg) => write!(f, "I/O error: {}", msg),
            ShowError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for ShowError {}

impl From<std::io::Error> for ShowError {
    fn from(e: std::io::Error) -> Self {
        ShowError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ShowError {
    fn from(e: serde_json::Error) -> Self {
        ShowError::Serialization(e.to_string())
    }
}

pub type ShowResult<T> = Result<T, ShowError>;
