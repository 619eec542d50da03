pub mod artnet;
pub mod canvas;
pub mod clock;
pub mod commands;
pub mod compiler;
pub mod error;
pub mod events;
pub mod fixtures;
pub mod models;
pub mod playback;
pub mod render_engine;
pub mod runtime;
pub mod settings;
pub mod sheet;
pub mod tasks;
pub mod transport;

pub use canvas::{CanvasHandle, TimelineCanvas};
pub use compiler::{ActionCompiler, CompileOptions, CompiledAction};
pub use error::{ShowError, ShowResult};
pub use fixtures::catalog::FixtureCatalog;
pub use models::actions::{ActionKey, ActionModel, ParamValue};
pub use models::universe::{DmxFrame, UNIVERSE_SIZE};
pub use playback::{PlaybackEngine, TickOutcome};
pub use render_engine::{RenderEngine, RenderReport};
pub use runtime::ShowRuntime;
pub use sheet::ActionsSheet;
pub use tasks::TaskTracker;
