// Search orchestration: result-event model, module contract, and the
// per-channel orchestrator that runs modules under cancellation tokens.

mod emitter;
mod error;
mod module;
mod orchestrator;
mod sink;
mod types;

pub use emitter::Emitter;
pub use error::{ModuleError, ModuleResult};
pub use module::{ModuleInfo, ModuleRegistry, SearchModule};
pub use orchestrator::{Orchestrator, OrchestratorConfig, DEFAULT_ACK_TIMEOUT};
pub use sink::{ChannelSink, ResultSink};
pub use types::{ErrorKind, ResultEvent, SearchEvent};
