//! Turn-taking interview session.
//!
//! An agent actor asks questions, a user actor captures answers, and the
//! orchestrator advances through the question queue under a session clock.
//! The actors share a turn table guarded by a single lock and talk through
//! signal bridges, so they can run on separate threads and runtimes.

pub mod actor;
pub mod agent;
pub mod bridge;
pub mod capture;
pub mod orchestrator;
pub mod pool;
pub mod record;
pub mod state;
pub mod table;
pub mod task;
pub mod user;

pub use actor::{ActorHandle, ActorMode, spawn_actor};
pub use agent::AgentActor;
pub use bridge::{BridgeReceiver, BridgeSender, signal_bridge};
pub use capture::{CaptureConfig, CaptureOutcome, PauseCapture, PauseDetector, Utterance};
pub use orchestrator::{
    Collaborators, SessionConfig, SessionEnd, SessionOrchestrator, SessionOutcome, SessionSink,
};
pub use pool::{PoolHandle, WorkerPool};
pub use record::{
    InterviewFile, JsonSessionStore, QuestionRecord, QuestionSpec, SessionRecord, SessionStore,
    session_path,
};
pub use state::{TaskStatus, TurnEvent, TurnSignal, TurnState, transition};
pub use table::{SharedTable, TurnTable};
pub use task::{Task, TaskQueue};
pub use user::UserActor;
