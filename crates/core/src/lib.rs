//! Session orchestration for simulated bad-news consultations.
//!
//! The crate is independent of any UI: hosts provide the capture surfaces, speech
//! recognizer, rubric surface and audio player through the traits defined here.

pub mod agent_client;
pub mod evaluation;
pub mod mode;
pub mod playback;
pub mod presenter;
pub mod scenario;
pub mod session;
pub mod speech;
pub mod turn;

pub use agent_client::{AgentClient, AgentReply, AgentRequest, HttpAgentClient, TransportError};
pub use evaluation::{Criterion, EvaluationResult, Section};
pub use mode::{CaptureSurfaces, InputModeSwitch, InteractionMode};
pub use playback::{AudioClip, AudioPlayer, PlaybackError, SilentPlayer};
pub use presenter::{EvaluationPresenter, RubricRow, RubricSurface, SurfaceError};
pub use scenario::{CatalogError, Scenario, ScenarioCatalog, ScenarioOption, ScenarioSource};
pub use session::{
    ConversationSession, CycleOutcome, CycleState, Notice, Notifier, RequestId, SessionError,
    TurnSink,
};
pub use speech::{
    CaptureError, CaptureState, RecognitionEvent, RecognitionSettings, SpeechCaptureController,
    SpeechRecognizer,
};
pub use turn::{Author, ConversationHistory, HistoryError, Turn};
