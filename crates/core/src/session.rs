//! Conversation Session
//!
//! [`ConversationSession`] is the single owner of the selected scenario, the
//! conversation history and the latest evaluation. Each accepted turn spawns one
//! request task; the task only reports its result over a channel, and the session
//! applies results when the host pulls them with [`ConversationSession::next_outcome`]
//! or [`ConversationSession::poll_outcomes`]. All state changes therefore happen on
//! the host's thread of control, in arrival order.
//!
//! Replies are appended in the order they arrive, which is not necessarily the order
//! the requests were made in when several are outstanding.
//!
//! Reply audio plays on tasks owned by the session; hosts await
//! [`ConversationSession::drain_playback`] before exiting so the last clip is not cut off.

use crate::{
    agent_client::{AgentClient, AgentReply, AgentRequest, TransportError},
    evaluation::EvaluationResult,
    mode::InteractionMode,
    playback::{AudioPlayer, SilentPlayer, play_payload},
    scenario::{CatalogError, Scenario, ScenarioCatalog},
    turn::{ConversationHistory, HistoryError, Turn},
};
use std::{fmt, sync::Arc};
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};

/// Identifies one request/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub(crate) u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A message that must be shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    NoScenarioSelected,
    ScenarioUnavailable { key: String, reason: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::NoScenarioSelected => {
                write!(f, "Please select a scenario before sending a message.")
            }
            Notice::ScenarioUnavailable { key, reason } => {
                write!(f, "Scenario '{key}' can't be selected: {reason}")
            }
        }
    }
}

/// Shows blocking notices to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// A [`Notifier`] that only logs.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &Notice) {
        warn!(%notice, "User notice");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("No scenario selected")]
    NoScenarioSelected,
    #[error("Message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Anything that accepts user turns; the speech controller submits through this.
pub trait TurnSink {
    fn submit_turn(&mut self, text: &str) -> Result<RequestId, SessionError>;
}

/// Whether any request/response cycle is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Pending(usize),
}

/// What applying one completed cycle did to the session.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The agent's reply was appended and its evaluation stored.
    Replied { request: RequestId, turn: Turn },
    /// The cycle failed; nothing was appended.
    Failed {
        request: RequestId,
        error: TransportError,
    },
    /// The reply belonged to an earlier scenario selection and was dropped.
    Discarded { request: RequestId },
}

struct CycleResult {
    request: RequestId,
    epoch: u64,
    result: Result<AgentReply, TransportError>,
}

pub struct ConversationSession {
    catalog: ScenarioCatalog,
    agent: Arc<dyn AgentClient>,
    player: Arc<dyn AudioPlayer>,
    notifier: Arc<dyn Notifier>,
    mode: watch::Receiver<InteractionMode>,
    selected: Option<(String, Scenario)>,
    history: ConversationHistory,
    evaluation: Option<EvaluationResult>,
    epoch: u64,
    next_request: u64,
    in_flight: usize,
    results_tx: mpsc::UnboundedSender<CycleResult>,
    results_rx: mpsc::UnboundedReceiver<CycleResult>,
    playback: JoinSet<()>,
}

impl ConversationSession {
    /// Creates a session with no scenario selected.
    ///
    /// `mode` is read each time a request is built, normally from
    /// [`crate::mode::InputModeSwitch::subscribe`].
    pub fn new(
        catalog: ScenarioCatalog,
        agent: Arc<dyn AgentClient>,
        mode: watch::Receiver<InteractionMode>,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Self {
            catalog,
            agent,
            player: Arc::new(SilentPlayer),
            notifier: Arc::new(LogNotifier),
            mode,
            selected: None,
            history: ConversationHistory::new(),
            evaluation: None,
            epoch: 0,
            next_request: 0,
            in_flight: 0,
            results_tx,
            results_rx,
            playback: JoinSet::new(),
        }
    }

    pub fn with_player(mut self, player: Arc<dyn AudioPlayer>) -> Self {
        self.player = player;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    /// Gives access to the custom scenario draft.
    pub fn catalog_mut(&mut self) -> &mut ScenarioCatalog {
        &mut self.catalog
    }

    pub fn scenario(&self) -> Option<&Scenario> {
        self.selected.as_ref().map(|(_, scenario)| scenario)
    }

    pub fn scenario_key(&self) -> Option<&str> {
        self.selected.as_ref().map(|(key, _)| key.as_str())
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn mode(&self) -> InteractionMode {
        *self.mode.borrow()
    }

    /// The evaluation that came with the latest reply, if any.
    pub fn get_evaluation(&self) -> Option<&EvaluationResult> {
        self.evaluation.as_ref()
    }

    pub fn pending_requests(&self) -> usize {
        self.in_flight
    }

    pub fn has_pending(&self) -> bool {
        self.in_flight > 0
    }

    pub fn cycle_state(&self) -> CycleState {
        match self.in_flight {
            0 => CycleState::Idle,
            n => CycleState::Pending(n),
        }
    }

    /// Selects a scenario and starts a fresh conversation for it.
    ///
    /// On failure nothing changes and the user is notified.
    pub fn select_scenario(&mut self, key: &str) -> Result<&Scenario, SessionError> {
        let scenario = match self.catalog.resolve(key) {
            Ok(scenario) => scenario,
            Err(e) => {
                warn!(scenario = %key, error = %e, "Scenario selection failed");
                self.notifier.notify(&Notice::ScenarioUnavailable {
                    key: key.to_string(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        self.history.clear();
        self.evaluation = None;
        self.epoch += 1;
        if self.in_flight > 0 {
            debug!(
                outstanding = self.in_flight,
                "Replies still outstanding for the previous scenario will be discarded"
            );
        }
        info!(scenario = %key, "Scenario selected");

        let (_, scenario) = self.selected.insert((key.to_string(), scenario));
        Ok(scenario)
    }

    /// Appends a human turn and sends the conversation to the agent.
    ///
    /// Must be called from within a tokio runtime; the request runs on its own task.
    pub fn submit_turn(&mut self, text: &str) -> Result<RequestId, SessionError> {
        let Some((key, scenario)) = &self.selected else {
            warn!("Message submitted with no scenario selected");
            self.notifier.notify(&Notice::NoScenarioSelected);
            return Err(SessionError::NoScenarioSelected);
        };
        let message = text.trim();
        if message.is_empty() {
            debug!("Ignoring empty message");
            return Err(SessionError::EmptyMessage);
        }

        let mode = *self.mode.borrow();
        let scenario_key = key.clone();
        let scenario = scenario.clone();
        let mut history = self.history.clone();
        history.push(Turn::human(message));
        let request = AgentRequest::new(message, &history, scenario, mode)?;
        self.history = history;

        self.next_request += 1;
        let id = RequestId(self.next_request);
        let epoch = self.epoch;
        let agent = self.agent.clone();
        let results_tx = self.results_tx.clone();
        self.in_flight += 1;
        info!(
            request_id = %id,
            scenario = %scenario_key,
            %mode,
            turns = self.history.len(),
            "Sending turn to agent"
        );

        tokio::spawn(async move {
            let result = agent.exchange(request).await;
            // The receiver lives as long as the session.
            let _ = results_tx.send(CycleResult {
                request: id,
                epoch,
                result,
            });
        });

        Ok(id)
    }

    /// Waits for the next completed cycle and applies it.
    ///
    /// Returns `None` immediately when nothing is outstanding. Cancel-safe, so it can
    /// be used as a `tokio::select!` branch.
    pub async fn next_outcome(&mut self) -> Option<CycleOutcome> {
        if self.in_flight == 0 {
            return None;
        }
        let completed = self.results_rx.recv().await?;
        Some(self.apply(completed))
    }

    /// Applies every cycle that has already completed, without waiting.
    pub fn poll_outcomes(&mut self) -> Vec<CycleOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(completed) = self.results_rx.try_recv() {
            outcomes.push(self.apply(completed));
        }
        outcomes
    }

    /// Number of reply clips still playing.
    pub fn pending_playback(&self) -> usize {
        self.playback.len()
    }

    /// Waits until every reply clip handed to the player has finished.
    pub async fn drain_playback(&mut self) {
        while let Some(joined) = self.playback.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Audio playback task failed");
            }
        }
    }

    fn apply(&mut self, completed: CycleResult) -> CycleOutcome {
        self.in_flight = self.in_flight.saturating_sub(1);
        let CycleResult {
            request,
            epoch,
            result,
        } = completed;

        if epoch != self.epoch {
            info!(request_id = %request, "Discarding reply for a previous scenario selection");
            return CycleOutcome::Discarded { request };
        }

        match result {
            Ok(reply) => {
                let turn = Turn::agent(reply.response);
                self.history.push(turn.clone());
                self.evaluation = reply.world_state;
                if let Some(error) = self.evaluation.as_ref().and_then(|e| e.evaluator_error()) {
                    warn!(
                        request_id = %request,
                        %error,
                        "Agent could not evaluate the conversation"
                    );
                }
                while self.playback.try_join_next().is_some() {}
                if let Some(audio) = reply.audio {
                    self.playback.spawn(play_payload(self.player.clone(), audio));
                }
                info!(request_id = %request, turns = self.history.len(), "Agent replied");
                CycleOutcome::Replied { request, turn }
            }
            Err(error) => {
                error!(request_id = %request, error = %error, "Error exchanging turn with agent");
                CycleOutcome::Failed { request, error }
            }
        }
    }
}

impl TurnSink for ConversationSession {
    fn submit_turn(&mut self, text: &str) -> Result<RequestId, SessionError> {
        ConversationSession::submit_turn(self, text)
    }
}
