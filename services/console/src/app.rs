//! The console host: wires the session, mode switch, speech capture and presenter to
//! a line-based terminal and runs the event loop.

use crate::{
    command::{Command, HELP},
    dictation::{DictationHandle, KeyboardDictation},
    terminal::{Console, TerminalNotifier, TerminalRubricSurface, TerminalSurfaces},
};
use bedside_core::{
    AgentClient, AudioPlayer, CaptureState, ConversationSession, CycleOutcome, EvaluationPresenter,
    InputModeSwitch, InteractionMode, RecognitionEvent, RecognitionSettings, ScenarioCatalog,
    ScenarioOption, SessionError, SpeechCaptureController,
};
use std::{ops::ControlFlow, sync::Arc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

/// Startup choices for [`App`].
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub initial_mode: InteractionMode,
    pub speech_enabled: bool,
    pub speech: RecognitionSettings,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            initial_mode: InteractionMode::Text,
            speech_enabled: true,
            speech: RecognitionSettings::default(),
        }
    }
}

pub struct App {
    console: Console,
    session: ConversationSession,
    switch: InputModeSwitch,
    capture: SpeechCaptureController,
    dictation: DictationHandle,
    presenter: EvaluationPresenter,
    rubric: TerminalRubricSurface,
}

impl App {
    pub fn new(
        console: Console,
        catalog: ScenarioCatalog,
        agent: Arc<dyn AgentClient>,
        player: Arc<dyn AudioPlayer>,
        options: AppOptions,
    ) -> Self {
        let switch = InputModeSwitch::new(
            Box::new(TerminalSurfaces::new(console.clone())),
            options.initial_mode,
        );
        let session = ConversationSession::new(catalog, agent, switch.subscribe())
            .with_player(player)
            .with_notifier(Arc::new(TerminalNotifier::new(console.clone())));
        let (recognizer, dictation) = KeyboardDictation::new(options.speech_enabled);
        let capture = SpeechCaptureController::with_settings(Box::new(recognizer), options.speech);

        Self {
            rubric: TerminalRubricSurface::new(console.clone()),
            console,
            session,
            switch,
            capture,
            dictation,
            presenter: EvaluationPresenter::new(),
        }
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn greet(&self) {
        self.console.line("Bedside: practise breaking bad news.");
        if let Some(error) = self.session.catalog().load_error() {
            self.console.line(format!(
                "Scenarios could not be loaded ({error}); only 'Custom' is available."
            ));
        }
        self.list_scenarios();
        self.console.line("Type /help for the list of commands.");
    }

    /// Reads commands from `input` until `/quit` or end of input, then waits for
    /// outstanding replies.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> std::io::Result<()> {
        let mut lines = input.lines();
        loop {
            tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => {
                        if self.handle_line(&line).await.is_break() {
                            break;
                        }
                    }
                    None => break,
                },
                Some(outcome) = self.session.next_outcome(), if self.session.has_pending() => {
                    self.show_outcome(outcome);
                }
                Some(event) = self.capture.next_event(), if self.capture.is_listening() => {
                    self.on_recognition(event);
                }
            }
        }
        self.shutdown().await;
        Ok(())
    }

    pub async fn handle_line(&mut self, line: &str) -> ControlFlow<()> {
        let command = match Command::parse(line) {
            Ok(command) => command,
            Err(e) => {
                self.console.line(e);
                return ControlFlow::Continue(());
            }
        };
        debug!(?command, "Handling command");

        match command {
            Command::Scenarios => self.list_scenarios(),
            Command::Select(key) => {
                if let Ok(scenario) = self.session.select_scenario(&key) {
                    self.console.line(format!("Scenario: {}", scenario.description));
                }
            }
            Command::Custom(text) => {
                self.session.catalog_mut().set_custom_draft(text);
                self.console
                    .line("Custom scenario updated. Use /select Custom to start it.");
            }
            Command::Mode(mode) => self.switch.set_mode(mode, &mut self.capture),
            Command::Mic => self.toggle_microphone(),
            Command::Evaluate => self.show_evaluation().await,
            Command::History => {
                for turn in self.session.history() {
                    self.console.line(format!("{}: {}", turn.author, turn.content));
                }
            }
            Command::Help => self.console.line(HELP),
            Command::Quit => return ControlFlow::Break(()),
            Command::Say(text) => self.say(&text),
        }
        ControlFlow::Continue(())
    }

    fn list_scenarios(&self) {
        self.console.line("Scenarios:");
        for option in self.session.catalog().options() {
            match option {
                ScenarioOption::Named { key, scenario } => {
                    self.console.line(format!("  {key}: {}", scenario.description))
                }
                ScenarioOption::Custom => {
                    let draft = self.session.catalog().custom_draft();
                    if draft.trim().is_empty() {
                        self.console.line("  Custom: (set with /custom <text>)");
                    } else {
                        self.console.line(format!("  Custom: {draft}"));
                    }
                }
            }
        }
    }

    fn say(&mut self, text: &str) {
        match self.switch.mode() {
            InteractionMode::Text => {
                if let Err(e) = self.session.submit_turn(text) {
                    self.report_rejection(e);
                }
            }
            InteractionMode::Voice => {
                if !self.capture.is_listening() {
                    self.console.line(
                        "The microphone is off. Use /mic to start dictating or /mode text to type.",
                    );
                    return;
                }
                let (text, is_final) = match text.strip_prefix('~') {
                    Some(interim) => (interim, false),
                    None => (text, true),
                };
                self.dictation.dictate(text, is_final);
            }
        }
    }

    fn toggle_microphone(&mut self) {
        if self.switch.mode() != InteractionMode::Voice {
            self.console
                .line("The microphone is only available in voice mode (/mode voice).");
            return;
        }
        match self.capture.toggle() {
            Ok(CaptureState::Listening) => self.console.line("Microphone on."),
            Ok(CaptureState::Idle) => self.console.line("Microphone off."),
            Err(e) => self.console.line(format!("! {e}")),
        }
    }

    fn on_recognition(&mut self, event: RecognitionEvent) {
        let ended = event == RecognitionEvent::Ended;
        match self.capture.handle_event(event, &mut self.session) {
            Some(Ok(_)) => {
                if let Some(turn) = self.session.history().last() {
                    self.console.line(format!("{} (dictated): {}", turn.author, turn.content));
                }
            }
            Some(Err(e)) => self.report_rejection(e),
            None => {}
        }
        if ended {
            self.console.line("Microphone off.");
        }
    }

    /// Notices for missing scenarios are already shown and blank text is ignored.
    fn report_rejection(&self, error: SessionError) {
        match error {
            SessionError::NoScenarioSelected | SessionError::EmptyMessage => {}
            other => self.console.line(format!("! {other}")),
        }
    }

    fn show_outcome(&self, outcome: CycleOutcome) {
        if let CycleOutcome::Replied { turn, .. } = outcome {
            self.console.line(format!("{}: {}", turn.author, turn.content));
        }
    }

    async fn show_evaluation(&mut self) {
        let evaluation = self.session.get_evaluation();
        match self.presenter.present(evaluation, &mut self.rubric).await {
            Ok(true) => {
                if let Some(evaluation) = evaluation {
                    let (awarded, max) = evaluation.total();
                    self.console.line(format!("Total: {awarded} / {max}"));
                    if let Some(error) = evaluation.evaluator_error() {
                        self.console
                            .line(format!("The evaluator reported a problem: {error}"));
                    }
                }
            }
            Ok(false) => self
                .console
                .line("No evaluation yet. Talk to the patient first."),
            Err(e) => self.console.line(format!("! {e}")),
        }
    }

    /// Delivers utterances already dictated, stops capture and waits for every
    /// outstanding reply and its audio.
    async fn shutdown(&mut self) {
        while let Some(event) = self.capture.try_next_event() {
            self.on_recognition(event);
        }
        self.capture.stop();

        if self.session.has_pending() {
            info!(pending = self.session.pending_requests(), "Waiting for outstanding replies");
        }
        while let Some(outcome) = self.session.next_outcome().await {
            self.show_outcome(outcome);
        }
        self.session.drain_playback().await;
        info!("Session ended");
    }
}
