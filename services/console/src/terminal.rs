//! Terminal implementations of the host-side collaborators: notices, capture
//! surfaces and the rubric surface all write to a [`Console`].

use async_trait::async_trait;
use bedside_core::{
    CaptureSurfaces, Criterion, InteractionMode, Notice, Notifier, RubricSurface, Section,
    SurfaceError,
};
use std::{
    fmt::Display,
    sync::{Arc, Mutex},
};

/// Line-oriented user-facing output. Logs go to stderr; this goes to stdout.
#[derive(Clone, Default)]
pub struct Console {
    captured: Option<Arc<Mutex<Vec<String>>>>,
}

impl Console {
    pub fn stdout() -> Self {
        Self { captured: None }
    }

    /// A console that keeps its lines in memory instead of printing them.
    pub fn captured() -> Self {
        Self {
            captured: Some(Arc::default()),
        }
    }

    pub fn line(&self, text: impl Display) {
        match &self.captured {
            Some(lines) => lines
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(text.to_string()),
            None => println!("{text}"),
        }
    }

    /// Lines written so far by a captured console.
    pub fn lines(&self) -> Vec<String> {
        self.captured
            .as_ref()
            .map(|lines| {
                lines
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone()
            })
            .unwrap_or_default()
    }
}

pub struct TerminalNotifier {
    console: Console,
}

impl TerminalNotifier {
    pub fn new(console: Console) -> Self {
        Self { console }
    }
}

impl Notifier for TerminalNotifier {
    fn notify(&self, notice: &Notice) {
        self.console.line(format!("! {notice}"));
    }
}

/// The text prompt and the microphone control. Only one is offered at a time.
pub struct TerminalSurfaces {
    console: Console,
}

impl TerminalSurfaces {
    pub fn new(console: Console) -> Self {
        Self { console }
    }
}

impl CaptureSurfaces for TerminalSurfaces {
    fn activate(&mut self, mode: InteractionMode) {
        match mode {
            InteractionMode::Text => self.console.line("[text mode] Type your message."),
            InteractionMode::Voice => self
                .console
                .line("[voice mode] Use /mic to turn the microphone on or off."),
        }
    }
}

/// Prints the rubric as it is filled, one header per section.
pub struct TerminalRubricSurface {
    console: Console,
    current_section: Option<Section>,
}

impl TerminalRubricSurface {
    pub fn new(console: Console) -> Self {
        Self {
            console,
            current_section: None,
        }
    }
}

#[async_trait]
impl RubricSurface for TerminalRubricSurface {
    fn is_ready(&self) -> bool {
        true
    }

    async fn ready(&mut self) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn set_slot(&mut self, name: &str, value: &str) {
        let Some(criterion) = Criterion::from_key(name) else {
            self.console.line(format!("  {name:<46} {value}"));
            return;
        };
        let section = criterion.section();
        if self.current_section != Some(section) {
            self.current_section = Some(section);
            self.console
                .line(format!("{} ({} pts)", section.title(), section.max_points()));
        }
        self.console.line(format!("  {name:<46} {value}"));
    }
}
