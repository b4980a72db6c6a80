use crate::evaluation::{Criterion, EvaluationResult, Section};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("Rubric surface closed before it became ready")]
    Closed,
}

/// Where rubric scores are shown: one named slot per criterion.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RubricSurface: Send {
    fn is_ready(&self) -> bool;

    /// Resolves once the surface can accept values.
    async fn ready(&mut self) -> Result<(), SurfaceError>;

    /// Writes `value` into the slot named after a criterion key.
    fn set_slot(&mut self, name: &str, value: &str);
}

/// One rendered rubric line.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricRow {
    pub section: Section,
    pub criterion: Criterion,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct EvaluationPresenter;

impl EvaluationPresenter {
    pub fn new() -> Self {
        Self
    }

    /// All criteria in canonical order, grouped by section.
    pub fn render(&self, result: &EvaluationResult) -> Vec<RubricRow> {
        Section::ALL
            .into_iter()
            .flat_map(|section| {
                section.criteria().map(move |criterion| RubricRow {
                    section,
                    criterion,
                    text: result.slot_text(criterion),
                })
            })
            .collect()
    }

    /// Fills every slot of `surface` from `result`, waiting for the surface first.
    ///
    /// Returns `Ok(false)` without touching the surface when there is no result yet.
    pub async fn present(
        &self,
        result: Option<&EvaluationResult>,
        surface: &mut dyn RubricSurface,
    ) -> Result<bool, SurfaceError> {
        let Some(result) = result else {
            debug!("No evaluation to present yet");
            return Ok(false);
        };

        if !surface.is_ready() {
            debug!("Waiting for rubric surface");
            surface.ready().await?;
        }

        for row in self.render(result) {
            surface.set_slot(row.criterion.key(), &row.text);
        }
        let (awarded, max) = result.total();
        info!(awarded, max, "Presented evaluation");
        Ok(true)
    }
}
