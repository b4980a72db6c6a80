//! Rubric Evaluation
//!
//! The rubric is fixed: 24 criteria grouped into 6 sections. The agent returns its
//! scores as a loosely typed `world_state` object alongside every reply; this module
//! turns that object into an [`EvaluationResult`] keyed by [`Criterion`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// The thematic sections of the rubric, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    ProfessionalIntroduction,
    RapportAndSharingNews,
    UnderstandingAndDeliveringNews,
    CommunicationTechniques,
    InformationDelivery,
    ConcludingTheConsultation,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::ProfessionalIntroduction,
        Section::RapportAndSharingNews,
        Section::UnderstandingAndDeliveringNews,
        Section::CommunicationTechniques,
        Section::InformationDelivery,
        Section::ConcludingTheConsultation,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Section::ProfessionalIntroduction => "Professional Introduction",
            Section::RapportAndSharingNews => "Building Rapport and Sharing News",
            Section::UnderstandingAndDeliveringNews => {
                "Understanding the Situation and Delivering News"
            }
            Section::CommunicationTechniques => "Communication Techniques",
            Section::InformationDelivery => "Information Delivery",
            Section::ConcludingTheConsultation => "Concluding the Consultation",
        }
    }

    /// Criteria of this section in canonical order.
    pub fn criteria(self) -> impl Iterator<Item = Criterion> {
        Criterion::ALL.into_iter().filter(move |c| c.section() == self)
    }

    pub fn max_points(self) -> u32 {
        self.criteria().map(Criterion::max_points).sum()
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// One scored rubric item. Declaration order is the canonical display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Criterion {
    IntroducesSelfWithFullNameAndRole,
    EstablishesRapportWithOpenEndedQuestion,
    ConfirmsPatientUnderstandingOfSituation,
    SecuresPatientConsentAndProvidesSummary,
    InquiresIfPatientWantsCompanionPresent,
    ProvidesWarningBeforeSharingBadNews,
    EffectivelyCommunicatesBadNews,
    UsesPausesToAllowProcessing,
    AddressesPatientEmotionsAndConcerns,
    DeterminesPatientWantsToKnow,
    OffersReassuranceWithoutFalseHope,
    DemonstratesEmpathy,
    AvoidsMedicalJargon,
    ActivelyListensAndRespondsToCues,
    ClearlyExplainsDiagnosisAndPrognosis,
    DiscussesReferralAndFurtherInvestigations,
    OutlinesTreatmentOptions,
    EncouragesDiscussionWithFamily,
    OffersCounselingAsAppropriate,
    SchedulesFollowUpAndProvidesInfo,
    InvitesQuestionsAndProvidesContact,
    SummarizesDiscussionAndConfirmsUnderstanding,
    EnsuresPatientIsReadyAndSafeToLeave,
    MaintainsStructuredApproach,
}

impl Criterion {
    pub const ALL: [Criterion; 24] = [
        Criterion::IntroducesSelfWithFullNameAndRole,
        Criterion::EstablishesRapportWithOpenEndedQuestion,
        Criterion::ConfirmsPatientUnderstandingOfSituation,
        Criterion::SecuresPatientConsentAndProvidesSummary,
        Criterion::InquiresIfPatientWantsCompanionPresent,
        Criterion::ProvidesWarningBeforeSharingBadNews,
        Criterion::EffectivelyCommunicatesBadNews,
        Criterion::UsesPausesToAllowProcessing,
        Criterion::AddressesPatientEmotionsAndConcerns,
        Criterion::DeterminesPatientWantsToKnow,
        Criterion::OffersReassuranceWithoutFalseHope,
        Criterion::DemonstratesEmpathy,
        Criterion::AvoidsMedicalJargon,
        Criterion::ActivelyListensAndRespondsToCues,
        Criterion::ClearlyExplainsDiagnosisAndPrognosis,
        Criterion::DiscussesReferralAndFurtherInvestigations,
        Criterion::OutlinesTreatmentOptions,
        Criterion::EncouragesDiscussionWithFamily,
        Criterion::OffersCounselingAsAppropriate,
        Criterion::SchedulesFollowUpAndProvidesInfo,
        Criterion::InvitesQuestionsAndProvidesContact,
        Criterion::SummarizesDiscussionAndConfirmsUnderstanding,
        Criterion::EnsuresPatientIsReadyAndSafeToLeave,
        Criterion::MaintainsStructuredApproach,
    ];

    /// `(wire key, max points, section)`
    fn definition(self) -> (&'static str, u32, Section) {
        use Criterion::*;
        use Section::*;
        match self {
            IntroducesSelfWithFullNameAndRole => (
                "introducesSelfWithFullNameAndRole",
                1,
                ProfessionalIntroduction,
            ),
            EstablishesRapportWithOpenEndedQuestion => (
                "establishesRapportWithOpenEndedQuestion",
                2,
                RapportAndSharingNews,
            ),
            ConfirmsPatientUnderstandingOfSituation => (
                "confirmsPatientUnderstandingOfSituation",
                1,
                UnderstandingAndDeliveringNews,
            ),
            SecuresPatientConsentAndProvidesSummary => (
                "securesPatientConsentAndProvidesSummary",
                2,
                UnderstandingAndDeliveringNews,
            ),
            InquiresIfPatientWantsCompanionPresent => (
                "inquiresIfPatientWantsCompanionPresent",
                1,
                UnderstandingAndDeliveringNews,
            ),
            ProvidesWarningBeforeSharingBadNews => (
                "providesWarningBeforeSharingBadNews",
                1,
                UnderstandingAndDeliveringNews,
            ),
            EffectivelyCommunicatesBadNews => (
                "effectivelyCommunicatesBadNews",
                2,
                UnderstandingAndDeliveringNews,
            ),
            UsesPausesToAllowProcessing => (
                "usesPausesToAllowProcessing",
                2,
                UnderstandingAndDeliveringNews,
            ),
            AddressesPatientEmotionsAndConcerns => (
                "addressesPatientEmotionsAndConcerns",
                2,
                CommunicationTechniques,
            ),
            DeterminesPatientWantsToKnow => (
                "determinesPatientWantsToKnow",
                2,
                CommunicationTechniques,
            ),
            OffersReassuranceWithoutFalseHope => (
                "offersReassuranceWithoutFalseHope",
                2,
                CommunicationTechniques,
            ),
            DemonstratesEmpathy => ("demonstratesEmpathy", 1, CommunicationTechniques),
            AvoidsMedicalJargon => ("avoidsMedicalJargon", 1, CommunicationTechniques),
            ActivelyListensAndRespondsToCues => (
                "activelyListensAndRespondsToCues",
                1,
                CommunicationTechniques,
            ),
            ClearlyExplainsDiagnosisAndPrognosis => (
                "clearlyExplainsDiagnosisAndPrognosis",
                2,
                InformationDelivery,
            ),
            DiscussesReferralAndFurtherInvestigations => (
                "discussesReferralAndFurtherInvestigations",
                2,
                InformationDelivery,
            ),
            OutlinesTreatmentOptions => ("outlinesTreatmentOptions", 2, InformationDelivery),
            EncouragesDiscussionWithFamily => (
                "encouragesDiscussionWithFamily",
                1,
                InformationDelivery,
            ),
            OffersCounselingAsAppropriate => (
                "offersCounselingAsAppropriate",
                1,
                InformationDelivery,
            ),
            SchedulesFollowUpAndProvidesInfo => (
                "schedulesFollowUpAndProvidesInfo",
                2,
                InformationDelivery,
            ),
            InvitesQuestionsAndProvidesContact => (
                "invitesQuestionsAndProvidesContact",
                2,
                ConcludingTheConsultation,
            ),
            SummarizesDiscussionAndConfirmsUnderstanding => (
                "summarizesDiscussionAndConfirmsUnderstanding",
                2,
                ConcludingTheConsultation,
            ),
            EnsuresPatientIsReadyAndSafeToLeave => (
                "ensuresPatientIsReadyAndSafeToLeave",
                1,
                ConcludingTheConsultation,
            ),
            MaintainsStructuredApproach => (
                "maintainsStructuredApproach",
                1,
                ConcludingTheConsultation,
            ),
        }
    }

    /// The key used in `world_state` and as the rubric slot name.
    pub fn key(self) -> &'static str {
        self.definition().0
    }

    pub fn max_points(self) -> u32 {
        self.definition().1
    }

    pub fn section(self) -> Section {
        self.definition().2
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Scores awarded by the agent's evaluator for the conversation so far.
///
/// Decoding is lenient: numbers and numeric strings are accepted, keys outside the
/// rubric are ignored and an `"error"` entry is kept as [`Self::evaluator_error`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct EvaluationResult {
    scores: BTreeMap<Criterion, f64>,
    evaluator_error: Option<String>,
}

impl EvaluationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(mut self, criterion: Criterion, awarded: f64) -> Self {
        self.scores.insert(criterion, awarded);
        self
    }

    pub fn score(&self, criterion: Criterion) -> Option<f64> {
        self.scores.get(&criterion).copied()
    }

    pub fn evaluator_error(&self) -> Option<&str> {
        self.evaluator_error.as_deref()
    }

    /// True when every criterion of the rubric has a score.
    pub fn is_complete(&self) -> bool {
        self.scores.len() == Criterion::ALL.len()
    }

    /// `(awarded, max)` for one section; unscored criteria count as zero.
    pub fn section_total(&self, section: Section) -> (f64, u32) {
        let awarded = section
            .criteria()
            .filter_map(|c| self.score(c))
            .sum::<f64>();
        (awarded, section.max_points())
    }

    /// `(awarded, max)` over the whole rubric.
    pub fn total(&self) -> (f64, u32) {
        Section::ALL
            .into_iter()
            .map(|s| self.section_total(s))
            .fold((0.0, 0), |(a, m), (sa, sm)| (a + sa, m + sm))
    }

    /// The `"<awarded> / <max>"` text shown in a rubric slot.
    pub fn slot_text(&self, criterion: Criterion) -> String {
        match self.score(criterion) {
            Some(awarded) => format!("{} / {}", awarded, criterion.max_points()),
            None => format!("- / {}", criterion.max_points()),
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    let awarded = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    awarded.filter(|v| v.is_finite())
}

impl EvaluationResult {
    /// Builds a result from whatever the agent sent as `world_state`.
    ///
    /// `null` means no evaluation. Anything other than an object is kept as an
    /// evaluator error so the reply it came with is not lost.
    pub fn from_world_state(world_state: Value) -> Option<Self> {
        match world_state {
            Value::Null => None,
            Value::Object(map) => Some(map.into()),
            other => {
                warn!(world_state = %other, "Agent sent a world_state that is not an object");
                Some(EvaluationResult {
                    evaluator_error: Some(format!("unexpected evaluation payload: {other}")),
                    ..EvaluationResult::default()
                })
            }
        }
    }
}

/// `deserialize_with` helper for optional `world_state` fields.
pub(crate) fn deserialize_world_state<'de, D>(
    deserializer: D,
) -> Result<Option<EvaluationResult>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(EvaluationResult::from_world_state))
}

impl From<Map<String, Value>> for EvaluationResult {
    fn from(world_state: Map<String, Value>) -> Self {
        let mut result = EvaluationResult::default();
        for (key, value) in world_state {
            if key == "error" {
                result.evaluator_error = Some(match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
                continue;
            }
            match (Criterion::from_key(&key), numeric(&value)) {
                (Some(criterion), Some(awarded)) => {
                    result.scores.insert(criterion, awarded);
                }
                (Some(_), None) => debug!(criterion = %key, %value, "Ignoring non-numeric score"),
                (None, _) => debug!(key = %key, "Ignoring unknown world_state key"),
            }
        }
        result
    }
}

impl From<EvaluationResult> for Map<String, Value> {
    fn from(result: EvaluationResult) -> Self {
        let mut map: Map<String, Value> = result
            .scores
            .into_iter()
            .map(|(c, awarded)| (c.key().to_string(), Value::from(awarded)))
            .collect();
        if let Some(error) = result.evaluator_error {
            map.insert("error".to_string(), Value::from(error));
        }
        map
    }
}
