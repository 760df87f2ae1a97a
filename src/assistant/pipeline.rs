//! Guidance pipeline
//!
//! Every input flows through triage (classify, extract details, pick a
//! protocol), which always produces a usable answer. The model is an
//! enrichment layered on top under a deadline: when it responds in time
//! with something valid, the answer is upgraded; when it times out,
//! errors, or was never loaded, the caller still gets the template
//! report. The model path can never make the system slower than the
//! deadline or less reliable than the templates.

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::generation::{
    chat_prompt, situation_prompt, strip_artifacts, DeadlineOutcome, DeadlineRunner,
    GeneratorConfig, SamplingParams, COORDINATOR_SYSTEM_PROMPT,
};
use crate::triage::{classify, extract_details, render_report, EmergencyCategory, SituationDetails};

use super::handle::GeneratorHandle;

/// Minimum trimmed length for model output to count as a real answer
const MIN_VALID_RESPONSE_LEN: usize = 15;

/// How the pipeline uses the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnswerMode {
    /// Templates only; the model is never consulted
    TemplateOnly,
    /// Template report, upgraded with a model preamble when one arrives in time
    #[default]
    TemplateFirst,
    /// Full model answer, with the template report as the fallback
    ModelFirst,
}

impl FromStr for AnswerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "template" | "template-only" => Ok(Self::TemplateOnly),
            "hybrid" | "template-first" => Ok(Self::TemplateFirst),
            "model" | "model-first" => Ok(Self::ModelFirst),
            other => anyhow::bail!(
                "Invalid answer mode: {}. Valid options: template, hybrid, model",
                other
            ),
        }
    }
}

/// Where the final answer text came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuidanceSource {
    /// Protocol templates only
    Template,
    /// Template report with a model preamble woven in
    Hybrid,
    /// Model output end to end
    Model,
}

impl std::fmt::Display for GuidanceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template => write!(f, "Expert Templates"),
            Self::Hybrid => write!(f, "Hybrid AI + Expert"),
            Self::Model => write!(f, "AI Model"),
        }
    }
}

/// Outcome of a model-only attempt.
///
/// For callers that surface failures to users (the web demo) instead of
/// silently falling back to templates.
#[derive(Debug, Clone)]
pub enum ModelAttempt {
    /// Valid output, artifacts stripped
    Completed(String),
    /// Output arrived but was below the validity threshold
    TooShort(String),
    /// Generation returned an error
    Errored(String),
    /// The deadline passed
    TimedOut,
    /// Too many abandoned workers still running
    Saturated,
    /// No generator available; `loading` is true while one is coming up
    NotLoaded { loading: bool },
}

/// A complete answer to one emergency description
#[derive(Debug, Clone)]
pub struct Guidance {
    /// Final response text
    pub text: String,
    /// Triage classification of the input
    pub category: EmergencyCategory,
    /// Details pulled out of the input
    pub details: SituationDetails,
    /// Wall-clock time spent producing the answer
    pub elapsed: Duration,
    /// What produced the text
    pub source: GuidanceSource,
}

/// The production pipeline: triage core + optional model enrichment
pub struct EmergencyAssistant {
    handle: Arc<GeneratorHandle>,
    runner: DeadlineRunner,
    mode: AnswerMode,
}

impl EmergencyAssistant {
    /// Default deadline for a single model call
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            handle: Arc::new(GeneratorHandle::new(config)),
            runner: DeadlineRunner::new(Self::DEFAULT_DEADLINE),
            mode: AnswerMode::default(),
        }
    }

    /// Set the answer mode
    pub fn with_mode(mut self, mode: AnswerMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the model-call deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.runner = DeadlineRunner::new(deadline);
        self
    }

    /// Cap the number of abandoned model calls still allowed to run
    pub fn with_max_outstanding(mut self, max_outstanding: usize) -> Self {
        self.runner = self.runner.with_max_outstanding(max_outstanding);
        self
    }

    pub fn mode(&self) -> AnswerMode {
        self.mode
    }

    /// The generator handle, for status reporting and warm-up control
    pub fn handle(&self) -> &Arc<GeneratorHandle> {
        &self.handle
    }

    /// Load the model now, blocking until it is ready or failed
    pub fn ensure_model(&self) -> anyhow::Result<()> {
        self.handle.ensure_ready().map(|_| ())
    }

    /// Start loading the model in the background
    pub fn warm_up(&self) {
        self.handle.begin_background_load();
    }

    /// Answer one emergency description.
    ///
    /// Never fails and never blocks past the configured deadline; the
    /// worst case is a plain template report.
    pub fn respond(&self, input: &str) -> Guidance {
        let params = match self.mode {
            AnswerMode::TemplateFirst => SamplingParams::interactive(),
            _ => SamplingParams::service(),
        };
        self.respond_with(input, params)
    }

    /// Like [`EmergencyAssistant::respond`] with explicit sampling
    /// parameters, for callers that let users pick `max_tokens`.
    pub fn respond_with(&self, input: &str, params: SamplingParams) -> Guidance {
        let start = Instant::now();
        let category = classify(input);
        let details = extract_details(input);

        let (text, source) = match self.mode {
            AnswerMode::TemplateOnly => (
                render_report(category, &details, None),
                GuidanceSource::Template,
            ),
            AnswerMode::TemplateFirst => match self.model_answer(input, params) {
                Some(preamble) => (
                    render_report(category, &details, Some(&preamble)),
                    GuidanceSource::Hybrid,
                ),
                None => (
                    render_report(category, &details, None),
                    GuidanceSource::Template,
                ),
            },
            AnswerMode::ModelFirst => match self.model_answer(input, params) {
                Some(answer) => (answer, GuidanceSource::Model),
                None => (
                    render_report(category, &details, None),
                    GuidanceSource::Template,
                ),
            },
        };

        Guidance {
            text,
            category,
            details,
            elapsed: start.elapsed(),
            source,
        }
    }

    /// Run the model under the deadline and report exactly what happened.
    ///
    /// The model is only consulted when already loaded. Loading is the
    /// caller's decision (`ensure_model` / `warm_up`), not a side effect
    /// of answering.
    pub fn try_model(&self, input: &str, params: SamplingParams) -> ModelAttempt {
        self.try_model_with_system(COORDINATOR_SYSTEM_PROMPT, input, params)
    }

    /// Like [`EmergencyAssistant::try_model`] with a caller-chosen system
    /// prompt, for the evaluation harness's coordinator persona.
    pub fn try_model_with_system(
        &self,
        system: &str,
        input: &str,
        params: SamplingParams,
    ) -> ModelAttempt {
        let Some(generator) = self.handle.generator() else {
            return ModelAttempt::NotLoaded {
                loading: self.handle.state().is_loading(),
            };
        };
        let prompt = chat_prompt(system, &situation_prompt(input));

        match self.runner.run(move || generator.generate(&prompt, &params)) {
            DeadlineOutcome::Completed(Ok(text)) => {
                let cleaned = strip_artifacts(&text);
                if cleaned.len() > MIN_VALID_RESPONSE_LEN {
                    ModelAttempt::Completed(cleaned)
                } else {
                    ModelAttempt::TooShort(cleaned)
                }
            }
            DeadlineOutcome::Completed(Err(e)) => ModelAttempt::Errored(format!("{:#}", e)),
            DeadlineOutcome::TimedOut => ModelAttempt::TimedOut,
            DeadlineOutcome::Saturated => ModelAttempt::Saturated,
        }
    }

    /// `try_model` collapsed to `Some(valid text)` / `None`, logging misses
    fn model_answer(&self, input: &str, params: SamplingParams) -> Option<String> {
        match self.try_model(input, params) {
            ModelAttempt::Completed(text) => Some(text),
            ModelAttempt::NotLoaded { .. } => None,
            ModelAttempt::TooShort(text) => {
                tracing::debug!(
                    "Model output too short to use ({} chars), falling back",
                    text.len()
                );
                None
            }
            ModelAttempt::Errored(reason) => {
                tracing::warn!("Generation failed: {}", reason);
                None
            }
            ModelAttempt::TimedOut => {
                tracing::warn!(
                    "Generation missed the {:.0?} deadline, falling back to templates",
                    self.runner.deadline()
                );
                None
            }
            ModelAttempt::Saturated => {
                tracing::warn!("Too many outstanding generation workers, falling back");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_only_assistant() -> EmergencyAssistant {
        EmergencyAssistant::new(GeneratorConfig::new("/nonexistent/model"))
            .with_mode(AnswerMode::TemplateOnly)
    }

    #[test]
    fn test_answer_mode_parsing() {
        assert_eq!(
            "template".parse::<AnswerMode>().unwrap(),
            AnswerMode::TemplateOnly
        );
        assert_eq!(
            "hybrid".parse::<AnswerMode>().unwrap(),
            AnswerMode::TemplateFirst
        );
        assert_eq!(
            "MODEL".parse::<AnswerMode>().unwrap(),
            AnswerMode::ModelFirst
        );
        assert!("fancy".parse::<AnswerMode>().is_err());
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(GuidanceSource::Template.to_string(), "Expert Templates");
        assert_eq!(GuidanceSource::Hybrid.to_string(), "Hybrid AI + Expert");
    }

    #[test]
    fn test_template_only_answers_without_model() {
        let assistant = template_only_assistant();
        let guidance =
            assistant.respond("Wildfire approaching town in 2 hours, 500 residents need evacuation");

        assert_eq!(guidance.category, EmergencyCategory::Wildfire);
        assert_eq!(guidance.source, GuidanceSource::Template);
        assert!(guidance.text.contains("WILDFIRE EVACUATION PROTOCOL"));
        assert!(guidance.text.contains("TIMEFRAME: 2 hours"));
    }

    #[test]
    fn test_model_modes_fall_back_when_model_absent() {
        // Model never loaded: hybrid and model-first must still answer
        for mode in [AnswerMode::TemplateFirst, AnswerMode::ModelFirst] {
            let assistant = EmergencyAssistant::new(GeneratorConfig::new("/nonexistent/model"))
                .with_mode(mode);
            let guidance = assistant.respond("Flash flood has trapped 50 people in school building");

            assert_eq!(guidance.source, GuidanceSource::Template);
            assert!(guidance.text.contains("FLOOD EMERGENCY RESPONSE PROTOCOL"));
        }
    }

    #[test]
    fn test_try_model_reports_not_loaded() {
        let assistant = EmergencyAssistant::new(GeneratorConfig::new("/nonexistent/model"));
        let attempt = assistant.try_model("Gas leak downtown", SamplingParams::service());
        assert!(matches!(
            attempt,
            ModelAttempt::NotLoaded { loading: false }
        ));
    }

    #[test]
    fn test_respond_is_fast_without_model() {
        let assistant = template_only_assistant();
        let guidance = assistant.respond("Earthquake damaged buildings downtown");
        assert!(guidance.elapsed < Duration::from_secs(1));
    }
}
