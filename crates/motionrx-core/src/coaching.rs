//! Coaching payload assembly.
//!
//! Turns the failing deviation records of a recorded attempt into the request
//! handed to the external coaching generator and text-to-speech services.
//! Passing and unmeasured metrics are left out. When nothing failed, the
//! request carries an explicit `all_targets_met` marker instead of an empty
//! list so the generator can pick a congratulatory template.

use serde::{Deserialize, Serialize};

use crate::attempt::ProgressEvent;
use crate::evaluator::{DeviationRecord, Target};

/// One unmet threshold, as described to the coaching generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingEntry {
    pub metric: String,
    pub target: Target,
    pub actual: f64,
    pub unit: String,
    pub coaching_prompt: String,
    pub delta: f64,
}

/// Request for the external coaching generator.
///
/// Identifies the patient only through the prescription id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingRequest {
    pub prescription_id: String,
    pub attempt_id: String,
    /// Failing metrics in submission order
    pub patient_state: Vec<CoachingEntry>,
    pub all_targets_met: bool,
    pub language: String,
    pub audio: bool,
}

impl CoachingRequest {
    pub fn from_records(
        prescription_id: &str,
        attempt_id: &str,
        records: &[DeviationRecord],
        language: &str,
        audio: bool,
    ) -> Self {
        let patient_state: Vec<CoachingEntry> = records
            .iter()
            .filter(|r| r.is_failing())
            .filter_map(|r| {
                Some(CoachingEntry {
                    metric: r.metric.clone(),
                    target: r.target?,
                    actual: r.actual,
                    unit: r.unit.clone(),
                    coaching_prompt: r.coaching_prompt.clone()?,
                    delta: r.delta,
                })
            })
            .collect();

        Self {
            prescription_id: prescription_id.to_string(),
            attempt_id: attempt_id.to_string(),
            all_targets_met: patient_state.is_empty(),
            patient_state,
            language: language.to_string(),
            audio,
        }
    }

    pub fn for_event(event: &ProgressEvent, language: &str, audio: bool) -> Self {
        Self::from_records(
            &event.prescription_id,
            &event.attempt_id,
            &event.deviations,
            language,
            audio,
        )
    }
}

/// A plain-language feedback line, used when the generator is unavailable
/// and as its fallback text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Language {
    English,
    Korean,
}

impl Language {
    fn from_code(code: &str) -> Self {
        let primary = code.split(|c: char| c == '-' || c == '_').next().unwrap_or_default();
        if primary.eq_ignore_ascii_case("ko") {
            Language::Korean
        } else {
            Language::English
        }
    }
}

/// Render localized feedback for a request. Unknown languages fall back to English.
pub fn feedback_lines(request: &CoachingRequest) -> Vec<FeedbackLine> {
    let language = Language::from_code(&request.language);

    if request.all_targets_met {
        let message = match language {
            Language::English => "All targets met. Great work!",
            Language::Korean => "모든 목표를 달성했습니다. 잘하셨어요!",
        };
        return vec![FeedbackLine {
            metric: None,
            message: message.to_string(),
        }];
    }

    request
        .patient_state
        .iter()
        .map(|entry| {
            let gap = entry.delta.abs();
            let unit = &entry.unit;
            let mut message = match language {
                Language::English => {
                    format!("{} Currently {:.1}{unit}.", entry.coaching_prompt, entry.actual)
                }
                Language::Korean => {
                    format!("{} 현재 {:.1}{unit}.", entry.coaching_prompt, entry.actual)
                }
            };
            if gap > 0.0 {
                match language {
                    Language::English => message.push_str(&format!(" {gap:.1}{unit} to go.")),
                    Language::Korean => {
                        message.push_str(&format!(" 목표까지 {gap:.1}{unit} 남았습니다."))
                    }
                }
            }
            FeedbackLine {
                metric: Some(entry.metric.clone()),
                message,
            }
        })
        .collect()
}
