//! Natural-language answers about a scored patient.
//!
//! [`Explainer`] asks a `TextGenerator` first and falls back to an offline
//! rule-based responder on any failure. Every reply, from either path, ends
//! with the suggested-questions trailer:
//!
//! ```text
//! ---
//! SUGGESTED_QUESTIONS
//! - first question
//! - second question
//! - third question
//! ```

use std::{fmt::Write as _, sync::Arc};

use tracing::{debug, warn};

use respira_contracts::{explain::ExplanationFeatures, patient::SmokingStatus};
use respira_core::traits::TextGenerator;

pub const TRAILER_RULE: &str = "---";
pub const TRAILER_MARKER: &str = "SUGGESTED_QUESTIONS";
pub const SUGGESTED_QUESTION_COUNT: usize = 3;

/// Instructions sent with every generated explanation.
pub const SYSTEM_PROMPT: &str = "\
You are a clinical decision support assistant for respiratory medicine \
(asthma and COPD). You are speaking to a physician about their patient.
Refer to the patient in the third person. Be concise: short paragraphs or \
bullet points, no more than 200 words. Ground recommendations in the GOLD \
and GINA guidelines and name the guideline when you use it. Do not invent \
measurements that are not in the patient data.
End every answer with exactly this block and nothing after it:
---
SUGGESTED_QUESTIONS
- <follow-up question 1>
- <follow-up question 2>
- <follow-up question 3>";

/// The physician's intent, routed from keywords in the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    RiskFactors,
    Guidelines,
    Management,
    Lifestyle,
    Simulation,
    Capabilities,
}

impl Topic {
    /// First matching rule wins, in declaration order.
    pub fn classify(query: &str) -> Self {
        let q = query.to_lowercase();
        let has_any = |words: &[&str]| words.iter().any(|w| q.contains(w));
        let has_word = |word: &str| q.split(|c: char| !c.is_alphanumeric()).any(|t| t == word);

        if has_any(&["why", "risk", "reason", "factor", "cause", "driver"]) {
            Topic::RiskFactors
        } else if has_any(&["guideline", "gold", "gina", "standard", "protocol", "criteria"]) {
            Topic::Guidelines
        } else if has_any(&["recommend", "treat", "manage", "plan", "therapy", "medication", "drug"]) {
            Topic::Management
        } else if has_any(&["lifestyle", "exercise", "diet", "habit", "smoking", "smoke"]) {
            Topic::Lifestyle
        } else if has_word("if") || has_any(&["change", "reduce"]) {
            Topic::Simulation
        } else {
            Topic::Capabilities
        }
    }

    fn follow_ups(self) -> [&'static str; SUGGESTED_QUESTION_COUNT] {
        match self {
            Topic::RiskFactors => [
                "What is the recommended treatment plan?",
                "How does this patient map to GOLD groups?",
                "What if SpO2 improved above 95%?",
            ],
            Topic::Guidelines => [
                "Why is this patient at this risk level?",
                "What is the recommended treatment plan?",
                "Which lifestyle changes matter most?",
            ],
            Topic::Management => [
                "Why is this patient at this risk level?",
                "Show relevant clinical guidelines.",
                "Which lifestyle changes matter most?",
            ],
            Topic::Lifestyle => [
                "What is the recommended treatment plan?",
                "What if BMI were reduced by 2 points?",
                "Why is this patient at this risk level?",
            ],
            Topic::Simulation => [
                "Why is this patient at this risk level?",
                "What is the recommended treatment plan?",
                "Show relevant clinical guidelines.",
            ],
            Topic::Capabilities => [
                "Why is this patient high risk?",
                "What is the recommended treatment plan?",
                "Show relevant clinical guidelines.",
            ],
        }
    }
}

/// Answers physician questions about one assessment. Never fails.
#[derive(Clone, Default)]
pub struct Explainer {
    generator: Option<Arc<dyn TextGenerator>>,
}

impl Explainer {
    /// An explainer that only uses the offline responder.
    pub fn offline() -> Self {
        Self { generator: None }
    }

    pub fn with_generator(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator: Some(generator),
        }
    }

    pub fn is_online(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn explain(&self, query: &str, features: &ExplanationFeatures, risk_score: f64) -> String {
        let Some(generator) = &self.generator else {
            return fallback_response(query, features, risk_score);
        };

        let prompt = build_prompt(query, features, risk_score);
        match generator.generate(SYSTEM_PROMPT, &prompt).await {
            Ok(text) => {
                debug!(chars = text.len(), "explanation generated");
                ensure_trailer(&text, Topic::classify(query))
            }
            Err(e) => {
                warn!(error = %e, "explanation generator failed; using rule-based responder");
                fallback_response(query, features, risk_score)
            }
        }
    }
}

/// The user message sent to the generator.
pub fn build_prompt(query: &str, features: &ExplanationFeatures, risk_score: f64) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut prompt = String::from("Patient data:\n");
    let _ = writeln!(prompt, "- Age: {}", features.age);
    let _ = writeln!(prompt, "- FEV1: {} L", features.fev1);
    let _ = writeln!(prompt, "- PEF: {} L/min", features.pef);
    let _ = writeln!(prompt, "- SpO2: {}%", features.spo2);
    let _ = writeln!(prompt, "- Smoking: {}", features.smoking);
    let _ = writeln!(prompt, "- Wheezing: {}", yes_no(features.wheezing));
    let _ = writeln!(prompt, "- Shortness of breath: {}", yes_no(features.shortness_of_breath));
    if let Some(bmi) = features.bmi {
        let _ = writeln!(prompt, "- BMI: {bmi:.1}");
    }
    let _ = writeln!(prompt, "Model risk score: {:.0}%", risk_score * 100.0);
    let _ = write!(prompt, "\nPhysician question: {}", query.trim());
    prompt
}

// ── Trailer ───────────────────────────────────────────────────────────────────

/// The follow-up questions of a reply, without their `- ` prefix.
///
/// Lines are read after the last `SUGGESTED_QUESTIONS` marker; a `•`
/// bullet is accepted as well. Returns an empty list when there is no
/// marker.
pub fn parse_suggested_questions(text: &str) -> Vec<String> {
    let Some(block) = text.rsplit_once(TRAILER_MARKER).map(|(_, tail)| tail) else {
        return Vec::new();
    };

    block
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('-').or_else(|| line.strip_prefix('•')))
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .collect()
}

/// `text` with any trailer removed.
pub fn strip_trailer(text: &str) -> &str {
    let body = text.rsplit_once(TRAILER_MARKER).map_or(text, |(head, _)| head);
    body.trim_end().trim_end_matches(TRAILER_RULE).trim_end()
}

fn trailer(questions: &[&str]) -> String {
    let mut out = format!("\n\n{TRAILER_RULE}\n{TRAILER_MARKER}");
    for q in questions {
        let _ = write!(out, "\n- {q}");
    }
    out
}

/// Keep a well-formed trailer, otherwise replace it with the topic default.
pub fn ensure_trailer(text: &str, topic: Topic) -> String {
    if parse_suggested_questions(text).len() == SUGGESTED_QUESTION_COUNT {
        return text.trim_end().to_string();
    }
    format!("{}{}", strip_trailer(text), trailer(&topic.follow_ups()))
}

// ── Rule-based responder ──────────────────────────────────────────────────────

/// Offline answer keyed on the question's topic. Pure and infallible.
pub fn fallback_response(query: &str, features: &ExplanationFeatures, risk_score: f64) -> String {
    let topic = Topic::classify(query);
    let body = match topic {
        Topic::RiskFactors => risk_factors(features, risk_score),
        Topic::Guidelines => guidelines(features, risk_score),
        Topic::Management => management_plan(features),
        Topic::Lifestyle => lifestyle_advice(features),
        Topic::Simulation => "### Predictive Simulation\n\n\
            Based on the model, **reducing BMI by 2 points** and **improving SpO2 above 95%** \
            would likely lower the risk score by approximately **15-20%**."
            .to_string(),
        Topic::Capabilities => "### How can I assist?\n\n\
            This patient's profile has been analyzed against the **GOLD 2025** and **GINA** protocols. \
            Ask about risk drivers, guideline classification, treatment or lifestyle changes."
            .to_string(),
    };
    format!("{body}{}", trailer(&topic.follow_ups()))
}

fn risk_factors(f: &ExplanationFeatures, risk: f64) -> String {
    let mut factors = Vec::new();

    if f.spo2 < 92.0 {
        factors.push(format!(
            "• **Critical Hypoxemia (SpO2 {}%)**: severe respiratory compromise requiring immediate attention.",
            f.spo2
        ));
    } else if f.spo2 < 95.0 {
        factors.push("• **Low Oxygen Saturation**: SpO2 is suboptimal and contributes to risk.".to_string());
    }
    if f.fev1 < 1.5 {
        factors.push("• **Severe Obstruction (FEV1 < 1.5 L)**: consistent with GOLD stage 3/4 severity.".to_string());
    }
    if f.pef < 350.0 {
        factors.push(
            "• **Reduced Peak Expiratory Flow**: suggests airway variability and exacerbation risk.".to_string(),
        );
    }
    if f.age > 65 {
        factors.push("• **Advanced Age**: age over 65 independently raises exacerbation frequency.".to_string());
    }
    if f.smoking == SmokingStatus::CurrentSmoker {
        factors.push("• **Active Smoking**: the most significant modifiable driver of progression.".to_string());
    }
    if f.wheezing {
        factors.push("• **Symptomatic Wheezing**: indicates active bronchoconstriction.".to_string());
    }

    let percent = risk * 100.0;
    if factors.is_empty() {
        return format!(
            "### Risk Analysis\n\nThe patient presents a **low risk** profile (model risk {percent:.0}%). \
             Vital signs are within normal ranges."
        );
    }

    let summary = if risk > 0.7 {
        "High Risk Configuration"
    } else {
        "Moderate Risk Configuration"
    };
    format!(
        "### {summary} (model risk {percent:.0}%)\n\nThe model identified {} key drivers:\n\n{}",
        factors.len(),
        factors.join("\n")
    )
}

/// GOLD ABE group implied by the score and FEV1.
pub fn gold_group(fev1: f64, risk: f64) -> &'static str {
    if risk > 0.7 || fev1 < 1.5 {
        "E (High Risk/High Symptom)"
    } else if risk > 0.3 {
        "B (Moderate Risk)"
    } else {
        "A"
    }
}

fn guidelines(f: &ExplanationFeatures, risk: f64) -> String {
    format!(
        "### Clinical Guidelines Reference\n\n\
         Based on the **GOLD 2025 Report**:\n\
         • **Patient Classification**: Group **{}**\n\
         • **Criteria**: FEV1 {} L combined with a risk score of {:.0}%.\n\n\
         **GINA Assessment** (if asthma is suspected):\n\
         • Symptom control should be judged from PEF variability and wheezing.",
        gold_group(f.fev1, risk),
        f.fev1,
        risk * 100.0
    )
}

fn management_plan(f: &ExplanationFeatures) -> String {
    let mut plan = vec!["**Pharmacological:**".to_string()];
    if f.fev1 < 2.0 {
        plan.push("• Initiate LAMA/LABA combination therapy.".to_string());
    }
    if f.wheezing {
        plan.push("• SABA (albuterol) as needed for rescue.".to_string());
    }
    if f.spo2 < 92.0 {
        plan.push("• **Urgent:** assess for long-term oxygen therapy (LTOT).".to_string());
    }
    if plan.len() == 1 {
        plan.push("• No escalation indicated; review inhaler technique and adherence.".to_string());
    }

    plan.push(String::new());
    plan.push("**Non-Pharmacological:**".to_string());
    if f.smoking == SmokingStatus::CurrentSmoker {
        plan.push("• Smoking cessation program with nicotine replacement therapy.".to_string());
    }
    plan.push("• Pulmonary rehabilitation referral.".to_string());
    plan.push("• Pneumococcal and influenza vaccinations.".to_string());

    format!("### Recommended Management Plan\n\n{}", plan.join("\n"))
}

fn lifestyle_advice(f: &ExplanationFeatures) -> String {
    let mut items = Vec::new();
    match f.smoking {
        SmokingStatus::CurrentSmoker => {
            items.push("**Smoking Cessation**: immediate intervention required; offer counselling and NRT.")
        }
        SmokingStatus::ExSmoker => items.push("**Stay Smoke-Free**: reinforce abstinence at every visit."),
        SmokingStatus::NonSmoker => {}
    }
    items.push("**Physical Activity**: 30 minutes of moderate activity daily.");
    items.push("**Diet**: high-protein diet if BMI is below 21 to prevent muscle wasting.");
    items.push("**Air Quality**: avoid outdoor exertion when AQI exceeds 100.");

    let mut out = String::from("### Lifestyle Interventions\n");
    for (i, item) in items.iter().enumerate() {
        let _ = write!(out, "\n{}. {item}", i + 1);
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
