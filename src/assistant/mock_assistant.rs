use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;

use super::{
    assistant_models::{RecordAnalysis, RecordSample},
    assistant_service::{RecordAnalysisProvider, TextCompletionProvider},
};
use crate::error::{AppError, Result};

const HEADACHE_REPLY: &str = "If you're experiencing headaches, it could be due to various factors such as stress, dehydration, or eye strain. Try these general tips:\n\n1. Stay hydrated\n2. Get adequate rest\n3. Practice stress management\n\nHowever, if headaches are severe or persistent, please consult a healthcare professional for proper evaluation.";

const EXERCISE_REPLY: &str = "Regular exercise is important for maintaining good health. General recommendations include:\n\n1. 150 minutes of moderate aerobic activity per week\n2. Strength training 2-3 times per week\n3. Daily stretching for flexibility\n\nBefore starting any new exercise routine, consult your healthcare provider, especially if you have any existing medical conditions.";

const GENERAL_REPLY: &str = "I understand your health concern. While I can provide general information, it's important to consult with a qualified healthcare provider for personalized medical advice. They can properly evaluate your specific situation and provide appropriate recommendations.";

struct CannedAnalysis {
    summary: &'static str,
    recommendations: &'static [&'static str],
    risk_factors: &'static [&'static str],
}

impl CannedAnalysis {
    fn to_analysis(&self) -> RecordAnalysis {
        RecordAnalysis {
            summary: self.summary.to_string(),
            recommendations: self.recommendations.iter().map(|s| s.to_string()).collect(),
            risk_factors: self.risk_factors.iter().map(|s| s.to_string()).collect(),
        }
    }
}

static ANALYSES: [CannedAnalysis; 8] = [
    CannedAnalysis {
        summary: "Blood test results show normal ranges for most markers. Vitamin D levels are slightly below optimal range.",
        recommendations: &[
            "Consider vitamin D supplementation",
            "Increase sun exposure safely",
            "Schedule follow-up in 3 months",
            "Include vitamin D-rich foods in diet",
        ],
        risk_factors: &[
            "Vitamin D deficiency may impact bone health",
            "Low vitamin D may affect immune system function",
            "Seasonal variation in sun exposure",
        ],
    },
    CannedAnalysis {
        summary: "ECG results indicate normal sinus rhythm. No significant abnormalities detected.",
        recommendations: &[
            "Maintain regular exercise routine",
            "Continue heart-healthy diet",
            "Annual cardiac check-up recommended",
            "Monitor blood pressure regularly",
        ],
        risk_factors: &[
            "Family history of heart disease noted",
            "Sedentary lifestyle risk factor present",
            "Moderate caffeine consumption",
        ],
    },
    CannedAnalysis {
        summary: "Chest X-ray shows clear lung fields. No acute cardiopulmonary process identified.",
        recommendations: &[
            "No immediate follow-up needed",
            "Continue regular health maintenance",
            "Report any new respiratory symptoms",
            "Maintain good air quality at home/work",
        ],
        risk_factors: &[
            "Previous smoking history noted",
            "Occupational exposure to irritants",
            "Seasonal allergies may affect respiratory health",
        ],
    },
    CannedAnalysis {
        summary: "MRI scan of the lumbar spine shows mild degenerative changes at L4-L5 level.",
        recommendations: &[
            "Physical therapy evaluation recommended",
            "Core strengthening exercises",
            "Proper ergonomic setup at work",
            "Weight management program if applicable",
            "Regular stretching routine",
        ],
        risk_factors: &[
            "Sedentary work environment",
            "Previous sports injuries",
            "Family history of osteoarthritis",
            "Current body weight status",
        ],
    },
    CannedAnalysis {
        summary: "Comprehensive metabolic panel indicates elevated liver enzymes (ALT/AST).",
        recommendations: &[
            "Follow-up testing in 4-6 weeks",
            "Alcohol reduction advised",
            "Review current medications with provider",
            "Dietary modifications recommended",
            "Consider hepatology consultation",
        ],
        risk_factors: &[
            "Medication interactions possible",
            "Alcohol consumption patterns",
            "Family history of liver disease",
            "Recent weight changes noted",
        ],
    },
    CannedAnalysis {
        summary: "Annual eye examination reveals mild myopia progression and early signs of digital eye strain.",
        recommendations: &[
            "Update prescription glasses",
            "Implement 20-20-20 rule for screen time",
            "Use artificial tears as needed",
            "Consider blue light filtering lenses",
            "Follow-up in 12 months",
        ],
        risk_factors: &[
            "Extended screen time exposure",
            "Family history of vision problems",
            "Poor lighting conditions at work",
            "Irregular break patterns",
        ],
    },
    CannedAnalysis {
        summary: "Dental examination shows early signs of gingivitis and one cavity in molar #18.",
        recommendations: &[
            "Schedule dental cleaning",
            "Improve flossing routine",
            "Use prescription fluoride toothpaste",
            "Consider electric toothbrush",
            "Follow-up for cavity treatment",
        ],
        risk_factors: &[
            "Irregular dental hygiene routine",
            "High sugar consumption",
            "Grinding teeth at night",
            "Family history of periodontal disease",
        ],
    },
    CannedAnalysis {
        summary: "Sleep study results indicate mild sleep apnea with an AHI of 8 events/hour.",
        recommendations: &[
            "Weight management program",
            "Sleep position therapy",
            "Consider CPAP evaluation",
            "Follow sleep hygiene guidelines",
            "Follow-up with sleep specialist",
        ],
        risk_factors: &[
            "BMI above optimal range",
            "Family history of sleep disorders",
            "Anatomical factors noted",
            "Evening alcohol consumption",
        ],
    },
];

/// Offline stand-in for the language model. Replies come from a keyword
/// table and analyses are drawn at random from a fixed set.
#[derive(Debug, Clone)]
pub struct MockAssistant {
    delay: Duration,
}

impl MockAssistant {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn reply_for(prompt: &str) -> &'static str {
        let prompt = prompt.to_lowercase();
        if prompt.contains("headache") {
            HEADACHE_REPLY
        } else if prompt.contains("exercise") {
            EXERCISE_REPLY
        } else {
            GENERAL_REPLY
        }
    }

    async fn pause(&self, factor: u32) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay * factor / 2).await;
        }
    }
}

#[async_trait]
impl TextCompletionProvider for MockAssistant {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.pause(2).await;
        Ok(Self::reply_for(prompt).to_string())
    }
}

#[async_trait]
impl RecordAnalysisProvider for MockAssistant {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn analyze(&self, record: &RecordSample) -> Result<RecordAnalysis> {
        // analysis takes half again as long as a chat reply
        self.pause(3).await;
        tracing::debug!("Mock analysis for {}", record.file_name);
        ANALYSES
            .choose(&mut rand::thread_rng())
            .map(CannedAnalysis::to_analysis)
            .ok_or(AppError::InternalError)
    }
}
