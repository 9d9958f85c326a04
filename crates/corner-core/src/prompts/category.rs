//! Journal prompt categories and their offline prompts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of reflective prompt the user asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PromptCategory {
    #[default]
    #[serde(rename = "reflective questions about your day")]
    Day,
    #[serde(rename = "questions about your emotional well-being")]
    Emotions,
    #[serde(rename = "meaningful self-reflection prompts")]
    SelfReflection,
    #[serde(rename = "gratitude-focused questions")]
    Gratitude,
    #[serde(rename = "mindfulness and present moment awareness")]
    Mindfulness,
    #[serde(rename = "personal growth and goals")]
    Growth,
}

impl PromptCategory {
    pub const ALL: [Self; 6] = [
        Self::Day,
        Self::Emotions,
        Self::SelfReflection,
        Self::Gratitude,
        Self::Mindfulness,
        Self::Growth,
    ];

    /// Phrase sent to the prompt endpoint
    pub const fn label(self) -> &'static str {
        match self {
            Self::Day => "reflective questions about your day",
            Self::Emotions => "questions about your emotional well-being",
            Self::SelfReflection => "meaningful self-reflection prompts",
            Self::Gratitude => "gratitude-focused questions",
            Self::Mindfulness => "mindfulness and present moment awareness",
            Self::Growth => "personal growth and goals",
        }
    }

    /// Short name for command lines
    pub const fn slug(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Emotions => "emotions",
            Self::SelfReflection => "self-reflection",
            Self::Gratitude => "gratitude",
            Self::Mindfulness => "mindfulness",
            Self::Growth => "growth",
        }
    }

    /// Prompts used when the generator cannot be reached.
    pub const fn fallback_prompts(self) -> &'static [&'static str; 5] {
        match self {
            Self::Day => &[
                "What was the most meaningful moment of your day today?",
                "What challenged you today, and how did you respond to it?",
                "What did you learn about yourself today?",
                "If you could relive one moment from today, what would it be and why?",
                "How did you take care of yourself today?",
            ],
            Self::Emotions => &[
                "What emotions have been most present for you lately?",
                "When did you last feel truly at peace, and what contributed to that feeling?",
                "What has been draining your emotional energy lately?",
                "What boundaries might you need to set to protect your emotional health?",
                "What simple practices help you return to a positive emotional state?",
            ],
            Self::SelfReflection => &[
                "What parts of yourself are you still learning to accept?",
                "How have your priorities shifted over the past year?",
                "What story about yourself might need rewriting?",
                "What values are most important to you right now?",
                "What would your younger self think of the person you are today?",
            ],
            Self::Gratitude => &[
                "What three things are you grateful for in this moment?",
                "Who has positively impacted your life recently, and how?",
                "What simple pleasure brought you joy today?",
                "What challenge are you secretly grateful for?",
                "What in nature fills you with gratitude and wonder?",
            ],
            Self::Mindfulness => &[
                "What sensations are you aware of in your body right now?",
                "What sounds can you hear if you pause and listen carefully?",
                "What is one thing you can appreciate about this exact moment?",
                "How does your breathing change when you focus on it?",
                "What thoughts keep pulling you away from the present moment?",
            ],
            Self::Growth => &[
                "What skill would you like to develop in the next six months?",
                "What small step could you take today toward an important goal?",
                "What habit has been serving you well lately?",
                "What's one belief that might be limiting your growth?",
                "How would you like to challenge yourself this week?",
            ],
        }
    }
}

impl fmt::Display for PromptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PromptCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|category| {
                category.slug().eq_ignore_ascii_case(wanted)
                    || category.label().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| format!("Unknown prompt category '{wanted}'"))
    }
}
