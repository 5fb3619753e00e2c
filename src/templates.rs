//! Instruction templates, one per analysis mode.
//!
//! Three template styles exist, from the loose persona prompt to the
//! XML-delimited one. A [`TemplateRegistry`] is built once for a single
//! style and is read-only afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{HintError, Result};
use crate::types::{AnalysisMode, GenerationConfig, GoalPolicy};

/// Fixed reply for code that is not Python
pub const LANGUAGE_REFUSAL: &str =
    "I can only give hints for Python code. Please paste a Python snippet.";

const PANDA_PERSONA: &str = "You are 'CodePanda', a lazy but brilliant programming tutor who would much rather be napping. Your voice is sleepy and bored. Stay in character first, then give one short, direct hint so you can get back to your nap.";

/// Behavioral constraint a template imposes on the answer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Constraint {
    NoCodeAuthoring,
    SingleQuestionOnly,
    TargetLanguageOnly,
}

impl Constraint {
    pub fn tag(&self) -> &'static str {
        match self {
            Constraint::NoCodeAuthoring => "no-code-authoring",
            Constraint::SingleQuestionOnly => "single-question-only",
            Constraint::TargetLanguageOnly => "language-restricted-to-target",
        }
    }
}

/// Markers framing the expected answer region
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Delimiters {
    pub open: String,
    pub close: String,
}

impl Delimiters {
    pub fn new(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }
}

/// Template strategy
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStyle {
    /// Sleepy panda persona, markdown sections, goal optional
    Persona,
    /// Bulleted rules, markdown sections
    Rules,
    /// XML-tagged sections and a delimited answer
    #[default]
    Xml,
}

impl TemplateStyle {
    pub fn goal_policy(&self) -> GoalPolicy {
        match self {
            TemplateStyle::Persona => GoalPolicy::Optional,
            TemplateStyle::Rules | TemplateStyle::Xml => GoalPolicy::Required,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStyle::Persona => "persona",
            TemplateStyle::Rules => "rules",
            TemplateStyle::Xml => "xml",
        }
    }
}

impl fmt::Display for TemplateStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateStyle {
    type Err = HintError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persona" => Ok(TemplateStyle::Persona),
            "rules" => Ok(TemplateStyle::Rules),
            "xml" => Ok(TemplateStyle::Xml),
            other => Err(HintError::Config(format!("unknown template style: {other}"))),
        }
    }
}

/// Static instruction text plus its behavioral contract
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    pub mode: AnalysisMode,
    pub style: TemplateStyle,
    pub instruction_body: String,
    pub constraints: Vec<Constraint>,
    pub delimiters: Option<Delimiters>,
    /// Line after which the model starts writing
    pub answer_cue: String,
    pub generation: GenerationConfig,
    pub goal_policy: GoalPolicy,
}

impl PromptTemplate {
    pub fn has(&self, constraint: Constraint) -> bool {
        self.constraints.contains(&constraint)
    }

    /// Full cue as it ends the prompt, opening delimiter included
    pub fn cue(&self) -> String {
        match &self.delimiters {
            Some(d) => format!("{}\n{}", self.answer_cue, d.open),
            None => self.answer_cue.clone(),
        }
    }

    pub fn forbidden_actions(&self) -> Vec<&'static str> {
        self.constraints.iter().map(|c| c.tag()).collect()
    }
}

/// Holds exactly one template per analysis mode
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    style: TemplateStyle,
    buggy: PromptTemplate,
    correct: PromptTemplate,
}

impl TemplateRegistry {
    /// Build the built-in templates for a style
    pub fn new(style: TemplateStyle) -> Result<Self> {
        Self::from_templates(
            builtin(style, AnalysisMode::Buggy),
            builtin(style, AnalysisMode::Correct),
        )
    }

    /// Assemble a registry from explicit templates, checking load-time invariants
    pub fn from_templates(buggy: PromptTemplate, correct: PromptTemplate) -> Result<Self> {
        if buggy.mode != AnalysisMode::Buggy || correct.mode != AnalysisMode::Correct {
            return Err(HintError::TemplateInvariant(
                "templates registered under the wrong mode".into(),
            ));
        }
        if buggy.style != correct.style {
            return Err(HintError::TemplateInvariant(
                "templates of one registry must share a style".into(),
            ));
        }
        if !buggy.has(Constraint::NoCodeAuthoring) {
            return Err(HintError::TemplateInvariant(format!(
                "Buggy template must forbid {}",
                Constraint::NoCodeAuthoring.tag()
            )));
        }
        for template in [&buggy, &correct] {
            template.generation.validate()?;
            if template.answer_cue.trim().is_empty() {
                return Err(HintError::TemplateInvariant(format!(
                    "{} template has an empty answer cue",
                    template.mode
                )));
            }
        }

        Ok(Self {
            style: buggy.style,
            buggy,
            correct,
        })
    }

    /// Replace the generation config of one mode
    pub fn with_generation(mut self, mode: AnalysisMode, generation: GenerationConfig) -> Result<Self> {
        generation.validate()?;
        match mode {
            AnalysisMode::Buggy => self.buggy.generation = generation,
            AnalysisMode::Correct => self.correct.generation = generation,
        }
        Ok(self)
    }

    /// Override the goal policy of every template
    pub fn with_goal_policy(mut self, policy: GoalPolicy) -> Self {
        self.buggy.goal_policy = policy;
        self.correct.goal_policy = policy;
        self
    }

    pub fn lookup(&self, mode: AnalysisMode) -> &PromptTemplate {
        match mode {
            AnalysisMode::Buggy => &self.buggy,
            AnalysisMode::Correct => &self.correct,
        }
    }

    /// Look up by the UI's mode string
    pub fn lookup_str(&self, mode: &str) -> Result<&PromptTemplate> {
        Ok(self.lookup(mode.parse()?))
    }

    pub fn style(&self) -> TemplateStyle {
        self.style
    }
}

fn builtin(style: TemplateStyle, mode: AnalysisMode) -> PromptTemplate {
    let goal_policy = style.goal_policy();
    match (style, mode) {
        (TemplateStyle::Persona, AnalysisMode::Buggy) => PromptTemplate {
            mode,
            style,
            instruction_body: format!(
                r#"{PANDA_PERSONA}
A student's Python code isn't doing what they want. It's probably a simple mistake.

**Your Absolute #1 Rule: DO NOT, under any circumstances, provide corrected code or write any code yourself.**

Your process is simple:
1. Start your response with a sleepy panda sound, like '*Yawn*...' or '*Stretches*...'.
2. Quietly compare what they want (if they told you) with what the code actually does, and glance at the error message (if they gave one).
3. Ask ONE short Socratic question that points at the first place the code goes wrong. You're too tired for long explanations.
4. Make them think. Do not hand them the answer."#
            ),
            constraints: vec![Constraint::NoCodeAuthoring, Constraint::SingleQuestionOnly],
            delimiters: None,
            answer_cue: "### Your Sleepy Panda Response:".to_string(),
            generation: GenerationConfig::new(200, 0.2, 0.9).with_stop("###"),
            goal_policy,
        },
        (TemplateStyle::Persona, AnalysisMode::Correct) => PromptTemplate {
            mode,
            style,
            instruction_body: format!(
                r#"{PANDA_PERSONA} The student thinks their code is correct. Let's see...
1. Start with a sleepy confirmation like 'Yeah, looks fine.'
2. If it really does what they want, give them a simple compliment.
3. Suggest a quick challenge so they keep working and you can go back to sleep. For example, 'Now try it with a list comprehension. Wake me up when you're done.'
4. If it does not do what they want, skip the compliment and ask ONE sleepy question about where it goes wrong.
Never write the fixed code for them. You're far too sleepy for that."#
            ),
            constraints: vec![Constraint::NoCodeAuthoring],
            delimiters: None,
            answer_cue: "### Your Sleepy Panda Response:".to_string(),
            generation: GenerationConfig::new(200, 0.4, 0.9).with_stop("###"),
            goal_policy,
        },
        (TemplateStyle::Rules, AnalysisMode::Buggy) => PromptTemplate {
            mode,
            style,
            instruction_body: format!(
                r#"You are CodePanda, a Python tutor who teaches only by asking questions.
The student describes a goal and submits Python code that does not work.

RULES:
- Never write code. No corrected code, no example code, no code blocks.
- Ask exactly one question. No explanations, no lists.
- Only help with Python. If the submitted code is not Python, reply with exactly: {LANGUAGE_REFUSAL}

PROCESS:
1. Silently compare the stated goal with the submitted code.
2. Trace the code step by step in your head and find the first point where it stops matching the goal.
3. Ask one Socratic question that points the student at that exact point."#
            ),
            constraints: vec![
                Constraint::NoCodeAuthoring,
                Constraint::SingleQuestionOnly,
                Constraint::TargetLanguageOnly,
            ],
            delimiters: None,
            answer_cue: "### Hint:".to_string(),
            generation: GenerationConfig::new(150, 0.1, 0.9)
                .with_stop("###")
                .with_stop("```"),
            goal_policy,
        },
        (TemplateStyle::Rules, AnalysisMode::Correct) => PromptTemplate {
            mode,
            style,
            instruction_body: r#"You are CodePanda, a Python tutor who teaches only by asking questions.
The student believes their code is correct.

RULES:
- Never write code. No corrected code, no example code, no code blocks.
- Answer in two sentences at most.

PROCESS:
1. Check whether the code really achieves the stated goal.
2. If it does: give one short compliment, then suggest one follow-up exercise that builds on it.
3. If it does not: do not compliment. Ask exactly one Socratic question that points at the first place it goes wrong."#
                .to_string(),
            constraints: vec![Constraint::NoCodeAuthoring],
            delimiters: None,
            answer_cue: "### Hint:".to_string(),
            generation: GenerationConfig::new(200, 0.3, 0.9)
                .with_stop("###")
                .with_stop("```"),
            goal_policy,
        },
        (TemplateStyle::Xml, AnalysisMode::Buggy) => PromptTemplate {
            mode,
            style,
            instruction_body: format!(
                r#"You are CodePanda, a Python tutor. The student's goal, their code and an optional error message are given in the tagged sections below.
Write your answer inside the hint tags and stop as soon as you close them.

<rules>
<rule>Never write code: no corrected code, no example code, no code blocks.</rule>
<rule>The hint is exactly one question.</rule>
<rule>If the submitted code is not Python, the hint is exactly: {LANGUAGE_REFUSAL}</rule>
</rules>

<process>
<step>Silently compare the goal with the code.</step>
<step>Trace the code's execution and find the first point where it diverges from the goal.</step>
<step>Ask one Socratic question that pinpoints that divergence.</step>
</process>"#
            ),
            constraints: vec![
                Constraint::NoCodeAuthoring,
                Constraint::SingleQuestionOnly,
                Constraint::TargetLanguageOnly,
            ],
            delimiters: Some(Delimiters::new("<hint>", "</hint>")),
            answer_cue: "Hint for the student:".to_string(),
            generation: GenerationConfig::new(128, 0.1, 0.8)
                .with_stop("</hint>")
                .with_stop("```"),
            goal_policy,
        },
        (TemplateStyle::Xml, AnalysisMode::Correct) => PromptTemplate {
            mode,
            style,
            instruction_body: r#"You are CodePanda, a Python tutor. The student believes their code is correct. Their goal and code are given in the tagged sections below.
Write your answer inside the hint tags and stop as soon as you close them.

<rules>
<rule>Never write code: no corrected code, no example code, no code blocks.</rule>
<rule>If the code achieves the goal, the hint is one short compliment followed by one suggested follow-up exercise.</rule>
<rule>If it does not, the hint is exactly one Socratic question pointing at the first place it goes wrong.</rule>
</rules>"#
                .to_string(),
            constraints: vec![Constraint::NoCodeAuthoring],
            delimiters: Some(Delimiters::new("<hint>", "</hint>")),
            answer_cue: "Hint for the student:".to_string(),
            generation: GenerationConfig::new(160, 0.2, 0.9)
                .with_stop("</hint>")
                .with_stop("```"),
            goal_policy,
        },
    }
}
