//! Built-in adversarial scenarios for `vigil demo`

use clap::ValueEnum;
use sdk::{Budgets, StepRecord};

/// Scripted agent behaviors
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// The same search six times in a row
    Loop,
    /// search -> click -> search -> click ...
    Cycle,
    /// Distinct steps that burn through the token budget
    Scarcity,
    /// DEADLOCK and PANIC alternating with healthy steps in between
    Oscillation,
    /// Distinct, confident, cheap steps
    Healthy,
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Loop => "loop",
            Scenario::Cycle => "cycle",
            Scenario::Scarcity => "scarcity",
            Scenario::Oscillation => "oscillation",
            Scenario::Healthy => "healthy",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Loop => "Agent repeats one search; escalates to synthesis, then halts",
            Scenario::Cycle => "Agent alternates two actions; caught as a 2-cycle",
            Scenario::Scarcity => "Agent spends 85% of its tokens by step 6",
            Scenario::Oscillation => "Interventions fight each other: DEADLOCK, PANIC, DEADLOCK, PANIC",
            Scenario::Healthy => "Agent makes steady progress; the monitor stays silent",
        }
    }

    pub fn session_id(&self) -> String {
        format!("demo-{}", self.name())
    }

    pub fn budgets(&self) -> Budgets {
        match self {
            Scenario::Loop | Scenario::Scarcity | Scenario::Healthy => Budgets::new(10, 1000),
            Scenario::Cycle | Scenario::Oscillation => Budgets::new(20, 5000),
        }
    }

    /// The scripted step stream
    pub fn steps(&self) -> Vec<StepRecord> {
        let id = self.session_id();
        let step = |index: u64, action: &str, key: &str, value: &str| {
            StepRecord::new(id.as_str(), index, action)
                .with_arg(key, value)
                .with_confidence(0.6)
                .with_tokens(50)
        };

        match self {
            Scenario::Loop => (1..=6)
                .map(|i| {
                    step(i, "search", "query", "capital of Australia")
                        .with_rationale("Searching for the capital of Australia")
                })
                .collect(),

            Scenario::Cycle => (1..=8)
                .map(|i| {
                    if i % 2 == 1 {
                        step(i, "search", "query", "A").with_rationale("I need to search again")
                    } else {
                        step(i, "click", "link", "B").with_rationale("Now I will click")
                    }
                })
                .collect(),

            Scenario::Scarcity => [100, 150, 150, 150, 150, 150, 100]
                .iter()
                .enumerate()
                .map(|(i, tokens)| {
                    let index = i as u64 + 1;
                    step(index, "read", "page", &format!("chapter-{}", index))
                        .with_tokens(*tokens)
                        .with_rationale("Reading the next chapter of the report")
                })
                .collect(),

            Scenario::Oscillation => vec![
                step(1, "search", "query", "ranking"),
                step(2, "search", "query", "ranking"),
                step(3, "search", "query", "ranking"),
                step(4, "read", "page", "overview"),
                step(5, "read", "page", "appendix")
                    .with_confidence(0.2)
                    .with_rationale("Maybe the appendix, or possibly the footnotes? Not sure"),
                step(6, "read", "page", "summary"),
                step(7, "search", "query", "ranking 2024"),
                step(8, "search", "query", "ranking 2024"),
                step(9, "search", "query", "ranking 2024"),
                step(10, "read", "page", "methodology"),
                step(11, "read", "page", "errata")
                    .with_confidence(0.2)
                    .with_rationale("I think it might be in the errata, perhaps"),
                step(12, "read", "page", "index"),
            ],

            Scenario::Healthy => [
                ("search", "query", "rust borrow checker"),
                ("read", "url", "doc.rust-lang.org/book"),
                ("read", "url", "blog.rust-lang.org/nll"),
                ("compare", "topic", "lexical vs non-lexical lifetimes"),
                ("summarize", "topic", "borrow checker"),
            ]
            .iter()
            .enumerate()
            .map(|(i, (action, key, value))| {
                step(i as u64 + 1, action, key, value)
                    .with_confidence(0.7)
                    .with_rationale("Collecting sources on the borrow checker")
            })
            .collect(),
        }
    }
}
