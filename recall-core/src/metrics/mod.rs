//! # Pipeline Metrics
//!
//! Per-step latency and token accounting by complexity tier. One
//! [`PipelineMetrics`] instance lives for the duration of a single job and
//! is serialized into the queue entry output.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::llm::{Complexity, Generation};

/// Token counts for one complexity tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTokens {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TierTokens {
    fn add(&mut self, input: u64, output: u64) {
        self.input += input;
        self.output += output;
        self.total += input + output;
    }
}

/// Token usage split by complexity tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub high: TierTokens,
    pub low: TierTokens,
}

impl TokenUsage {
    /// Fold one generation's token counts into the matching tier
    pub fn record(&mut self, complexity: Complexity, generation: &Generation) {
        match complexity {
            Complexity::High => self.high.add(generation.input_tokens, generation.output_tokens),
            Complexity::Low => self.low.add(generation.input_tokens, generation.output_tokens),
        }
    }

    /// Total tokens across both tiers
    #[must_use]
    pub fn total(&self) -> u64 {
        self.high.total + self.low.total
    }
}

/// Wall-clock duration of one named pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: String,
    pub duration_ms: u64,
}

/// Accumulator carried through one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    pub tokens: TokenUsage,
    pub steps: Vec<StepTiming>,
}

impl PipelineMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing a step; finish with [`StepTimer::finish`]
    #[must_use]
    pub fn start_step(&self, step: &str) -> StepTimer {
        StepTimer {
            step: step.to_string(),
            started: Instant::now(),
        }
    }

    /// Record a finished step
    pub fn record_step(&mut self, timer: StepTimer) {
        self.steps.push(StepTiming {
            step: timer.step,
            duration_ms: timer.started.elapsed().as_millis() as u64,
        });
    }

    /// Fold one generation into the token accounting
    pub fn record_generation(&mut self, complexity: Complexity, generation: &Generation) {
        self.tokens.record(complexity, generation);
    }
}

/// In-flight step measurement
#[derive(Debug)]
pub struct StepTimer {
    step: String,
    started: Instant,
}
