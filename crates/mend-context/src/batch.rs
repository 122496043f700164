//! Groups files into batches sized to fit the model's context and output
//! windows.
//!
//! Sizing is heuristic. A file is counted twice against the input window
//! (once quoted in the prompt, once re-quoted in edit blocks) and at the
//! configured ratio against the output window, plus fixed padding per file
//! for markers and filenames. The plan never drops a file: one that exceeds
//! the budgets on its own is scheduled alone and left to the provider to
//! reject.

use serde::{Deserialize, Serialize};

/// One file to schedule, with its estimated token count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlanItem {
    pub path: String,
    pub is_editable: bool,
    pub tokens: usize,
}

/// Budget knobs for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Total context window of the model, in tokens.
    pub max_context_tokens: usize,
    /// Maximum completion size of the model, in tokens.
    pub max_output_tokens: usize,
    /// Tokens reserved for the system prompt, conversation, and instructions.
    pub overhead_tokens: usize,
    /// Per-file allowance for fence markers and the filename line.
    pub padding_tokens: usize,
    /// Expected output size as a fraction of a file's input size.
    pub output_ratio: f32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 128_000,
            max_output_tokens: 8_192,
            overhead_tokens: 2_048,
            padding_tokens: 50,
            output_ratio: 0.5,
        }
    }
}

/// Rough token estimate used when no model tokenizer is available.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Greedy ascending-size packer.
#[derive(Debug, Clone, Default)]
pub struct BatchScheduler {
    config: BatchConfig,
}

impl BatchScheduler {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Plan batches for `items`. Files are sorted ascending by size so small
    /// files coalesce instead of being scattered among large ones. Every
    /// input file appears in exactly one batch and no batch is empty.
    pub fn plan(&self, mut items: Vec<BatchPlanItem>) -> Vec<Vec<BatchPlanItem>> {
        items.sort_by(|a, b| a.tokens.cmp(&b.tokens).then_with(|| a.path.cmp(&b.path)));

        let mut batches: Vec<Vec<BatchPlanItem>> = Vec::new();
        let mut current: Vec<BatchPlanItem> = Vec::new();
        let mut input_used = 0usize;
        let mut output_used = 0usize;

        for item in items {
            let input_cost = item.tokens * 2 + self.config.padding_tokens;
            let output_cost =
                (item.tokens as f32 * self.config.output_ratio) as usize + self.config.padding_tokens;

            let input_over = self.config.overhead_tokens + input_used + input_cost
                >= self.config.max_context_tokens;
            let output_over = output_used + output_cost >= self.config.max_output_tokens;

            if !current.is_empty() && (input_over || output_over) {
                batches.push(std::mem::take(&mut current));
                input_used = 0;
                output_used = 0;
            }

            input_used += input_cost;
            output_used += output_cost;
            current.push(item);
        }

        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }
}
