//! Deterministic inputs and stand-in models.
//!
//! Batches are generated from a seeded RNG so two runs of the same scenario
//! feed identical text to the model. The simulated targets do work that
//! scales with input length and batch size; they back the CLI and the tests
//! when no real model is wired in.

use ahash::AHasher;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use std::hash::{Hash, Hasher};

use crate::{
    HarnessError,
    record::LengthBucket,
    target::{InferenceInput, InferenceTarget, InputKind},
};

const VOCABULARY: &[&str] = &[
    "the", "study", "reports", "that", "vaccine", "coverage", "increased", "in", "rural",
    "regions", "during", "2021", "according", "to", "official", "figures", "minister", "claimed",
    "unemployment", "fell", "by", "percent", "last", "year", "river", "levels", "rose", "after",
    "heavy", "rain", "researchers", "found", "no", "link", "between", "policy", "and", "prices",
    "city", "council", "approved", "budget", "for", "schools", "emissions", "dropped", "sharply",
];

pub fn generate_text(rng: &mut StdRng, words: usize) -> String {
    let mut text = String::with_capacity(words * 8);
    for idx in 0..words {
        if idx > 0 {
            text.push(' ');
        }
        let word = VOCABULARY.choose(rng).copied().unwrap_or("claim");
        text.push_str(word);
    }
    text
}

/// Builds `batch_size` inputs of the requested kind. The same
/// `(kind, batch_size, bucket, seed)` always yields the same batch.
pub fn generate_batch(
    kind: InputKind,
    batch_size: usize,
    bucket: LengthBucket,
    seed: u64,
) -> Vec<InferenceInput> {
    let mut rng = StdRng::seed_from_u64(seed ^ (batch_size as u64).rotate_left(17));
    let words = bucket.words();
    (0..batch_size)
        .map(|_| match kind {
            InputKind::Text => InferenceInput::Text(generate_text(&mut rng, words)),
            InputKind::Pair => {
                let hypothesis_words = (words / 2).max(4) + rng.gen_range(0..4);
                InferenceInput::Pair {
                    premise: generate_text(&mut rng, words),
                    hypothesis: generate_text(&mut rng, hypothesis_words),
                }
            }
        })
        .collect()
}

fn fingerprint(text: &str, round: u64) -> u64 {
    let mut hasher = AHasher::default();
    round.hash(&mut hasher);
    text.hash(&mut hasher);
    hasher.finish()
}

/// Produces fixed-dimension vectors from hashed tokens.
#[derive(Clone, Debug)]
pub struct SimulatedEmbedder {
    pub dimensions: usize,
}

impl Default for SimulatedEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl InferenceTarget for SimulatedEmbedder {
    type Output = Vec<f32>;

    fn component(&self) -> &str {
        "embedding"
    }

    fn input_kind(&self) -> InputKind {
        InputKind::Text
    }

    fn concurrent_safe(&self) -> bool {
        true
    }

    fn infer(&self, batch: &[InferenceInput]) -> Result<Vec<Vec<f32>>, HarnessError> {
        batch
            .iter()
            .map(|input| match input {
                InferenceInput::Text(text) => Ok(self.embed(text)),
                InferenceInput::Pair { .. } => Err(HarnessError::target(
                    "embedding model expects single texts",
                )),
            })
            .collect()
    }
}

impl SimulatedEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        if vector.is_empty() {
            return vector;
        }
        for (pos, token) in text.split_whitespace().enumerate() {
            for round in 0..4u64 {
                let h = fingerprint(token, round ^ pos as u64);
                let slot = (h as usize) % self.dimensions;
                let sign = if h & 1 == 0 { 1.0 } else { -1.0 };
                vector[slot] += sign;
            }
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NliLabel {
    Entailment,
    Neutral,
    Contradiction,
}

/// Labels premise/hypothesis pairs by token overlap.
#[derive(Clone, Debug, Default)]
pub struct SimulatedNli;

impl InferenceTarget for SimulatedNli {
    type Output = NliLabel;

    fn component(&self) -> &str {
        "nli"
    }

    fn input_kind(&self) -> InputKind {
        InputKind::Pair
    }

    fn infer(&self, batch: &[InferenceInput]) -> Result<Vec<NliLabel>, HarnessError> {
        batch
            .iter()
            .map(|input| match input {
                InferenceInput::Pair {
                    premise,
                    hypothesis,
                } => Ok(classify(premise, hypothesis)),
                InferenceInput::Text(_) => Err(HarnessError::target(
                    "nli model expects premise/hypothesis pairs",
                )),
            })
            .collect()
    }
}

fn classify(premise: &str, hypothesis: &str) -> NliLabel {
    let premise_tokens: Vec<u64> = premise
        .split_whitespace()
        .map(|t| fingerprint(t, 0))
        .collect();
    let mut shared = 0usize;
    let mut total = 0usize;
    for token in hypothesis.split_whitespace() {
        total += 1;
        let h = fingerprint(token, 0);
        if premise_tokens.contains(&h) {
            shared += 1;
        }
    }
    let overlap_pct = (shared * 100).checked_div(total).unwrap_or(0);
    if overlap_pct >= 70 {
        NliLabel::Entailment
    } else if overlap_pct >= 30 {
        NliLabel::Neutral
    } else {
        NliLabel::Contradiction
    }
}
