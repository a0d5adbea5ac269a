//! The capability the harness benchmarks: something that takes an ordered
//! batch of inputs and returns one output per input. How the model runs is
//! the implementor's business; the harness only times the call.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::HarnessError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// One text per item, e.g. an embedding model.
    Text,
    /// A premise/hypothesis pair per item, e.g. an NLI classifier.
    Pair,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InferenceInput {
    Text(String),
    Pair { premise: String, hypothesis: String },
}

impl InferenceInput {
    pub fn kind(&self) -> InputKind {
        match self {
            InferenceInput::Text(_) => InputKind::Text,
            InferenceInput::Pair { .. } => InputKind::Pair,
        }
    }

    /// Total characters the model has to read for this item.
    pub fn char_len(&self) -> usize {
        match self {
            InferenceInput::Text(text) => text.len(),
            InferenceInput::Pair {
                premise,
                hypothesis,
            } => premise.len() + hypothesis.len(),
        }
    }
}

pub trait InferenceTarget: Send + Sync {
    type Output: Send + 'static;

    /// Component name used in scenario keys, e.g. `embedding` or `nli`.
    fn component(&self) -> &str;

    fn input_kind(&self) -> InputKind;

    /// Whether independent scenarios may call `infer` from several threads
    /// at once. Defaults to no.
    fn concurrent_safe(&self) -> bool {
        false
    }

    fn infer(&self, batch: &[InferenceInput]) -> Result<Vec<Self::Output>, HarnessError>;
}

impl<T: InferenceTarget + ?Sized> InferenceTarget for Arc<T> {
    type Output = T::Output;

    fn component(&self) -> &str {
        (**self).component()
    }

    fn input_kind(&self) -> InputKind {
        (**self).input_kind()
    }

    fn concurrent_safe(&self) -> bool {
        (**self).concurrent_safe()
    }

    fn infer(&self, batch: &[InferenceInput]) -> Result<Vec<Self::Output>, HarnessError> {
        (**self).infer(batch)
    }
}

/// Adapts a closure into a target, handy for tests and one-off harnesses.
pub struct FnTarget<F> {
    component: String,
    kind: InputKind,
    concurrent_safe: bool,
    func: F,
}

impl<F, O> FnTarget<F>
where
    F: Fn(&[InferenceInput]) -> Result<Vec<O>, HarnessError> + Send + Sync,
    O: Send + 'static,
{
    pub fn new<T: Into<String>>(component: T, kind: InputKind, func: F) -> Self {
        Self {
            component: component.into(),
            kind,
            concurrent_safe: false,
            func,
        }
    }

    pub fn concurrent(mut self) -> Self {
        self.concurrent_safe = true;
        self
    }
}

impl<F, O> InferenceTarget for FnTarget<F>
where
    F: Fn(&[InferenceInput]) -> Result<Vec<O>, HarnessError> + Send + Sync,
    O: Send + 'static,
{
    type Output = O;

    fn component(&self) -> &str {
        &self.component
    }

    fn input_kind(&self) -> InputKind {
        self.kind
    }

    fn concurrent_safe(&self) -> bool {
        self.concurrent_safe
    }

    fn infer(&self, batch: &[InferenceInput]) -> Result<Vec<O>, HarnessError> {
        (self.func)(batch)
    }
}
