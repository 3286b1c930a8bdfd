//! Instrumented encoder used across the crate's tests.

use crate::{
    EncoderFactory, Error, ModelKey, Result, SparseEncoder, TokenWeights, VocabularyTable,
};
use core::time::Duration;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::ThreadId;

static NEXT_MODEL: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    Fail,
    Panic,
    Sleep(Duration),
}

struct FaultRule {
    trigger: String,
    fault: Fault,
    remaining: usize,
}

/// Shared counters and fault rules observed by every handle of a factory.
#[derive(Default)]
pub(crate) struct Probe {
    pub builds: AtomicUsize,
    pub vocabulary_loads: AtomicUsize,
    pub encode_calls: AtomicUsize,
    pub encoded_texts: AtomicUsize,
    threads_per_handle: Mutex<HashMap<usize, HashSet<ThreadId>>>,
    calls_per_handle: Mutex<HashMap<usize, usize>>,
    faults: Mutex<Vec<FaultRule>>,
    jitter: Mutex<Option<Duration>>,
}

impl Probe {
    pub fn encoded_texts(&self) -> usize {
        self.encoded_texts.load(Ordering::SeqCst)
    }

    /// Number of distinct threads each handle was used from.
    pub fn threads_per_handle(&self) -> Vec<usize> {
        self.threads_per_handle
            .lock()
            .values()
            .map(HashSet::len)
            .collect()
    }

    /// Encode calls made through handle number `handle`.
    pub fn calls_on(&self, handle: usize) -> usize {
        self.calls_per_handle
            .lock()
            .get(&handle)
            .copied()
            .unwrap_or(0)
    }

    fn take_fault(&self, texts: &[&str]) -> Option<Fault> {
        let mut faults = self.faults.lock();
        faults
            .iter_mut()
            .find(|rule| rule.remaining > 0 && texts.iter().any(|t| *t == rule.trigger))
            .map(|rule| {
                rule.remaining -= 1;
                rule.fault
            })
    }
}

#[derive(Clone)]
pub(crate) struct TestFactory {
    model: ModelKey,
    vocabulary: Vec<String>,
    pub probe: Arc<Probe>,
    shareable: bool,
}

impl TestFactory {
    pub fn new<I, S>(vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = NEXT_MODEL.fetch_add(1, Ordering::Relaxed);
        Self {
            model: ModelKey::new(format!("test-model-{id}")),
            vocabulary: vocabulary.into_iter().map(Into::into).collect(),
            probe: Arc::new(Probe::default()),
            shareable: false,
        }
    }

    /// Vocabulary covering `word0 .. word{n-1}`.
    pub fn numbered(n: usize) -> Self {
        Self::new((0..n).map(|i| format!("word{i}")))
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = ModelKey::from(model);
        self
    }

    pub fn shareable(mut self) -> Self {
        self.shareable = true;
        self
    }

    /// Applies `fault` to the next `times` encode calls whose batch contains
    /// the exact text `trigger`.
    pub fn fault_on(self, trigger: &str, fault: Fault, times: usize) -> Self {
        self.probe.faults.lock().push(FaultRule {
            trigger: trigger.to_string(),
            fault,
            remaining: times,
        });
        self
    }

    /// Sleeps a random duration below `max` in every encode call.
    pub fn with_jitter(self, max: Duration) -> Self {
        *self.probe.jitter.lock() = Some(max);
        self
    }
}

pub(crate) struct TestEncoder {
    handle: usize,
    probe: Arc<Probe>,
}

impl SparseEncoder for TestEncoder {
    fn encode(&mut self, texts: &[&str]) -> Result<Vec<TokenWeights>> {
        self.probe.encode_calls.fetch_add(1, Ordering::SeqCst);
        self.probe
            .threads_per_handle
            .lock()
            .entry(self.handle)
            .or_default()
            .insert(std::thread::current().id());
        *self.probe.calls_per_handle.lock().entry(self.handle).or_default() += 1;

        let jitter = *self.probe.jitter.lock();
        if let Some(max) = jitter {
            let micros = rand::rng().random_range(0..max.as_micros().max(1) as u64);
            std::thread::sleep(Duration::from_micros(micros));
        }

        match self.probe.take_fault(texts) {
            Some(Fault::Fail) => return Err(Error::encoder("injected failure")),
            Some(Fault::Panic) => panic!("injected panic"),
            Some(Fault::Sleep(d)) => std::thread::sleep(d),
            None => {}
        }

        let output = texts.iter().map(|text| weigh(text)).collect();
        self.probe.encoded_texts.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(output)
    }
}

/// Lowercased whitespace tokens, weighted 0.5 per occurrence, in order of
/// first appearance.
pub(crate) fn weigh(text: &str) -> TokenWeights {
    let mut weights: TokenWeights = Vec::new();
    for token in text.split_whitespace().map(str::to_lowercase) {
        match weights.iter_mut().find(|(t, _)| *t == token) {
            Some((_, w)) => *w += 0.5,
            None => weights.push((token, 0.5)),
        }
    }
    weights
}

impl EncoderFactory for TestFactory {
    type Encoder = TestEncoder;

    fn model_key(&self) -> ModelKey {
        self.model.clone()
    }

    fn vocabulary(&self) -> Result<VocabularyTable> {
        self.probe.vocabulary_loads.fetch_add(1, Ordering::SeqCst);
        VocabularyTable::from_tokens(self.vocabulary.iter().cloned())
    }

    fn build(&self) -> Result<TestEncoder> {
        let handle = self.probe.builds.fetch_add(1, Ordering::SeqCst);
        Ok(TestEncoder {
            handle,
            probe: Arc::clone(&self.probe),
        })
    }

    fn share(&self, primary: &TestEncoder) -> Option<TestEncoder> {
        self.shareable.then(|| TestEncoder {
            handle: primary.handle,
            probe: Arc::clone(&self.probe),
        })
    }
}

/// `n` documents of the form `"word{i} word{i+1}"`.
pub(crate) fn documents(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("word{i} word{}", i + 1)).collect()
}
