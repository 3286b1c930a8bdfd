//! Reference lexical encoder.
//!
//! Weights each distinct token of a text by `ln(1 + tf)`. It stands in for a
//! learned sparse model so the pipeline can run end to end from the command
//! line.

use sparse_ingest::{
    EncoderFactory, Error, ModelKey, Result, SparseEncoder, TokenWeights, VocabularyTable,
};
use std::collections::{HashMap, HashSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;

/// Lowercased alphanumeric runs of `text`.
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

/// Stateless, so handles can be shared freely.
#[derive(Debug, Default)]
pub struct LexicalEncoder;

impl SparseEncoder for LexicalEncoder {
    fn encode(&mut self, texts: &[&str]) -> Result<Vec<TokenWeights>> {
        Ok(texts.iter().map(|text| weigh(text)).collect())
    }
}

fn weigh(text: &str) -> TokenWeights {
    let mut counts: Vec<(String, u32)> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for token in tokenize(text) {
        match seen.get(&token) {
            Some(&i) => counts[i].1 += 1,
            None => {
                seen.insert(token.clone(), counts.len());
                counts.push((token, 1));
            }
        }
    }

    counts
        .into_iter()
        .map(|(token, tf)| (token, (tf as f32).ln_1p()))
        .collect()
}

#[derive(Debug)]
enum Source {
    File(PathBuf),
    Corpus(Vec<String>),
}

#[derive(Debug)]
pub struct LexicalFactory {
    key: ModelKey,
    source: Source,
}

impl LexicalFactory {
    /// Vocabulary read from `path`, one token per line.
    pub fn from_file(path: PathBuf) -> Self {
        Self {
            key: ModelKey::new(format!("lexical:{}", path.display())),
            source: Source::File(path),
        }
    }

    /// Vocabulary made of every token in `documents`, in order of first
    /// appearance.
    ///
    /// The model key is derived from that token list, so two different
    /// corpora never share a cached vocabulary.
    pub fn from_corpus<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut seen = HashSet::new();
        let tokens: Vec<String> = documents
            .iter()
            .flat_map(|doc| tokenize(doc.as_ref()).collect::<Vec<_>>())
            .filter(|token| seen.insert(token.clone()))
            .collect();

        let mut hasher = DefaultHasher::new();
        tokens.hash(&mut hasher);

        Self {
            key: ModelKey::new(format!(
                "lexical:corpus:{}:{:016x}",
                tokens.len(),
                hasher.finish()
            )),
            source: Source::Corpus(tokens),
        }
    }
}

impl EncoderFactory for LexicalFactory {
    type Encoder = LexicalEncoder;

    fn model_key(&self) -> ModelKey {
        self.key.clone()
    }

    fn vocabulary(&self) -> Result<VocabularyTable> {
        match &self.source {
            Source::Corpus(tokens) => VocabularyTable::from_tokens(tokens.iter().cloned()),
            Source::File(path) => {
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    Error::encoder(format!("cannot read vocabulary {}: {e}", path.display()))
                })?;
                VocabularyTable::from_tokens(
                    contents.lines().map(str::trim).filter(|line| !line.is_empty()),
                )
            }
        }
    }

    fn build(&self) -> Result<LexicalEncoder> {
        Ok(LexicalEncoder)
    }

    fn share(&self, _primary: &LexicalEncoder) -> Option<LexicalEncoder> {
        Some(LexicalEncoder)
    }
}
