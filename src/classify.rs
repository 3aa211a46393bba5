//! Hierarchical text classification.
//!
//! Three independent single-level predictors share one TF-IDF vectorization
//! of the input text; their outputs form a [`LabelPath`]. Training builds a
//! fresh immutable [`TrainedModel`] and swaps it in whole, so a retrain never
//! mutates predictor state that a reader could be using.
//!
//! The vectorizer and the multinomial naive-Bayes model are implemented here
//! with `std` collections. Both sort their vocabularies and class lists, and
//! break argmax ties toward the lowest index, so classification is fully
//! deterministic for a fixed training set.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::config::Config;
use crate::models::LabelPath;

/// Laplace smoothing constant for the naive-Bayes feature counts.
const SMOOTHING_ALPHA: f64 = 1.0;

/// One `{text, label}` training record from the training-data file.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingExample {
    pub text: String,
    pub label: String,
}

/// Typed classifier failures surfaced to callers.
#[derive(Debug)]
pub enum ClassifyError {
    /// `classify` was invoked before any successful training run.
    NotTrained,
    /// Training was invoked with zero well-formed examples.
    EmptyTrainingSet,
}

impl std::fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifyError::NotTrained => write!(f, "classifier has not been trained"),
            ClassifyError::EmptyTrainingSet => {
                write!(f, "no well-formed training examples (labels need exactly three segments)")
            }
        }
    }
}

impl std::error::Error for ClassifyError {}

/// Counts reported after a training run.
#[derive(Debug, Clone, Copy)]
pub struct TrainingReport {
    pub total: usize,
    pub used: usize,
    pub skipped: usize,
}

// ============ Tokenization ============

/// Lower-cased word tokens of two or more alphanumeric characters.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

// ============ TF-IDF vectorizer ============

/// Term-frequency–inverse-document-frequency vectorizer.
///
/// Fitted once over the whole training corpus and shared by all three level
/// predictors. Uses smoothed idf (`ln((1+n)/(1+df)) + 1`) and L2-normalized
/// rows. The vocabulary is sorted so feature indices are reproducible.
#[derive(Debug, Clone)]
pub struct TfidfVectorizer {
    vocabulary: HashMap<String, usize>,
    idf: Vec<f64>,
}

/// Sparse vector: (feature index, weight) pairs sorted by index.
pub type SparseVec = Vec<(usize, f64)>;

impl TfidfVectorizer {
    pub fn fit(documents: &[&str]) -> Self {
        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let mut seen: Vec<String> = tokenize(doc);
            seen.sort();
            seen.dedup();
            for token in seen {
                *document_frequency.entry(token).or_insert(0) += 1;
            }
        }

        let mut terms: Vec<String> = document_frequency.keys().cloned().collect();
        terms.sort();

        let n = documents.len() as f64;
        let mut vocabulary = HashMap::with_capacity(terms.len());
        let mut idf = Vec::with_capacity(terms.len());
        for (index, term) in terms.into_iter().enumerate() {
            let df = document_frequency[&term] as f64;
            idf.push(((1.0 + n) / (1.0 + df)).ln() + 1.0);
            vocabulary.insert(term, index);
        }

        Self { vocabulary, idf }
    }

    pub fn n_features(&self) -> usize {
        self.idf.len()
    }

    pub fn transform(&self, text: &str) -> SparseVec {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in tokenize(text) {
            if let Some(&index) = self.vocabulary.get(&token) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let mut row: SparseVec = counts
            .into_iter()
            .map(|(index, tf)| (index, tf * self.idf[index]))
            .collect();
        row.sort_by_key(|&(index, _)| index);

        let norm = row.iter().map(|&(_, w)| w * w).sum::<f64>().sqrt();
        if norm > 0.0 {
            for entry in &mut row {
                entry.1 /= norm;
            }
        }
        row
    }
}

// ============ Multinomial naive Bayes ============

/// Multinomial naive Bayes over TF-IDF rows, Laplace-smoothed.
///
/// Classes are sorted at fit time; prediction ties resolve to the lowest
/// class index, which keeps repeated runs byte-identical.
#[derive(Debug, Clone)]
pub struct MultinomialNb {
    classes: Vec<String>,
    class_log_prior: Vec<f64>,
    feature_log_prob: Vec<Vec<f64>>,
}

impl MultinomialNb {
    pub fn fit(rows: &[SparseVec], labels: &[String], n_features: usize) -> Self {
        debug_assert_eq!(rows.len(), labels.len());

        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();

        let class_index: HashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();

        let mut class_counts = vec![0usize; classes.len()];
        let mut feature_counts = vec![vec![0.0f64; n_features]; classes.len()];

        for (row, label) in rows.iter().zip(labels) {
            let ci = class_index[label.as_str()];
            class_counts[ci] += 1;
            for &(feature, weight) in row {
                feature_counts[ci][feature] += weight;
            }
        }

        let n_samples = rows.len() as f64;
        let class_log_prior = class_counts
            .iter()
            .map(|&count| (count as f64 / n_samples).ln())
            .collect();

        let feature_log_prob = feature_counts
            .iter()
            .map(|counts| {
                let total: f64 = counts.iter().sum::<f64>() + SMOOTHING_ALPHA * n_features as f64;
                counts
                    .iter()
                    .map(|&count| ((count + SMOOTHING_ALPHA) / total).ln())
                    .collect()
            })
            .collect();

        Self {
            classes,
            class_log_prior,
            feature_log_prob,
        }
    }

    pub fn predict(&self, row: &SparseVec) -> &str {
        let mut best_index = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (ci, prior) in self.class_log_prior.iter().enumerate() {
            let mut score = *prior;
            for &(feature, weight) in row {
                score += weight * self.feature_log_prob[ci][feature];
            }
            // Strict comparison keeps the lowest class index on ties.
            if score > best_score {
                best_score = score;
                best_index = ci;
            }
        }
        &self.classes[best_index]
    }
}

// ============ Hierarchical model ============

/// An immutable trained model: shared vectorizer plus one predictor per level.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    vectorizer: TfidfVectorizer,
    level1: MultinomialNb,
    level2: MultinomialNb,
    level3: MultinomialNb,
}

impl TrainedModel {
    /// Vectorize once, apply all three predictors independently.
    pub fn classify(&self, text: &str) -> LabelPath {
        let row = self.vectorizer.transform(text);
        LabelPath {
            level1: self.level1.predict(&row).to_string(),
            level2: self.level2.predict(&row).to_string(),
            level3: self.level3.predict(&row).to_string(),
        }
    }
}

/// Classifier state machine: `Untrained -> Trained`.
///
/// Retraining replaces the whole model value; there is no incremental update.
#[derive(Debug, Default)]
pub struct Classifier {
    model: Option<TrainedModel>,
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    /// Fit the shared vectorizer and the three level predictors.
    ///
    /// Examples whose label does not have exactly three segments are skipped.
    /// Zero usable examples is a descriptive error and leaves any previously
    /// trained model in place.
    pub fn train(&mut self, examples: &[TrainingExample]) -> Result<TrainingReport, ClassifyError> {
        let mut texts: Vec<&str> = Vec::new();
        let mut labels1: Vec<String> = Vec::new();
        let mut labels2: Vec<String> = Vec::new();
        let mut labels3: Vec<String> = Vec::new();

        for example in examples {
            let Some(path) = LabelPath::parse(&example.label) else {
                continue;
            };
            texts.push(&example.text);
            labels1.push(path.level1);
            labels2.push(path.level2);
            labels3.push(path.level3);
        }

        if texts.is_empty() {
            return Err(ClassifyError::EmptyTrainingSet);
        }

        let vectorizer = TfidfVectorizer::fit(&texts);
        let rows: Vec<SparseVec> = texts.iter().map(|t| vectorizer.transform(t)).collect();
        let n_features = vectorizer.n_features();

        let model = TrainedModel {
            level1: MultinomialNb::fit(&rows, &labels1, n_features),
            level2: MultinomialNb::fit(&rows, &labels2, n_features),
            level3: MultinomialNb::fit(&rows, &labels3, n_features),
            vectorizer,
        };

        let used = texts.len();
        self.model = Some(model);
        Ok(TrainingReport {
            total: examples.len(),
            used,
            skipped: examples.len() - used,
        })
    }

    /// Classify text into a three-level label path.
    ///
    /// Fails with [`ClassifyError::NotTrained`] while untrained.
    pub fn classify(&self, text: &str) -> Result<LabelPath, ClassifyError> {
        self.model
            .as_ref()
            .map(|model| model.classify(text))
            .ok_or(ClassifyError::NotTrained)
    }
}

// ============ Training data ============

/// Load the JSON training-data array.
///
/// A missing file is zero examples, not an error; malformed JSON is an error.
pub fn load_training_data(path: &Path) -> Result<Vec<TrainingExample>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "training data not found, classifier stays untrained");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse training data {}", path.display()))
}

/// Build a classifier from the configured training data.
///
/// Used by every command that classifies; an empty training set yields an
/// untrained classifier, which callers degrade to the unclassified sentinel.
pub fn build_classifier(config: &Config) -> Result<Classifier> {
    let examples = load_training_data(&config.classifier.training_data)?;
    let mut classifier = Classifier::new();
    if !examples.is_empty() {
        match classifier.train(&examples) {
            Ok(report) => {
                tracing::debug!(
                    used = report.used,
                    skipped = report.skipped,
                    "classifier trained"
                );
            }
            Err(e) => warn!(error = %e, "training produced no usable model"),
        }
    }
    Ok(classifier)
}

/// Run the train command: reload training data, refit, report counts.
pub fn run_train(config: &Config) -> Result<()> {
    let examples = load_training_data(&config.classifier.training_data)?;
    let mut classifier = Classifier::new();

    println!("train");
    println!("  examples loaded: {}", examples.len());

    match classifier.train(&examples) {
        Ok(report) => {
            println!("  used: {}", report.used);
            println!("  skipped (malformed label): {}", report.skipped);
            println!("ok");
        }
        Err(e) => {
            println!("  used: 0");
            println!("error: {}", e);
        }
    }
    Ok(())
}
