use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Class names in label order (0 = died, 1 = survived)
pub const CLASS_NAMES: [&str; 2] = ["died", "survived"];

/// Model evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Macro-averaged precision
    pub precision: f64,

    /// Macro-averaged recall
    pub recall: f64,

    /// Macro-averaged F1 score
    pub f1_score: f64,

    /// Confusion matrix (rows = true class, columns = predicted class)
    pub confusion_matrix: Option<Array2<usize>>,

    /// Per-class metrics
    pub per_class_metrics: BTreeMap<String, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            confusion_matrix: None,
            per_class_metrics: BTreeMap::new(),
        }
    }

    /// Score predictions against ground truth for `class_names.len()` classes
    pub fn evaluate(y_true: &[usize], y_pred: &[usize], class_names: &[&str]) -> Self {
        let n_samples = y_true.len();
        let n_classes = class_names.len();
        if n_samples == 0 || n_classes == 0 {
            return Self::new();
        }

        let mut confusion = Array2::<usize>::zeros((n_classes, n_classes));
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            if t < n_classes && p < n_classes {
                confusion[[t, p]] += 1;
            }
        }

        let correct: usize = (0..n_classes).map(|c| confusion[[c, c]]).sum();
        let accuracy = correct as f64 / n_samples as f64;

        let mut per_class = BTreeMap::new();
        for (class_idx, name) in class_names.iter().enumerate() {
            let tp = confusion[[class_idx, class_idx]];
            let predicted: usize = confusion.column(class_idx).sum();
            let support: usize = confusion.row(class_idx).sum();

            let precision = if predicted > 0 {
                tp as f64 / predicted as f64
            } else {
                0.0
            };

            let recall = if support > 0 {
                tp as f64 / support as f64
            } else {
                0.0
            };

            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            per_class.insert(
                name.to_string(),
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1,
                    support,
                },
            );
        }

        let avg = |f: fn(&ClassMetrics) -> f64| {
            per_class.values().map(f).sum::<f64>() / n_classes as f64
        };

        Self {
            accuracy,
            precision: avg(|m| m.precision),
            recall: avg(|m| m.recall),
            f1_score: avg(|m| m.f1_score),
            confusion_matrix: Some(confusion),
            per_class_metrics: per_class,
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders like a classification report
impl fmt::Display for ModelMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for (name, m) in &self.per_class_metrics {
            writeln!(
                f,
                "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                name, m.precision, m.recall, m.f1_score, m.support
            )?;
        }
        let total: usize = self.per_class_metrics.values().map(|m| m.support).sum();
        writeln!(f)?;
        writeln!(f, "{:>12} {:>32.2} {:>10}", "accuracy", self.accuracy, total)?;
        write!(
            f,
            "{:>12} {:>10.2} {:>10.2} {:>10.2} {:>10}",
            "macro avg", self.precision, self.recall, self.f1_score, total
        )
    }
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model version
    pub version: String,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Training metrics
    pub training_metrics: ModelMetrics,

    /// Validation metrics
    pub validation_metrics: Option<ModelMetrics>,

    /// Hyperparameters
    pub hyperparameters: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let y = vec![0, 1, 1, 0, 1];
        let metrics = ModelMetrics::evaluate(&y, &y, &CLASS_NAMES);

        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.precision, 1.0);
        assert_eq!(metrics.recall, 1.0);
        assert_eq!(metrics.per_class_metrics["survived"].support, 3);
        assert_eq!(metrics.per_class_metrics["died"].support, 2);
    }

    #[test]
    fn test_per_class_breakdown() {
        let y_true = vec![0, 0, 0, 1, 1];
        let y_pred = vec![0, 0, 1, 1, 0];
        let metrics = ModelMetrics::evaluate(&y_true, &y_pred, &CLASS_NAMES);

        assert!((metrics.accuracy - 0.6).abs() < 1e-12);

        let died = &metrics.per_class_metrics["died"];
        assert!((died.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((died.recall - 2.0 / 3.0).abs() < 1e-12);

        let survived = &metrics.per_class_metrics["survived"];
        assert!((survived.precision - 0.5).abs() < 1e-12);
        assert!((survived.recall - 0.5).abs() < 1e-12);

        let confusion = metrics.confusion_matrix.unwrap();
        assert_eq!(confusion[[0, 0]], 2);
        assert_eq!(confusion[[0, 1]], 1);
        assert_eq!(confusion[[1, 0]], 1);
        assert_eq!(confusion[[1, 1]], 1);
    }

    #[test]
    fn test_empty_evaluation() {
        let metrics = ModelMetrics::evaluate(&[], &[], &CLASS_NAMES);
        assert_eq!(metrics.accuracy, 0.0);
        assert!(metrics.confusion_matrix.is_none());
    }

    #[test]
    fn test_report_rendering() {
        let metrics = ModelMetrics::evaluate(&[0, 1], &[0, 1], &CLASS_NAMES);
        let report = metrics.to_string();
        assert!(report.contains("precision"));
        assert!(report.contains("survived"));
        assert!(report.contains("macro avg"));
    }
}
