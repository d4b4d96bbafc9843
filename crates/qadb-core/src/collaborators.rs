//! Interfaces of the services that sit next to retrieval in the product.
//!
//! Only the contracts live here; implementations belong to the surrounding
//! application (classifier host, patient database).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Label/confidence pair produced by a risk classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f64,
}

pub trait RiskPredictor: Send + Sync {
    /// Number of features the model was trained on.
    fn feature_len(&self) -> usize;

    fn predict_features(&self, features: &[f64]) -> anyhow::Result<Prediction>;

    /// Rejects vectors whose length differs from [`RiskPredictor::feature_len`].
    fn predict(&self, features: &[f64]) -> anyhow::Result<Prediction> {
        if features.len() != self.feature_len() {
            anyhow::bail!("expected {} features, got {}", self.feature_len(), features.len());
        }
        self.predict_features(features)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Internal row id assigned by the store.
    pub id: i64,
    /// External identifier, e.g. `ANM123-001`.
    pub patient_id: String,
    pub name: Option<String>,
}

pub trait PatientStore: Send + Sync {
    /// Insert or update the patient keyed by `external_id`.
    fn upsert_patient(&self, external_id: &str, name: Option<&str>) -> anyhow::Result<PatientRecord>;

    /// Append a visit for the patient with internal id `patient_db_id`.
    fn insert_visit(&self, patient_db_id: i64, form_data: &Value, prediction: &Prediction) -> anyhow::Result<()>;
}
