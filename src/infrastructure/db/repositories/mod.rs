mod assessments;
mod feature_flags;
mod prediction_models;

pub use assessments::AssessmentRepository;
pub use feature_flags::{FeatureFlag, FeatureFlagRepository, PREDICT_AB_FLAG};
pub use prediction_models::{PredictionModelInput, PredictionModelRepository};
