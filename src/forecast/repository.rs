use crate::forecast::error::ModelError;
use crate::forecast::model::ForecastModel;
use crate::ml::forest::RandomForest;
use crate::utils::{write_bytes_atomically, BINCODE_CONFIG};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MODEL_FILE_NAME: &str = "model.bin";
const FEATURE_COLUMNS_FILE_NAME: &str = "feature_columns.json";

#[derive(Serialize)]
struct StoredModelRef<'a> {
    feature_columns: &'a [String],
    forest: &'a RandomForest,
}

#[derive(Deserialize)]
struct StoredModel {
    feature_columns: Vec<String>,
    forest: RandomForest,
}

/// On-disk home of a trained model.
///
/// `model.bin` holds the forest together with the columns it was fitted on;
/// `feature_columns.json` is a readable copy of that list. Both are written atomically
/// and must agree when loaded.
#[derive(Debug, Clone)]
pub struct ModelRepository {
    dir: PathBuf,
}

impl ModelRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(MODEL_FILE_NAME)
    }

    pub fn feature_columns_path(&self) -> PathBuf {
        self.dir.join(FEATURE_COLUMNS_FILE_NAME)
    }

    pub fn exists(&self) -> bool {
        self.model_path().is_file() && self.feature_columns_path().is_file()
    }

    pub fn save(&self, model: &ForecastModel) -> Result<(), ModelError> {
        let model_path = self.model_path();
        let columns_path = self.feature_columns_path();

        let stored = StoredModelRef {
            feature_columns: model.feature_columns(),
            forest: model.estimator(),
        };
        let model_bytes = bincode::serde::encode_to_vec(&stored, BINCODE_CONFIG)
            .map_err(|e| ModelError::ModelEncode(Box::new(e)))?;
        let column_bytes = serde_json::to_vec_pretty(model.feature_columns())
            .map_err(ModelError::FeatureColumnsEncode)?;

        write_bytes_atomically(&model_path, &model_bytes)
            .map_err(|e| ModelError::ArtifactWrite(model_path.clone(), e))?;
        write_bytes_atomically(&columns_path, &column_bytes)
            .map_err(|e| ModelError::ArtifactWrite(columns_path.clone(), e))?;

        info!(
            "Saved model ({} bytes, {} feature columns) to {}",
            model_bytes.len(),
            model.feature_columns().len(),
            self.dir.display()
        );
        Ok(())
    }

    pub fn load(&self) -> Result<ForecastModel, ModelError> {
        let model_path = self.model_path();
        let columns_path = self.feature_columns_path();
        for path in [&model_path, &columns_path] {
            if !path.is_file() {
                return Err(ModelError::ArtifactMissing(path.clone()));
            }
        }

        let model_bytes = std::fs::read(&model_path)
            .map_err(|e| ModelError::ArtifactRead(model_path.clone(), e))?;
        let (stored, _) =
            bincode::serde::decode_from_slice::<StoredModel, _>(&model_bytes, BINCODE_CONFIG)
                .map_err(|e| ModelError::ModelDecode(model_path.clone(), Box::new(e)))?;

        let column_bytes = std::fs::read(&columns_path)
            .map_err(|e| ModelError::ArtifactRead(columns_path.clone(), e))?;
        let columns: Vec<String> = serde_json::from_slice(&column_bytes)
            .map_err(|e| ModelError::FeatureColumnsDecode(columns_path.clone(), e))?;

        if columns != stored.feature_columns {
            return Err(ModelError::FeatureColumnMismatch {
                expected: stored.feature_columns,
                found: columns,
            });
        }

        let model = ForecastModel::new(stored.forest, columns)?;
        info!(
            "Loaded model with {} feature columns from {}",
            model.feature_columns().len(),
            self.dir.display()
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::forest::ForestParams;
    use crate::ml::regressor::Regressor;

    fn small_model() -> ForecastModel {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![(i % 24) as f64, (i % 7) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|row| row[0] * 2.0 - row[1]).collect();
        let params = ForestParams {
            n_estimators: 5,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, &params).unwrap();
        ForecastModel::new(forest, vec!["hour".to_string(), "day_of_week".to_string()]).unwrap()
    }

    #[test]
    fn test_round_trip_keeps_columns_and_predictions() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let repository = ModelRepository::new(dir.path().join("models"));
        assert!(!repository.exists());

        let model = small_model();
        repository.save(&model)?;
        assert!(repository.exists());

        let loaded = repository.load()?;
        assert_eq!(loaded.feature_columns(), model.feature_columns());
        for row in [[3.0, 1.0], [17.0, 6.0], [23.5, 0.0]] {
            assert_eq!(
                loaded.estimator().predict_row(&row),
                model.estimator().predict_row(&row)
            );
        }
        assert_eq!(loaded, model);
        Ok(())
    }

    #[test]
    fn test_missing_artifacts() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let repository = ModelRepository::new(dir.path());
        assert!(matches!(
            repository.load(),
            Err(ModelError::ArtifactMissing(_))
        ));

        repository.save(&small_model())?;
        std::fs::remove_file(repository.feature_columns_path())?;
        assert!(!repository.exists());
        match repository.load() {
            Err(ModelError::ArtifactMissing(path)) => {
                assert_eq!(path, repository.feature_columns_path())
            }
            other => panic!("expected a missing artifact, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_column_list_mismatch_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let repository = ModelRepository::new(dir.path());
        repository.save(&small_model())?;
        std::fs::write(
            repository.feature_columns_path(),
            r#"["hour", "day_of_week", "free"]"#,
        )?;

        assert!(matches!(
            repository.load(),
            Err(ModelError::FeatureColumnMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_corrupt_model_fails_to_decode() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let repository = ModelRepository::new(dir.path());
        repository.save(&small_model())?;
        std::fs::write(repository.model_path(), b"\x01\x02")?;

        assert!(matches!(
            repository.load(),
            Err(ModelError::ModelDecode(_, _))
        ));
        Ok(())
    }
}
