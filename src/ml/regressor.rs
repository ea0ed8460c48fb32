/// A fitted regression model over fixed-width feature rows.
///
/// Callers are responsible for passing rows of width [`Regressor::n_features`];
/// the forecasting layer checks this before predicting.
pub trait Regressor: Send + Sync {
    fn n_features(&self) -> usize;

    fn predict_row(&self, row: &[f64]) -> f64;

    fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}
