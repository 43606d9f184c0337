//! Trained biased matrix-factorization model.
//!
//! A `FactorModel` is immutable once built. Serving code shares it behind an
//! `Arc` and never mutates it, so concurrent readers need no locking.

use crate::matrix::IdIndex;
use bookrec_core::types::{Hyperparameters, RatingScale};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};

#[derive(Debug, Clone)]
pub struct FactorModel {
    pub(crate) global_mean: f64,
    pub(crate) users: IdIndex,
    pub(crate) items: IdIndex,
    pub(crate) user_bias: Array1<f64>,
    pub(crate) item_bias: Array1<f64>,
    /// U x F.
    pub(crate) user_factors: Array2<f64>,
    /// I x F.
    pub(crate) item_factors: Array2<f64>,
    pub(crate) rating_scale: RatingScale,
    pub(crate) hyperparameters: Hyperparameters,
    pub(crate) trained_at: DateTime<Utc>,
}

impl FactorModel {
    /// Raw prediction for known indices:
    /// `mean + b_u + b_i + <p_u, q_i>`, unclipped.
    pub fn predict_raw(&self, user: usize, item: usize) -> f64 {
        self.global_mean
            + self.user_bias[user]
            + self.item_bias[item]
            + self.user_factors.row(user).dot(&self.item_factors.row(item))
    }

    /// Unclipped estimate by identifier with the cold-start fallback:
    /// an unknown user contributes no bias or factors, an unknown item
    /// likewise, and with both unknown only the global mean remains.
    pub fn estimate(&self, user_id: &str, item_id: &str) -> f64 {
        let user = self.users.index_of(user_id);
        let item = self.items.index_of(item_id);
        match (user, item) {
            (Some(u), Some(i)) => self.predict_raw(u, i),
            (Some(u), None) => self.global_mean + self.user_bias[u],
            (None, Some(i)) => self.global_mean + self.item_bias[i],
            (None, None) => self.global_mean,
        }
    }

    /// Estimate clipped into the rating scale, as served to callers.
    pub fn estimate_clipped(&self, user_id: &str, item_id: &str) -> f64 {
        self.rating_scale.clip(self.estimate(user_id, item_id))
    }

    /// True when every learned parameter is finite.
    pub fn is_finite(&self) -> bool {
        self.global_mean.is_finite()
            && self.user_bias.iter().all(|v| v.is_finite())
            && self.item_bias.iter().all(|v| v.is_finite())
            && self.user_factors.iter().all(|v| v.is_finite())
            && self.item_factors.iter().all(|v| v.is_finite())
    }

    pub fn global_mean(&self) -> f64 {
        self.global_mean
    }

    pub fn users(&self) -> &IdIndex {
        &self.users
    }

    pub fn items(&self) -> &IdIndex {
        &self.items
    }

    pub fn user_bias(&self) -> &Array1<f64> {
        &self.user_bias
    }

    pub fn item_bias(&self) -> &Array1<f64> {
        &self.item_bias
    }

    pub fn user_factors(&self) -> &Array2<f64> {
        &self.user_factors
    }

    pub fn item_factors(&self) -> &Array2<f64> {
        &self.item_factors
    }

    pub fn n_factors(&self) -> usize {
        self.user_factors.ncols()
    }

    pub fn rating_scale(&self) -> RatingScale {
        self.rating_scale
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}
