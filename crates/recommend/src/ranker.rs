//! Recommendation ranker.
//!
//! Scores every catalog item except the excluded one for a user, then keeps
//! the K best. Unknown users or items go through the model's cold-start
//! fallback instead of failing.

use bookrec_core::error::{RecError, RecResult};
use bookrec_core::types::RecommendationItem;
use bookrec_factorization::FactorModel;

/// Rank `catalog` for `user_id`, excluding `excluded_item`.
///
/// The result is sorted by estimated rating, highest first; equal estimates
/// keep catalog order. Fails with `UnknownFavorite` before any scoring if
/// `excluded_item` is not in the catalog.
pub fn rank(
    model: &FactorModel,
    user_id: &str,
    excluded_item: &str,
    catalog: &[String],
    k: usize,
) -> RecResult<Vec<RecommendationItem>> {
    if !catalog.iter().any(|item| item == excluded_item) {
        return Err(RecError::UnknownFavorite(excluded_item.to_string()));
    }

    let mut scored: Vec<RecommendationItem> = catalog
        .iter()
        .filter(|item| item.as_str() != excluded_item)
        .map(|item| RecommendationItem {
            item_id: item.clone(),
            estimated_rating: model.estimate_clipped(user_id, item),
        })
        .collect();

    // Stable sort, so ties stay in catalog order.
    scored.sort_by(|a, b| b.estimated_rating.total_cmp(&a.estimated_rating));
    scored.truncate(k);
    Ok(scored)
}

/// Inference entry point: top-K with estimates rounded to `decimals` places.
pub fn recommend(
    model: &FactorModel,
    user_id: &str,
    favorite_item: &str,
    catalog: &[String],
    k: usize,
    decimals: u32,
) -> RecResult<Vec<RecommendationItem>> {
    let mut items = rank(model, user_id, favorite_item, catalog, k)?;
    for item in &mut items {
        item.estimated_rating = round_to(item.estimated_rating, decimals);
    }
    Ok(items)
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
