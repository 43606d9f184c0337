//! Full flow: rating table -> grid search -> artifact -> recommendations.

use bookrec_core::config::RecommendConfig;
use bookrec_core::error::RecError;
use bookrec_core::types::{Hyperparameters, RatingScale};
use bookrec_factorization::{catalog_from_records, read_rating_csv, ModelStore, TableColumns};
use bookrec_recommend::RecommendEngine;
use bookrec_tuning::{train_pipeline, ConfigStatus, TrainingRequest};

const SMALL_TABLE: &str = "\
User-ID,Book-Title,Book-Rating,Book-Author
u1,a,8,someone
u1,b,5,someone
u2,a,9,someone
u2,c,7,someone
";

fn request(grid: Vec<Hyperparameters>) -> TrainingRequest {
    TrainingRequest {
        rating_scale: RatingScale::new(1.0, 10.0),
        grid,
        fold_count: 2,
        seed: 42,
        shuffle_each_epoch: true,
        init_std_dev: 0.1,
        parallelism: 2,
    }
}

fn small_grid() -> Vec<Hyperparameters> {
    vec![
        Hyperparameters {
            n_factors: 2,
            learning_rate: 0.005,
            regularization: 0.02,
            n_epochs: 20,
        },
        Hyperparameters {
            n_factors: 4,
            learning_rate: 0.01,
            regularization: 0.05,
            n_epochs: 20,
        },
    ]
}

/// 30 users x 20 books with a little structure so CV has signal.
fn larger_table() -> String {
    let mut csv = String::from("User-ID,Book-Title,Book-Rating\n");
    for u in 0..30 {
        for i in 0..20 {
            if (u * 7 + i * 3) % 4 != 0 {
                let taste = if (u % 2) == (i % 2) { 8 } else { 4 };
                let rating = taste + ((u + i) % 3) as i32 - 1;
                csv.push_str(&format!("user{u},book {i},{rating}\n"));
            }
        }
    }
    csv
}

#[test]
fn test_small_table_end_to_end() {
    let records = read_rating_csv(
        SMALL_TABLE.as_bytes(),
        &TableColumns::default(),
        RatingScale::default(),
    )
    .unwrap();
    let catalog = catalog_from_records(&records);
    assert_eq!(catalog, vec!["a", "b", "c"]);

    let outcome = train_pipeline(&records, &request(small_grid())).unwrap();
    assert!(small_grid().contains(&outcome.best_config));
    assert!(outcome.metrics.mean_rmse().is_finite());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model").join("bookrec-model.json");
    outcome.save_model(&path).unwrap();

    let loaded = ModelStore::load(&path).unwrap();
    for user in ["u1", "u2", "u3"] {
        for item in ["a", "b", "c", "zzz"] {
            assert_eq!(
                loaded.estimate(user, item).to_bits(),
                outcome.model.estimate(user, item).to_bits(),
                "{user}/{item}"
            );
        }
    }

    let engine = RecommendEngine::load(&path, catalog, RecommendConfig::default()).unwrap();
    let response = engine.recommend("u1", "a").unwrap();
    let mut ids: Vec<&str> = response
        .recommendations
        .iter()
        .map(|r| r.item_id.as_str())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["b", "c"]);

    // Unknown user falls back to the item bias.
    let model = engine.snapshot();
    let a = model.items().index_of("a").unwrap();
    let expected = model.global_mean() + model.item_bias()[a];
    let ranked = bookrec_recommend::rank(&model, "u3", "b", engine.catalog(), 10).unwrap();
    let a_score = ranked.iter().find(|r| r.item_id == "a").unwrap();
    assert!((a_score.estimated_rating - model.rating_scale().clip(expected)).abs() < 1e-12);

    let err = engine.recommend("u1", "dune").unwrap_err();
    assert!(matches!(err, RecError::UnknownFavorite(_)));
}

#[test]
fn test_grid_search_excludes_diverging_configuration() {
    let records = read_rating_csv(
        larger_table().as_bytes(),
        &TableColumns::default(),
        RatingScale::default(),
    )
    .unwrap();

    let mut grid = small_grid();
    grid.push(Hyperparameters {
        n_factors: 2,
        learning_rate: 1e6,
        regularization: 0.0,
        n_epochs: 20,
    });

    let outcome = train_pipeline(&records, &request(grid)).unwrap();
    assert_eq!(outcome.search.outcomes.len(), 3);
    assert_eq!(outcome.search.n_failed(), 1);
    assert!(matches!(
        outcome.search.outcomes[2].status,
        ConfigStatus::Failed(_)
    ));
    assert_ne!(outcome.best_config.learning_rate, 1e6);
    assert!(outcome.model.is_finite());
}

#[test]
fn test_same_seed_same_selection() {
    let records = read_rating_csv(
        larger_table().as_bytes(),
        &TableColumns::default(),
        RatingScale::default(),
    )
    .unwrap();

    let first = train_pipeline(&records, &request(small_grid())).unwrap();
    let second = train_pipeline(&records, &request(small_grid())).unwrap();
    assert_eq!(first.best_config, second.best_config);
    assert_eq!(
        first.metrics.mean_rmse().to_bits(),
        second.metrics.mean_rmse().to_bits()
    );
}

#[test]
fn test_out_of_scale_row_reported_with_line() {
    let table = "User-ID,Book-Title,Book-Rating\nu1,a,8\nu2,b,0\n";
    let err = read_rating_csv(
        table.as_bytes(),
        &TableColumns::default(),
        RatingScale::default(),
    )
    .unwrap_err();
    match err {
        RecError::InvalidInput(msg) => assert!(msg.contains("line 3"), "{msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}
