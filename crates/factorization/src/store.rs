//! Durable model artifact.
//!
//! The artifact is a JSON document holding a format version, a SHA-256
//! checksum of the body, and the body itself: global mean, both index maps
//! (as identifier lists ordered by index), biases and factor rows. Loading
//! validates every shape and value before a model is constructed, so a
//! partially valid file never yields a model.

use crate::matrix::IdIndex;
use crate::model::FactorModel;
use bookrec_core::error::{RecError, RecResult};
use bookrec_core::types::{Hyperparameters, RatingScale};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::info;

/// Bumped whenever the body layout changes.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct ModelArtifact {
    format_version: u32,
    checksum: String,
    body: ArtifactBody,
}

#[derive(Serialize, Deserialize)]
struct ArtifactBody {
    global_mean: f64,
    factor_count: usize,
    rating_scale: RatingScale,
    hyperparameters: Hyperparameters,
    trained_at: DateTime<Utc>,
    user_ids: Vec<String>,
    item_ids: Vec<String>,
    bias_user: Vec<f64>,
    bias_item: Vec<f64>,
    factor_user: Vec<Vec<f64>>,
    factor_item: Vec<Vec<f64>>,
}

pub struct ModelStore;

impl ModelStore {
    /// Write `model` to `path`, replacing any existing artifact.
    ///
    /// The artifact is written to a sibling temp file and renamed into place,
    /// so readers never observe a half-written file.
    pub fn save<P: AsRef<Path>>(model: &FactorModel, path: P) -> RecResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            Self::to_writer(model, &mut writer)?;
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)?;

        info!(
            path = %path.display(),
            users = model.users().len(),
            items = model.items().len(),
            factors = model.n_factors(),
            "Model artifact saved"
        );
        Ok(())
    }

    /// Load and validate the artifact at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> RecResult<FactorModel> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            RecError::CorruptArtifact(format!("cannot open {}: {e}", path.display()))
        })?;
        let reader = BufReader::new(file);
        let model = Self::from_reader(reader)?;

        info!(
            path = %path.display(),
            users = model.users().len(),
            items = model.items().len(),
            factors = model.n_factors(),
            "Model artifact loaded"
        );
        Ok(model)
    }

    pub fn to_writer<W: Write>(model: &FactorModel, writer: W) -> RecResult<()> {
        let body = ArtifactBody::from_model(model);
        let artifact = ModelArtifact {
            format_version: FORMAT_VERSION,
            checksum: body_checksum(&body)?,
            body,
        };
        serde_json::to_writer(writer, &artifact).map_err(|e| {
            if e.is_io() {
                RecError::Io(e.into())
            } else {
                RecError::CorruptArtifact(format!("failed to encode model: {e}"))
            }
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> RecResult<FactorModel> {
        let artifact: ModelArtifact = serde_json::from_reader(reader)
            .map_err(|e| RecError::CorruptArtifact(format!("unreadable artifact: {e}")))?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(RecError::CorruptArtifact(format!(
                "format version {} is not supported (expected {FORMAT_VERSION})",
                artifact.format_version
            )));
        }

        let expected = body_checksum(&artifact.body)?;
        if artifact.checksum != expected {
            return Err(RecError::CorruptArtifact("checksum mismatch".into()));
        }

        artifact.body.into_model()
    }
}

fn body_checksum(body: &ArtifactBody) -> RecResult<String> {
    let bytes = serde_json::to_vec(body)
        .map_err(|e| RecError::CorruptArtifact(format!("failed to encode model body: {e}")))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

impl ArtifactBody {
    fn from_model(model: &FactorModel) -> Self {
        Self {
            global_mean: model.global_mean,
            factor_count: model.n_factors(),
            rating_scale: model.rating_scale,
            hyperparameters: model.hyperparameters,
            trained_at: model.trained_at,
            user_ids: model.users.ids().to_vec(),
            item_ids: model.items.ids().to_vec(),
            bias_user: model.user_bias.to_vec(),
            bias_item: model.item_bias.to_vec(),
            factor_user: model.user_factors.outer_iter().map(|r| r.to_vec()).collect(),
            factor_item: model.item_factors.outer_iter().map(|r| r.to_vec()).collect(),
        }
    }

    fn into_model(self) -> RecResult<FactorModel> {
        let corrupt = |msg: String| RecError::CorruptArtifact(msg);

        if !self.global_mean.is_finite() {
            return Err(corrupt("global_mean is not finite".into()));
        }
        if !self.rating_scale.is_valid() {
            return Err(corrupt("rating_scale is invalid".into()));
        }
        if self.factor_count != self.hyperparameters.n_factors {
            return Err(corrupt(format!(
                "factor_count {} disagrees with hyperparameters ({})",
                self.factor_count, self.hyperparameters.n_factors
            )));
        }

        let users = IdIndex::from_ids(self.user_ids).map_err(|e| corrupt(format!("user map: {e}")))?;
        let items = IdIndex::from_ids(self.item_ids).map_err(|e| corrupt(format!("item map: {e}")))?;

        let user_bias = bias_vector("bias_user", self.bias_user, users.len())?;
        let item_bias = bias_vector("bias_item", self.bias_item, items.len())?;
        let user_factors =
            factor_matrix("factor_user", self.factor_user, users.len(), self.factor_count)?;
        let item_factors =
            factor_matrix("factor_item", self.factor_item, items.len(), self.factor_count)?;

        let model = FactorModel {
            global_mean: self.global_mean,
            users,
            items,
            user_bias,
            item_bias,
            user_factors,
            item_factors,
            rating_scale: self.rating_scale,
            hyperparameters: self.hyperparameters,
            trained_at: self.trained_at,
        };
        if !model.is_finite() {
            return Err(corrupt("artifact contains non-finite parameters".into()));
        }
        Ok(model)
    }
}

fn bias_vector(name: &str, values: Vec<f64>, expected: usize) -> RecResult<Array1<f64>> {
    if values.len() != expected {
        return Err(RecError::CorruptArtifact(format!(
            "{name} has {} entries, index map has {expected}",
            values.len()
        )));
    }
    Ok(Array1::from(values))
}

fn factor_matrix(
    name: &str,
    rows: Vec<Vec<f64>>,
    n_rows: usize,
    n_factors: usize,
) -> RecResult<Array2<f64>> {
    if rows.len() != n_rows {
        return Err(RecError::CorruptArtifact(format!(
            "{name} has {} rows, index map has {n_rows}",
            rows.len()
        )));
    }
    let mut flat = Vec::with_capacity(n_rows * n_factors);
    for (idx, row) in rows.into_iter().enumerate() {
        if row.len() != n_factors {
            return Err(RecError::CorruptArtifact(format!(
                "{name} row {idx} has {} factors, expected {n_factors}",
                row.len()
            )));
        }
        flat.extend(row);
    }
    Array2::from_shape_vec((n_rows, n_factors), flat)
        .map_err(|e| RecError::CorruptArtifact(format!("{name}: {e}")))
}
