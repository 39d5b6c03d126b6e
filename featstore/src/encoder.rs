//! Categorical encoders with a frozen output manifest.
//!
//! An [`EncoderRegistry`] only comes into existence through
//! [`EncoderRegistry::fit_transform`] (training) or
//! [`EncoderRegistry::from_parts`] (loading a saved bundle). Neither path
//! exposes a way to refit, so every later [`EncoderRegistry::transform`] call
//! replays exactly the mapping learned at training time.

use crate::errors::{Result, StoreError};
use crate::features::{FeatureFrame, FeatureValue, FrameRow};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Ordinal code emitted for categories never seen during fitting.
pub const RESERVED_ORDINAL: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncoderKind {
    OneHot,
    Ordinal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSpec {
    pub name: String,
    pub kind: EncoderKind,
    pub columns: Vec<String>,
}

/// What `transform` does with a category value that was absent at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCategoryPolicy {
    /// Ordinal columns get [`RESERVED_ORDINAL`], one-hot columns get all zeros.
    #[default]
    Reserved,
    /// Fail with [`StoreError::UnseenCategory`].
    Reject,
}

/// Categories of one input column, in order of first appearance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedColumn {
    pub column: String,
    pub categories: Vec<String>,
}

impl FittedColumn {
    fn ordinal(&self, value: &str) -> Option<i64> {
        self.categories
            .iter()
            .position(|c| c == value)
            .map(|i| i as i64 + 1)
    }

    fn one_hot_name(&self, category: &str) -> String {
        format!("{}_{}", self.column, category)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedEncoder {
    pub name: String,
    pub kind: EncoderKind,
    pub columns: Vec<FittedColumn>,
}

impl FittedEncoder {
    fn output_columns_for(&self, fitted: &FittedColumn) -> Vec<String> {
        match self.kind {
            EncoderKind::Ordinal => vec![fitted.column.clone()],
            EncoderKind::OneHot => fitted
                .categories
                .iter()
                .map(|c| fitted.one_hot_name(c))
                .collect(),
        }
    }

    /// Every column this encoder contributes to the output table.
    pub fn output_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|f| self.output_columns_for(f))
            .collect()
    }
}

/// How one output column is computed from an input row.
enum Source<'a> {
    Passthrough(usize),
    Ordinal(usize, &'a FittedColumn),
    OneHot(usize, &'a str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderRegistry {
    encoders: Vec<FittedEncoder>,
    manifest: Vec<String>,
    policy: UnknownCategoryPolicy,
}

impl EncoderRegistry {
    /// Fits every declared encoder on `frame` and returns the frozen registry
    /// together with the encoded table.
    pub fn fit_transform(
        specs: &[EncoderSpec],
        frame: &FeatureFrame,
        policy: UnknownCategoryPolicy,
    ) -> Result<(EncoderRegistry, FeatureFrame)> {
        let mut claimed: HashMap<&str, &str> = HashMap::new();
        let mut encoders = Vec::with_capacity(specs.len());

        for spec in specs {
            let mut columns = Vec::with_capacity(spec.columns.len());
            for column in &spec.columns {
                let idx = frame.column_index(column).ok_or_else(|| {
                    StoreError::UnknownEncoderColumn {
                        encoder: spec.name.clone(),
                        column: column.clone(),
                    }
                })?;
                if let Some(other) = claimed.insert(column.as_str(), spec.name.as_str()) {
                    return Err(StoreError::Config(format!(
                        "column '{}' is claimed by encoders '{}' and '{}'",
                        column, other, spec.name
                    )));
                }

                let mut seen = HashSet::new();
                let mut categories = Vec::new();
                for row in &frame.rows {
                    let key = row.cells[idx].category_key();
                    if seen.insert(key.clone()) {
                        categories.push(key);
                    }
                }
                columns.push(FittedColumn {
                    column: column.clone(),
                    categories,
                });
            }
            log::info!(
                "Fitted {:?} encoder '{}' over {} column(s)",
                spec.kind,
                spec.name,
                columns.len()
            );
            encoders.push(FittedEncoder {
                name: spec.name.clone(),
                kind: spec.kind,
                columns,
            });
        }

        // Encoded columns replace their input column in place.
        let mut manifest = Vec::new();
        for column in &frame.columns {
            let expansion = encoders.iter().find_map(|enc| {
                enc.columns
                    .iter()
                    .find(|f| &f.column == column)
                    .map(|f| enc.output_columns_for(f))
            });
            match expansion {
                Some(outputs) => manifest.extend(outputs),
                None => manifest.push(column.clone()),
            }
        }

        let registry = Self::from_parts(encoders, manifest, policy)?;
        let encoded = registry.transform(frame)?;
        Ok((registry, encoded))
    }

    /// Rebuilds a registry from persisted parts, checking that they agree.
    pub fn from_parts(
        encoders: Vec<FittedEncoder>,
        manifest: Vec<String>,
        policy: UnknownCategoryPolicy,
    ) -> Result<Self> {
        let mut unique = HashSet::new();
        if let Some(dup) = manifest.iter().find(|c| !unique.insert(c.as_str())) {
            return Err(StoreError::ManifestMismatch(format!(
                "column '{dup}' appears more than once"
            )));
        }
        for encoder in &encoders {
            for output in encoder.output_columns() {
                if !unique.contains(output.as_str()) {
                    return Err(StoreError::ManifestMismatch(format!(
                        "encoder '{}' produces '{}' which is not in the manifest",
                        encoder.name, output
                    )));
                }
            }
        }
        Ok(Self {
            encoders,
            manifest,
            policy,
        })
    }

    pub fn manifest(&self) -> &[String] {
        &self.manifest
    }

    pub fn encoders(&self) -> &[FittedEncoder] {
        &self.encoders
    }

    pub fn policy(&self) -> UnknownCategoryPolicy {
        self.policy
    }

    /// Applies the fitted mappings. Input columns may come in any order and
    /// extra columns are ignored; the output follows the manifest exactly.
    pub fn transform(&self, frame: &FeatureFrame) -> Result<FeatureFrame> {
        let input = |name: &str| {
            frame.column_index(name).ok_or_else(|| {
                StoreError::ManifestMismatch(format!("input column '{name}' is missing"))
            })
        };

        let mut derived: HashMap<String, (&FittedColumn, Option<&str>)> = HashMap::new();
        let mut encoded_inputs = Vec::new();
        for encoder in &self.encoders {
            for fitted in &encoder.columns {
                encoded_inputs.push((encoder, fitted, input(&fitted.column)?));
                match encoder.kind {
                    EncoderKind::Ordinal => {
                        derived.insert(fitted.column.clone(), (fitted, None));
                    }
                    EncoderKind::OneHot => {
                        for category in &fitted.categories {
                            derived.insert(
                                fitted.one_hot_name(category),
                                (fitted, Some(category.as_str())),
                            );
                        }
                    }
                }
            }
        }

        let plan = self
            .manifest
            .iter()
            .map(|name| match derived.get(name) {
                Some((fitted, None)) => Ok(Source::Ordinal(input(&fitted.column)?, *fitted)),
                Some((fitted, Some(category))) => {
                    Ok(Source::OneHot(input(&fitted.column)?, *category))
                }
                None => Ok(Source::Passthrough(input(name)?)),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut warned = HashSet::new();
        let mut rows = Vec::with_capacity(frame.rows.len());
        for row in &frame.rows {
            for (encoder, fitted, idx) in &encoded_inputs {
                let value = row.cells[*idx].category_key();
                if fitted.categories.contains(&value) {
                    continue;
                }
                match self.policy {
                    UnknownCategoryPolicy::Reject => {
                        return Err(StoreError::UnseenCategory {
                            encoder: encoder.name.clone(),
                            column: fitted.column.clone(),
                            value,
                        });
                    }
                    UnknownCategoryPolicy::Reserved => {
                        if warned.insert((fitted.column.clone(), value.clone())) {
                            log::warn!(
                                "Encoder '{}': unseen category '{}' in column '{}', using reserved encoding",
                                encoder.name,
                                value,
                                fitted.column
                            );
                        }
                    }
                }
            }

            let cells = plan
                .iter()
                .map(|source| match source {
                    Source::Passthrough(i) => row.cells[*i].clone(),
                    Source::Ordinal(i, fitted) => FeatureValue::Int(
                        fitted
                            .ordinal(&row.cells[*i].category_key())
                            .unwrap_or(RESERVED_ORDINAL),
                    ),
                    Source::OneHot(i, category) => {
                        FeatureValue::Int(i64::from(row.cells[*i].category_key() == *category))
                    }
                })
                .collect();
            rows.push(FrameRow {
                date: row.date,
                target: row.target,
                cells,
            });
        }

        Ok(FeatureFrame {
            columns: self.manifest.clone(),
            rows,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(day: u32, weather: &str, temp: f64) -> FrameRow {
        FrameRow {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            target: Some(f64::from(day) * 100.0),
            cells: vec![
                FeatureValue::Float(temp),
                FeatureValue::Text(weather.to_string()),
                FeatureValue::Int(i64::from(day % 2)),
            ],
        }
    }

    fn frame() -> FeatureFrame {
        FeatureFrame {
            columns: vec!["temp".into(), "weather".into(), "weekend".into()],
            rows: vec![row(1, "sunny", 10.0), row(2, "rainy", 8.0), row(3, "sunny", 12.0)],
        }
    }

    fn one_hot() -> EncoderSpec {
        EncoderSpec {
            name: "weather_onehot".into(),
            kind: EncoderKind::OneHot,
            columns: vec!["weather".into()],
        }
    }

    fn ordinal() -> EncoderSpec {
        EncoderSpec {
            name: "weather_ordinal".into(),
            kind: EncoderKind::Ordinal,
            columns: vec!["weather".into()],
        }
    }

    fn ints(values: &[i64]) -> Vec<FeatureValue> {
        values.iter().map(|v| FeatureValue::Int(*v)).collect()
    }

    #[test]
    fn test_one_hot_expands_in_place() {
        let (registry, out) =
            EncoderRegistry::fit_transform(&[one_hot()], &frame(), UnknownCategoryPolicy::Reserved)
                .unwrap();
        assert_eq!(
            registry.manifest(),
            &["temp", "weather_sunny", "weather_rainy", "weekend"]
        );
        assert_eq!(out.columns, registry.manifest());
        assert_eq!(out.rows[1].cells[1..3], ints(&[0, 1])[..]);
        assert_eq!(out.rows[2].cells[0], FeatureValue::Float(12.0));
        assert_eq!(out.rows[2].target, Some(300.0));
    }

    #[test]
    fn test_ordinal_is_one_based_by_first_appearance() {
        let (registry, out) =
            EncoderRegistry::fit_transform(&[ordinal()], &frame(), UnknownCategoryPolicy::Reserved)
                .unwrap();
        assert_eq!(registry.manifest(), &["temp", "weather", "weekend"]);
        let codes: Vec<_> = out.rows.iter().map(|r| r.cells[1].clone()).collect();
        assert_eq!(codes, ints(&[1, 2, 1]));
    }

    #[test]
    fn test_transform_follows_manifest_for_any_input_order() {
        let (registry, expected) =
            EncoderRegistry::fit_transform(&[one_hot()], &frame(), UnknownCategoryPolicy::Reserved)
                .unwrap();
        let orders = [
            ["weekend", "weather", "temp"],
            ["weather", "temp", "weekend"],
            ["temp", "weekend", "weather"],
        ];
        for order in orders {
            let columns: Vec<String> = order.iter().map(|c| c.to_string()).collect();
            let shuffled = frame().select(&columns).unwrap();
            assert_eq!(registry.transform(&shuffled).unwrap(), expected);
        }
    }

    #[test]
    fn test_transform_never_refits() {
        let (registry, _) =
            EncoderRegistry::fit_transform(&[ordinal()], &frame(), UnknownCategoryPolicy::Reserved)
                .unwrap();
        let before = registry.clone();
        let serving = FeatureFrame {
            columns: frame().columns,
            rows: vec![row(4, "cloudy", 9.0), row(5, "rainy", 9.0)],
        };
        let out = registry.transform(&serving).unwrap();
        assert_eq!(out.rows[0].cells[1], FeatureValue::Int(RESERVED_ORDINAL));
        assert_eq!(out.rows[1].cells[1], FeatureValue::Int(2));
        assert_eq!(registry, before);
    }

    #[test]
    fn test_unseen_one_hot_is_all_zero_or_rejected() {
        let serving = FeatureFrame {
            columns: frame().columns,
            rows: vec![row(4, "snow", 0.0)],
        };
        let (registry, _) =
            EncoderRegistry::fit_transform(&[one_hot()], &frame(), UnknownCategoryPolicy::Reserved)
                .unwrap();
        let out = registry.transform(&serving).unwrap();
        assert_eq!(out.rows[0].cells[1..3], ints(&[0, 0])[..]);

        let (strict, _) =
            EncoderRegistry::fit_transform(&[one_hot()], &frame(), UnknownCategoryPolicy::Reject)
                .unwrap();
        let err = strict.transform(&serving).unwrap_err();
        assert!(matches!(err, StoreError::UnseenCategory { ref value, .. } if value == "snow"));
    }

    #[test]
    fn test_fit_errors() {
        let bad = EncoderSpec {
            columns: vec!["nope".into()],
            ..one_hot()
        };
        assert!(matches!(
            EncoderRegistry::fit_transform(&[bad], &frame(), UnknownCategoryPolicy::Reserved),
            Err(StoreError::UnknownEncoderColumn { .. })
        ));
        assert!(
            EncoderRegistry::fit_transform(
                &[one_hot(), ordinal()],
                &frame(),
                UnknownCategoryPolicy::Reserved
            )
            .unwrap_err()
            .is_config()
        );
    }

    #[test]
    fn test_transform_requires_manifest_inputs() {
        let (registry, _) =
            EncoderRegistry::fit_transform(&[one_hot()], &frame(), UnknownCategoryPolicy::Reserved)
                .unwrap();
        let narrowed = frame()
            .select(&["weather".to_string(), "temp".to_string()])
            .unwrap();
        assert!(matches!(
            registry.transform(&narrowed),
            Err(StoreError::ManifestMismatch(_))
        ));
    }

    #[test]
    fn test_from_parts_validates() {
        let (registry, _) =
            EncoderRegistry::fit_transform(&[one_hot()], &frame(), UnknownCategoryPolicy::Reserved)
                .unwrap();
        let mut manifest = registry.manifest().to_vec();
        manifest.retain(|c| c != "weather_rainy");
        assert!(EncoderRegistry::from_parts(
            registry.encoders().to_vec(),
            manifest,
            UnknownCategoryPolicy::Reserved
        )
        .is_err());

        let json = serde_json::to_string(registry.encoders()).unwrap();
        let encoders: Vec<FittedEncoder> = serde_json::from_str(&json).unwrap();
        let rebuilt = EncoderRegistry::from_parts(
            encoders,
            registry.manifest().to_vec(),
            registry.policy(),
        )
        .unwrap();
        assert_eq!(rebuilt, registry);
    }
}
