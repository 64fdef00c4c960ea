use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

/// Inputs for one pp simulation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScoreParams {
    pub mode_vanilla: u8,
    pub mods: Option<u32>,
    pub combo: Option<i32>,
    pub misses: Option<i32>,
    pub accuracy: Option<f32>,
    /// mania only
    pub score: Option<i64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DifficultyRating {
    pub pp: f64,
    pub star_rating: f64,
}

/// The pp calculator, a black box producing pp and star rating for a map
/// and score parameters.
#[async_trait]
pub trait PerformanceCalculator: Send + Sync {
    async fn calculate(
        &self,
        osu_file: &Path,
        params: &[ScoreParams],
    ) -> Result<Vec<DifficultyRating>>;
}

/// Production implementation shelling out to the calculator binary, one
/// invocation per score, parsing its JSON stdout.
pub struct SubprocessCalculator {
    binary: PathBuf,
}

impl SubprocessCalculator {
    pub fn new(binary: &Path) -> Self {
        SubprocessCalculator {
            binary: binary.to_path_buf(),
        }
    }

    fn build_args(osu_file: &Path, score: &ScoreParams) -> Vec<String> {
        let mode_str = match score.mode_vanilla {
            1 => "taiko",
            2 => "catch",
            3 => "mania",
            _ => "osu",
        };

        let mut args = vec!["simulate".to_string(), mode_str.to_string(), "-j".to_string()];

        if let Some(mods) = score.mods {
            args.push("-lm".to_string());
            args.push(mods.to_string());
        }

        if mode_str == "mania" {
            if let Some(score_value) = score.score {
                args.push("-s".to_string());
                args.push(score_value.to_string());
            }
        } else {
            if let Some(misses) = score.misses {
                args.push("-X".to_string());
                args.push(misses.to_string());
            }
            if let Some(combo) = score.combo {
                args.push("-c".to_string());
                args.push(combo.to_string());
            }
            if let Some(acc) = score.accuracy {
                args.push("-a".to_string());
                args.push(acc.to_string());
            }
        }

        args.push(osu_file.display().to_string());
        args
    }
}

#[async_trait]
impl PerformanceCalculator for SubprocessCalculator {
    async fn calculate(
        &self,
        osu_file: &Path,
        params: &[ScoreParams],
    ) -> Result<Vec<DifficultyRating>> {
        let mut results = Vec::with_capacity(params.len());

        for score in params {
            let output = Command::new(&self.binary)
                .args(Self::build_args(osu_file, score))
                .output()
                .await
                .context("failed to spawn pp calculator")?;

            if !output.status.success() {
                log::error!(
                    "pp calculator failed for {}: {}",
                    osu_file.display(),
                    String::from_utf8_lossy(&output.stderr)
                );
                results.push(DifficultyRating::default());
                continue;
            }

            let parsed: Value = match serde_json::from_slice(&output.stdout) {
                Ok(v) => v,
                Err(err) => {
                    log::error!("pp calculator output unparseable: {}", err);
                    results.push(DifficultyRating::default());
                    continue;
                }
            };

            let mut pp = parsed["performance_attributes"]["pp"]
                .as_f64()
                .unwrap_or(0.0);
            let mut star_rating = parsed["difficulty_attributes"]["star_rating"]
                .as_f64()
                .unwrap_or(0.0);
            if !pp.is_finite() || !star_rating.is_finite() {
                log::error!("abnormal pp value for {}", osu_file.display());
                pp = 0.0;
                star_rating = 0.0;
            }

            results.push(DifficultyRating { pp, star_rating });
        }

        Ok(results)
    }
}

/// Fixed-output calculator for tests: pp = 100 × accuracy-fraction.
#[derive(Default)]
pub struct MockCalculator;

#[async_trait]
impl PerformanceCalculator for MockCalculator {
    async fn calculate(
        &self,
        _osu_file: &Path,
        params: &[ScoreParams],
    ) -> Result<Vec<DifficultyRating>> {
        Ok(params
            .iter()
            .map(|p| DifficultyRating {
                pp: p.accuracy.unwrap_or(100.0) as f64,
                star_rating: 5.0,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_for_std_score() {
        let params = ScoreParams {
            mode_vanilla: 0,
            mods: Some(72),
            accuracy: Some(98.5),
            ..ScoreParams::default()
        };
        let args = SubprocessCalculator::build_args(Path::new("123.osu"), &params);
        assert_eq!(
            args,
            vec!["simulate", "osu", "-j", "-lm", "72", "-a", "98.5", "123.osu"]
        );
    }

    #[test]
    fn args_for_mania_use_score() {
        let params = ScoreParams {
            mode_vanilla: 3,
            score: Some(876_543),
            ..ScoreParams::default()
        };
        let args = SubprocessCalculator::build_args(Path::new("9.osu"), &params);
        assert_eq!(args, vec!["simulate", "mania", "-j", "-s", "876543", "9.osu"]);
    }
}
