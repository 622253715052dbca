use std::fmt;

use serde::{Deserialize, Serialize};

/// Bag-of-Words representation of an image or descriptor set.
///
/// Index: word/leaf id in the vocabulary.
///
/// Value: total weight of that word in provided features.
pub type BoW = Vec<f32>;

/// How word weights are computed when the vocabulary is built and
/// how they accumulate when a descriptor set is transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Weighting {
    /// Term frequency times inverse document frequency.
    #[value(name = "tf-idf")]
    TfIdf,
    /// Term frequency only.
    Tf,
    /// Inverse document frequency only.
    Idf,
    /// Word present or not.
    Binary,
}

impl Weighting {
    /// Whether leaf weights depend on how many training images contain the word.
    pub fn uses_idf(self) -> bool {
        matches!(self, Weighting::TfIdf | Weighting::Idf)
    }

    /// Whether repeated words in one image add up.
    pub fn accumulates(self) -> bool {
        matches!(self, Weighting::TfIdf | Weighting::Tf)
    }
}

/// Similarity measure between two BoW vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Scoring {
    #[value(name = "l1-norm")]
    L1Norm,
    #[value(name = "l2-norm")]
    L2Norm,
}

impl fmt::Display for Weighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Weighting::TfIdf => "tf-idf",
            Weighting::Tf => "tf",
            Weighting::Idf => "idf",
            Weighting::Binary => "binary",
        })
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scoring::L1Norm => "L1-norm",
            Scoring::L2Norm => "L2-norm",
        })
    }
}

/// Provides method(s) for normalizing and computing the similarity score between bow vectors.
pub trait BoWTrait {
    /// Compute L1 norm between two bow. (Used in Galvez (Eq 2)).
    fn l1(&self, other: &Self) -> f32;
    /// `1 - sqrt(1 - <a, b>)` for l2 normalized vectors.
    fn l2(&self, other: &Self) -> f32;
    fn normalize(&mut self, scoring: Scoring);
}

impl BoWTrait for BoW {
    fn l1(&self, other: &Self) -> f32 {
        1. - 0.5
            * (self
                .iter()
                .zip(other)
                .fold(0., |a, (b, c)| a + (b - c).abs()))
    }

    fn l2(&self, other: &Self) -> f32 {
        let dot: f32 = self.iter().zip(other).map(|(a, b)| a * b).sum();
        if dot >= 1. {
            1.
        } else {
            1. - (1. - dot).sqrt()
        }
    }

    fn normalize(&mut self, scoring: Scoring) {
        let norm: f32 = match scoring {
            Scoring::L1Norm => self.iter().map(|w| w.abs()).sum(),
            Scoring::L2Norm => self.iter().map(|w| w * w).sum::<f32>().sqrt(),
        };
        if norm > 0. {
            let inv = 1. / norm;
            for w in self.iter_mut() {
                *w *= inv;
            }
        }
    }
}

impl Scoring {
    pub fn score(self, a: &BoW, b: &BoW) -> f32 {
        match self {
            Scoring::L1Norm => a.l1(b),
            Scoring::L2Norm => a.l2(b),
        }
    }
}
