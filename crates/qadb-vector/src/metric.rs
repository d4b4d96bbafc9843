use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Similarity metric. Scores are always "higher is better".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Cosine similarity in `[-1, 1]`; a zero-norm side scores 0.
    #[default]
    Cosine,
    /// Raw inner product.
    Dot,
    /// `1 / (1 + ||a - b||)`, in `(0, 1]`.
    Euclidean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cosine => "cosine",
            Metric::Dot => "dot",
            Metric::Euclidean => "euclidean",
        }
    }

    /// `a_norm`/`b_norm` are the precomputed L2 norms (only cosine reads them).
    #[inline]
    pub fn score(&self, a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
        let s = match self {
            Metric::Cosine => {
                if a_norm == 0.0 || b_norm == 0.0 { 0.0 } else { dot(a, b) / (a_norm * b_norm) }
            }
            Metric::Dot => dot(a, b),
            Metric::Euclidean => {
                let d2: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
                1.0 / (1.0 + d2.sqrt())
            }
        };
        // NaN sinks to the bottom; -0.0 and 0.0 rank as equal.
        if s.is_nan() { f32::NEG_INFINITY } else if s == 0.0 { 0.0 } else { s }
    }
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Metric {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Metric::Cosine),
            "dot" | "inner_product" => Ok(Metric::Dot),
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_basics() {
        let a = [1.0, 0.0];
        let b = [0.0, 2.0];
        let c = [3.0, 0.0];
        let m = Metric::Cosine;
        assert_eq!(m.score(&a, l2_norm(&a), &b, l2_norm(&b)), 0.0);
        assert!((m.score(&a, l2_norm(&a), &c, l2_norm(&c)) - 1.0).abs() < 1e-6);
        assert_eq!(m.score(&a, 1.0, &[0.0, 0.0], 0.0), 0.0);
    }

    #[test]
    fn euclidean_is_bounded() {
        let m = Metric::Euclidean;
        assert_eq!(m.score(&[1.0, 1.0], 0.0, &[1.0, 1.0], 0.0), 1.0);
        assert!((m.score(&[0.0, 0.0], 0.0, &[3.0, 4.0], 0.0) - 1.0 / 6.0).abs() < 1e-6);
    }

    #[test]
    fn parse_roundtrip() {
        for m in [Metric::Cosine, Metric::Dot, Metric::Euclidean] {
            assert_eq!(m.as_str().parse::<Metric>().unwrap(), m);
        }
        assert!("manhattan".parse::<Metric>().is_err());
    }
}
