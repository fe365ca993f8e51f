use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{LsaError, Result};

/// Statistic used to decide whether a term survives filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TermSelection {
    /// number of passages containing the term
    DocumentFrequency,
    /// total count of the term across passages
    TermFrequency,
    /// mean count per containing passage
    MeanTermFrequency,
}

/// Per-cell weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalWeight {
    Binary,
    TermFrequency,
    /// frequency divided by the passage's largest frequency
    NormalizedFrequency,
    /// ln(1 + tf)
    LogTf,
}

/// Per-term weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlobalWeight {
    None,
    /// 1 / sqrt(sum of squares)
    Normal,
    /// global frequency / document frequency
    GfIdf,
    /// log2(passages / df) + 1
    Idf,
    /// 1 + Σ p·log2(p) / log2(passages)
    Entropy,
}

/// How many singular triplets to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reduction {
    Fixed,
    PercentageOfRank,
    PercentageOfVariance,
    None,
}

/// Which SVD backend decomposes the weighted matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolverKind {
    InProcess,
    External,
}

macro_rules! tagged_enum {
    ($ty:ident { $($variant:ident => $tag:literal),+ $(,)? }) => {
        impl $ty {
            pub fn tag(&self) -> &'static str {
                match self {
                    $($ty::$variant => $tag,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.tag())
            }
        }

        impl FromStr for $ty {
            type Err = LsaError;

            fn from_str(s: &str) -> Result<Self> {
                match s.trim() {
                    $($tag => Ok($ty::$variant),)+
                    other => Err(LsaError::InvalidParameter(
                        format!("unknown {} `{}`", stringify!($ty), other),
                    )),
                }
            }
        }
    };
}

tagged_enum!(TermSelection {
    DocumentFrequency => "df",
    TermFrequency => "tf",
    MeanTermFrequency => "mean",
});

tagged_enum!(LocalWeight {
    Binary => "bin",
    TermFrequency => "tf",
    NormalizedFrequency => "tfn",
    LogTf => "logtf",
});

tagged_enum!(GlobalWeight {
    None => "none",
    Normal => "normal",
    GfIdf => "gfidf",
    Idf => "idf",
    Entropy => "entropy",
});

tagged_enum!(Reduction {
    Fixed => "num",
    PercentageOfRank => "pct",
    PercentageOfVariance => "var",
    None => "none",
});

tagged_enum!(SolverKind {
    InProcess => "internal",
    External => "external",
});

/// Per-run configuration of a corpus.
///
/// `Display` renders the canonical parameter string, which also keys the
/// decomposition cache; `FromStr` parses it back.
///
/// # Examples
/// ```
/// use lsa_space::CorpusParameters;
/// let params: CorpusParameters = "select=df:2;local=tf;global=idf;reduce=none:0;solver=internal;max=100;energy=false"
///     .parse()
///     .unwrap();
/// assert_eq!(params.to_string().parse::<CorpusParameters>().unwrap(), params);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusParameters {
    pub term_selection: TermSelection,
    pub term_threshold: f64,
    pub local_weight: LocalWeight,
    pub global_weight: GlobalWeight,
    pub reduction: Reduction,
    pub reduction_threshold: f64,
    pub solver: SolverKind,
    pub max_passages: usize,
    /// truncate the variance criterion by cumulative singular value energy
    /// instead of by rank percentage
    #[serde(default)]
    pub variance_by_energy: bool,
}

impl Default for CorpusParameters {
    fn default() -> Self {
        Self {
            term_selection: TermSelection::DocumentFrequency,
            term_threshold: 1.0,
            local_weight: LocalWeight::LogTf,
            global_weight: GlobalWeight::Entropy,
            reduction: Reduction::PercentageOfRank,
            reduction_threshold: 100.0,
            solver: SolverKind::InProcess,
            max_passages: 10_000,
            variance_by_energy: false,
        }
    }
}

impl CorpusParameters {
    /// Check invariants that do not depend on data
    pub fn validate(&self) -> Result<()> {
        if !self.term_threshold.is_finite() || self.term_threshold < 0.0 {
            return Err(LsaError::InvalidParameter(format!(
                "term threshold must be a non-negative number, got {}",
                self.term_threshold
            )));
        }
        if !self.reduction_threshold.is_finite() || self.reduction_threshold < 0.0 {
            return Err(LsaError::InvalidParameter(format!(
                "reduction threshold must be a non-negative number, got {}",
                self.reduction_threshold
            )));
        }
        if self.max_passages == 0 {
            return Err(LsaError::InvalidParameter("max passages must be positive".into()));
        }
        if self.solver == SolverKind::External && self.reduction == Reduction::PercentageOfVariance {
            return Err(LsaError::UnsupportedSolver);
        }
        Ok(())
    }
}

impl fmt::Display for CorpusParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "select={}:{};local={};global={};reduce={}:{};solver={};max={};energy={}",
            self.term_selection,
            self.term_threshold,
            self.local_weight,
            self.global_weight,
            self.reduction,
            self.reduction_threshold,
            self.solver,
            self.max_passages,
            self.variance_by_energy,
        )
    }
}

fn split_pair<'a>(key: &str, value: &'a str) -> Result<(&'a str, f64)> {
    let (tag, num) = value
        .split_once(':')
        .ok_or_else(|| LsaError::InvalidParameter(format!("`{key}` expects <criterion>:<threshold>")))?;
    let num = num
        .trim()
        .parse::<f64>()
        .map_err(|_| LsaError::InvalidParameter(format!("`{key}` threshold `{num}` is not a number")))?;
    Ok((tag, num))
}

impl FromStr for CorpusParameters {
    type Err = LsaError;

    fn from_str(s: &str) -> Result<Self> {
        let mut selection = None;
        let mut local = None;
        let mut global = None;
        let mut reduction = None;
        let mut solver = None;
        let mut max_passages = None;
        let mut energy = false;

        for field in s.split(';').map(str::trim).filter(|f| !f.is_empty()) {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| LsaError::InvalidParameter(format!("`{field}` is not key=value")))?;
            match key.trim() {
                "select" => {
                    let (tag, threshold) = split_pair(key, value)?;
                    selection = Some((tag.parse::<TermSelection>()?, threshold));
                }
                "local" => local = Some(value.parse::<LocalWeight>()?),
                "global" => global = Some(value.parse::<GlobalWeight>()?),
                "reduce" => {
                    let (tag, threshold) = split_pair(key, value)?;
                    reduction = Some((tag.parse::<Reduction>()?, threshold));
                }
                "solver" => solver = Some(value.parse::<SolverKind>()?),
                "max" => {
                    max_passages = Some(value.trim().parse::<usize>().map_err(|_| {
                        LsaError::InvalidParameter(format!("max passages `{value}` is not a count"))
                    })?)
                }
                "energy" => {
                    energy = value.trim().parse::<bool>().map_err(|_| {
                        LsaError::InvalidParameter(format!("energy `{value}` is not a boolean"))
                    })?
                }
                other => return Err(LsaError::InvalidParameter(format!("unknown key `{other}`"))),
            }
        }

        let missing = |name: &str| LsaError::InvalidParameter(format!("missing `{name}`"));
        let (term_selection, term_threshold) = selection.ok_or_else(|| missing("select"))?;
        let (reduction, reduction_threshold) = reduction.ok_or_else(|| missing("reduce"))?;
        let params = CorpusParameters {
            term_selection,
            term_threshold,
            local_weight: local.ok_or_else(|| missing("local"))?,
            global_weight: global.ok_or_else(|| missing("global"))?,
            reduction,
            reduction_threshold,
            solver: solver.ok_or_else(|| missing("solver"))?,
            max_passages: max_passages.ok_or_else(|| missing("max"))?,
            variance_by_energy: energy,
        };
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_string_round_trips() {
        let params = CorpusParameters {
            term_selection: TermSelection::MeanTermFrequency,
            term_threshold: 1.5,
            local_weight: LocalWeight::NormalizedFrequency,
            global_weight: GlobalWeight::GfIdf,
            reduction: Reduction::Fixed,
            reduction_threshold: 40.0,
            solver: SolverKind::External,
            max_passages: 250,
            variance_by_energy: false,
        };
        let text = params.to_string();
        assert_eq!(
            text,
            "select=mean:1.5;local=tfn;global=gfidf;reduce=num:40;solver=external;max=250;energy=false"
        );
        assert_eq!(text.parse::<CorpusParameters>().unwrap(), params);
    }

    #[test]
    fn unknown_criterion_fails_fast() {
        let err = "select=idf:2;local=tf;global=idf;reduce=none:0;solver=internal;max=10"
            .parse::<CorpusParameters>()
            .unwrap_err();
        assert!(matches!(err, LsaError::InvalidParameter(_)), "{err}");

        let err = "select=df:2;local=tf;global=idf;solver=internal;max=10"
            .parse::<CorpusParameters>()
            .unwrap_err();
        assert!(err.to_string().contains("reduce"));
    }

    #[test]
    fn external_solver_rejects_variance_criterion() {
        let params = CorpusParameters {
            reduction: Reduction::PercentageOfVariance,
            solver: SolverKind::External,
            ..CorpusParameters::default()
        };
        assert!(matches!(params.validate(), Err(LsaError::UnsupportedSolver)));
    }

    #[test]
    fn serde_json_keeps_fields() {
        let params = CorpusParameters::default();
        let json = serde_json::to_string(&params).unwrap();
        let back: CorpusParameters = serde_json::from_str(&json).unwrap();
        assert_eq!(back, params);
    }
}
