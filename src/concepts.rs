//! Concept algebra: named reusable vectors, weighted mixes, and debiasing.
//!
//! A concept is the embedding of a short descriptive text stored under a
//! name. Concepts combine linearly:
//!
//! ```text
//! mix({safety: 1.0, hype: -0.5})  =  normalize(1.0·safety − 0.5·hype)
//! debias(main, remove)            =  normalize(m − (m·r)·r)   with m, r unit
//! ```
//!
//! The results are query vectors for
//! [`SearchEngine::vector_search`](crate::search::SearchEngine::vector_search).

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::Context;
use crate::embedding::embed_query;
use crate::error::{Error, Result};
use crate::models::ConceptInfo;
use crate::vector::{dot, l2_norm, normalize, ZERO_EPSILON};

/// An ordered, validated mapping of concept name to weight.
///
/// Parsed from `name:weight,name:weight`; a term without `:weight` has
/// weight `1.0`. Weights may be negative or larger than one.
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptMix {
    terms: Vec<(String, f32)>,
}

impl ConceptMix {
    /// Rejects empty mixes, blank or duplicate names, and non-finite weights.
    pub fn new<I, S>(terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (name, weight) in terms {
            let name: String = name.into();
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(Error::InvalidInput("concept name is empty".to_string()));
            }
            if !weight.is_finite() {
                return Err(Error::InvalidInput(format!(
                    "weight for {} is not a finite number",
                    name
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(Error::InvalidInput(format!(
                    "concept {} appears more than once",
                    name
                )));
            }
            out.push((name, weight));
        }
        if out.is_empty() {
            return Err(Error::InvalidInput("concept mix is empty".to_string()));
        }
        Ok(Self { terms: out })
    }

    pub fn terms(&self) -> &[(String, f32)] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl FromStr for ConceptMix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut terms = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, weight) = match part.rsplit_once(':') {
                Some((name, weight)) => {
                    let weight: f32 = weight.trim().parse().map_err(|_| {
                        Error::InvalidInput(format!("invalid weight in {:?}", part))
                    })?;
                    (name, weight)
                }
                None => (part, 1.0),
            };
            terms.push((name.to_string(), weight));
        }
        Self::new(terms)
    }
}

/// Weighted elementwise sum of `vectors`, L2-normalized.
pub fn mix_vectors(vectors: &[(&[f32], f32)]) -> Result<Vec<f32>> {
    let Some((first, _)) = vectors.first() else {
        return Err(Error::InvalidInput("concept mix is empty".to_string()));
    };
    let dims = first.len();

    let mut sum = vec![0.0f32; dims];
    for (v, weight) in vectors {
        if v.len() != dims {
            return Err(Error::DimensionMismatch {
                expected: dims,
                actual: v.len(),
            });
        }
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += weight * x;
        }
    }
    normalize(&sum)
}

/// Remove the `remove` direction from `main`.
///
/// Both inputs are normalized first; the remainder is normalized again.
/// [`Error::ZeroVector`] when either input or the remainder is (nearly) zero.
pub fn debias_vectors(main: &[f32], remove: &[f32]) -> Result<Vec<f32>> {
    if main.len() != remove.len() {
        return Err(Error::DimensionMismatch {
            expected: main.len(),
            actual: remove.len(),
        });
    }
    let m = normalize(main)?;
    let r = normalize(remove)?;
    let projection = dot(&m, &r);

    let rest: Vec<f32> = m
        .iter()
        .zip(r.iter())
        .map(|(a, b)| a - projection * b)
        .collect();

    if l2_norm(&rest) < ZERO_EPSILON {
        return Err(Error::ZeroVector);
    }
    normalize(&rest)
}

/// Concept operations backed by the vector store.
#[derive(Clone)]
pub struct ConceptAlgebra {
    ctx: Context,
}

impl ConceptAlgebra {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Embed `text` and store it under `name`, replacing any previous value.
    pub async fn store_concept(&self, name: &str, text: &str) -> Result<ConceptInfo> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("concept name is empty".to_string()));
        }
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("concept text is empty".to_string()));
        }

        let v = embed_query(self.ctx.gateway.as_ref(), text, self.ctx.retry).await?;
        self.ctx.vectors.put_concept(name, &v, text).await?;
        tracing::info!(concept = %name, "stored concept");

        Ok(ConceptInfo {
            name: name.to_string(),
            source_text: text.to_string(),
            created_at: chrono::Utc::now().timestamp(),
        })
    }

    pub async fn delete_concept(&self, name: &str) -> Result<()> {
        self.ctx.vectors.delete_concept(name).await
    }

    pub async fn list_concepts(&self) -> Result<Vec<ConceptInfo>> {
        self.ctx.vectors.list_concepts().await
    }

    async fn concept(&self, name: &str) -> Result<Arc<Vec<f32>>> {
        self.ctx
            .vectors
            .get_concept(name)
            .await
            .map_err(|e| match e {
                Error::NotFound(_) => Error::UnknownConcept(name.to_string()),
                other => other,
            })
    }

    /// Normalized weighted sum of the named concepts.
    ///
    /// Every name is resolved before any arithmetic happens.
    pub async fn mix(&self, mix: &ConceptMix) -> Result<Vec<f32>> {
        let mut resolved = Vec::with_capacity(mix.len());
        for (name, weight) in mix.terms() {
            resolved.push((self.concept(name).await?, *weight));
        }

        let views: Vec<(&[f32], f32)> = resolved
            .iter()
            .map(|(v, w)| (v.as_slice(), *w))
            .collect();
        mix_vectors(&views)
    }

    /// `main` with the `remove` direction projected out.
    pub async fn debias(&self, main: &str, remove: &str) -> Result<Vec<f32>> {
        let m = self.concept(main).await?;
        let r = self.concept(remove).await?;
        debias_vectors(&m, &r)
    }
}
