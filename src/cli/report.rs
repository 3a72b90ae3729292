//! Printable results of each subcommand.

use std::fmt;

use difftrace_assets::AttentionMap;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub dataset: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(dataset: &str) -> Self {
        Self {
            dataset: dataset.to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn passed(&self, strict: bool) -> bool {
        self.errors.is_empty() && !(strict && !self.warnings.is_empty())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "dataset: {}", self.dataset)?;
        for (title, items) in [("errors", &self.errors), ("warnings", &self.warnings)] {
            if items.is_empty() {
                continue;
            }
            writeln!(f, "{title}:")?;
            for item in items {
                writeln!(f, "  - {item}")?;
            }
        }
        Ok(())
    }
}

/// Shape and value statistics of one decoded map. Non-finite cells are skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapSummary {
    pub label: String,
    pub shape: [usize; 2],
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
    pub non_finite: usize,
    pub entropy: Option<f64>,
}

impl MapSummary {
    pub fn from_map(label: String, map: &AttentionMap, entropy: Option<f64>) -> Self {
        let finite: Vec<f32> = map.map.iter().copied().filter(|value| value.is_finite()).collect();
        let mean = (!finite.is_empty()).then(|| finite.iter().map(|&value| f64::from(value)).sum::<f64>() / finite.len() as f64);
        Self {
            label,
            shape: map.shape,
            min: finite.iter().copied().reduce(f32::min),
            max: finite.iter().copied().reduce(f32::max),
            mean,
            non_finite: map.map.len() - finite.len(),
            entropy,
        }
    }
}

fn optional<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "n/a".to_string(), |value| format!("{value:.6}"))
}

impl fmt::Display for MapSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.label)?;
        writeln!(f, "  shape:   {}x{}", self.shape[0], self.shape[1])?;
        writeln!(f, "  min:     {}", optional(self.min))?;
        writeln!(f, "  max:     {}", optional(self.max))?;
        writeln!(f, "  mean:    {}", optional(self.mean))?;
        if self.non_finite > 0 {
            writeln!(f, "  non-finite cells: {}", self.non_finite)?;
        }
        writeln!(f, "  entropy: {}", optional(self.entropy))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivergenceReport {
    pub layer: String,
    pub token: usize,
    pub step_a: u32,
    pub step_b: u32,
    /// `None` when either step has no map for the layer.
    pub divergence: Option<f64>,
}

impl fmt::Display for DivergenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "js divergence cross:{} token {} step {} vs {}: {}",
            self.layer,
            self.token,
            self.step_a,
            self.step_b,
            optional(self.divergence)
        )
    }
}

#[cfg(test)]
#[path = "report.test.rs"]
mod tests;
