use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::core::switching::function::{SwitchError, SwitchingFunction};
use crate::core::switching::matrix::SwitchingMatrix;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0} keyword")]
    MissingKeyword(String),

    #[error("No node groups were specified")]
    NoGroups,

    #[error("Adjacency matrices over {0} node types are not supported (at most 99)")]
    TooManyNodeTypes(usize),

    #[error("Unknown keyword '{0}'")]
    UnknownKeyword(String),

    #[error("Duplicate keyword '{0}'")]
    DuplicateKeyword(String),

    #[error("Malformed field '{0}': expected KEY=VALUE")]
    MalformedField(String),

    #[error("Unbalanced braces in '{0}'")]
    UnbalancedBraces(String),

    #[error("Invalid value '{value}' for keyword {keyword}")]
    InvalidValue { keyword: &'static str, value: String },

    #[error("Invalid {key} specification: {source}")]
    InvalidSwitch {
        key: String,
        #[source]
        source: SwitchError,
    },

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// The keyword addressing the switching specification of the unordered type
/// pair (a, b) among `n_groups` groups.
///
/// With a single group the keyword is plain `SWITCH`. With several, the
/// suffix is `base(i) + j + 1` for i ≤ j, where `base(i)` reserves one
/// decimal digit per group index: `(i+1)·10` below 10 groups, `(i+1)·100`
/// below 100. Beyond that the scheme would collide, so it is an error rather
/// than a silently wrong keyword.
pub fn switch_keyword(a: usize, b: usize, n_groups: usize) -> Result<String, ConfigError> {
    if n_groups == 1 {
        return Ok("SWITCH".to_string());
    }
    let (i, j) = if a <= b { (a, b) } else { (b, a) };
    let base = if n_groups < 10 {
        (i + 1) * 10
    } else if n_groups < 100 {
        (i + 1) * 100
    } else {
        return Err(ConfigError::TooManyNodeTypes(n_groups));
    };
    Ok(format!("SWITCH{}", base + j + 1))
}

/// Configuration of one contact-matrix construction.
///
/// Holds the ordered node-group labels (the position of a label is its type
/// id), one switching specification string per unordered type pair, and the
/// weight tolerance below which Phase D skips a pair. Immutable once built;
/// all validation happens at build time.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactMapConfig {
    groups: Vec<String>,
    specs: Vec<String>,
    weight_tolerance: f64,
}

impl ContactMapConfig {
    pub fn builder() -> ContactMapConfigBuilder {
        ContactMapConfigBuilder::new()
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn weight_tolerance(&self) -> f64 {
        self.weight_tolerance
    }

    pub fn switch_spec(&self, a: usize, b: usize) -> &str {
        &self.specs[pair_slot(a, b)]
    }

    /// Parses every pair's specification into a complete switching matrix.
    pub fn build_switching_matrix(&self) -> Result<SwitchingMatrix, ConfigError> {
        let n = self.groups.len();
        let mut matrix = SwitchingMatrix::new(n);
        for pair in (0..n).combinations_with_replacement(2) {
            let (i, j) = (pair[0], pair[1]);
            let function =
                SwitchingFunction::parse(self.switch_spec(i, j)).map_err(|source| {
                    ConfigError::InvalidSwitch {
                        key: switch_keyword(i, j, n).unwrap_or_else(|_| "SWITCH".to_string()),
                        source,
                    }
                })?;
            matrix
                .set(i, j, function)
                .expect("pair indices are in range by construction");
        }
        Ok(matrix)
    }

    /// Parses a one-line, PLUMED-style directive such as
    /// `ATOMS=solute,solvent SWITCH11={RATIONAL R_0=1.0} SWITCH12=... SWITCH22=...`.
    ///
    /// Values may be wrapped in a single level of braces; `TOL` optionally
    /// sets the weight tolerance.
    pub fn from_directive(line: &str) -> Result<Self, ConfigError> {
        let mut fields = BTreeMap::new();
        for (key, value) in split_fields(line)? {
            if fields.insert(key.clone(), value).is_some() {
                return Err(ConfigError::DuplicateKeyword(key));
            }
        }

        let atoms = fields
            .remove("ATOMS")
            .ok_or_else(|| ConfigError::MissingKeyword("ATOMS".to_string()))?;
        let groups: Vec<String> = atoms
            .split(',')
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(String::from)
            .collect();

        let tolerance = match fields.remove("TOL") {
            Some(value) => Some(value.parse().map_err(|_| ConfigError::InvalidValue {
                keyword: "TOL",
                value,
            })?),
            None => None,
        };

        Self::from_fields(groups, fields, tolerance)
    }

    /// Parses the TOML form of the same configuration:
    ///
    /// ```toml
    /// atoms = ["solute", "solvent"]
    /// tol = 1e-6
    /// SWITCH11 = "RATIONAL R_0=1.0"
    /// SWITCH12 = "RATIONAL R_0=1.2"
    /// SWITCH22 = "RATIONAL R_0=1.5"
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let file: ContactMapFile = toml::from_str(text)?;
        Self::from_fields(file.atoms, file.switch, file.tol)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string_lossy().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn from_fields(
        groups: Vec<String>,
        mut switch_fields: BTreeMap<String, String>,
        tolerance: Option<f64>,
    ) -> Result<Self, ConfigError> {
        let n = groups.len();
        if n == 0 {
            return Err(ConfigError::NoGroups);
        }

        let mut builder = ContactMapConfigBuilder::new();
        for label in &groups {
            builder = builder.group(label);
        }
        for pair in (0..n).combinations_with_replacement(2) {
            let (i, j) = (pair[0], pair[1]);
            let key = switch_keyword(i, j, n)?;
            let spec = switch_fields
                .remove(&key)
                .ok_or_else(|| ConfigError::MissingKeyword(key.clone()))?;
            builder = builder.switch(i, j, &spec);
        }
        if let Some(key) = switch_fields.into_keys().next() {
            return Err(ConfigError::UnknownKeyword(key));
        }
        if let Some(tolerance) = tolerance {
            builder = builder.weight_tolerance(tolerance);
        }
        builder.build()
    }
}

#[derive(Debug, Deserialize)]
struct ContactMapFile {
    atoms: Vec<String>,
    tol: Option<f64>,
    #[serde(flatten)]
    switch: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct ContactMapConfigBuilder {
    groups: Vec<String>,
    specs: BTreeMap<(usize, usize), String>,
    weight_tolerance: Option<f64>,
}

impl ContactMapConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node group; its type id is its position in the append
    /// order.
    pub fn group(mut self, label: &str) -> Self {
        self.groups.push(label.to_string());
        self
    }

    /// Sets the switching specification of the unordered type pair (a, b).
    pub fn switch(mut self, a: usize, b: usize, spec: &str) -> Self {
        let key = if a <= b { (a, b) } else { (b, a) };
        self.specs.insert(key, spec.to_string());
        self
    }

    pub fn weight_tolerance(mut self, tolerance: f64) -> Self {
        self.weight_tolerance = Some(tolerance);
        self
    }

    pub fn build(self) -> Result<ContactMapConfig, ConfigError> {
        let n = self.groups.len();
        if n == 0 {
            return Err(ConfigError::NoGroups);
        }
        if n >= 100 {
            return Err(ConfigError::TooManyNodeTypes(n));
        }

        let mut specs = vec![String::new(); n * (n + 1) / 2];
        for pair in (0..n).combinations_with_replacement(2) {
            let (i, j) = (pair[0], pair[1]);
            let spec = self
                .specs
                .get(&(i, j))
                .map(|s| s.trim())
                .unwrap_or_default();
            if spec.is_empty() {
                return Err(ConfigError::MissingKeyword(switch_keyword(i, j, n)?));
            }
            specs[pair_slot(i, j)] = spec.to_string();
        }

        debug!(n_groups = n, "contact map configuration assembled");
        Ok(ContactMapConfig {
            groups: self.groups,
            specs,
            weight_tolerance: self.weight_tolerance.unwrap_or(0.0),
        })
    }
}

/// Triangular storage slot of the unordered pair (a, b).
fn pair_slot(a: usize, b: usize) -> usize {
    let (i, j) = if a <= b { (a, b) } else { (b, a) };
    j * (j + 1) / 2 + i
}

/// Splits a directive line into KEY=VALUE fields, treating brace-wrapped
/// values as single fields and stripping one level of braces.
fn split_fields(line: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut raw = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for c in line.chars() {
        match c {
            '{' => {
                depth += 1;
                current.push(c);
            }
            '}' => {
                if depth == 0 {
                    return Err(ConfigError::UnbalancedBraces(line.to_string()));
                }
                depth -= 1;
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    raw.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if depth != 0 {
        return Err(ConfigError::UnbalancedBraces(line.to_string()));
    }
    if !current.is_empty() {
        raw.push(current);
    }

    raw.into_iter()
        .map(|field| {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| ConfigError::MalformedField(field.clone()))?;
            let value = value.trim();
            let value = value
                .strip_prefix('{')
                .and_then(|v| v.strip_suffix('}'))
                .map(str::trim)
                .unwrap_or(value);
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}
