//! Serialisable parameter sets used to construct filters through the registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::image_pipeline::common::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Ordered integer pairs, e.g. curve control points.
    Points(Vec<(i32, i32)>),
    List(Vec<f64>),
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

impl From<Vec<(i32, i32)>> for ParamValue {
    fn from(v: Vec<(i32, i32)>) -> Self {
        ParamValue::Points(v)
    }
}

impl From<Vec<f64>> for ParamValue {
    fn from(v: Vec<f64>) -> Self {
        ParamValue::List(v)
    }
}

/// Named filter parameters. Missing keys fall back to each filter's defaults;
/// present keys of the wrong type are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterParams {
    values: BTreeMap<String, ParamValue>,
}

fn wrong_type(key: &str, expected: &str) -> PipelineError {
    PipelineError::InvalidParameters(format!("parameter {:?} must be {}", key, expected))
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn float(&self, key: &str, default: f64) -> Result<f64> {
        match self.values.get(key) {
            None => Ok(default),
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(_) => Err(wrong_type(key, "a number")),
        }
    }

    pub fn int(&self, key: &str, default: i64) -> Result<i64> {
        match self.values.get(key) {
            None => Ok(default),
            Some(ParamValue::Int(v)) => Ok(*v),
            Some(_) => Err(wrong_type(key, "an integer")),
        }
    }

    pub fn flag(&self, key: &str, default: bool) -> Result<bool> {
        match self.values.get(key) {
            None => Ok(default),
            Some(ParamValue::Bool(v)) => Ok(*v),
            Some(_) => Err(wrong_type(key, "a boolean")),
        }
    }

    pub fn text(&self, key: &str) -> Result<Option<&str>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(ParamValue::Text(v)) => Ok(Some(v)),
            Some(_) => Err(wrong_type(key, "a string")),
        }
    }

    pub fn points(&self, key: &str) -> Result<Vec<(i32, i32)>> {
        match self.values.get(key) {
            None => Ok(Vec::new()),
            Some(ParamValue::Points(v)) => Ok(v.clone()),
            Some(ParamValue::List(v)) if v.is_empty() => Ok(Vec::new()),
            Some(_) => Err(wrong_type(key, "a list of integer pairs")),
        }
    }

    pub fn list(&self, key: &str) -> Result<Vec<f64>> {
        match self.values.get(key) {
            None => Ok(Vec::new()),
            Some(ParamValue::List(v)) => Ok(v.clone()),
            Some(ParamValue::Points(v)) if v.is_empty() => Ok(Vec::new()),
            Some(_) => Err(wrong_type(key, "a list of numbers")),
        }
    }
}
