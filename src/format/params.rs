//! Parameter reconciliation while rendering.
//!
//! Placeholders are registered in the order they are written out. One name
//! maps to one binding: a second occurrence with an equal value merges into
//! it, a different value is a conflict, and an unbound occurrence adopts the
//! value bound elsewhere.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::ast::value::SqlValue;
use crate::error::SqlError;

use super::dialect::{DialectPreset, PlaceholderStyle};

/// A reconciled parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamBinding {
    pub name: String,
    pub value: SqlValue,
}

/// Bound values in the shape the preset expects.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedParams {
    /// Name to value, in first-appearance order.
    Named(Vec<ParamBinding>),
    /// One value per placeholder position.
    Positional(Vec<SqlValue>),
}

impl RenderedParams {
    pub fn len(&self) -> usize {
        match self {
            RenderedParams::Named(b) => b.len(),
            RenderedParams::Positional(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value bound to `name`. Always `None` for positional parameters.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        match self {
            RenderedParams::Named(b) => b.iter().find(|p| p.name == name).map(|p| &p.value),
            RenderedParams::Positional(_) => None,
        }
    }
}

impl Serialize for RenderedParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RenderedParams::Named(bindings) => {
                let mut map = serializer.serialize_map(Some(bindings.len()))?;
                for b in bindings {
                    map.serialize_entry(&b.name, &b.value)?;
                }
                map.end()
            }
            RenderedParams::Positional(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for v in values {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
        }
    }
}

/// Value equality for merging bindings. Floats compare by bit pattern, so a
/// NaN bound twice merges.
fn same_value(a: &SqlValue, b: &SqlValue) -> bool {
    match (a, b) {
        (SqlValue::Float(x), SqlValue::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

#[derive(Debug)]
struct Slot {
    name: String,
    value: Option<SqlValue>,
}

#[derive(Debug)]
pub(crate) struct ParamRegistry {
    preset: DialectPreset,
    slots: Vec<Slot>,
    /// Slot index of every placeholder written, in order.
    occurrences: Vec<usize>,
    error: Option<SqlError>,
}

impl ParamRegistry {
    pub(crate) fn new(preset: DialectPreset) -> Self {
        Self {
            preset,
            slots: Vec::new(),
            occurrences: Vec::new(),
            error: None,
        }
    }

    /// Register one occurrence and return its placeholder text.
    pub(crate) fn register(&mut self, name: &str, value: Option<&SqlValue>) -> String {
        let idx = match self.slots.iter().position(|s| s.name == name) {
            Some(idx) => {
                let slot = &mut self.slots[idx];
                if let Some(second) = value {
                    match slot.value.clone() {
                        None => slot.value = Some(second.clone()),
                        Some(first) if !same_value(&first, second) => {
                            self.error.get_or_insert(SqlError::DuplicateParameterConflict {
                                name: name.to_string(),
                                first,
                                second: second.clone(),
                            });
                        }
                        Some(_) => {}
                    }
                }
                tracing::trace!(param = name, "merged repeated parameter");
                idx
            }
            None => {
                self.slots.push(Slot {
                    name: name.to_string(),
                    value: value.cloned(),
                });
                self.slots.len() - 1
            }
        };
        self.occurrences.push(idx);
        self.preset.placeholder(name, idx + 1)
    }

    /// Reconciled bindings, or the first conflict met while rendering.
    pub(crate) fn finish(self) -> Result<RenderedParams, SqlError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let values: Vec<SqlValue> = self
            .slots
            .iter()
            .map(|s| s.value.clone().unwrap_or(SqlValue::Null))
            .collect();
        Ok(match self.preset.placeholder_style() {
            PlaceholderStyle::Dollar => RenderedParams::Positional(values),
            PlaceholderStyle::Question => RenderedParams::Positional(
                self.occurrences
                    .iter()
                    .map(|&i| values[i].clone())
                    .collect(),
            ),
            PlaceholderStyle::Colon | PlaceholderStyle::At => RenderedParams::Named(
                self.slots
                    .into_iter()
                    .zip(values)
                    .map(|(slot, value)| ParamBinding {
                        name: slot.name,
                        value,
                    })
                    .collect(),
            ),
        })
    }
}
