//! WHERE clause builder for query-by-options.
//!
//! Every filter is ANDed; list filters use IN semantics and an empty list
//! means "no constraint".

use super::types::Value;

/// Accumulates conditions and their bound parameters.
#[derive(Debug, Clone, Default)]
pub struct Clauses {
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl Clauses {
    /// `expr = ?`
    pub fn eq(&mut self, expr: &str, value: impl Into<Value>) -> &mut Self {
        self.conditions.push(format!("{expr} = ?"));
        self.params.push(value.into());
        self
    }

    /// `expr = ?` when a value is given.
    pub fn eq_opt<V: Into<Value>>(&mut self, expr: &str, value: Option<V>) -> &mut Self {
        if let Some(value) = value {
            self.eq(expr, value);
        }
        self
    }

    /// `expr IN (?, ...)`, skipped for an empty set.
    pub fn any_of<I, V>(&mut self, expr: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return self;
        }

        let placeholders = vec!["?"; values.len()].join(", ");
        self.conditions.push(format!("{expr} IN ({placeholders})"));
        self.params.extend(values);
        self
    }

    /// `expr < ?`
    pub fn less_than(&mut self, expr: &str, value: impl Into<Value>) -> &mut Self {
        self.conditions.push(format!("{expr} < ?"));
        self.params.push(value.into());
        self
    }

    /// `expr > ?`
    pub fn greater_than(&mut self, expr: &str, value: impl Into<Value>) -> &mut Self {
        self.conditions.push(format!("{expr} > ?"));
        self.params.push(value.into());
        self
    }

    /// Arbitrary condition with its own parameters.
    pub fn raw(&mut self, condition: impl Into<String>, params: Vec<Value>) -> &mut Self {
        self.conditions.push(condition.into());
        self.params.extend(params);
        self
    }

    /// Renders ` WHERE a AND b`, or an empty string without conditions.
    pub fn render(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// Parameters in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}
