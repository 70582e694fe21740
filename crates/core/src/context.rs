//! Context-assembly value objects shared by the builder and the gateway.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Character budget for an assembled context.
///
/// Deserialization goes through [`ContextBudget::new`], so a zero budget is
/// rejected there too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BudgetFields")]
pub struct ContextBudget {
    /// Maximum characters (Unicode scalar values) in the output. Always > 0.
    max_chars: usize,
    /// Whether each document is introduced by a `===== FILE: name =====` header.
    pub include_headers: bool,
}

impl ContextBudget {
    /// Create a budget. A zero budget is rejected.
    pub fn new(max_chars: usize, include_headers: bool) -> Result<Self, ConfigurationError> {
        if max_chars == 0 {
            return Err(ConfigurationError::new("max_chars must be positive"));
        }
        Ok(Self {
            max_chars,
            include_headers,
        })
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }
}

#[derive(Deserialize)]
struct BudgetFields {
    max_chars: usize,
    #[serde(default = "default_include_headers")]
    include_headers: bool,
}

fn default_include_headers() -> bool {
    true
}

impl TryFrom<BudgetFields> for ContextBudget {
    type Error = ConfigurationError;

    fn try_from(fields: BudgetFields) -> Result<Self, Self::Error> {
        Self::new(fields.max_chars, fields.include_headers)
    }
}

/// A document's name and extracted text, in the order it should be packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDocument {
    pub name: String,
    pub text: String,
}

impl ContextDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// A document that made it into the context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludedDocument {
    pub name: String,
    pub truncated: bool,
}

impl IncludedDocument {
    /// Label reported to clients: the name, suffixed when cut short.
    pub fn label(&self) -> String {
        if self.truncated {
            format!("{} (truncated)", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Outcome of packing documents into a budget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyResult {
    /// The packed text, trimmed of surrounding whitespace.
    pub context: String,
    /// Included documents in inclusion (= input) order.
    pub included: Vec<IncludedDocument>,
    /// Characters consumed from the budget, headers included.
    pub used_chars: usize,
}

impl AssemblyResult {
    pub fn included_labels(&self) -> Vec<String> {
        self.included.iter().map(IncludedDocument::label).collect()
    }

    pub fn truncated_count(&self) -> usize {
        self.included.iter().filter(|d| d.truncated).count()
    }
}
