//! Character-budgeted context packing.
//!
//! Documents are appended in the order given, each introduced by a header.
//! The first document that does not fit is cut to the remaining budget and
//! packing stops; later documents are never visited.
//!
//! # Determinism
//!
//! Identical inputs always produce identical outputs. All lengths are counted
//! in characters (Unicode scalar values), so truncation never splits a code
//! point.

use vaultgate_core::context::{AssemblyResult, ContextBudget, ContextDocument, IncludedDocument};

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless; create one and reuse it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Separator placed before a document's text.
    pub fn header(name: &str, include_headers: bool) -> String {
        if include_headers {
            format!("\n\n===== FILE: {name} =====\n")
        } else {
            "\n\n".to_string()
        }
    }

    /// Pack `documents` into `budget`.
    ///
    /// # Algorithm
    ///
    /// 1. Skip documents whose text is empty
    /// 2. If header + text fits the remaining budget → append verbatim
    /// 3. Otherwise, if anything beyond the header fits → append the header and
    ///    as many leading characters as fit, mark the document truncated, stop
    /// 4. Otherwise stop without including it
    pub fn assemble(&self, documents: &[ContextDocument], budget: &ContextBudget) -> AssemblyResult {
        let max_chars = budget.max_chars();
        let mut remaining = max_chars;
        let mut buffer = String::new();
        let mut included = Vec::new();

        for doc in documents {
            if remaining == 0 {
                break;
            }
            if doc.text.is_empty() {
                continue;
            }

            let header = Self::header(&doc.name, budget.include_headers);
            let header_len = header.chars().count();
            let need = header_len + doc.text.chars().count();

            if need <= remaining {
                buffer.push_str(&header);
                buffer.push_str(&doc.text);
                included.push(IncludedDocument {
                    name: doc.name.clone(),
                    truncated: false,
                });
                remaining -= need;
                continue;
            }

            if remaining <= header_len {
                break;
            }

            let take = remaining - header_len;
            buffer.push_str(&header);
            buffer.extend(doc.text.chars().take(take));
            included.push(IncludedDocument {
                name: doc.name.clone(),
                truncated: true,
            });
            remaining = 0;
            break;
        }

        AssemblyResult {
            context: buffer.trim().to_string(),
            included,
            used_chars: max_chars - remaining,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
