//! Content bindings and the rules for matching and negotiating them.
//!
//! A service declares the bindings it supports once, at configuration time.
//! Clients name the bindings they send (inbox) or want back (poll). An empty
//! subtype list has two meanings depending on the side it appears on:
//! on a supported binding it accepts any subtype, on a requested binding the
//! requester does not care which subtype it gets.

use crate::version::{BindingSemantics, ProtocolVersion};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A payload format identifier with optional subtypes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentBinding {
    /// Binding identifier, e.g. `urn:stix.mitre.org:xml:1.1.1`.
    pub binding: String,
    /// Subtype identifiers in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtypes: Vec<String>,
}

impl ContentBinding {
    pub fn new(binding: impl Into<String>) -> Self {
        Self {
            binding: binding.into(),
            subtypes: Vec::new(),
        }
    }

    /// Creates a binding with subtypes. Repeated subtypes are kept once.
    pub fn with_subtypes<I, S>(binding: impl Into<String>, subtypes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut result = Self::new(binding);
        for subtype in subtypes {
            result = result.with_subtype(subtype);
        }
        result
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        let subtype = subtype.into();
        if !self.subtypes.contains(&subtype) {
            self.subtypes.push(subtype);
        }
        self
    }

    /// Returns whether the binding accepts any subtype.
    pub fn is_wildcard(&self) -> bool {
        self.subtypes.is_empty()
    }

    /// Returns the first declared subtype, if any.
    pub fn first_subtype(&self) -> Option<&str> {
        self.subtypes.first().map(String::as_str)
    }

    fn has_subtype(&self, subtype: &str) -> bool {
        self.subtypes.iter().any(|s| s == subtype)
    }
}

impl fmt::Display for ContentBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subtypes.is_empty() {
            f.write_str(&self.binding)
        } else {
            write!(f, "{} ({})", self.binding, self.subtypes.join(", "))
        }
    }
}

/// Returns whether `candidate` is accepted by any of the `supported` bindings.
///
/// TAXII 1.0 compares identifiers only. TAXII 1.1 also compares one subtype:
/// when the candidate declares several, only the first is considered.
pub fn is_supported(
    supported: &[ContentBinding],
    candidate: &ContentBinding,
    version: ProtocolVersion,
) -> bool {
    let subtype = match version.adapter().binding_semantics() {
        BindingSemantics::IdentifierOnly => None,
        BindingSemantics::IdentifierAndSubtype => candidate.first_subtype(),
    };

    supported.iter().any(|s| {
        s.binding == candidate.binding
            && (s.is_wildcard() || subtype.is_some_and(|st| s.has_subtype(st)))
    })
}

/// Computes the bindings both sides can agree on.
///
/// An empty `supported` list means the service has no preference and yields
/// `requested`; an empty `requested` list yields `supported`. Otherwise every
/// pair with equal identifiers contributes one entry, in requested-major
/// order. A pair whose subtype lists do not overlap still contributes an
/// entry with no subtypes.
pub fn intersect(
    supported: &[ContentBinding],
    requested: &[ContentBinding],
) -> Vec<ContentBinding> {
    if supported.is_empty() {
        return requested.to_vec();
    }
    if requested.is_empty() {
        return supported.to_vec();
    }

    let mut overlap = Vec::new();
    for req in requested {
        for sup in supported.iter().filter(|s| s.binding == req.binding) {
            if sup.is_wildcard() {
                overlap.push(req.clone());
            } else if req.is_wildcard() {
                overlap.push(sup.clone());
            } else {
                let common = req
                    .subtypes
                    .iter()
                    .filter(|st| sup.has_subtype(st))
                    .cloned()
                    .collect();
                overlap.push(ContentBinding {
                    binding: req.binding.clone(),
                    subtypes: common,
                });
            }
        }
    }
    overlap
}
