//! Server-side search query construction.
//!
//! A [`SearchQuery`] is an opaque filter expression handed to a connector.
//! Connectors translate the term tree into their own wire syntax; the
//! `Display` impl is the human-readable rendering used in logs.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One predicate in a search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchTerm {
    /// Messages sent after the given timestamp.
    SentSince(DateTime<Utc>),
    /// Messages received after the given timestamp.
    ReceivedSince(DateTime<Utc>),
    /// Sender address predicate.
    From(String),
    /// Recipient address predicate.
    To(String),
    /// Carbon copy address predicate.
    Cc(String),
    /// Blind carbon copy address predicate. Not every server supports
    /// searching by BCC; connectors may ignore it.
    Bcc(String),
    /// Parenthesized OR-group of terms.
    AnyOf(Vec<SearchTerm>),
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchTerm::SentSince(ts) => write!(f, "SENTSINCE {}", ts.to_rfc3339()),
            SearchTerm::ReceivedSince(ts) => write!(f, "SINCE {}", ts.to_rfc3339()),
            SearchTerm::From(addr) => write!(f, "FROM \"{}\"", addr),
            SearchTerm::To(addr) => write!(f, "TO \"{}\"", addr),
            SearchTerm::Cc(addr) => write!(f, "CC \"{}\"", addr),
            SearchTerm::Bcc(addr) => write!(f, "BCC \"{}\"", addr),
            SearchTerm::AnyOf(terms) => {
                write!(f, "(")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " OR ")?;
                    }
                    write!(f, "{}", term)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// An opaque server-side filter expression. Top-level terms are AND-joined.
///
/// An empty query matches every message in the selected folder (a full
/// sync).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    terms: Vec<SearchTerm>,
}

impl SearchQuery {
    /// Starts building a query.
    pub fn builder() -> SearchQueryBuilder {
        SearchQueryBuilder { terms: Vec::new() }
    }

    /// A query that matches everything.
    pub fn match_all() -> Self {
        Self::default()
    }

    /// The AND-joined term tree, for connector implementations.
    pub fn terms(&self) -> &[SearchTerm] {
        &self.terms
    }

    /// Returns true if this query has no filter terms.
    pub fn is_match_all(&self) -> bool {
        self.terms.is_empty()
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "ALL");
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{}", term)?;
        }
        Ok(())
    }
}

/// Builder for [`SearchQuery`] values.
#[derive(Debug, Clone)]
pub struct SearchQueryBuilder {
    terms: Vec<SearchTerm>,
}

impl SearchQueryBuilder {
    /// Restricts to messages sent after the given timestamp.
    pub fn sent_since(mut self, ts: DateTime<Utc>) -> Self {
        self.terms.push(SearchTerm::SentSince(ts));
        self
    }

    /// Restricts to messages received after the given timestamp.
    pub fn received_since(mut self, ts: DateTime<Utc>) -> Self {
        self.terms.push(SearchTerm::ReceivedSince(ts));
        self
    }

    /// Adds a sender address predicate.
    pub fn from(mut self, address: impl Into<String>) -> Self {
        self.terms.push(SearchTerm::From(address.into()));
        self
    }

    /// Adds a recipient address predicate.
    pub fn to(mut self, address: impl Into<String>) -> Self {
        self.terms.push(SearchTerm::To(address.into()));
        self
    }

    /// Adds a carbon copy address predicate.
    pub fn cc(mut self, address: impl Into<String>) -> Self {
        self.terms.push(SearchTerm::Cc(address.into()));
        self
    }

    /// Adds a blind carbon copy address predicate.
    pub fn bcc(mut self, address: impl Into<String>) -> Self {
        self.terms.push(SearchTerm::Bcc(address.into()));
        self
    }

    /// Adds a parenthesized OR-group. Empty groups are dropped.
    pub fn any_of(mut self, terms: Vec<SearchTerm>) -> Self {
        if !terms.is_empty() {
            self.terms.push(SearchTerm::AnyOf(terms));
        }
        self
    }

    /// Finishes the query.
    pub fn build(self) -> SearchQuery {
        SearchQuery { terms: self.terms }
    }
}
