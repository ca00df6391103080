//! Picking property values out of N-Triples resource descriptions.
//!
//! Parsing is done by `oxttl`; statements it rejects are skipped.

use oxrdf::vocab::{rdf, xsd};
use oxttl::NTriplesParser;

/// Object of a triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Iri(String),
    Blank(String),
    /// `datatype` is only set for typed literals other than `xsd:string`.
    Literal { value: String, lang: Option<String>, datatype: Option<String> },
}

impl Term {
    /// IRI or literal lexical value; blank node label otherwise.
    pub fn value(&self) -> &str {
        match self {
            Term::Iri(v) | Term::Blank(v) => v,
            Term::Literal { value, .. } => value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    /// Subject IRI, or `_:label` for blank nodes.
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

/// Every well-formed triple of `doc`.
pub fn triples(doc: &str) -> impl Iterator<Item = Triple> + '_ {
    NTriplesParser::new()
        .for_slice(doc.as_bytes())
        .filter_map(|parsed| match parsed {
            Ok(triple) => convert(triple),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed statement");
                None
            }
        })
}

/// Objects of all triples with the given subject and predicate, in
/// document order.
pub fn objects(doc: &str, subject: &str, predicate: &str) -> Vec<Term> {
    triples(doc)
        .filter(|t| t.subject == subject && t.predicate == predicate)
        .map(|t| t.object)
        .collect()
}

#[allow(unreachable_patterns)]
fn convert(triple: oxrdf::Triple) -> Option<Triple> {
    let subject = match triple.subject {
        oxrdf::Subject::NamedNode(n) => n.into_string(),
        oxrdf::Subject::BlankNode(b) => format!("_:{}", b.as_str()),
        _ => return None,
    };
    let object = match triple.object {
        oxrdf::Term::NamedNode(n) => Term::Iri(n.into_string()),
        oxrdf::Term::BlankNode(b) => Term::Blank(format!("_:{}", b.as_str())),
        oxrdf::Term::Literal(l) => {
            let (value, datatype, lang) = l.destruct();
            let datatype = datatype
                .filter(|dt| dt.as_ref() != xsd::STRING && dt.as_ref() != rdf::LANG_STRING)
                .map(|dt| dt.into_string());
            Term::Literal { value, lang, datatype }
        }
        _ => return None,
    };
    Some(Triple { subject, predicate: triple.predicate.into_string(), object })
}
