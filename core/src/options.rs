//! Query options and small request helpers.
//!
//! Options are any `Serialize` value that `serde_urlencoded` accepts, most
//! often a struct of `Option` fields marked
//! `#[serde(skip_serializing_if = "Option::is_none")]`.

use base64::Engine;
use serde::Serialize;
use url::Url;

use crate::error::Result;

/// Replace the query of `url` with the encoded `options`.
///
/// `None` returns `url` unchanged. Relative references are accepted.
pub fn add_options<O: Serialize>(url: &str, options: Option<&O>) -> Result<String> {
    let Some(options) = options else {
        return Ok(url.to_string());
    };
    let query = serde_urlencoded::to_string(options)?;

    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query((!query.is_empty()).then_some(query.as_str()));
            Ok(parsed.into())
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(replace_query(url, &query)),
        Err(e) => Err(e.into()),
    }
}

fn replace_query(reference: &str, query: &str) -> String {
    let (head, fragment) = match reference.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (reference, None),
    };
    let path = head.split_once('?').map_or(head, |(path, _)| path);

    let mut out = path.to_string();
    if !query.is_empty() {
        out.push('?');
        out.push_str(query);
    }
    if let Some(fragment) = fragment {
        out.push('#');
        out.push_str(fragment);
    }
    out
}

/// Base64 credentials for an `Authorization: Basic` header.
pub fn basic_auth(username: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"))
}
