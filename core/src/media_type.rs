//! Resolves MIME types to registered format names.
//!
//! A format matches a media type when it names the subtype
//! (`text/xml`), its structured-syntax suffix (`application/vnd.api+json`),
//! or the last `-`/`.` separated segment of the subtype
//! (`application/x-yaml`). Matching never looks inside a segment, so a
//! format called "on" does not match `application/json`.

use mime::Mime;

use crate::error::{Error, Result};

/// Built-in formats, in resolution order.
pub const KNOWN_FORMATS: &[&str] = &["json", "xml"];

/// Parse a media type, parameters included.
pub fn parse(media_type: &str) -> Result<Mime> {
    media_type
        .trim()
        .parse::<Mime>()
        .map_err(|source| Error::MalformedMediaType {
            media_type: media_type.to_string(),
            source,
        })
}

/// Whether `format` is the representation named by `mime`.
pub fn matches_format(mime: &Mime, format: &str) -> bool {
    let subtype = mime.subtype().as_str();
    if subtype.eq_ignore_ascii_case(format) {
        return true;
    }
    if let Some(suffix) = mime.suffix() {
        if suffix.as_str().eq_ignore_ascii_case(format) {
            return true;
        }
    }
    subtype
        .rsplit(['-', '.'])
        .next()
        .is_some_and(|tail| tail.eq_ignore_ascii_case(format))
}

/// Resolve `media_type` against `formats`, returning the first match.
pub fn resolve<'a, I>(media_type: &str, formats: I) -> Result<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mime = parse(media_type)?;
    formats
        .into_iter()
        .find(|format| matches_format(&mime, format))
        .ok_or_else(|| Error::UnresolvedFormat(media_type.to_string()))
}

/// Resolve `media_type` against the built-in formats.
pub fn media_type_format(media_type: &str) -> Result<&'static str> {
    resolve(media_type, KNOWN_FORMATS.iter().copied())
}
