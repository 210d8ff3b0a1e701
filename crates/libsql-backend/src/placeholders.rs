//! Placeholder translation from the ORM dialect to the native dialect.
//!
//! The ORM emits `%s` for positional parameters and `%(name)s` for named
//! ones. The native driver expects `?` and `:name`. A doubled `%%` is an
//! escaped literal percent sign and becomes `%`.
//!
//! Statements executed without parameters are passed through verbatim,
//! including any `%%`.

use libsql_backend_core::{Error, Params, Result};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

static POSITIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%%|%s").expect("static positional placeholder regex")
});

static NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"%%|%\(([^)]+)\)s").expect("static named placeholder regex")
});

/// Rewrite `sql` for the parameter shape in `params`.
///
/// Named placeholders must all appear in `params`; an unknown name is a
/// programming error reported before anything reaches the driver.
pub fn translate<'a>(sql: &'a str, params: &Params) -> Result<Cow<'a, str>> {
    match params {
        Params::None => Ok(Cow::Borrowed(sql)),
        Params::Positional(_) => Ok(translate_positional(sql)),
        Params::Named(_) => translate_named(sql, params),
    }
}

/// Rewrite `sql` once for a batch, using the first entry's shape.
pub fn translate_batch<'a>(sql: &'a str, batches: &[Params]) -> Result<Cow<'a, str>> {
    match batches.first() {
        None => Ok(Cow::Borrowed(sql)),
        Some(first) => translate(sql, first),
    }
}

fn translate_positional(sql: &str) -> Cow<'_, str> {
    POSITIONAL.replace_all(sql, |caps: &Captures<'_>| {
        if &caps[0] == "%%" { "%" } else { "?" }
    })
}

fn translate_named<'a>(sql: &'a str, params: &Params) -> Result<Cow<'a, str>> {
    let mut missing: Option<String> = None;
    let out = NAMED.replace_all(sql, |caps: &Captures<'_>| match caps.get(1) {
        None => "%".to_string(),
        Some(name) => {
            let name = name.as_str();
            if !params.contains_name(name) && missing.is_none() {
                missing = Some(name.to_string());
            }
            format!(":{}", name)
        }
    });

    if let Some(name) = missing {
        return Err(Error::Programming(format!(
            "named placeholder %({})s has no matching parameter",
            name
        )));
    }
    Ok(out)
}
