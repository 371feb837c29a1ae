//! Query dialect translation
//!
//! Handler SQL is written with `?` placeholders. Server backends expect
//! numbered `$n` placeholders and reject embedded-engine `PRAGMA`s, so the
//! compatibility layer rewrites queries before they reach the wire.

use std::borrow::Cow;

/// SQL flavour spoken by the configured backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// In-process engine; `?` placeholders and `PRAGMA`s pass through
    #[default]
    Embedded,
    /// Network server; `$n` placeholders, no `PRAGMA`
    Server,
}

impl Dialect {
    /// Pick the dialect from a connection string's scheme
    pub fn from_dsn(dsn: &str) -> Self {
        let scheme = dsn
            .split_once("://")
            .map(|(scheme, _)| scheme.to_ascii_lowercase());

        match scheme.as_deref() {
            Some("postgres" | "postgresql" | "mysql" | "tcp") => Dialect::Server,
            _ => Dialect::Embedded,
        }
    }

    /// Rewrite `query` for this dialect. `None` means there is nothing to
    /// send (the statement only applies to the embedded engine).
    pub fn translate<'q>(&self, query: &'q str) -> Option<Cow<'q, str>> {
        match self {
            Dialect::Embedded => Some(Cow::Borrowed(query)),
            Dialect::Server => {
                if is_pragma(query) {
                    return None;
                }
                if !query.contains('?') {
                    return Some(Cow::Borrowed(query));
                }
                Some(Cow::Owned(number_placeholders(query)))
            }
        }
    }
}

fn is_pragma(query: &str) -> bool {
    query
        .trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("pragma"))
}

/// Replace `?` outside quoted literals with `$1`, `$2`, ...
fn number_placeholders(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 8);
    let mut chars = query.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;
    let mut index = 0;

    while let Some(ch) = chars.next() {
        match ch {
            '\'' if !in_double => {
                // '' inside a literal is an escaped quote
                if in_single && chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push_str("''");
                    continue;
                }
                in_single = !in_single;
                out.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                out.push(ch);
            }
            '?' if !in_single && !in_double => {
                index += 1;
                out.push('$');
                out.push_str(&index.to_string());
            }
            _ => out.push(ch),
        }
    }

    out
}
