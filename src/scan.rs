//! Symbol listing scanner.
//!
//! Parses listings produced by `nm -g -fposix`:
//!
//! ```text
//! <library_name>'['<archive_member_name>']:'
//! <symbol_name>' '<class_char>' '[<start>' '<end>]
//! ```
//!
//! and feeds object/symbol events into the database. Definition type
//! codes (`T D B R G S A C`, weak `W V`) become exports; `U` becomes an
//! import. In lenient mode lowercase codes are upcased first and `?` is
//! accepted as an undefined reference.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::warn;

use crate::graph::Database;

pub struct Scanner {
    pub lenient: bool,
}

impl Scanner {
    pub fn new(lenient: bool) -> Self {
        Scanner { lenient }
    }

    /// Scans one listing into the database. `listing` is the display
    /// name used in diagnostics and for fabricated object names.
    pub fn scan_listing(&self, db: &mut Database, text: &str, listing: &str) -> Result<()> {
        for (n, raw) in text.lines().enumerate() {
            let line = n + 1;
            let mut fields = raw.split_whitespace();
            let Some(first) = fields.next() else {
                continue;
            };

            let Some(type_field) = fields.next() else {
                // a lone field is an object header
                let Some(name) = first.strip_suffix(':') else {
                    bail!(
                        "{listing}:{line}: object name '{first}' not ':' terminated - \
                         did you use 'nm -fposix'?"
                    );
                };
                db.begin_object(name)
                    .with_context(|| format!("{listing}:{line}"))?;
                continue;
            };

            if !db.has_current_object() {
                let substitute = fallback_object_name(listing);
                warn!("{listing}:{line}: symbol without object file, substituting '{substitute}'");
                db.begin_object(&substitute)
                    .with_context(|| format!("{listing}:{line}"))?;
            }

            // fields after the type code (value, size) are ignored
            let Some(code) = type_field.chars().next() else {
                continue;
            };
            let code = if self.lenient {
                code.to_ascii_uppercase()
            } else {
                code
            };

            match code {
                'W' | 'V' => db.add_export(first, code, true)?,
                'T' | 'D' | 'B' | 'R' | 'G' | 'S' | 'A' | 'C' => {
                    db.add_export(first, code, false)?
                }
                'U' => db.add_import(first, code)?,
                '?' if self.lenient => db.add_import(first, code)?,
                _ => bail!("{listing}:{line}: unknown symbol type '{code}'"),
            }
        }
        db.end_listing();
        Ok(())
    }
}

/// Object name substituted when a listing starts with symbol lines:
/// the listing's base name with its extension replaced by `.o`.
fn fallback_object_name(listing: &str) -> String {
    let path = Path::new(listing);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(listing);
    format!("{stem}.o")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::UNDEF_POD;

    fn scan(text: &str) -> Database {
        let mut db = Database::new();
        Scanner::new(false)
            .scan_listing(&mut db, text, "test.nm")
            .unwrap();
        db.finish_ingest();
        db
    }

    #[test]
    fn parses_headers_and_symbol_classes() {
        let db = scan(
            "a.o:\n\
             main T 0000 0010\n\
             foo U\n\
             libx.a[b.o]:\n\
             foo T 0020 0004\n",
        );
        let a = db.find_objects("a.o").unwrap()[0];
        assert_eq!(db.obj(a).exports.len(), 1);
        assert_eq!(db.obj(a).imports.len(), 1);
        let b = db.find_objects("libx.a[b.o]").unwrap()[0];
        assert_eq!(db.obj(b).exports.len(), 1);
        assert!(db.obj(UNDEF_POD).exports.is_empty());
    }

    #[test]
    fn blank_lines_and_extra_columns_are_tolerated() {
        let db = scan("a.o:\n\n  main   T   0 10\n\nbss B 8 8\n");
        let a = db.find_objects("a.o").unwrap()[0];
        assert_eq!(db.obj(a).exports.len(), 2);
    }

    #[test]
    fn unterminated_header_is_fatal() {
        let mut db = Database::new();
        let err = Scanner::new(false)
            .scan_listing(&mut db, "a.o\n", "bad.nm")
            .unwrap_err();
        assert!(err.to_string().contains("bad.nm:1"));
    }

    #[test]
    fn unknown_type_is_fatal_unless_lenient() {
        let mut db = Database::new();
        let err = Scanner::new(false)
            .scan_listing(&mut db, "a.o:\nfoo ? 0 0\n", "x.nm")
            .unwrap_err();
        assert!(err.to_string().contains("unknown symbol type"));

        let mut db = Database::new();
        Scanner::new(true)
            .scan_listing(&mut db, "a.o:\nfoo ?\nbar t 0 0\n", "x.nm")
            .unwrap();
        db.finish_ingest();
        let a = db.find_objects("a.o").unwrap()[0];
        // '?' became an import, lowercase 't' an export
        assert_eq!(db.obj(a).imports.len(), 1);
        assert_eq!(db.obj(a).exports.len(), 1);
    }

    #[test]
    fn symbol_before_header_fabricates_an_object() {
        let mut db = Database::new();
        Scanner::new(false)
            .scan_listing(&mut db, "main T 0 0\n", "dir/app.nm")
            .unwrap();
        db.finish_ingest();
        assert_eq!(db.find_objects("app.o").unwrap().len(), 1);
    }

    #[test]
    fn weak_codes_mark_the_export() {
        let db = scan("a.o:\nsym W 0 0\nb.o:\nsym T 0 0\n");
        let sym = db.lookup_symbol("sym").unwrap();
        let weaks: Vec<bool> = db
            .chain(db.sym(sym).exported_by)
            .map(|x| db.xref(x).weak)
            .collect();
        assert_eq!(weaks, vec![true, false]);
    }
}
