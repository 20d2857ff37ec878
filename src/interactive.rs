//! Interactive database queries.
//!
//! Reads queries from one line-oriented source until a single `.`:
//! a query ending in `]` looks up objects (with a numbered choice when
//! the name is ambiguous), anything else looks up a symbol.

use std::io::{BufRead, Write};

use anyhow::Result;

use crate::graph::Database;
use crate::report;

fn read_line(input: &mut dyn BufRead) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn menu(out: &mut dyn Write) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "Query database (enter single '.' to quit) for")?;
    writeln!(out, " A) Symbols, e.g. 'printf'")?;
    writeln!(out, " B) Objects, e.g. '[printf.o]', 'libc.a[printf.o]'")?;
    writeln!(out)?;
    Ok(())
}

pub fn query_loop(db: &Database, input: &mut dyn BufRead, out: &mut dyn Write) -> Result<()> {
    menu(out)?;
    while let Some(query) = read_line(input)? {
        match query.as_str() {
            "." => break,
            "" => {
                menu(out)?;
                continue;
            }
            q if q.ends_with(']') => {
                if !query_object(db, q, input, out)? {
                    break;
                }
            }
            q => match db.lookup_symbol(q) {
                Some(s) => report::track_sym(db, out, s)?,
                None => writeln!(out, "Symbol '{q}' not found, try again")?,
            },
        }
    }
    Ok(())
}

/// Returns `false` when the session should end (a `.` or end of input
/// while disambiguating).
fn query_object(
    db: &Database,
    query: &str,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> Result<bool> {
    let found = match db.find_objects(query) {
        Ok(found) => found.to_vec(),
        Err(e) => {
            writeln!(out, "{e}")?;
            return Ok(true);
        }
    };

    match found.as_slice() {
        [] => {
            writeln!(out, "object '{query}' not found, try again.")?;
        }
        [f] => report::track_obj(db, out, *f)?,
        many => {
            writeln!(out, "multiple instances found, make a choice:")?;
            for (i, &f) in many.iter().enumerate() {
                writeln!(out, "{i}) - {}", db.display_name(f))?;
            }
            loop {
                let Some(line) = read_line(input)? else {
                    return Ok(false);
                };
                if line == "." {
                    return Ok(false);
                }
                match line.parse::<usize>() {
                    Ok(choice) if choice < many.len() => {
                        report::track_obj(db, out, many[choice])?;
                        break;
                    }
                    _ => writeln!(out, "Invalid Choice, try again")?,
                }
            }
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link;
    use crate::scan::Scanner;
    use std::io::Cursor;

    fn db() -> Database {
        let mut db = Database::new();
        Scanner::new(false)
            .scan_listing(
                &mut db,
                "A.o:\nmain T 0 0\nfoo U\nlibx.a[b.o]:\nfoo T 0 0\nliby.a[b.o]:\nfoo W 0 0\n",
                "app.nm",
            )
            .unwrap();
        db.finish_ingest();
        let watermark = db.last_object();
        link::seed_and_link(&mut db, watermark, false);
        db
    }

    fn session(input: &str) -> String {
        let db = db();
        let mut out = Vec::new();
        query_loop(&db, &mut Cursor::new(input), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn symbol_and_object_queries() {
        let text = session("main\n[A.o]\n.\n");
        assert!(text.contains("What I know about Symbol 'main':"));
        assert!(text.contains("What I know about object 'A.o':"));
    }

    #[test]
    fn ambiguous_object_asks_for_a_choice() {
        let text = session("[b.o]\n1\n.\n");
        assert!(text.contains("multiple instances found, make a choice:"));
        assert!(text.contains("What I know about object 'liby.a[b.o]':"));
    }

    #[test]
    fn misses_are_reported_and_ignored() {
        let text = session("nosuch\n[nosuch.o]\n.\n");
        assert!(text.contains("Symbol 'nosuch' not found, try again"));
        assert!(text.contains("object '[nosuch.o]' not found, try again."));
    }

    #[test]
    fn invalid_choice_is_retried() {
        let text = session("[b.o]\nx\n0\n.\n");
        assert!(text.contains("Invalid Choice, try again"));
        assert!(text.contains("What I know about object 'libx.a[b.o]':"));
    }
}
