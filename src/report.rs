//! Trace reports and the linker script emitter.
//!
//! Everything here only reads the database and writes prose (or a
//! linker script) to the caller's sink, which is stdout, the `-o` log
//! file, or the interactive session.

use std::collections::HashSet;
use std::io::Write;

use anyhow::Result;

use crate::graph::{Database, ObjId, SetName, SymId};
use crate::walk::{walk_list, Direction};

/// Prints a work list, one display name per line. Entries before
/// `min_depth` (list positions, so `1` skips the root) are suppressed.
fn print_list(
    db: &Database,
    out: &mut dyn Write,
    list: &[ObjId],
    min_depth: usize,
    indent: usize,
) -> Result<()> {
    for &f in list.iter().skip(min_depth) {
        writeln!(out, "{:indent$}{}", "", db.display_name(f))?;
    }
    Ok(())
}

/// Everything known about one symbol: where it is defined, what linking
/// its first definer drags in, and which objects depend on it.
pub fn track_sym(db: &Database, out: &mut dyn Write, s: SymId) -> Result<()> {
    let sym = db.sym(s);
    writeln!(out, "What I know about Symbol '{}':", sym.name)?;

    write!(out, "  Defined in object: ")?;
    match sym.exported_by {
        None => writeln!(out, " NOWHERE!!!")?,
        Some(head) => {
            for (i, x) in db.chain(Some(head)).enumerate() {
                if i > 0 {
                    write!(out, "      AND in object: ")?;
                }
                let weak = if db.xref(x).weak { " (WEAK)" } else { "" };
                writeln!(out, "{}{weak}", db.display_name(db.xref(x).obj))?;
            }
        }
    }

    if let Some(head) = sym.exported_by {
        let definer = db.xref(head).obj;
        write!(out, "  Depending on objects (triggers linkage of):")?;
        if db.obj(definer).imports.is_empty() {
            writeln!(out, " NONE")?;
        } else {
            writeln!(out)?;
            let list = walk_list(db, definer, Direction::Imports);
            print_list(db, out, &list, 1, 0)?;
        }
    }

    writeln!(out, "  Objects depending (maybe indirectly) on this symbol:")?;
    writeln!(
        out,
        "  Note: the host object may depend on yet more objects due to other symbols..."
    )?;
    match sym.imported_from {
        None => writeln!(out, " NONE")?,
        Some(head) => {
            writeln!(out)?;
            for imp in db.chain(Some(head)) {
                let list = walk_list(db, db.xref(imp).obj, Direction::Exports);
                print_list(db, out, &list, 0, 4)?;
            }
        }
    }
    Ok(())
}

/// Everything known about one object: its exports, its imports, and the
/// transitive closures in both directions.
pub fn track_obj(db: &Database, out: &mut dyn Write, f: ObjId) -> Result<()> {
    writeln!(out, "What I know about object '{}':", db.display_name(f))?;

    writeln!(out, "  Exported symbols:")?;
    for &ex in &db.obj(f).exports {
        writeln!(out, "    {}", db.sym(db.xref(ex).sym).name)?;
    }

    writeln!(out, "  Imported symbols:")?;
    for &imp in &db.obj(f).imports {
        writeln!(out, "    {}", db.sym(db.xref(imp).sym).name)?;
    }

    writeln!(out, "  Objects depending on me (including indirect dependencies):")?;
    let list = walk_list(db, f, Direction::Exports);
    print_list(db, out, &list, 0, 4)?;

    writeln!(out, "  Objects I depend on (including indirect dependencies):")?;
    let list = walk_list(db, f, Direction::Imports);
    print_list(db, out, &list, 0, 4)?;
    Ok(())
}

/// Reports symbols exported by more than one object of the link set.
/// Common symbols (type `C`) are exempt. Returns the clash count.
pub fn check_multiple_defs(db: &Database, s: SetName, out: &mut dyn Write) -> Result<usize> {
    writeln!(
        out,
        "Checking for multiply defined symbols in the {} link set:",
        s.title()
    )?;

    let mut reported: HashSet<SymId> = HashSet::new();
    let mut clashes = 0;
    for f in db.set_members(s) {
        for &ex in &db.obj(f).exports {
            let sym = db.xref(ex).sym;
            if db.chain(db.sym(sym).exported_by).nth(1).is_none() {
                continue;
            }
            if db.sym(sym).type_code == 'C' || !reported.insert(sym) {
                continue;
            }
            clashes += 1;
            writeln!(
                out,
                "WARNING: Name Clash Detected; symbol '{}' (type '{}') \
                 exported by multiple objects:",
                db.sym(sym).name,
                db.sym(sym).type_code
            )?;
            for r in db.chain(db.sym(sym).exported_by) {
                let weak = if db.xref(r).weak { " (WEAK)" } else { "" };
                writeln!(out, "  in '{}'{weak}", db.display_name(db.xref(r).obj))?;
            }
        }
    }
    writeln!(out, "OK")?;
    Ok(clashes)
}

/// The flat dependency closure of every object (`-d`).
pub fn dump_deps(db: &Database, out: &mut dyn Write) -> Result<()> {
    for f in db.real_objects() {
        writeln!(
            out,
            "\nFlat dependency list for objects requiring: {}",
            db.obj(f).name
        )?;
        let list = walk_list(db, f, Direction::Exports);
        print_list(db, out, &list, 0, 0)?;
    }
    Ok(())
}

/// The full trace report of every symbol, in name order (`-s`).
pub fn dump_syms(db: &Database, out: &mut dyn Write) -> Result<()> {
    let mut ids: Vec<SymId> = (0..db.symbols.len() as u32).map(SymId).collect();
    ids.sort_by(|&a, &b| db.sym(a).name.cmp(&db.sym(b).name));
    for s in ids {
        track_sym(db, out, s)?;
    }
    Ok(())
}

/// The post-ingest listing of symbols defined nowhere.
pub fn list_undefined(db: &Database, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "Looking for UNDEFINED symbols:")?;
    for &ex in &db.obj(crate::graph::UNDEF_POD).exports {
        writeln!(out, " - '{}'", db.sym(db.xref(ex).sym).name)?;
    }
    writeln!(out, "done")?;
    Ok(())
}

fn write_link_set(db: &Database, out: &mut dyn Write, s: SetName, title: &str) -> Result<()> {
    if db.set_head(s).is_none() {
        return Ok(());
    }
    writeln!(out, "/* ----- {title} Link Set ----- */\n")?;
    for f in db.set_members(s) {
        writeln!(out, "/* {}: */", db.display_name(f))?;
        for &ex in &db.obj(f).exports {
            writeln!(out, "EXTERN( {} )", db.sym(db.xref(ex).sym).name)?;
        }
    }
    Ok(())
}

/// Generates a linker script with external references enforcing the
/// linkage of the Application and Optional sets.
pub fn write_script(db: &Database, out: &mut dyn Write, optional_only: bool) -> Result<()> {
    if !optional_only {
        write_link_set(db, out, SetName::Application, "Application")?;
        writeln!(out)?;
    }
    write_link_set(db, out, SetName::Optional, "Optional")
}
