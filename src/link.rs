//! Link set construction and teardown.
//!
//! 1. Seed every object into Application or Optional and pull in the
//!    providers of its imports, recursively
//! 2. Un-link an object together with everything that depends on it,
//!    unless that would evict an Application member
//! 3. Prune objects depending on symbols defined nowhere
//!
//! Linking is also the step that installs import edges into the
//! imported-from chains of their symbols; un-linking splices them back
//! out, so a full un-link leaves the graph as if the objects had never
//! been linked.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::graph::{Database, ObjId, SetName, SymId, UNDEF_POD};
use crate::walk::{walk_list, Direction};

/// Outcome of an un-link request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unlink {
    /// The object and its dependents were removed; carries the count.
    Removed(usize),
    /// Removal would evict this Application member; nothing changed.
    Rejected(ObjId),
    /// The object is not in any link set; nothing to do.
    NotLinked,
}

/// Seeds link sets in ingest order: Application up to and including the
/// watermark object (the last object of the first listing), Optional
/// after it. Objects already pulled into a set are left alone, so
/// Application membership dominates.
pub fn seed_and_link(db: &mut Database, watermark: Option<ObjId>, warn_undefined: bool) {
    let mut set = match watermark {
        Some(_) => SetName::Application,
        None => SetName::Optional,
    };
    for f in db.real_objects() {
        link_obj(db, f, set, None, warn_undefined);
        if Some(f) == watermark {
            set = SetName::Optional;
        }
    }
}

/// Alternative seeding: the first definer of `entry` seeds Application,
/// every other object becomes Optional. Fails when the symbol is
/// unknown or defined nowhere.
pub fn seed_with_entry(db: &mut Database, entry: &str, warn_undefined: bool) -> Result<()> {
    let sym = db
        .lookup_symbol(entry)
        .with_context(|| format!("application entry symbol '{entry}' is not in the database"))?;
    let ex = db.sym(sym).exported_by;
    let seed = match ex {
        Some(x) if db.xref(x).obj != UNDEF_POD => db.xref(x).obj,
        _ => anyhow::bail!("application entry symbol '{entry}' is undefined"),
    };
    link_obj(db, seed, SetName::Application, Some(sym), warn_undefined);
    for f in db.real_objects() {
        link_obj(db, f, SetName::Optional, None, warn_undefined);
    }
    Ok(())
}

/// Links `f` into `set`: installs its import edges into their symbols'
/// imported-from chains and recursively pulls in the first definer of
/// every import. Objects that already belong to a set are left there,
/// which makes repeated linking a no-op.
pub fn link_obj(
    db: &mut Database,
    f: ObjId,
    set: SetName,
    because_of: Option<SymId>,
    warn_undefined: bool,
) {
    if db.obj(f).anchor.is_some() {
        return;
    }
    db.obj_mut(f).anchor = Some(set);

    match because_of {
        Some(s) => debug!(
            "linking '{}' because of '{}' to {} link set",
            db.display_name(f),
            db.sym(s).name,
            set.title()
        ),
        None => debug!("linking '{}' to {} link set", db.display_name(f), set.title()),
    }

    for imp in db.obj(f).imports.clone() {
        // the edge must not be threaded anywhere yet
        debug_assert!(db.xref(imp).next.is_none());
        let sym = db.xref(imp).sym;
        let head = db.sym(sym).imported_from;
        db.xref_mut(imp).next = head;
        db.sym_mut(sym).imported_from = Some(imp);

        match db.sym(sym).exported_by {
            None => {
                if warn_undefined {
                    warn!("symbol {}:{} undefined", db.obj(f).name, db.sym(sym).name);
                }
            }
            Some(ex) => {
                let dep = db.xref(ex).obj;
                link_obj(db, dep, set, Some(sym), warn_undefined);
            }
        }
    }

    let head = db.set_head(set);
    db.obj_mut(f).link_next = head;
    *db.set_head_mut(set) = Some(f);
}

/// Removes `f` and every object transitively depending on it, unless
/// any object in that closure belongs to the Application set; then the
/// whole operation is rejected and nothing is mutated.
pub fn unlink_obj(db: &mut Database, f: ObjId) -> Unlink {
    if db.obj(f).anchor.is_none() {
        return Unlink::NotLinked;
    }

    let closure = walk_list(db, f, Direction::Exports);

    if let Some(&blocker) = closure
        .iter()
        .find(|&&g| db.obj(g).anchor == Some(SetName::Application))
    {
        debug!(
            target: "nmdep::unlink",
            "  --> rejected because '{}' is needed by app",
            db.display_name(blocker)
        );
        return Unlink::Rejected(blocker);
    }

    for &g in &closure {
        remove_object(db, g);
    }

    // every symbol a removed object exported had all its importers in
    // the closure, so its imported-from chain must be empty now
    debug_assert!(closure.iter().all(|&g| {
        db.obj(g)
            .exports
            .iter()
            .all(|&ex| db.sym(db.xref(ex).sym).imported_from.is_none())
    }));

    Unlink::Removed(closure.len())
}

/// Splices one object out of its symbols' imported-from chains and out
/// of its link set chain.
fn remove_object(db: &mut Database, g: ObjId) {
    debug!(target: "nmdep::unlink", "  removing object '{}'", db.display_name(g));

    for imp in db.obj(g).imports.clone() {
        let sym = db.xref(imp).sym;
        if db.sym(sym).imported_from == Some(imp) {
            db.sym_mut(sym).imported_from = db.xref(imp).next;
        } else {
            let mut p = db.sym(sym).imported_from;
            loop {
                let Some(pred) = p else {
                    unreachable!("import edge missing from its symbol's chain");
                };
                if db.xref(pred).next == Some(imp) {
                    db.xref_mut(pred).next = db.xref(imp).next;
                    break;
                }
                p = db.xref(pred).next;
            }
        }
        db.xref_mut(imp).next = None;
    }

    let Some(set) = db.obj(g).anchor else {
        unreachable!("removing an object that is in no link set");
    };
    if db.set_head(set) == Some(g) {
        *db.set_head_mut(set) = db.obj(g).link_next;
    } else {
        let mut p = db.set_head(set);
        loop {
            let Some(pred) = p else {
                unreachable!("object missing from its link set chain");
            };
            if db.obj(pred).link_next == Some(g) {
                db.obj_mut(pred).link_next = db.obj(g).link_next;
                break;
            }
            p = db.obj(pred).link_next;
        }
    }
    db.obj_mut(g).link_next = None;
    db.obj_mut(g).anchor = None;
}

/// Un-links every object depending on a symbol defined nowhere. An
/// object whose removal is rejected (the application reaches it) is
/// tolerated: such symbols are assumed to be satisfied by startup files
/// or linker scripts this tool cannot see.
pub fn prune_undefs(db: &mut Database) {
    for ex in db.obj(UNDEF_POD).exports.clone() {
        let sym = db.xref(ex).sym;
        debug!(
            target: "nmdep::unlink",
            "removing objects depending on '{}'",
            db.sym(sym).name
        );

        // unlink the head importer for as long as that succeeds
        while let Some(head) = db.sym(sym).imported_from {
            let importer = db.xref(head).obj;
            if !matches!(unlink_obj(db, importer), Unlink::Removed(_)) {
                break;
            }
        }

        // surviving edges reach the application; keep trying their
        // successors, skipping each rejected edge
        let mut p = db.sym(sym).imported_from;
        while let Some(edge) = p {
            debug!(
                target: "nmdep::unlink",
                "  skipping application dependency; object '{}'",
                db.display_name(db.xref(edge).obj)
            );
            loop {
                let Some(next) = db.xref(edge).next else {
                    break;
                };
                let importer = db.xref(next).obj;
                if !matches!(unlink_obj(db, importer), Unlink::Removed(_)) {
                    break;
                }
            }
            p = db.xref(edge).next;
        }
    }
}

/// Un-links the objects named in a removal list, one display name per
/// line. Lookup misses, ambiguous names and rejected removals are
/// reported and skipped.
pub fn remove_objects(
    db: &mut Database,
    log: &mut dyn Write,
    list: &str,
    list_name: &str,
) -> Result<()> {
    writeln!(
        log,
        "Processing list of files ('{list_name}') to unlink from {} link set",
        SetName::Optional.title()
    )?;

    for name in list.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let found = match db.find_objects(name) {
            Ok(found) => found.to_vec(),
            Err(e) => {
                warn!("{e}, skipping '{name}'");
                continue;
            }
        };
        match found.as_slice() {
            [] => warn!("object '{name}' not found, skipping"),
            &[f] => {
                if let Unlink::Rejected(_) = unlink_obj(db, f) {
                    warn!(
                        "object '{name}' couldn't be removed; \
                         probably it's needed by the application"
                    );
                }
            }
            many => {
                let candidates: Vec<String> =
                    many.iter().map(|&f| db.display_name(f)).collect();
                warn!(
                    "multiple occurrences of '{name}': {}; please be more specific, skipping",
                    candidates.join(", ")
                );
            }
        }
    }
    Ok(())
}
