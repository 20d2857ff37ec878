//! Dependency traversal.
//!
//! A single walker serves both directions over the graph:
//! - `Imports`: from an object to the objects defining the symbols it
//!   references, following only the first definition of each symbol.
//! - `Exports`: from an object to every object referencing one of the
//!   symbols it defines.
//!
//! Each walk owns its visitation state (a per-object marker plus the
//! discovery-order list), so walks can be freely nested or interleaved.

use crate::graph::{Database, ObjId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Imports,
    Exports,
}

/// Invokes `each` for the direct dependencies of `f`.
fn for_each_dep(db: &Database, f: ObjId, dir: Direction, each: &mut dyn FnMut(ObjId)) {
    match dir {
        Direction::Imports => {
            for &imp in &db.obj(f).imports {
                let sym = db.xref(imp).sym;
                // only the first definition satisfies the import
                if let Some(head) = db.sym(sym).exported_by {
                    each(db.xref(head).obj);
                }
            }
        }
        Direction::Exports => {
            for &ex in &db.obj(f).exports {
                let sym = db.xref(ex).sym;
                for r in db.chain(db.sym(sym).imported_from) {
                    each(db.xref(r).obj);
                }
            }
        }
    }
}

/// Depth-first pre-order visit. The marker is held only along the
/// active descent path: it breaks cycles, but an object reachable on
/// two disjoint paths is reported on each. Use [`walk_list`] when every
/// object must appear exactly once.
pub fn walk_visit(
    db: &Database,
    root: ObjId,
    dir: Direction,
    action: &mut dyn FnMut(ObjId, usize),
) {
    let mut on_path = vec![false; db.objects.len()];
    on_path[root.0 as usize] = true;
    visit_rec(db, root, 0, dir, &mut on_path, action);
}

fn visit_rec(
    db: &Database,
    f: ObjId,
    depth: usize,
    dir: Direction,
    on_path: &mut Vec<bool>,
    action: &mut dyn FnMut(ObjId, usize),
) {
    action(f, depth);
    for_each_dep(db, f, dir, &mut |dep| {
        if !on_path[dep.0 as usize] {
            on_path[dep.0 as usize] = true;
            visit_rec(db, dep, depth + 1, dir, on_path, action);
            on_path[dep.0 as usize] = false;
        }
    });
}

/// Materializes the transitive closure of `f` as a work list in
/// discovery order, `f` first, each object exactly once.
pub fn walk_list(db: &Database, root: ObjId, dir: Direction) -> Vec<ObjId> {
    let mut enqueued = vec![false; db.objects.len()];
    let mut order = Vec::new();
    enqueued[root.0 as usize] = true;
    order.push(root);
    list_rec(db, root, dir, &mut enqueued, &mut order);

    debug_assert!(
        {
            let mut sorted = order.clone();
            sorted.sort_unstable();
            sorted.windows(2).all(|w| w[0] != w[1])
        },
        "work list contains duplicates"
    );
    order
}

fn list_rec(
    db: &Database,
    f: ObjId,
    dir: Direction,
    enqueued: &mut Vec<bool>,
    order: &mut Vec<ObjId>,
) {
    for_each_dep(db, f, dir, &mut |dep| {
        if !enqueued[dep.0 as usize] {
            enqueued[dep.0 as usize] = true;
            order.push(dep);
            list_rec(db, dep, dir, enqueued, order);
        }
    });
}
