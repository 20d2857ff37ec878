//! End-to-end runs over in-memory listings: scan, link, prune, emit.

use std::io::Write;

use nmdep::graph::{Database, ObjId, SetName, UNDEF_POD};
use nmdep::link::{self, Unlink};
use nmdep::report;
use nmdep::scan::Scanner;

fn build(listings: &[&str]) -> (Database, Option<ObjId>) {
    let scanner = Scanner::new(false);
    let mut db = Database::new();
    let mut watermark = None;
    for (i, text) in listings.iter().enumerate() {
        scanner
            .scan_listing(&mut db, text, &format!("input{i}.nm"))
            .unwrap();
        if i == 0 {
            watermark = db.last_object();
        }
    }
    db.finish_ingest();
    (db, watermark)
}

fn members(db: &Database, s: SetName) -> Vec<String> {
    db.set_members(s).map(|f| db.obj(f).name.clone()).collect()
}

fn script(db: &Database) -> String {
    let mut out = Vec::new();
    report::write_script(db, &mut out, false).unwrap();
    String::from_utf8(out).unwrap()
}

const APP: &str = "A.o:\nmain T 0000 0010\nfoo U\n";

#[test]
fn complete_application_links_and_emits_every_extern() {
    let (mut db, watermark) = build(&[
        APP,
        "libx.a[b.o]:\nfoo T 0 0\nbar U\nlibx.a[c.o]:\nbar T 0 0\n",
    ]);
    link::seed_and_link(&mut db, watermark, false);
    link::prune_undefs(&mut db);

    assert_eq!(members(&db, SetName::Application), vec!["A.o", "b.o", "c.o"]);
    assert!(members(&db, SetName::Optional).is_empty());
    assert!(db.obj(UNDEF_POD).exports.is_empty());

    let text = script(&db);
    for sym in ["main", "foo", "bar"] {
        assert!(text.contains(&format!("EXTERN( {sym} )")), "missing {sym}");
    }
}

#[test]
fn missing_provider_leaves_the_application_alone() {
    // c.o is gone: 'bar' lands in the undefined pod, and b.o cannot be
    // pruned because the application needs 'foo'
    let (mut db, watermark) = build(&[APP, "libx.a[b.o]:\nfoo T 0 0\nbar U\n"]);
    link::seed_and_link(&mut db, watermark, false);

    let pod: Vec<_> = db
        .obj(UNDEF_POD)
        .exports
        .iter()
        .map(|&x| db.sym(db.xref(x).sym).name.clone())
        .collect();
    assert_eq!(pod, vec!["bar"]);

    link::prune_undefs(&mut db);
    assert_eq!(members(&db, SetName::Application), vec!["A.o", "b.o"]);
    assert!(members(&db, SetName::Optional).is_empty());
}

#[test]
fn unresolvable_optional_object_is_pruned_from_the_script() {
    let (mut db, watermark) = build(&[
        APP,
        "libx.a[b.o]:\nfoo T 0 0\nbar U\nlibx.a[c.o]:\nbar T 0 0\n\
         libx.a[d.o]:\nhelper T 0 0\nghost U\n",
    ]);
    link::seed_and_link(&mut db, watermark, false);
    assert_eq!(members(&db, SetName::Optional), vec!["d.o"]);

    link::prune_undefs(&mut db);
    assert!(members(&db, SetName::Optional).is_empty());

    let text = script(&db);
    assert!(!text.contains("helper"));
    assert!(text.contains("EXTERN( foo )"));
}

#[test]
fn ambiguous_removal_is_skipped() {
    let (mut db, watermark) = build(&[
        APP,
        "libx.a[b.o]:\nfoo T 0 0\nliby.a[b.o]:\nother T 0 0\n",
    ]);
    link::seed_and_link(&mut db, watermark, false);

    let mut log = Vec::new();
    link::remove_objects(&mut db, &mut log, "b.o\n", "removal.txt").unwrap();

    // both b.o instances keep their link set membership
    for &f in db.find_objects("b.o").unwrap() {
        assert!(db.obj(f).anchor.is_some());
    }
}

#[test]
fn clashing_definitions_survive_linking() {
    let (mut db, watermark) = build(&["p.o:\nsym T 0 0\nq.o:\nsym T 0 0\n"]);
    link::seed_and_link(&mut db, watermark, false);

    let mut out = Vec::new();
    let clashes = report::check_multiple_defs(&db, SetName::Application, &mut out).unwrap();
    assert_eq!(clashes, 1);
    // both definers stay linked, most recently seeded first
    assert_eq!(members(&db, SetName::Application), vec!["q.o", "p.o"]);
}

#[test]
fn weak_then_strong_definition_keeps_ingest_order() {
    let (mut db, watermark) = build(&[
        "user.o:\nmain T 0 0\nsym U\n",
        "p.o:\nsym W 0 0\nq.o:\nsym T 0 0\n",
    ]);
    link::seed_and_link(&mut db, watermark, false);

    let sym = db.lookup_symbol("sym").unwrap();
    let definers: Vec<_> = db
        .chain(db.sym(sym).exported_by)
        .map(|x| (db.obj(db.xref(x).obj).name.clone(), db.xref(x).weak))
        .collect();
    assert_eq!(
        definers,
        vec![("p.o".to_string(), true), ("q.o".to_string(), false)]
    );

    // traversal pulled in the first definition only
    assert_eq!(members(&db, SetName::Application), vec!["user.o", "p.o"]);
    assert_eq!(members(&db, SetName::Optional), vec!["q.o"]);
}

#[test]
fn ingesting_twice_grows_chains_proportionally() {
    let once = "a1.o:\nsym T 0 0\nref U\n";
    let again = "a2.o:\nsym T 0 0\nref U\n";
    let (db, _) = build(&[once, again]);

    let sym = db.lookup_symbol("sym").unwrap();
    assert_eq!(db.chain(db.sym(sym).exported_by).count(), 2);
    let r = db.lookup_symbol("ref").unwrap();
    assert_eq!(
        db.chain(db.sym(r).exported_by)
            .map(|x| db.xref(x).obj)
            .collect::<Vec<_>>(),
        vec![UNDEF_POD]
    );
}

#[test]
fn removal_after_prune_reports_not_linked() {
    let (mut db, watermark) = build(&[
        APP,
        "libx.a[b.o]:\nfoo T 0 0\nlibx.a[d.o]:\nhelper T 0 0\nghost U\n",
    ]);
    link::seed_and_link(&mut db, watermark, false);
    link::prune_undefs(&mut db);

    // d.o is already gone; a second unlink must not mutate anything
    let d = db.find_objects("[d.o]").unwrap()[0];
    assert_eq!(link::unlink_obj(&mut db, d), Unlink::NotLinked);
    assert_eq!(db.check_back_pointers(), 0);
}

#[test]
fn full_report_pipeline_writes_without_errors() {
    let (mut db, watermark) = build(&[
        APP,
        "libx.a[b.o]:\nfoo T 0 0\nbar U\nlibx.a[c.o]:\nbar T 0 0\n",
    ]);
    link::seed_and_link(&mut db, watermark, false);

    let mut log = Vec::new();
    report::list_undefined(&db, &mut log).unwrap();
    report::dump_syms(&db, &mut log).unwrap();
    report::dump_deps(&db, &mut log).unwrap();
    writeln!(log, "---").unwrap();
    assert!(!log.is_empty());
}
