//! The symbol/object database.
//!
//! Objects, symbols and the cross-reference edges between them live in
//! index-addressed arenas owned by [`Database`]. Every edge is a single
//! [`Xref`] record: it sits in the export or import array of exactly one
//! object and is simultaneously threaded into one of the two chains owned
//! by its symbol (exported-by or imported-from). Following `Xref::next`
//! walks the symbol-side chain.
//!
//! Export edges are hooked into their symbols' exported-by chains in a
//! fix-up step that runs once the owning object is complete, so the chain
//! order is the ingest order of definitions. Import edges are hooked into
//! the imported-from chains by the linker, not at ingest.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use tracing::{error, warn};

/// Index of an object in [`Database::objects`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjId(pub u32);

/// Index of a symbol in [`Database::symbols`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymId(pub u32);

/// Index of an edge in [`Database::xrefs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct XrefId(pub u32);

/// Index of a library in [`Database::libs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibId(pub u32);

/// The synthetic object exporting every symbol defined nowhere. It is
/// created with the database and is permanently anchored to the
/// Undefined link set.
pub const UNDEF_POD: ObjId = ObjId(0);

/// The three link sets an object can be collected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetName {
    Application,
    Optional,
    Undefined,
}

impl SetName {
    pub fn title(self) -> &'static str {
        match self {
            SetName::Application => "Application",
            SetName::Optional => "Optional",
            SetName::Undefined => "UNDEFINED",
        }
    }
}

/// One directed edge between an object and a symbol.
#[derive(Debug)]
pub struct Xref {
    pub sym: SymId,
    pub obj: ObjId,
    /// Weak definition (`W`/`V` type codes).
    pub weak: bool,
    /// Successor in the symbol-side chain this edge is threaded into.
    pub next: Option<XrefId>,
}

/// One archive member or standalone compiled unit.
#[derive(Debug)]
pub struct Object {
    pub name: String,
    pub lib: Option<LibId>,
    /// Edges for the symbols this object defines, in ingest order.
    pub exports: Vec<XrefId>,
    /// Edges for the symbols this object references, in ingest order.
    pub imports: Vec<XrefId>,
    /// The link set this object currently belongs to, if any.
    pub anchor: Option<SetName>,
    /// Successor in the anchor set's membership chain.
    pub link_next: Option<ObjId>,
}

/// One linker name together with its definition and use sites.
#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    /// Type code from the listing. The first seen type wins, except that
    /// `U` is upgraded by a later definition.
    pub type_code: char,
    /// Head of the chain of edges defining this symbol.
    pub exported_by: Option<XrefId>,
    /// Head of the chain of edges referencing this symbol.
    pub imported_from: Option<XrefId>,
}

/// An archive grouping objects; used to disambiguate member lookup.
#[derive(Debug)]
pub struct Library {
    pub name: String,
    pub members: Vec<ObjId>,
}

pub struct Database {
    pub objects: Vec<Object>,
    pub symbols: Vec<Symbol>,
    pub xrefs: Vec<Xref>,
    pub libs: Vec<Library>,
    /// Symbol lookup table, ordered by name.
    by_name: BTreeMap<String, SymId>,
    /// Heads of the Application, Optional and Undefined chains.
    sets: [Option<ObjId>; 3],
    /// All real objects sorted by `(name, library)`, for member lookup.
    index: Vec<ObjId>,
    /// Object the scanner is currently appending symbols to.
    current: Option<ObjId>,
}

/// Splits a display name into `(library, member)`. A trailing `]`
/// marks the `library[member]` form.
pub fn split_display_name(name: &str) -> Result<(Option<&str>, &str)> {
    match name.strip_suffix(']') {
        Some(stripped) => {
            let Some((lib, member)) = stripped.rsplit_once('[') else {
                bail!("malformed archive member name '{name}': 'library[member]' expected");
            };
            Ok((Some(lib), member))
        }
        None => Ok((None, name)),
    }
}

impl Database {
    pub fn new() -> Self {
        let pod = Object {
            name: "<UNDEFINED>".to_string(),
            lib: None,
            exports: Vec::new(),
            imports: Vec::new(),
            anchor: Some(SetName::Undefined),
            link_next: None,
        };
        Database {
            objects: vec![pod],
            symbols: Vec::new(),
            xrefs: Vec::new(),
            libs: Vec::new(),
            by_name: BTreeMap::new(),
            sets: [None, None, Some(UNDEF_POD)],
            index: Vec::new(),
            current: None,
        }
    }

    pub fn obj(&self, f: ObjId) -> &Object {
        &self.objects[f.0 as usize]
    }

    pub fn obj_mut(&mut self, f: ObjId) -> &mut Object {
        &mut self.objects[f.0 as usize]
    }

    pub fn sym(&self, s: SymId) -> &Symbol {
        &self.symbols[s.0 as usize]
    }

    pub fn sym_mut(&mut self, s: SymId) -> &mut Symbol {
        &mut self.symbols[s.0 as usize]
    }

    pub fn xref(&self, x: XrefId) -> &Xref {
        &self.xrefs[x.0 as usize]
    }

    pub fn xref_mut(&mut self, x: XrefId) -> &mut Xref {
        &mut self.xrefs[x.0 as usize]
    }

    pub fn lib(&self, l: LibId) -> &Library {
        &self.libs[l.0 as usize]
    }

    /// All objects except the undefined pod, in ingest order.
    pub fn real_objects(&self) -> impl Iterator<Item = ObjId> {
        (1..self.objects.len() as u32).map(ObjId)
    }

    /// The most recently created real object, if any.
    pub fn last_object(&self) -> Option<ObjId> {
        (self.objects.len() > 1).then(|| ObjId(self.objects.len() as u32 - 1))
    }

    pub fn lookup_symbol(&self, name: &str) -> Option<SymId> {
        self.by_name.get(name).copied()
    }

    /// Walks a symbol-side chain starting at `head`.
    pub fn chain(&self, head: Option<XrefId>) -> impl Iterator<Item = XrefId> + '_ {
        std::iter::successors(head, move |&x| self.xref(x).next)
    }

    pub fn set_head(&self, s: SetName) -> Option<ObjId> {
        self.sets[s as usize]
    }

    pub fn set_head_mut(&mut self, s: SetName) -> &mut Option<ObjId> {
        &mut self.sets[s as usize]
    }

    /// Members of a link set in chain order.
    pub fn set_members(&self, s: SetName) -> impl Iterator<Item = ObjId> + '_ {
        std::iter::successors(self.set_head(s), move |&f| self.obj(f).link_next)
    }

    /// `member` alone, or `lib[member]` with the library path stripped
    /// to its final component.
    pub fn display_name(&self, f: ObjId) -> String {
        let obj = self.obj(f);
        match obj.lib {
            Some(l) => {
                let name = self.lib(l).name.as_str();
                let base = name.rsplit('/').next().unwrap_or(name);
                format!("{base}[{}]", obj.name)
            }
            None => obj.name.clone(),
        }
    }

    /// Whether a `Symbol` ingest event currently has an object to attach to.
    pub fn has_current_object(&self) -> bool {
        self.current.is_some()
    }

    /// Begins a new object; the previous one, if any, gets its export
    /// fix-up now that its export array is final.
    pub fn begin_object(&mut self, display: &str) -> Result<ObjId> {
        self.end_listing();

        let (lib, member) = split_display_name(display)?;
        let id = ObjId(self.objects.len() as u32);
        let lib_id = match lib {
            Some(lname) => Some(self.lib_add_member(lname, member, id)?),
            None => None,
        };
        self.objects.push(Object {
            name: member.to_string(),
            lib: lib_id,
            exports: Vec::new(),
            imports: Vec::new(),
            anchor: None,
            link_next: None,
        });
        self.current = Some(id);
        Ok(id)
    }

    fn lib_add_member(&mut self, lname: &str, member: &str, id: ObjId) -> Result<LibId> {
        let lib_id = match self.libs.iter().position(|l| l.name == lname) {
            Some(i) => LibId(i as u32),
            None => {
                self.libs.push(Library {
                    name: lname.to_string(),
                    members: Vec::new(),
                });
                LibId(self.libs.len() as u32 - 1)
            }
        };
        let lib = &mut self.libs[lib_id.0 as usize];
        if lib.members.iter().any(|&m| self.objects[m.0 as usize].name == member) {
            bail!("duplicate archive member '{lname}[{member}]'");
        }
        lib.members.push(id);
        Ok(lib_id)
    }

    /// Records a definition of `name` in the current object.
    pub fn add_export(&mut self, name: &str, type_code: char, weak: bool) -> Result<()> {
        let Some(obj) = self.current else {
            bail!("definition of '{name}' outside of any object");
        };
        let sym = self.intern_symbol(name, type_code);
        let x = XrefId(self.xrefs.len() as u32);
        self.xrefs.push(Xref { sym, obj, weak, next: None });
        self.obj_mut(obj).exports.push(x);
        Ok(())
    }

    /// Records a reference to `name` in the current object.
    pub fn add_import(&mut self, name: &str, type_code: char) -> Result<()> {
        let Some(obj) = self.current else {
            bail!("reference to '{name}' outside of any object");
        };
        let sym = self.intern_symbol(name, type_code);
        let x = XrefId(self.xrefs.len() as u32);
        self.xrefs.push(Xref { sym, obj, weak: false, next: None });
        self.obj_mut(obj).imports.push(x);
        Ok(())
    }

    /// Looks up or creates a symbol, applying the type merge policy:
    /// the first seen type is kept, `U` is upgraded by any definition,
    /// and disagreeing non-`U` types draw a warning.
    fn intern_symbol(&mut self, name: &str, type_code: char) -> SymId {
        if let Some(&id) = self.by_name.get(name) {
            let known = self.sym(id).type_code;
            if type_code != known {
                if known == 'U' {
                    self.sym_mut(id).type_code = type_code;
                } else if type_code != 'U' {
                    warn!(
                        "type mismatch between multiply defined symbols: \
                         '{name}' known as '{known}', is now '{type_code}'"
                    );
                }
            }
            return id;
        }
        let id = SymId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.to_string(),
            type_code,
            exported_by: None,
            imported_from: None,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Ends the listing being scanned: the current object, if any, gets
    /// its export fix-up and further symbols need a new object header.
    pub fn end_listing(&mut self) {
        if let Some(obj) = self.current.take() {
            self.fixup_exports(obj);
        }
    }

    /// Appends every export edge of `f` to the tail of its symbol's
    /// exported-by chain. Chain order across objects is ingest order.
    fn fixup_exports(&mut self, f: ObjId) {
        for ex in self.obj(f).exports.clone() {
            let sym = self.xref(ex).sym;
            match self.sym(sym).exported_by {
                None => self.sym_mut(sym).exported_by = Some(ex),
                Some(head) => {
                    let mut tail = head;
                    while let Some(next) = self.xref(tail).next {
                        tail = next;
                    }
                    self.xref_mut(tail).next = Some(ex);
                }
            }
        }
    }

    /// Finishes ingest: flushes the last object, gathers every symbol
    /// defined nowhere into the undefined pod's exports (in name order),
    /// and builds the lookup index.
    pub fn finish_ingest(&mut self) {
        self.end_listing();
        self.gather_dangling_undefs();
        self.build_index();
    }

    fn gather_dangling_undefs(&mut self) {
        let dangling: Vec<SymId> = self
            .by_name
            .values()
            .copied()
            .filter(|&s| self.sym(s).exported_by.is_none())
            .collect();
        for sym in dangling {
            let x = XrefId(self.xrefs.len() as u32);
            self.xrefs.push(Xref {
                sym,
                obj: UNDEF_POD,
                weak: false,
                next: None,
            });
            self.obj_mut(UNDEF_POD).exports.push(x);
        }
        self.fixup_exports(UNDEF_POD);
    }

    fn build_index(&mut self) {
        let mut index: Vec<ObjId> = self.real_objects().collect();
        index.sort_by(|&a, &b| {
            (&self.obj(a).name, self.lib_name(a)).cmp(&(&self.obj(b).name, self.lib_name(b)))
        });
        self.index = index;
    }

    fn lib_name(&self, f: ObjId) -> Option<&str> {
        self.obj(f).lib.map(|l| self.lib(l).name.as_str())
    }

    /// Finds objects by display name. A bare `member` or `[member]`
    /// query matches the member in any library (or standalone); a
    /// `lib[member]` query matches only that library. The result is the
    /// sorted range of matches; more than one match means the caller
    /// has to disambiguate.
    pub fn find_objects(&self, query: &str) -> Result<&[ObjId]> {
        let (lib, member) = split_display_name(query)?;
        let lib = lib.filter(|l| !l.is_empty());

        let start = self
            .index
            .partition_point(|&o| self.obj(o).name.as_str() < member);
        let mut end = start;
        while end < self.index.len() && self.obj(self.index[end]).name == member {
            end += 1;
        }
        let mut matches = &self.index[start..end];

        if let Some(lname) = lib {
            // Within a name range the entries are ordered by library,
            // standalone objects first.
            let s = matches.partition_point(|&o| match self.lib_name(o) {
                None => true,
                Some(n) => n < lname,
            });
            let e = s + matches[s..].partition_point(|&o| self.lib_name(o) == Some(lname));
            matches = &matches[s..e];
        }
        Ok(matches)
    }

    /// Verifies that every export and import edge points back at its
    /// owning object. Returns the number of corrupted edges.
    pub fn check_back_pointers(&self) -> usize {
        let mut errors = 0;
        for (i, obj) in self.objects.iter().enumerate() {
            for &x in obj.exports.iter().chain(obj.imports.iter()) {
                if self.xref(x).obj.0 as usize != i {
                    error!("{}: cross-reference back-pointer corrupted", obj.name);
                    errors += 1;
                }
            }
        }
        errors
    }
}
