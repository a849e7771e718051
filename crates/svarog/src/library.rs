//! Source libraries: named, ordered collections of definitions.
//!
//! Every parsed tree is tagged with an owning library. Registration order
//! establishes priority for liblist resolution; the default library is a
//! sentinel that sorts last unless explicitly listed. The default library is
//! threaded through the compilation rather than being process-global.

use crate::{
    intern::{Interner, NameId},
    source::SourceRange,
};

use indexmap::IndexMap;

/// Handle to a registered library.
///
/// Identity is by registration: two libraries registered under equal names
/// are distinct objects with distinct ids (the registry refuses the second
/// registration instead, but the id type itself carries no name semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct LibraryId(u32);

impl LibraryId {
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Priority given to the default library so that it sorts after every
/// explicitly registered library.
const DEFAULT_LIBRARY_PRIORITY: u32 = u32::MAX;

#[derive(Debug)]
pub struct SourceLibrary {
    pub name: NameId,
    /// Lower sorts earlier in the global search order.
    pub priority: u32,
    pub is_default: bool,
}

/// The ordered library registry.
///
/// Index 0 is always the default library ("work"). User libraries get
/// ascending priorities in registration order.
#[derive(Debug)]
pub struct LibraryRegistry {
    libraries: Vec<SourceLibrary>,
    by_name: IndexMap<NameId, LibraryId>,
}

/// Id of the default library; created by `LibraryRegistry::new`.
pub const DEFAULT_LIB: LibraryId = LibraryId(0);

impl LibraryRegistry {
    pub fn new(interner: &mut Interner) -> Self {
        let name = interner.intern("work");
        let mut registry = Self {
            libraries: vec![SourceLibrary {
                name,
                priority: DEFAULT_LIBRARY_PRIORITY,
                is_default: true,
            }],
            by_name: IndexMap::default(),
        };
        registry.by_name.insert(name, DEFAULT_LIB);
        registry
    }

    /// Registers a library, or returns the existing id for a repeated name.
    pub fn register(&mut self, name: NameId) -> LibraryId {
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let id = LibraryId(u32::try_from(self.libraries.len()).expect("library count overflow"));
        // Priorities count registrations, skipping the default sentinel.
        let priority = u32::try_from(self.libraries.len() - 1).expect("library count overflow");
        self.libraries.push(SourceLibrary {
            name,
            priority,
            is_default: false,
        });
        self.by_name.insert(name, id);
        id
    }

    #[must_use]
    pub fn lookup(&self, name: NameId) -> Option<LibraryId> {
        self.by_name.get(&name).copied()
    }

    #[must_use]
    pub fn get(&self, id: LibraryId) -> &SourceLibrary {
        &self.libraries[id.index()]
    }

    /// All libraries in ascending priority order, default last.
    #[must_use]
    pub fn search_order(&self) -> Vec<LibraryId> {
        let mut ids: Vec<LibraryId> = (0..self.libraries.len())
            .map(|i| LibraryId(u32::try_from(i).expect("library count overflow")))
            .collect();
        ids.sort_by_key(|id| self.get(*id).priority);
        ids
    }

    /// Reorders priorities to match an explicit `-L lib1,lib2,...` list.
    ///
    /// Named libraries get priorities 0..n in list order; unlisted libraries
    /// keep relative order after them; the default stays last unless listed.
    pub fn set_search_order(&mut self, order: &[LibraryId]) {
        for lib in &mut self.libraries {
            if !lib.is_default {
                lib.priority += u32::try_from(order.len()).expect("library count overflow");
            }
        }
        for (position, id) in order.iter().enumerate() {
            let lib = &mut self.libraries[id.index()];
            lib.priority = u32::try_from(position).expect("library count overflow");
            // An explicitly listed default library participates normally.
            if lib.is_default {
                lib.is_default = false;
            }
        }
    }
}

/// One `library` declaration from a library map file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibMapEntry {
    pub name: String,
    pub patterns: Vec<String>,
    pub range: SourceRange,
}

/// Parses a library map file: `library <name> <pattern>[, <pattern>...];`
/// lines with `//` and `/* */` comments.
///
/// Glob *matching* is the driver's concern; this only extracts declarations
/// in file order (which defines registration order, hence priority).
pub fn parse_libmap(text: &str) -> Result<Vec<LibMapEntry>, String> {
    let stripped = strip_comments(text);
    let mut entries = Vec::new();
    let mut offset = 0usize;
    loop {
        let rest = &stripped[offset..];
        let Some(semi) = rest.find(';') else {
            if !rest.trim().is_empty() {
                return Err(format!("trailing text without `;`: `{}`", rest.trim()));
            }
            break;
        };
        let stmt = &rest[..semi];
        let stmt_start = offset;
        offset += semi + 1;
        let tokens: Vec<&str> = stmt.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens[0] != "library" || tokens.len() < 3 {
            return Err(format!("malformed library declaration: `{}`", stmt.trim()));
        }
        let name = tokens[1].to_owned();
        let patterns = tokens[2..]
            .join(" ")
            .split(',')
            .map(|p| p.trim().trim_matches('"').to_owned())
            .filter(|p| !p.is_empty())
            .collect();
        entries.push(LibMapEntry {
            name,
            patterns,
            range: SourceRange::new(stmt_start, stmt_start + semi),
        });
    }
    Ok(entries)
}

/// Replaces comments with spaces so offsets stay aligned with the input.
fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
            while i < bytes.len() && bytes[i] != b'\n' {
                out.push(b' ');
                i += 1;
            }
        } else if bytes[i] == b'/' && i + 1 < bytes.len() && bytes[i + 1] == b'*' {
            let mut depth_done = false;
            while i < bytes.len() {
                if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                    out.push(b' ');
                    out.push(b' ');
                    i += 2;
                    depth_done = true;
                    break;
                }
                out.push(if bytes[i] == b'\n' { b'\n' } else { b' ' });
                i += 1;
            }
            if !depth_done {
                break;
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).expect("comment stripping preserves utf8 structure")
}
