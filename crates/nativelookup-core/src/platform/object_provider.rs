//! # Object-File Debug-Info Provider
//!
//! A [`DebugInfoProvider`] that reads symbols straight from object files with
//! `object` and `gimli`, for hosts without a system symbol handler.
//!
//! ## Load Order
//!
//! 1. The module image itself, if it carries a symbol table or DWARF
//! 2. Each `cache*` store: `<store>/<file>/<SIGNATURE>/<file>.debug`
//! 3. The system build-id store: `/usr/lib/debug/.build-id/ab/cdef....debug`
//! 4. Each `srv*` store that is a local directory or `file://` URL, using the
//!    same layout as `cache*`; a hit is copied into the first `cache*` store
//! 5. Bare directories: `<dir>/<file>.debug`, then the store layout
//!
//! A detached debug file is only accepted if its build signature matches the
//! image's. `http(s)` servers are reported through the diagnostic event and
//! skipped; this provider has no network transport.
//!
//! An empty search path limits loading to step 1.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::OsError;
use crate::host::{DebugInfoProvider, EventSink, ModuleDebugInfo, ProviderEvent, ProviderSymbol, SymbolSource};
use crate::platform::image::ObjectImage;
use crate::symbols::SearchPathEntry;
use crate::types::{Address, ModuleInfo};

const SYSTEM_BUILD_ID_DIR: &str = "/usr/lib/debug/.build-id";

/// Debug-info provider backed by `object` and `gimli`
pub struct ObjectDebugInfoProvider
{
    sessions: HashMap<Address, Session>,
    build_id_dir: Option<PathBuf>,
}

struct Session
{
    search_path: Vec<SearchPathEntry>,
    sink: Option<EventSink>,
    loaded: Option<LoadedModule>,
}

struct LoadedModule
{
    base: Address,
    image: ObjectImage,
    debug_file: Option<ObjectImage>,
}

impl LoadedModule
{
    fn symbols(&self) -> Option<&ObjectImage>
    {
        if self.image.is_full() {
            Some(&self.image)
        } else {
            self.debug_file.as_ref()
        }
    }

    fn source(&self) -> SymbolSource
    {
        if self.symbols().is_some() {
            SymbolSource::Full
        } else if self.image.has_exports() {
            SymbolSource::Exports
        } else {
            SymbolSource::None
        }
    }
}

impl ObjectDebugInfoProvider
{
    pub fn new() -> Self
    {
        Self {
            sessions: HashMap::new(),
            build_id_dir: Some(PathBuf::from(SYSTEM_BUILD_ID_DIR)),
        }
    }

    /// Use `dir` instead of the system build-id store (`None` disables it).
    #[must_use]
    pub fn with_build_id_dir(mut self, dir: Option<PathBuf>) -> Self
    {
        self.build_id_dir = dir;
        self
    }

    fn session(&mut self, base: Address) -> Result<&mut Session, OsError>
    {
        self.sessions
            .get_mut(&base)
            .ok_or_else(|| OsError::with_message(libc::EINVAL, format!("no session for {base}")))
    }
}

impl Default for ObjectDebugInfoProvider
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl DebugInfoProvider for ObjectDebugInfoProvider
{
    fn initialize(&mut self, base: Address, search_path: &str) -> Result<(), OsError>
    {
        self.sessions.insert(
            base,
            Session {
                search_path: SearchPathEntry::parse_list(search_path),
                sink: None,
                loaded: None,
            },
        );
        Ok(())
    }

    fn cleanup(&mut self, base: Address)
    {
        self.sessions.remove(&base);
    }

    fn register_callback(&mut self, base: Address, sink: EventSink) -> Result<(), OsError>
    {
        self.session(base)?.sink = Some(sink);
        Ok(())
    }

    fn load_debug_info(&mut self, base: Address, module: &ModuleInfo) -> Result<Address, OsError>
    {
        let build_id_dir = self.build_id_dir.clone();
        let session = self.session(base)?;
        session.emit(ProviderEvent::LoadStarted);

        let image = match ObjectImage::open(module.path()) {
            Ok(image) => image,
            Err(err) => {
                session.emit(ProviderEvent::Diagnostic(&format!("cannot read image: {err}")));
                session.emit(ProviderEvent::LoadFailed);
                return Err(err);
            }
        };

        let debug_file = if image.is_full() || session.search_path.is_empty() {
            None
        } else {
            session.find_debug_file(module, &image, build_id_dir.as_deref())
        };

        let loaded = LoadedModule {
            base,
            image,
            debug_file,
        };
        let event = if loaded.source() == SymbolSource::Full {
            ProviderEvent::LoadSucceeded
        } else {
            ProviderEvent::LoadFailed
        };
        session.emit(event);
        session.loaded = Some(loaded);
        Ok(base)
    }

    fn query_module_info(&mut self, base: Address) -> Result<ModuleDebugInfo, OsError>
    {
        let loaded = self
            .session(base)?
            .loaded
            .as_ref()
            .ok_or_else(|| OsError::with_message(libc::EINVAL, "no module loaded"))?;

        Ok(ModuleDebugInfo {
            signature: loaded.image.signature(),
            source: loaded.source(),
            symbol_file: loaded.symbols().map(|symbols| symbols.path().to_path_buf()),
        })
    }

    fn enumerate_symbols(
        &mut self,
        base: Address,
        filter: &str,
        visitor: &mut dyn FnMut(&ProviderSymbol<'_>) -> bool,
    ) -> Result<(), OsError>
    {
        let loaded = self
            .session(base)?
            .loaded
            .as_ref()
            .ok_or_else(|| OsError::with_message(libc::EINVAL, "no module loaded"))?;
        let symbols = loaded
            .symbols()
            .ok_or_else(|| OsError::with_message(libc::ENOENT, "no symbol information loaded"))?;

        let file_base = loaded.image.file_base();
        symbols.visit_symbols(&mut |kind, name, address| {
            if !wildcard_match(filter, name) {
                return true;
            }
            let offset = address.wrapping_sub(file_base) as i64;
            visitor(&ProviderSymbol {
                kind,
                name,
                address: loaded.base.with_offset(offset),
            })
        })
    }
}

impl Session
{
    fn emit(&mut self, event: ProviderEvent<'_>)
    {
        if let Some(sink) = self.sink.as_mut() {
            sink(event);
        }
    }

    fn find_debug_file(
        &mut self,
        module: &ModuleInfo,
        image: &ObjectImage,
        build_id_dir: Option<&Path>,
    ) -> Option<ObjectImage>
    {
        let Some(signature) = image.signature() else {
            self.emit(ProviderEvent::Diagnostic("image has no build signature, skipping symbol stores"));
            return None;
        };
        let file_name = module.name.as_str();
        let relative = store_relative_path(file_name, &signature.to_string());

        let stores: Vec<PathBuf> = self
            .search_path
            .iter()
            .filter_map(|entry| match entry {
                SearchPathEntry::Cache(dir) => Some(dir.clone()),
                _ => None,
            })
            .collect();
        for store in &stores {
            if let Some(found) = self.try_candidate(&store.join(&relative), image) {
                return Some(found);
            }
        }

        if let (Some(dir), Some(build_id)) = (build_id_dir, image.build_id()) {
            if build_id.len() > 1 {
                let hex: String = build_id.iter().map(|byte| format!("{byte:02x}")).collect();
                let candidate = dir.join(&hex[..2]).join(format!("{}.debug", &hex[2..]));
                if let Some(found) = self.try_candidate(&candidate, image) {
                    return Some(found);
                }
            }
        }

        let remaining = self.search_path.clone();
        for entry in remaining {
            match entry {
                SearchPathEntry::Cache(_) => {}
                SearchPathEntry::Server(server) => {
                    let Some(root) = local_server_root(&server) else {
                        self.emit(ProviderEvent::Diagnostic(&format!("no transport for symbol server {server}")));
                        continue;
                    };
                    let candidate = root.join(&relative);
                    if let Some(found) = self.try_candidate(&candidate, image) {
                        if let Some(store) = stores.first() {
                            self.copy_downstream(&candidate, &store.join(&relative));
                        }
                        return Some(found);
                    }
                }
                SearchPathEntry::Directory(dir) => {
                    for candidate in [dir.join(format!("{file_name}.debug")), dir.join(&relative)] {
                        if let Some(found) = self.try_candidate(&candidate, image) {
                            return Some(found);
                        }
                    }
                }
            }
        }
        None
    }

    fn try_candidate(&mut self, candidate: &Path, image: &ObjectImage) -> Option<ObjectImage>
    {
        if !candidate.is_file() {
            self.emit(ProviderEvent::Diagnostic(&format!("not found: {}", candidate.display())));
            return None;
        }
        match ObjectImage::open(candidate) {
            Ok(debug) if debug.signature() == image.signature() && debug.is_full() => {
                self.emit(ProviderEvent::Diagnostic(&format!("using {}", candidate.display())));
                Some(debug)
            }
            Ok(_) => {
                self.emit(ProviderEvent::Diagnostic(&format!("mismatched debug file {}", candidate.display())));
                None
            }
            Err(err) => {
                self.emit(ProviderEvent::Diagnostic(&format!("unreadable debug file: {err}")));
                None
            }
        }
    }

    fn copy_downstream(&mut self, from: &Path, to: &Path)
    {
        let result = to
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| fs::copy(from, to).map(drop));
        let message = match result {
            Ok(()) => format!("copied {} to {}", from.display(), to.display()),
            Err(err) => format!("could not copy {} downstream: {err}", from.display()),
        };
        self.emit(ProviderEvent::Diagnostic(&message));
    }
}

/// `<file>/<SIGNATURE>/<file>.debug`
fn store_relative_path(file_name: &str, signature: &str) -> PathBuf
{
    Path::new(file_name).join(signature).join(format!("{file_name}.debug"))
}

/// Local directory behind a `srv*` entry, if it is not a network URL.
fn local_server_root(server: &str) -> Option<PathBuf>
{
    if let Some(path) = server.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if server.contains("://") {
        return None;
    }
    Some(PathBuf::from(server))
}

/// Glob match supporting `*` (any run) and `?` (any one character).
pub(crate) fn wildcard_match(pattern: &str, text: &str) -> bool
{
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}
