// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File module: a sandboxed file system with a temporary and a persistent
// root, addressed by `file://` URIs.
//
// Every path is normalised lexically and must stay under one of the two
// roots. Failures reply with status IO_FAILURE and a `{code}` payload from
// the FileError table.

use std::fs::{self, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use shellgate_args::{KindSet, Object, Value};
use shellgate_core::{BridgeError, CallbackStatus, Result};
use shellgate_exec::{CommandHandler, Invocation, ModuleContext, Reply};
use tracing::{debug, info, instrument, warn};

const URI_SCHEME: &str = "file://";

const URI: [KindSet; 1] = [KindSet::STRING];
const URI_AND_TEXT: [KindSet; 2] = [KindSet::STRING, KindSet::STRING];
const URI_AND_SIZE: [KindSet; 2] = [KindSet::STRING, KindSet::INT64];
const REQUEST_SHAPE: [KindSet; 2] = [KindSet::INT32, KindSet::INT64];
const GET_SHAPE: [KindSet; 3] = [KindSet::STRING, KindSet::STRING, KindSet::OBJECT.union(KindSet::NULL)];
const WRITE_SHAPE: [KindSet; 3] = [KindSet::STRING, KindSet::STRING, KindSet::INT64];
const TRANSFER_SHAPE: [KindSet; 3] = [KindSet::STRING, KindSet::STRING, KindSet::STRING];

/// Error codes scripts compare against `FileError.*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorCode {
    NotFound = 1,
    Security = 2,
    Abort = 3,
    NotReadable = 4,
    Encoding = 5,
    NoModificationAllowed = 6,
    InvalidState = 7,
    Syntax = 8,
    InvalidModification = 9,
    QuotaExceeded = 10,
    TypeMismatch = 11,
    PathExists = 12,
}

impl FileErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an I/O error, using `fallback` for kinds with no closer code.
    fn from_io(err: &io::Error, fallback: FileErrorCode) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileErrorCode::NotFound,
            io::ErrorKind::AlreadyExists => FileErrorCode::PathExists,
            io::ErrorKind::PermissionDenied => FileErrorCode::NoModificationAllowed,
            _ => fallback,
        }
    }
}

type FsResult<T> = std::result::Result<T, FileErrorCode>;

fn fs_failure(code: FileErrorCode) -> Reply {
    Reply::failure(CallbackStatus::IoFailure, Object::new().with("code", code.code()))
}

// ---------------------------------------------------------------------------
// URIs and paths
// ---------------------------------------------------------------------------

pub(crate) fn path_to_uri(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let mut uri = String::with_capacity(URI_SCHEME.len() + text.len() + 1);
    uri.push_str(URI_SCHEME);
    if !text.starts_with('/') {
        uri.push('/');
    }
    percent_encode(&text, &mut uri);
    uri
}

/// Bytes that appear literally in a path URI. Everything else, `%` included,
/// is escaped so `uri_to_path` gives back the same path.
fn is_uri_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || b"/-._~!$&()*+,;=:@".contains(&byte)
}

fn percent_encode(text: &str, out: &mut String) {
    for &byte in text.as_bytes() {
        if is_uri_safe(byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
}

fn percent_decode(text: &str) -> FsResult<String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = text.get(i + 1..i + 3).ok_or(FileErrorCode::Encoding)?;
            out.push(u8::from_str_radix(hex, 16).map_err(|_| FileErrorCode::Encoding)?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| FileErrorCode::Encoding)
}

fn uri_to_path(uri: &str) -> FsResult<PathBuf> {
    let rest = uri.strip_prefix(URI_SCHEME).ok_or(FileErrorCode::Encoding)?;
    let decoded = percent_decode(rest)?;
    if decoded.contains('\0') || !decoded.starts_with('/') {
        return Err(FileErrorCode::Encoding);
    }
    Ok(PathBuf::from(decoded))
}

/// Resolve `.` and `..` without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => out.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
        }
    }
    out
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

fn modified_millis(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
        .unwrap_or_default()
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "txt" | "text" => "text/plain",
        "htm" | "html" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

fn copy_recursively(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_recursively(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Module
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsType {
    Temporary,
    Persistent,
}

impl FsType {
    fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(FsType::Temporary),
            1 => Some(FsType::Persistent),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FsType::Temporary => "temporary",
            FsType::Persistent => "persistent",
        }
    }
}

#[derive(Debug)]
struct Roots {
    temporary: PathBuf,
    persistent: PathBuf,
}

impl Roots {
    fn get(&self, kind: FsType) -> &Path {
        match kind {
            FsType::Temporary => &self.temporary,
            FsType::Persistent => &self.persistent,
        }
    }

    fn is_root(&self, path: &Path) -> bool {
        path == self.temporary || path == self.persistent
    }

    fn containing(&self, path: &Path) -> Option<&Path> {
        [&self.temporary, &self.persistent]
            .into_iter()
            .find(|root| path.starts_with(root))
            .map(PathBuf::as_path)
    }
}

pub struct Files {
    roots: OnceLock<Roots>,
}

impl Default for Files {
    fn default() -> Self {
        Self::new()
    }
}

impl Files {
    pub fn new() -> Self {
        Self { roots: OnceLock::new() }
    }

    fn roots(&self) -> Result<&Roots> {
        self.roots
            .get()
            .ok_or_else(|| BridgeError::Bridge("file system roots not initialised".into()))
    }

    fn entry(&self, roots: &Roots, path: &Path, is_dir: bool) -> Object {
        let name = if roots.is_root(path) {
            "/".to_string()
        } else {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Object::new()
            .with("isFile", !is_dir)
            .with("isDirectory", is_dir)
            .with("name", name)
            .with("fullPath", path_to_uri(path))
    }

    /// Normalise `path` and require it to lie under a root.
    fn confine(roots: &Roots, path: &Path) -> FsResult<PathBuf> {
        let path = normalize(path);
        if roots.containing(&path).is_none() {
            debug!(path = %path.display(), "path outside the sandbox");
            return Err(FileErrorCode::Security);
        }
        Ok(path)
    }

    fn resolve_uri(roots: &Roots, uri: &str) -> FsResult<PathBuf> {
        Self::confine(roots, &uri_to_path(uri)?)
    }

    /// Resolve a URI that must name an existing entry.
    fn existing(roots: &Roots, uri: &str) -> FsResult<(PathBuf, fs::Metadata)> {
        let path = Self::resolve_uri(roots, uri)?;
        let meta = fs::metadata(&path).map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::NotReadable))?;
        Ok((path, meta))
    }

    fn request_file_system(&self, roots: &Roots, kind: FsType) -> FsResult<Value> {
        let root = roots.get(kind);
        fs::create_dir_all(root).map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::InvalidState))?;
        Ok(Object::new()
            .with("name", kind.name())
            .with("root", self.entry(roots, root, true))
            .into())
    }

    fn resolve(&self, roots: &Roots, uri: &str) -> FsResult<Value> {
        let (path, meta) = Self::existing(roots, uri)?;
        Ok(self.entry(roots, &path, meta.is_dir()).into())
    }

    fn get_entry(
        &self,
        roots: &Roots,
        base: &str,
        target: &str,
        options: Option<&Object>,
        want_dir: bool,
    ) -> FsResult<Value> {
        let (base, _) = Self::existing(roots, base)?;
        let path = if target.starts_with(URI_SCHEME) {
            let path = Self::resolve_uri(roots, target)?;
            if roots.is_root(&path) {
                return Err(FileErrorCode::NoModificationAllowed);
            }
            path
        } else {
            if target.contains('\0') {
                return Err(FileErrorCode::Encoding);
            }
            let relative = target.replace('\\', "/");
            let joined = match relative.strip_prefix('/') {
                Some(from_root) => roots.containing(&base).unwrap_or(base.as_path()).join(from_root),
                None => base.join(&relative),
            };
            Self::confine(roots, &joined)?
        };

        let flag = |name: &str| {
            options
                .and_then(|o| o.find(name, KindSet::BOOL))
                .and_then(Value::as_bool)
                .unwrap_or(false)
        };
        let (create, exclusive) = (flag("create"), flag("exclusive"));

        match fs::metadata(&path) {
            Ok(meta) => {
                if create && exclusive {
                    return Err(FileErrorCode::PathExists);
                }
                if meta.is_dir() != want_dir {
                    return Err(FileErrorCode::TypeMismatch);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !create {
                    return Err(FileErrorCode::NotFound);
                }
                let created = if want_dir {
                    fs::create_dir(&path)
                } else {
                    OpenOptions::new().write(true).create_new(true).open(&path).map(drop)
                };
                created.map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::InvalidModification))?;
                debug!(path = %path.display(), dir = want_dir, "entry created");
            }
            Err(e) => return Err(FileErrorCode::from_io(&e, FileErrorCode::NotReadable)),
        }
        Ok(self.entry(roots, &path, want_dir).into())
    }

    fn read_entries(&self, roots: &Roots, uri: &str) -> FsResult<Value> {
        let (path, meta) = Self::existing(roots, uri)?;
        if !meta.is_dir() {
            return Err(FileErrorCode::TypeMismatch);
        }
        let mut children = Vec::new();
        let listing = fs::read_dir(&path).map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::NotReadable))?;
        for child in listing {
            let child = child.map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::NotReadable))?;
            let is_dir = child.file_type().map(|t| t.is_dir()).unwrap_or(false);
            children.push((child.path(), is_dir));
        }
        children.sort();
        Ok(Value::Array(
            children
                .iter()
                .map(|(child, is_dir)| Value::Object(self.entry(roots, child, *is_dir)))
                .collect(),
        ))
    }

    fn get_metadata(roots: &Roots, uri: &str) -> FsResult<Value> {
        let (_, meta) = Self::existing(roots, uri)?;
        Ok(Object::new()
            .with("modificationTime", modified_millis(&meta))
            .with("size", i64::try_from(meta.len()).unwrap_or(i64::MAX))
            .into())
    }

    fn get_file_metadata(roots: &Roots, uri: &str) -> FsResult<Value> {
        let (path, meta) = Self::existing(roots, uri)?;
        if meta.is_dir() {
            return Err(FileErrorCode::TypeMismatch);
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Object::new()
            .with("name", name)
            .with("fullPath", path_to_uri(&path))
            .with("type", mime_type(&path))
            .with("lastModifiedDate", modified_millis(&meta))
            .with("size", i64::try_from(meta.len()).unwrap_or(i64::MAX))
            .into())
    }

    fn get_parent(&self, roots: &Roots, uri: &str) -> FsResult<Value> {
        let (path, _) = Self::existing(roots, uri)?;
        let parent = if roots.is_root(&path) {
            path
        } else {
            path.parent().map(Path::to_path_buf).unwrap_or(path)
        };
        Ok(self.entry(roots, &parent, true).into())
    }

    fn remove(roots: &Roots, uri: &str, recursive: bool) -> FsResult<()> {
        let (path, meta) = Self::existing(roots, uri)?;
        if roots.is_root(&path) {
            return Err(FileErrorCode::NoModificationAllowed);
        }
        let removed = if meta.is_dir() {
            if recursive {
                fs::remove_dir_all(&path)
            } else {
                let empty = fs::read_dir(&path)
                    .map(|mut it| it.next().is_none())
                    .map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::NotReadable))?;
                if !empty {
                    return Err(FileErrorCode::InvalidModification);
                }
                fs::remove_dir(&path)
            }
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::InvalidModification))?;
        info!(path = %path.display(), recursive, "entry removed");
        Ok(())
    }

    fn read_as_text(roots: &Roots, uri: &str, encoding: &str) -> FsResult<String> {
        let (path, meta) = Self::existing(roots, uri)?;
        if meta.is_dir() {
            return Err(FileErrorCode::TypeMismatch);
        }
        if !encoding.eq_ignore_ascii_case("UTF-8") {
            return Err(FileErrorCode::Abort);
        }
        let bytes = fs::read(&path).map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::NotReadable))?;
        String::from_utf8(bytes).map_err(|_| FileErrorCode::Encoding)
    }

    fn write(roots: &Roots, uri: &str, data: &str, position: i64) -> FsResult<i64> {
        let path = Self::resolve_uri(roots, uri)?;
        if path.is_dir() {
            return Err(FileErrorCode::TypeMismatch);
        }
        let position = u64::try_from(position).map_err(|_| FileErrorCode::InvalidModification)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::InvalidModification))?;
        file.seek(SeekFrom::Start(position))
            .map_err(|_| FileErrorCode::InvalidModification)?;
        file.write_all(data.as_bytes()).map_err(|_| FileErrorCode::Abort)?;
        debug!(path = %path.display(), position, bytes = data.len(), "file written");
        Ok(i64::try_from(data.len()).unwrap_or(i64::MAX))
    }

    fn truncate(roots: &Roots, uri: &str, size: i64) -> FsResult<i64> {
        let (path, meta) = Self::existing(roots, uri)?;
        if meta.is_dir() {
            return Err(FileErrorCode::TypeMismatch);
        }
        let len = u64::try_from(size).map_err(|_| FileErrorCode::InvalidModification)?;
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::InvalidModification))?;
        file.set_len(len).map_err(|_| FileErrorCode::InvalidModification)?;
        Ok(size)
    }

    #[instrument(skip(self, roots))]
    fn transfer(&self, roots: &Roots, src: &str, parent: &str, name: &str, is_move: bool) -> FsResult<Value> {
        let (src, src_meta) = Self::existing(roots, src)?;
        if roots.is_root(&src) {
            return Err(FileErrorCode::NoModificationAllowed);
        }
        let (parent, parent_meta) = Self::existing(roots, parent)?;
        if !parent_meta.is_dir() {
            return Err(FileErrorCode::TypeMismatch);
        }
        if !valid_name(name) {
            return Err(FileErrorCode::Encoding);
        }
        let dest = Self::confine(roots, &parent.join(name))?;
        let src_is_dir = src_meta.is_dir();

        // A directory cannot land on itself or inside itself.
        if dest == src || (src_is_dir && dest.starts_with(&src)) {
            return Err(FileErrorCode::InvalidModification);
        }

        if let Ok(dest_meta) = fs::metadata(&dest) {
            let dest_empty_dir = dest_meta.is_dir()
                && fs::read_dir(&dest)
                    .map(|mut it| it.next().is_none())
                    .unwrap_or(false);
            match (src_is_dir, dest_meta.is_dir()) {
                (false, true) | (true, false) => return Err(FileErrorCode::InvalidModification),
                (true, true) if !dest_empty_dir => return Err(FileErrorCode::InvalidModification),
                (true, true) => {
                    fs::remove_dir(&dest).map_err(|_| FileErrorCode::InvalidModification)?;
                }
                (false, false) => {}
            }
        }

        let done = match (is_move, src_is_dir) {
            (true, _) => fs::rename(&src, &dest),
            (false, true) => copy_recursively(&src, &dest),
            (false, false) => fs::copy(&src, &dest).map(drop),
        };
        done.map_err(|e| FileErrorCode::from_io(&e, FileErrorCode::InvalidModification))?;
        info!(from = %src.display(), to = %dest.display(), "entry transferred");
        Ok(self.entry(roots, &dest, src_is_dir).into())
    }
}

impl CommandHandler for Files {
    fn on_register(&self, ctx: &ModuleContext) -> Result<()> {
        let base = ctx.data_dir.join("fs");
        let make = |name: &str| -> Result<PathBuf> {
            let root = base.join(name);
            fs::create_dir_all(&root)
                .map_err(|e| BridgeError::FileSystem(format!("create {}: {e}", root.display())))?;
            Ok(fs::canonicalize(&root)?)
        };
        let roots = Roots {
            temporary: make("temporary")?,
            persistent: make("persistent")?,
        };
        info!(temporary = %roots.temporary.display(), persistent = %roots.persistent.display(), "file system roots ready");
        let _ = self.roots.set(roots);
        Ok(())
    }

    fn execute(&self, invocation: Invocation<'_>) -> Result<Reply> {
        let roots = self.roots()?;
        let result: FsResult<Reply> = match invocation.action {
            "requestFileSystem" => {
                let args = invocation.args(&REQUEST_SHAPE)?;
                let code = args.int32(0)?;
                let kind = FsType::from_code(code)
                    .ok_or_else(|| BridgeError::InvalidArgument(format!("unknown file system type {code}")))?;
                if args.int64(1)? < 0 {
                    return Err(BridgeError::InvalidArgument("negative file system size".into()));
                }
                self.request_file_system(roots, kind).map(Reply::success)
            }
            "resolveLocalFileSystemURI" => {
                let args = invocation.args(&URI)?;
                self.resolve(roots, args.string(0)?).map(Reply::success)
            }
            "getFile" | "getDirectory" => {
                let args = invocation.args(&GET_SHAPE)?;
                let want_dir = invocation.action == "getDirectory";
                self.get_entry(roots, args.string(0)?, args.string(1)?, args.optional_object(2)?, want_dir)
                    .map(Reply::success)
            }
            "readEntries" => {
                let args = invocation.args(&URI)?;
                self.read_entries(roots, args.string(0)?).map(Reply::success)
            }
            "getMetadata" => {
                let args = invocation.args(&URI)?;
                Self::get_metadata(roots, args.string(0)?).map(Reply::success)
            }
            "getFileMetadata" => {
                let args = invocation.args(&URI)?;
                Self::get_file_metadata(roots, args.string(0)?).map(Reply::success)
            }
            "getParent" => {
                let args = invocation.args(&URI)?;
                self.get_parent(roots, args.string(0)?).map(Reply::success)
            }
            "remove" | "removeRecursively" => {
                let args = invocation.args(&URI)?;
                let recursive = invocation.action == "removeRecursively";
                Self::remove(roots, args.string(0)?, recursive).map(|()| Reply::no_result())
            }
            "readAsText" => {
                let args = invocation.args(&URI_AND_TEXT)?;
                Self::read_as_text(roots, args.string(0)?, args.string(1)?).map(Reply::success)
            }
            "write" => {
                let args = invocation.args(&WRITE_SHAPE)?;
                Self::write(roots, args.string(0)?, args.string(1)?, args.int64(2)?).map(Reply::success)
            }
            "truncate" => {
                let args = invocation.args(&URI_AND_SIZE)?;
                Self::truncate(roots, args.string(0)?, args.int64(1)?).map(Reply::success)
            }
            "moveTo" | "copyTo" => {
                let args = invocation.args(&TRANSFER_SHAPE)?;
                let is_move = invocation.action == "moveTo";
                self.transfer(roots, args.string(0)?, args.string(1)?, args.string(2)?, is_move)
                    .map(Reply::success)
            }
            _ => return Err(invocation.invalid_action()),
        };

        Ok(result.unwrap_or_else(|code| {
            debug!(action = invocation.action, ?code, "file operation failed");
            fs_failure(code)
        }))
    }

    /// The temporary file system does not outlive the process.
    fn on_shutdown(&self) -> Result<()> {
        let Some(roots) = self.roots.get() else {
            return Ok(());
        };
        match fs::remove_dir_all(&roots.temporary) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = %e, "temporary file system not cleared");
                return Err(BridgeError::FileSystem(format!("clear {}: {e}", roots.temporary.display())));
            }
        }
        fs::create_dir_all(&roots.temporary)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use shellgate_exec::DispatchOutcome;

    use super::*;
    use crate::testing::{Harness, is_error, payload};

    fn harness() -> Harness {
        let mut h = Harness::new();
        h.registry.register("File", Files::new()).expect("register");
        h
    }

    fn call(h: &mut Harness, action: &str, args: &str) -> String {
        h.reply("File", "f", action, args)
    }

    fn ok(h: &mut Harness, action: &str, args: &str) -> Value {
        let statement = call(h, action, args);
        assert!(!is_error(&statement, "f"), "{action} {args}: {statement}");
        payload(&statement)
    }

    fn code(h: &mut Harness, action: &str, args: &str) -> i64 {
        let statement = call(h, action, args);
        assert!(is_error(&statement, "f"), "{action} {args}: {statement}");
        assert!(statement.contains("callbackStatus.IO_FAILURE"));
        payload(&statement)
            .as_object()
            .and_then(|o| o.get("code"))
            .and_then(Value::as_i64)
            .expect("code")
    }

    fn field(value: &Value, name: &str) -> String {
        let field = value.as_object().and_then(|o| o.get(name)).expect(name);
        field.as_str().map(str::to_string).unwrap_or_else(|| field.to_string())
    }

    /// Root URI of the persistent file system.
    fn persistent(h: &mut Harness) -> String {
        let fs = ok(h, "requestFileSystem", "[1,0]");
        assert_eq!(field(&fs, "name"), "persistent");
        let root = fs.as_object().and_then(|o| o.get("root")).expect("root").clone();
        assert_eq!(field(&root, "name"), "/");
        field(&root, "fullPath")
    }

    #[test]
    fn uri_round_trip() {
        let path = Path::new("/data/fs/persistent/a b.txt");
        assert_eq!(path_to_uri(path), "file:///data/fs/persistent/a%20b.txt");
        assert_eq!(uri_to_path("file:///data/x%20y").expect("decode"), PathBuf::from("/data/x y"));
        for name in ["50%off.txt", "a%41.txt", "caf\u{e9} #1?.txt", "quote\"d"] {
            let path = Path::new("/data/fs/persistent").join(name);
            let uri = path_to_uri(&path);
            assert!(!uri.contains(['"', ' ', '#', '?']), "{uri}");
            assert_eq!(uri_to_path(&uri).expect("decode"), path, "{uri}");
        }
        assert_eq!(uri_to_path("http://x"), Err(FileErrorCode::Encoding));
        assert_eq!(uri_to_path("file:///bad%zz"), Err(FileErrorCode::Encoding));
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    }

    #[test]
    fn create_write_read_truncate() {
        let mut h = harness();
        let root = persistent(&mut h);

        let entry = ok(&mut h, "getFile", &format!("[\"{root}\",\"notes.txt\",{{\"create\":true}}]"));
        assert_eq!(field(&entry, "isFile"), "true");
        let uri = field(&entry, "fullPath");
        assert!(uri.ends_with("/notes.txt"));

        assert_eq!(ok(&mut h, "write", &format!("[\"{uri}\",\"hello world\",0]")).as_i64(), Some(11));
        assert_eq!(ok(&mut h, "write", &format!("[\"{uri}\",\"W\",6]")).as_i64(), Some(1));
        assert_eq!(ok(&mut h, "readAsText", &format!("[\"{uri}\",\"utf-8\"]")).as_str(), Some("hello World"));
        assert_eq!(code(&mut h, "readAsText", &format!("[\"{uri}\",\"latin1\"]")), 3);

        assert_eq!(ok(&mut h, "truncate", &format!("[\"{uri}\",5]")).as_i64(), Some(5));
        let meta = ok(&mut h, "getFileMetadata", &format!("[\"{uri}\"]"));
        assert_eq!(field(&meta, "size"), "5");
        assert_eq!(field(&meta, "type"), "text/plain");
        assert_eq!(field(&meta, "name"), "notes.txt");
        let meta = ok(&mut h, "getMetadata", &format!("[\"{uri}\"]"));
        assert!(meta.as_object().and_then(|o| o.get("modificationTime")).is_some());
    }

    #[test]
    fn get_honours_create_and_exclusive() {
        let mut h = harness();
        let root = persistent(&mut h);

        assert_eq!(code(&mut h, "getDirectory", &format!("[\"{root}\",\"docs\",null]")), 1);
        let dir = ok(&mut h, "getDirectory", &format!("[\"{root}\",\"docs\",{{\"create\":true}}]"));
        assert_eq!(field(&dir, "isDirectory"), "true");
        ok(&mut h, "getDirectory", &format!("[\"{root}\",\"docs\",{{\"create\":true}}]"));
        assert_eq!(
            code(&mut h, "getDirectory", &format!("[\"{root}\",\"docs\",{{\"create\":true,\"exclusive\":true}}]")),
            12
        );
        assert_eq!(code(&mut h, "getFile", &format!("[\"{root}\",\"docs\",null]")), 11);
        assert_eq!(code(&mut h, "getDirectory", &format!("[\"{root}\",\"{root}\",null]")), 6);
    }

    #[test]
    fn escaping_the_sandbox_is_a_security_error() {
        let mut h = harness();
        let root = persistent(&mut h);
        assert_eq!(code(&mut h, "getFile", &format!("[\"{root}\",\"../../../etc/passwd\",null]")), 2);
        assert_eq!(code(&mut h, "resolveLocalFileSystemURI", "[\"file:///etc/passwd\"]"), 2);
        assert_eq!(code(&mut h, "resolveLocalFileSystemURI", "[\"/etc/passwd\"]"), 5);
    }

    #[test]
    fn names_with_percent_resolve_to_themselves() {
        let mut h = harness();
        let root = persistent(&mut h);
        for name in ["50%off.txt", "a%41.txt"] {
            let entry = ok(&mut h, "getFile", &format!("[\"{root}\",\"{name}\",{{\"create\":true}}]"));
            let uri = field(&entry, "fullPath");
            assert!(uri.contains("%25"), "{uri}");

            let resolved = ok(&mut h, "resolveLocalFileSystemURI", &format!("[\"{uri}\"]"));
            assert_eq!(field(&resolved, "name"), name);
            assert_eq!(field(&resolved, "fullPath"), uri);
        }
        assert_eq!(code(&mut h, "resolveLocalFileSystemURI", &format!("[\"{root}/aA.txt\"]")), 1);
    }

    #[test]
    fn remove_rules() {
        let mut h = harness();
        let root = persistent(&mut h);
        assert_eq!(code(&mut h, "remove", &format!("[\"{root}\"]")), 6);

        let dir = ok(&mut h, "getDirectory", &format!("[\"{root}\",\"d\",{{\"create\":true}}]"));
        let dir_uri = field(&dir, "fullPath");
        ok(&mut h, "getFile", &format!("[\"{dir_uri}\",\"inner.txt\",{{\"create\":true}}]"));
        assert_eq!(code(&mut h, "remove", &format!("[\"{dir_uri}\"]")), 9);

        let statement = call(&mut h, "removeRecursively", &format!("[\"{dir_uri}\"]"));
        assert!(statement.contains("NO_RESULT"));
        assert_eq!(code(&mut h, "resolveLocalFileSystemURI", &format!("[\"{dir_uri}\"]")), 1);
    }

    #[test]
    fn listing_and_parents() {
        let mut h = harness();
        let root = persistent(&mut h);
        ok(&mut h, "getFile", &format!("[\"{root}\",\"b.txt\",{{\"create\":true}}]"));
        let dir = ok(&mut h, "getDirectory", &format!("[\"{root}\",\"a\",{{\"create\":true}}]"));

        let listing = ok(&mut h, "readEntries", &format!("[\"{root}\"]"));
        let names: Vec<String> = listing
            .as_array()
            .expect("array")
            .iter()
            .map(|e| field(e, "name"))
            .collect();
        assert_eq!(names, ["a", "b.txt"]);

        let parent = ok(&mut h, "getParent", &format!("[\"{}\"]", field(&dir, "fullPath")));
        assert_eq!(field(&parent, "fullPath"), root);
        let parent = ok(&mut h, "getParent", &format!("[\"{root}\"]"));
        assert_eq!(field(&parent, "fullPath"), root);
    }

    #[test]
    fn move_and_copy_rules() {
        let mut h = harness();
        let root = persistent(&mut h);
        let file = ok(&mut h, "getFile", &format!("[\"{root}\",\"f.txt\",{{\"create\":true}}]"));
        let file_uri = field(&file, "fullPath");
        ok(&mut h, "write", &format!("[\"{file_uri}\",\"data\",0]"));
        let dir = ok(&mut h, "getDirectory", &format!("[\"{root}\",\"d\",{{\"create\":true}}]"));
        let dir_uri = field(&dir, "fullPath");

        assert_eq!(code(&mut h, "moveTo", &format!("[\"{root}\",\"{dir_uri}\",\"x\"]")), 6);
        assert_eq!(code(&mut h, "moveTo", &format!("[\"{dir_uri}\",\"{file_uri}\",\"x\"]")), 11);
        assert_eq!(code(&mut h, "copyTo", &format!("[\"{file_uri}\",\"{root}\",\"f.txt\"]")), 9);
        assert_eq!(code(&mut h, "copyTo", &format!("[\"{file_uri}\",\"{root}\",\"d\"]")), 9);
        assert_eq!(code(&mut h, "moveTo", &format!("[\"{dir_uri}\",\"{dir_uri}\",\"inside\"]")), 9);

        let copy = ok(&mut h, "copyTo", &format!("[\"{file_uri}\",\"{dir_uri}\",\"g.txt\"]"));
        assert_eq!(
            ok(&mut h, "readAsText", &format!("[\"{}\",\"UTF-8\"]", field(&copy, "fullPath"))).as_str(),
            Some("data")
        );

        // A directory may replace an empty directory.
        ok(&mut h, "getDirectory", &format!("[\"{root}\",\"empty\",{{\"create\":true}}]"));
        let moved = ok(&mut h, "moveTo", &format!("[\"{dir_uri}\",\"{root}\",\"empty\"]"));
        assert_eq!(field(&moved, "isDirectory"), "true");
        assert_eq!(code(&mut h, "resolveLocalFileSystemURI", &format!("[\"{dir_uri}\"]")), 1);
        ok(&mut h, "resolveLocalFileSystemURI", &format!("[\"{}/g.txt\"]", field(&moved, "fullPath")));
    }

    #[test]
    fn bad_arguments_are_rejected_before_touching_disk() {
        let h = harness();
        assert!(matches!(
            h.call("File", "f", "requestFileSystem", "[7,0]"),
            DispatchOutcome::Rejected { status: CallbackStatus::MalformedArguments, .. }
        ));
        assert!(matches!(
            h.call("File", "f", "write", "[\"file:///x\",\"d\"]"),
            DispatchOutcome::Rejected { status: CallbackStatus::MalformedArguments, .. }
        ));
    }

    #[test]
    fn shutdown_clears_the_temporary_file_system() {
        let mut h = harness();
        let fs = ok(&mut h, "requestFileSystem", "[0,1024]");
        let root = fs.as_object().and_then(|o| o.get("root")).expect("root").clone();
        let root_uri = field(&root, "fullPath");
        let file = ok(&mut h, "getFile", &format!("[\"{root_uri}\",\"scratch\",{{\"create\":true}}]"));
        let path = uri_to_path(&field(&file, "fullPath")).expect("path");
        assert!(path.exists());

        assert!(h.registry.shutdown().is_clean());
        assert!(!path.exists());
        assert!(uri_to_path(&root_uri).expect("root").is_dir());
    }
}
