//! The API key and where it lives.

use std::fmt::{self, Debug};
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// The key under which the credential is stored.
pub const CREDENTIAL_KEY: &str = "gemini_api_key";

/// Errors from saving a credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The value is empty or whitespace-only.
    #[error("the API key must not be empty")]
    Validation,
    /// The backend failed to persist the value.
    #[error("failed to store the API key: {0}")]
    Storage(#[from] io::Error),
}

/// An API key for the model provider.
///
/// The value is never empty and carries no surrounding whitespace.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Creates a credential from user input.
    pub fn new(value: &str) -> Result<Self, CredentialError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(CredentialError::Validation);
        }
        Ok(Self(value.to_owned()))
    }

    /// Returns the raw key.
    #[inline]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns a hint that is safe to display, like `AIza…9xQk`.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "•".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&"<redacted>").finish()
    }
}

/// Durable storage for a single credential entry.
pub trait CredentialBackend: Send {
    /// Loads the stored value, `None` if nothing was stored yet.
    fn load(&self) -> io::Result<Option<String>>;

    /// Replaces the stored value.
    fn save(&mut self, value: &str) -> io::Result<()>;
}

/// Stores the credential in a JSON file.
///
/// Writes go to a temporary file which then replaces the target, so a
/// crash never leaves a half-written file behind. On Unix the file is
/// only readable by its owner.
#[derive(Clone, Debug)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend for the file at `path`.
    ///
    /// Nothing is touched on disk until the first save.
    #[inline]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the backing file.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> io::Result<Option<Map<String, Value>>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let map = serde_json::from_str(&contents)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        Ok(Some(map))
    }
}

impl CredentialBackend for FileBackend {
    fn load(&self) -> io::Result<Option<String>> {
        let Some(map) = self.read_map()? else {
            return Ok(None);
        };
        Ok(map
            .get(CREDENTIAL_KEY)
            .and_then(Value::as_str)
            .map(ToOwned::to_owned))
    }

    fn save(&mut self, value: &str) -> io::Result<()> {
        // Keep unrelated entries that may share the file.
        let mut map = self.read_map().ok().flatten().unwrap_or_default();
        map.insert(CREDENTIAL_KEY.to_owned(), Value::from(value));
        let json = serde_json::to_string_pretty(&map)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp_path, &self.path)?;
        debug!("credential written to {}", self.path.display());
        Ok(())
    }
}

/// Keeps the credential in memory only.
///
/// Clones share the same slot, which lets a test look at what a widget
/// stored.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    value: Arc<Mutex<Option<String>>>,
}

impl MemoryBackend {
    /// Creates a backend that already holds `value`.
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: Arc::new(Mutex::new(Some(value.into()))),
        }
    }

    /// Returns the stored value.
    pub fn value(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }
}

impl CredentialBackend for MemoryBackend {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.value())
    }

    fn save(&mut self, value: &str) -> io::Result<()> {
        *self.value.lock().unwrap_or_else(|err| err.into_inner()) =
            Some(value.to_owned());
        Ok(())
    }
}

/// Where the active credential came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// Loaded from or saved to the backend.
    Stored,
    /// The deployment-provided default.
    Fallback,
    /// There is no credential.
    Missing,
}

/// Holds the active credential and persists changes to it.
pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
    current: Option<Credential>,
    source: CredentialSource,
}

impl CredentialStore {
    /// Opens the store, loading the stored value.
    ///
    /// If nothing usable is stored, `fallback` seeds the in-memory value.
    /// The fallback is never written to the backend.
    pub fn open(
        backend: impl CredentialBackend + 'static,
        fallback: Option<String>,
    ) -> Self {
        let stored = match backend.load() {
            Ok(stored) => stored,
            Err(err) => {
                warn!("failed to load the stored credential: {err}");
                None
            }
        };

        let (current, source) = if let Some(credential) =
            stored.and_then(|value| Credential::new(&value).ok())
        {
            (Some(credential), CredentialSource::Stored)
        } else if let Some(credential) =
            fallback.and_then(|value| Credential::new(&value).ok())
        {
            debug!("using the fallback credential");
            (Some(credential), CredentialSource::Fallback)
        } else {
            (None, CredentialSource::Missing)
        };

        Self {
            backend: Box::new(backend),
            current,
            source,
        }
    }

    /// Opens an empty in-memory store.
    #[inline]
    pub fn in_memory() -> Self {
        Self::open(MemoryBackend::default(), None)
    }

    /// Returns the active credential.
    #[inline]
    pub fn get(&self) -> Option<&Credential> {
        self.current.as_ref()
    }

    /// Returns where the active credential came from.
    #[inline]
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Validates, persists and activates `value`.
    ///
    /// On failure the previous credential stays active.
    pub fn set(&mut self, value: &str) -> Result<(), CredentialError> {
        let credential = Credential::new(value)?;
        self.backend.save(credential.expose())?;
        self.current = Some(credential);
        self.source = CredentialSource::Stored;
        Ok(())
    }
}

impl Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("current", &self.current)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct BrokenBackend;

    impl CredentialBackend for BrokenBackend {
        fn load(&self) -> io::Result<Option<String>> {
            Err(io::Error::other("disk on fire"))
        }

        fn save(&mut self, _value: &str) -> io::Result<()> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn test_rejects_blank_values() {
        let backend = MemoryBackend::with_value("old-key");
        let mut store = CredentialStore::open(backend.clone(), None);

        assert!(matches!(store.set(""), Err(CredentialError::Validation)));
        assert!(matches!(
            store.set("  \t\n"),
            Err(CredentialError::Validation)
        ));
        assert_eq!(store.get().map(Credential::expose), Some("old-key"));
        assert_eq!(backend.value().as_deref(), Some("old-key"));
    }

    #[test]
    fn test_set_trims_and_persists() {
        let backend = MemoryBackend::default();
        let mut store = CredentialStore::open(backend.clone(), None);
        assert_eq!(store.source(), CredentialSource::Missing);

        store.set("  new-key \n").unwrap();
        assert_eq!(store.get().map(Credential::expose), Some("new-key"));
        assert_eq!(store.source(), CredentialSource::Stored);

        let reopened = CredentialStore::open(backend, None);
        assert_eq!(reopened.get().map(Credential::expose), Some("new-key"));
    }

    #[test]
    fn test_fallback_is_not_persisted() {
        let backend = MemoryBackend::default();
        let store =
            CredentialStore::open(backend.clone(), Some("env-key".to_owned()));
        assert_eq!(store.get().map(Credential::expose), Some("env-key"));
        assert_eq!(store.source(), CredentialSource::Fallback);
        assert_eq!(backend.value(), None);

        // A stored value wins over the fallback.
        let backend = MemoryBackend::with_value("stored-key");
        let store = CredentialStore::open(backend, Some("env-key".to_owned()));
        assert_eq!(store.get().map(Credential::expose), Some("stored-key"));

        let store = CredentialStore::open(
            MemoryBackend::default(),
            Some("   ".to_owned()),
        );
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_storage_failure_keeps_previous_value() {
        let mut store = CredentialStore::open(BrokenBackend, Some("env".into()));
        assert_eq!(store.source(), CredentialSource::Fallback);
        assert!(matches!(store.set("new"), Err(CredentialError::Storage(_))));
        assert_eq!(store.get().map(Credential::expose), Some("env"));
    }

    #[test]
    fn test_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");

        let mut backend = FileBackend::new(&path);
        assert_eq!(backend.load().unwrap(), None);

        backend.save("AIzaSecret").unwrap();
        backend.save("AIzaSecret2").unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let json: Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(json[CREDENTIAL_KEY], "AIzaSecret2");
        assert!(!path.with_extension("json.tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let store = CredentialStore::open(FileBackend::new(&path), None);
        assert_eq!(store.get().map(Credential::expose), Some("AIzaSecret2"));
    }

    #[test]
    fn test_file_backend_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        fs::write(&path, "not json").unwrap();

        let backend = FileBackend::new(&path);
        assert_eq!(
            backend.load().unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
        let store = CredentialStore::open(backend, None);
        assert_eq!(store.source(), CredentialSource::Missing);
    }

    #[test]
    fn test_masked() {
        let credential = Credential::new("AIzaSyD-1234567890-9xQk").unwrap();
        assert_eq!(credential.masked(), "AIza…9xQk");
        assert_eq!(Credential::new("short").unwrap().masked(), "•••••");
        assert!(!format!("{credential:?}").contains("AIza"));
    }
}
