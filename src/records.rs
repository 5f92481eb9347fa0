//! Record files backing user accounts and newsletter subscribers.
//!
//! Each table is a JSON-lines file under the data directory: one record per
//! line, appended on insert and scanned on lookup. A mutex per file keeps the
//! "check for duplicate, then append" sequence atomic within the process.
//! Malformed lines are skipped with a warning instead of failing the table.

use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::{BufRead, BufReader, ErrorKind, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};

pub const USERS_FILE: &str = "users.jsonl";
pub const SUBSCRIBERS_FILE: &str = "subscribers.jsonl";

/// Append-only JSON-lines table.
#[derive(Debug)]
pub struct RecordFile<T> {
    path: PathBuf,
    lock: Mutex<()>,
    _record: PhantomData<fn() -> T>,
}

impl<T> RecordFile<T>
where
    T: Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
            _record: PhantomData,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the first record matching `predicate`.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read.
    pub fn find<F>(&self, predicate: F) -> Result<Option<T>>
    where
        F: Fn(&T) -> bool,
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("record file lock poisoned"))?;
        Ok(self.read_all()?.into_iter().find(|record| predicate(record)))
    }

    /// Append `record` unless an existing record matches `exists`.
    ///
    /// Returns `true` when the record was written.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or written.
    pub fn append_unless<F>(&self, record: &T, exists: F) -> Result<bool>
    where
        F: Fn(&T) -> bool,
    {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("record file lock poisoned"))?;

        if self.read_all()?.iter().any(exists) {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut line = serde_json::to_string(record).context("failed to encode record")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to append to {}", self.path.display()))?;

        debug!(path = %self.path.display(), "record appended");

        Ok(true)
    }

    fn read_all(&self) -> Result<Vec<T>> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to open {}", self.path.display()));
            }
        };

        let mut records = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.with_context(|| format!("failed to read {}", self.path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(err) => warn!(
                    path = %self.path.display(),
                    line = index + 1,
                    "skipping malformed record: {err}"
                ),
            }
        }

        Ok(records)
    }
}

/// Account as returned to the login and signup flows.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateUserOutcome {
    Created,
    AlreadyExists,
}

/// Identity persistence used by login and signup.
pub trait UserStore: Send + Sync {
    /// Look up an account by its normalized email.
    ///
    /// # Errors
    /// Returns an error if the backing storage is unavailable.
    fn find_user(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Persist a new account unless the email is already registered.
    ///
    /// # Errors
    /// Returns an error if the backing storage is unavailable.
    fn create_user(&self, user: &UserRecord) -> Result<CreateUserOutcome>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Subscribed,
    AlreadySubscribed,
}

/// Newsletter subscriber persistence.
pub trait SubscriberStore: Send + Sync {
    /// Record `email` as a subscriber. Repeated calls are idempotent.
    ///
    /// # Errors
    /// Returns an error if the backing storage is unavailable.
    fn add_subscriber(&self, email: &str) -> Result<SubscribeOutcome>;
}

/// Run a blocking store call on tokio's blocking pool so file scans never
/// stall the async workers.
///
/// # Errors
/// Returns the call's own error, or an error if the blocking task panicked.
pub async fn offload<S, R, F>(store: Arc<S>, call: F) -> Result<R>
where
    S: ?Sized + Send + Sync + 'static,
    R: Send + 'static,
    F: FnOnce(&S) -> Result<R> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .context("record store task failed")?
}

#[derive(Serialize, Deserialize)]
struct StoredUser {
    username: String,
    email: String,
    password: String,
    created_at_unix: u64,
}

#[derive(Serialize, Deserialize)]
struct StoredSubscriber {
    email: String,
    subscribed_at_unix: u64,
}

pub struct FileUserStore {
    file: RecordFile<StoredUser>,
}

impl FileUserStore {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            file: RecordFile::new(data_dir.join(USERS_FILE)),
        }
    }
}

impl UserStore for FileUserStore {
    fn find_user(&self, email: &str) -> Result<Option<UserRecord>> {
        let stored = self.file.find(|user| user.email == email)?;
        Ok(stored.map(|user| UserRecord {
            username: user.username,
            email: user.email,
            password: SecretString::from(user.password),
        }))
    }

    fn create_user(&self, user: &UserRecord) -> Result<CreateUserOutcome> {
        let stored = StoredUser {
            username: user.username.clone(),
            email: user.email.clone(),
            password: user.password.expose_secret().to_string(),
            created_at_unix: unix_now(),
        };
        let written = self
            .file
            .append_unless(&stored, |existing| existing.email == stored.email)?;
        Ok(if written {
            CreateUserOutcome::Created
        } else {
            CreateUserOutcome::AlreadyExists
        })
    }
}

pub struct FileSubscriberStore {
    file: RecordFile<StoredSubscriber>,
}

impl FileSubscriberStore {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            file: RecordFile::new(data_dir.join(SUBSCRIBERS_FILE)),
        }
    }
}

impl SubscriberStore for FileSubscriberStore {
    fn add_subscriber(&self, email: &str) -> Result<SubscribeOutcome> {
        let stored = StoredSubscriber {
            email: email.to_string(),
            subscribed_at_unix: unix_now(),
        };
        let written = self
            .file
            .append_unless(&stored, |existing| existing.email == stored.email)?;
        Ok(if written {
            SubscribeOutcome::Subscribed
        } else {
            SubscribeOutcome::AlreadySubscribed
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn user(email: &str) -> UserRecord {
        UserRecord {
            username: "alice".to_string(),
            email: email.to_string(),
            password: SecretString::from("correct horse".to_string()),
        }
    }

    #[test]
    fn find_user_on_missing_file_is_none() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileUserStore::new(dir.path());
        assert!(store.find_user("alice@example.com")?.is_none());
        Ok(())
    }

    #[test]
    fn create_user_then_find() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileUserStore::new(dir.path());

        assert_eq!(
            store.create_user(&user("alice@example.com"))?,
            CreateUserOutcome::Created
        );

        let found = store.find_user("alice@example.com")?;
        assert!(found.is_some());
        if let Some(found) = found {
            assert_eq!(found.username, "alice");
            assert_eq!(found.password.expose_secret(), "correct horse");
        }
        Ok(())
    }

    #[test]
    fn create_user_rejects_duplicate_email() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileUserStore::new(dir.path());

        store.create_user(&user("alice@example.com"))?;
        assert_eq!(
            store.create_user(&user("alice@example.com"))?,
            CreateUserOutcome::AlreadyExists
        );
        Ok(())
    }

    #[test]
    fn malformed_lines_are_skipped() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join(USERS_FILE), "not json\n\n")?;
        let store = FileUserStore::new(dir.path());

        store.create_user(&user("bob@example.com"))?;
        assert!(store.find_user("bob@example.com")?.is_some());
        Ok(())
    }

    #[tokio::test(flavor = "current_thread")]
    async fn offload_runs_off_the_runtime_thread() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store: Arc<dyn SubscriberStore> = Arc::new(FileSubscriberStore::new(dir.path()));
        let runtime_thread = std::thread::current().id();

        let (outcome, store_thread) = offload(store, |store| {
            Ok((
                store.add_subscriber("news@example.com")?,
                std::thread::current().id(),
            ))
        })
        .await?;

        assert_eq!(outcome, SubscribeOutcome::Subscribed);
        assert_ne!(store_thread, runtime_thread);
        Ok(())
    }

    #[tokio::test]
    async fn offload_propagates_store_errors() {
        let store: Arc<dyn UserStore> = Arc::new(FileUserStore::new(Path::new("/dev/null")));
        let result = offload(store, |store| store.find_user("a@zeek.shop")).await;
        assert!(result.is_err());
    }

    #[test]
    fn subscribers_are_idempotent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = FileSubscriberStore::new(&dir.path().join("nested"));

        assert_eq!(
            store.add_subscriber("news@example.com")?,
            SubscribeOutcome::Subscribed
        );
        assert_eq!(
            store.add_subscriber("news@example.com")?,
            SubscribeOutcome::AlreadySubscribed
        );
        Ok(())
    }
}
