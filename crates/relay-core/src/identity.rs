//! Local user identity.
//!
//! A user is known by an 8-character [`UserId`] generated on first launch and
//! an optional self-chosen display name.  [`LocalIdentity`] keeps both in a
//! small JSON file in the platform data directory.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use relay_shared::UserId;
use relay_store::{rows, Profile, Store};

use crate::error::{CoreError, Result, ValidationError};

/// Source of the local user's id and name.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> UserId;

    /// Name the user chose, if any.
    fn chosen_display_name(&self) -> Option<String>;

    /// Name to show for the local user: the chosen one, or "User XXXX".
    fn display_name(&self) -> String {
        self.chosen_display_name()
            .unwrap_or_else(|| self.current_user_id().fallback_name())
    }

    /// Set the display name (trimmed, non-empty).  Returns the stored value.
    fn set_display_name(&self, name: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityRecord {
    user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

impl IdentityRecord {
    fn fresh() -> Self {
        Self {
            user_id: UserId::generate(),
            display_name: None,
        }
    }
}

pub struct LocalIdentity {
    path: Option<PathBuf>,
    record: Mutex<IdentityRecord>,
}

impl LocalIdentity {
    /// `<data dir>/identity.json`.
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "relay", "relay").ok_or_else(|| {
            CoreError::IdentityFile("could not determine application data directory".into())
        })?;
        Ok(dirs.data_dir().join("identity.json"))
    }

    /// Read the identity at `path`, creating a fresh one if the file does not
    /// exist yet.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        let record = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            let record: IdentityRecord = serde_json::from_str(&raw)?;
            debug!(user = %record.user_id, "identity loaded");
            record
        } else {
            let record = IdentityRecord::fresh();
            write_record(path, &record)?;
            info!(user = %record.user_id, path = %path.display(), "new identity created");
            record
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            record: Mutex::new(record),
        })
    }

    /// Identity that lives only as long as the process.
    pub fn in_memory(user_id: UserId, display_name: Option<&str>) -> Self {
        Self {
            path: None,
            record: Mutex::new(IdentityRecord {
                user_id,
                display_name: display_name
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(str::to_string),
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the id with a new random one and forget the chosen name.
    pub fn regenerate_id(&self) -> Result<UserId> {
        let mut record = self.lock();
        let fresh = IdentityRecord::fresh();
        self.persist(&fresh)?;
        info!(old = %record.user_id, new = %fresh.user_id, "identity regenerated");
        *record = fresh;
        Ok(record.user_id.clone())
    }

    fn lock(&self) -> MutexGuard<'_, IdentityRecord> {
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, record: &IdentityRecord) -> Result<()> {
        match &self.path {
            Some(path) => write_record(path, record),
            None => Ok(()),
        }
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_user_id(&self) -> UserId {
        self.lock().user_id.clone()
    }

    fn chosen_display_name(&self) -> Option<String> {
        self.lock().display_name.clone()
    }

    fn set_display_name(&self, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyDisplayName.into());
        }

        let mut record = self.lock();
        let updated = IdentityRecord {
            user_id: record.user_id.clone(),
            display_name: Some(name.to_string()),
        };
        self.persist(&updated)?;
        *record = updated;
        Ok(name.to_string())
    }
}

fn write_record(path: &Path, record: &IdentityRecord) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Make sure the local user has a profile row, and that a chosen display name
/// is reflected in it.
pub async fn ensure_registered(store: &dyn Store, identity: &dyn IdentityProvider) -> Result<Profile> {
    let id = identity.current_user_id();
    let chosen = identity.chosen_display_name();

    let existing = match store.profile(&id).await? {
        Some(profile) => profile,
        None => {
            let profile = Profile {
                id: id.clone(),
                name: None,
                display_name: chosen.clone(),
                created_at: rows::now(),
            };
            match store.register_profile(&profile).await {
                Ok(()) => {
                    info!(user = %id, "profile registered");
                    return Ok(profile);
                }
                // Registered concurrently from another process.
                Err(e) if e.is_conflict() => {
                    store.profile(&id).await?.ok_or(relay_store::StoreError::NotFound)?
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    match chosen {
        Some(name) if existing.display_name.as_deref() != Some(name.as_str()) => {
            match store.set_display_name(&id, &name).await {
                Ok(updated) => Ok(updated),
                Err(e) => {
                    warn!(user = %id, error = %e, "could not sync display name");
                    Ok(existing)
                }
            }
        }
        _ => Ok(existing),
    }
}
