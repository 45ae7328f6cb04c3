//! Account store collaborator.
//!
//! Accounts are keyed records in a single JSON file. The relay never touches
//! this store at runtime; it is the interface the login and save endpoints
//! sit on.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("missing username or password")]
    MissingCredentials,
    #[error("username `{0}` already exists")]
    AlreadyExists(String),
    #[error("account `{0}` not found")]
    NotFound(String),
    #[error("incorrect password")]
    WrongPassword,
    #[error("account file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("account file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub password: String,
    #[serde(default)]
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginInfo {
    pub color: String,
    pub title: String,
}

/// Progress every new account starts with.
pub fn starting_data() -> Map<String, Value> {
    let value = json!({
        "level": 1,
        "xp": 0,
        "coins": 100,
        "class": "",
        "weapon": null,
        "totalEnemiesKilled": 0,
        "totalCoinsCollected": 0,
        "totalExpEarned": 0
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub trait AccountStore {
    fn create(&self, username: &str, password: &str, color: &str) -> Result<(), AccountError>;
    fn login(&self, username: &str, password: &str) -> Result<LoginInfo, AccountError>;
    /// Shallow-merges `patch` into the saved progress.
    fn save_data(&self, username: &str, patch: Map<String, Value>) -> Result<(), AccountError>;
    /// Saved progress plus the account's color and title.
    fn load_data(&self, username: &str) -> Result<Map<String, Value>, AccountError>;
    fn set_class(&self, username: &str, class: &str) -> Result<(), AccountError>;
}

pub struct FileAccountStore {
    path: PathBuf,
}

type Accounts = BTreeMap<String, Account>;

impl FileAccountStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn read(&self) -> Result<Accounts, AccountError> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Accounts::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, accounts: &Accounts) -> Result<(), AccountError> {
        fs::write(&self.path, serde_json::to_string_pretty(accounts)?)?;
        Ok(())
    }

    fn update<F>(&self, username: &str, f: F) -> Result<(), AccountError>
    where
        F: FnOnce(&mut Account),
    {
        let mut accounts = self.read()?;
        let account = accounts
            .get_mut(username)
            .ok_or_else(|| AccountError::NotFound(username.to_string()))?;
        f(account);
        self.write(&accounts)
    }
}

impl AccountStore for FileAccountStore {
    fn create(&self, username: &str, password: &str, color: &str) -> Result<(), AccountError> {
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::MissingCredentials);
        }
        let mut accounts = self.read()?;
        if accounts.contains_key(username) {
            return Err(AccountError::AlreadyExists(username.to_string()));
        }
        accounts.insert(
            username.to_string(),
            Account {
                password: password.to_string(),
                color: color.to_string(),
                title: None,
                data: starting_data(),
            },
        );
        self.write(&accounts)
    }

    fn login(&self, username: &str, password: &str) -> Result<LoginInfo, AccountError> {
        let accounts = self.read()?;
        let account = accounts
            .get(username)
            .ok_or_else(|| AccountError::NotFound(username.to_string()))?;
        if account.password != password {
            return Err(AccountError::WrongPassword);
        }
        Ok(LoginInfo {
            color: account.color.clone(),
            title: account.title.clone().unwrap_or_default(),
        })
    }

    fn save_data(&self, username: &str, patch: Map<String, Value>) -> Result<(), AccountError> {
        self.update(username, |account| account.data.extend(patch))
    }

    fn load_data(&self, username: &str) -> Result<Map<String, Value>, AccountError> {
        let accounts = self.read()?;
        let account = accounts
            .get(username)
            .ok_or_else(|| AccountError::NotFound(username.to_string()))?;
        let mut record = account.data.clone();
        record.insert("color".into(), Value::from(account.color.clone()));
        record.insert(
            "title".into(),
            Value::from(account.title.clone().unwrap_or_default()),
        );
        Ok(record)
    }

    fn set_class(&self, username: &str, class: &str) -> Result<(), AccountError> {
        self.update(username, |account| {
            account.data.insert("class".into(), Value::from(class));
        })
    }
}
