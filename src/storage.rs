//! On-disk persistence.
//!
//! Each persisted value is one JSON document at a fixed path. Saves
//! are write-and-replace: the document is written to a sibling
//! temporary file and renamed over the target, so a crash mid-save
//! leaves the previous document intact. A missing or empty file
//! means "nothing persisted yet" and is not an error; a document
//! that fails to parse is.

use {
  serde::{de::DeserializeOwned, Serialize},
  std::{
    fs,
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
  },
  thiserror::Error,
  tracing::debug,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("storage io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("storage document is corrupt: {0}")]
  Corrupt(#[from] serde_json::Error),
}

pub struct Storage<T> {
  path: PathBuf,
  _marker: PhantomData<T>,
}

impl<T> Clone for Storage<T> {
  fn clone(&self) -> Self {
    Self {
      path: self.path.clone(),
      _marker: PhantomData,
    }
  }
}

impl<T> std::fmt::Debug for Storage<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Storage").field("path", &self.path).finish()
  }
}

impl<T: Serialize + DeserializeOwned> Storage<T> {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      _marker: PhantomData,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn save(&self, value: &T) -> Result<(), Error> {
    if let Some(dir) = self.path.parent() {
      if !dir.as_os_str().is_empty() {
        fs::create_dir_all(dir)?;
      }
    }

    let staging = self.path.with_extension("tmp");
    fs::write(&staging, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&staging, &self.path)?;

    debug!("saved {}", self.path.display());
    Ok(())
  }

  pub fn load(&self) -> Result<Option<T>, Error> {
    let bytes = match fs::read(&self.path) {
      Ok(bytes) => bytes,
      Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
      Err(error) => return Err(error.into()),
    };

    if bytes.is_empty() {
      return Ok(None);
    }

    Ok(Some(serde_json::from_slice(&bytes)?))
  }
}

#[cfg(test)]
mod tests {
  use {super::Storage, std::fs, uuid::Uuid};

  fn scratch_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("mailgate-storage-{}.json", Uuid::new_v4()))
  }

  #[test]
  fn round_trips_a_document() {
    let path = scratch_path();
    let storage = Storage::<Vec<String>>::new(&path);

    storage.save(&vec!["alice@example.com".to_owned()]).unwrap();
    let loaded = storage.load().unwrap();
    assert_eq!(loaded, Some(vec!["alice@example.com".to_owned()]));

    fs::remove_file(path).unwrap();
  }

  #[test]
  fn save_replaces_the_previous_document() {
    let path = scratch_path();
    let storage = Storage::<u64>::new(&path);

    storage.save(&1).unwrap();
    storage.save(&2).unwrap();
    assert_eq!(storage.load().unwrap(), Some(2));

    fs::remove_file(path).unwrap();
  }

  #[test]
  fn missing_file_loads_as_none() {
    let storage = Storage::<u64>::new(scratch_path());
    assert_eq!(storage.load().unwrap(), None);
  }

  #[test]
  fn empty_file_loads_as_none() {
    let path = scratch_path();
    fs::write(&path, b"").unwrap();

    let storage = Storage::<u64>::new(&path);
    assert_eq!(storage.load().unwrap(), None);

    fs::remove_file(path).unwrap();
  }

  #[test]
  fn corrupt_file_is_an_error() {
    let path = scratch_path();
    fs::write(&path, b"{ not json").unwrap();

    let storage = Storage::<u64>::new(&path);
    assert!(storage.load().is_err());

    fs::remove_file(path).unwrap();
  }
}
