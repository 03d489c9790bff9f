use std::{
  fs::{self, OpenOptions},
  io::Write,
  os::unix::fs::OpenOptionsExt,
  path::Path,
};

use crate::Result;

/// Write a file to disk with the given mode, creating missing parent directories
///
/// An existing file is truncated
pub fn write_file<P: AsRef<Path>>(contents: &[u8], path: P, mode: Option<u32>) -> Result<()> {
  let path = path.as_ref();
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)?;
  }

  let mut file = OpenOptions::new()
    .write(true)
    .create(true)
    .truncate(true)
    .mode(mode.unwrap_or(0o644))
    .open(path)?;
  file.write_all(contents)?;

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn it_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stacks/K3sMaster/cdk.tf.json");
    write_file(b"{}", &path, None).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
  }

  #[test]
  fn it_truncates_existing_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    write_file(b"a longer document", &path, None).unwrap();
    write_file(b"short", &path, None).unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "short");
  }
}
