use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

/// Fixture served by the in-memory driver in CLI tests
pub const ACCOUNTS_FIXTURE: &str = r#"{
  "credentials": { "user": "app", "password": "secret" },
  "queries": {
    "SELECT id, name, balance FROM accounts": {
      "columns": [
        { "name": "id", "data_type": "big_int", "nullability": "no_nulls" },
        { "name": "name", "data_type": "var_char", "size": 64 },
        { "name": "balance", "data_type": "double" }
      ],
      "rows": [
        [1, "Alice", 3.14],
        [2, null, -0.5]
      ]
    }
  }
}"#;

/// Temporary directory holding fixture and config files
pub struct TestDir {
    pub dir: TempDir,
}

impl TestDir {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        Self { dir }
    }

    /// Write a file into the directory and return its path
    pub fn write(&self, filename: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(filename);
        let mut file = File::create(&path).expect("Failed to create file");
        write!(file, "{}", content).expect("Failed to write file");
        path
    }

    pub fn accounts_fixture(&self) -> PathBuf {
        self.write("accounts.json", ACCOUNTS_FIXTURE)
    }
}
