use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

/// JSON file storage next to the binary, used for the config file and the
/// cached price snapshot the dashboard starts from.
pub struct AsyncStorageManager {
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Resolves the storage directory relative to the running executable
    /// and creates it up front, so saves never have to check for it.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new_at(base_dir).await
    }

    /// Storage rooted at an explicit directory. Tests use this to avoid
    /// touching the real storage next to the test binary.
    pub async fn new_at<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Saves any `Serialize` value as pretty JSON. Writes go to a .tmp
    /// file first and are renamed into place, so a crash mid-write leaves
    /// the previous file intact.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let file_name = format!("{}.json", filename);
        let final_path = self.base_dir.join(&file_name);
        let tmp_path = self.base_dir.join(format!("{}.tmp", file_name));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.base_dir.join(format!("{}.json", filename));
        // Raw bytes: serde_json scans them anyway, no need for a UTF-8 pass.
        let content = fs::read(path).await?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Loads `filename`, or writes `default` there and returns it when the
    /// file does not exist yet. First run creates the config this way.
    pub async fn load_or_init<T>(&self, filename: &str, default: T) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let path = self.base_dir.join(format!("{}.json", filename));
        if !path.exists() {
            self.save(filename, &default).await?;
            return Ok(default);
        }
        self.load(filename).await
    }
}
