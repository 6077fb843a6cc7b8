use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{debug, info};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Result, params::Params};

/// A borrowed snapshot of everything needed to resume training.
#[derive(Debug, Serialize)]
pub struct CheckpointState<'a, S> {
    pub params: &'a Params,
    pub optimizer_state: &'a S,
}

impl<'a, S> CheckpointState<'a, S> {
    pub fn new(params: &'a Params, optimizer_state: &'a S) -> Self {
        Self {
            params,
            optimizer_state,
        }
    }
}

/// Persists training snapshots.
pub trait CheckpointHandler {
    /// Persists `state` as the snapshot of `epoch`.
    fn save<S: Serialize>(&mut self, state: &CheckpointState<'_, S>, epoch: usize) -> Result<()>;
}

impl<T: CheckpointHandler + ?Sized> CheckpointHandler for &mut T {
    fn save<S: Serialize>(&mut self, state: &CheckpointState<'_, S>, epoch: usize) -> Result<()> {
        (**self).save(state, epoch)
    }
}

#[derive(Serialize)]
struct StoredRef<'a, S> {
    epoch: usize,
    #[serde(flatten)]
    state: &'a CheckpointState<'a, S>,
}

/// A checkpoint read back from disk.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StoredCheckpoint<S> {
    pub epoch: usize,
    pub params: Params,
    pub optimizer_state: S,
}

/// Stores checkpoints as `<directory>/<tag>_epoch-<epoch>.json`.
#[derive(Debug, Clone)]
pub struct DirCheckpointHandler {
    directory: PathBuf,
    tag: String,
    keep: bool,
}

impl DirCheckpointHandler {
    /// Creates a new `DirCheckpointHandler`.
    ///
    /// # Arguments
    /// * `directory` - Where checkpoints are written, created on the first save.
    /// * `tag` - The run's name, prefixes every file.
    /// * `keep` - Whether older checkpoints survive a new save.
    ///
    /// # Returns
    /// A new `DirCheckpointHandler` instance.
    pub fn new(directory: impl Into<PathBuf>, tag: impl Into<String>, keep: bool) -> Self {
        Self {
            directory: directory.into(),
            tag: tag.into(),
            keep,
        }
    }

    fn path(&self, epoch: usize) -> PathBuf {
        self.directory
            .join(format!("{}_epoch-{epoch}.json", self.tag))
    }

    /// Lists the stored checkpoints of this tag as `(epoch, path)`, sorted by epoch.
    pub fn list(&self) -> Result<Vec<(usize, PathBuf)>> {
        if !self.directory.exists() {
            return Ok(vec![]);
        }

        let prefix = format!("{}_epoch-", self.tag);
        let mut found = vec![];

        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let epoch = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix(&prefix))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<usize>().ok());

            if let Some(epoch) = epoch {
                found.push((epoch, path));
            }
        }

        found.sort();
        Ok(found)
    }

    /// Loads the checkpoint with the highest epoch, if any.
    pub fn load_latest<S: DeserializeOwned>(&self) -> Result<Option<StoredCheckpoint<S>>> {
        let Some((_, path)) = self.list()?.pop() else {
            return Ok(None);
        };

        info!("loading checkpoint {}", path.display());
        let reader = BufReader::new(File::open(path)?);
        Ok(Some(serde_json::from_reader(reader)?))
    }

    /// Writes the SWA average as `<directory>/<tag>_swa.json`.
    ///
    /// # Returns
    /// The path of the written file.
    pub fn save_averaged(&self, params: &Params) -> Result<PathBuf> {
        fs::create_dir_all(&self.directory)?;

        let path = self.directory.join(format!("{}_swa.json", self.tag));
        Self::write(&path, params)?;
        info!("saved SWA parameters to {}", path.display());

        Ok(path)
    }

    fn write(path: &Path, stored: &impl Serialize) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let mut writer = BufWriter::new(File::create(&tmp)?);

        serde_json::to_writer(&mut writer, stored)?;
        writer.flush()?;
        drop(writer);

        fs::rename(tmp, path)?;
        Ok(())
    }
}

impl CheckpointHandler for DirCheckpointHandler {
    fn save<S: Serialize>(&mut self, state: &CheckpointState<'_, S>, epoch: usize) -> Result<()> {
        fs::create_dir_all(&self.directory)?;

        let previous = if self.keep { vec![] } else { self.list()? };
        let path = self.path(epoch);

        Self::write(&path, &StoredRef { epoch, state })?;
        debug!(epoch = epoch; "saved checkpoint");

        for (_, old) in previous.into_iter().filter(|(_, p)| *p != path) {
            fs::remove_file(old)?;
        }

        Ok(())
    }
}
