use std::{
    collections::HashMap,
    io::{ErrorKind, SeekFrom},
    path::PathBuf,
};

use thiserror::Error;
use tokio::{
    fs,
    io::{AsyncBufReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
    sync::Mutex,
};
use tracing::{debug, info};

use crate::{config::StoreConfig, measure::Measure, storage::record::MeasurementRecord};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Provisioned {
    Created,
    AlreadyExists,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("error encoding record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("malformed record at line {line}: {source}")]
    Malformed {
        line: usize,
        source: serde_json::Error,
    },
    #[error("malformed record at byte {offset}: {source}")]
    MalformedAt {
        offset: u64,
        source: serde_json::Error,
    },
}

/// Persistence for processed conversions, keyed by a generated id.
pub enum Store {
    Memory(MemoryStore),
    File(FileStore),
}

impl Store {
    pub fn from_config(config: &StoreConfig) -> Store {
        match config {
            StoreConfig::Memory => Store::Memory(MemoryStore::new()),
            StoreConfig::File(path) => Store::File(FileStore::new(path.clone())),
        }
    }

    pub async fn provision(&self) -> Result<Provisioned, StoreError> {
        let provisioned = match self {
            Self::Memory(_) => Provisioned::Created,
            Self::File(f) => f.provision().await?,
        };

        match provisioned {
            Provisioned::Created => info!(store = %self, "measurement store created"),
            Provisioned::AlreadyExists => info!(store = %self, "measurement store already exists"),
        }
        Ok(provisioned)
    }

    pub async fn insert(
        &self,
        measurement_value: &str,
        result: &[Measure],
    ) -> Result<MeasurementRecord, StoreError> {
        let record = MeasurementRecord::new(measurement_value, result);
        match self {
            Self::Memory(m) => m.insert(record.clone()).await,
            Self::File(f) => f.insert(&record).await?,
        }
        debug!(id = %record.id, "measurement result stored");
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Option<MeasurementRecord>, StoreError> {
        match self {
            Self::Memory(m) => Ok(m.get(id).await),
            Self::File(f) => f.get(id).await,
        }
    }
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(_) => write!(f, "memory"),
            Self::File(file) => write!(f, "{}", file.path.display()),
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, MeasurementRecord>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    async fn insert(&self, record: MeasurementRecord) {
        self.records.lock().await.insert(record.id.clone(), record);
    }

    async fn get(&self, id: &str) -> Option<MeasurementRecord> {
        self.records.lock().await.get(id).cloned()
    }
}

/// One JSON encoded record per line, append only.
/// Lookups go through an id -> byte offset index, built from the file on first
/// use and kept current by appends made through this store.
pub struct FileStore {
    path: PathBuf,
    // also serializes appends from concurrent connections
    index: Mutex<Option<HashMap<String, u64>>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> FileStore {
        FileStore {
            path: path.into(),
            index: Mutex::new(None),
        }
    }

    async fn provision(&self) -> Result<Provisioned, StoreError> {
        if fs::try_exists(&self.path).await? {
            return Ok(Provisioned::AlreadyExists);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        Ok(Provisioned::Created)
    }

    async fn insert(&self, record: &MeasurementRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut index = self.index.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let offset = file.metadata().await?.len();
        file.write_all(&line).await?;
        file.flush().await?;

        // an index built later picks the line up from the file
        if let Some(index) = index.as_mut() {
            index.insert(record.id.clone(), offset);
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MeasurementRecord>, StoreError> {
        let offset = {
            let mut index = self.index.lock().await;
            if index.is_none() {
                *index = Some(self.build_index().await?);
            }
            match index.as_ref().and_then(|index| index.get(id)) {
                Some(offset) => *offset,
                None => return Ok(None),
            }
        };

        let mut file = fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut line = String::new();
        BufReader::new(file).read_line(&mut line).await?;

        let record = serde_json::from_str(&line)
            .map_err(|source| StoreError::MalformedAt { offset, source })?;
        Ok(Some(record))
    }

    async fn build_index(&self) -> Result<HashMap<String, u64>, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };

        let mut index = HashMap::new();
        let mut offset = 0u64;
        for (i, line) in content.split_inclusive('\n').enumerate() {
            let line_offset = offset;
            offset += line.len() as u64;
            if line.trim().is_empty() {
                continue;
            }

            let record: MeasurementRecord =
                serde_json::from_str(line).map_err(|source| StoreError::Malformed {
                    line: i + 1,
                    source,
                })?;
            index.insert(record.id.clone(), line_offset);
        }
        debug!(path = %self.path.display(), records = index.len(), "record index built");
        Ok(index)
    }
}
