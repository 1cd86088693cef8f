use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use super::{Config, ConfigError};

pub type ConfigListener = Box<dyn Fn(Config) + Send + Sync>;

/// Where the orchestrator gets its configuration from. `current` is called
/// once at construction; listeners registered through `subscribe` receive
/// every subsequent complete config. Listeners may be invoked from arbitrary
/// threads.
pub trait ConfigSource: Send + Sync {
    fn current(&self) -> Result<Config, ConfigError>;

    fn subscribe(&self, listener: ConfigListener);
}

/// YAML file backed config source. `reload` re-reads the file and fans the
/// parsed config out to every subscriber.
pub struct FileConfigSource {
    path: PathBuf,
    listeners: Mutex<Vec<ConfigListener>>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            listeners: Mutex::new(Vec::default()),
        }
    }

    fn load(&self) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn reload(&self) -> Result<Config, ConfigError> {
        let config = self.load()?;
        for listener in self.listeners.lock().unwrap().iter() {
            listener(config.clone());
        }
        Ok(config)
    }
}

impl ConfigSource for FileConfigSource {
    fn current(&self) -> Result<Config, ConfigError> {
        self.load()
    }

    fn subscribe(&self, listener: ConfigListener) {
        self.listeners.lock().unwrap().push(listener);
    }
}

/// In-memory config source, for embedding and tests. `update` replaces the
/// stored config and notifies subscribers.
pub struct MemoryConfigSource {
    config: Mutex<Config>,
    listeners: Mutex<Vec<ConfigListener>>,
}

impl MemoryConfigSource {
    pub fn new(config: Config) -> Self {
        Self {
            config: Mutex::new(config),
            listeners: Mutex::new(Vec::default()),
        }
    }

    pub fn update(&self, config: Config) {
        *self.config.lock().unwrap() = config.clone();
        for listener in self.listeners.lock().unwrap().iter() {
            listener(config.clone());
        }
    }
}

impl ConfigSource for MemoryConfigSource {
    fn current(&self) -> Result<Config, ConfigError> {
        Ok(self.config.lock().unwrap().clone())
    }

    fn subscribe(&self, listener: ConfigListener) {
        self.listeners.lock().unwrap().push(listener);
    }
}
