use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unrecognised config format for {0}")]
    UnknownFormat(String),

    #[cfg(feature = "yaml")]
    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[cfg(feature = "toml")]
    #[error("toml parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[cfg(feature = "toml")]
    #[error("toml serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("config invalid: {0:?}")]
    Invalid(Vec<String>),
}
