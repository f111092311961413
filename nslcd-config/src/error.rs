use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{path}:{line}: {keyword} requires an argument")]
    MissingArgument {
        path: String,
        line: usize,
        keyword: String,
    },
    #[error("{path}:{line}: unknown directive '{keyword}'")]
    UnknownDirective {
        path: String,
        line: usize,
        keyword: String,
    },
    #[error("{path}:{line}: unknown database '{name}'")]
    UnknownDatabase {
        path: String,
        line: usize,
        name: String,
    },
    #[error("{path}:{line}: {source}")]
    Attribute {
        path: String,
        line: usize,
        #[source]
        source: nslcd_attrs::AttrMapError,
    },
    #[error("{path}:{line}: invalid regular expression in validnames: {source}")]
    Regex {
        path: String,
        line: usize,
        #[source]
        source: regex::Error,
    },
    #[error("invalid value for {directive}: '{value}'")]
    InvalidValue { directive: &'static str, value: String },
    #[error("no `uri` directive found; at least one directory server is required")]
    NoUris,
}
