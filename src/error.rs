use thiserror::Error;

use crate::model::ProgramBlockKind;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("network '{network}' of block '{block}' declares {count} call instances; only one instance per network is supported")]
    MultipleInstances {
        block: String,
        network: String,
        count: usize,
    },

    #[error("block '{block}' calls '{instance}' as a {kind}; only function blocks and functions can be called")]
    UnsupportedCallKind {
        block: String,
        instance: String,
        kind: ProgramBlockKind,
    },

    #[error("block '{block}' calls function block '{instance}' without an instance database")]
    MissingInstanceDatabase { block: String, instance: String },

    #[error("{kind} '{block}' cannot contain network sources")]
    NetworksNotSupported {
        block: String,
        kind: ProgramBlockKind,
    },

    #[error("{kind} '{block}' cannot be instantiated from a library master copy")]
    LibraryInstanceNotSupported {
        block: String,
        kind: ProgramBlockKind,
    },

    #[error("block '{block}' is marked as a library instance but names no library")]
    MissingLibraryData { block: String },

    #[error("library '{0}' not found")]
    LibraryNotFound(String),

    #[error("master copy '{name}' not found in folder '{folder}' of library '{library}'")]
    MasterCopyNotFound {
        library: String,
        folder: String,
        name: String,
    },

    #[error("block group '{0}' not found")]
    BlockGroupNotFound(String),

    #[error("failed to render XML document: {0}")]
    Xml(#[from] xmltree::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("placing block '{block}' failed: {source}")]
    Placement {
        block: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl GenerateError {
    pub(crate) fn placement(block: &str, source: anyhow::Error) -> Self {
        GenerateError::Placement {
            block: block.to_string(),
            source: source.into(),
        }
    }

    /// Caller-visible input problems; retrying without new input cannot help.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GenerateError::MultipleInstances { .. }
                | GenerateError::UnsupportedCallKind { .. }
                | GenerateError::MissingInstanceDatabase { .. }
                | GenerateError::NetworksNotSupported { .. }
                | GenerateError::LibraryInstanceNotSupported { .. }
                | GenerateError::MissingLibraryData { .. }
                | GenerateError::LibraryNotFound(_)
                | GenerateError::MasterCopyNotFound { .. }
        )
    }
}
