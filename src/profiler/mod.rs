pub mod cgroup;
pub mod file_id;
pub mod reporter;

pub use cgroup::{extract_container_id, parse_container_id};
pub use file_id::{FileId, FileIdMapper, LruFileIdMapper, MapFileIdMapper, MappingFile};
pub use reporter::{
    ExecutableMetadata, ExecutableReporter, SymbolUploadConfig, SymbolUploadReporter,
};
