pub mod coordinates;
pub mod crawler;
pub mod listing;
pub mod metadata_xml;
pub mod paths;
pub mod remote_repo;
pub mod version;
