pub mod collection_config;

pub use collection_config::{
    CollectionConfiguration, ConfigStore, PostgresConfigStore, ScopeDimension,
};
