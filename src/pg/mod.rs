pub mod sqlgen;

pub use sqlgen::PostgresRenderer;
