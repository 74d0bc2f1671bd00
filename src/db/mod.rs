pub mod postgres;
pub mod redis;

pub use self::postgres::{create_pool, run_migrations, MovieRepository};
pub use self::redis::{create_redis_client, Cache, CacheKey, CacheWriterHandle};
